//! Writer for the drush makefile format.
//!
//! Output is deterministic: Drupal core first, then projects and libraries
//! in name order, each with its fields in a fixed order.

use super::Makefile;
use crate::component::{Component, Library};
use crate::error::Result;
use crate::project::{Project, ProjectType};
use std::fmt::Write;
use std::path::Path;

/// Write a makefile to `path`.
pub fn write_file(makefile: &Makefile, path: &Path) -> Result<()> {
    std::fs::write(path, write_string(makefile))?;
    Ok(())
}

/// Render a makefile as text.
pub fn write_string(makefile: &Makefile) -> String {
    let mut output = String::new();
    let core = makefile.core.map(|c| c.to_string()).unwrap_or_default();
    writeln!(output, "core = {core}").unwrap();
    writeln!(output, "api  = {}", makefile.api.as_deref().unwrap_or_default()).unwrap();

    if let Some(drupal) = makefile.drupal_project() {
        write_project(&mut output, makefile, drupal);
    }
    if !makefile.projects.is_empty() {
        output.push('\n');
    }
    for project in makefile.projects() {
        write_project(&mut output, makefile, project);
    }
    if !makefile.libraries.is_empty() {
        output.push('\n');
    }
    for library in makefile.libraries() {
        write_library(&mut output, makefile, library);
    }
    output
}

fn download_fields(fields: &mut Vec<String>, makefile: &Makefile, component: &Component) {
    let download = &component.download;
    if let Some(kind) = &download.kind {
        fields.push(format!("[download][type] = \"{kind}\""));
    }
    if let Some(url) = &download.url {
        fields.push(format!(
            "[download][url] = \"{}\"",
            makefile.relativize_path(url)
        ));
    }
    for (key, value) in &download.params {
        fields.push(format!("[download][{key}] = \"{value}\""));
    }
}

fn patch_fields(fields: &mut Vec<String>, makefile: &Makefile, component: &Component) {
    for patch in component.patches() {
        fields.push(format!(
            "[patch][{}][url] = \"{}\"",
            patch.descr(),
            makefile.relativize_path(patch.url())
        ));
        if let Some(md5) = patch.md5() {
            fields.push(format!("[patch][{}][md5] = \"{md5}\"", patch.descr()));
        }
    }
}

fn write_project(output: &mut String, makefile: &Makefile, project: &Project) {
    let component = project.component();
    let mut fields = Vec::new();

    if let Some(kind) = project
        .project_type()
        .filter(|t| *t != ProjectType::Drupal)
    {
        fields.push(format!("[type] = \"{kind}\""));
    }
    if let Some(version) = project.version() {
        fields.push(format!("[version] = \"{}\"", version.short()));
    }
    if let Some(location) = project.location() {
        fields.push(format!(
            "[location] = \"{}\"",
            makefile.relativize_path(location)
        ));
    }
    download_fields(&mut fields, makefile, component);
    patch_fields(&mut fields, makefile, component);
    if let Some(path) = project.l10n_path() {
        fields.push(format!("[l10n_path] = \"{}\"", makefile.relativize_path(path)));
    }
    if let Some(url) = project.l10n_url() {
        fields.push(format!("[l10n_url] = \"{}\"", makefile.relativize_path(url)));
    }
    if component.subdir() != Path::new(".") {
        fields.push(format!("[subdir] = \"{}\"", component.subdir().display()));
    }
    let directory_name = component.directory_name();
    if directory_name != project.name() {
        fields.push(format!("[directory_name] = \"{directory_name}\""));
    }

    if fields.is_empty() {
        writeln!(output, "projects[] = \"{}\"", project.name()).unwrap();
        return;
    }
    for field in fields {
        writeln!(output, "projects[{}]{field}", project.name()).unwrap();
    }
}

fn write_library(output: &mut String, makefile: &Makefile, library: &Library) {
    let component = library.component();
    let mut fields = Vec::new();

    download_fields(&mut fields, makefile, component);
    patch_fields(&mut fields, makefile, component);
    fields.push(format!(
        "[destination] = \"{}\"",
        library.destination().display()
    ));
    if component.subdir() != Path::new(".") {
        fields.push(format!("[subdir] = \"{}\"", component.subdir().display()));
    }
    fields.push(format!("[directory_name] = \"{}\"", component.directory_name()));

    for field in fields {
        writeln!(output, "libraries[{}]{field}", library.name()).unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::VersionCore;

    #[test]
    fn test_minimal_makefile() {
        let mut mf = crate::makefile::parse_string("core = 7.x\n", Path::new("/tmp/a.make")).unwrap();
        assert_eq!(
            write_string(&mf),
            "core = 7.x\napi  = \nprojects[] = \"drupal\"\n\n"
        );

        mf.set_api("2");
        mf.add_project(Project::new("views", VersionCore::new(7)));
        assert_eq!(
            write_string(&mf),
            "core = 7.x\napi  = 2\nprojects[] = \"drupal\"\n\nprojects[] = \"views\"\n"
        );
    }

    #[test]
    fn test_project_field_order() {
        let mut mf = Makefile::new("/srv/build/site.make").unwrap();
        let mut p = Project::with_version("foo", VersionCore::new(7), "1.2").unwrap();
        p.set_project_type(ProjectType::Module);
        p.component_mut().download.kind = Some("git".to_string());
        p.component_mut().download.url = Some("file:///srv/build/src/foo".to_string());
        p.component_mut()
            .download
            .params
            .insert("tag".to_string(), "7.x-1.2".to_string());
        p.component_mut()
            .download
            .params
            .insert("branch".to_string(), "7.x-1.x".to_string());
        p.component_mut().add_patch("file:///srv/build/p/fix.diff", "fix", Some("abc".to_string()));
        p.component_mut().set_subdir("custom");
        p.component_mut().set_directory_name("foo_dir");
        mf.add_project(p);

        let expected = "\
projects[foo][type] = \"module\"
projects[foo][version] = \"1.2\"
projects[foo][download][type] = \"git\"
projects[foo][download][url] = \"src/foo\"
projects[foo][download][branch] = \"7.x-1.x\"
projects[foo][download][tag] = \"7.x-1.2\"
projects[foo][patch][fix][url] = \"p/fix.diff\"
projects[foo][patch][fix][md5] = \"abc\"
projects[foo][subdir] = \"custom\"
projects[foo][directory_name] = \"foo_dir\"
";
        assert!(write_string(&mf).ends_with(expected), "{}", write_string(&mf));
    }

    #[test]
    fn test_library_always_has_destination_and_directory() {
        let mut mf = Makefile::new("/srv/build/site.make").unwrap();
        let mut lib = Library::new("colorbox");
        lib.component_mut().download.url = Some("http://example.org/colorbox.zip".to_string());
        mf.add_library(lib);

        let text = write_string(&mf);
        assert!(text.ends_with(
            "\nlibraries[colorbox][download][type] = \"file\"\n\
             libraries[colorbox][download][url] = \"http://example.org/colorbox.zip\"\n\
             libraries[colorbox][destination] = \"libraries\"\n\
             libraries[colorbox][directory_name] = \"colorbox\"\n"
        ));
    }
}
