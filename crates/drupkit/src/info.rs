//! Detection of project metadata from `.info` files.
//!
//! Locating the main `.info` file of a project directory is not trivial:
//! the file may sit in a subdirectory, there may be several of them, and
//! its name may be unrelated to the directory name. Detection is
//! deliberately conservative and fails rather than guessing among
//! ambiguous candidates.

use crate::error::{Error, Result};
use crate::project::ProjectType;
use crate::version::{Version, VersionCore};
use regex::Regex;
use std::collections::HashMap;
use std::fs;
use std::path::{Component as PathComponent, Path, PathBuf};
use std::sync::LazyLock;
use walkdir::WalkDir;

static PROJECT_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"project\s*=\s*["']?(.+)["']?"#).expect("valid project field regex")
});

static INFO_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+)=(.+)$").expect("valid info line regex"));

static INFO_CORE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)\.x$").expect("valid info core regex"));

static STYLESHEETS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*stylesheets").expect("valid stylesheets regex"));

static REGIONS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*regions").expect("valid regions regex"));

/// Metadata detected from a project's main `.info` file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectInfo {
    /// Canonical project name
    pub name: String,
    /// Core compatibility
    pub core: VersionCore,
    /// Version, absent for development checkouts
    pub version: Option<Version>,
    /// Project type
    pub project_type: ProjectType,
    /// Whether the project ships with Drupal core
    pub core_project: bool,
    /// Project directory
    pub dir: PathBuf,
    /// Main `.info` file
    pub info_file: PathBuf,
}

impl ProjectInfo {
    /// Detect metadata from a project directory or a `.info` file.
    ///
    /// # Errors
    ///
    /// Fails when no `.info` file can be selected reliably, when it lacks a
    /// valid `core` field, or when the project type cannot be determined.
    pub fn detect(path: &Path) -> Result<Self> {
        let path = path.canonicalize()?;
        let (mut name, dir, info_file) = if path.extension().is_some_and(|e| e == "info") {
            let name = file_stem(&path);
            let parent = path.parent().unwrap_or(&path).to_path_buf();
            let dir = match parent.parent() {
                Some(grandparent) if file_name(grandparent) == name => grandparent.to_path_buf(),
                _ => parent,
            };
            (name, dir, path)
        } else {
            let name = file_name(&path);
            let (name, info_file) = identify_main_info_file(&path, name)?;
            (name, path, info_file)
        };
        log::debug!("Parsing project info from {}", info_file.display());

        let text = fs::read_to_string(&info_file)?;
        let data = read_info(&text);
        check_project_name(&mut name, &dir, &info_file, &data);

        let core = data
            .get("core")
            .and_then(|c| INFO_CORE.captures(c))
            .and_then(|caps| caps[1].parse().ok())
            .map(VersionCore::new)
            .ok_or_else(|| Error::InfoMissingCore(name.clone()))?;

        let version = data
            .get("version")
            .map(|v| Version::new(core, v))
            .transpose()?;

        let core_project = data.get("package").is_some_and(|p| contains_ci(p, "core"))
            || data.get("project").is_some_and(|p| contains_ci(p, "drupal"));

        let project_type = detect_type(&info_file, &dir, &data)
            .ok_or_else(|| Error::UndeterminedType(name.clone()))?;

        Ok(Self {
            name,
            core,
            version,
            project_type,
            core_project,
            dir,
            info_file,
        })
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(needle)
}

fn is_info(path: &Path) -> bool {
    path.is_file() && path.extension().is_some_and(|e| e == "info")
}

fn info_files_in(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut found: Vec<PathBuf> = entries
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| is_info(p))
        .collect();
    found.sort();
    found
}

/// Every `.info` file below `dir`, sorted by path.
pub(crate) fn info_files_below(dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_map(std::result::Result::ok)
        .map(walkdir::DirEntry::into_path)
        .filter(|p| is_info(p))
        .collect()
}

fn unique(mut candidates: Vec<PathBuf>) -> Option<PathBuf> {
    (candidates.len() == 1).then(|| candidates.remove(0))
}

/// Pick the main `.info` file of a project directory.
///
/// Heuristics, first success wins:
/// 1. `<dir>/<name>.info`
/// 2. `<dir>/<name>/<name>.info`
/// 3. the only `.info` file in `<dir>`
/// 4. the only `.info` file in `<dir>/<name>`
/// 5. the only `.info` file anywhere below `<dir>`
///
/// Otherwise the first `.info` file declaring a `project` field wins, and
/// the project is renamed after that field.
fn identify_main_info_file(dir: &Path, name: String) -> Result<(String, PathBuf)> {
    let nested = dir.join(&name);
    let attempts = [
        Some(dir.join(format!("{name}.info"))).filter(|p| is_info(p)),
        Some(nested.join(format!("{name}.info"))).filter(|p| is_info(p)),
        unique(info_files_in(dir)),
        unique(info_files_in(&nested)),
        unique(info_files_below(dir)),
    ];
    if let Some(found) = attempts.into_iter().flatten().next() {
        return Ok((file_stem(&found), found));
    }

    for candidate in info_files_below(dir) {
        let Ok(text) = fs::read_to_string(&candidate) else {
            continue;
        };
        if let Some(caps) = PROJECT_FIELD.captures(&text) {
            let declared = caps[1].trim().trim_matches(|c| c == '"' || c == '\'');
            if !declared.is_empty() {
                return Ok((declared.to_string(), candidate));
            }
        }
    }

    Err(Error::InfoNotDetected(name))
}

/// Simple `key = value` pairs of an `.info` file.
fn read_info(text: &str) -> HashMap<String, String> {
    let mut data = HashMap::new();
    for line in text.lines() {
        let trimmed = line.trim_start();
        if trimmed.is_empty() || trimmed.starts_with(';') {
            continue;
        }
        if let Some(caps) = INFO_LINE.captures(line) {
            let key = caps[1].trim().to_string();
            let value = caps[2]
                .trim()
                .trim_start_matches(['"', '\''])
                .trim_end_matches(['"', '\''])
                .to_string();
            data.insert(key, value);
        }
    }
    if STYLESHEETS.is_match(text) {
        data.insert("stylesheets".to_string(), String::new());
    }
    if REGIONS.is_match(text) {
        data.insert("regions".to_string(), String::new());
    }
    data
}

/// Adopt the declared `project` field when the `.info` file name diverges
/// from the directory name (e.g. `googleanalytics.info` in
/// `google_analytics/`).
fn check_project_name(
    name: &mut String,
    dir: &Path,
    info_file: &Path,
    data: &HashMap<String, String>,
) {
    let dirname = file_name(dir);
    if *name == dirname {
        return;
    }
    let sibling = info_file
        .parent()
        .unwrap_or(dir)
        .join(format!("{dirname}.info"));
    if sibling.exists() {
        return;
    }
    if let Some(declared) = data.get("project")
        && (*declared == file_stem(info_file) || *declared == dirname)
    {
        name.clone_from(declared);
    }
}

fn detect_type(
    info_file: &Path,
    dir: &Path,
    data: &HashMap<String, String>,
) -> Option<ProjectType> {
    if info_file.with_extension("profile").exists() {
        return Some(ProjectType::Profile);
    }
    if info_file.with_extension("module").exists() {
        return Some(ProjectType::Module);
    }
    let theme_keys = ["engine", "Base theme", "base theme", "stylesheets", "regions"];
    if theme_keys.iter().any(|k| data.contains_key(*k)) {
        return Some(ProjectType::Theme);
    }

    // Last resort: the innermost category directory in the path.
    dir.components().rev().find_map(|c| match c {
        PathComponent::Normal(s) => match s.to_str()? {
            "modules" => Some(ProjectType::Module),
            "themes" => Some(ProjectType::Theme),
            "profiles" => Some(ProjectType::Profile),
            _ => None,
        },
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::Stability;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_detect_module_from_directory() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("views");
        write(&dir, "views.info", "name = Views\ncore = 7.x\nversion = \"7.x-3.1\"\n");
        write(&dir, "views.module", "<?php\n");
        write(&dir, "views_ui.info", "name = Views UI\ncore = 7.x\n");

        let info = ProjectInfo::detect(&dir).unwrap();
        assert_eq!(info.name, "views");
        assert_eq!(info.core, VersionCore::new(7));
        assert_eq!(info.version.unwrap().long(), "7.x-3.1");
        assert_eq!(info.project_type, ProjectType::Module);
        assert!(!info.core_project);
    }

    #[test]
    fn test_single_info_file_renames_project() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("sites/all/modules/renamed_dir");
        write(&dir, "actual.info", "core = 7.x\n");
        write(&dir, "actual.module", "<?php\n");

        let info = ProjectInfo::detect(&dir).unwrap();
        assert_eq!(info.name, "actual");
    }

    #[test]
    fn test_ambiguous_info_files_fail() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("bundle");
        write(&dir, "one.info", "core = 7.x\n");
        write(&dir, "two.info", "core = 7.x\n");

        let err = ProjectInfo::detect(&dir).unwrap_err();
        assert!(matches!(err, Error::InfoNotDetected(ref n) if n == "bundle"));
    }

    #[test]
    fn test_project_field_resolves_ambiguity() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("modules/bundle");
        write(&dir, "one.info", "core = 7.x\n");
        write(&dir, "two.info", "core = 7.x\nproject = \"bundle_project\"\n");

        let info = ProjectInfo::detect(&dir).unwrap();
        assert_eq!(info.name, "bundle_project");
        assert!(info.info_file.ends_with("two.info"));
    }

    #[test]
    fn test_project_field_fixes_diverging_name() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("google_analytics");
        write(
            &dir,
            "googleanalytics.info",
            "core = 7.x\nproject = \"google_analytics\"\n",
        );
        write(&dir, "googleanalytics.module", "<?php\n");

        let info = ProjectInfo::detect(&dir).unwrap();
        assert_eq!(info.name, "google_analytics");
    }

    #[test]
    fn test_info_path_uses_grandparent_for_nested_layout() {
        let tmp = TempDir::new().unwrap();
        let info_path = tmp.path().join("zen/zen/zen.info");
        write(tmp.path(), "zen/zen/zen.info", "core = 7.x\nengine = phptemplate\n");

        let info = ProjectInfo::detect(&info_path).unwrap();
        assert_eq!(info.dir, tmp.path().canonicalize().unwrap().join("zen"));
        assert_eq!(info.project_type, ProjectType::Theme);
    }

    #[test]
    fn test_core_project_and_theme_by_regions() {
        let tmp = TempDir::new().unwrap();
        write(
            tmp.path(),
            "themes/bartik/bartik.info",
            "core = 7.x\npackage = Core\nversion = \"7.12\"\nregions[header] = Header\n",
        );
        let info = ProjectInfo::detect(&tmp.path().join("themes/bartik")).unwrap();
        assert!(info.core_project);
        assert_eq!(info.project_type, ProjectType::Theme);
        assert_eq!(info.version.unwrap().short(), "7.12");
    }

    #[test]
    fn test_type_from_enclosing_directory() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "modules/simpletest/tests/foo.info", "core = 7.x\n");
        let info = ProjectInfo::detect(&tmp.path().join("modules/simpletest/tests/foo.info")).unwrap();
        assert_eq!(info.project_type, ProjectType::Module);
    }

    #[test]
    fn test_missing_core_fails() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "foo/foo.info", "name = Foo\n");
        write(tmp.path(), "foo/foo.module", "<?php\n");
        let err = ProjectInfo::detect(&tmp.path().join("foo")).unwrap_err();
        assert!(matches!(err, Error::InfoMissingCore(_)));
    }

    #[test]
    fn test_undetermined_type_fails() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "foo/foo.info", "core = 7.x\n");
        let err = ProjectInfo::detect(&tmp.path().join("foo")).unwrap_err();
        assert!(matches!(err, Error::UndeterminedType(_)));
    }

    #[test]
    fn test_dev_version() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "modules/foo/foo.info", "core = 7.x\nversion = 7.x-2.x-dev\n");
        let info = ProjectInfo::detect(&tmp.path().join("modules/foo")).unwrap();
        let version = info.version.unwrap();
        assert!(version.is_development_snapshot());
        assert_eq!(version.stability(), Stability::Development);
    }
}
