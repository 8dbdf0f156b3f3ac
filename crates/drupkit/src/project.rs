//! Drupal projects: core, modules, themes and installation profiles.

use crate::component::Component;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::info::{ProjectInfo, info_files_below};
use crate::tree::Filter;
use crate::version::{Version, VersionCore, best_release};
use regex::Regex;
use std::cmp::Ordering;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;

static DEPENDENCY_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*dependencies\s*\[\s*\]\s*=\s*["']?([^\s("']+)"#)
        .expect("valid dependency regex")
});

static BASE_THEME_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*base +theme\s*=\s*(.+)$").expect("valid base theme regex"));

/// Cache subdirectory for projects.
const PROJECT_KIND: &str = "Project";

/// Subtrees governed by an embedded makefile.
pub(crate) const BUILD_DIRS: [&str; 4] = ["/libraries", "/modules", "/profiles", "/themes"];

/// Default profiles shipped with Drupal 6 and 7.
pub(crate) const CORE_PROFILES: [&str; 4] = [
    "/profiles/default",
    "/profiles/minimal",
    "/profiles/standard",
    "/profiles/testing",
];

/// Files below `sites/` that belong to the core distribution.
pub(crate) const CORE_SITE_FILES: [&str; 2] =
    ["/sites/all/README.txt", "/sites/default/default.settings.php"];

/// The kind of a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProjectType {
    /// Drupal core itself
    Drupal,
    /// A module
    Module,
    /// A theme
    Theme,
    /// An installation profile
    Profile,
}

impl ProjectType {
    /// Lowercase name, as used in makefiles.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Drupal => "drupal",
            Self::Module => "module",
            Self::Theme => "theme",
            Self::Profile => "profile",
        }
    }

    /// Category directory (`modules`, `themes`, `profiles`).
    pub fn category_dir(&self) -> String {
        format!("{}s", self.as_str())
    }
}

impl FromStr for ProjectType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "drupal" => Ok(Self::Drupal),
            "module" => Ok(Self::Module),
            "theme" => Ok(Self::Theme),
            "profile" => Ok(Self::Profile),
            other => Err(Error::Other(format!("unknown project type: {other}"))),
        }
    }
}

impl fmt::Display for ProjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A Drupal project scoped to a core compatibility line.
#[derive(Debug, Clone)]
pub struct Project {
    component: Component,
    core: VersionCore,
    version: Option<Version>,
    project_type: Option<ProjectType>,
    core_project: bool,
    location: Option<String>,
    l10n_path: Option<String>,
    l10n_url: Option<String>,
    info_file: Option<PathBuf>,
}

impl Project {
    /// Create a project without a version.
    ///
    /// A project named `drupal` is Drupal core.
    pub fn new(name: impl Into<String>, core: VersionCore) -> Self {
        let component = Component::new(name);
        let is_drupal = component.name() == "drupal";
        Self {
            component,
            core,
            version: None,
            project_type: is_drupal.then_some(ProjectType::Drupal),
            core_project: is_drupal,
            location: None,
            l10n_path: None,
            l10n_url: None,
            info_file: None,
        }
    }

    /// Create a project with a short version string such as `3.1`.
    pub fn with_version(name: impl Into<String>, core: VersionCore, short: &str) -> Result<Self> {
        let mut project = Self::new(name, core);
        project.version = Some(Version::new(core, short)?);
        Ok(project)
    }

    /// The project name.
    pub fn name(&self) -> &str {
        self.component.name()
    }

    /// The shared component state.
    pub fn component(&self) -> &Component {
        &self.component
    }

    /// Mutable access to the shared component state.
    pub fn component_mut(&mut self) -> &mut Component {
        &mut self.component
    }

    /// Core compatibility.
    pub fn core(&self) -> VersionCore {
        self.core
    }

    /// The version, if known.
    pub fn version(&self) -> Option<&Version> {
        self.version.as_ref()
    }

    /// Whether a version is known.
    pub fn has_version(&self) -> bool {
        self.version.is_some()
    }

    /// Assign a version.
    ///
    /// # Errors
    ///
    /// Returns `Error::IncompatibleVersion` if the version belongs to another core.
    pub fn set_version(&mut self, version: Version) -> Result<()> {
        if version.core() != self.core {
            return Err(Error::IncompatibleVersion {
                project: self.extended_name(),
                version: version.long(),
            });
        }
        self.version = Some(version);
        Ok(())
    }

    /// Forget the version.
    pub fn clear_version(&mut self) {
        self.version = None;
    }

    /// The project type, if known.
    pub fn project_type(&self) -> Option<ProjectType> {
        self.project_type
    }

    /// Set the project type.
    pub fn set_project_type(&mut self, project_type: ProjectType) {
        self.project_type = Some(project_type);
    }

    /// Whether this is Drupal core.
    pub fn is_drupal(&self) -> bool {
        self.project_type == Some(ProjectType::Drupal)
    }

    /// Whether this is an installation profile.
    pub fn is_profile(&self) -> bool {
        self.project_type == Some(ProjectType::Profile)
    }

    /// Whether the project ships with Drupal core.
    pub fn is_core_project(&self) -> bool {
        self.core_project
    }

    /// Mark the project as part of Drupal core.
    pub fn set_core_project(&mut self, core_project: bool) {
        self.core_project = core_project;
    }

    /// Release-history location override.
    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    /// Set the release-history location.
    pub fn set_location(&mut self, location: impl Into<String>) {
        self.location = Some(location.into());
    }

    /// Translation path override.
    pub fn l10n_path(&self) -> Option<&str> {
        self.l10n_path.as_deref()
    }

    /// Set the translation path.
    pub fn set_l10n_path(&mut self, path: impl Into<String>) {
        self.l10n_path = Some(path.into());
    }

    /// Translation server URL override.
    pub fn l10n_url(&self) -> Option<&str> {
        self.l10n_url.as_deref()
    }

    /// Set the translation server URL.
    pub fn set_l10n_url(&mut self, url: impl Into<String>) {
        self.l10n_url = Some(url.into());
    }

    /// Main `.info` file of the local copy, once detected.
    pub fn info_file(&self) -> Option<&Path> {
        self.info_file.as_deref()
    }

    /// Whether a local copy exists.
    pub fn exists(&self) -> bool {
        self.component.exists()
    }

    /// Location of the local copy.
    pub fn local_path(&self) -> Option<&Path> {
        self.component.local_path()
    }

    /// Whether the project has patches.
    pub fn has_patches(&self) -> bool {
        self.component.has_patches()
    }

    /// Name and version, e.g. `views-7.x-3.1`, `drupal-7.14` or `views-7.x`.
    pub fn extended_name(&self) -> String {
        match &self.version {
            Some(v) if self.is_drupal() => format!("{}-{}", self.name(), v.short()),
            Some(v) => format!("{}-{}", self.name(), v.long()),
            None => format!("{}-{}", self.name(), self.core),
        }
    }

    /// Whether fetching should first look up the newest release.
    ///
    /// True when the project has no version, is not local and has no
    /// explicit download type.
    pub fn needs_release_lookup(&self) -> bool {
        let download = &self.component.download;
        !self.has_version()
            && download.kind.is_none()
            && !download
                .url
                .as_deref()
                .is_some_and(|u| u.starts_with("file://"))
    }

    /// Move to the best release published after the current version.
    ///
    /// The version is left untouched when no better release exists.
    ///
    /// # Errors
    ///
    /// Fails when the release history cannot be queried.
    pub fn update_version(&mut self, ctx: &Context) -> Result<()> {
        let releases = ctx.releases().releases(self.name(), self.core)?;
        let candidates = releases
            .iter()
            .filter_map(|r| Version::new(self.core, r).ok());
        if let Some(best) = best_release(candidates, self.version.as_ref()) {
            self.version = Some(best);
            log::debug!("Version updated: {}", self.extended_name());
        }
        Ok(())
    }

    /// Where the cached copy lives.
    pub fn cached_location(&self, ctx: &Context) -> PathBuf {
        self.component
            .cached_location(ctx, PROJECT_KIND, &self.extended_name())
    }

    /// Stage a local copy in the cache.
    ///
    /// A versioned project without a download type is served from the
    /// cache when possible; anything else is downloaded again. Metadata is
    /// then reloaded from the staged copy, except for Drupal core. Callers
    /// wanting the newest release call [`Project::update_version`] first.
    pub fn fetch(&mut self, ctx: &Context) -> Result<()> {
        let extended_name = self.extended_name();
        let cached = self.cached_location(ctx);
        let download = &self.component.download;

        if self.has_version() && download.kind.is_none() && cached.exists() {
            log::debug!("{extended_name} is cached");
            self.component.set_local_path(cached);
        } else {
            let source = match (&download.kind, &download.url) {
                (_, Some(url)) => url.clone(),
                (Some(kind), None) if kind == "git" => {
                    format!("http://git.drupal.org/project/{}.git", self.name())
                }
                (Some(_), None) => {
                    return Err(Error::FetchFailed {
                        name: extended_name,
                        message: "no download URL specified".to_string(),
                    });
                }
                (None, None) => extended_name.clone(),
            };
            self.component
                .fetch_from(ctx, &cached, source, &extended_name)?;
        }

        if !self.is_drupal() {
            self.reload_project_info()?;
        }
        Ok(())
    }

    /// Apply the project's patches to a copy of the cached tree.
    pub fn patch(&mut self, ctx: &Context) -> Result<()> {
        let extended_name = self.extended_name();
        self.component.patch(ctx, PROJECT_KIND, &extended_name)
    }

    /// Refresh type, version and core flag from the local copy.
    ///
    /// # Errors
    ///
    /// Fails when the local copy's metadata names another project or core.
    pub fn reload_project_info(&mut self) -> Result<()> {
        let path = self.component.staged_path()?.to_path_buf();
        let info = ProjectInfo::detect(&path)?;
        if info.name != self.name() {
            return Err(Error::Inconsistent {
                field: "naming",
                expected: self.name().to_string(),
                found: info.name,
            });
        }
        if info.core != self.core {
            return Err(Error::Inconsistent {
                field: "core",
                expected: self.core.to_string(),
                found: info.core.to_string(),
            });
        }
        self.project_type = Some(info.project_type);
        self.core_project = info.core_project;
        self.version = info.version;
        self.info_file = Some(info.info_file);
        Ok(())
    }

    pub(crate) fn apply_info(&mut self, info: ProjectInfo) {
        self.project_type = Some(info.project_type);
        self.core_project = info.core_project;
        self.version = info.version;
        self.info_file = Some(info.info_file);
        self.component.set_local_path(info.dir);
    }

    /// Names of the extensions this project depends on.
    ///
    /// With `subprojects` every `.info` file of the local copy is scanned;
    /// otherwise only the main one. The project itself is never listed.
    pub fn dependencies(&self, subprojects: bool) -> Result<Vec<String>> {
        let Some(local) = self.local_path().filter(|p| p.exists()) else {
            return Ok(Vec::new());
        };
        let info_files = if subprojects {
            info_files_below(local)
        } else {
            match self.info_file.as_deref().filter(|p| p.exists()) {
                Some(info) => vec![info.to_path_buf()],
                None => vec![ProjectInfo::detect(local)?.info_file],
            }
        };

        let mut deps: Vec<String> = Vec::new();
        for info in info_files {
            let text = fs::read_to_string(&info)?;
            for line in text.lines() {
                if let Some(caps) = DEPENDENCY_LINE.captures(line) {
                    deps.push(caps[1].trim().to_string());
                }
                if let Some(caps) = BASE_THEME_LINE.captures(line) {
                    deps.push(
                        caps[1]
                            .trim()
                            .trim_start_matches(['"', '\''])
                            .trim_end_matches(['"', '\''])
                            .to_string(),
                    );
                }
            }
        }

        let mut seen = std::collections::HashSet::new();
        deps.retain(|d| d != self.name() && seen.insert(d.clone()));
        Ok(deps)
    }

    /// The project name plus every bundled extension (`.info` basenames).
    pub fn extensions(&self) -> Vec<String> {
        let mut names = vec![self.name().to_string()];
        if let Some(local) = self.local_path().filter(|p| p.exists()) {
            for info in info_files_below(local) {
                if let Some(stem) = info.file_stem() {
                    let stem = stem.to_string_lossy().into_owned();
                    if !names.contains(&stem) {
                        names.push(stem);
                    }
                }
            }
        }
        names
    }

    /// Install path relative to the default location (`modules/views`, or
    /// `.` for Drupal core).
    ///
    /// # Errors
    ///
    /// Returns `Error::UndefinedType` when the type is unknown.
    pub fn target_path(&self) -> Result<PathBuf> {
        match self.project_type {
            Some(ProjectType::Drupal) => Ok(PathBuf::from(".")),
            Some(kind) => {
                let mut path = PathBuf::from(kind.category_dir());
                if self.component.subdir() != Path::new(".") {
                    path.push(self.component.subdir());
                }
                path.push(self.component.directory_name());
                Ok(path)
            }
            None => Err(Error::UndefinedType(self.name().to_string())),
        }
    }

    /// An embedded makefile: `<name>.make` or `drupal-org.make`.
    pub fn makefile(&self) -> Option<PathBuf> {
        let local = self.local_path().filter(|p| p.exists())?;
        [
            local.join(format!("{}.make", self.name())),
            local.join("drupal-org.make"),
        ]
        .into_iter()
        .find(|p| p.exists())
    }

    /// Rules that scope a comparison of this project's tree with `other`.
    ///
    /// Subtrees managed by an embedded makefile on either side are left
    /// out; for Drupal core, only the default profiles and site files are
    /// compared.
    pub fn compare_filter(&self, other: &Project) -> Filter {
        let mut filter = Filter::new();
        if self.makefile().is_some() || other.makefile().is_some() {
            filter = BUILD_DIRS.iter().fold(filter, |f, d| f.exclude(d));
        }
        if self.is_drupal() {
            filter = CORE_PROFILES.iter().fold(filter, |f, p| f.include(p));
            filter = filter.exclude("/profiles");
            filter = CORE_SITE_FILES.iter().fold(filter, |f, p| f.include(p));
            filter = filter.exclude("/sites");
        }
        filter
    }

    /// Rules for deploying this project's tree over an installed copy.
    ///
    /// Subtrees managed by an embedded makefile are never deleted. Drupal
    /// core keeps everything under `profiles/` and `sites/` except the
    /// files it ships itself. Ignored paths are left alone.
    pub fn mirror_filter(&self) -> Filter {
        let mut filter = Filter::with_default_exclusions();
        if self.is_drupal() {
            filter = CORE_PROFILES.iter().fold(filter, |f, p| f.risk(p));
            filter = filter.protect("/profiles");
            filter = CORE_SITE_FILES.iter().fold(filter, |f, p| f.risk(p));
            filter = filter.protect("/sites");
        } else if self.makefile().is_some() {
            filter = BUILD_DIRS.iter().fold(filter, |f, d| f.protect(d));
        }
        self.component
            .ignore_paths()
            .iter()
            .fold(filter, |f, p| f.exclude(&format!("/{}", p.display())))
    }

    /// Compare this project's tree with another project's.
    pub fn file_level_compare_with(&self, other: &Project) -> Result<Vec<String>> {
        self.component
            .file_level_compare_with(&other.component, &self.compare_filter(other))
    }
}

impl PartialEq for Project {
    fn eq(&self, other: &Self) -> bool {
        self.name() == other.name() && self.core == other.core && self.version == other.version
    }
}

impl PartialOrd for Project {
    /// `None` for differently named projects, or when a version is missing
    /// on either side within the same core.
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self.name() != other.name() {
            return None;
        }
        match self.core.cmp(&other.core) {
            Ordering::Equal => self.version.as_ref()?.partial_cmp(other.version.as_ref()?),
            ordering => Some(ordering),
        }
    }
}

impl fmt::Display for Project {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.extended_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MockFetcher, MockReleases};
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn seven() -> VersionCore {
        VersionCore::new(7)
    }

    #[test]
    fn test_extended_name() {
        let views = Project::with_version("views", seven(), "3.1").unwrap();
        assert_eq!(views.extended_name(), "views-7.x-3.1");
        let drupal = Project::with_version("drupal", seven(), "7.14").unwrap();
        assert_eq!(drupal.extended_name(), "drupal-7.14");
        assert!(drupal.is_drupal());
        assert!(drupal.is_core_project());
        assert_eq!(Project::new("ctools", seven()).extended_name(), "ctools-7.x");
    }

    #[test]
    fn test_incompatible_version_rejected() {
        let mut p = Project::new("views", seven());
        let v8 = Version::from_long("8.x-3.0").unwrap();
        assert!(matches!(p.set_version(v8), Err(Error::IncompatibleVersion { .. })));
        assert!(!p.has_version());
    }

    #[test]
    fn test_project_ordering() {
        let old = Project::with_version("ctools", seven(), "0.9").unwrap();
        let new = Project::with_version("ctools", seven(), "1.0").unwrap();
        let unversioned = Project::new("ctools", seven());
        let other = Project::with_version("views", seven(), "1.0").unwrap();

        assert_eq!(new.partial_cmp(&old), Some(Ordering::Greater));
        assert_eq!(old.partial_cmp(&new), Some(Ordering::Less));
        assert_eq!(new.partial_cmp(&unversioned), None);
        assert_eq!(new.partial_cmp(&other), None);
        assert_eq!(new, Project::with_version("ctools", seven(), "1.0").unwrap());
    }

    #[test]
    fn test_target_path() {
        let mut p = Project::new("views", seven());
        assert!(matches!(p.target_path(), Err(Error::UndefinedType(_))));
        p.set_project_type(ProjectType::Module);
        assert_eq!(p.target_path().unwrap(), PathBuf::from("modules/views"));
        p.component_mut().set_subdir("contrib");
        assert_eq!(p.target_path().unwrap(), PathBuf::from("modules/contrib/views"));
        let drupal = Project::new("drupal", seven());
        assert_eq!(drupal.target_path().unwrap(), PathBuf::from("."));
    }

    #[test]
    fn test_dependencies_and_extensions() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("views");
        write(
            &dir,
            "views.info",
            "core = 7.x\ndependencies[] = ctools\ndependencies[] = \"views\"\n",
        );
        write(&dir, "views.module", "<?php\n");
        write(
            &dir,
            "views_ui/views_ui.info",
            "core = 7.x\ndependencies[] = ctools\ndependencies[] = entity (>=1.0)\n",
        );
        write(&dir, "theme/sub.info", "core = 7.x\nbase theme = \"zen\"\n");

        let mut p = Project::new("views", seven());
        p.component_mut().set_local_path(&dir);
        assert_eq!(p.dependencies(true).unwrap(), vec!["zen", "ctools", "entity"]);
        assert_eq!(p.dependencies(false).unwrap(), vec!["ctools"]);

        let mut extensions = p.extensions();
        extensions.sort();
        assert_eq!(extensions, vec!["sub", "views", "views_ui"]);
    }

    #[test]
    fn test_makefile_detection_and_compare_filter() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("myprofile");
        write(&dir, "myprofile.info", "core = 7.x\n");
        write(&dir, "myprofile.profile", "<?php\n");
        let mut p = Project::new("myprofile", seven());
        p.component_mut().set_local_path(&dir);
        assert!(p.makefile().is_none());

        let plain = Project::new("myprofile", seven());
        assert_eq!(
            p.compare_filter(&plain)
                .first_match(Path::new("modules/views/views.info")),
            None
        );

        write(&dir, "drupal-org.make", "core = 7.x\n");
        assert_eq!(p.makefile(), Some(dir.join("drupal-org.make")));
        assert_eq!(
            p.compare_filter(&plain)
                .first_match(Path::new("modules/views/views.info")),
            Some(crate::tree::RuleKind::Exclude)
        );
    }

    #[test]
    fn test_compare_skips_build_dirs_when_only_installed_has_makefile() {
        let tmp = TempDir::new().unwrap();
        let desired_dir = tmp.path().join("cache/myprofile");
        let installed_dir = tmp.path().join("platform/myprofile");
        for dir in [&desired_dir, &installed_dir] {
            write(dir, "myprofile.info", "core = 7.x\n");
            write(dir, "myprofile.profile", "<?php\n");
        }
        write(&installed_dir, "myprofile.make", "core = 7.x\n");
        write(&installed_dir, "modules/views/views.info", "core = 7.x\n");

        let mut desired = Project::new("myprofile", seven());
        desired.component_mut().set_local_path(&desired_dir);
        let mut installed = Project::new("myprofile", seven());
        installed.component_mut().set_local_path(&installed_dir);
        assert!(desired.makefile().is_none());

        let diff = desired.file_level_compare_with(&installed).unwrap();
        assert_eq!(diff, vec!["*deleting   myprofile.make"]);
    }

    #[test]
    fn test_update_version_picks_best_stable_release() {
        let releases = MockReleases::new();
        releases.add("views", ["7.x-3.0", "7.x-3.1", "7.x-3.2-beta1", "7.x-4.x-dev"]);
        let ctx = Context::system("/nonexistent").with_releases(releases);

        let mut p = Project::new("views", seven());
        assert!(p.needs_release_lookup());
        p.update_version(&ctx).unwrap();
        assert_eq!(p.version().unwrap().long(), "7.x-3.1");
        assert!(!p.needs_release_lookup());
    }

    #[test]
    fn test_update_version_failure_keeps_version() {
        let releases = MockReleases::new();
        releases.fail("views");
        let ctx = Context::system("/nonexistent").with_releases(releases);

        let mut p = Project::with_version("views", seven(), "3.0").unwrap();
        assert!(p.update_version(&ctx).is_err());
        assert_eq!(p.version().unwrap().short(), "3.0");
    }

    #[test]
    fn test_fetch_reloads_project_info() {
        let cache = TempDir::new().unwrap();
        let fixtures = TempDir::new().unwrap();
        write(
            fixtures.path(),
            "views/views.info",
            "core = 7.x\nversion = \"7.x-3.1\"\n",
        );
        write(fixtures.path(), "views/views.module", "<?php\n");

        let fetcher = MockFetcher::new();
        fetcher.serve("views", fixtures.path().join("views"));
        let ctx = Context::system(cache.path()).with_fetcher(fetcher.clone());

        let mut p = Project::with_version("views", seven(), "3.1").unwrap();
        p.fetch(&ctx).unwrap();
        assert_eq!(p.project_type(), Some(ProjectType::Module));
        assert!(p.local_path().unwrap().starts_with(cache.path()));

        // Versioned and cached: no second download.
        let mut again = Project::with_version("views", seven(), "3.1").unwrap();
        again.fetch(&ctx).unwrap();
        assert_eq!(fetcher.fetch_count("views"), 1);
    }

    #[test]
    fn test_fetch_detects_inconsistent_naming() {
        let cache = TempDir::new().unwrap();
        let fixtures = TempDir::new().unwrap();
        write(fixtures.path(), "other/other.info", "core = 7.x\n");
        write(fixtures.path(), "other/other.module", "<?php\n");

        let fetcher = MockFetcher::new();
        fetcher.serve("views", fixtures.path().join("other"));
        let ctx = Context::system(cache.path()).with_fetcher(fetcher);

        // The staged directory is named after the project, so detection
        // resolves the single .info file and reports its name.
        let mut p = Project::with_version("views", seven(), "3.1").unwrap();
        let err = p.fetch(&ctx).unwrap_err();
        assert!(matches!(err, Error::Inconsistent { field: "naming", .. }), "{err}");
    }

    #[test]
    fn test_git_without_url_uses_drupal_org() {
        let cache = TempDir::new().unwrap();
        let fixtures = TempDir::new().unwrap();
        write(fixtures.path(), "tao/tao.info", "core = 7.x\nengine = phptemplate\n");

        let fetcher = MockFetcher::new();
        fetcher.serve("tao", fixtures.path().join("tao"));
        let ctx = Context::system(cache.path()).with_fetcher(fetcher.clone());

        let mut p = Project::new("tao", seven());
        p.component_mut().download.kind = Some("git".to_string());
        assert!(!p.needs_release_lookup());
        p.fetch(&ctx).unwrap();
        assert_eq!(
            fetcher.requests()[0].source,
            "http://git.drupal.org/project/tao.git"
        );
        assert_eq!(p.project_type(), Some(ProjectType::Theme));
    }
}
