//! Analysis of an installed Drupal platform.
//!
//! A [`Platform`] is a Drupal code base on disk. Analysis detects the core
//! version from the bootstrap files and turns every `.info` file found in
//! the usual locations into a [`PlatformProject`].

use crate::context::Context;
use crate::error::{Error, Result};
use crate::info::ProjectInfo;
use crate::project::{Project, ProjectType};
use crate::tree;
use crate::version::{Version, VersionCore};
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write;
use std::fs;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use walkdir::WalkDir;

static VERSION_DEFINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"define.*'VERSION'.*'(.+)'").expect("valid VERSION regex"));

static LEADING_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)\.").expect("valid core number regex"));

/// Files that may define the core `VERSION` constant.
const BOOTSTRAP_FILES: [&str; 3] = [
    "core/includes/bootstrap.inc",
    "includes/bootstrap.inc",
    "modules/system/system.module",
];

/// A Drupal code base.
#[derive(Debug, Clone)]
pub struct Platform {
    root: PathBuf,
    sites_dir: PathBuf,
    contrib_path: PathBuf,
    drupal_project: Option<Project>,
    projects: BTreeMap<String, PlatformProject>,
}

impl Platform {
    /// Bind to the platform at `path`, which must exist.
    ///
    /// Nothing is scanned until [`Platform::analyze`] is called.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            root: path.as_ref().canonicalize()?,
            sites_dir: PathBuf::from("sites"),
            contrib_path: PathBuf::from("sites/all"),
            drupal_project: None,
            projects: BTreeMap::new(),
        })
    }

    /// Absolute path of the platform.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Contrib path relative to the root, `sites/all` by default.
    pub fn contrib_path(&self) -> &Path {
        &self.contrib_path
    }

    /// Change the contrib path.
    pub fn set_contrib_path(&mut self, path: impl Into<PathBuf>) {
        self.contrib_path = path.into();
    }

    /// Absolute path of the sites directory.
    pub fn sites_path(&self) -> PathBuf {
        self.root.join(&self.sites_dir)
    }

    /// Names of the sites, `all` excluded, in name order.
    pub fn site_names(&self) -> Vec<String> {
        let Ok(entries) = fs::read_dir(self.sites_path()) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .filter_map(std::result::Result::ok)
            .filter(|e| e.path().is_dir())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|n| n != "all")
            .collect();
        names.sort();
        names
    }

    /// Absolute path of the shared libraries directory.
    pub fn libraries_path(&self) -> PathBuf {
        self.root.join(&self.contrib_path).join("libraries")
    }

    /// Where `project` belongs, relative to the root.
    ///
    /// Core projects and profiles live at their target path; everything
    /// else lives below the contrib path.
    pub fn dest_path(&self, project: &Project) -> Result<PathBuf> {
        let target = project.target_path()?;
        if project.is_core_project() || project.is_profile() {
            Ok(target)
        } else {
            Ok(self.contrib_path.join(target))
        }
    }

    /// Names of the installation profiles in `profiles/`.
    pub fn profiles(&self) -> Vec<String> {
        let mut names: Vec<String> = WalkDir::new(self.root.join("profiles"))
            .min_depth(2)
            .max_depth(2)
            .into_iter()
            .filter_map(std::result::Result::ok)
            .map(walkdir::DirEntry::into_path)
            .filter(|p| p.is_file() && p.extension().is_some_and(|e| e == "profile"))
            .filter_map(|p| p.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .collect();
        names.sort();
        names
    }

    /// The detected Drupal core project.
    pub fn drupal_project(&self) -> Option<&Project> {
        self.drupal_project.as_ref()
    }

    /// The core version, detecting it if needed.
    pub fn version(&mut self) -> Option<&Version> {
        if !self.drupal_project.as_ref().is_some_and(Project::has_version) {
            self.load_drupal_version();
        }
        self.drupal_project.as_ref().and_then(Project::version)
    }

    /// Look up a contrib or core project (not Drupal itself).
    pub fn get_project(&self, name: &str) -> Option<&PlatformProject> {
        self.projects.get(name)
    }

    /// Whether a project, or Drupal core, has this name.
    pub fn has_project(&self, name: &str) -> bool {
        self.projects.contains_key(name)
            || self.drupal_project.as_ref().is_some_and(|d| d.name() == name)
    }

    /// Contrib projects in name order.
    pub fn projects(&self) -> impl Iterator<Item = &PlatformProject> {
        self.projects.values().filter(|p| !p.is_core_project())
    }

    /// Core projects in name order.
    pub fn core_projects(&self) -> impl Iterator<Item = &PlatformProject> {
        self.projects.values().filter(|p| p.is_core_project())
    }

    /// Names of the contrib projects.
    pub fn project_names(&self) -> Vec<String> {
        self.projects().map(|p| p.name().to_string()).collect()
    }

    /// Names of the core projects.
    pub fn core_project_names(&self) -> Vec<String> {
        self.core_projects().map(|p| p.name().to_string()).collect()
    }

    /// Whether the given site, or any site when `None`, is bootstrapped.
    pub fn is_bootstrapped(&self, ctx: &Context, site: Option<&str>) -> bool {
        let sites = site.map_or_else(|| self.site_names(), |s| vec![s.to_string()]);
        sites
            .iter()
            .map(|s| self.sites_path().join(s))
            .filter(|p| p.exists())
            .any(|p| ctx.site().is_bootstrapped(&p))
    }

    /// Scan the platform for Drupal core and its projects.
    pub fn analyze(&mut self) -> Result<()> {
        log::info!("Analyzing {}", self.root.display());
        self.drupal_project = None;
        self.load_drupal_version();
        self.analyze_projects()?;
        Ok(())
    }

    fn load_drupal_version(&mut self) -> bool {
        for file in BOOTSTRAP_FILES {
            let path = self.root.join(file);
            let Ok(text) = fs::read_to_string(&path) else {
                continue;
            };
            let Some(raw) = VERSION_DEFINE.captures(&text).map(|c| c[1].to_string()) else {
                continue;
            };
            log::debug!("Drupal version detected: {raw}");
            let Some(core) = LEADING_NUMBER
                .captures(&raw)
                .and_then(|c| c[1].parse().ok())
                .map(VersionCore::new)
            else {
                continue;
            };
            match Project::with_version("drupal", core, &raw) {
                Ok(mut drupal) => {
                    drupal.component_mut().set_local_path(&self.root);
                    self.drupal_project = Some(drupal);
                    return true;
                }
                Err(e) => log::warn!("Unusable Drupal version {raw}: {e}"),
            }
        }
        log::debug!("Unable to detect version of Drupal at {}", self.root.display());
        false
    }

    /// Directories searched for `.info` files, with their maximum depth.
    fn search_roots(&self) -> Vec<(PathBuf, Option<usize>)> {
        let contrib = self.root.join(&self.contrib_path);
        let mut roots = vec![
            (self.root.join("modules"), None),
            (self.root.join("themes"), None),
            (self.root.join("profiles"), Some(2)),
            (contrib.join("modules"), None),
            (contrib.join("themes"), None),
        ];
        let mut seen = BTreeSet::new();
        roots.retain(|(dir, _)| seen.insert(dir.clone()));
        roots
    }

    fn analyze_projects(&mut self) -> Result<usize> {
        self.projects.clear();
        let mut count = 0;
        for (dir, max_depth) in self.search_roots() {
            if !dir.is_dir() {
                continue;
            }
            let mut walker = WalkDir::new(&dir).sort_by_file_name();
            if let Some(depth) = max_depth {
                walker = walker.min_depth(depth).max_depth(depth);
            }
            for entry in walker {
                let path = entry?.into_path();
                if !(path.is_file() && path.extension().is_some_and(|e| e == "info")) {
                    continue;
                }
                match PlatformProject::new(self, &path) {
                    Ok(project) => {
                        self.projects.insert(project.name().to_string(), project);
                        count += 1;
                    }
                    Err(e) => log::warn!("Skipping {}: {e}", path.display()),
                }
            }
        }
        log::debug!("{count} projects found in {}", self.root.display());
        Ok(count)
    }

    /// Dependencies of every project, keyed by project name.
    ///
    /// Contrib projects contribute the dependencies of their main `.info`
    /// file; core projects contribute those of all their `.info` files, test
    /// modules excluded.
    pub fn dependency_graph(&self) -> Result<BTreeMap<String, Vec<String>>> {
        let mut graph = BTreeMap::new();
        for project in self.projects() {
            graph.insert(project.name().to_string(), project.dependencies(false)?);
        }
        for project in self.core_projects() {
            if project.name().contains("test") {
                continue;
            }
            graph.insert(project.name().to_string(), project.dependencies(true)?);
        }
        Ok(graph)
    }

    /// The dependency graph in Graphviz DOT format.
    pub fn to_dot(&self) -> Result<String> {
        let graph = self.dependency_graph()?;
        let mut dot = String::from("digraph platform {\n");
        for (name, deps) in &graph {
            let _ = writeln!(dot, "  \"{name}\";");
            for dep in deps {
                let _ = writeln!(dot, "  \"{name}\" -> \"{dep}\";");
            }
        }
        dot.push_str("}\n");
        Ok(dot)
    }
}

/// A project found inside a platform.
///
/// Dereferences to the underlying [`Project`].
#[derive(Debug, Clone)]
pub struct PlatformProject {
    project: Project,
    root: PathBuf,
    contrib_path: PathBuf,
    sites_path: PathBuf,
}

impl PlatformProject {
    /// Build a project from a directory or `.info` file inside `platform`.
    ///
    /// # Errors
    ///
    /// Fails when the metadata cannot be detected.
    pub fn new(platform: &Platform, path: &Path) -> Result<Self> {
        let info = ProjectInfo::detect(path)?;
        let mut project = Project::new(info.name.clone(), info.core);
        project.apply_info(info);

        let mut platform_project = Self {
            project,
            root: platform.root.clone(),
            contrib_path: platform.contrib_path.clone(),
            sites_path: platform.sites_path(),
        };
        let subdir = platform_project.subdir()?;
        platform_project.project.component_mut().set_subdir(subdir);
        Ok(platform_project)
    }

    /// The project.
    pub fn project(&self) -> &Project {
        &self.project
    }

    /// Take the project out.
    pub fn into_project(self) -> Project {
        self.project
    }

    /// Location relative to the platform root.
    pub fn relative_path(&self) -> PathBuf {
        let local = self.project.local_path().unwrap_or(&self.root);
        tree::relative_path(local, &self.root)
    }

    /// The subdirectory below the category directory, e.g. `contrib` for
    /// `sites/all/modules/contrib/views`, or `.` when there is none.
    pub fn subdir(&self) -> Result<PathBuf> {
        let kind = self
            .project
            .project_type()
            .ok_or_else(|| Error::UndefinedType(self.project.name().to_string()))?;
        let category = if self.project.is_core_project() || kind == ProjectType::Profile {
            self.root.join(kind.category_dir())
        } else {
            self.root.join(&self.contrib_path).join(kind.category_dir())
        };
        let parent = self
            .project
            .local_path()
            .and_then(Path::parent)
            .unwrap_or(&self.root);
        Ok(tree::relative_path(parent, &category))
    }

    /// Whether the project is an installed module or enabled theme in the
    /// given site, or in any site when `None`.
    pub fn is_installed(&self, ctx: &Context, site: Option<&str>) -> bool {
        let sites = match site {
            Some(s) => vec![s.to_string()],
            None => site_names_in(&self.sites_path),
        };
        sites
            .iter()
            .map(|s| self.sites_path.join(s))
            .filter(|p| p.exists())
            .any(|p| ctx.site().is_installed(&p, self.project.name()))
    }
}

impl Deref for PlatformProject {
    type Target = Project;

    fn deref(&self) -> &Project {
        &self.project
    }
}

impl DerefMut for PlatformProject {
    fn deref_mut(&mut self) -> &mut Project {
        &mut self.project
    }
}

fn site_names_in(sites_path: &Path) -> Vec<String> {
    let Ok(entries) = fs::read_dir(sites_path) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .filter_map(std::result::Result::ok)
        .filter(|e| e.path().is_dir())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|n| n != "all")
        .collect();
    names.sort();
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockSite;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    /// A small Drupal 7 tree.
    fn fixture() -> TempDir {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        write(root, "includes/bootstrap.inc", "<?php\ndefine('VERSION', '7.14');\n");
        write(root, "modules/node/node.info", "core = 7.x\npackage = Core\n");
        write(root, "modules/node/node.module", "<?php\n");
        write(
            root,
            "modules/node/tests/node_test.info",
            "core = 7.x\npackage = Testing\nproject = drupal\n",
        );
        write(root, "modules/node/tests/node_test.module", "<?php\n");
        write(
            root,
            "modules/system/system.info",
            "core = 7.x\npackage = Core\ndependencies[] = node\n",
        );
        write(root, "modules/system/system.module", "<?php\n");
        write(root, "themes/bartik/bartik.info", "core = 7.x\npackage = Core\nengine = phptemplate\n");
        write(root, "profiles/standard/standard.info", "core = 7.x\npackage = Core\n");
        write(root, "profiles/standard/standard.profile", "<?php\n");
        write(
            root,
            "sites/all/modules/contrib/views/views.info",
            "core = 7.x\nversion = \"7.x-3.1\"\ndependencies[] = ctools\n",
        );
        write(root, "sites/all/modules/contrib/views/views.module", "<?php\n");
        write(
            root,
            "sites/all/modules/ctools/ctools.info",
            "core = 7.x\nversion = \"7.x-1.0\"\n",
        );
        write(root, "sites/all/modules/ctools/ctools.module", "<?php\n");
        write(root, "sites/all/themes/zen/zen.info", "core = 7.x\nengine = phptemplate\n");
        write(root, "sites/all/modules/broken/broken.info", "name = Broken\n");
        write(root, "sites/default/settings.php", "<?php\n");
        write(root, "sites/example.com/settings.php", "<?php\n");
        tmp
    }

    #[test]
    fn test_analyze() {
        let tmp = fixture();
        let mut platform = Platform::new(tmp.path()).unwrap();
        platform.analyze().unwrap();

        assert_eq!(platform.version().unwrap().short(), "7.14");
        assert!(platform.has_project("drupal"));
        assert_eq!(platform.project_names(), ["ctools", "views", "zen"]);
        assert_eq!(
            platform.core_project_names(),
            ["bartik", "node", "node_test", "standard", "system"]
        );
        assert_eq!(platform.site_names(), ["default", "example.com"]);
        assert_eq!(platform.profiles(), ["standard"]);
        assert!(platform.get_project("broken").is_none());
    }

    #[test]
    fn test_platform_project_paths() {
        let tmp = fixture();
        let mut platform = Platform::new(tmp.path()).unwrap();
        platform.analyze().unwrap();

        let views = platform.get_project("views").unwrap();
        assert_eq!(views.relative_path(), PathBuf::from("sites/all/modules/contrib/views"));
        assert_eq!(views.subdir().unwrap(), PathBuf::from("contrib"));
        assert_eq!(
            platform.dest_path(views).unwrap(),
            PathBuf::from("sites/all/modules/contrib/views")
        );

        let ctools = platform.get_project("ctools").unwrap();
        assert_eq!(ctools.subdir().unwrap(), PathBuf::from("."));
        assert_eq!(ctools.version().unwrap().long(), "7.x-1.0");

        let node_test = platform.get_project("node_test").unwrap();
        assert_eq!(node_test.subdir().unwrap(), PathBuf::from("node"));

        let standard = platform.get_project("standard").unwrap();
        assert!(standard.is_profile());
        assert_eq!(platform.dest_path(standard).unwrap(), PathBuf::from("profiles/standard"));
    }

    #[test]
    fn test_dest_path_for_new_projects() {
        let tmp = fixture();
        let platform = Platform::new(tmp.path()).unwrap();
        let mut token = Project::new("token", VersionCore::new(7));
        assert!(platform.dest_path(&token).is_err());
        token.set_project_type(ProjectType::Module);
        assert_eq!(
            platform.dest_path(&token).unwrap(),
            PathBuf::from("sites/all/modules/token")
        );
        assert_eq!(platform.libraries_path(), platform.root().join("sites/all/libraries"));
    }

    #[test]
    fn test_bootstrapped_and_installed() {
        let tmp = fixture();
        let mut platform = Platform::new(tmp.path()).unwrap();
        platform.analyze().unwrap();

        let site = MockSite::new();
        site.bootstrap("example.com");
        site.install("example.com", "views");
        let ctx = Context::system("/nonexistent").with_site(site);

        assert!(platform.is_bootstrapped(&ctx, None));
        assert!(platform.is_bootstrapped(&ctx, Some("example.com")));
        assert!(!platform.is_bootstrapped(&ctx, Some("default")));
        assert!(!platform.is_bootstrapped(&ctx, Some("missing")));

        let views = platform.get_project("views").unwrap();
        assert!(views.is_installed(&ctx, None));
        assert!(!views.is_installed(&ctx, Some("default")));
        assert!(!platform.get_project("ctools").unwrap().is_installed(&ctx, None));
    }

    #[test]
    fn test_dependency_graph() {
        let tmp = fixture();
        let mut platform = Platform::new(tmp.path()).unwrap();
        platform.analyze().unwrap();

        let graph = platform.dependency_graph().unwrap();
        assert_eq!(graph["views"], ["ctools"]);
        assert_eq!(graph["system"], ["node"]);
        assert!(!graph.contains_key("node_test"));

        let dot = platform.to_dot().unwrap();
        assert!(dot.starts_with("digraph platform {\n"));
        assert!(dot.contains("  \"views\" -> \"ctools\";\n"));
        assert!(dot.contains("  \"node\";\n"));
    }

    #[test]
    fn test_no_core_detected() {
        let tmp = TempDir::new().unwrap();
        let mut platform = Platform::new(tmp.path()).unwrap();
        platform.analyze().unwrap();
        assert!(platform.version().is_none());
        assert!(platform.project_names().is_empty());
    }
}
