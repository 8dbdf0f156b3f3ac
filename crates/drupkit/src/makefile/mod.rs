//! Drush makefiles: the declarative description of a Drupal platform.
//!
//! A makefile lists the core version, the contributed projects and the
//! external libraries of a platform, one key path per line:
//! ```text
//! core = 7.x
//! api = 2
//! projects[drupal][version] = "7.14"
//! projects[views][version] = "3.1"
//! projects[calendar][patch][rfc-fixes][url] = "http://example.org/rfc.diff"
//! libraries[jquery_ui][download][type] = "file"
//! ```
//!
//! Relative paths in `url`, `location` and patch values are resolved
//! against the makefile's directory when parsing, and made relative again
//! when writing, so that loading and saving an unmodified makefile
//! reproduces it byte for byte.

pub mod parser;
pub mod writer;

pub use parser::{parse_file, parse_string};
pub use writer::{write_file, write_string};

use crate::component::Library;
use crate::error::Result;
use crate::project::Project;
use crate::tree;
use crate::version::VersionCore;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// A parsed makefile.
#[derive(Debug, Clone)]
pub struct Makefile {
    path: PathBuf,
    core: Option<VersionCore>,
    api: Option<String>,
    projects: BTreeMap<String, Project>,
    libraries: BTreeMap<String, Library>,
    contrib_path: PathBuf,
    warnings: Vec<String>,
}

impl Makefile {
    /// An empty makefile bound to `path`, which need not exist yet.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            path: std::path::absolute(path.as_ref())?,
            core: None,
            api: None,
            projects: BTreeMap::new(),
            libraries: BTreeMap::new(),
            contrib_path: PathBuf::from("sites/all"),
            warnings: Vec::new(),
        })
    }

    /// Parse the makefile at `path`.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read, lacks the `core` field or contains
    /// a malformed line.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        parse_file(path.as_ref())
    }

    /// Parse the file again, discarding every in-memory change.
    pub fn reload(&mut self) -> Result<()> {
        let contrib_path = self.contrib_path.clone();
        *self = parse_file(&self.path)?;
        self.contrib_path = contrib_path;
        Ok(())
    }

    /// Absolute path of the makefile.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory containing the makefile.
    pub fn dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("/"))
    }

    /// The declared core, e.g. `7.x`.
    pub fn core(&self) -> Option<VersionCore> {
        self.core
    }

    /// The declared API version.
    pub fn api(&self) -> Option<&str> {
        self.api.as_deref()
    }

    /// Set the API version.
    pub fn set_api(&mut self, api: impl Into<String>) {
        self.api = Some(api.into());
    }

    /// Where contrib projects go, relative to the platform root.
    pub fn contrib_path(&self) -> &Path {
        &self.contrib_path
    }

    /// Change the contrib path.
    pub fn set_contrib_path(&mut self, path: impl Into<PathBuf>) {
        self.contrib_path = path.into();
    }

    /// Non-fatal problems found while parsing.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Add or replace a project.
    pub fn add_project(&mut self, project: Project) {
        self.projects.insert(project.name().to_string(), project);
    }

    /// Look up a project (including `drupal`).
    pub fn get_project(&self, name: &str) -> Option<&Project> {
        self.projects.get(name)
    }

    /// Mutable lookup of a project.
    pub fn get_project_mut(&mut self, name: &str) -> Option<&mut Project> {
        self.projects.get_mut(name)
    }

    /// Remove a project, returning it.
    pub fn delete_project(&mut self, name: &str) -> Option<Project> {
        self.projects.remove(name)
    }

    /// Contrib projects in name order, Drupal core excluded.
    pub fn projects(&self) -> impl Iterator<Item = &Project> {
        self.projects.values().filter(|p| !p.is_drupal())
    }

    /// The Drupal core project, if the makefile declares one.
    pub fn drupal_project(&self) -> Option<&Project> {
        self.projects.get("drupal")
    }

    /// Names of the contrib projects, in name order.
    pub fn project_names(&self) -> Vec<String> {
        self.projects().map(|p| p.name().to_string()).collect()
    }

    /// Add or replace a library.
    pub fn add_library(&mut self, library: Library) {
        self.libraries.insert(library.name().to_string(), library);
    }

    /// Look up a library.
    pub fn get_library(&self, name: &str) -> Option<&Library> {
        self.libraries.get(name)
    }

    /// Mutable lookup of a library.
    pub fn get_library_mut(&mut self, name: &str) -> Option<&mut Library> {
        self.libraries.get_mut(name)
    }

    /// Libraries in name order.
    pub fn libraries(&self) -> impl Iterator<Item = &Library> {
        self.libraries.values()
    }

    /// Names of the libraries, in name order.
    pub fn library_names(&self) -> Vec<String> {
        self.libraries.keys().cloned().collect()
    }

    /// Write the makefile to its own path, or to `alt_path`.
    pub fn save(&self, alt_path: Option<&Path>) -> Result<()> {
        write_file(self, alt_path.unwrap_or(&self.path))
    }

    /// Turn a makefile value into an absolute reference.
    ///
    /// URLs are kept; paths become `file://` URLs resolved against the
    /// makefile's directory.
    pub(crate) fn normalize_path(&self, value: &str) -> String {
        normalize_path(value, self.dir())
    }

    /// Inverse of [`Makefile::normalize_path`].
    pub(crate) fn relativize_path(&self, value: &str) -> String {
        match value.strip_prefix("file://") {
            Some(local) => tree::relative_path(Path::new(local), self.dir())
                .to_string_lossy()
                .into_owned(),
            None => value.to_string(),
        }
    }
}

impl fmt::Display for Makefile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&write_string(self))
    }
}

pub(crate) fn normalize_path(value: &str, dir: &Path) -> String {
    if value.contains("://") {
        value.to_string()
    } else if value.starts_with('/') {
        format!("file://{value}")
    } else {
        format!("file://{}", dir.join(value).display())
    }
}
