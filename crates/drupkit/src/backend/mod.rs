//! Collaborators used to download, patch and query Drupal code.
//!
//! The synchronization engine only talks to these traits. The real
//! implementations shell out to the usual tools (git, svn, patch, drush) or
//! use an HTTP client; the [`mock`] module provides in-memory replacements
//! for tests.
//!
//! # Testing
//!
//! ```
//! use drupkit::backend::{MockReleases, ReleaseHistory};
//! use drupkit::VersionCore;
//!
//! let releases = MockReleases::new();
//! releases.add("views", ["7.x-3.0", "7.x-3.1"]);
//!
//! let found = releases.releases("views", VersionCore::new(7)).unwrap();
//! assert_eq!(found.len(), 2);
//! ```

pub mod drush;
pub mod fetch;
pub mod mock;
pub mod patch;

pub use drush::Drush;
pub use fetch::{Strategy, SystemFetcher};
pub use mock::{MockFetcher, MockPatcher, MockReleases, MockSite};
pub use patch::SystemPatcher;

use crate::error::{Error, Result};
use crate::version::VersionCore;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;

/// What to download and where to stage it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    /// URL, local path or drush project specification (e.g. `views-7.x-3.1`)
    pub source: String,
    /// Explicit download type (`git`, `file`, ...); detected from the source when absent
    pub kind: Option<String>,
    /// Directory receiving the staged tree
    pub dest_dir: PathBuf,
    /// Name of the staged directory inside `dest_dir`
    pub name: String,
    /// Extra download parameters (`branch`, `tag`, `revision`, `post_data`, ...)
    pub params: BTreeMap<String, String>,
}

impl FetchRequest {
    /// Path the staged tree is expected at.
    pub fn staged_path(&self) -> PathBuf {
        self.dest_dir.join(&self.name)
    }

    /// Look up a download parameter.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }
}

/// Downloads versioned trees and single files.
pub trait Fetcher: Send + Sync {
    /// Fetch and stage a tree, returning the staged path.
    ///
    /// A failed fetch must not leave a partial artifact at the staged path.
    fn fetch(&self, request: &FetchRequest) -> Result<PathBuf>;

    /// Download a single file (e.g. a patch) to `dest_file`.
    fn download(&self, url: &str, dest_file: &Path) -> Result<()>;
}

/// Applies patch files to a working tree.
pub trait Patcher: Send + Sync {
    /// Apply `patch_file` inside `working_dir`.
    ///
    /// # Errors
    ///
    /// Returns `Error::PatchFailed` if no strategy could apply the patch.
    fn apply(&self, patch_file: &Path, working_dir: &Path) -> Result<()>;
}

/// Answers questions about the live state of Drupal sites.
pub trait SiteOracle: Send + Sync {
    /// Whether the site at `site_path` is bootstrapped.
    fn is_bootstrapped(&self, site_path: &Path) -> bool;

    /// Whether `name` is an installed module or an enabled theme in the site
    /// at `site_path`.
    fn is_installed(&self, site_path: &Path, name: &str) -> bool;
}

/// Lists the published releases of a project.
pub trait ReleaseHistory: Send + Sync {
    /// Raw version strings of every release of `name` for `core`.
    fn releases(&self, name: &str, core: VersionCore) -> Result<Vec<String>>;
}

/// Run a command, merging stdout and stderr into the returned text.
///
/// A non-zero exit status yields `Error::CommandFailed` carrying the output.
pub(crate) fn run_command(program: &Path, args: &[&str], cwd: Option<&Path>) -> Result<String> {
    let mut command = Command::new(program);
    command.args(args);
    if let Some(dir) = cwd {
        command.current_dir(dir);
    }
    log::debug!("Running {} {}", program.display(), args.join(" "));

    let output = command.output().map_err(|e| Error::CommandFailed {
        message: format!("failed to execute {}: {e}", program.display()),
        stderr: String::new(),
    })?;

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    if !output.status.success() {
        return Err(Error::CommandFailed {
            message: format!("{} {} exited with {}", program.display(), args.join(" "), output.status),
            stderr: format!("{stdout}{stderr}"),
        });
    }
    Ok(format!("{stdout}{stderr}"))
}

/// Locate an executable in PATH.
pub(crate) fn find_tool(name: &str) -> Result<PathBuf> {
    which::which(name).map_err(|_| Error::ToolNotFound(name.to_string()))
}
