//! In-memory backends for tests.
//!
//! Every mock is cheap to clone and clones share state, so a test can hand
//! one copy to a [`Context`](crate::Context) and inspect the other.

use super::{FetchRequest, Fetcher, Patcher, ReleaseHistory, SiteOracle};
use crate::error::{Error, Result};
use crate::tree;
use crate::version::VersionCore;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Serves fixture directories instead of downloading.
///
/// Trees are looked up by the name of the component being fetched, files
/// by URL.
#[derive(Debug, Clone, Default)]
pub struct MockFetcher {
    trees: Arc<Mutex<HashMap<String, PathBuf>>>,
    files: Arc<Mutex<HashMap<String, PathBuf>>>,
    failing: Arc<Mutex<HashSet<String>>>,
    requests: Arc<Mutex<Vec<FetchRequest>>>,
}

impl MockFetcher {
    /// Create a fetcher serving nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve a copy of `dir` whenever `name` is fetched.
    pub fn serve(&self, name: &str, dir: impl AsRef<Path>) {
        lock(&self.trees).insert(name.to_string(), dir.as_ref().to_path_buf());
    }

    /// Serve a copy of `file` whenever `url` is downloaded.
    pub fn serve_file(&self, url: &str, file: impl AsRef<Path>) {
        lock(&self.files).insert(url.to_string(), file.as_ref().to_path_buf());
    }

    /// Make every fetch of `name` fail.
    pub fn fail(&self, name: &str) {
        lock(&self.failing).insert(name.to_string());
    }

    /// How many times `name` was requested.
    pub fn fetch_count(&self, name: &str) -> usize {
        lock(&self.requests).iter().filter(|r| r.name == name).count()
    }

    /// Every request received, in order.
    pub fn requests(&self) -> Vec<FetchRequest> {
        lock(&self.requests).clone()
    }
}

impl Fetcher for MockFetcher {
    fn fetch(&self, request: &FetchRequest) -> Result<PathBuf> {
        lock(&self.requests).push(request.clone());
        if lock(&self.failing).contains(&request.name) {
            return Err(Error::Network(format!("{} is unavailable", request.source)));
        }
        let fixture = lock(&self.trees)
            .get(&request.name)
            .cloned()
            .ok_or_else(|| Error::FetchFailed {
                name: request.name.clone(),
                message: format!("no fixture for {}", request.source),
            })?;

        let staged = request.staged_path();
        if staged.exists() {
            fs::remove_dir_all(&staged)?;
        }
        tree::copy_tree(&fixture, &staged)?;
        Ok(staged)
    }

    fn download(&self, url: &str, dest_file: &Path) -> Result<()> {
        let fixture = lock(&self.files)
            .get(url)
            .cloned()
            .ok_or_else(|| Error::Network(format!("{url}: not found")))?;
        if let Some(parent) = dest_file.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(fixture, dest_file)?;
        Ok(())
    }
}

/// Records patches instead of applying them.
///
/// Each accepted patch appends its file name to `PATCHES.txt` in the working
/// tree, so patched trees differ from pristine ones.
#[derive(Debug, Clone, Default)]
pub struct MockPatcher {
    applied: Arc<Mutex<Vec<PathBuf>>>,
    rejected: Arc<Mutex<HashSet<String>>>,
}

impl MockPatcher {
    /// Create a patcher accepting everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Patch files applied so far.
    pub fn applied(&self) -> Vec<PathBuf> {
        lock(&self.applied).clone()
    }

    /// Refuse the patch file with this name.
    pub fn reject(&self, file_name: &str) {
        lock(&self.rejected).insert(file_name.to_string());
    }
}

impl Patcher for MockPatcher {
    fn apply(&self, patch_file: &Path, working_dir: &Path) -> Result<()> {
        let name = patch_file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if lock(&self.rejected).contains(&name) {
            return Err(Error::PatchFailed {
                patch: name,
                message: "rejected".to_string(),
            });
        }
        let mut marker = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(working_dir.join("PATCHES.txt"))?;
        writeln!(marker, "{name}")?;
        lock(&self.applied).push(patch_file.to_path_buf());
        Ok(())
    }
}

/// Site state keyed by the name of the site directory (`default`,
/// `example.com`).
#[derive(Debug, Clone, Default)]
pub struct MockSite {
    bootstrapped: Arc<Mutex<HashSet<String>>>,
    installed: Arc<Mutex<HashSet<(String, String)>>>,
}

impl MockSite {
    /// Create an oracle where nothing is bootstrapped.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a site as bootstrapped.
    pub fn bootstrap(&self, site: &str) {
        lock(&self.bootstrapped).insert(site.to_string());
    }

    /// Mark a project as installed in a site. The site counts as
    /// bootstrapped too.
    pub fn install(&self, site: &str, name: &str) {
        self.bootstrap(site);
        lock(&self.installed).insert((site.to_string(), name.to_string()));
    }
}

fn site_key(site_path: &Path) -> String {
    site_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

impl SiteOracle for MockSite {
    fn is_bootstrapped(&self, site_path: &Path) -> bool {
        lock(&self.bootstrapped).contains(&site_key(site_path))
    }

    fn is_installed(&self, site_path: &Path, name: &str) -> bool {
        lock(&self.installed).contains(&(site_key(site_path), name.to_string()))
    }
}

/// Release history held in memory.
///
/// Unknown projects have no releases.
#[derive(Debug, Clone, Default)]
pub struct MockReleases {
    releases: Arc<Mutex<HashMap<String, Vec<String>>>>,
    failing: Arc<Mutex<HashSet<String>>>,
}

impl MockReleases {
    /// Create an empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish releases of `name`.
    pub fn add<I, S>(&self, name: &str, releases: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        lock(&self.releases)
            .entry(name.to_string())
            .or_default()
            .extend(releases.into_iter().map(Into::into));
    }

    /// Make every lookup of `name` fail.
    pub fn fail(&self, name: &str) {
        lock(&self.failing).insert(name.to_string());
    }
}

impl ReleaseHistory for MockReleases {
    fn releases(&self, name: &str, core: VersionCore) -> Result<Vec<String>> {
        if lock(&self.failing).contains(name) {
            return Err(Error::Network(format!(
                "release history of {name} for {core} is unavailable"
            )));
        }
        Ok(lock(&self.releases).get(name).cloned().unwrap_or_default())
    }
}
