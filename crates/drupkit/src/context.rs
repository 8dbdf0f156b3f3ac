//! Explicit runtime configuration shared by fetch, analysis and sync.

use crate::backend::{
    Drush, Fetcher, Patcher, ReleaseHistory, SiteOracle, SystemFetcher, SystemPatcher,
};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// The download cache location plus the collaborators that reach outside
/// the process.
///
/// Cloning is cheap: collaborators are shared.
#[derive(Clone)]
pub struct Context {
    cache_dir: PathBuf,
    fetcher: Arc<dyn Fetcher>,
    patcher: Arc<dyn Patcher>,
    site: Arc<dyn SiteOracle>,
    releases: Arc<dyn ReleaseHistory>,
}

impl Context {
    /// A context wired to the real tools, with drush looked up in PATH.
    pub fn system(cache_dir: impl Into<PathBuf>) -> Self {
        Self::with_system_drush(cache_dir, Drush::detect())
    }

    /// A context wired to the real tools and the given drush.
    pub fn with_system_drush(cache_dir: impl Into<PathBuf>, drush: Drush) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            fetcher: Arc::new(SystemFetcher::new(drush.clone())),
            patcher: Arc::new(SystemPatcher::new()),
            site: Arc::new(drush.clone()),
            releases: Arc::new(drush),
        }
    }

    /// Replace the fetcher.
    #[must_use]
    pub fn with_fetcher(mut self, fetcher: impl Fetcher + 'static) -> Self {
        self.fetcher = Arc::new(fetcher);
        self
    }

    /// Replace the patcher.
    #[must_use]
    pub fn with_patcher(mut self, patcher: impl Patcher + 'static) -> Self {
        self.patcher = Arc::new(patcher);
        self
    }

    /// Replace the site oracle.
    #[must_use]
    pub fn with_site(mut self, site: impl SiteOracle + 'static) -> Self {
        self.site = Arc::new(site);
        self
    }

    /// Replace the release history.
    #[must_use]
    pub fn with_releases(mut self, releases: impl ReleaseHistory + 'static) -> Self {
        self.releases = Arc::new(releases);
        self
    }

    /// Root of the download cache.
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// The fetcher.
    pub fn fetcher(&self) -> &dyn Fetcher {
        self.fetcher.as_ref()
    }

    /// The patcher.
    pub fn patcher(&self) -> &dyn Patcher {
        self.patcher.as_ref()
    }

    /// The site oracle.
    pub fn site(&self) -> &dyn SiteOracle {
        self.site.as_ref()
    }

    /// The release history.
    pub fn releases(&self) -> &dyn ReleaseHistory {
        self.releases.as_ref()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("cache_dir", &self.cache_dir)
            .finish_non_exhaustive()
    }
}
