//! Downloadable components: the shared state of projects and libraries.
//!
//! A [`Component`] knows where its code comes from, where its cached copy
//! lives and which patches must be applied to it. [`crate::Project`] and
//! [`Library`] wrap a component and add what is specific to them.

use crate::backend::FetchRequest;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::tree::{self, Filter};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Where a component is downloaded from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Download {
    /// Source URL (`file://` for local paths)
    pub url: Option<String>,
    /// Download type, e.g. `git` or `file`
    pub kind: Option<String>,
    /// Extra parameters such as `branch`, `revision` or `md5`
    pub params: BTreeMap<String, String>,
}

/// A patch to apply after fetching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Patch {
    url: String,
    descr: String,
    md5: Option<String>,
    cached_location: Option<PathBuf>,
}

impl Patch {
    /// Create a patch from its URL and description.
    pub fn new(url: impl Into<String>, descr: impl Into<String>, md5: Option<String>) -> Self {
        Self {
            url: url.into(),
            descr: descr.into(),
            md5,
            cached_location: None,
        }
    }

    /// The patch URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The description (the patch key in a makefile).
    pub fn descr(&self) -> &str {
        &self.descr
    }

    /// The declared checksum, if any.
    pub fn md5(&self) -> Option<&str> {
        self.md5.as_deref()
    }

    /// Where the patch was downloaded, once fetched.
    pub fn cached_location(&self) -> Option<&Path> {
        self.cached_location.as_deref()
    }

    fn file_name(&self) -> &str {
        self.url.rsplit('/').next().unwrap_or(&self.url)
    }

    fn label(&self) -> String {
        if self.descr.is_empty() || self.descr == self.file_name() {
            self.file_name().to_string()
        } else {
            format!("{} ({})", self.file_name(), self.descr)
        }
    }

    /// Download the patch into `dir`.
    pub fn fetch(&mut self, ctx: &Context, dir: &Path) -> Result<()> {
        let dest = dir.join(self.file_name());
        log::info!("Fetching patch {}", self.file_name());
        ctx.fetcher()
            .download(&self.url, &dest)
            .map_err(|e| Error::FetchFailed {
                name: format!("patch {}", self.file_name()),
                message: e.to_string(),
            })?;
        log::debug!("Patch downloaded into {}", dest.display());
        self.cached_location = Some(dest);
        Ok(())
    }

    /// Apply the fetched patch inside `dir`.
    pub fn apply(&self, ctx: &Context, dir: &Path) -> Result<()> {
        let file = self
            .cached_location
            .as_deref()
            .filter(|p| p.exists())
            .ok_or_else(|| Error::PatchFailed {
                patch: self.label(),
                message: "patch not fetched".to_string(),
            })?;
        ctx.patcher().apply(file, dir).map_err(|e| match e {
            Error::PatchFailed { message, .. } => Error::PatchFailed {
                patch: self.label(),
                message,
            },
            other => other,
        })
    }
}

/// State shared by everything that can be fetched, patched and compared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Component {
    name: String,
    /// Download source
    pub download: Download,
    /// The makefile `overwrite` flag
    pub overwrite: bool,
    local_path: Option<PathBuf>,
    subdir: Option<PathBuf>,
    directory_name: Option<String>,
    ignore_paths: Vec<PathBuf>,
    patches: Vec<Patch>,
}

impl Component {
    /// Create a component with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            download: Download::default(),
            overwrite: false,
            local_path: None,
            subdir: None,
            directory_name: None,
            ignore_paths: Vec::new(),
            patches: Vec::new(),
        }
    }

    /// The component's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Location of the local copy, if any.
    pub fn local_path(&self) -> Option<&Path> {
        self.local_path.as_deref()
    }

    /// Point the component at a local copy.
    pub fn set_local_path(&mut self, path: impl Into<PathBuf>) {
        self.local_path = Some(path.into());
    }

    /// Whether a local copy exists on disk.
    pub fn exists(&self) -> bool {
        self.local_path.as_deref().is_some_and(Path::exists)
    }

    /// Subdirectory of the default install location (`.` when unset).
    pub fn subdir(&self) -> &Path {
        self.subdir.as_deref().unwrap_or_else(|| Path::new("."))
    }

    /// Set the install subdirectory.
    pub fn set_subdir(&mut self, subdir: impl Into<PathBuf>) {
        self.subdir = Some(subdir.into());
    }

    /// The directory name: the override, else the local copy's basename,
    /// else the component name.
    pub fn directory_name(&self) -> String {
        if let Some(dir) = &self.directory_name {
            return dir.clone();
        }
        if self.exists()
            && let Some(base) = self.local_path.as_deref().and_then(Path::file_name)
        {
            return base.to_string_lossy().into_owned();
        }
        self.name.clone()
    }

    /// Override the directory name.
    pub fn set_directory_name(&mut self, name: impl Into<String>) {
        self.directory_name = Some(name.into());
    }

    /// Paths, relative to the local copy, left out of comparisons.
    pub fn ignore_paths(&self) -> &[PathBuf] {
        &self.ignore_paths
    }

    /// Leave a relative path out of comparisons and deployments.
    pub fn ignore_path(&mut self, rel: impl Into<PathBuf>) {
        self.ignore_paths.push(rel.into());
    }

    /// Add a patch.
    pub fn add_patch(&mut self, url: impl Into<String>, descr: impl Into<String>, md5: Option<String>) {
        self.patches.push(Patch::new(url, descr, md5));
    }

    /// The first patch with the given description.
    pub fn get_patch(&self, descr: &str) -> Option<&Patch> {
        self.patches.iter().find(|p| p.descr == descr)
    }

    /// Patches in declaration order.
    pub fn patches(&self) -> &[Patch] {
        &self.patches
    }

    /// Whether any patch is declared.
    pub fn has_patches(&self) -> bool {
        !self.patches.is_empty()
    }

    /// Drop every patch.
    pub fn clear_patches(&mut self) {
        self.patches.clear();
    }

    /// Cache location: `<cache>/<kind>/<extended name>/<download type>/<name>`.
    pub fn cached_location(&self, ctx: &Context, kind: &str, extended_name: &str) -> PathBuf {
        ctx.cache_dir()
            .join(kind)
            .join(extended_name)
            .join(self.download.kind.as_deref().unwrap_or("default"))
            .join(&self.name)
    }

    /// Where the patched copy lives, next to the cached one.
    pub fn patched_location(&self, ctx: &Context, kind: &str, extended_name: &str) -> PathBuf {
        let cached = self.cached_location(ctx, kind, extended_name);
        cached
            .parent()
            .unwrap_or(ctx.cache_dir())
            .join("__patches")
            .join(&self.name)
    }

    /// Whether the local copy is the patched one.
    pub fn is_patched(&self, ctx: &Context, kind: &str, extended_name: &str) -> bool {
        self.local_path.as_deref() == Some(self.patched_location(ctx, kind, extended_name).as_path())
    }

    /// Use the cached copy if present, otherwise download from the URL.
    pub fn fetch(&mut self, ctx: &Context, kind: &str, extended_name: &str) -> Result<()> {
        let cached = self.cached_location(ctx, kind, extended_name);
        if cached.exists() {
            log::debug!("{extended_name} is cached");
            self.local_path = Some(cached);
            return Ok(());
        }
        let url = self.download.url.clone().ok_or_else(|| Error::FetchFailed {
            name: extended_name.to_string(),
            message: "no download URL specified".to_string(),
        })?;
        self.fetch_from(ctx, &cached, url, extended_name)
    }

    /// Download `source` so that it is staged at `cached`.
    pub(crate) fn fetch_from(
        &mut self,
        ctx: &Context,
        cached: &Path,
        source: String,
        extended_name: &str,
    ) -> Result<()> {
        log::info!("Fetching {extended_name}");
        let dest_dir = cached.parent().unwrap_or(ctx.cache_dir()).to_path_buf();
        let request = FetchRequest {
            source,
            kind: self.download.kind.clone(),
            dest_dir,
            name: self.name.clone(),
            params: self.download.params.clone(),
        };
        let staged = ctx.fetcher().fetch(&request)?;
        self.local_path = Some(staged);
        Ok(())
    }

    /// Copy the local tree aside and apply every patch to the copy.
    ///
    /// The local path is redirected to the patched copy. Does nothing when
    /// no patch is declared.
    pub fn patch(&mut self, ctx: &Context, kind: &str, extended_name: &str) -> Result<()> {
        let source = match &self.local_path {
            Some(path) if path.exists() => path.clone(),
            _ => {
                return Err(Error::NotStaged {
                    name: extended_name.to_string(),
                    path: self.local_path.clone().unwrap_or_default(),
                });
            }
        };
        if self.patches.is_empty() {
            return Ok(());
        }

        let patched = self.patched_location(ctx, kind, extended_name);
        if patched.exists() {
            fs::remove_dir_all(&patched)?;
        }
        tree::copy_tree(&source, &patched)?;
        self.local_path = Some(patched.clone());

        let patch_dir = patched.parent().unwrap_or(ctx.cache_dir()).to_path_buf();
        for patch in &mut self.patches {
            patch.fetch(ctx, &patch_dir)?;
        }
        for patch in &self.patches {
            patch.apply(ctx, &patched)?;
        }
        Ok(())
    }

    /// Compare this component's local tree with another's.
    ///
    /// Version control metadata and both sides' ignored paths are excluded;
    /// `extra` rules are evaluated after those. Returns one line per
    /// difference, or an empty list when the trees match.
    pub fn file_level_compare_with(&self, other: &Component, extra: &Filter) -> Result<Vec<String>> {
        let mine = self.staged_path()?;
        let theirs = other.staged_path()?;

        let filter = self
            .ignore_paths
            .iter()
            .chain(other.ignore_paths.iter())
            .fold(Filter::with_default_exclusions(), |f, p| {
                f.exclude(&format!("/{}", p.display()))
            })
            .extend(extra);

        tree::diff(mine, theirs, &filter).map_err(|e| Error::Comparison {
            name: self.name.clone(),
            message: e.to_string(),
        })
    }

    pub(crate) fn staged_path(&self) -> Result<&Path> {
        match self.local_path.as_deref() {
            Some(path) if path.exists() => Ok(path),
            other => Err(Error::NotStaged {
                name: self.name.clone(),
                path: other.map(Path::to_path_buf).unwrap_or_default(),
            }),
        }
    }
}

/// Cache subdirectory for libraries.
const LIBRARY_KIND: &str = "Library";

/// An external library, installed under `libraries/` by default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Library {
    component: Component,
    destination: Option<PathBuf>,
}

impl Library {
    /// Create a library. The download type defaults to `file`.
    pub fn new(name: impl Into<String>) -> Self {
        let mut component = Component::new(name);
        component.download.kind = Some("file".to_string());
        Self {
            component,
            destination: None,
        }
    }

    /// The library name.
    pub fn name(&self) -> &str {
        self.component.name()
    }

    /// Libraries have no version, so the extended name is the name.
    pub fn extended_name(&self) -> &str {
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

    /// Destination category (`libraries` by default).
    pub fn destination(&self) -> &Path {
        self.destination
            .as_deref()
            .unwrap_or_else(|| Path::new("libraries"))
    }

    /// Set the destination category.
    pub fn set_destination(&mut self, destination: impl Into<PathBuf>) {
        self.destination = Some(destination.into());
    }

    /// Install path relative to the platform's contrib path.
    pub fn target_path(&self) -> PathBuf {
        let mut path = self.destination().to_path_buf();
        if self.component.subdir() != Path::new(".") {
            path.push(self.component.subdir());
        }
        path.push(self.component.directory_name());
        path
    }

    /// Where the cached copy lives.
    pub fn cached_location(&self, ctx: &Context) -> PathBuf {
        self.component
            .cached_location(ctx, LIBRARY_KIND, self.extended_name())
    }

    /// Download a fresh copy, discarding any cached one.
    pub fn fetch(&mut self, ctx: &Context) -> Result<()> {
        let cached = self.cached_location(ctx);
        log::debug!("Cached location: {}", cached.display());
        if cached.exists() {
            fs::remove_dir_all(&cached)?;
        }
        let name = self.extended_name().to_string();
        self.component.fetch(ctx, LIBRARY_KIND, &name)
    }

    /// Apply the library's patches.
    pub fn patch(&mut self, ctx: &Context) -> Result<()> {
        let name = self.extended_name().to_string();
        self.component.patch(ctx, LIBRARY_KIND, &name)
    }
}
