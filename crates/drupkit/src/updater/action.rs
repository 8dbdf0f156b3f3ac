//! Deferred filesystem changes produced by a sync.

use crate::component::Library;
use crate::error::{Error, Result};
use crate::platform::{Platform, PlatformProject};
use crate::project::Project;
use crate::tree::{self, Filter};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// What an action does when fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    /// Copy a staged project into the platform
    InstallProject,
    /// Replace an installed project with the staged copy
    UpdateProject,
    /// Copy a staged library into the platform
    InstallLibrary,
    /// Replace an installed library with the staged copy
    UpdateLibrary,
    /// Move an installed project to another directory
    Move,
    /// Remove a directory from the platform
    Delete,
}

/// A pending change to a platform.
///
/// Everything needed to fire the action is captured when it is created.
/// Clones share the pending flag, so an action fires at most once no matter
/// how many logs hold it.
#[derive(Debug, Clone)]
pub struct Action {
    kind: ActionKind,
    name: String,
    message: String,
    source: Option<PathBuf>,
    destination: PathBuf,
    filter: Filter,
    downgrade: bool,
    pending: Arc<AtomicBool>,
}

impl Action {
    fn new(kind: ActionKind, name: String, message: String, destination: PathBuf) -> Self {
        Self {
            kind,
            name,
            message,
            source: None,
            destination,
            filter: Filter::new(),
            downgrade: false,
            pending: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Install a staged project at its destination in `platform`.
    ///
    /// # Errors
    ///
    /// Fails when the project has no local copy, has no type, or is already
    /// part of the platform.
    pub fn install_project(platform: &Platform, project: &Project) -> Result<Self> {
        let source = staged(project.extended_name(), project.local_path())?;
        if platform.has_project(project.name()) {
            return Err(Error::Other(format!(
                "{} is already part of the platform",
                project.name()
            )));
        }
        let dest = platform.dest_path(project)?;
        let message = format!("[Install] {} ({})", project.extended_name(), dest.display());
        let mut action = Self::new(
            ActionKind::InstallProject,
            project.name().to_string(),
            message,
            platform.root().join(&dest),
        );
        action.source = Some(source);
        action.filter = project.mirror_filter();
        Ok(action)
    }

    /// Replace the platform's copy of `project` with the staged one.
    ///
    /// # Errors
    ///
    /// Fails when the project has no local copy or no type.
    pub fn update_project(platform: &Platform, project: &Project, downgrade: bool) -> Result<Self> {
        let source = staged(project.extended_name(), project.local_path())?;
        let dest = platform.dest_path(project)?;
        let installed = if project.is_drupal() {
            platform.drupal_project()
        } else {
            platform.get_project(project.name()).map(PlatformProject::project)
        };
        let old = installed
            .and_then(Project::version)
            .map_or_else(|| "unknown".to_string(), |v| v.long());
        let new = project
            .version()
            .map_or_else(|| "unknown".to_string(), |v| v.long());
        let message = format!(
            "[Update]  {}: {old} => {new} ({})",
            project.name(),
            dest.display()
        );
        let mut action = Self::new(
            ActionKind::UpdateProject,
            project.name().to_string(),
            message,
            platform.root().join(&dest),
        );
        action.source = Some(source);
        action.filter = project.mirror_filter();
        action.downgrade = downgrade;
        Ok(action)
    }

    /// Install a staged library below the platform's contrib path.
    pub fn install_library(platform: &Platform, library: &Library) -> Result<Self> {
        Self::library(ActionKind::InstallLibrary, "[Install]  ", platform, library)
    }

    /// Replace the platform's copy of `library` with the staged one.
    pub fn update_library(platform: &Platform, library: &Library) -> Result<Self> {
        Self::library(ActionKind::UpdateLibrary, "[Update]  ", platform, library)
    }

    fn library(kind: ActionKind, tag: &str, platform: &Platform, library: &Library) -> Result<Self> {
        let source = staged(
            library.extended_name().to_string(),
            library.component().local_path(),
        )?;
        let rel = platform.contrib_path().join(library.target_path());
        let message = format!(
            "{tag}Library {} ({})",
            library.extended_name(),
            rel.display()
        );
        let filter = library
            .component()
            .ignore_paths()
            .iter()
            .fold(Filter::with_default_exclusions(), |f, p| {
                f.exclude(&format!("/{}", p.display()))
            });
        let mut action = Self::new(
            kind,
            library.name().to_string(),
            message,
            platform.root().join(rel),
        );
        action.source = Some(source);
        action.filter = filter;
        Ok(action)
    }

    /// Move an installed project to `new_path`, relative to the root.
    ///
    /// # Errors
    ///
    /// Fails when the project has no local copy.
    pub fn move_component(
        platform: &Platform,
        project: &PlatformProject,
        new_path: &Path,
    ) -> Result<Self> {
        let source = staged(project.extended_name(), project.local_path())?;
        let message = format!(
            "[Move]    {}: {} => {}",
            project.extended_name(),
            project.relative_path().display(),
            new_path.display()
        );
        let mut action = Self::new(
            ActionKind::Move,
            project.name().to_string(),
            message,
            platform.root().join(new_path),
        );
        action.source = Some(source);
        Ok(action)
    }

    /// Delete the directory at `path`.
    pub fn delete(platform: &Platform, extended_name: &str, path: &Path) -> Self {
        let rel = tree::relative_path(path, platform.root());
        Self::new(
            ActionKind::Delete,
            extended_name.to_string(),
            format!("[Delete]  {extended_name} ({})", rel.display()),
            path.to_path_buf(),
        )
    }

    /// What the action does.
    pub fn kind(&self) -> ActionKind {
        self.kind
    }

    /// Name of the project or library concerned.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Human-readable description.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The staged tree being deployed or the directory being moved.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Absolute path the action writes to or deletes.
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Whether an update goes to an older version.
    pub fn is_downgrade(&self) -> bool {
        self.downgrade
    }

    /// Whether the action has not fired yet.
    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::SeqCst)
    }

    /// Perform the change. Returns false if the action had already fired.
    pub fn fire(&self) -> Result<bool> {
        if !self.is_pending() {
            return Ok(false);
        }
        match self.kind {
            ActionKind::InstallProject
            | ActionKind::UpdateProject
            | ActionKind::InstallLibrary
            | ActionKind::UpdateLibrary => {
                let source = self
                    .source
                    .as_deref()
                    .ok_or_else(|| Error::Other(format!("{}: nothing to deploy", self.name)))?;
                tree::mirror(source, &self.destination, &self.filter)?;
            }
            ActionKind::Move => self.move_directory()?,
            ActionKind::Delete => {
                if self.destination.exists() {
                    fs::remove_dir_all(&self.destination)?;
                }
            }
        }
        self.pending.store(false, Ordering::SeqCst);
        log::info!("{}", self.message);
        Ok(true)
    }

    fn move_directory(&self) -> Result<()> {
        let Some(source) = self.source.as_deref().filter(|p| p.exists()) else {
            log::warn!("{}: source directory has disappeared", self.name);
            return Ok(());
        };
        if self.destination.exists() {
            fs::remove_dir_all(&self.destination)?;
        }
        if let Some(parent) = self.destination.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::rename(source, &self.destination)?;
        Ok(())
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

fn staged(name: String, path: Option<&Path>) -> Result<PathBuf> {
    match path {
        Some(p) if p.exists() => Ok(p.to_path_buf()),
        other => Err(Error::NotStaged {
            name,
            path: other.map(Path::to_path_buf).unwrap_or_default(),
        }),
    }
}
