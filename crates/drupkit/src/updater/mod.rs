//! Reconciliation of a platform with a makefile.
//!
//! [`Updater::sync`] compares what the makefile declares with what the
//! platform contains and records the outcome in a [`Log`]: errors, warnings,
//! notices and the [`Action`]s that would make the platform match.
//! Nothing on disk changes until [`Updater::apply_changes`] fires the
//! pending actions.
//!
//! Projects carrying their own makefile (installation profiles, usually)
//! spawn a derivative updater that reconciles the profile's directory with
//! the embedded makefile.
//!
//! # Example
//!
//! ```no_run
//! use drupkit::{Context, Makefile, Platform};
//! use drupkit::updater::{ApplyOptions, SyncOptions, Updater};
//!
//! # fn main() -> drupkit::Result<()> {
//! let makefile = Makefile::load("/srv/build/site.make")?;
//! let platform = Platform::new("/var/www/drupal")?;
//! let ctx = Context::system("/var/cache/drupid");
//!
//! let mut updater = Updater::new(makefile, platform, None, ctx);
//! updater.sync(SyncOptions::default())?;
//! if updater.pending_actions() {
//!     updater.apply_changes(ApplyOptions::default())?;
//! }
//! # Ok(())
//! # }
//! ```

mod action;
mod journal;

pub use action::{Action, ActionKind};
pub use journal::Log;

use crate::component::Library;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::makefile::Makefile;
use crate::platform::{Platform, PlatformProject};
use crate::project::Project;
use crate::tree::{self, Filter};
use std::cmp::Ordering;
use std::collections::{BTreeSet, VecDeque};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Options for [`Updater::sync`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    /// Do not add projects required by declared ones
    pub no_follow: bool,
    /// Leave Drupal core alone
    pub no_core: bool,
    /// Leave libraries alone
    pub no_libs: bool,
}

/// Options for [`Updater::apply_changes`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ApplyOptions {
    /// Apply even when the log contains errors
    pub force: bool,
}

enum Outcome {
    /// Staged and compared; dependencies should be followed
    Synced,
    /// Staged and compared; an embedded makefile handles the rest
    Derivative,
    /// Could not be staged
    Failed,
}

/// Brings a platform in line with a makefile.
#[derive(Debug)]
pub struct Updater {
    makefile: Makefile,
    platform: Platform,
    site: Option<String>,
    ctx: Context,
    log: Log,
    excluded: BTreeSet<String>,
    derivative_builds: Vec<Updater>,
    libraries_paths: Vec<PathBuf>,
    processed: BTreeSet<String>,
}

impl Updater {
    /// Create an updater. With `site`, installation checks only look at
    /// that site; otherwise any site counts.
    pub fn new(makefile: Makefile, platform: Platform, site: Option<String>, ctx: Context) -> Self {
        Self {
            makefile,
            platform,
            site,
            ctx,
            log: Log::new(),
            excluded: BTreeSet::new(),
            derivative_builds: Vec::new(),
            libraries_paths: Vec::new(),
            processed: BTreeSet::new(),
        }
    }

    /// The makefile, updated with everything learned while syncing.
    pub fn makefile(&self) -> &Makefile {
        &self.makefile
    }

    /// The platform being reconciled.
    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    /// The site installation checks are scoped to.
    pub fn site(&self) -> Option<&str> {
        self.site.as_deref()
    }

    /// What the last sync found, including derivative builds.
    pub fn log(&self) -> &Log {
        &self.log
    }

    /// Names never treated as contrib projects of this platform.
    pub fn excluded(&self) -> &BTreeSet<String> {
        &self.excluded
    }

    /// Add names to the exclusion set.
    pub fn exclude<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded.extend(names.into_iter().map(Into::into));
    }

    /// Extensions accounted for by the last sync.
    pub fn processed(&self) -> &BTreeSet<String> {
        &self.processed
    }

    /// Updaters spawned for projects with an embedded makefile.
    pub fn derivative_builds(&self) -> &[Updater] {
        &self.derivative_builds
    }

    /// Whether this updater or a derivative has actions left to fire.
    pub fn pending_actions(&self) -> bool {
        self.log.has_pending_actions() || self.derivative_builds.iter().any(Self::pending_actions)
    }

    /// Compare the platform with the makefile and plan the changes.
    ///
    /// Problems with a single project or library are recorded in the log
    /// and the sync moves on. Failing comparisons abort the sync.
    pub fn sync(&mut self, options: SyncOptions) -> Result<()> {
        self.log.clear();
        self.derivative_builds.clear();
        self.processed.clear();
        self.platform.analyze()?;

        let contrib_root = self.platform.root().join(self.platform.contrib_path());
        self.libraries_paths = self
            .makefile
            .libraries()
            .map(|l| contrib_root.join(l.target_path()))
            .collect();

        let Some(core_projects) = self.get_drupal() else {
            return Ok(());
        };

        if options.no_core {
            log::debug!("Skipping Drupal core");
        } else {
            self.sync_drupal_core()?;
        }

        let mut excluded = self.excluded.clone();
        excluded.extend(core_projects);
        self.sync_projects(&excluded, options)?;

        if !options.no_libs {
            self.sync_libraries()?;
        }

        let child_options = SyncOptions {
            no_core: true,
            ..options
        };
        for child in &mut self.derivative_builds {
            log::info!(
                "Syncing derivative build in {}",
                child.platform.contrib_path().display()
            );
            child.sync(child_options)?;
            self.log = self.log.merged(&child.log);
        }
        Ok(())
    }

    /// Fire the pending actions of this updater and its derivatives.
    ///
    /// Returns how many actions fired. The log and the derivatives are
    /// cleared afterwards.
    ///
    /// # Errors
    ///
    /// Returns `Error::ApplyBlocked` when the log has errors and
    /// `force` is off. Nothing is touched in that case.
    pub fn apply_changes(&mut self, options: ApplyOptions) -> Result<usize> {
        if self.log.has_errors() && !options.force {
            return Err(Error::ApplyBlocked);
        }
        let mut fired = self.log.apply_pending_actions()?;
        for child in &mut self.derivative_builds {
            fired += child.apply_changes(options)?;
        }
        self.log.clear();
        self.derivative_builds.clear();
        Ok(fired)
    }

    /// Stage Drupal core and learn the names of its projects.
    fn get_drupal(&mut self) -> Option<Vec<String>> {
        let Some(mut drupal) = self.makefile.drupal_project().cloned() else {
            self.log.warning("No Drupal project specified.");
            return None;
        };
        if !self.fetch_and_patch_project(&mut drupal) {
            self.makefile.add_project(drupal);
            self.log.warning("Drupal core could not be staged.");
            return None;
        }
        let names = drupal.local_path().map(|local| {
            Platform::new(local).and_then(|mut core| {
                core.analyze()?;
                Ok(core.core_project_names())
            })
        });
        self.makefile.add_project(drupal);
        match names {
            Some(Ok(names)) => Some(names),
            Some(Err(e)) => {
                self.log.warning(format!("Drupal core could not be analyzed: {e}"));
                None
            }
            None => None,
        }
    }

    fn sync_drupal_core(&mut self) -> Result<()> {
        let Some(desired) = self.makefile.drupal_project().cloned() else {
            return Ok(());
        };
        match self.platform.drupal_project().cloned() {
            Some(installed) => self.compare_versions(&desired, &installed, None),
            None => {
                self.queue(Action::install_project(&self.platform, &desired));
                Ok(())
            }
        }
    }

    fn sync_projects(&mut self, excluded: &BTreeSet<String>, options: SyncOptions) -> Result<()> {
        let mut processed = excluded.clone();
        let mut failed = BTreeSet::new();
        let mut queue = VecDeque::new();

        for name in self.makefile.project_names() {
            if name == "drupal" {
                continue;
            }
            if excluded.contains(&name) {
                log::debug!("{name} is excluded");
                continue;
            }
            let Some(project) = self.makefile.get_project(&name).cloned() else {
                continue;
            };
            self.process(project, &mut processed, &mut failed, &mut queue)?;
        }

        if !options.no_follow {
            while let Some(project) = queue.pop_front() {
                let deps = match project.dependencies(true) {
                    Ok(deps) => deps,
                    Err(e) => {
                        self.log.warning(format!(
                            "Dependencies of {} could not be read: {e}",
                            project.extended_name()
                        ));
                        continue;
                    }
                };
                for dep in deps {
                    if processed.contains(&dep) || failed.contains(&dep) {
                        continue;
                    }
                    log::debug!("Adding dependency {dep} of {}", project.name());
                    let new_project = Project::new(dep, project.core());
                    self.process(new_project, &mut processed, &mut failed, &mut queue)?;
                }
            }
        }

        for name in self.platform.project_names() {
            if processed.contains(&name) || failed.contains(&name) {
                continue;
            }
            let Some(orphan) = self.platform.get_project(&name).cloned() else {
                continue;
            };
            if orphan.is_installed(&self.ctx, self.site.as_deref()) {
                self.log.error(format!(
                    "{} is not in the makefile, but it cannot be deleted because it is installed",
                    orphan.extended_name()
                ));
            } else if let Some(local) = orphan.local_path() {
                let action = Action::delete(&self.platform, &orphan.extended_name(), local);
                self.log.action(action);
            }
        }

        self.processed = processed;
        Ok(())
    }

    fn process(
        &mut self,
        mut project: Project,
        processed: &mut BTreeSet<String>,
        failed: &mut BTreeSet<String>,
        queue: &mut VecDeque<Project>,
    ) -> Result<()> {
        match self.sync_project(&mut project)? {
            Outcome::Failed => {
                failed.insert(project.name().to_string());
            }
            Outcome::Derivative => processed.extend(project.extensions()),
            Outcome::Synced => {
                processed.extend(project.extensions());
                queue.push_back(project.clone());
            }
        }
        self.makefile.add_project(project);
        Ok(())
    }

    fn sync_project(&mut self, project: &mut Project) -> Result<Outcome> {
        if !self.fetch_and_patch_project(project) {
            return Ok(Outcome::Failed);
        }
        let derivative = match self.prepare_derivative_build(project) {
            Ok(derivative) => derivative,
            Err(e) => {
                self.log.error(format!("{}: {e}", project.extended_name()));
                false
            }
        };

        let dest = match self.platform.dest_path(project) {
            Ok(dest) => dest,
            Err(e) => {
                self.log.error(format!("{}: {e}", project.extended_name()));
                return Ok(Outcome::Failed);
            }
        };
        let abs_dest = self.platform.root().join(&dest);
        for lib_path in &self.libraries_paths {
            if lib_path != &abs_dest && lib_path.starts_with(&abs_dest) {
                let rel = tree::relative_path(lib_path, &abs_dest);
                self.log.notice(format!(
                    "Ignoring {} inside {}",
                    rel.display(),
                    project.extended_name()
                ));
                project.component_mut().ignore_path(rel);
            }
        }

        if let Some(installed) = self.platform.get_project(project.name()).cloned() {
            if installed.local_path() != Some(abs_dest.as_path()) {
                self.queue(Action::move_component(&self.platform, &installed, &dest));
                if abs_dest.exists() {
                    self.log.error(format!(
                        "{} already exists. Use --force to overwrite.",
                        dest.display()
                    ));
                }
            }
            self.compare_versions(project, &installed, Some(&installed))?;
        } else if abs_dest.exists() {
            match PlatformProject::new(&self.platform, &abs_dest) {
                Ok(installed) => self.compare_versions(project, &installed, Some(&installed))?,
                Err(e) => {
                    self.log.error(format!(
                        "{} exists, but cannot be analyzed: {e}",
                        dest.display()
                    ));
                    self.queue(Action::update_project(&self.platform, project, false));
                }
            }
        } else {
            self.queue(Action::install_project(&self.platform, project));
        }

        Ok(if derivative {
            Outcome::Derivative
        } else {
            Outcome::Synced
        })
    }

    /// Queue an updater for a project that ships its own makefile.
    fn prepare_derivative_build(&mut self, project: &Project) -> Result<bool> {
        let Some(path) = project.makefile() else {
            return Ok(false);
        };
        log::debug!("Preparing derivative build for {}", path.display());
        let submakefile = Makefile::load(&path)?;
        let mut subplatform = Platform::new(self.platform.root())?;
        subplatform.set_contrib_path(self.platform.dest_path(project)?);

        let mut child = Self::new(submakefile, subplatform, self.site.clone(), self.ctx.clone());
        child.exclude(project.extensions());
        child.exclude(self.platform.profiles());
        self.derivative_builds.push(child);
        Ok(true)
    }

    fn sync_libraries(&mut self) -> Result<()> {
        let contrib_root = self.platform.root().join(self.platform.contrib_path());
        let mut processed: Vec<PathBuf> = Vec::new();

        for name in self.makefile.library_names() {
            let Some(mut library) = self.makefile.get_library(&name).cloned() else {
                continue;
            };
            self.sync_library(&mut library, &contrib_root)?;
            processed.push(library.target_path());
            self.makefile.add_library(library);
        }

        let libraries_path = self.platform.libraries_path();
        if !libraries_path.is_dir() {
            return Ok(());
        }
        for entry in WalkDir::new(&libraries_path)
            .min_depth(1)
            .sort_by_file_name()
        {
            let entry = entry?;
            if !entry.file_type().is_dir() {
                continue;
            }
            let rel = tree::relative_path(entry.path(), &contrib_root);
            if processed
                .iter()
                .any(|p| p.starts_with(&rel) || rel.starts_with(p))
            {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let action = Action::delete(&self.platform, &name, entry.path());
            self.log.action(action);
            processed.push(rel);
        }
        Ok(())
    }

    fn sync_library(&mut self, library: &mut Library, contrib_root: &Path) -> Result<()> {
        if !self.fetch_and_patch_library(library) {
            return Ok(());
        }
        let rel = self.platform.contrib_path().join(library.target_path());
        let installed_path = contrib_root.join(library.target_path());
        if !installed_path.exists() {
            self.queue(Action::install_library(&self.platform, library));
            return Ok(());
        }

        let mut installed = Library::new(library.name());
        installed.component_mut().set_local_path(installed_path);
        let diff = library
            .component()
            .file_level_compare_with(installed.component(), &Filter::new())?;
        if diff.is_empty() {
            self.log.notice(format!(
                "[OK]  {} ({})",
                library.extended_name(),
                rel.display()
            ));
        } else {
            self.queue(Action::update_library(&self.platform, library));
            self.log.notice(diff.join("\n"));
        }
        Ok(())
    }

    /// Decide what to do with a project present in both the makefile and
    /// the platform.
    fn compare_versions(
        &mut self,
        desired: &Project,
        installed: &Project,
        platform_project: Option<&PlatformProject>,
    ) -> Result<()> {
        let location = if desired.is_drupal() {
            String::new()
        } else {
            self.platform
                .dest_path(desired)
                .map(|d| format!(" ({})", d.display()))
                .unwrap_or_default()
        };
        let installed_name = installed.extended_name();

        match desired.partial_cmp(installed) {
            Some(Ordering::Equal) => {
                let diff = desired.file_level_compare_with(installed)?;
                if diff.is_empty() {
                    self.log.notice(format!("[OK]  {installed_name}{location}"));
                } else if desired.has_patches() {
                    self.queue(Action::update_project(&self.platform, desired, false));
                    self.log
                        .notice(format!("{installed_name}{location} will be patched"));
                    self.log.notice(diff.join("\n"));
                } else {
                    self.log.error(format!(
                        "{installed_name}{location}: mismatch with cached copy:\n{}",
                        diff.join("\n")
                    ));
                    self.queue(Action::update_project(&self.platform, desired, false));
                }
            }
            Some(Ordering::Greater) => {
                self.queue(Action::update_project(&self.platform, desired, false));
                self.log.notice(format!(
                    "{installed_name}{location} will be upgraded to {}",
                    desired.extended_name()
                ));
            }
            Some(Ordering::Less) => {
                self.queue(Action::update_project(&self.platform, desired, true));
                if desired.is_drupal() {
                    if self.platform.is_bootstrapped(&self.ctx, self.site.as_deref()) {
                        self.log.error(format!(
                            "{installed_name} cannot be downgraded because it is bootstrapped (use --force to override)"
                        ));
                    }
                } else if platform_project
                    .is_some_and(|p| p.is_installed(&self.ctx, self.site.as_deref()))
                {
                    self.log.error(format!(
                        "{installed_name}{location} must be uninstalled before downgrading (use --force to override)"
                    ));
                }
            }
            None => {
                let diff = desired.file_level_compare_with(installed)?;
                if diff.is_empty() {
                    self.log.notice(format!("[OK]  {installed_name}{location}"));
                } else {
                    self.queue(Action::update_project(&self.platform, desired, false));
                    self.log.notice(diff.join("\n"));
                    if installed.has_version() && !desired.has_version() {
                        self.log.error(format!(
                            "Cannot upgrade {} from known version to unknown version",
                            desired.name()
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    /// Stage a project, recording failures in the log.
    fn fetch_and_patch_project(&mut self, project: &mut Project) -> bool {
        if project.needs_release_lookup()
            && let Err(e) = project.update_version(&self.ctx)
        {
            self.log.warning(format!(
                "No release history for {}: {e}",
                project.extended_name()
            ));
        }
        if let Err(e) = project.fetch(&self.ctx) {
            self.log.error(fetch_error(&project.extended_name(), &e));
            return false;
        }
        if project.has_patches()
            && let Err(e) = project.patch(&self.ctx)
        {
            self.log.error(format!("{}: {e}", project.extended_name()));
            return false;
        }
        true
    }

    fn fetch_and_patch_library(&mut self, library: &mut Library) -> bool {
        if let Err(e) = library.fetch(&self.ctx) {
            self.log.error(fetch_error(library.extended_name(), &e));
            return false;
        }
        if library.component().has_patches()
            && let Err(e) = library.patch(&self.ctx)
        {
            self.log.error(format!("{}: {e}", library.extended_name()));
            return false;
        }
        true
    }

    fn queue(&mut self, action: Result<Action>) {
        match action {
            Ok(action) => self.log.action(action),
            Err(e) => self.log.error(e.to_string()),
        }
    }
}

fn fetch_error(name: &str, error: &Error) -> String {
    match error {
        Error::FetchFailed { .. } => error.to_string(),
        other => format!("{name} could not be fetched: {other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MockFetcher, MockPatcher, MockReleases, MockSite};
    use std::fs;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn write_module(dir: &Path, name: &str, version: Option<&str>, deps: &[&str]) {
        let mut info = format!("name = {name}\ncore = 7.x\n");
        if let Some(version) = version {
            info.push_str(&format!("version = \"{version}\"\n"));
        }
        for dep in deps {
            info.push_str(&format!("dependencies[] = {dep}\n"));
        }
        write(dir, &format!("{name}.info"), &info);
        write(dir, &format!("{name}.module"), "<?php\n");
    }

    /// A Drupal 7.14 platform plus a fixture directory served by the mocks.
    struct Fixture {
        tmp: TempDir,
        fetcher: MockFetcher,
        releases: MockReleases,
        site: MockSite,
    }

    impl Fixture {
        fn new() -> Self {
            let tmp = TempDir::new().unwrap();
            let core = tmp.path().join("fixtures/drupal");
            write(&core, "includes/bootstrap.inc", "<?php\ndefine('VERSION', '7.14');\n");
            write(&core, "modules/node/node.info", "core = 7.x\npackage = Core\n");
            write(&core, "modules/node/node.module", "<?php\n");
            write(&core, "modules/system/system.info", "core = 7.x\npackage = Core\n");
            write(&core, "modules/system/system.module", "<?php\n");
            write(&core, "profiles/standard/standard.info", "core = 7.x\npackage = Core\n");
            write(&core, "profiles/standard/standard.profile", "<?php\n");
            write(&core, "sites/all/README.txt", "Contrib goes here.\n");
            write(&core, "sites/default/default.settings.php", "<?php\n");
            tree::copy_tree(&core, &tmp.path().join("platform")).unwrap();

            let fetcher = MockFetcher::new();
            fetcher.serve("drupal", &core);
            Self {
                tmp,
                fetcher,
                releases: MockReleases::new(),
                site: MockSite::new(),
            }
        }

        fn root(&self) -> PathBuf {
            self.tmp.path().join("platform")
        }

        /// Serve a module from the fixture directory.
        fn serve_module(&self, name: &str, version: Option<&str>, deps: &[&str]) {
            let dir = self.tmp.path().join("fixtures").join(name);
            write_module(&dir, name, version, deps);
            self.fetcher.serve(name, &dir);
        }

        /// Put a module into the platform.
        fn install_module(&self, rel: &str, name: &str, version: Option<&str>) {
            write_module(&self.root().join(rel), name, version, &[]);
        }

        fn updater(&self, makefile: &str) -> Updater {
            let path = self.tmp.path().join("site.make");
            fs::write(&path, makefile).unwrap();
            let ctx = Context::system(self.tmp.path().join("cache"))
                .with_fetcher(self.fetcher.clone())
                .with_patcher(MockPatcher::new())
                .with_releases(self.releases.clone())
                .with_site(self.site.clone());
            Updater::new(
                Makefile::load(&path).unwrap(),
                Platform::new(self.root()).unwrap(),
                None,
                ctx,
            )
        }
    }

    const HEADER: &str = "core = 7.x\napi = 2\nprojects[drupal][version] = \"7.14\"\n";

    fn actions_of(updater: &Updater, kind: ActionKind) -> Vec<&Action> {
        updater
            .log()
            .actions()
            .iter()
            .filter(|a| a.kind() == kind)
            .collect()
    }

    #[test]
    fn test_install_new_project() {
        let fx = Fixture::new();
        fx.serve_module("views", Some("7.x-3.1"), &[]);
        let mut updater = fx.updater(&format!("{HEADER}projects[views][version] = \"3.1\"\n"));

        updater.sync(SyncOptions::default()).unwrap();
        assert!(!updater.log().has_errors(), "{:?}", updater.log().errors());
        assert!(updater.log().notices().contains(&"[OK]  drupal-7.14".to_string()));

        let installs = actions_of(&updater, ActionKind::InstallProject);
        assert_eq!(installs.len(), 1);
        assert_eq!(
            installs[0].destination(),
            fx.root().join("sites/all/modules/views")
        );
        assert!(updater.pending_actions());

        assert_eq!(updater.apply_changes(ApplyOptions::default()).unwrap(), 1);
        assert!(fx.root().join("sites/all/modules/views/views.info").exists());
        assert!(!updater.pending_actions());

        // A second pass finds nothing to do.
        updater.sync(SyncOptions::default()).unwrap();
        assert!(!updater.pending_actions());
        assert!(
            updater
                .log()
                .notices()
                .contains(&"[OK]  views-7.x-3.1 (sites/all/modules/views)".to_string())
        );
    }

    #[test]
    fn test_upgrade_project() {
        let fx = Fixture::new();
        fx.install_module("sites/all/modules/ctools", "ctools", Some("7.x-0.9"));
        fx.serve_module("ctools", Some("7.x-1.0"), &[]);
        let mut updater = fx.updater(&format!("{HEADER}projects[ctools][version] = \"1.0\"\n"));

        updater.sync(SyncOptions::default()).unwrap();
        assert!(!updater.log().has_errors());
        let updates = actions_of(&updater, ActionKind::UpdateProject);
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].name(), "ctools");
        assert!(!updates[0].is_downgrade());
        assert_eq!(
            updates[0].message(),
            "[Update]  ctools: 7.x-0.9 => 7.x-1.0 (sites/all/modules/ctools)"
        );
        assert!(
            updater
                .log()
                .notices()
                .iter()
                .any(|n| n.contains("will be upgraded to ctools-7.x-1.0"))
        );

        updater.apply_changes(ApplyOptions::default()).unwrap();
        let info = fs::read_to_string(fx.root().join("sites/all/modules/ctools/ctools.info")).unwrap();
        assert!(info.contains("7.x-1.0"));
    }

    #[test]
    fn test_undeclared_project_is_deleted() {
        let fx = Fixture::new();
        fx.install_module("sites/all/modules/foo", "foo", None);
        let mut updater = fx.updater(HEADER);

        updater.sync(SyncOptions::default()).unwrap();
        let deletes = actions_of(&updater, ActionKind::Delete);
        assert_eq!(deletes.len(), 1);
        assert_eq!(deletes[0].message(), "[Delete]  foo-7.x (sites/all/modules/foo)");

        updater.apply_changes(ApplyOptions::default()).unwrap();
        assert!(!fx.root().join("sites/all/modules/foo").exists());
    }

    #[test]
    fn test_installed_project_is_never_deleted() {
        let fx = Fixture::new();
        fx.install_module("sites/all/modules/foo", "foo", None);
        fx.site.install("default", "foo");
        let mut updater = fx.updater(HEADER);

        updater.sync(SyncOptions::default()).unwrap();
        assert!(actions_of(&updater, ActionKind::Delete).is_empty());
        assert!(updater.log().errors()[0].contains("because it is installed"));
        assert!(matches!(
            updater.apply_changes(ApplyOptions::default()),
            Err(Error::ApplyBlocked)
        ));
        assert!(fx.root().join("sites/all/modules/foo").exists());
    }

    #[test]
    fn test_failed_fetch_keeps_installed_copy() {
        let fx = Fixture::new();
        fx.install_module("sites/all/modules/ctools", "ctools", Some("7.x-0.9"));
        fx.fetcher.fail("ctools");
        let mut updater = fx.updater(&format!("{HEADER}projects[ctools][version] = \"1.0\"\n"));

        updater.sync(SyncOptions::default()).unwrap();
        assert_eq!(updater.log().errors().len(), 1);
        assert!(updater.log().errors()[0].contains("ctools-7.x-1.0 could not be fetched"));
        assert!(!updater.log().has_actions());
    }

    #[test]
    fn test_dependency_cycle_terminates() {
        let fx = Fixture::new();
        fx.serve_module("a", None, &["b"]);
        fx.serve_module("b", None, &["a", "node"]);
        let mut updater = fx.updater(&format!("{HEADER}projects[] = a\n"));

        updater.sync(SyncOptions::default()).unwrap();
        assert_eq!(fx.fetcher.fetch_count("a"), 1);
        assert_eq!(fx.fetcher.fetch_count("b"), 1);
        // Core projects are never fetched as dependencies.
        assert_eq!(fx.fetcher.fetch_count("node"), 0);
        assert_eq!(actions_of(&updater, ActionKind::InstallProject).len(), 2);
        assert!(updater.makefile().get_project("b").is_some());
        assert!(updater.processed().contains("a"));
        assert!(updater.processed().contains("b"));
    }

    #[test]
    fn test_no_follow_skips_dependencies() {
        let fx = Fixture::new();
        fx.serve_module("a", None, &["b"]);
        fx.serve_module("b", None, &[]);
        let mut updater = fx.updater(&format!("{HEADER}projects[] = a\n"));

        updater
            .sync(SyncOptions {
                no_follow: true,
                ..SyncOptions::default()
            })
            .unwrap();
        assert_eq!(fx.fetcher.fetch_count("b"), 0);
        assert!(updater.makefile().get_project("b").is_none());
    }

    #[test]
    fn test_bootstrapped_core_downgrade_blocks_apply() {
        let fx = Fixture::new();
        fx.site.bootstrap("default");
        let mut updater = fx.updater("core = 7.x\napi = 2\nprojects[drupal][version] = \"7.12\"\n");

        updater.sync(SyncOptions::default()).unwrap();
        let updates = actions_of(&updater, ActionKind::UpdateProject);
        assert_eq!(updates.len(), 1);
        assert!(updates[0].is_downgrade());
        assert!(updater.log().errors()[0].contains("cannot be downgraded because it is bootstrapped"));

        assert!(matches!(
            updater.apply_changes(ApplyOptions::default()),
            Err(Error::ApplyBlocked)
        ));
        assert!(updater.pending_actions());
        assert_eq!(updater.apply_changes(ApplyOptions { force: true }).unwrap(), 1);
    }

    #[test]
    fn test_patched_project_at_same_version_is_updated() {
        let fx = Fixture::new();
        fx.install_module("sites/all/modules/views", "views", Some("7.x-3.1"));
        fx.serve_module("views", Some("7.x-3.1"), &[]);
        let patch = fx.tmp.path().join("fixtures/views-fix.patch");
        write(fx.tmp.path(), "fixtures/views-fix.patch", "--- a\n+++ b\n");
        fx.fetcher.serve_file("http://example.org/views-fix.patch", &patch);
        let mut updater = fx.updater(&format!(
            "{HEADER}projects[views][version] = \"3.1\"\nprojects[views][patch][] = \"http://example.org/views-fix.patch\"\n"
        ));

        updater.sync(SyncOptions::default()).unwrap();
        assert!(!updater.log().has_errors(), "{:?}", updater.log().errors());
        let updates = actions_of(&updater, ActionKind::UpdateProject);
        assert_eq!(updates.len(), 1);
        assert!(!updates[0].is_downgrade());
        let notices = updater.log().notices();
        assert!(
            notices.contains(&"views-7.x-3.1 (sites/all/modules/views) will be patched".to_string())
        );
        assert!(notices.iter().any(|n| n.contains("PATCHES.txt")));

        assert_eq!(updater.apply_changes(ApplyOptions::default()).unwrap(), 1);
        assert!(fx.root().join("sites/all/modules/views/PATCHES.txt").exists());
    }

    #[test]
    fn test_installed_contrib_downgrade_blocks_apply() {
        let fx = Fixture::new();
        fx.install_module("sites/all/modules/ctools", "ctools", Some("7.x-1.0"));
        fx.serve_module("ctools", Some("7.x-0.9"), &[]);
        fx.site.install("default", "ctools");
        let mut updater = fx.updater(&format!("{HEADER}projects[ctools][version] = \"0.9\"\n"));

        updater.sync(SyncOptions::default()).unwrap();
        let updates = actions_of(&updater, ActionKind::UpdateProject);
        assert_eq!(updates.len(), 1);
        assert!(updates[0].is_downgrade());
        let errors = updater.log().errors();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("ctools-7.x-1.0 (sites/all/modules/ctools) must be uninstalled before downgrading"));

        assert!(matches!(
            updater.apply_changes(ApplyOptions { force: false }),
            Err(Error::ApplyBlocked)
        ));
        let info = fs::read_to_string(fx.root().join("sites/all/modules/ctools/ctools.info")).unwrap();
        assert!(info.contains("7.x-1.0"));
    }

    #[test]
    fn test_known_to_unknown_version_is_an_error() {
        let fx = Fixture::new();
        fx.install_module("sites/all/modules/views", "views", Some("7.x-3.1"));
        fx.serve_module("views", None, &[]);
        let mut updater = fx.updater(&format!("{HEADER}projects[] = views\n"));

        updater.sync(SyncOptions::default()).unwrap();
        let errors = updater.log().errors();
        assert_eq!(errors.len(), 1, "{errors:?}");
        assert_eq!(
            errors[0],
            "Cannot upgrade views from known version to unknown version"
        );
        assert_eq!(actions_of(&updater, ActionKind::UpdateProject).len(), 1);
        assert!(updater.log().notices().iter().any(|n| n.contains("views.info")));
        assert!(matches!(
            updater.apply_changes(ApplyOptions::default()),
            Err(Error::ApplyBlocked)
        ));
    }

    #[test]
    fn test_no_core_leaves_drupal_alone() {
        let fx = Fixture::new();
        let mut updater = fx.updater("core = 7.x\napi = 2\nprojects[drupal][version] = \"7.12\"\n");
        updater
            .sync(SyncOptions {
                no_core: true,
                ..SyncOptions::default()
            })
            .unwrap();
        assert!(!updater.log().has_actions());
    }

    #[test]
    fn test_misplaced_project_is_moved() {
        let fx = Fixture::new();
        fx.install_module("sites/all/modules/contrib/token", "token", Some("7.x-1.0"));
        fx.serve_module("token", Some("7.x-1.0"), &[]);
        let mut updater = fx.updater(&format!("{HEADER}projects[token][version] = \"1.0\"\n"));

        updater.sync(SyncOptions::default()).unwrap();
        assert!(!updater.log().has_errors(), "{:?}", updater.log().errors());
        let moves = actions_of(&updater, ActionKind::Move);
        assert_eq!(moves.len(), 1);
        assert_eq!(
            moves[0].message(),
            "[Move]    token-7.x-1.0: sites/all/modules/contrib/token => sites/all/modules/token"
        );

        updater.apply_changes(ApplyOptions::default()).unwrap();
        assert!(fx.root().join("sites/all/modules/token/token.info").exists());
        assert!(!fx.root().join("sites/all/modules/contrib/token").exists());
    }

    #[test]
    fn test_local_changes_are_an_error() {
        let fx = Fixture::new();
        fx.install_module("sites/all/modules/views", "views", Some("7.x-3.1"));
        write(&fx.root(), "sites/all/modules/views/hack.php", "<?php\n");
        fx.serve_module("views", Some("7.x-3.1"), &[]);
        let mut updater = fx.updater(&format!("{HEADER}projects[views][version] = \"3.1\"\n"));

        updater.sync(SyncOptions::default()).unwrap();
        let errors = updater.log().errors();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("mismatch with cached copy"));
        assert!(errors[0].contains("*deleting   hack.php"));
        assert_eq!(actions_of(&updater, ActionKind::UpdateProject).len(), 1);
    }

    #[test]
    fn test_derivative_build() {
        let fx = Fixture::new();
        let profile = fx.tmp.path().join("fixtures/myprof");
        write(&profile, "myprof.info", "name = My profile\ncore = 7.x\n");
        write(&profile, "myprof.profile", "<?php\n");
        write(&profile, "myprof.make", "core = 7.x\napi = 2\nprojects[] = token\n");
        fx.fetcher.serve("myprof", &profile);
        fx.serve_module("token", Some("7.x-1.0"), &[]);
        let mut updater = fx.updater(&format!("{HEADER}projects[] = myprof\n"));

        updater.sync(SyncOptions::default()).unwrap();
        assert!(!updater.log().has_errors(), "{:?}", updater.log().errors());
        assert_eq!(updater.derivative_builds().len(), 1);
        let child = &updater.derivative_builds()[0];
        assert!(child.excluded().contains("myprof"));
        assert!(child.excluded().contains("standard"));

        let installs = actions_of(&updater, ActionKind::InstallProject);
        let destinations: Vec<&Path> = installs.iter().map(|a| a.destination()).collect();
        assert_eq!(
            destinations,
            [
                fx.root().join("profiles/myprof").as_path(),
                fx.root().join("profiles/myprof/modules/token").as_path(),
            ]
        );

        assert_eq!(updater.apply_changes(ApplyOptions::default()).unwrap(), 2);
        assert!(fx.root().join("profiles/myprof/myprof.make").exists());
        assert!(fx.root().join("profiles/myprof/modules/token/token.info").exists());
        assert!(updater.derivative_builds().is_empty());
    }

    #[test]
    fn test_libraries_and_orphans() {
        let fx = Fixture::new();
        let colorbox = fx.tmp.path().join("fixtures/colorbox");
        write(&colorbox, "colorbox.js", "var c;\n");
        fx.fetcher.serve("colorbox", &colorbox);
        write(&fx.root(), "sites/all/libraries/colorbox/colorbox.js", "var c;\n");
        write(&fx.root(), "sites/all/libraries/old/sub/old.js", "var o;\n");
        let mut updater = fx.updater(&format!(
            "{HEADER}libraries[colorbox][download][url] = \"http://example.org/colorbox.zip\"\n"
        ));

        updater.sync(SyncOptions::default()).unwrap();
        assert!(
            updater
                .log()
                .notices()
                .contains(&"[OK]  colorbox (sites/all/libraries/colorbox)".to_string())
        );
        let deletes = actions_of(&updater, ActionKind::Delete);
        assert_eq!(deletes.len(), 1);
        assert_eq!(deletes[0].destination(), fx.root().join("sites/all/libraries/old"));

        updater
            .sync(SyncOptions {
                no_libs: true,
                ..SyncOptions::default()
            })
            .unwrap();
        assert!(!updater.log().has_actions());
    }

    #[test]
    fn test_unavailable_core_stops_sync() {
        let fx = Fixture::new();
        let mut updater = fx.updater(HEADER);
        fx.fetcher.fail("drupal");
        updater.sync(SyncOptions::default()).unwrap();
        assert!(updater.log().has_warnings());
        assert!(!updater.log().has_actions());
    }
}
