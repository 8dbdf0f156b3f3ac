//! # drupkit
//!
//! Library for building and maintaining Drupal platforms from Drush
//! makefiles.
//!
//! This crate provides functionality for:
//! - Parsing, editing and writing Drush makefiles
//! - Modelling Drupal versions and choosing the best release of a project
//! - Downloading and patching projects and libraries into a cache
//! - Analyzing an installed Drupal platform
//! - Reconciling a platform with a makefile, including derivative builds
//!
//! ## Example
//!
//! ```no_run
//! use drupkit::{Context, Makefile, Platform, Updater};
//! use drupkit::updater::{ApplyOptions, SyncOptions};
//!
//! # fn main() -> drupkit::Result<()> {
//! let ctx = Context::system("/var/cache/drupid");
//! let makefile = Makefile::load("site.make")?;
//! let platform = Platform::new("/srv/www/site")?;
//!
//! let mut updater = Updater::new(makefile, platform, None, ctx);
//! updater.sync(SyncOptions::default())?;
//! print!("{}", updater.log().summary());
//! updater.apply_changes(ApplyOptions::default())?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing
//!
//! Every external collaborator sits behind a trait in [`backend`]. Tests
//! build a [`Context`] with the in-memory implementations from
//! [`backend::mock`] instead of shelling out to git or drush.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod component;
pub mod context;
pub mod error;
pub mod info;
pub mod makefile;
pub mod platform;
pub mod project;
pub mod tree;
pub mod updater;
pub mod version;

pub use component::{Component, Download, Library, Patch};
pub use context::Context;
pub use error::{Error, ErrorCategory, Result};
pub use info::ProjectInfo;
pub use makefile::Makefile;
pub use platform::{Platform, PlatformProject};
pub use project::{Project, ProjectType};
pub use tree::Filter;
pub use updater::{Action, ActionKind, Log, Updater};
pub use version::{PatchLevel, Stability, Version, VersionCore};
