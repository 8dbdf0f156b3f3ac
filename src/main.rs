mod cli;
mod commands;
mod config;
mod paths;
mod progress;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command, MakefileCommand};
use config::Settings;
use drupkit::backend::Drush;
use std::io;
use std::path::PathBuf;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
    pub settings: Settings,
    pub cache_dir: Option<PathBuf>,
}

impl Context {
    /// Build the engine configuration: cache location plus the real backends.
    pub fn engine(&self) -> Result<drupkit::Context> {
        let cache_dir = paths::cache_dir(self.cache_dir.as_deref(), self.settings.cache_dir.as_deref())?;
        log::debug!("Using cache dir {}", cache_dir.display());
        let drush = self
            .settings
            .drush
            .as_deref()
            .map_or_else(Drush::detect, |path| Drush::at(paths::expand(path)));
        Ok(drupkit::Context::with_system_drush(cache_dir, drush))
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
        settings: Settings::load()?,
        cache_dir: cli.cache_dir,
    };

    match cli.command {
        Command::Sync(args) => commands::sync::run(&ctx, args),
        Command::Status(args) => commands::status::run(&ctx, args),
        Command::Makefile(cmd) => match cmd {
            MakefileCommand::Check { file } => commands::makefile::check(&ctx, &file),
            MakefileCommand::Fmt { file, write } => commands::makefile::fmt(&ctx, &file, write),
        },
        Command::Graph { platform, output } => {
            commands::graph::run(&ctx, &platform, output.as_deref())
        }
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "drupid", &mut io::stdout());
            Ok(())
        }
    }
}
