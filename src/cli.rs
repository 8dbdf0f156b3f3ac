use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "drupid")]
#[command(author = "Drupid Developers")]
#[command(version)]
#[command(about = "Keep a Drupal platform in sync with a Drush makefile", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Download cache directory
    #[arg(long, global = true, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Compare a platform with a makefile and optionally apply the changes
    Sync(SyncArgs),

    /// Show what an installed platform contains
    Status(StatusArgs),

    /// Check or reformat makefiles
    #[command(subcommand)]
    Makefile(MakefileCommand),

    /// Print the project dependency graph of a platform in DOT format
    Graph {
        /// Platform root directory
        platform: PathBuf,

        /// Write the graph to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// ============================================================================
// Sync
// ============================================================================

#[derive(Parser)]
pub struct SyncArgs {
    /// Path to the makefile
    pub makefile: PathBuf,

    /// Platform root directory
    pub platform: PathBuf,

    /// Site whose installed projects are protected (e.g. default)
    #[arg(short, long)]
    pub site: Option<String>,

    /// Do not follow project dependencies
    #[arg(long)]
    pub no_follow: bool,

    /// Leave Drupal core alone
    #[arg(long)]
    pub no_core: bool,

    /// Skip libraries
    #[arg(long)]
    pub no_libs: bool,

    /// Apply the planned changes
    #[arg(short, long)]
    pub apply: bool,

    /// Apply even if the sync reported errors
    #[arg(short, long, requires = "apply")]
    pub force: bool,

    /// Do not ask for confirmation
    #[arg(short, long)]
    pub yes: bool,
}

// ============================================================================
// Status
// ============================================================================

#[derive(Parser)]
pub struct StatusArgs {
    /// Platform root directory
    pub platform: PathBuf,

    /// Report bootstrap and install state for this site only
    #[arg(short, long)]
    pub site: Option<String>,
}

// ============================================================================
// Makefile Commands
// ============================================================================

#[derive(Subcommand)]
pub enum MakefileCommand {
    /// Parse a makefile and list what it declares
    Check {
        /// Path to the makefile
        file: PathBuf,
    },

    /// Print a makefile in canonical form
    Fmt {
        /// Path to the makefile
        file: PathBuf,

        /// Rewrite the file in place
        #[arg(short, long)]
        write: bool,
    },
}
