//! Error types for makefile, platform and synchronization operations.
//!
//! Errors are grouped into categories that decide how far a failure
//! propagates: component-level failures are logged and skipped, while
//! manifest and comparison failures abort the enclosing operation.

use std::path::PathBuf;
use thiserror::Error;

/// Categories of errors, following how they propagate during a sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Malformed makefile or version string
    Parse,
    /// Project metadata could not be detected reliably
    Detection,
    /// A component could not be fetched or patched
    Fetch,
    /// The file-level comparison mechanism itself failed
    Comparison,
    /// An operation was refused by policy (e.g. applying with errors)
    Policy,
    /// A required external tool is missing or failed to run
    Environment,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    /// Whether failures in this category are isolated to one component.
    ///
    /// Such failures are recorded in the updater's log and processing
    /// continues with the remaining components.
    pub fn is_component_local(&self) -> bool {
        matches!(self, Self::Fetch | Self::Detection)
    }

    /// Get a user-friendly description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Parse => "Invalid makefile or version",
            Self::Detection => "Project metadata not detected",
            Self::Fetch => "Download or patch failed",
            Self::Comparison => "File comparison failed",
            Self::Policy => "Operation refused",
            Self::Environment => "External tool unavailable",
            Self::Other => "Unexpected error",
        }
    }

    /// Get actionable advice for resolving this error category.
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Parse => "Fix the reported line in the makefile",
            Self::Detection => "Make sure the project ships a single main .info file",
            Self::Fetch => "Check the download URL, the network and the patch files",
            Self::Comparison => "Check that both directories are readable",
            Self::Policy => "Resolve the logged errors or re-run with --force",
            Self::Environment => "Install the missing tool and make sure it is in PATH",
            Self::Other => "Check the error details for more information",
        }
    }
}

/// Errors that can occur while handling makefiles, platforms and updates.
#[derive(Debug, Error)]
pub enum Error {
    /// A string is not a valid Drupal version or core specification
    #[error("not a Drupal version: {0}")]
    InvalidVersion(String),

    /// A version was assigned to a project with a different core
    #[error("incompatible version for project {project}: {version}")]
    IncompatibleVersion {
        /// Extended name of the project
        project: String,
        /// The rejected version, in long form
        version: String,
    },

    /// Malformed makefile line
    #[error("{}: {message} (line {line})", path.display())]
    MakefileParse {
        /// Path of the makefile being parsed
        path: PathBuf,
        /// Line number where the error occurred (1-indexed)
        line: usize,
        /// Description of the problem
        message: String,
    },

    /// The makefile has no `core` field
    #[error("{}: the makefile does not contain the mandatory 'core' field", .0.display())]
    MissingCore(PathBuf),

    /// No .info file could be reliably selected for a project
    #[error("the .info file for {0} cannot be reliably detected")]
    InfoNotDetected(String),

    /// The .info file lacks a valid `core` field
    #[error("missing mandatory core compatibility for {0}")]
    InfoMissingCore(String),

    /// Neither the .info file nor the location reveal the project type
    #[error("the project's type for {0} cannot be determined")]
    UndeterminedType(String),

    /// A project has no type, so it has no install location
    #[error("undefined project type for {0}")]
    UndefinedType(String),

    /// A fetched copy does not match the project it was fetched for
    #[error("inconsistent {field}: expected {expected}, got {found}")]
    Inconsistent {
        /// Which attribute differs ("naming" or "core")
        field: &'static str,
        /// Value declared by the project
        expected: String,
        /// Value found in the fetched copy
        found: String,
    },

    /// A component could not be downloaded or staged
    #[error("{name} could not be fetched: {message}")]
    FetchFailed {
        /// Extended name of the component
        name: String,
        /// What went wrong
        message: String,
    },

    /// A patch could not be applied with any strategy
    #[error("patch {patch} could not be applied: {message}")]
    PatchFailed {
        /// Patch file name and description
        patch: String,
        /// Accumulated output of every failed attempt
        message: String,
    },

    /// A component has no local copy where one is required
    #[error("{name} does not exist at {}", path.display())]
    NotStaged {
        /// Extended name of the component
        name: String,
        /// Expected location
        path: PathBuf,
    },

    /// Comparing two directory trees failed
    #[error("failed to verify the integrity of {name}: {message}")]
    Comparison {
        /// Extended name of the component being compared
        name: String,
        /// Underlying failure
        message: String,
    },

    /// Changes were not applied because the log contains errors
    #[error("no changes can be applied because there are errors")]
    ApplyBlocked,

    /// A required executable is not in PATH
    #[error("{0} not found in PATH")]
    ToolNotFound(String),

    /// An external command exited unsuccessfully
    #[error("command failed: {message}")]
    CommandFailed {
        /// Description of what command failed
        message: String,
        /// Standard error output from the failed command
        stderr: String,
    },

    /// HTTP transfer error
    #[error("network error: {0}")]
    Network(String),

    /// Archive could not be read or extracted
    #[error("archive error: {0}")]
    Archive(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Error while walking a directory tree
    #[error("directory walk error: {0}")]
    Walk(#[from] walkdir::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Get the error category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::InvalidVersion(_)
            | Error::IncompatibleVersion { .. }
            | Error::MakefileParse { .. }
            | Error::MissingCore(_) => ErrorCategory::Parse,
            Error::InfoNotDetected(_)
            | Error::InfoMissingCore(_)
            | Error::UndeterminedType(_)
            | Error::UndefinedType(_)
            | Error::Inconsistent { .. } => ErrorCategory::Detection,
            Error::FetchFailed { .. }
            | Error::PatchFailed { .. }
            | Error::Network(_)
            | Error::Archive(_) => ErrorCategory::Fetch,
            Error::NotStaged { .. } | Error::Comparison { .. } | Error::Walk(_) => {
                ErrorCategory::Comparison
            }
            Error::ApplyBlocked => ErrorCategory::Policy,
            Error::ToolNotFound(_) | Error::CommandFailed { .. } => ErrorCategory::Environment,
            _ => ErrorCategory::Other,
        }
    }

    /// Whether this error only concerns a single component.
    pub fn is_component_local(&self) -> bool {
        self.category().is_component_local()
    }

    pub(crate) fn parse(path: &std::path::Path, line: usize, message: impl Into<String>) -> Self {
        Error::MakefileParse {
            path: path.to_path_buf(),
            line,
            message: message.into(),
        }
    }
}

/// Result type for drupkit operations.
pub type Result<T> = std::result::Result<T, Error>;
