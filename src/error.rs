//! Gate error types with process exit code mapping.
//!
//! [`GateError`] is the central error type for the entrypoint. Each variant
//! maps to the exit status the container reports when startup is aborted.

use std::path::PathBuf;
use std::time::Duration;

use crate::gate::DependencyKind;

/// Startup error enum with exit code mapping.
///
/// # Exit Codes
///
/// | Code | Category                                                     |
/// |------|--------------------------------------------------------------|
/// | 1    | Dependency, configuration, preparation or setup step failure |
/// | 126  | Supervised program found but could not be executed           |
/// | 127  | Supervised program not found                                 |
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    /// A required environment variable is not set.
    #[error("required environment variable {0} is not set")]
    MissingEnv(&'static str),

    /// An environment variable is set but cannot be parsed.
    #[error("invalid value for {key}: {value:?}")]
    InvalidEnv {
        /// Variable name.
        key: &'static str,
        /// Raw value found in the environment.
        value: String,
    },

    /// The configured run-as account could not be resolved.
    #[error("unknown user {0:?}")]
    UnknownUser(String),

    /// The account database exists but could not be read.
    #[error("failed to read user database {}: {source}", path.display())]
    UserDatabase {
        /// Path of the account database.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A dependency never answered within the attempt budget.
    #[error("{dependency} still unavailable after {attempts} attempts ({elapsed:?}): {last_error}")]
    DependencyUnavailable {
        /// Dependency that was being waited for.
        dependency: DependencyKind,
        /// Number of attempts made.
        attempts: u32,
        /// Wall time spent waiting.
        elapsed: Duration,
        /// Error reported by the final attempt.
        last_error: String,
    },

    /// A probe failed with an error that is not worth retrying.
    #[error("unexpected error while checking {dependency}: {reason}")]
    ProbeFailed {
        /// Dependency that was being checked.
        dependency: DependencyKind,
        /// Underlying error.
        reason: String,
    },

    /// Filesystem preparation failed.
    #[error("failed to prepare {}: {source}", path.display())]
    Prepare {
        /// Path being prepared.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A setup command could not be started.
    #[error("failed to start {program}: {source}")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A setup command exited unsuccessfully.
    #[error("{step} failed with {status}")]
    StepFailed {
        /// Rendered command line.
        step: String,
        /// Exit status description (`exit status: 1`, `signal: 9`, ...).
        status: String,
    },

    /// The async runtime for the wait stage could not be built.
    #[error("failed to start async runtime: {0}")]
    Runtime(#[source] std::io::Error),

    /// Replacing the process image failed.
    #[error("failed to exec {program}: {source}")]
    Exec {
        /// Program that could not be executed.
        program: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl GateError {
    /// Returns the process exit code for this variant.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Exec { source, .. } if source.kind() == std::io::ErrorKind::NotFound => 127,
            Self::Exec { .. } => 126,
            Self::MissingEnv(_)
            | Self::InvalidEnv { .. }
            | Self::UnknownUser(_)
            | Self::UserDatabase { .. }
            | Self::DependencyUnavailable { .. }
            | Self::ProbeFailed { .. }
            | Self::Prepare { .. }
            | Self::Spawn { .. }
            | Self::StepFailed { .. }
            | Self::Runtime(_) => 1,
        }
    }

    /// Returns `true` for configuration errors, which are never retried.
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::MissingEnv(_) | Self::InvalidEnv { .. } | Self::UnknownUser(_)
        )
    }
}
