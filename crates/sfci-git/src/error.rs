//! Error types for git operations.
//!
//! [`GitError`] is the single error type returned by all
//! [`VersionControlClient`](crate::VersionControlClient) methods. Variants keep
//! the failing command and git's own stderr so callers can surface the raw
//! tool message without parsing it.

use thiserror::Error;

use crate::process::ProcessError;

/// Errors returned by [`VersionControlClient`](crate::VersionControlClient) operations.
#[derive(Debug, Error)]
pub enum GitError {
    /// git could not be run to completion (missing binary, deadline expired).
    #[error(transparent)]
    Process(#[from] ProcessError),

    /// git ran and exited with a non-zero status.
    #[error("`{command}` failed: {stderr}")]
    CommandFailed {
        /// The rendered command line.
        command: String,
        /// Exit code (`None` if killed by a signal).
        exit_code: Option<i32>,
        /// git's stderr, trimmed.
        stderr: String,
    },

    /// git's output did not have the expected shape.
    #[error("unexpected output from `{command}`: {message}")]
    Parse {
        /// The rendered command line.
        command: String,
        /// What was wrong with the output.
        message: String,
    },

    /// A local file-system operation failed (temp dir creation, cleanup).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl GitError {
    /// Returns `true` if the operation was cut short by its deadline.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Process(ProcessError::TimedOut { .. }))
    }
}
