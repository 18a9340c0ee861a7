//! Error types for host network operations.

use std::io;
use std::process::ExitStatus;

use thiserror::Error;

/// Result type for host network operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while allocating addresses or driving host networking.
#[derive(Debug, Error)]
pub enum Error {
    /// The CIDR block could not be parsed.
    #[error("invalid cidr '{0}': {1}")]
    InvalidCidr(String, String),

    /// IO error.
    #[error("io error: {0} - {1}")]
    Io(&'static str, #[source] io::Error),

    /// A host command exited with a non-zero status.
    #[error("`{command}` failed ({status}): {stderr}")]
    CommandFailed {
        /// The command line that was run.
        command: String,
        /// Exit status of the command.
        status: ExitStatus,
        /// Captured standard error.
        stderr: String,
    },

    /// Output of a host command could not be understood.
    #[error("unexpected output from `{0}`: {1}")]
    UnexpectedOutput(String, String),
}
