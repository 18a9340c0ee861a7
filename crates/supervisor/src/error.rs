//! Error types for process supervision.

use std::io;

use thiserror::Error;

/// Result type for process supervision.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while starting or stopping agents.
#[derive(Debug, Error)]
pub enum Error {
    /// The launch arguments for a node are incomplete.
    #[error("invalid arguments for {0}: {1}")]
    InvalidArguments(String, &'static str),

    /// The pid cannot name a process.
    #[error("invalid pid {0}")]
    InvalidPid(u32),

    /// IO error.
    #[error("io error: {0} - {1}")]
    Io(&'static str, #[source] io::Error),

    /// Failed to spawn a process
    #[error("Failed to spawn process: {0}")]
    SpawnProcess(String),
}
