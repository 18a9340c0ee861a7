//! Error types for topology operations

use std::io;

use thiserror::Error;

/// Result type for topology operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Topology-related errors
#[derive(Debug, Error)]
pub enum Error {
    /// Fewer usable addresses than requested nodes
    #[error("cidr allows {available} addresses but {needed} nodes were requested")]
    InsufficientAddresses {
        /// Nodes requested.
        needed: usize,
        /// Addresses available.
        available: usize,
    },

    /// A generated device name does not fit the kernel's interface name limit
    #[error("device name '{0}' is longer than 15 bytes")]
    DeviceNameTooLong(String),

    /// Two nodes claim the same address or device
    #[error("duplicate {0} '{1}' in topology")]
    Duplicate(&'static str, String),

    /// IO error.
    #[error("io error: {0} - {1}")]
    Io(&'static str, #[source] io::Error),

    /// JSON error
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
