//! Error types for cluster lifecycle control.

use thiserror::Error;

use crate::cluster::Phase;

/// Result type for cluster lifecycle control.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while planning or running a cluster.
#[derive(Debug, Error)]
pub enum Error {
    /// The cluster is not in a phase that allows the operation.
    #[error("cannot {operation} a {phase} cluster")]
    InvalidPhase {
        /// Attempted operation
        operation: &'static str,
        /// Phase the cluster was in
        phase: Phase,
    },

    /// Host network error.
    #[error(transparent)]
    Network(#[from] agentbox_network::Error),

    /// Process supervision error.
    #[error("failed to start {0}: {1}")]
    Start(String, #[source] agentbox_supervisor::Error),

    /// Topology error.
    #[error(transparent)]
    Topology(#[from] agentbox_topology::Error),
}
