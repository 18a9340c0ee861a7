//! Cluster topology for agentbox
//!
//! This crate provides:
//! - Node identity types (Node, Role)
//! - Deterministic topology construction from allocated addresses
//! - Topology export and import
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod builder;
mod error;
mod node;
mod store;
mod topology;

pub use builder::{TopologyOptions, build_topology};
pub use error::{Error, Result};
pub use node::{Node, Role};
pub use store::TopologyStore;
pub use topology::{CLIENT_RPC_PORT, JoinTopology, Topology};
