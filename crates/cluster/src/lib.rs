//! Local agent clusters on a single Linux host.
//!
//! A [`LocalCluster`] plans a topology, gives every node its own dummy link
//! and working directory, starts the agents and tears everything down again.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::redundant_pub_crate)]

mod cluster;
mod config;
mod error;

pub use cluster::{LocalCluster, Phase};
pub use config::{ClusterConfig, Timings};
pub use error::{Error, Result};
