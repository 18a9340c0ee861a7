//! Agent process supervision for agentbox clusters.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::redundant_pub_crate)]

mod args;
mod error;
mod spawn;

#[cfg(any(test, feature = "test-helpers"))]
pub mod mock;

pub use args::AgentCommand;
pub use error::{Error, Result};
pub use spawn::{ProcessSupervisor, Supervisor, SupervisorOptions, is_alive};
