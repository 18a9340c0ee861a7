//! Host networking for agentbox clusters.
//!
//! This crate provides:
//! - Address allocation from a CIDR block
//! - Bind address resolution from a host device
//! - Per-node dummy link and working directory provisioning
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::redundant_pub_crate)]

mod allocator;
mod error;
mod host;
mod mac;
mod provisioner;

#[cfg(any(test, feature = "test-helpers"))]
pub mod mock;

pub use allocator::{AddressPool, allocate_addresses, parse_cidr, resolve_bind_address};
pub use error::{Error, Result};
pub use host::{AddressBinding, HostNetwork, IpRoute2, parse_address_bindings};
pub use mac::MacAddress;
pub use provisioner::{Provisioner, ProvisionerOptions};
