//! Address allocation from a CIDR block.

use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

use cidr::Ipv4Cidr;
use tracing::debug;

use crate::error::{Error, Result};
use crate::host::HostNetwork;

/// Ordered usable addresses of a CIDR block.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AddressPool {
    cidr: Ipv4Cidr,
    addresses: Vec<Ipv4Addr>,
}

impl AddressPool {
    /// Prefix length used when binding pool addresses to a device.
    #[must_use]
    pub fn network_length(&self) -> u8 {
        self.cidr.network_length()
    }

    /// Usable addresses in ascending order.
    #[must_use]
    pub fn addresses(&self) -> &[Ipv4Addr] {
        &self.addresses
    }

    /// Number of usable addresses.
    #[must_use]
    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    /// Whether the block has no usable address at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    /// Addresses widened to [`IpAddr`].
    pub fn ip_addrs(&self) -> impl Iterator<Item = IpAddr> + '_ {
        self.addresses.iter().copied().map(IpAddr::V4)
    }
}

/// Parses an IPv4 CIDR block such as `10.10.10.0/24`.
///
/// # Errors
///
/// Returns [`Error::InvalidCidr`] if the block has no prefix length, is not
/// IPv4, or has host bits set.
pub fn parse_cidr(cidr: &str) -> Result<Ipv4Cidr> {
    let trimmed = cidr.trim();
    if !trimmed.contains('/') {
        return Err(Error::InvalidCidr(
            cidr.to_string(),
            "missing prefix length".to_string(),
        ));
    }

    Ipv4Cidr::from_str(trimmed).map_err(|e| Error::InvalidCidr(cidr.to_string(), e.to_string()))
}

/// Walks every address of `cidr` and returns all but the network and
/// broadcast addresses.
///
/// Blocks holding fewer than two addresses are returned as they are, so a
/// `/32` yields its single address and never fails for being too small.
///
/// # Errors
///
/// Returns [`Error::InvalidCidr`] if the block cannot be parsed.
pub fn allocate_addresses(cidr: &str) -> Result<AddressPool> {
    let block = parse_cidr(cidr)?;

    let first = u32::from(block.first_address());
    let last = u32::from(block.last_address());
    let mut addresses: Vec<Ipv4Addr> = (first..=last).map(Ipv4Addr::from).collect();

    if addresses.len() >= 2 {
        addresses.pop();
        addresses.remove(0);
    }

    debug!("allocated {} addresses from {}", addresses.len(), block);

    Ok(AddressPool {
        cidr: block,
        addresses,
    })
}

/// Looks up the first address configured on a host device.
///
/// The subnet suffix is stripped. Returns `None` when the device does not
/// exist or carries no address.
///
/// # Errors
///
/// Returns an error if the host address bindings cannot be listed.
pub async fn resolve_bind_address<N>(network: &N, device: &str) -> Result<Option<IpAddr>>
where
    N: HostNetwork + ?Sized,
{
    let bindings = network.address_bindings().await?;

    Ok(bindings
        .into_iter()
        .find(|binding| binding.device == device)
        .map(|binding| binding.address))
}
