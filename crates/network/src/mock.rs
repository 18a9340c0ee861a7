//! In-memory [`HostNetwork`] used by tests.

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::host::{AddressBinding, HostNetwork};
use crate::mac::MacAddress;

/// A host network operation recorded by [`MockNetwork`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum NetworkOp {
    /// `ip link add <device> type dummy`
    AddLink(String),
    /// `ip link set dev <device> address <mac>`
    SetMac(String, MacAddress),
    /// `ip addr add <address> dev <device>`
    AddAddress(String, IpAddr),
    /// `ip link set dev <device> up`
    LinkUp(String),
    /// `ip addr del <address> dev <device>`
    DeleteAddress(String, IpAddr),
    /// `ip link delete <device> type dummy`
    DeleteLink(String),
}

impl NetworkOp {
    /// The device the operation targeted.
    #[must_use]
    pub fn device(&self) -> &str {
        match self {
            Self::AddLink(device)
            | Self::SetMac(device, _)
            | Self::AddAddress(device, _)
            | Self::LinkUp(device)
            | Self::DeleteAddress(device, _)
            | Self::DeleteLink(device) => device,
        }
    }
}

#[derive(Clone, Debug, Default)]
struct MockLink {
    dummy: bool,
    up: bool,
    mac: Option<MacAddress>,
    addresses: Vec<(IpAddr, u8)>,
}

#[derive(Debug, Default)]
struct MockState {
    links: BTreeMap<String, MockLink>,
    ops: Vec<NetworkOp>,
}

/// Simulates the host's links and addresses, recording every mutation.
#[derive(Clone, Debug, Default)]
pub struct MockNetwork {
    state: Arc<Mutex<MockState>>,
}

fn refused(command: String, stderr: &str) -> Error {
    Error::CommandFailed {
        command,
        status: ExitStatus::from_raw(2 << 8),
        stderr: stderr.to_string(),
    }
}

impl MockNetwork {
    /// Creates an empty host.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a host-owned (non dummy) device carrying `address`.
    #[must_use]
    pub fn with_host_device(self, device: &str, address: IpAddr, prefix_len: u8) -> Self {
        self.state.lock().links.insert(
            device.to_string(),
            MockLink {
                dummy: false,
                up: true,
                mac: None,
                addresses: vec![(address, prefix_len)],
            },
        );
        self
    }

    /// Every recorded mutation, in order.
    #[must_use]
    pub fn ops(&self) -> Vec<NetworkOp> {
        self.state.lock().ops.clone()
    }

    /// Names of every existing dummy link.
    #[must_use]
    pub fn dummy_links(&self) -> Vec<String> {
        self.state
            .lock()
            .links
            .iter()
            .filter(|(_, link)| link.dummy)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Whether a link exists and is up.
    #[must_use]
    pub fn is_up(&self, device: &str) -> bool {
        self.state
            .lock()
            .links
            .get(device)
            .is_some_and(|link| link.up)
    }

    /// Devices currently carrying `address`.
    #[must_use]
    pub fn devices_with(&self, address: IpAddr) -> Vec<String> {
        self.state
            .lock()
            .links
            .iter()
            .filter(|(_, link)| link.addresses.iter().any(|(a, _)| *a == address))
            .map(|(name, _)| name.clone())
            .collect()
    }
}

#[async_trait]
impl HostNetwork for MockNetwork {
    async fn address_bindings(&self) -> Result<Vec<AddressBinding>> {
        let state = self.state.lock();
        Ok(state
            .links
            .iter()
            .flat_map(|(device, link)| {
                link.addresses
                    .iter()
                    .map(move |(address, prefix_len)| AddressBinding {
                        device: device.clone(),
                        address: *address,
                        prefix_len: *prefix_len,
                    })
            })
            .collect())
    }

    async fn add_dummy_link(&self, device: &str) -> Result<()> {
        let mut state = self.state.lock();
        if state.links.contains_key(device) {
            return Err(refused(
                format!("ip link add {device} type dummy"),
                "RTNETLINK answers: File exists",
            ));
        }
        state.links.insert(
            device.to_string(),
            MockLink {
                dummy: true,
                ..MockLink::default()
            },
        );
        state.ops.push(NetworkOp::AddLink(device.to_string()));
        Ok(())
    }

    async fn set_link_address(&self, device: &str, mac: &MacAddress) -> Result<()> {
        let mut state = self.state.lock();
        let Some(link) = state.links.get_mut(device) else {
            return Err(refused(
                format!("ip link set dev {device} address {mac}"),
                "Cannot find device",
            ));
        };
        link.mac = Some(*mac);
        state.ops.push(NetworkOp::SetMac(device.to_string(), *mac));
        Ok(())
    }

    async fn add_address(&self, device: &str, address: IpAddr, prefix_len: u8) -> Result<()> {
        let mut state = self.state.lock();
        let command = format!("ip addr add {address}/{prefix_len} dev {device}");
        let Some(link) = state.links.get_mut(device) else {
            return Err(refused(command, "Cannot find device"));
        };
        if link.addresses.iter().any(|(a, _)| *a == address) {
            return Err(refused(command, "RTNETLINK answers: File exists"));
        }
        link.addresses.push((address, prefix_len));
        state
            .ops
            .push(NetworkOp::AddAddress(device.to_string(), address));
        Ok(())
    }

    async fn set_link_up(&self, device: &str) -> Result<()> {
        let mut state = self.state.lock();
        let Some(link) = state.links.get_mut(device) else {
            return Err(refused(
                format!("ip link set dev {device} up"),
                "Cannot find device",
            ));
        };
        link.up = true;
        state.ops.push(NetworkOp::LinkUp(device.to_string()));
        Ok(())
    }

    async fn delete_address(&self, device: &str, address: IpAddr, prefix_len: u8) -> Result<()> {
        let mut state = self.state.lock();
        let command = format!("ip addr del {address}/{prefix_len} dev {device}");
        let Some(link) = state.links.get_mut(device) else {
            return Err(refused(command, "Cannot find device"));
        };
        let before = link.addresses.len();
        link.addresses
            .retain(|(a, len)| *a != address || *len != prefix_len);
        if link.addresses.len() == before {
            return Err(refused(
                command,
                "RTNETLINK answers: Cannot assign requested address",
            ));
        }
        state
            .ops
            .push(NetworkOp::DeleteAddress(device.to_string(), address));
        Ok(())
    }

    async fn delete_dummy_link(&self, device: &str) -> Result<()> {
        let mut state = self.state.lock();
        let command = format!("ip link delete {device} type dummy");
        match state.links.get(device).map(|link| link.dummy) {
            Some(true) => {
                state.links.remove(device);
                state.ops.push(NetworkOp::DeleteLink(device.to_string()));
                Ok(())
            }
            Some(false) => Err(refused(
                command,
                "RTNETLINK answers: Operation not supported",
            )),
            None => Err(refused(command, "Cannot find device")),
        }
    }
}
