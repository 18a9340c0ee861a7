//! Deterministic topology construction

use std::net::IpAddr;
use std::path::PathBuf;

use tracing::info;

use crate::error::{Error, Result};
use crate::node::{Node, Role};
use crate::topology::Topology;

/// Linux interface names hold at most 15 bytes.
const MAX_DEVICE_NAME_LEN: usize = 15;

/// Shape and naming of the cluster to build.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TopologyOptions {
    /// Number of server nodes.
    pub servers: usize,

    /// Number of client nodes.
    pub clients: usize,

    /// Root of every node's working directory.
    pub directory: PathBuf,

    /// Prefix of every node and device name.
    pub prefix: String,

    /// Role prefix of server names.
    pub server_prefix: String,

    /// Role prefix of client names.
    pub client_prefix: String,

    /// Region every node advertises.
    pub region: String,

    /// Datacenter every node advertises.
    pub datacenter: String,

    /// Node pool label of clients.
    pub node_pool: String,

    /// Host device pinned to the first server.
    pub bind_device: Option<String>,

    /// Agent config file for servers.
    pub server_config: Option<PathBuf>,

    /// Agent config file for clients.
    pub client_config: Option<PathBuf>,

    /// Extra launch parameters for servers.
    pub server_params: Vec<String>,

    /// Extra launch parameters for clients.
    pub client_params: Vec<String>,
}

impl Default for TopologyOptions {
    fn default() -> Self {
        Self {
            servers: 3,
            clients: 6,
            directory: PathBuf::from("/tmp/agentbox"),
            prefix: "box".to_string(),
            server_prefix: "s".to_string(),
            client_prefix: "c".to_string(),
            region: "global".to_string(),
            datacenter: "dc1".to_string(),
            node_pool: "default".to_string(),
            bind_device: None,
            server_config: None,
            client_config: None,
            server_params: Vec::new(),
            client_params: Vec::new(),
        }
    }
}

impl TopologyOptions {
    /// Total number of nodes.
    #[must_use]
    pub const fn node_count(&self) -> usize {
        self.servers + self.clients
    }

    /// Prefix shared by every generated device name.
    #[must_use]
    pub fn device_prefix(&self) -> String {
        format!("{}eth", self.prefix)
    }

    /// Device name for the node at `index`.
    #[must_use]
    pub fn device_name(&self, index: usize) -> String {
        format!("{}{index}", self.device_prefix())
    }

    fn node(&self, role: Role, ordinal: usize, index: usize, address: IpAddr) -> Node {
        let (role_prefix, config, params) = match role {
            Role::Server => (
                &self.server_prefix,
                &self.server_config,
                &self.server_params,
            ),
            Role::Client => (
                &self.client_prefix,
                &self.client_config,
                &self.client_params,
            ),
        };
        let name = format!("{}{role_prefix}{ordinal}", self.prefix);
        let dir = self.directory.join(&name);

        Node {
            role,
            region: self.region.clone(),
            datacenter: self.datacenter.clone(),
            pool: self.node_pool.clone(),
            address,
            device: self.device_name(index),
            config: config.clone(),
            params: params.clone(),
            pid: None,
            name,
            dir,
        }
    }
}

/// Builds the node set: servers first, then clients, consuming `addresses`
/// in that order.
///
/// When a bind device is configured the first server uses it instead of a
/// generated device, and `bind_address` (if resolved) instead of the first
/// pool address.
///
/// # Errors
///
/// Returns [`Error::InsufficientAddresses`] if `addresses` cannot cover every
/// node, [`Error::DeviceNameTooLong`] if a generated device name exceeds
/// the kernel limit, and [`Error::Duplicate`] if the bind override collides
/// with another node's address or device.
pub fn build_topology(
    options: &TopologyOptions,
    addresses: &[IpAddr],
    bind_address: Option<IpAddr>,
) -> Result<Topology> {
    let needed = options.node_count();
    if addresses.len() < needed {
        return Err(Error::InsufficientAddresses {
            needed,
            available: addresses.len(),
        });
    }

    if needed > 0 {
        let longest = options.device_name(needed - 1);
        if longest.len() > MAX_DEVICE_NAME_LEN {
            return Err(Error::DeviceNameTooLong(longest));
        }
    }

    info!("mapping {} servers and {} clients", options.servers, options.clients);

    let mut nodes = Vec::with_capacity(needed);
    let mut index = 0;

    for ordinal in 0..options.servers {
        let mut node = options.node(Role::Server, ordinal, index, addresses[index]);
        if let (0, Some(device)) = (ordinal, &options.bind_device) {
            node.device.clone_from(device);
            if let Some(address) = bind_address {
                node.address = address;
            }
        }
        nodes.push(node);
        index += 1;
    }

    for ordinal in 0..options.clients {
        nodes.push(options.node(Role::Client, ordinal, index, addresses[index]));
        index += 1;
    }

    let topology = Topology::new(nodes);
    topology.validate()?;

    for node in &topology {
        info!(" - {node}");
    }

    Ok(topology)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addresses(count: u8) -> Vec<IpAddr> {
        (1..=count)
            .map(|host| IpAddr::from([10, 10, 10, host]))
            .collect()
    }

    #[test]
    fn test_default_layout() {
        let options = TopologyOptions::default();
        let topology = build_topology(&options, &addresses(253), None).unwrap();

        assert_eq!(topology.len(), 9);
        let names: Vec<_> = topology.iter().map(|node| node.name.as_str()).collect();
        assert_eq!(
            names,
            [
                "boxs0", "boxs1", "boxs2", "boxc0", "boxc1", "boxc2", "boxc3", "boxc4", "boxc5"
            ]
        );
        for (index, node) in topology.iter().enumerate() {
            assert_eq!(node.address, addresses(9)[index]);
            assert_eq!(node.device, format!("boxeth{index}"));
            assert_eq!(node.dir, PathBuf::from("/tmp/agentbox").join(&node.name));
            assert_eq!(node.is_server(), index < 3);
            assert_eq!(node.pid, None);
        }
        topology.validate().unwrap();
    }

    #[test]
    fn test_servers_lead_for_any_shape() {
        for servers in 0..4 {
            for clients in 0..4 {
                let options = TopologyOptions {
                    servers,
                    clients,
                    ..TopologyOptions::default()
                };
                let topology = build_topology(&options, &addresses(20), None).unwrap();

                assert_eq!(topology.len(), servers + clients);
                assert!(topology.iter().take(servers).all(Node::is_server));
                assert!(topology.iter().skip(servers).all(|node| !node.is_server()));
            }
        }
    }

    #[test]
    fn test_build_is_deterministic() {
        let options = TopologyOptions {
            server_config: Some(PathBuf::from("/etc/agent/server.hcl")),
            client_params: vec!["-dev".to_string()],
            ..TopologyOptions::default()
        };

        let first = build_topology(&options, &addresses(30), None).unwrap();
        let second = build_topology(&options, &addresses(30), None).unwrap();

        assert_eq!(first, second);
        assert_eq!(
            first.nodes()[0].config,
            Some(PathBuf::from("/etc/agent/server.hcl"))
        );
        assert_eq!(first.nodes()[3].config, None);
        assert_eq!(first.nodes()[3].params, vec!["-dev".to_string()]);
    }

    #[test]
    fn test_bind_override_applies_to_first_server_only() {
        let options = TopologyOptions {
            bind_device: Some("eth0".to_string()),
            ..TopologyOptions::default()
        };
        let bind: IpAddr = "192.168.0.20".parse().unwrap();

        let topology = build_topology(&options, &addresses(9), Some(bind)).unwrap();

        assert_eq!(topology.nodes()[0].device, "eth0");
        assert_eq!(topology.nodes()[0].address, bind);
        assert_eq!(topology.nodes()[1].device, "boxeth1");
        assert_eq!(topology.nodes()[1].address, addresses(2)[1]);
    }

    #[test]
    fn test_bind_device_without_resolved_address() {
        let options = TopologyOptions {
            bind_device: Some("eth0".to_string()),
            ..TopologyOptions::default()
        };

        let topology = build_topology(&options, &addresses(9), None).unwrap();

        assert_eq!(topology.nodes()[0].device, "eth0");
        assert_eq!(topology.nodes()[0].address, addresses(1)[0]);
    }

    #[test]
    fn test_bind_override_must_not_collide() {
        let options = TopologyOptions {
            bind_device: Some("eth0".to_string()),
            ..TopologyOptions::default()
        };
        let inside_block = IpAddr::from([10, 10, 10, 5]);

        let err = build_topology(&options, &addresses(9), Some(inside_block)).unwrap_err();
        assert!(matches!(err, Error::Duplicate("address", value) if value == "10.10.10.5"));

        let options = TopologyOptions {
            bind_device: Some("boxeth4".to_string()),
            ..TopologyOptions::default()
        };

        let err = build_topology(&options, &addresses(9), None).unwrap_err();
        assert!(matches!(err, Error::Duplicate("device", value) if value == "boxeth4"));
    }

    #[test]
    fn test_insufficient_addresses() {
        let err = build_topology(&TopologyOptions::default(), &addresses(8), None).unwrap_err();

        assert!(matches!(
            err,
            Error::InsufficientAddresses {
                needed: 9,
                available: 8
            }
        ));
    }

    #[test]
    fn test_device_name_limit() {
        let options = TopologyOptions {
            prefix: "verylongprefix".to_string(),
            ..TopologyOptions::default()
        };

        let err = build_topology(&options, &addresses(9), None).unwrap_err();
        assert!(matches!(err, Error::DeviceNameTooLong(_)));
    }

    #[test]
    fn test_join_and_teardown_views() {
        let topology = build_topology(&TopologyOptions::default(), &addresses(9), None).unwrap();

        let join = topology.join_topology();
        assert_eq!(join.bootstrap_expect(), 3);
        assert_eq!(join.servers, addresses(3));
        assert_eq!(
            join.server_rpc_addrs().next().unwrap().to_string(),
            "10.10.10.1:4647"
        );

        assert_eq!(topology.teardown_order(9), vec![3, 4, 5, 6, 7, 8, 0, 1, 2]);
        assert_eq!(topology.teardown_order(4), vec![3, 0, 1, 2]);
        assert_eq!(topology.teardown_order(0), Vec::<usize>::new());
    }
}
