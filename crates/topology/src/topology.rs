//! Ordered node sets

use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::node::Node;

/// Port clients use to reach server RPC.
pub const CLIENT_RPC_PORT: u16 = 4647;

/// Ordered cluster members, servers first.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Topology {
    nodes: Vec<Node>,
}

impl Topology {
    /// Wraps an ordered node list.
    #[must_use]
    pub const fn new(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }

    /// All nodes in topology order.
    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Mutable access for recording runtime state.
    pub fn nodes_mut(&mut self) -> &mut [Node] {
        &mut self.nodes
    }

    /// Number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the topology holds no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterates nodes in topology order.
    pub fn iter(&self) -> std::slice::Iter<'_, Node> {
        self.nodes.iter()
    }

    /// Server nodes in topology order.
    pub fn servers(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|node| node.is_server())
    }

    /// Client nodes in topology order.
    pub fn clients(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|node| !node.is_server())
    }

    /// Addresses every agent needs to find the servers.
    #[must_use]
    pub fn join_topology(&self) -> JoinTopology {
        JoinTopology {
            servers: self.servers().map(|node| node.address).collect(),
        }
    }

    /// Indices of `limit` leading nodes ordered for teardown: clients first,
    /// then servers, each group in topology order.
    #[must_use]
    pub fn teardown_order(&self, limit: usize) -> Vec<usize> {
        let started = &self.nodes[..limit.min(self.nodes.len())];
        let clients = started
            .iter()
            .enumerate()
            .filter(|(_, node)| !node.is_server());
        let servers = started
            .iter()
            .enumerate()
            .filter(|(_, node)| node.is_server());

        clients.chain(servers).map(|(index, _)| index).collect()
    }

    /// Checks that no two nodes share an address or device name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Duplicate`] naming the first repeated value.
    pub fn validate(&self) -> Result<()> {
        let mut addresses = HashSet::new();
        let mut devices = HashSet::new();

        for node in &self.nodes {
            if !addresses.insert(node.address) {
                return Err(Error::Duplicate("address", node.address.to_string()));
            }
            if !devices.insert(node.device.as_str()) {
                return Err(Error::Duplicate("device", node.device.clone()));
            }
        }

        Ok(())
    }
}

impl<'a> IntoIterator for &'a Topology {
    type Item = &'a Node;
    type IntoIter = std::slice::Iter<'a, Node>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.iter()
    }
}

/// What an agent needs to find the servers of its cluster.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct JoinTopology {
    /// Server addresses in topology order.
    pub servers: Vec<IpAddr>,
}

impl JoinTopology {
    /// Number of servers expected before the cluster bootstraps.
    #[must_use]
    pub fn bootstrap_expect(&self) -> usize {
        self.servers.len()
    }

    /// Server RPC endpoints for clients.
    pub fn server_rpc_addrs(&self) -> impl Iterator<Item = SocketAddr> + '_ {
        self.servers
            .iter()
            .map(|address| SocketAddr::new(*address, CLIENT_RPC_PORT))
    }
}
