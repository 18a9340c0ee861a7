//! A single simulated cluster member

use std::fmt;
use std::net::IpAddr;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Role of a node in the cluster.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Takes part in consensus and is joined by every other server.
    Server,
    /// Runs workloads and registers with the servers.
    Client,
}

impl Role {
    /// Whether this is the server role.
    #[must_use]
    pub const fn is_server(self) -> bool {
        matches!(self, Self::Server)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Server => write!(f, "server"),
            Self::Client => write!(f, "client"),
        }
    }
}

/// One simulated cluster member.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Node {
    /// Server or client
    pub role: Role,

    /// Agent node name
    pub name: String,

    /// Region the agent advertises
    pub region: String,

    /// Datacenter the agent advertises
    pub datacenter: String,

    /// Node pool label (clients)
    pub pool: String,

    /// Address the agent binds to
    pub address: IpAddr,

    /// Network device carrying the address
    pub device: String,

    /// Working and data directory
    pub dir: PathBuf,

    /// Agent config file
    #[serde(default)]
    pub config: Option<PathBuf>,

    /// Extra launch parameters appended to the agent command line
    #[serde(default)]
    pub params: Vec<String>,

    /// Process id of the running agent. Only valid inside the process that
    /// started it.
    #[serde(skip)]
    pub pid: Option<u32>,
}

impl Node {
    /// Creates a node in region `global`, datacenter `dc1`, pool `default`.
    pub fn new(
        role: Role,
        name: impl Into<String>,
        address: IpAddr,
        device: impl Into<String>,
        dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            role,
            name: name.into(),
            region: "global".to_string(),
            datacenter: "dc1".to_string(),
            pool: "default".to_string(),
            address,
            device: device.into(),
            dir: dir.into(),
            config: None,
            params: Vec::new(),
            pid: None,
        }
    }

    /// Whether this node is a server.
    #[must_use]
    pub const fn is_server(&self) -> bool {
        self.role.is_server()
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{} [ {} : {} : {} ]",
            self.region,
            self.datacenter,
            self.name,
            self.address,
            self.device,
            self.dir.display()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_display() {
        let node = Node::new(
            Role::Server,
            "boxs0",
            "10.10.10.1".parse().unwrap(),
            "boxeth0",
            "/tmp/agentbox/boxs0",
        );

        assert_eq!(
            node.to_string(),
            "global.dc1.boxs0 [ 10.10.10.1 : boxeth0 : /tmp/agentbox/boxs0 ]"
        );
    }

    #[test]
    fn test_pid_is_not_serialized() {
        let mut node = Node::new(
            Role::Client,
            "boxc0",
            "10.10.10.4".parse().unwrap(),
            "boxeth3",
            "/tmp/agentbox/boxc0",
        );
        node.pid = Some(4242);

        let json = serde_json::to_value(&node).unwrap();
        assert!(json.get("pid").is_none());
        assert_eq!(json["role"], "client");

        let back: Node = serde_json::from_value(json).unwrap();
        assert_eq!(back.pid, None);
        assert_eq!(back.name, "boxc0");
    }
}
