//! Typed agent command lines.

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

use agentbox_topology::{JoinTopology, Node};

use crate::error::{Error, Result};

/// A fully built agent invocation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AgentCommand {
    program: PathBuf,
    args: Vec<String>,
}

impl AgentCommand {
    /// Builds the command line that launches `node` against `join`.
    ///
    /// `log_level` is forwarded as `-log-level` only when given.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArguments`] when the node has no name or device,
    /// or when a server would bootstrap with zero expected servers.
    pub fn for_node(
        program: &Path,
        node: &Node,
        join: &JoinTopology,
        log_level: Option<&str>,
    ) -> Result<Self> {
        if node.name.is_empty() {
            return Err(Error::InvalidArguments(node.address.to_string(), "empty node name"));
        }
        if node.device.is_empty() {
            return Err(Error::InvalidArguments(node.name.clone(), "empty device"));
        }

        let args = if node.is_server() {
            if join.bootstrap_expect() == 0 {
                return Err(Error::InvalidArguments(
                    node.name.clone(),
                    "server expects zero servers",
                ));
            }

            ServerArgs {
                node,
                bootstrap_expect: join.bootstrap_expect(),
                join: &join.servers,
                log_level,
            }
            .into_args()
        } else {
            ClientArgs {
                node,
                servers: join.server_rpc_addrs().collect(),
                log_level,
            }
            .into_args()
        };

        Ok(Self {
            program: program.to_path_buf(),
            args,
        })
    }

    /// Executable to run.
    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Arguments in launch order.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }
}

impl fmt::Display for AgentCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

struct ServerArgs<'a> {
    node: &'a Node,
    bootstrap_expect: usize,
    join: &'a [IpAddr],
    log_level: Option<&'a str>,
}

impl ServerArgs<'_> {
    fn into_args(self) -> Vec<String> {
        let node = self.node;
        let mut args = vec![
            "agent".to_string(),
            format!("-node={}", node.name),
            format!("-bind={}", node.address),
            format!("-bootstrap-expect={}", self.bootstrap_expect),
            format!("-data-dir={}", node.dir.display()),
            format!("-dc={}", node.datacenter),
        ];
        if let Some(config) = &node.config {
            args.push(format!("-config={}", config.display()));
        }
        args.extend(self.join.iter().map(|server| format!("-join={server}")));
        if let Some(level) = self.log_level {
            args.push(format!("-log-level={level}"));
        }
        args.push(format!("-network-interface={}", node.device));
        args.push(format!("-region={}", node.region));
        args.push("-server".to_string());
        args.extend(node.params.iter().cloned());
        args
    }
}

struct ClientArgs<'a> {
    node: &'a Node,
    servers: Vec<SocketAddr>,
    log_level: Option<&'a str>,
}

impl ClientArgs<'_> {
    fn into_args(self) -> Vec<String> {
        let node = self.node;
        let mut args = vec![
            "agent".to_string(),
            format!("-node={}", node.name),
            format!("-bind={}", node.address),
            "-client".to_string(),
            format!("-data-dir={}", node.dir.display()),
            format!("-dc={}", node.datacenter),
            format!("-node-pool={}", node.pool),
        ];
        if let Some(config) = &node.config {
            args.push(format!("-config={}", config.display()));
        }
        if let Some(level) = self.log_level {
            args.push(format!("-log-level={level}"));
        }
        args.extend(self.servers.iter().map(|server| format!("-servers={server}")));
        args.push(format!("-network-interface={}", node.device));
        args.push(format!("-region={}", node.region));
        args.extend(node.params.iter().cloned());
        args
    }
}
