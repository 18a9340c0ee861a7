use std::path::{Path, PathBuf};
use std::time::Duration;

use agentbox_cluster::{ClusterConfig, Timings};
use agentbox_topology::TopologyOptions;
use clap::Parser;

use crate::Error;

#[derive(Clone, Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Agent binary
    #[arg(long, default_value = "/usr/bin/nomad", env = "AGENTBOX_BINARY")]
    pub binary: PathBuf,

    /// Network device whose address the first server binds to
    #[arg(long, alias = "bind-server", env = "AGENTBOX_BIND_DEVICE")]
    pub bind_device: Option<String>,

    /// CIDR block node addresses are allocated from
    #[arg(long, default_value = "10.10.10.0/24", env = "AGENTBOX_CIDR")]
    pub cidr: String,

    /// Release leftover devices and directories, then exit
    #[arg(long, env = "AGENTBOX_CLEAN")]
    pub clean: bool,

    /// Agent config file for clients
    #[arg(long, env = "AGENTBOX_CLIENT_CONFIG")]
    pub client_config: Option<PathBuf>,

    /// File of extra launch parameters for clients
    #[arg(long, env = "AGENTBOX_CLIENT_PARAMS")]
    pub client_params: Option<PathBuf>,

    /// Client name prefix
    #[arg(long, default_value = "c", env = "AGENTBOX_CLIENT_PREFIX")]
    pub client_prefix: String,

    /// Number of clients
    #[arg(long, default_value_t = 6, env = "AGENTBOX_CLIENTS")]
    pub clients: usize,

    /// Datacenter every agent joins
    #[arg(long, default_value = "dc1", env = "AGENTBOX_DATACENTER")]
    pub datacenter: String,

    /// Working directory
    #[arg(long, default_value = "/tmp/agentbox", env = "AGENTBOX_DIRECTORY")]
    pub directory: PathBuf,

    /// Write the planned node layout to nodes.json
    #[arg(long, env = "AGENTBOX_EXPORT")]
    pub export: bool,

    /// Reuse the node layout from nodes.json
    #[arg(long, env = "AGENTBOX_IMPORT")]
    pub import: bool,

    /// Echo agent output
    #[arg(long, env = "AGENTBOX_LOG")]
    pub log: bool,

    /// Agent log level when output is echoed
    #[arg(long, default_value = "INFO", env = "AGENTBOX_LOG_LEVEL")]
    pub log_level: String,

    /// Node pool clients register in
    #[arg(long, default_value = "default", env = "AGENTBOX_NODE_POOL")]
    pub node_pool: String,

    /// Keep devices and directories after the run
    #[arg(long, env = "AGENTBOX_PERSIST")]
    pub persist: bool,

    /// Plan the cluster without touching the host
    #[arg(long, env = "AGENTBOX_PLAN")]
    pub plan: bool,

    /// Prefix of node and device names
    #[arg(long, default_value = "box", env = "AGENTBOX_PREFIX")]
    pub prefix: String,

    /// Region every agent joins
    #[arg(long, default_value = "global", env = "AGENTBOX_REGION")]
    pub region: String,

    /// Seconds between releasing a node's network and removing its directory
    #[arg(long, default_value_t = 3, env = "AGENTBOX_RELEASE_SETTLE")]
    pub release_settle: u64,

    /// Agent config file for servers
    #[arg(long, env = "AGENTBOX_SERVER_CONFIG")]
    pub server_config: Option<PathBuf>,

    /// File of extra launch parameters for servers
    #[arg(long, env = "AGENTBOX_SERVER_PARAMS")]
    pub server_params: Option<PathBuf>,

    /// Server name prefix
    #[arg(long, default_value = "s", env = "AGENTBOX_SERVER_PREFIX")]
    pub server_prefix: String,

    /// Seconds to wait after starting each server
    #[arg(long, default_value_t = 3, env = "AGENTBOX_SERVER_SETTLE")]
    pub server_settle: u64,

    /// Number of servers
    #[arg(long, default_value_t = 3, env = "AGENTBOX_SERVERS")]
    pub servers: usize,

    /// Seconds between liveness checks while stopping agents
    #[arg(long, default_value_t = 3, env = "AGENTBOX_STOP_POLL")]
    pub stop_poll: u64,

    /// Seconds before an agent ignoring SIGINT is killed
    #[arg(long, env = "AGENTBOX_STOP_TIMEOUT")]
    pub stop_timeout: Option<u64>,
}

impl Args {
    /// Turns the flags into a cluster configuration, reading params files.
    pub async fn cluster_config(&self) -> Result<ClusterConfig, Error> {
        let server_params = load_params(self.server_params.as_deref()).await?;
        let client_params = load_params(self.client_params.as_deref()).await?;

        Ok(ClusterConfig {
            topology: TopologyOptions {
                servers: self.servers,
                clients: self.clients,
                directory: self.directory.clone(),
                prefix: self.prefix.clone(),
                server_prefix: self.server_prefix.clone(),
                client_prefix: self.client_prefix.clone(),
                region: self.region.clone(),
                datacenter: self.datacenter.clone(),
                node_pool: self.node_pool.clone(),
                bind_device: self.bind_device.clone(),
                server_config: self.server_config.clone(),
                client_config: self.client_config.clone(),
                server_params,
                client_params,
            },
            binary: self.binary.clone(),
            cidr: self.cidr.clone(),
            log: self.log,
            log_level: self.log_level.clone(),
            export: self.export,
            import: self.import,
            persist: self.persist,
            plan: self.plan,
            clean: self.clean,
            stop_timeout: self.stop_timeout.map(Duration::from_secs),
            timings: Timings {
                server_settle: Duration::from_secs(self.server_settle),
                stop_poll: Duration::from_secs(self.stop_poll),
                release_settle: Duration::from_secs(self.release_settle),
                ..Timings::default()
            },
        })
    }
}

async fn load_params(path: Option<&Path>) -> Result<Vec<String>, Error> {
    let Some(path) = path else {
        return Ok(Vec::new());
    };

    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| Error::Params(path.to_path_buf(), e))?;

    Ok(parse_params(&text))
}

/// Splits a params file into arguments. `#` starts a comment.
fn parse_params(text: &str) -> Vec<String> {
    text.lines()
        .map(|line| line.split_once('#').map_or(line, |(args, _)| args))
        .flat_map(str::split_whitespace)
        .map(str::to_string)
        .collect()
}
