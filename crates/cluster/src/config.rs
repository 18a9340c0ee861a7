//! Cluster configuration

use std::path::PathBuf;
use std::time::Duration;

use agentbox_network::ProvisionerOptions;
use agentbox_supervisor::SupervisorOptions;
use agentbox_topology::{TopologyOptions, TopologyStore};

/// Delays the lifecycle waits on.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Timings {
    /// Delay between pid lookups after spawning
    pub pid_poll: Duration,

    /// Pause after each server start
    pub server_settle: Duration,

    /// Delay between liveness checks while stopping
    pub stop_poll: Duration,

    /// Pause between releasing a node's network and removing its directory
    pub release_settle: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            pid_poll: Duration::from_millis(100),
            server_settle: Duration::from_secs(3),
            stop_poll: Duration::from_secs(3),
            release_settle: Duration::from_secs(3),
        }
    }
}

impl Timings {
    /// No waiting at all.
    #[must_use]
    pub const fn immediate() -> Self {
        Self {
            pid_poll: Duration::ZERO,
            server_settle: Duration::ZERO,
            stop_poll: Duration::ZERO,
            release_settle: Duration::ZERO,
        }
    }
}

/// Everything needed to plan, run and tear down a local cluster.
#[derive(Clone, Debug)]
pub struct ClusterConfig {
    /// Node layout
    pub topology: TopologyOptions,

    /// Agent executable
    pub binary: PathBuf,

    /// Address block nodes are allocated from
    pub cidr: String,

    /// Echo agent output
    pub log: bool,

    /// Level handed to agents when their output is echoed
    pub log_level: String,

    /// Write the planned topology to `<directory>/nodes.json`
    pub export: bool,

    /// Reuse the topology in `<directory>/nodes.json` when present
    pub import: bool,

    /// Keep devices and directories after shutdown and reuse them on start
    pub persist: bool,

    /// Stop after planning
    pub plan: bool,

    /// Release every node's resources and exit
    pub clean: bool,

    /// Escalate to SIGKILL when an agent ignores SIGINT this long
    pub stop_timeout: Option<Duration>,

    /// Delays
    pub timings: Timings,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            topology: TopologyOptions::default(),
            binary: PathBuf::from("/usr/bin/nomad"),
            cidr: "10.10.10.0/24".to_string(),
            log: false,
            log_level: "INFO".to_string(),
            export: false,
            import: false,
            persist: false,
            plan: false,
            clean: false,
            stop_timeout: None,
            timings: Timings::default(),
        }
    }
}

impl ClusterConfig {
    /// Where the topology is exported to and imported from.
    #[must_use]
    pub fn store(&self) -> TopologyStore {
        TopologyStore::in_directory(&self.topology.directory)
    }

    /// Options for a [`agentbox_supervisor::ProcessSupervisor`].
    #[must_use]
    pub fn supervisor_options(&self) -> SupervisorOptions {
        SupervisorOptions {
            binary: self.binary.clone(),
            log_output: self.log,
            log_level: self.log_level.clone(),
            pid_poll: self.timings.pid_poll,
            server_settle: self.timings.server_settle,
            stop_poll: self.timings.stop_poll,
            stop_timeout: self.stop_timeout,
            ..SupervisorOptions::default()
        }
    }

    /// Options for the network provisioner given the block's prefix length.
    #[must_use]
    pub fn provisioner_options(&self, prefix_len: u8) -> ProvisionerOptions {
        ProvisionerOptions {
            bind_device: self.topology.bind_device.clone(),
            device_prefix: self.topology.device_prefix(),
            prefix_len,
            reuse_existing: self.persist,
            release_settle: self.timings.release_settle,
        }
    }
}
