//! Cluster lifecycle control

use std::fmt;
use std::sync::Arc;

use agentbox_network::{
    HostNetwork, IpRoute2, Provisioner, allocate_addresses, parse_cidr, resolve_bind_address,
};
use agentbox_supervisor::{ProcessSupervisor, Supervisor};
use agentbox_topology::{Topology, build_topology};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ClusterConfig;
use crate::error::{Error, Result};

/// Prefix length for addresses of an imported topology when the block
/// does not parse.
const FALLBACK_PREFIX_LEN: u8 = 24;

/// Where a cluster is in its lifecycle. Phases only move forward.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Phase {
    /// Topology is known, nothing has been touched on the host.
    Planned,
    /// Nodes are being, or have been, provisioned and started.
    Running,
    /// Processes are stopped and resources released.
    Stopped,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Planned => write!(f, "planned"),
            Self::Running => write!(f, "running"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// A set of agents on dummy links of the local host.
#[derive(Debug)]
pub struct LocalCluster<N = IpRoute2, S = ProcessSupervisor>
where
    N: HostNetwork,
    S: Supervisor,
{
    config: ClusterConfig,
    phase: Phase,
    provisioned: usize,
    provisioner: Provisioner<N>,
    supervisor: S,
    topology: Topology,
}

impl<N, S> LocalCluster<N, S>
where
    N: HostNetwork,
    S: Supervisor,
{
    /// Works out the cluster layout without touching the host.
    ///
    /// With `import` set an existing non-empty `nodes.json` is used as is;
    /// otherwise addresses are allocated from the CIDR block and the topology
    /// built fresh. With `export` set the result is written back.
    ///
    /// # Errors
    ///
    /// Returns an error if the CIDR block is invalid, holds too few addresses,
    /// or a device name would be too long.
    pub async fn plan(config: ClusterConfig, network: Arc<N>, supervisor: S) -> Result<Self> {
        let imported = if config.import {
            Self::import(&config).await
        } else {
            None
        };

        let (topology, prefix_len) = match imported {
            Some(topology) => (topology, imported_prefix_len(&config.cidr)),
            None => Self::build(&config, network.as_ref()).await?,
        };

        if config.export {
            let store = config.store();
            match store.export(&topology).await {
                Ok(()) => info!("exported topology to {}", store.path().display()),
                Err(e) => warn!("failed to export topology: {e}"),
            }
        }

        let provisioner = Provisioner::new(network, config.provisioner_options(prefix_len));

        Ok(Self {
            config,
            phase: Phase::Planned,
            provisioned: 0,
            provisioner,
            supervisor,
            topology,
        })
    }

    async fn import(config: &ClusterConfig) -> Option<Topology> {
        let store = config.store();
        match store.import().await {
            Ok(Some(topology)) if !topology.is_empty() => {
                info!(
                    "imported {} nodes from {}",
                    topology.len(),
                    store.path().display()
                );
                for node in &topology {
                    info!(" - {node}");
                }
                Some(topology)
            }
            Ok(_) => {
                debug!("nothing to import from {}", store.path().display());
                None
            }
            Err(e) => {
                warn!("failed to import topology, building a fresh one: {e}");
                None
            }
        }
    }

    async fn build(config: &ClusterConfig, network: &N) -> Result<(Topology, u8)> {
        let pool = allocate_addresses(&config.cidr)?;
        let addresses: Vec<_> = pool.ip_addrs().collect();

        let bind_address = match &config.topology.bind_device {
            Some(device) => {
                let address = resolve_bind_address(network, device).await?;
                if address.is_none() {
                    warn!(device = %device, "bind device has no address");
                }
                address
            }
            None => None,
        };

        let topology = build_topology(&config.topology, &addresses, bind_address)?;
        Ok((topology, pool.network_length()))
    }

    /// The configuration this cluster was planned with.
    #[must_use]
    pub const fn config(&self) -> &ClusterConfig {
        &self.config
    }

    /// Current lifecycle phase.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// The planned nodes, with pids of started agents.
    #[must_use]
    pub const fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Provisions and starts every node in topology order.
    ///
    /// Stops launching further nodes once `shutdown` is cancelled; a start in
    /// flight always completes. After an error the caller still owns teardown
    /// through [`Self::shutdown`].
    ///
    /// # Errors
    ///
    /// Returns an error if the cluster was already started or an agent fails
    /// to launch.
    pub async fn start(&mut self, shutdown: &CancellationToken) -> Result<()> {
        self.enter(Phase::Running, "start")?;

        info!("building nodes");
        let join = self.topology.join_topology();

        for index in 0..self.topology.len() {
            if shutdown.is_cancelled() {
                info!("start interrupted after {index} nodes");
                return Ok(());
            }

            let node = &self.topology.nodes()[index];
            info!(" - {node}");

            self.provisioner.provision(node).await;
            self.provisioned = index + 1;

            let pid = self
                .supervisor
                .start(node, &join)
                .await
                .map_err(|e| Error::Start(node.name.clone(), e))?;

            self.topology.nodes_mut()[index].pid = Some(pid);
        }

        info!("cluster running with {} nodes", self.topology.len());
        Ok(())
    }

    /// Stops started agents, clients first, then releases their resources
    /// unless the cluster persists.
    ///
    /// Does nothing once the cluster is stopped.
    pub async fn shutdown(&mut self) {
        if self.phase == Phase::Stopped {
            return;
        }
        self.phase = Phase::Stopped;

        info!("cleaning nodes");

        for index in self.topology.teardown_order(self.provisioned) {
            let node = &mut self.topology.nodes_mut()[index];
            info!(" - {node}");

            match node.pid.take() {
                Some(pid) if self.supervisor.is_alive(pid) => {
                    if let Err(e) = self.supervisor.stop(pid).await {
                        warn!(node = %node.name, pid, "failed to stop agent: {e}");
                    }
                }
                Some(pid) => info!(node = %node.name, pid, "agent already exited"),
                None => {}
            }

            if !self.config.persist {
                self.provisioner.release(node).await;
            }
        }

        self.supervisor.finish().await;
        info!("cluster stopped");
    }

    /// Releases every node's devices and directories without touching
    /// processes.
    ///
    /// # Errors
    ///
    /// Returns an error if the cluster was already started.
    pub async fn clean(&mut self) -> Result<()> {
        self.enter(Phase::Stopped, "clean")?;

        info!("cleaning node resources");
        for node in &self.topology {
            info!(" - {node}");
            self.provisioner.release(node).await;
        }

        Ok(())
    }

    fn enter(&mut self, next: Phase, operation: &'static str) -> Result<()> {
        if self.phase != Phase::Planned {
            return Err(Error::InvalidPhase {
                operation,
                phase: self.phase,
            });
        }
        self.phase = next;
        Ok(())
    }
}

/// Imported nodes skip allocation, so a bad block only costs the prefix length.
fn imported_prefix_len(cidr: &str) -> u8 {
    match parse_cidr(cidr) {
        Ok(block) => block.network_length(),
        Err(e) => {
            warn!("{e}, binding imported addresses as /{FALLBACK_PREFIX_LEN}");
            FALLBACK_PREFIX_LEN
        }
    }
}
