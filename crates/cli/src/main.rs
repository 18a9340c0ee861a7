//! CLI binary that runs a local agent cluster on dummy links.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::redundant_pub_crate)]

mod args;
mod checks;

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use agentbox_cluster::{ClusterConfig, LocalCluster};
use agentbox_network::{HostNetwork, IpRoute2};
use agentbox_supervisor::{ProcessSupervisor, Supervisor};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::args::Args;

/// CLI-specific error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Cluster error
    #[error(transparent)]
    Cluster(#[from] agentbox_cluster::Error),

    /// Params file could not be read
    #[error("failed to read params file {0}: {1}")]
    Params(PathBuf, #[source] io::Error),
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("failed to create runtime: {e}");
            return ExitCode::from(1);
        }
    };

    let code = match runtime.block_on(run(args)) {
        Ok(code) => code,
        Err(e) => {
            error!("{e}");
            ExitCode::from(1)
        }
    };

    // a pending stdin read cannot be cancelled
    runtime.shutdown_timeout(Duration::from_millis(100));
    code
}

async fn run(args: Args) -> Result<ExitCode, Error> {
    let network = Arc::new(IpRoute2::new());

    let failures = checks::preflight(&args, network.as_ref()).await;
    if !failures.is_empty() && !args.plan {
        return Ok(ExitCode::from(2));
    }

    let config = args.cluster_config().await?;
    let supervisor = ProcessSupervisor::new(config.supervisor_options());

    let Some(mut cluster) = prepare(config, network, supervisor).await? else {
        return Ok(ExitCode::SUCCESS);
    };

    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone());

    if let Err(e) = cluster.start(&shutdown).await {
        error!("{e}");
        cluster.shutdown().await;
        return Ok(ExitCode::from(1));
    }

    if !shutdown.is_cancelled() {
        info!("cluster running (enter to quit)");
        tokio::select! {
            () = shutdown.cancelled() => {}
            () = enter_pressed() => info!("enter pressed"),
        }
    }

    cluster.shutdown().await;
    Ok(ExitCode::SUCCESS)
}

/// Plans the cluster and handles the modes that end before anything starts.
///
/// Returns `None` once clean or plan mode is done. In plan mode a planning
/// error is only reported.
async fn prepare<N, S>(
    config: ClusterConfig,
    network: Arc<N>,
    supervisor: S,
) -> Result<Option<LocalCluster<N, S>>, Error>
where
    N: HostNetwork,
    S: Supervisor,
{
    let plan_only = config.plan;

    let mut cluster = match LocalCluster::plan(config, network, supervisor).await {
        Ok(cluster) => cluster,
        Err(e) if plan_only => {
            error!("{e}");
            info!("plan mode (quitting)");
            return Ok(None);
        }
        Err(e) => return Err(e.into()),
    };

    if cluster.config().clean {
        cluster.clean().await?;
        return Ok(None);
    }

    if plan_only {
        info!("plan mode (quitting)");
        return Ok(None);
    }

    Ok(Some(cluster))
}

fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        use tokio::signal::unix::{SignalKind, signal};

        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
                (Err(e), _) | (_, Err(e)) => {
                    error!("failed to install signal handlers: {e}");
                    return;
                }
            };

        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM"),
            _ = sigint.recv() => info!("Received SIGINT"),
        }

        info!("Shutting down");
        shutdown.cancel();
    });
}

/// Resolves when a line is read from stdin. On EOF or a read error it never
/// resolves, leaving only the signals to end the run.
async fn enter_pressed() {
    let mut line = String::new();
    let mut stdin = BufReader::new(tokio::io::stdin());

    match stdin.read_line(&mut line).await {
        Ok(read) if read > 0 => {}
        _ => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use agentbox_cluster::{Phase, Timings};
    use agentbox_network::mock::MockNetwork;
    use agentbox_supervisor::mock::MockSupervisor;
    use agentbox_topology::TopologyOptions;
    use tempfile::TempDir;

    use super::*;

    fn config(directory: &Path, cidr: &str, plan: bool) -> ClusterConfig {
        ClusterConfig {
            topology: TopologyOptions {
                directory: directory.to_path_buf(),
                ..TopologyOptions::default()
            },
            cidr: cidr.to_string(),
            plan,
            timings: Timings::immediate(),
            ..ClusterConfig::default()
        }
    }

    async fn prepared(
        config: ClusterConfig,
        network: &MockNetwork,
    ) -> Result<Option<LocalCluster<MockNetwork, MockSupervisor>>, Error> {
        prepare(config, Arc::new(network.clone()), MockSupervisor::new()).await
    }

    #[tokio::test]
    async fn test_plan_mode_reports_bad_block_and_succeeds() {
        let dir = TempDir::new().unwrap();
        let network = MockNetwork::new();

        for cidr in ["bogus", "10.10.10.0/29", "10.10.10.1/24"] {
            let outcome = prepared(config(dir.path(), cidr, true), &network).await;
            assert!(matches!(outcome, Ok(None)), "{cidr}");
        }
        assert!(network.ops().is_empty());
    }

    #[tokio::test]
    async fn test_plan_mode_stops_after_planning() {
        let dir = TempDir::new().unwrap();
        let network = MockNetwork::new();

        let outcome = prepared(config(dir.path(), "10.10.10.0/24", true), &network).await;

        assert!(matches!(outcome, Ok(None)));
        assert!(network.ops().is_empty());
    }

    #[tokio::test]
    async fn test_bad_block_fails_outside_plan_mode() {
        let dir = TempDir::new().unwrap();
        let network = MockNetwork::new();

        let outcome = prepared(config(dir.path(), "10.10.10.0/29", false), &network).await;

        assert!(matches!(outcome, Err(Error::Cluster(_))));
    }

    #[tokio::test]
    async fn test_run_mode_hands_back_planned_cluster() {
        let dir = TempDir::new().unwrap();
        let network = MockNetwork::new();

        let cluster = prepared(config(dir.path(), "10.10.10.0/24", false), &network)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(cluster.phase(), Phase::Planned);
        assert_eq!(cluster.topology().len(), 9);
        assert!(network.ops().is_empty());
    }
}
