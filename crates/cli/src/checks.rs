//! Pre-flight checks run before anything touches the host.

use std::path::{Path, PathBuf};

use agentbox_network::{HostNetwork, allocate_addresses, resolve_bind_address};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::args::Args;

/// A failed pre-flight check.
#[derive(Debug, Error)]
pub enum CheckError {
    /// The bind device carries no address.
    #[error("bind device {0} has no address")]
    BindDevice(String),

    /// The address block does not parse.
    #[error(transparent)]
    Cidr(agentbox_network::Error),

    /// The address block is too small for every node.
    #[error("{cidr} holds {available} addresses but {needed} nodes need one each")]
    InsufficientAddresses {
        /// The block
        cidr: String,
        /// Usable addresses in the block
        available: usize,
        /// Nodes requested
        needed: usize,
    },

    /// A configured file does not exist.
    #[error("{0} does not exist: {1}")]
    MissingFile(&'static str, PathBuf),

    /// A required host tool is not on the path.
    #[error("{0} is not installed: {1}")]
    MissingTool(&'static str, which::Error),

    /// Networking needs root.
    #[error("agentbox must run as root")]
    NotRoot,

    /// The host network could not be inspected.
    #[error("failed to inspect host network: {0}")]
    Network(agentbox_network::Error),

    /// Dummy links only exist on Linux.
    #[error("agentbox needs linux, not {0}")]
    UnsupportedOs(&'static str),
}

/// Runs every check and returns the failures. Each check is logged.
pub async fn preflight<N>(args: &Args, network: &N) -> Vec<CheckError>
where
    N: HostNetwork + ?Sized,
{
    info!("pre-flight checks");

    let mut failures = Vec::new();

    info!(" - checking os");
    failures.extend(check_os(std::env::consts::OS));

    info!(" - checking user");
    failures.extend(check_root(nix::unistd::Uid::effective().is_root()));

    info!(" - checking installed tools");
    failures.extend(which::which("ip").err().map(|e| CheckError::MissingTool("ip", e)));

    info!(" - checking server count");
    if args.servers % 2 == 0 {
        warn!("   an even number of servers ({}) cannot tolerate an extra failure", args.servers);
    }

    info!(" - checking files");
    failures.extend(check_files(args));

    info!(" - checking cidr");
    failures.extend(check_cidr(&args.cidr, args.servers + args.clients));

    if let Some(device) = &args.bind_device {
        info!(" - checking bind device");
        failures.extend(check_bind_device(network, device).await);
    }

    for failure in &failures {
        error!("   {failure}");
    }

    failures
}

fn check_os(os: &'static str) -> Option<CheckError> {
    (os != "linux").then_some(CheckError::UnsupportedOs(os))
}

const fn check_root(is_root: bool) -> Option<CheckError> {
    if is_root { None } else { Some(CheckError::NotRoot) }
}

fn check_files(args: &Args) -> Vec<CheckError> {
    let files: [(&'static str, Option<&Path>); 5] = [
        ("agent binary", Some(args.binary.as_path())),
        ("server config", args.server_config.as_deref()),
        ("client config", args.client_config.as_deref()),
        ("server params", args.server_params.as_deref()),
        ("client params", args.client_params.as_deref()),
    ];

    files
        .into_iter()
        .filter_map(|(what, path)| path.map(|path| (what, path)))
        .filter(|(_, path)| !path.exists())
        .map(|(what, path)| CheckError::MissingFile(what, path.to_path_buf()))
        .collect()
}

fn check_cidr(cidr: &str, needed: usize) -> Option<CheckError> {
    match allocate_addresses(cidr) {
        Ok(pool) if pool.len() < needed => Some(CheckError::InsufficientAddresses {
            cidr: cidr.to_string(),
            available: pool.len(),
            needed,
        }),
        Ok(_) => None,
        Err(e) => Some(CheckError::Cidr(e)),
    }
}

async fn check_bind_device<N>(network: &N, device: &str) -> Option<CheckError>
where
    N: HostNetwork + ?Sized,
{
    match resolve_bind_address(network, device).await {
        Ok(Some(_)) => None,
        Ok(None) => Some(CheckError::BindDevice(device.to_string())),
        Err(e) => Some(CheckError::Network(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use agentbox_network::mock::MockNetwork;
    use clap::Parser;
    use tempfile::TempDir;

    #[test]
    fn test_os_and_user() {
        assert!(check_os("linux").is_none());
        assert!(matches!(
            check_os("macos"),
            Some(CheckError::UnsupportedOs("macos"))
        ));
        assert!(check_root(true).is_none());
        assert!(matches!(check_root(false), Some(CheckError::NotRoot)));
    }

    #[test]
    fn test_missing_files() {
        let dir = TempDir::new().unwrap();
        let binary = dir.path().join("nomad");
        std::fs::write(&binary, "").unwrap();
        let missing = dir.path().join("server.hcl");

        let args = Args::try_parse_from([
            "agentbox",
            "--binary",
            binary.to_str().unwrap(),
            "--server-config",
            missing.to_str().unwrap(),
        ])
        .unwrap();

        let failures = check_files(&args);

        assert_eq!(failures.len(), 1);
        assert!(matches!(
            &failures[0],
            CheckError::MissingFile("server config", path) if *path == missing
        ));
    }

    #[test]
    fn test_cidr_capacity() {
        assert!(check_cidr("10.10.10.0/24", 9).is_none());
        assert!(matches!(
            check_cidr("10.10.10.0/29", 9),
            Some(CheckError::InsufficientAddresses {
                available: 6,
                needed: 9,
                ..
            })
        ));
        assert!(matches!(
            check_cidr("not-a-cidr", 9),
            Some(CheckError::Cidr(_))
        ));
    }

    #[tokio::test]
    async fn test_bind_device() {
        let network =
            MockNetwork::new().with_host_device("eth0", "192.168.1.50".parse().unwrap(), 24);

        assert!(check_bind_device(&network, "eth0").await.is_none());
        assert!(matches!(
            check_bind_device(&network, "eth1").await,
            Some(CheckError::BindDevice(device)) if device == "eth1"
        ));
    }
}
