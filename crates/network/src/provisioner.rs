//! Per-node network and filesystem resources.
//!
//! Every node gets a dummy link named after its allocation index carrying the
//! node's address, plus a working directory. Failures are logged and never
//! abort a multi-node run: leftover state is picked up again by the stale
//! binding sweep the next time the node is provisioned.

use std::io::ErrorKind;
use std::sync::Arc;
use std::time::Duration;

use agentbox_topology::Node;
use tracing::{debug, info, warn};

use crate::host::{AddressBinding, HostNetwork};
use crate::mac::MacAddress;

/// Settings shared by every node the provisioner handles.
#[derive(Clone, Debug)]
pub struct ProvisionerOptions {
    /// Host-owned device pinned to the first server. Never created or removed.
    pub bind_device: Option<String>,

    /// Prefix of every device name this run generates.
    pub device_prefix: String,

    /// Prefix length used when binding node addresses.
    pub prefix_len: u8,

    /// Keep an already bound address instead of recreating its device.
    pub reuse_existing: bool,

    /// Delay between tearing down the network and removing the directory.
    pub release_settle: Duration,
}

impl Default for ProvisionerOptions {
    fn default() -> Self {
        Self {
            bind_device: None,
            device_prefix: String::new(),
            prefix_len: 24,
            reuse_existing: false,
            release_settle: Duration::from_secs(3),
        }
    }
}

/// Creates and destroys node resources on the host.
#[derive(Debug)]
pub struct Provisioner<N>
where
    N: HostNetwork,
{
    network: Arc<N>,
    options: ProvisionerOptions,
}

impl<N> Provisioner<N>
where
    N: HostNetwork,
{
    /// Creates a new `Provisioner`.
    pub const fn new(network: Arc<N>, options: ProvisionerOptions) -> Self {
        Self { network, options }
    }

    /// Whether `device` is the host-owned bind override device.
    #[must_use]
    pub fn is_bind_device(&self, device: &str) -> bool {
        self.options.bind_device.as_deref() == Some(device)
    }

    /// Creates the node's link, address and working directory.
    ///
    /// Safe to call repeatedly: an address still bound from an earlier
    /// unclean run is released before the link is created again.
    pub async fn provision(&self, node: &Node) {
        if self.is_bind_device(&node.device) {
            debug!(node = %node.name, device = %node.device, "using host device");
        } else {
            let stale = self.bindings_of(node).await;

            if stale.is_empty() {
                self.create_network(node).await;
            } else if self.options.reuse_existing {
                info!(node = %node.name, address = %node.address, "reusing existing binding");
            } else {
                self.release_stale(node, &stale).await;
                self.create_network(node).await;
            }
        }

        if let Err(e) = tokio::fs::create_dir_all(&node.dir).await {
            warn!(node = %node.name, "failed to create {}: {}", node.dir.display(), e);
        }
    }

    /// Removes the node's address, link and working directory.
    pub async fn release(&self, node: &Node) {
        if self.is_bind_device(&node.device) {
            debug!(node = %node.name, device = %node.device, "leaving host device in place");
        } else {
            // the binding may predate the current block's prefix length
            let prefix_len = self
                .bindings_of(node)
                .await
                .into_iter()
                .find(|binding| binding.device == node.device)
                .map_or(self.options.prefix_len, |binding| binding.prefix_len);

            if let Err(e) = self
                .network
                .delete_address(&node.device, node.address, prefix_len)
                .await
            {
                warn!(node = %node.name, "failed to remove address: {}", e);
            }

            if let Err(e) = self.network.delete_dummy_link(&node.device).await {
                warn!(node = %node.name, "failed to delete device: {}", e);
            }
        }

        // let the stopped agent let go of its data files
        tokio::time::sleep(self.options.release_settle).await;

        match tokio::fs::remove_dir_all(&node.dir).await {
            Ok(()) => debug!(node = %node.name, "removed {}", node.dir.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(node = %node.name, "failed to remove {}: {}", node.dir.display(), e),
        }
    }

    async fn bindings_of(&self, node: &Node) -> Vec<AddressBinding> {
        match self.network.address_bindings().await {
            Ok(bindings) => bindings
                .into_iter()
                .filter(|binding| binding.address == node.address)
                .collect(),
            Err(e) => {
                warn!(node = %node.name, "failed to list host addresses: {}", e);
                Vec::new()
            }
        }
    }

    async fn release_stale(&self, node: &Node, stale: &[AddressBinding]) {
        for binding in stale {
            if self.is_bind_device(&binding.device) {
                continue;
            }

            info!(
                node = %node.name,
                "releasing stale binding {}/{} on {}",
                binding.address, binding.prefix_len, binding.device
            );

            if let Err(e) = self
                .network
                .delete_address(&binding.device, binding.address, binding.prefix_len)
                .await
            {
                warn!(node = %node.name, "failed to remove stale address: {}", e);
            }

            if binding.device.starts_with(&self.options.device_prefix)
                && !self.options.device_prefix.is_empty()
            {
                if let Err(e) = self.network.delete_dummy_link(&binding.device).await {
                    warn!(node = %node.name, "failed to delete stale device: {}", e);
                }
            }
        }
    }

    async fn create_network(&self, node: &Node) {
        let device = node.device.as_str();

        if let Err(e) = self.network.add_dummy_link(device).await {
            warn!(node = %node.name, "failed to create device: {}", e);
        }

        let mac = MacAddress::generate();
        if let Err(e) = self.network.set_link_address(device, &mac).await {
            warn!(node = %node.name, "failed to set mac address: {}", e);
        }

        if let Err(e) = self
            .network
            .add_address(device, node.address, self.options.prefix_len)
            .await
        {
            warn!(node = %node.name, "failed to bind address: {}", e);
        }

        if let Err(e) = self.network.set_link_up(device).await {
            warn!(node = %node.name, "failed to bring up device: {}", e);
        }

        debug!(node = %node.name, device, %mac, "device ready");
    }
}

#[cfg(test)]
mod tests {
    use std::net::IpAddr;
    use std::path::Path;

    use agentbox_topology::Role;
    use tempfile::TempDir;

    use super::*;
    use crate::mock::{MockNetwork, NetworkOp};

    fn node(dir: &Path, device: &str, address: &str) -> Node {
        Node::new(Role::Client, "boxc0", address.parse().unwrap(), device, dir.join("boxc0"))
    }

    fn provisioner(network: &MockNetwork, options: ProvisionerOptions) -> Provisioner<MockNetwork> {
        Provisioner::new(Arc::new(network.clone()), options)
    }

    fn options() -> ProvisionerOptions {
        ProvisionerOptions {
            device_prefix: "boxeth".to_string(),
            release_settle: Duration::ZERO,
            ..ProvisionerOptions::default()
        }
    }

    #[tokio::test]
    async fn test_provision_creates_device_and_directory() {
        let temp = TempDir::new().unwrap();
        let network = MockNetwork::new();
        let node = node(temp.path(), "boxeth3", "10.10.10.4");

        provisioner(&network, options()).provision(&node).await;

        assert_eq!(network.dummy_links(), vec!["boxeth3".to_string()]);
        assert!(network.is_up("boxeth3"));
        assert_eq!(network.devices_with(node.address), vec!["boxeth3".to_string()]);
        assert!(node.dir.is_dir());
    }

    #[tokio::test]
    async fn test_provision_twice_keeps_single_binding() {
        let temp = TempDir::new().unwrap();
        let network = MockNetwork::new();
        let node = node(temp.path(), "boxeth3", "10.10.10.4");
        let provisioner = provisioner(&network, options());

        provisioner.provision(&node).await;
        provisioner.provision(&node).await;

        assert_eq!(network.devices_with(node.address), vec!["boxeth3".to_string()]);
        assert_eq!(network.dummy_links().len(), 1);
        assert!(network.ops().contains(&NetworkOp::DeleteLink("boxeth3".to_string())));
    }

    #[tokio::test]
    async fn test_provision_sweeps_binding_left_on_other_device() {
        let temp = TempDir::new().unwrap();
        let network = MockNetwork::new();
        let provisioner = provisioner(&network, options());

        // a previous run put the address on a different index
        let old = node(temp.path(), "boxeth7", "10.10.10.4");
        provisioner.provision(&old).await;

        let new = node(temp.path(), "boxeth3", "10.10.10.4");
        provisioner.provision(&new).await;

        assert_eq!(network.devices_with(new.address), vec!["boxeth3".to_string()]);
        assert_eq!(network.dummy_links(), vec!["boxeth3".to_string()]);
    }

    #[tokio::test]
    async fn test_provision_reuses_binding_when_persisting() {
        let temp = TempDir::new().unwrap();
        let network = MockNetwork::new();
        let node = node(temp.path(), "boxeth3", "10.10.10.4");

        provisioner(&network, options()).provision(&node).await;
        let ops_before = network.ops().len();

        let persisting = ProvisionerOptions {
            reuse_existing: true,
            ..options()
        };
        provisioner(&network, persisting).provision(&node).await;

        assert_eq!(network.ops().len(), ops_before);
        assert_eq!(network.devices_with(node.address), vec!["boxeth3".to_string()]);
    }

    #[tokio::test]
    async fn test_bind_device_is_never_touched() {
        let temp = TempDir::new().unwrap();
        let address: IpAddr = "192.168.0.20".parse().unwrap();
        let network = MockNetwork::new().with_host_device("eth0", address, 24);
        let options = ProvisionerOptions {
            bind_device: Some("eth0".to_string()),
            ..options()
        };
        let provisioner = provisioner(&network, options);
        let node = node(temp.path(), "eth0", "192.168.0.20");

        provisioner.provision(&node).await;
        assert!(node.dir.is_dir());

        provisioner.release(&node).await;
        assert!(!node.dir.exists());

        assert!(network.ops().iter().all(|op| op.device() != "eth0"));
        assert_eq!(network.devices_with(address), vec!["eth0".to_string()]);
    }

    #[tokio::test]
    async fn test_release_removes_everything() {
        let temp = TempDir::new().unwrap();
        let network = MockNetwork::new();
        let node = node(temp.path(), "boxeth0", "10.10.10.1");
        let provisioner = provisioner(&network, options());

        provisioner.provision(&node).await;
        std::fs::write(node.dir.join("state.db"), b"data").unwrap();
        provisioner.release(&node).await;

        assert!(network.dummy_links().is_empty());
        assert!(network.devices_with(node.address).is_empty());
        assert!(!node.dir.exists());
    }

    #[tokio::test]
    async fn test_release_uses_bound_prefix_length() {
        let temp = TempDir::new().unwrap();
        let network = MockNetwork::new();
        let node = node(temp.path(), "boxeth0", "10.10.10.1");

        provisioner(&network, options()).provision(&node).await;

        let wider = ProvisionerOptions {
            prefix_len: 16,
            ..options()
        };
        provisioner(&network, wider).release(&node).await;

        assert!(network.devices_with(node.address).is_empty());
        assert!(
            network
                .ops()
                .contains(&NetworkOp::DeleteAddress("boxeth0".to_string(), node.address))
        );
    }

    #[tokio::test]
    async fn test_release_of_missing_resources_is_quiet() {
        let temp = TempDir::new().unwrap();
        let network = MockNetwork::new();
        let node = node(temp.path(), "boxeth0", "10.10.10.1");

        provisioner(&network, options()).release(&node).await;

        assert!(network.ops().is_empty());
    }
}
