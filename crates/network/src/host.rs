//! Host networking operations.
//! - Listing the host's address bindings
//! - Creating and deleting dummy links
//! - Binding and unbinding addresses

use std::net::IpAddr;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::error::{Error, Result};
use crate::mac::MacAddress;

/// An address configured on a host device.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AddressBinding {
    /// Device carrying the address.
    pub device: String,
    /// The bound address, without its prefix length.
    pub address: IpAddr,
    /// Prefix length of the binding.
    pub prefix_len: u8,
}

/// Network operations the provisioner needs from the host.
#[async_trait]
pub trait HostNetwork
where
    Self: Send + Sync + 'static,
{
    /// Lists every address currently configured on the host.
    async fn address_bindings(&self) -> Result<Vec<AddressBinding>>;

    /// Creates a dummy link.
    async fn add_dummy_link(&self, device: &str) -> Result<()>;

    /// Sets the hardware address of a link.
    async fn set_link_address(&self, device: &str, mac: &MacAddress) -> Result<()>;

    /// Binds an address to a device.
    async fn add_address(&self, device: &str, address: IpAddr, prefix_len: u8) -> Result<()>;

    /// Brings a link up.
    async fn set_link_up(&self, device: &str) -> Result<()>;

    /// Removes an address binding from a device.
    async fn delete_address(&self, device: &str, address: IpAddr, prefix_len: u8) -> Result<()>;

    /// Deletes a dummy link.
    async fn delete_dummy_link(&self, device: &str) -> Result<()>;
}

/// [`HostNetwork`] backed by the iproute2 `ip` tool.
#[derive(Clone, Debug, Default)]
pub struct IpRoute2;

impl IpRoute2 {
    /// Creates a new `IpRoute2`.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    async fn ip(&self, args: &[&str]) -> Result<String> {
        let command = format!("ip {}", args.join(" "));
        debug!("running {}", command);

        let output = Command::new("ip")
            .args(args)
            .output()
            .await
            .map_err(|e| Error::Io("failed to run ip", e))?;

        if !output.status.success() {
            return Err(Error::CommandFailed {
                command,
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl HostNetwork for IpRoute2 {
    async fn address_bindings(&self) -> Result<Vec<AddressBinding>> {
        let stdout = self.ip(&["-o", "addr", "show"]).await?;
        parse_address_bindings(&stdout)
    }

    async fn add_dummy_link(&self, device: &str) -> Result<()> {
        self.ip(&["link", "add", device, "type", "dummy"]).await?;
        Ok(())
    }

    async fn set_link_address(&self, device: &str, mac: &MacAddress) -> Result<()> {
        let mac = mac.to_string();
        self.ip(&["link", "set", "dev", device, "address", mac.as_str()])
            .await?;
        Ok(())
    }

    async fn add_address(&self, device: &str, address: IpAddr, prefix_len: u8) -> Result<()> {
        let cidr = format!("{address}/{prefix_len}");
        let label = format!("{device}:0");
        let mut args: Vec<&str> = vec!["addr", "add", cidr.as_str()];
        if address.is_ipv4() {
            args.extend(["brd", "+"]);
        }
        args.extend(["dev", device]);
        if address.is_ipv4() {
            args.extend(["label", label.as_str()]);
        }
        self.ip(&args).await?;
        Ok(())
    }

    async fn set_link_up(&self, device: &str) -> Result<()> {
        self.ip(&["link", "set", "dev", device, "up"]).await?;
        Ok(())
    }

    async fn delete_address(&self, device: &str, address: IpAddr, prefix_len: u8) -> Result<()> {
        let cidr = format!("{address}/{prefix_len}");
        self.ip(&["addr", "del", cidr.as_str(), "dev", device])
            .await?;
        Ok(())
    }

    async fn delete_dummy_link(&self, device: &str) -> Result<()> {
        self.ip(&["link", "delete", device, "type", "dummy"]).await?;
        Ok(())
    }
}

/// Parses the one-line-per-address output of `ip -o addr show`.
///
/// ```text
/// 2: eth0    inet 192.168.0.20/24 brd 192.168.0.255 scope global eth0\       valid_lft forever
/// ```
///
/// # Errors
///
/// Returns [`Error::UnexpectedOutput`] if an `inet`/`inet6` line carries an
/// unparseable address.
pub fn parse_address_bindings(output: &str) -> Result<Vec<AddressBinding>> {
    let mut bindings = Vec::new();

    for line in output.lines() {
        let mut fields = line.split_whitespace();
        let (Some(_index), Some(device), Some(family), Some(cidr)) =
            (fields.next(), fields.next(), fields.next(), fields.next())
        else {
            continue;
        };

        if family != "inet" && family != "inet6" {
            continue;
        }

        // veth style names are reported as `name@peer`
        let device = device.split('@').next().unwrap_or(device);

        let (address, prefix_len) = cidr.split_once('/').unwrap_or((cidr, ""));
        let address = address
            .parse::<IpAddr>()
            .map_err(|e| Error::UnexpectedOutput("ip -o addr show".to_string(), e.to_string()))?;
        let prefix_len = match prefix_len.parse::<u8>() {
            Ok(len) => len,
            Err(_) if address.is_ipv4() => 32,
            Err(_) => 128,
        };

        bindings.push(AddressBinding {
            device: device.to_string(),
            address,
            prefix_len,
        });
    }

    Ok(bindings)
}
