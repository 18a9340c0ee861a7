//! Topology export and import

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::topology::Topology;

/// A persisted topology file.
#[derive(Clone, Debug)]
pub struct TopologyStore {
    path: PathBuf,
}

impl TopologyStore {
    /// File name used inside a cluster directory.
    pub const FILE_NAME: &'static str = "nodes.json";

    /// Store at an explicit path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at `<directory>/nodes.json`.
    pub fn in_directory(directory: impl AsRef<Path>) -> Self {
        Self::new(directory.as_ref().join(Self::FILE_NAME))
    }

    /// Location of the topology file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes the topology as pretty JSON. Process ids are never written.
    ///
    /// # Errors
    ///
    /// Returns an error if the file or its parent directory cannot be written.
    pub async fn export(&self, topology: &Topology) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::Io("failed to create topology directory", e))?;
        }

        let json = serde_json::to_vec_pretty(topology)?;
        tokio::fs::write(&self.path, json)
            .await
            .map_err(|e| Error::Io("failed to write topology", e))?;

        info!("exported {} nodes to {}", topology.len(), self.path.display());
        Ok(())
    }

    /// Reads a previously exported topology.
    ///
    /// A missing file is not an error and yields `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read, parsed, or
    /// holds duplicate addresses or devices.
    pub async fn import(&self) -> Result<Option<Topology>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("no topology at {}", self.path.display());
                return Ok(None);
            }
            Err(e) => return Err(Error::Io("failed to read topology", e)),
        };

        let topology: Topology = serde_json::from_slice(&bytes)?;
        topology.validate()?;

        info!("imported {} nodes from {}", topology.len(), self.path.display());
        Ok(Some(topology))
    }
}
