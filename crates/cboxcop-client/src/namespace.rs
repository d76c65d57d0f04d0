//! Partition listings through the filesystem CLI
//!
//! Lists the project directories of one partition letter with
//! `eos root://eosproject-<letter>.cern.ch ls /eos/project/<letter>`.

use async_trait::async_trait;
use cboxcop_common::config::NamespaceConfig;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Error from a partition listing
#[derive(Debug, thiserror::Error)]
pub enum ListError {
    #[error("failed to run {binary}: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },
    #[error("listing {dir} exited with {code:?}: {stderr}")]
    Failed {
        dir: String,
        code: Option<i32>,
        stderr: String,
    },
}

impl From<ListError> for cboxcop_common::Error {
    fn from(e: ListError) -> Self {
        Self::Listing(e.to_string())
    }
}

/// Enumerates the entries of a namespace partition
#[async_trait]
pub trait NamespaceLister: Send + Sync {
    /// Entry names directly under `partition`
    async fn list(&self, partition: &str) -> Result<Vec<String>, ListError>;
}

/// [`NamespaceLister`] shelling out to the `eos` client
pub struct EosNamespaceLister {
    config: NamespaceConfig,
}

impl EosNamespaceLister {
    #[must_use]
    pub const fn new(config: NamespaceConfig) -> Self {
        Self { config }
    }
}

/// One entry per non-blank output line
fn parse_listing(stdout: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(stdout)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

#[async_trait]
impl NamespaceLister for EosNamespaceLister {
    async fn list(&self, partition: &str) -> Result<Vec<String>, ListError> {
        let mgm = self.config.mgm_for(partition);
        let dir = self.config.partition_dir(partition);
        debug!("Listing {} on {}", dir, mgm);

        let output = Command::new(&self.config.eos_binary)
            .arg(&mgm)
            .arg("ls")
            .arg(&dir)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| ListError::Spawn {
                binary: self.config.eos_binary.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(ListError::Failed {
                dir,
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let entries = parse_listing(&output.stdout);
        debug!("{} entries under {}", entries.len(), dir);
        Ok(entries)
    }
}
