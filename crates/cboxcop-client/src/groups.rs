//! Group membership lookups
//!
//! Membership is read from the host's identity stack (`id -Gn <account>`
//! by default), which resolves e-groups through the directory service.

use async_trait::async_trait;
use cboxcop_common::config::GroupsConfig;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Error from a group lookup
#[derive(Debug, thiserror::Error)]
pub enum GroupError {
    #[error("failed to run {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("looking up groups of {account:?} failed: {stderr}")]
    Failed { account: String, stderr: String },
}

impl From<GroupError> for cboxcop_common::Error {
    fn from(e: GroupError) -> Self {
        Self::GroupLookup(e.to_string())
    }
}

/// Resolves the groups an account belongs to
#[async_trait]
pub trait GroupDirectory: Send + Sync {
    async fn groups_of(&self, account: &str) -> Result<Vec<String>, GroupError>;
}

/// [`GroupDirectory`] running a configurable lookup command
pub struct CommandGroupDirectory {
    config: GroupsConfig,
}

impl CommandGroupDirectory {
    #[must_use]
    pub const fn new(config: GroupsConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl GroupDirectory for CommandGroupDirectory {
    async fn groups_of(&self, account: &str) -> Result<Vec<String>, GroupError> {
        let output = Command::new(&self.config.command)
            .args(&self.config.args)
            .arg(account)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| GroupError::Spawn {
                command: self.config.command.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(GroupError::Failed {
                account: account.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let groups: Vec<String> = String::from_utf8_lossy(&output.stdout)
            .split_whitespace()
            .map(str::to_string)
            .collect();
        debug!("{} belongs to {} groups", account, groups.len());
        Ok(groups)
    }
}
