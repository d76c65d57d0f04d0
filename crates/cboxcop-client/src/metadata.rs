//! Path resolution against the instances' HTTP `fileinfo` endpoint
//!
//! A share only records its storage prefix and a numeric file handle.
//! The human readable path is looked up on the owning instance:
//!
//! ```text
//! GET http://<instance>.cern.ch:8000/proc/user/
//!     ?mgm.cmd=fileinfo&mgm.path=inode:<id>&mgm.file.info.option=--path&mgm.format=fuse
//!
//! 200 "path:/eos/project/c/cernbox/file"  =>  /eos/project/c/cernbox/file
//! ```
//!
//! `404` is a final answer. Other non-success statuses are retried with
//! exponential backoff up to `max_attempts`; transport errors are not
//! retried.

use async_trait::async_trait;
use cboxcop_common::config::MetadataConfig;
use cboxcop_common::external_instance;
use std::time::Duration;
use tracing::{debug, warn};

/// Error from a single path lookup
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("file id {0:?} is not an unsigned integer")]
    InvalidFileId(String),
    #[error("request failed: {0}")]
    Network(String),
    #[error("not found")]
    NotFound,
    #[error("gave up after {attempts} attempts, last status {last_status}")]
    RetriesExhausted { attempts: u32, last_status: u16 },
    #[error("empty response body")]
    EmptyBody,
    #[error("unexpected response body: {0:?}")]
    MalformedBody(String),
    #[error("timeout")]
    Timeout,
    #[error("cancelled")]
    Cancelled,
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl ResolveError {
    fn from_reqwest(e: &reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else {
            Self::Network(e.to_string())
        }
    }
}

/// Resolves storage locations to filesystem paths
#[async_trait]
pub trait PathResolver: Send + Sync {
    /// Path of the file `item_source` within the storage prefix `prefix`
    async fn resolve_path(&self, prefix: &str, item_source: &str) -> Result<String, ResolveError>;

    /// Whether `path` exists on `instance`
    async fn path_exists(&self, instance: &str, path: &str) -> Result<bool, ResolveError>;
}

/// [`PathResolver`] over the instances' HTTP proc interface
pub struct EosMetadataClient {
    config: MetadataConfig,
    http_client: reqwest::Client,
}

impl EosMetadataClient {
    pub fn new(config: MetadataConfig) -> Result<Self, ResolveError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| ResolveError::Configuration(e.to_string()))?;
        Ok(Self {
            config,
            http_client,
        })
    }

    fn proc_url(&self, instance: &str) -> String {
        format!(
            "{}/proc/user/",
            self.config.base_url(instance).trim_end_matches('/')
        )
    }

    /// Issue a fileinfo request, retrying non-success statuses other
    /// than `404`
    async fn fileinfo(&self, instance: &str, target: &str) -> Result<String, ResolveError> {
        let url = self.proc_url(instance);
        let params = [
            ("mgm.cmd", "fileinfo"),
            ("mgm.path", target),
            ("mgm.file.info.option", "--path"),
            ("mgm.format", "fuse"),
        ];
        let max_attempts = self.config.max_attempts.max(1);

        let mut attempt = 0;
        loop {
            attempt += 1;
            let response = self
                .http_client
                .get(&url)
                .query(&params)
                .send()
                .await
                .map_err(|e| ResolveError::from_reqwest(&e))?;

            let status = response.status();
            if status.is_success() {
                return response
                    .text()
                    .await
                    .map_err(|e| ResolveError::from_reqwest(&e));
            }
            if status == reqwest::StatusCode::NOT_FOUND {
                return Err(ResolveError::NotFound);
            }

            if attempt >= max_attempts {
                return Err(ResolveError::RetriesExhausted {
                    attempts: attempt,
                    last_status: status.as_u16(),
                });
            }

            let delay = self.config.backoff(attempt);
            warn!(
                "fileinfo {} on {} returned {}, retrying in {:?} (attempt {}/{})",
                target, instance, status, delay, attempt, max_attempts
            );
            tokio::time::sleep(delay).await;
        }
    }
}

/// Strip the structural tag (everything up to the first `:`) from a
/// fileinfo response body
fn strip_path_tag(body: &str) -> Result<String, ResolveError> {
    let body = body.trim();
    if body.is_empty() {
        return Err(ResolveError::EmptyBody);
    }
    let (_, path) = body
        .split_once(':')
        .ok_or_else(|| ResolveError::MalformedBody(body.to_string()))?;
    let path = path.trim_start();
    if path.is_empty() {
        return Err(ResolveError::EmptyBody);
    }
    Ok(path.to_string())
}

#[async_trait]
impl PathResolver for EosMetadataClient {
    async fn resolve_path(&self, prefix: &str, item_source: &str) -> Result<String, ResolveError> {
        let inode: u64 = item_source
            .trim()
            .parse()
            .map_err(|_| ResolveError::InvalidFileId(item_source.to_string()))?;
        let instance = external_instance(prefix);
        let body = self.fileinfo(&instance, &format!("inode:{inode}")).await?;
        let path = strip_path_tag(&body)?;
        debug!("Resolved {}:{} to {}", prefix, inode, path);
        Ok(path)
    }

    async fn path_exists(&self, instance: &str, path: &str) -> Result<bool, ResolveError> {
        match self.fileinfo(instance, path).await {
            Ok(body) => Ok(!body.trim().is_empty()),
            Err(ResolveError::NotFound) => Ok(false),
            Err(e) => Err(e),
        }
    }
}
