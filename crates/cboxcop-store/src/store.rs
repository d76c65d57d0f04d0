//! Record store abstraction.
//!
//! Provides typed query/mutation methods for shares and projects. The
//! MySQL backend is used in production; the in-memory backend serves
//! tests and dry runs.

use async_trait::async_trait;
use cboxcop_common::{ProjectSpace, Share, ShareId};
use futures::stream::BoxStream;

/// Error type for record store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("record already exists: {0}")]
    Duplicate(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl From<StoreError> for cboxcop_common::Error {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::InvalidArgument(msg) => Self::InvalidArgument(msg),
            other => Self::Store(other.to_string()),
        }
    }
}

/// Selects which shares a listing returns
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ShareQuery {
    Id(ShareId),
    Owner(String),
    ShareWith(String),
    Token(String),
    All,
}

impl ShareQuery {
    /// Whether a share satisfies this query
    #[must_use]
    pub fn matches(&self, share: &Share) -> bool {
        match self {
            Self::Id(id) => share.id == *id,
            Self::Owner(owner) => &share.owner == owner,
            Self::ShareWith(with) => &share.share_with == with,
            Self::Token(token) => &share.token == token,
            Self::All => true,
        }
    }
}

/// Gateway to the relational store
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Shares matching a query, in store order
    async fn find_shares(&self, query: &ShareQuery) -> StoreResult<Vec<Share>>;

    /// Rewrite the owning account of a share. No other column changes.
    async fn update_share_owner(&self, id: ShareId, new_owner: &str) -> StoreResult<()>;

    /// Every registered project, streamed in store order
    fn stream_projects(&self) -> BoxStream<'_, StoreResult<ProjectSpace>>;

    async fn insert_project(&self, project: &ProjectSpace) -> StoreResult<()>;

    async fn delete_project(&self, name: &str) -> StoreResult<()>;

    async fn update_project_owner(&self, name: &str, new_owner: &str) -> StoreResult<()>;
}

/// Argument checks shared by every backend before rewriting a share owner
pub(crate) fn check_share_owner_update(id: ShareId, new_owner: &str) -> StoreResult<()> {
    if id == 0 {
        return Err(StoreError::InvalidArgument("share id is 0".into()));
    }
    if new_owner.is_empty() {
        return Err(StoreError::InvalidArgument("new owner is empty".into()));
    }
    Ok(())
}

/// Argument checks shared by every backend before touching a project row
pub(crate) fn check_project_name(name: &str) -> StoreResult<()> {
    if name.is_empty() {
        return Err(StoreError::InvalidArgument("project name is empty".into()));
    }
    Ok(())
}
