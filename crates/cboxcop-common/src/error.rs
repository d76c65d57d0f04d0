//! Error types for cboxcop
//!
//! This module defines the common error type surfaced by project and
//! share operations. Per-lookup failures of the path resolver live in
//! the client crate and never reach this type.

use crate::types::RelPathError;
use thiserror::Error;

/// Common result type for cboxcop operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for cboxcop
#[derive(Debug, Error)]
pub enum Error {
    // Not found
    #[error("share does not exist: {0}")]
    ShareNotFound(String),

    #[error("project does not exist: {0:?}")]
    ProjectNotFound(String),

    // Malformed input
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("malformed project record {project:?}: {source}")]
    InvalidRelPath {
        project: String,
        #[source]
        source: RelPathError,
    },

    // Authorization / preconditions
    #[error(
        "share {0} does not point to a file or folder inside a project; only shares on projects can be transferred"
    )]
    NotProjectShare(i64),

    #[error(
        "{account:?} does not belong to the admin group {group:?}; only admins can manage shares, ask the user to join the admin group"
    )]
    NotProjectAdmin { account: String, group: String },

    #[error("aborted")]
    Aborted,

    // External collaborators
    #[error("record store error: {0}")]
    Store(String),

    #[error("namespace listing failed: {0}")]
    Listing(String),

    #[error("group lookup failed: {0}")]
    GroupLookup(String),
}

impl Error {
    /// Create an invalid argument error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Check if this is a not found error
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::ShareNotFound(_) | Self::ProjectNotFound(_))
    }

    /// Check if this error denies the requested mutation
    #[must_use]
    pub const fn is_denied(&self) -> bool {
        matches!(
            self,
            Self::NotProjectShare(_) | Self::NotProjectAdmin { .. } | Self::Aborted
        )
    }

    /// Process exit code for the command that hit this error
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Store(_) => 2,
            _ => 1,
        }
    }
}
