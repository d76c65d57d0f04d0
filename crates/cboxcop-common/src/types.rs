//! Core type definitions for cboxcop
//!
//! This module defines the records read from the sharing database:
//! shares (grants on a single file or folder) and project spaces
//! (registered group workspaces), plus the strict parser for a
//! project's `<letter>/<name>` relative path.

use chrono::{DateTime, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Internal namespace token used in share prefixes and instance names
const INTERNAL_NAMESPACE_TOKEN: &str = "new";

/// Externally addressable replacement for [`INTERNAL_NAMESPACE_TOKEN`]
const EXTERNAL_NAMESPACE_TOKEN: &str = "eos";

/// Placeholder printed for empty or unresolvable columns
pub const SENTINEL: &str = "-";

/// Numeric share identifier (primary key of the share table)
pub type ShareId = i64;

/// Parse a share id given on the command line
pub fn parse_share_id(raw: &str) -> Result<ShareId> {
    raw.trim()
        .parse::<ShareId>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| Error::invalid_argument(format!("share id {raw:?} is not a positive integer")))
}

/// Kind of grant a share represents
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ShareType {
    /// Shared with a single account
    User,
    /// Shared with an e-group
    Group,
    /// Anonymous public link
    PublicLink,
    /// Any code the sharing subsystem added after this tool was written
    Unknown(i32),
}

impl ShareType {
    /// Decode the `share_type` column
    #[must_use]
    pub const fn from_code(code: i32) -> Self {
        match code {
            0 => Self::User,
            1 => Self::Group,
            3 => Self::PublicLink,
            other => Self::Unknown(other),
        }
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user-share",
            Self::Group => "egroup-share",
            Self::PublicLink => "public-link",
            Self::Unknown(_) => "unknown",
        }
    }
}

/// Permission level granted by a share
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Permission {
    ReadOnly,
    ReadWrite,
}

impl Permission {
    /// Decode the `permissions` bitmask column. Only the bare read bit
    /// (`1`) is read-only; every other mask carries a write bit.
    #[must_use]
    pub const fn from_code(code: i32) -> Self {
        if code == 1 {
            Self::ReadOnly
        } else {
            Self::ReadWrite
        }
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ReadOnly => "read-only",
            Self::ReadWrite => "read-write",
        }
    }
}

/// One grant of access to a filesystem object
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Share {
    pub id: ShareId,
    /// Owning account
    pub owner: String,
    /// Storage prefix, e.g. `newproject-c` or `eoshome-g`
    pub prefix: String,
    /// Opaque numeric file handle within the prefix
    pub item_source: String,
    /// Grantee account or group; empty for public links
    pub share_with: String,
    pub permission: Permission,
    pub share_type: ShareType,
    /// Link token; only set for public links
    pub token: String,
    /// Creation time, seconds since the Unix epoch
    pub stime: i64,
}

impl Share {
    /// User facing file identifier: `<prefix>:<item_source>` with the
    /// internal namespace token rewritten (`newproject-c` ⇒ `eosproject-c`).
    #[must_use]
    pub fn file_id(&self) -> String {
        format!("{}:{}", self.prefix, self.item_source)
            .replace(INTERNAL_NAMESPACE_TOKEN, EXTERNAL_NAMESPACE_TOKEN)
    }

    /// Full public link URL, if this share is a public link
    #[must_use]
    pub fn public_link(&self, base_url: &str) -> Option<String> {
        (self.share_type == ShareType::PublicLink)
            .then(|| format!("{}/{}", base_url.trim_end_matches('/'), self.token))
    }

    /// Grantee as displayed; links have none
    #[must_use]
    pub fn display_share_with(&self) -> &str {
        if self.share_type == ShareType::PublicLink {
            SENTINEL
        } else {
            &self.share_with
        }
    }

    /// Whether the shared file lives inside a project namespace
    #[must_use]
    pub fn is_project_share(&self, marker: &str) -> bool {
        self.prefix.contains(marker)
    }

    #[must_use]
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.stime, 0)
    }

    /// Checks the grant-kind invariant: links carry a token and no
    /// grantee, user and group shares carry no token.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        match self.share_type {
            ShareType::PublicLink => self.share_with.is_empty() && !self.token.is_empty(),
            ShareType::User | ShareType::Group => self.token.is_empty(),
            ShareType::Unknown(_) => true,
        }
    }
}

/// Rewrite an internal prefix (`newproject-c`) to its externally
/// addressable instance name (`eosproject-c`).
#[must_use]
pub fn external_instance(prefix: &str) -> String {
    prefix.replace(INTERNAL_NAMESPACE_TOKEN, EXTERNAL_NAMESPACE_TOKEN)
}

/// A registered group workspace
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectSpace {
    /// Project name (primary key)
    pub name: String,
    /// Relative storage path, `<letter>/<name>`
    pub rel_path: String,
    /// Owning service account
    pub owner: String,
}

impl ProjectSpace {
    /// Build a new project record, deriving its relative path from the name
    pub fn new(name: impl Into<String>, owner: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let owner = owner.into();
        if name.is_empty() || owner.is_empty() {
            return Err(Error::invalid_argument("project name or owner is empty"));
        }
        let rel_path = project_rel_path(&name)?;
        Ok(Self {
            name,
            rel_path,
            owner,
        })
    }

    /// Parse the stored relative path
    pub fn rel(&self) -> std::result::Result<RelPath, RelPathError> {
        RelPath::parse(&self.rel_path)
    }
}

/// A parsed `<partition>/<name>` project path
#[derive(Clone, Debug, PartialEq, Eq, Hash, Display)]
#[display("{partition}/{name}")]
pub struct RelPath {
    /// Partition letter the project is listed under
    pub partition: String,
    /// Bare project directory name
    pub name: String,
}

impl RelPath {
    /// Strictly parse a relative path. Exactly two non-empty segments.
    pub fn parse(rel: &str) -> std::result::Result<Self, RelPathError> {
        if rel.is_empty() {
            return Err(RelPathError::Empty);
        }
        let (partition, name) = rel
            .split_once('/')
            .ok_or_else(|| RelPathError::MissingSeparator(rel.to_string()))?;
        if name.contains('/') {
            return Err(RelPathError::TooManySegments(rel.to_string()));
        }
        if partition.is_empty() {
            return Err(RelPathError::EmptyPartition(rel.to_string()));
        }
        if name.is_empty() {
            return Err(RelPathError::EmptyName(rel.to_string()));
        }
        Ok(Self {
            partition: partition.to_string(),
            name: name.to_string(),
        })
    }
}

/// Errors that can occur when parsing a project relative path
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RelPathError {
    #[error("relative path is empty")]
    Empty,
    #[error("relative path {0:?} has no partition separator")]
    MissingSeparator(String),
    #[error("relative path {0:?} has more than two segments")]
    TooManySegments(String),
    #[error("relative path {0:?} has an empty partition")]
    EmptyPartition(String),
    #[error("relative path {0:?} has an empty project name")]
    EmptyName(String),
}

/// Last non-empty path segment, ignoring trailing separators
fn base_name(name_or_path: &str) -> Option<&str> {
    name_or_path.split('/').rev().find(|segment| !segment.is_empty())
}

/// Derive a project's relative path from its name or any path ending in it.
///
/// ```text
/// cernbox                 => c/cernbox
/// /eos/project/cernbox/   => c/cernbox
/// /eos/project/c/cernbox/ => c/cernbox
/// c/cernbox/              => c/cernbox
/// ```
pub fn project_rel_path(name_or_path: &str) -> Result<String> {
    let base = project_base_name(name_or_path)?;
    let letter: String = base.chars().take(1).flat_map(char::to_lowercase).collect();
    Ok(format!("{letter}/{base}"))
}

/// Bare project name from a name or path
pub fn project_base_name(name_or_path: &str) -> Result<&str> {
    base_name(name_or_path.trim())
        .ok_or_else(|| Error::invalid_argument(format!("invalid project name {name_or_path:?}")))
}
