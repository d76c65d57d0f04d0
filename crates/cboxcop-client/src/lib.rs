//! cboxcop Client - external collaborators
//!
//! Path lookups against the storage instances' HTTP endpoint, partition
//! listings through the filesystem CLI, and group membership lookups.

pub mod groups;
pub mod metadata;
pub mod namespace;

pub use groups::{CommandGroupDirectory, GroupDirectory, GroupError};
pub use metadata::{EosMetadataClient, PathResolver, ResolveError};
pub use namespace::{EosNamespaceLister, ListError, NamespaceLister};
