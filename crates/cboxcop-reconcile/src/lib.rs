//! cboxcop Reconcile - cross-checks between the record store and storage
//!
//! This crate provides:
//! - Bounded-concurrency share path resolution ([`resolver`])
//! - Orphan detection over a per-run partition cache ([`orphan`])
//! - Project record operations ([`projects`])
//! - The project share transfer workflow ([`transfer`])

pub mod orphan;
pub mod projects;
pub mod resolver;
pub mod transfer;

pub use orphan::{PartitionCache, ProjectFilter, Reconciliation, reconcile};
pub use resolver::{ResolveOptions, ShareRow, into_input_order, resolve_all};
pub use transfer::{Confirm, ShareTransfer, TransferRequest};
