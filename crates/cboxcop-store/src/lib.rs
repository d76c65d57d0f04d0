//! cboxcop Record Store - share and project records
//!
//! This crate implements the gateway to the relational store holding
//! shares (`oc_share`) and project spaces (`cernbox_project_mapping`).

pub mod memory;
pub mod mysql;
pub mod store;

// Re-exports
pub use memory::MemoryStore;
pub use mysql::MySqlStore;
pub use store::{RecordStore, ShareQuery, StoreError, StoreResult};
