//! cboxcop Common - Shared types and utilities
//!
//! This crate provides the share/project data model, error definitions
//! and configuration types used across all cboxcop components.

pub mod config;
pub mod error;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use types::*;
