//! # hearth-core
//!
//! Core library for Hearth providing:
//! - Runtime configuration loading (embedded defaults, user file, environment)
//! - Shared extension types (records, kinds, origins)
//! - Retry execution engine with policy-based configuration

pub mod config;
pub mod error;
pub mod retry;
pub mod types;

pub use config::HierarchicalConfigLoader;
pub use error::{Error, Result};
