//! Type definitions shared by the Hearth crates

mod extension_types;
mod runtime_config;

pub use extension_types::*;
pub use runtime_config::*;
