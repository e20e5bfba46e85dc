//! Extension management commands
//!
//! - install: Install an extension archive
//! - list: List installed extensions
//! - remove: Remove an installed extension
//! - toggle: Enable or disable an extension
//! - scan: Rescan the extension directories

mod common;
pub mod install;
pub mod list;
pub mod remove;
pub mod scan;
pub mod toggle;
