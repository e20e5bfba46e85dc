//! Extension installation and loading for Hearth
//!
//! This crate provides:
//! - Archive extraction with platform-specific fallbacks
//! - Package classification (full extension, theme, translation, game)
//! - Manifest reading and merging
//! - Entry script discovery
//! - Dependency discovery through a capability probe
//! - The install pipeline and the startup loader
//! - A registry cache shared by both

pub mod archive;
pub mod catalog;
pub mod entry;
pub mod error;
pub mod events;
pub mod fsutil;
pub mod loader;
pub mod manifest;
pub mod pipeline;
pub mod probe;
pub mod registry;
pub mod state;
pub mod types;
pub mod validator;

pub use archive::{ArchiveExtractor, ArchiveFormat, ExtractOptions};
pub use catalog::{ArchiveSource, AvailableExtension, Catalog, EmptyCatalog, LocalCatalog};
pub use entry::EntryScriptResolver;
pub use error::{Error, Result};
pub use events::InstallEvent;
pub use loader::{ExtensionLoader, ScanResult, ScanRoot};
pub use manifest::{idify, ManifestReader};
pub use pipeline::{CancelToken, InstallPipeline, InstallReport, InstallState};
pub use probe::{DependencyProbe, ExtensionContext, ProbeContext};
pub use registry::ExtensionRegistry;
pub use state::ExtensionStateStore;
pub use types::{ExtensionInfo, Manifest};
pub use validator::ExtensionValidator;

pub use hearth_core::types::{ExtensionKind, ExtensionRecord, Origin};
