use crate::error::{Error, Result};
use hearth_core::types::{ExtensionKind, ExtensionRecord};
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Install pipeline states, in the order a successful run visits them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstallState {
    Extracting,
    Settling,
    Flattening,
    ReadingManifest,
    ResolvingEntry,
    ManifestOnlyUpdate,
    Validating,
    RemovingOldVersion,
    Relocating,
    PostProcessing,
    Registering,
    Done,
    Failed,
}

impl InstallState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Extracting => "extracting",
            Self::Settling => "settling",
            Self::Flattening => "flattening",
            Self::ReadingManifest => "reading_manifest",
            Self::ResolvingEntry => "resolving_entry",
            Self::ManifestOnlyUpdate => "manifest_only_update",
            Self::Validating => "validating",
            Self::RemovingOldVersion => "removing_old_version",
            Self::Relocating => "relocating",
            Self::PostProcessing => "post_processing",
            Self::Registering => "registering",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl fmt::Display for InstallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared flag that aborts an install at the next state boundary
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    canceled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::SeqCst);
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }

    /// `Err(UserCanceled)` once canceled
    pub fn check(&self) -> Result<()> {
        if self.is_canceled() {
            Err(Error::UserCanceled)
        } else {
            Ok(())
        }
    }
}

/// State of one install run
#[derive(Debug)]
pub struct InstallContext {
    pub install_id: String,
    pub archive: PathBuf,
    /// Private extraction directory, a hidden sibling of the destination
    pub temp_dir: PathBuf,
    /// Final location, known once the manifest is read
    pub dest_dir: Option<PathBuf>,
    pub extension_id: Option<String>,
    pub kind: Option<ExtensionKind>,
    pub manifest_only: bool,
    /// New files are in place; cancellation no longer applies
    pub committed: bool,
    pub state: InstallState,
    pub started: Instant,
    /// Ids whose installs led to this one, outermost first
    pub chain: Vec<String>,
}

impl InstallContext {
    pub fn new(archive: PathBuf, temp_dir: PathBuf, chain: Vec<String>) -> Self {
        Self {
            install_id: uuid::Uuid::new_v4().to_string(),
            archive,
            temp_dir,
            dest_dir: None,
            extension_id: None,
            kind: None,
            manifest_only: false,
            committed: false,
            state: InstallState::Extracting,
            started: Instant::now(),
            chain,
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

/// Result of a successful install
#[derive(Debug, Clone)]
pub struct InstallReport {
    pub record: ExtensionRecord,
    /// Only `info.json` was replaced in an existing installation
    pub manifest_only: bool,
    /// The files are in place but the registry did not show the extension
    /// after the final refresh
    pub registry_stale: bool,
    pub installed_dependencies: Vec<String>,
    pub missing_dependencies: Vec<String>,
}
