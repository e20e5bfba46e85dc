//! Persisted per-extension state
//!
//! `extensions-state.json` maps extension ids to their enabled flag and a
//! pending-removal flag. Every write is a locked read-modify-write so two
//! processes toggling different extensions do not lose each other's update.

use crate::error::{Error, IoResultExt, Result};
use fs4::fs_std::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// State of one extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionState {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub remove: bool,
}

fn default_enabled() -> bool {
    true
}

impl Default for ExtensionState {
    fn default() -> Self {
        Self {
            enabled: true,
            remove: false,
        }
    }
}

/// File-backed extension state
#[derive(Debug, Clone)]
pub struct ExtensionStateStore {
    path: PathBuf,
}

impl ExtensionStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current state of every known extension; a missing file is empty
    pub fn load(&self) -> Result<BTreeMap<String, ExtensionState>> {
        match fs::read_to_string(&self.path) {
            Ok(raw) => parse(&self.path, &raw),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(Error::io(&self.path, e)),
        }
    }

    pub fn get(&self, id: &str) -> Result<ExtensionState> {
        Ok(self.load()?.get(id).copied().unwrap_or_default())
    }

    pub fn set_enabled(&self, id: &str, enabled: bool) -> Result<()> {
        self.update(|states| {
            states.entry(id.to_string()).or_default().enabled = enabled;
        })
    }

    /// Flag an extension whose directory could not be deleted; the next
    /// scan deletes it before loading anything
    pub fn mark_for_removal(&self, id: &str) -> Result<()> {
        self.update(|states| {
            states.entry(id.to_string()).or_default().remove = true;
        })
    }

    /// Drop every trace of an extension
    pub fn forget(&self, id: &str) -> Result<()> {
        self.update(|states| {
            states.remove(id);
        })
    }

    fn update<F>(&self, mutate: F) -> Result<()>
    where
        F: FnOnce(&mut BTreeMap<String, ExtensionState>),
    {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).at(parent)?;
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .at(&self.path)?;

        // Released when `file` is dropped
        file.lock_exclusive().at(&self.path)?;

        let mut raw = String::new();
        file.read_to_string(&mut raw).at(&self.path)?;
        let mut states = if raw.trim().is_empty() {
            BTreeMap::new()
        } else {
            parse(&self.path, &raw)?
        };

        mutate(&mut states);

        let json = serde_json::to_string_pretty(&states)
            .map_err(|e| Error::io(&self.path, io::Error::new(io::ErrorKind::InvalidData, e)))?;
        file.set_len(0).at(&self.path)?;
        file.seek(SeekFrom::Start(0)).at(&self.path)?;
        file.write_all(json.as_bytes()).at(&self.path)?;
        file.sync_all().at(&self.path)?;

        debug!("Updated extension state in {}", self.path.display());
        Ok(())
    }
}

fn parse(path: &Path, raw: &str) -> Result<BTreeMap<String, ExtensionState>> {
    serde_json::from_str(raw).map_err(|source| Error::invalid_json(path, source))
}
