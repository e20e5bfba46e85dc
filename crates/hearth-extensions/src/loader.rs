//! Startup scan of the extension directories
//!
//! The scan is synchronous: it runs once before anything else in the host
//! needs the extension set. Directories are visited in priority order and
//! the first copy of an id wins. Later copies only decide whether the
//! registered one is outdated.

use crate::error::{Error, Result};
use crate::fsutil::{is_ignorable_entry, sanitize_dir_name};
use crate::manifest::ManifestReader;
use crate::state::ExtensionStateStore;
use crate::validator::ExtensionValidator;
use hearth_core::retry::retry_blocking;
use hearth_core::types::{ExtensionKind, ExtensionRecord, Origin, RetryPolicy};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// A directory to scan and where its extensions come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRoot {
    pub path: PathBuf,
    pub origin: Origin,
}

impl ScanRoot {
    pub fn user(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            origin: Origin::User,
        }
    }

    pub fn bundled(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            origin: Origin::Bundled,
        }
    }
}

/// Outcome of a scan
#[derive(Debug, Clone, Default)]
pub struct ScanResult {
    /// Active extensions by id
    pub extensions: BTreeMap<String, ExtensionRecord>,
    /// Copies superseded by an equal or newer copy
    pub outdated: Vec<ExtensionRecord>,
}

impl ScanResult {
    pub fn has_outdated(&self) -> bool {
        !self.outdated.is_empty()
    }
}

/// Scans extension directories into a [`ScanResult`]
#[derive(Debug, Clone)]
pub struct ExtensionLoader {
    state: ExtensionStateStore,
    validator: ExtensionValidator,
    policy: RetryPolicy,
}

impl ExtensionLoader {
    pub fn new(state: ExtensionStateStore, validator: ExtensionValidator, policy: RetryPolicy) -> Self {
        Self {
            state,
            validator,
            policy,
        }
    }

    pub fn state(&self) -> &ExtensionStateStore {
        &self.state
    }

    /// Scan `roots` in priority order
    ///
    /// Blocks the calling thread; from async code run it on a blocking
    /// task.
    pub fn scan(&self, roots: &[ScanRoot]) -> Result<ScanResult> {
        let purged = self.purge_removed(roots);
        let disabled: HashSet<String> = self
            .state
            .load()
            .unwrap_or_else(|e| {
                warn!("Failed to read extension state, treating all as enabled: {}", e);
                BTreeMap::new()
            })
            .into_iter()
            .filter(|(_, s)| !s.enabled)
            .map(|(id, _)| id)
            .collect();

        let mut result = ScanResult::default();

        for root in roots {
            for record in self.scan_root(root, &disabled, &purged, &mut result.outdated) {
                match result.extensions.get_mut(&record.id) {
                    Some(existing) => {
                        debug!(
                            "{} also found at {}, keeping {}",
                            record.id,
                            record.path.display(),
                            existing.path.display()
                        );
                        if record.semver() >= existing.semver() {
                            existing.outdated = true;
                            result.outdated.push(existing.clone());
                        }
                    }
                    None => {
                        result.extensions.insert(record.id.clone(), record);
                    }
                }
            }
        }

        info!(
            "Loaded {} extensions ({} outdated)",
            result.extensions.len(),
            result.outdated.len()
        );
        Ok(result)
    }

    /// Delete extensions flagged for removal and forget their state
    ///
    /// A flagged id is matched against folder names and against the ids
    /// declared in each folder's manifest, so an extension installed under
    /// a folder named differently from its id is found too. State is only
    /// forgotten for ids whose folders were all deleted; the rest stay
    /// flagged for the next start. Every flagged id is returned so this
    /// scan skips it either way.
    fn purge_removed(&self, roots: &[ScanRoot]) -> HashSet<String> {
        let flagged: HashSet<String> = match self.state.load() {
            Ok(states) => states
                .into_iter()
                .filter(|(_, s)| s.remove)
                .map(|(id, _)| id)
                .collect(),
            Err(e) => {
                warn!("Failed to read extension state: {}", e);
                return HashSet::new();
            }
        };
        if flagged.is_empty() {
            return flagged;
        }

        let mut failed: HashSet<String> = HashSet::new();

        for root in roots.iter().filter(|r| !r.origin.is_bundled()) {
            let dirs = match child_dirs(&root.path) {
                Ok(dirs) => dirs,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => {
                    warn!("Cannot read {}: {}", root.path.display(), e);
                    failed.extend(flagged.iter().cloned());
                    continue;
                }
            };

            for dir in dirs {
                let Some(id) = flagged_id(&dir, &flagged) else {
                    continue;
                };
                let removed = retry_blocking("purge extension", &self.policy, || {
                    match fs::remove_dir_all(&dir) {
                        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
                        other => other.map_err(|e| Error::io(&dir, e)),
                    }
                });
                match removed {
                    Ok(()) => info!("Removed extension {} from {}", id, dir.display()),
                    Err(e) => {
                        warn!("Failed to remove extension {}: {}", id, Error::from(e));
                        failed.insert(id);
                    }
                }
            }
        }

        for id in flagged.iter().filter(|id| !failed.contains(*id)) {
            if let Err(e) = self.state.forget(id) {
                warn!("Failed to clear state of removed extension {}: {}", id, e);
            }
        }

        flagged
    }

    fn scan_root(
        &self,
        root: &ScanRoot,
        disabled: &HashSet<String>,
        purged: &HashSet<String>,
        outdated: &mut Vec<ExtensionRecord>,
    ) -> Vec<ExtensionRecord> {
        let dirs = match child_dirs(&root.path) {
            Ok(dirs) => dirs,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!("Extension directory {} does not exist", root.path.display());
                if let Err(e) = fs::create_dir_all(&root.path) {
                    warn!("Cannot create {}: {}", root.path.display(), e);
                }
                return Vec::new();
            }
            Err(e) => {
                warn!("Cannot read {}: {}", root.path.display(), e);
                return Vec::new();
            }
        };

        let mut found: BTreeMap<String, ExtensionRecord> = BTreeMap::new();

        for dir in dirs {
            let folder = folder_name(&dir);
            if disabled.contains(&folder) || purged.contains(&folder) {
                debug!("Extension {} is disabled or removed", folder);
                continue;
            }

            let before = Instant::now();
            let Some(record) = self.load_one(&dir, root.origin) else {
                continue;
            };
            if disabled.contains(&record.id) || purged.contains(&record.id) {
                debug!("Extension {} is disabled or removed", record.id);
                continue;
            }
            debug!(
                "Loaded extension {} from {} in {:?}",
                record.id,
                root.path.display(),
                before.elapsed()
            );

            match found.remove(&record.id) {
                Some(previous) => {
                    warn!(
                        "Multiple copies of extension {}: {} and {}",
                        record.id,
                        previous.path.display(),
                        record.path.display()
                    );
                    let (keep, drop) = if previous.semver() > record.semver() {
                        (previous, record)
                    } else {
                        (record, previous)
                    };
                    outdated.push(drop.into_outdated());
                    found.insert(keep.id.clone(), keep);
                }
                None => {
                    found.insert(record.id.clone(), record);
                }
            }
        }

        found.into_values().collect()
    }

    fn load_one(&self, dir: &Path, origin: Origin) -> Option<ExtensionRecord> {
        let manifest = match ManifestReader::read_blocking(dir) {
            Ok(manifest) => manifest,
            Err(e) => {
                warn!("Ignoring unreadable manifest in {}: {}", dir.display(), e);
                ManifestReader::synthesized(dir)
            }
        };

        let declared = manifest
            .info
            .kind
            .as_deref()
            .and_then(ExtensionKind::from_declared);

        match self.validator.classify_immediate(dir, declared, manifest.name()) {
            Ok(kind) => Some(ManifestReader::record(dir, &manifest, kind, origin)),
            Err(e) => {
                debug!("Skipping {}: {}", dir.display(), e);
                None
            }
        }
    }
}

/// Extension candidate folders of `root`, sorted
fn child_dirs(root: &Path) -> io::Result<Vec<PathBuf>> {
    let mut dirs: Vec<PathBuf> = fs::read_dir(root)?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .filter(|e| !is_ignorable_entry(&e.file_name().to_string_lossy()))
        .map(|e| e.path())
        .collect();
    dirs.sort();
    Ok(dirs)
}

fn folder_name(dir: &Path) -> String {
    dir.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// The flagged id `dir` holds, by folder name or by declared id
fn flagged_id(dir: &Path, flagged: &HashSet<String>) -> Option<String> {
    let folder = folder_name(dir);
    if let Some(id) = flagged
        .iter()
        .find(|id| **id == folder || sanitize_dir_name(id) == folder)
    {
        return Some(id.clone());
    }

    ManifestReader::read_blocking(dir)
        .ok()
        .map(|manifest| manifest.id)
        .filter(|id| flagged.contains(id))
}
