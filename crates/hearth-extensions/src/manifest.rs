//! Reading, merging and writing `info.json`

use crate::error::{Error, IoResultExt, Result};
use crate::types::{ExtensionInfo, Manifest, ManifestSource};
use hearth_core::types::{ExtensionKind, ExtensionRecord, Origin};
use std::io;
use std::path::Path;
use tracing::debug;

/// Manifest file name at the package root
pub const MANIFEST_FILE: &str = "info.json";

/// Derive an id from a display name
///
/// `"Game: Skyrim Support"` becomes `"game-skyrim-support"`.
pub fn idify(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .filter(|c| *c != ':' && *c != '\'')
        .map(|c| if c == ' ' || c == '_' { '-' } else { c })
        .collect()
}

fn folder_name(root: &Path) -> String {
    root.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "extension".to_string())
}

fn parse(path: &Path, raw: &str) -> Result<ExtensionInfo> {
    serde_json::from_str(raw).map_err(|source| Error::invalid_json(path, source))
}

/// Reads extension manifests
pub struct ManifestReader;

impl ManifestReader {
    /// The parsed `info.json`, or `None` when the file does not exist
    pub async fn read_optional(root: &Path) -> Result<Option<ExtensionInfo>> {
        let path = root.join(MANIFEST_FILE);
        match tokio::fs::read_to_string(&path).await {
            Ok(raw) => parse(&path, &raw).map(Some),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::io(path, e)),
        }
    }

    /// Read the manifest, synthesizing one from the folder name if absent
    pub async fn read(root: &Path) -> Result<Manifest> {
        let info = Self::read_optional(root).await?;
        Ok(Self::resolve(root, info))
    }

    /// Blocking variant of [`ManifestReader::read`] for the startup scan
    pub fn read_blocking(root: &Path) -> Result<Manifest> {
        let path = root.join(MANIFEST_FILE);
        let info = match std::fs::read_to_string(&path) {
            Ok(raw) => Some(parse(&path, &raw)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(Error::io(path, e)),
        };
        Ok(Self::resolve(root, info))
    }

    fn resolve(root: &Path, info: Option<ExtensionInfo>) -> Manifest {
        match info {
            Some(info) => Manifest {
                id: info.id.clone().unwrap_or_else(|| folder_name(root)),
                info,
                source: ManifestSource::File,
            },
            None => {
                debug!("No {} in {}, using folder name", MANIFEST_FILE, root.display());
                Self::synthesized(root)
            }
        }
    }

    /// Defaults derived from the folder name alone
    pub fn synthesized(root: &Path) -> Manifest {
        Manifest {
            id: folder_name(root),
            info: ExtensionInfo::default(),
            source: ManifestSource::Synthesized,
        }
    }

    /// Overlay caller-supplied fields onto a manifest
    pub fn merge(info: ExtensionInfo, caller: Option<&ExtensionInfo>) -> ExtensionInfo {
        match caller {
            Some(caller) => info.merged_with(caller),
            None => info,
        }
    }

    /// Persist a manifest as pretty-printed JSON
    pub async fn write(root: &Path, info: &ExtensionInfo) -> Result<()> {
        let path = root.join(MANIFEST_FILE);
        let json = serde_json::to_string_pretty(info)
            .map_err(|e| Error::io(&path, io::Error::new(io::ErrorKind::InvalidData, e)))?;
        tokio::fs::write(&path, json).await.at(&path)
    }

    /// Build the registry record for a package on disk
    pub fn record(
        root: &Path,
        manifest: &Manifest,
        kind: ExtensionKind,
        origin: Origin,
    ) -> ExtensionRecord {
        let info = &manifest.info;
        let folder = folder_name(root);
        let namespace = info
            .namespace
            .clone()
            .or_else(|| info.id.clone())
            .unwrap_or_else(|| {
                if origin.is_bundled() {
                    folder.clone()
                } else {
                    idify(manifest.name())
                }
            });

        ExtensionRecord {
            id: manifest.id.clone(),
            name: manifest.name().to_string(),
            author: manifest.author().to_string(),
            version: manifest.version().to_string(),
            description: manifest.description().to_string(),
            kind,
            origin,
            path: root.to_path_buf(),
            outdated: false,
            mod_id: info.mod_id,
            namespace,
        }
    }
}
