//! Catalog of installable extensions
//!
//! The install pipeline consults a [`Catalog`] when a freshly installed
//! extension declares a dependency that is not installed, and an
//! [`ArchiveSource`] to obtain that dependency's archive. Hosts provide
//! their own implementations; [`LocalCatalog`] serves a directory of
//! archives described by a JSON index.

use crate::error::{Error, IoResultExt, Result};
use crate::manifest::idify;
use crate::types::ExtensionInfo;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// An extension that can be installed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailableExtension {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mod_id: Option<u64>,
    /// Archive location, relative to the catalog index
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive: Option<PathBuf>,
}

impl AvailableExtension {
    /// Whether this entry answers to `key` by id or display name
    pub fn matches(&self, key: &str) -> bool {
        self.id == key || self.name == key || idify(&self.name) == key
    }

    /// Metadata the catalog knows but the package might not
    pub fn caller_info(&self) -> ExtensionInfo {
        ExtensionInfo {
            id: Some(self.id.clone()),
            name: Some(self.name.clone()),
            mod_id: self.mod_id,
            ..Default::default()
        }
    }
}

/// Lookup of installable extensions
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Find an extension by id or name
    async fn find(&self, key: &str) -> Option<AvailableExtension>;
}

/// Supplies archives for catalog entries
#[async_trait]
pub trait ArchiveSource: Send + Sync {
    /// Local path of an archive for `extension`
    async fn fetch(&self, extension: &AvailableExtension) -> Result<PathBuf>;
}

/// Catalog with no entries
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyCatalog;

#[async_trait]
impl Catalog for EmptyCatalog {
    async fn find(&self, _key: &str) -> Option<AvailableExtension> {
        None
    }
}

#[async_trait]
impl ArchiveSource for EmptyCatalog {
    async fn fetch(&self, extension: &AvailableExtension) -> Result<PathBuf> {
        Err(Error::process_canceled(format!(
            "no archive source for {}",
            extension.id
        )))
    }
}

#[derive(Debug, Default, Deserialize)]
struct CatalogIndex {
    #[serde(default)]
    extensions: Vec<AvailableExtension>,
}

/// Directory of archives listed in a `catalog.json` index
#[derive(Debug, Clone, Default)]
pub struct LocalCatalog {
    root: PathBuf,
    entries: Vec<AvailableExtension>,
}

impl LocalCatalog {
    pub const INDEX_FILE: &'static str = "catalog.json";

    /// Load `<dir>/catalog.json`; a missing index yields an empty catalog
    pub async fn open(dir: &Path) -> Result<Self> {
        let index_path = dir.join(Self::INDEX_FILE);
        let index: CatalogIndex = match tokio::fs::read_to_string(&index_path).await {
            Ok(raw) => {
                serde_json::from_str(&raw).map_err(|source| Error::invalid_json(&index_path, source))?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No catalog index at {}", index_path.display());
                CatalogIndex::default()
            }
            Err(e) => return Err(Error::io(index_path, e)),
        };

        Ok(Self {
            root: dir.to_path_buf(),
            entries: index.extensions,
        })
    }

    pub fn from_entries(root: impl Into<PathBuf>, entries: Vec<AvailableExtension>) -> Self {
        Self {
            root: root.into(),
            entries,
        }
    }

    pub fn entries(&self) -> &[AvailableExtension] {
        &self.entries
    }
}

#[async_trait]
impl Catalog for LocalCatalog {
    async fn find(&self, key: &str) -> Option<AvailableExtension> {
        self.entries.iter().find(|e| e.matches(key)).cloned()
    }
}

#[async_trait]
impl ArchiveSource for LocalCatalog {
    async fn fetch(&self, extension: &AvailableExtension) -> Result<PathBuf> {
        let relative = extension.archive.as_ref().ok_or_else(|| {
            Error::process_canceled(format!("catalog entry {} has no archive", extension.id))
        })?;
        let path = self.root.join(relative);
        tokio::fs::metadata(&path).await.at(&path)?;
        Ok(path)
    }
}
