//! Cached view of the installed extensions
//!
//! The registry owns the result of the last directory scan. Readers share
//! it; a refresh rescans under the write lock so two installs finishing at
//! the same time cannot overwrite each other's view.

use crate::error::{Error, Result};
use crate::fsutil::remove_dir_best_effort;
use crate::loader::{ExtensionLoader, ScanResult, ScanRoot};
use crate::state::ExtensionStateStore;
use hearth_core::types::{ExtensionRecord, RetryPolicy};
use std::collections::BTreeMap;
use std::path::Path;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

pub struct ExtensionRegistry {
    loader: ExtensionLoader,
    roots: Vec<ScanRoot>,
    policy: RetryPolicy,
    cache: RwLock<Option<ScanResult>>,
}

impl ExtensionRegistry {
    /// `roots` in priority order, user directory first
    pub fn new(loader: ExtensionLoader, roots: Vec<ScanRoot>, policy: RetryPolicy) -> Self {
        Self {
            loader,
            roots,
            policy,
            cache: RwLock::new(None),
        }
    }

    pub fn roots(&self) -> &[ScanRoot] {
        &self.roots
    }

    /// First writable root; installs land here
    pub fn user_root(&self) -> Option<&Path> {
        self.roots
            .iter()
            .find(|r| !r.origin.is_bundled())
            .map(|r| r.path.as_path())
    }

    pub fn state(&self) -> &ExtensionStateStore {
        self.loader.state()
    }

    async fn scan(&self) -> Result<ScanResult> {
        let loader = self.loader.clone();
        let roots = self.roots.clone();
        tokio::task::spawn_blocking(move || loader.scan(&roots))
            .await
            .map_err(|e| Error::Temporary(format!("scan task failed: {}", e)))?
    }

    async fn snapshot(&self) -> Result<ScanResult> {
        if let Some(cached) = self.cache.read().await.as_ref() {
            return Ok(cached.clone());
        }

        let mut cache = self.cache.write().await;
        if let Some(cached) = cache.as_ref() {
            return Ok(cached.clone());
        }
        let result = self.scan().await?;
        *cache = Some(result.clone());
        Ok(result)
    }

    /// Active extensions by id, scanning on first use
    pub async fn installed_extensions(&self) -> Result<BTreeMap<String, ExtensionRecord>> {
        Ok(self.snapshot().await?.extensions)
    }

    pub async fn has_outdated_extensions(&self) -> Result<bool> {
        Ok(self.snapshot().await?.has_outdated())
    }

    pub async fn outdated_extensions(&self) -> Result<Vec<ExtensionRecord>> {
        Ok(self.snapshot().await?.outdated)
    }

    pub async fn get(&self, id: &str) -> Result<Option<ExtensionRecord>> {
        Ok(self.snapshot().await?.extensions.get(id).cloned())
    }

    /// Drop the cached view; the next read rescans
    pub async fn invalidate(&self) {
        *self.cache.write().await = None;
        debug!("Extension registry invalidated");
    }

    /// Rescan now and replace the cached view
    pub async fn force_refresh(&self) -> Result<BTreeMap<String, ExtensionRecord>> {
        let mut cache = self.cache.write().await;
        let result = self.scan().await?;
        let extensions = result.extensions.clone();
        *cache = Some(result);
        Ok(extensions)
    }

    /// Remove `id` from the cached view without touching the disk
    pub async fn unregister(&self, id: &str) -> Option<ExtensionRecord> {
        self.cache
            .write()
            .await
            .as_mut()
            .and_then(|cached| cached.extensions.remove(id))
    }

    /// Delete an extension's directory and unregister it
    ///
    /// An id that is not installed, or whose directory is already gone,
    /// is not an error. When the directory cannot be deleted it is flagged
    /// so the next startup scan removes it.
    pub async fn remove_extension(&self, id: &str) -> Result<()> {
        let Some(record) = self.get(id).await? else {
            debug!("Extension {} is not installed", id);
            self.unregister(id).await;
            return Ok(());
        };

        if record.origin.is_bundled() {
            return Err(Error::process_canceled(format!(
                "{} is bundled and cannot be removed",
                id
            )));
        }

        info!("Removing extension: {}", id);
        let state = self.state().clone();
        let id_owned = id.to_string();

        if remove_dir_best_effort(&record.path, &self.policy).await {
            tokio::task::spawn_blocking(move || state.forget(&id_owned))
                .await
                .map_err(|e| Error::Temporary(format!("state task failed: {}", e)))??;
        } else {
            warn!(
                "Could not delete {}, it will be removed on next start",
                record.path.display()
            );
            tokio::task::spawn_blocking(move || state.mark_for_removal(&id_owned))
                .await
                .map_err(|e| Error::Temporary(format!("state task failed: {}", e)))??;
        }

        self.unregister(id).await;
        Ok(())
    }
}

impl std::fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionRegistry")
            .field("roots", &self.roots)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::EntryScriptResolver;
    use crate::validator::ExtensionValidator;
    use hearth_core::types::{RuntimeConfig, ValidationConfig};
    use tempfile::TempDir;

    fn registry(temp: &TempDir) -> ExtensionRegistry {
        let policy = RetryPolicy {
            max_attempts: 1,
            ..RetryPolicy::default()
        };
        let loader = ExtensionLoader::new(
            ExtensionStateStore::new(temp.path().join("state.json")),
            ExtensionValidator::new(
                ValidationConfig::default(),
                RuntimeConfig::default().game_titles,
                EntryScriptResolver::new(policy.clone()),
            ),
            policy.clone(),
        );
        ExtensionRegistry::new(
            loader,
            vec![
                ScanRoot::user(temp.path().join("plugins")),
                ScanRoot::bundled(temp.path().join("bundled")),
            ],
            policy,
        )
    }

    fn install(dir: &Path, manifest: &str) {
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(dir.join("info.json"), manifest).unwrap();
        std::fs::write(dir.join("index.js"), "").unwrap();
    }

    #[tokio::test]
    async fn test_cache_until_refresh() {
        let temp = TempDir::new().unwrap();
        let registry = registry(&temp);
        assert!(registry.installed_extensions().await.unwrap().is_empty());

        install(&temp.path().join("plugins").join("foo"), r#"{"id":"foo"}"#);
        assert!(registry.get("foo").await.unwrap().is_none());

        registry.force_refresh().await.unwrap();
        assert!(registry.get("foo").await.unwrap().is_some());

        registry.invalidate().await;
        assert_eq!(registry.installed_extensions().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_remove_deletes_and_unregisters() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("plugins").join("foo");
        install(&dir, r#"{"id":"foo"}"#);
        let registry = registry(&temp);

        registry.remove_extension("foo").await.unwrap();
        assert!(!dir.exists());
        assert!(registry.get("foo").await.unwrap().is_none());

        // second removal is a no-op
        registry.remove_extension("foo").await.unwrap();
    }

    #[tokio::test]
    async fn test_bundled_cannot_be_removed() {
        let temp = TempDir::new().unwrap();
        install(&temp.path().join("bundled").join("core"), r#"{"id":"core"}"#);
        let registry = registry(&temp);

        let err = registry.remove_extension("core").await.unwrap_err();
        assert!(err.is_silent());
        assert!(temp.path().join("bundled").join("core").exists());
    }

    #[tokio::test]
    async fn test_outdated_user_copy_is_reported() {
        let temp = TempDir::new().unwrap();
        install(
            &temp.path().join("plugins").join("foo"),
            r#"{"id":"foo","version":"1.0.0"}"#,
        );
        install(
            &temp.path().join("bundled").join("foo"),
            r#"{"id":"foo","version":"1.2.0"}"#,
        );
        let registry = registry(&temp);

        assert!(registry.has_outdated_extensions().await.unwrap());
        let active = registry.get("foo").await.unwrap().unwrap();
        assert!(active.outdated);
        assert_eq!(active.origin, hearth_core::types::Origin::User);
    }
}
