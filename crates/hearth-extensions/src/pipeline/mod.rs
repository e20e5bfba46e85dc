//! Extension install pipeline
//!
//! An install extracts into a private hidden directory next to the final
//! destination and only touches the destination with one rename. Every
//! failure before that rename leaves existing installations as they were.
//!
//! ```text
//! Extracting -> Settling -> Flattening -> ReadingManifest -> ResolvingEntry
//!   -> ManifestOnlyUpdate | Validating -> RemovingOldVersion -> Relocating
//!   -> PostProcessing -> Registering -> Done
//! ```

mod context;
mod locks;

pub use context::{CancelToken, InstallContext, InstallReport, InstallState};

use crate::archive::{ArchiveExtractor, ExtractOptions, Platform};
use crate::catalog::{ArchiveSource, Catalog, EmptyCatalog};
use crate::entry::EntryScriptResolver;
use crate::error::{Error, IoResultExt, Result};
use crate::events::{EventEnvelope, InstallEvent};
use crate::fsutil::{self, sanitize_dir_name, unique_temp_sibling};
use crate::manifest::{ManifestReader, MANIFEST_FILE};
use crate::probe::DependencyProbe;
use crate::registry::ExtensionRegistry;
use crate::types::{ExtensionInfo, Manifest, ManifestSource};
use crate::validator::ExtensionValidator;
use hearth_core::retry::retry;
use locks::IdLocks;
use hearth_core::types::{
    operations, ExtensionKind, ExtensionRecord, Origin, RetryPolicy, RuntimeConfig, SettleConfig,
};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

const EVENT_CAPACITY: usize = 256;
const SETTLE_MARKERS: &[&str] = &[MANIFEST_FILE, "index.js"];

/// Name of an archive without its archive suffixes
fn archive_stem(archive: &Path) -> String {
    let name = archive
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let lower = name.to_ascii_lowercase();

    let suffix_len = [
        ".tar.gz", ".tgz", ".tar", ".zip", ".7z.001", ".7z", ".part1.rar", ".part01.rar", ".rar",
    ]
    .iter()
    .find(|s| lower.ends_with(*s))
    .map(|s| s.len())
    .unwrap_or(0);

    let stem = &name[..name.len() - suffix_len];
    if stem.is_empty() {
        "extension".to_string()
    } else {
        stem.to_string()
    }
}

/// Installs extension archives into the user extension directory
pub struct InstallPipeline {
    registry: Arc<ExtensionRegistry>,
    extractor: ArchiveExtractor,
    entry: EntryScriptResolver,
    validator: ExtensionValidator,
    probe: DependencyProbe,
    catalog: Arc<dyn Catalog>,
    source: Arc<dyn ArchiveSource>,
    settle: SettleConfig,
    filesystem_policy: RetryPolicy,
    registration_policy: RetryPolicy,
    locks: IdLocks,
    events: broadcast::Sender<EventEnvelope>,
}

impl InstallPipeline {
    pub fn new(registry: Arc<ExtensionRegistry>, config: &RuntimeConfig) -> Self {
        let policies = &config.retry_policies;
        let entry = EntryScriptResolver::new(policies.policy_for(operations::ENTRY_LOOKUP).clone());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            registry,
            extractor: ArchiveExtractor::new(ExtractOptions {
                platform: Platform::current(),
                policy: policies.policy_for(operations::EXTRACTION).clone(),
            }),
            validator: ExtensionValidator::new(
                config.validation.clone(),
                config.game_titles.clone(),
                entry.clone(),
            ),
            entry,
            probe: DependencyProbe::default(),
            catalog: Arc::new(EmptyCatalog),
            source: Arc::new(EmptyCatalog),
            settle: config.settle.clone(),
            filesystem_policy: policies.policy_for(operations::FILESYSTEM).clone(),
            registration_policy: policies.policy_for(operations::REGISTRATION).clone(),
            locks: IdLocks::default(),
            events,
        }
    }

    /// Where to look up and fetch missing dependencies
    pub fn with_catalog(mut self, catalog: Arc<dyn Catalog>, source: Arc<dyn ArchiveSource>) -> Self {
        self.catalog = catalog;
        self.source = source;
        self
    }

    pub fn with_probe(mut self, probe: DependencyProbe) -> Self {
        self.probe = probe;
        self
    }

    pub fn with_extractor(mut self, extractor: ArchiveExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn registry(&self) -> &Arc<ExtensionRegistry> {
        &self.registry
    }

    /// Receive pipeline events from now on
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.events.subscribe()
    }

    fn emit(&self, event: InstallEvent) {
        // no subscribers is fine
        let _ = self.events.send(EventEnvelope::new(event));
    }

    /// Move to `state`, failing with `UserCanceled` if a cancel arrived
    /// before the new files were committed
    fn transition(&self, ctx: &mut InstallContext, state: InstallState, cancel: &CancelToken) -> Result<()> {
        if !state.is_terminal() && !ctx.committed {
            cancel.check()?;
        }
        debug!("Install {}: {} -> {}", ctx.install_id, ctx.state, state);
        ctx.state = state;
        self.emit(InstallEvent::StateChanged {
            install_id: ctx.install_id.clone(),
            state: state.to_string(),
        });
        Ok(())
    }

    /// Install the extension packaged in `archive`
    ///
    /// `caller_info` overrides fields of the package's own manifest, for
    /// metadata only known at download time.
    pub async fn install_extension(
        &self,
        archive: &Path,
        caller_info: Option<&ExtensionInfo>,
    ) -> Result<InstallReport> {
        self.install_with_cancel(archive, caller_info, &CancelToken::new())
            .await
    }

    /// Like [`install_extension`](Self::install_extension), aborting with
    /// [`Error::UserCanceled`] once `cancel` is triggered
    pub async fn install_with_cancel(
        &self,
        archive: &Path,
        caller_info: Option<&ExtensionInfo>,
        cancel: &CancelToken,
    ) -> Result<InstallReport> {
        self.install(archive, caller_info, cancel, Vec::new()).await
    }

    /// Uninstall `id` and tell subscribers
    ///
    /// Waits for an install of the same id to finish first.
    pub async fn remove_extension(&self, id: &str) -> Result<()> {
        let _guard = self.locks.acquire(id).await;

        self.registry.remove_extension(id).await?;
        self.emit(InstallEvent::Removed {
            extension_id: id.to_string(),
        });
        Ok(())
    }

    async fn install(
        &self,
        archive: &Path,
        caller_info: Option<&ExtensionInfo>,
        cancel: &CancelToken,
        chain: Vec<String>,
    ) -> Result<InstallReport> {
        let user_root = self
            .registry
            .user_root()
            .map(Path::to_path_buf)
            .ok_or_else(|| Error::process_canceled("no writable extension directory configured"))?;
        tokio::fs::create_dir_all(&user_root).await.at(&user_root)?;

        let stem = archive_stem(archive);
        let temp_dir = unique_temp_sibling(&user_root.join(&stem), &stem);
        let mut ctx = InstallContext::new(archive.to_path_buf(), temp_dir, chain);

        info!("Installing extension from {}", archive.display());
        self.emit(InstallEvent::InstallStarted {
            install_id: ctx.install_id.clone(),
            archive: archive.display().to_string(),
        });

        match self.run(&mut ctx, &user_root, caller_info, cancel).await {
            Ok(report) => {
                let _ = self.transition(&mut ctx, InstallState::Done, cancel);
                info!(
                    "Installed extension: {} {} ({}ms)",
                    report.record.id,
                    report.record.version,
                    ctx.elapsed_ms()
                );
                self.emit(InstallEvent::InstallCompleted {
                    install_id: ctx.install_id.clone(),
                    extension_id: report.record.id.clone(),
                    version: report.record.version.clone(),
                    duration_ms: ctx.elapsed_ms(),
                    manifest_only: report.manifest_only,
                    registry_stale: report.registry_stale,
                });
                Ok(report)
            }
            Err(err) => {
                let _ = self.transition(&mut ctx, InstallState::Failed, cancel);
                if tokio::fs::try_exists(&ctx.temp_dir).await.unwrap_or(false) {
                    fsutil::remove_dir_best_effort(&ctx.temp_dir, &self.filesystem_policy).await;
                }

                if err.is_silent() {
                    info!("Install of {} stopped: {}", archive.display(), err);
                } else {
                    error!("Failed to install {}: {}", archive.display(), err);
                }
                self.emit(InstallEvent::InstallFailed {
                    install_id: ctx.install_id.clone(),
                    extension_id: ctx.extension_id.clone(),
                    error_message: err.to_string(),
                    duration_ms: ctx.elapsed_ms(),
                    canceled: err.is_silent(),
                });
                Err(err)
            }
        }
    }

    async fn run(
        &self,
        ctx: &mut InstallContext,
        user_root: &Path,
        caller_info: Option<&ExtensionInfo>,
        cancel: &CancelToken,
    ) -> Result<InstallReport> {
        self.transition(ctx, InstallState::Extracting, cancel)?;
        self.extractor.extract(&ctx.archive, &ctx.temp_dir).await?;

        self.transition(ctx, InstallState::Settling, cancel)?;
        fsutil::settle(&ctx.temp_dir, &self.settle, SETTLE_MARKERS).await;

        self.transition(ctx, InstallState::Flattening, cancel)?;
        let levels = fsutil::flatten(&ctx.temp_dir, &self.filesystem_policy).await?;
        if levels > 0 {
            debug!("Removed {} wrapper directories from {}", levels, ctx.archive.display());
        }

        self.transition(ctx, InstallState::ReadingManifest, cancel)?;
        let on_disk = ManifestReader::read_optional(&ctx.temp_dir).await?;
        let has_manifest = on_disk.is_some();
        let mut info = ManifestReader::merge(on_disk.unwrap_or_default(), caller_info);

        let id = info
            .id
            .clone()
            .or_else(|| info.name.clone())
            .unwrap_or_else(|| archive_stem(&ctx.archive));
        let dir_name = sanitize_dir_name(&id);
        let dest = user_root.join(&dir_name);
        // the scan falls back to the folder name when no id is declared
        let registry_id = info.id.clone().unwrap_or_else(|| dir_name.clone());
        ctx.extension_id = Some(registry_id.clone());
        ctx.dest_dir = Some(dest.clone());

        if ctx.chain.contains(&registry_id) {
            return Err(Error::process_canceled(format!(
                "{} is already being installed",
                registry_id
            )));
        }

        // held until the files are committed; dependency installs run
        // after release so installs that need each other cannot deadlock
        let guard = self.locks.acquire(&registry_id).await;

        self.transition(ctx, InstallState::ResolvingEntry, cancel)?;
        let entry = self.entry.resolve(&ctx.temp_dir).await;

        if entry.is_none()
            && has_manifest
            && tokio::fs::try_exists(&dest).await.unwrap_or(false)
            && EntryScriptResolver::resolve_immediate(&dest).is_some()
        {
            return self.manifest_only_update(ctx, &dest, &registry_id, cancel).await;
        }

        self.transition(ctx, InstallState::Validating, cancel)?;
        let declared = info.kind.as_deref().and_then(ExtensionKind::from_declared);
        let name = info.name.clone().unwrap_or_else(|| id.clone());
        let kind = self.validator.classify(&ctx.temp_dir, declared, &name).await?;
        ctx.kind = Some(kind);

        if info.kind.is_none() || caller_info.is_some() {
            if info.kind.is_none() {
                info.kind = Some(kind.as_str().to_string());
            }
            ManifestReader::write(&ctx.temp_dir, &info).await?;
        }

        self.transition(ctx, InstallState::RemovingOldVersion, cancel)?;
        let installed = self.registry.installed_extensions().await?;
        let previously_loaded = installed.contains_key(&registry_id);
        self.remove_old_versions(&installed, &registry_id, &name, info.mod_id)
            .await;

        self.transition(ctx, InstallState::Relocating, cancel)?;
        fsutil::relocate(&ctx.temp_dir, &dest, &self.filesystem_policy).await?;
        ctx.committed = true;
        drop(guard);

        self.transition(ctx, InstallState::PostProcessing, cancel)?;
        let (installed_dependencies, missing_dependencies) =
            if kind == ExtensionKind::Full && !previously_loaded {
                self.install_dependencies(ctx, &dest, &registry_id, cancel).await
            } else {
                (Vec::new(), Vec::new())
            };

        self.transition(ctx, InstallState::Registering, cancel)?;
        let manifest = Manifest {
            id: registry_id.clone(),
            info,
            source: ManifestSource::File,
        };
        let (record, registry_stale) = self.register(&registry_id, &dest, &manifest, kind).await;

        Ok(InstallReport {
            record,
            manifest_only: false,
            registry_stale,
            installed_dependencies,
            missing_dependencies,
        })
    }

    async fn manifest_only_update(
        &self,
        ctx: &mut InstallContext,
        dest: &Path,
        registry_id: &str,
        cancel: &CancelToken,
    ) -> Result<InstallReport> {
        self.transition(ctx, InstallState::ManifestOnlyUpdate, cancel)?;
        ctx.manifest_only = true;
        info!("Updating manifest of installed extension {}", registry_id);

        let from = ctx.temp_dir.join(MANIFEST_FILE);
        let to = dest.join(MANIFEST_FILE);
        let (from, to) = (from.as_path(), to.as_path());
        retry("copy manifest", &self.filesystem_policy, move || async move {
            tokio::fs::copy(from, to).await.at(from)
        })
        .await?;
        ctx.committed = true;
        fsutil::remove_dir_best_effort(&ctx.temp_dir, &self.filesystem_policy).await;

        self.transition(ctx, InstallState::Registering, cancel)?;
        let manifest = ManifestReader::read(dest).await?;
        let declared = manifest.info.kind.as_deref().and_then(ExtensionKind::from_declared);
        let kind = declared.unwrap_or(ExtensionKind::Full);
        ctx.kind = Some(kind);
        let (record, registry_stale) = self.register(registry_id, dest, &manifest, kind).await;

        Ok(InstallReport {
            record,
            manifest_only: true,
            registry_stale,
            installed_dependencies: Vec::new(),
            missing_dependencies: Vec::new(),
        })
    }

    /// Unregister and delete user copies that the new package replaces
    async fn remove_old_versions(
        &self,
        installed: &BTreeMap<String, ExtensionRecord>,
        id: &str,
        name: &str,
        mod_id: Option<u64>,
    ) {
        let stale = installed.values().filter(|record| {
            !record.origin.is_bundled()
                && (record.id == id
                    || record.name == name
                    || (mod_id.is_some() && record.mod_id == mod_id))
        });

        for record in stale {
            info!(
                "Removing previous version {} {} at {}",
                record.id,
                record.version,
                record.path.display()
            );
            self.registry.unregister(&record.id).await;
            if !fsutil::remove_dir_best_effort(&record.path, &self.filesystem_policy).await {
                warn!("Old version of {} left at {}", record.id, record.path.display());
            }
        }
    }

    /// Probe the installed package and install what it requires
    ///
    /// Failures here never fail the outer install; they are reported as
    /// missing dependencies.
    async fn install_dependencies(
        &self,
        ctx: &InstallContext,
        dest: &Path,
        id: &str,
        cancel: &CancelToken,
    ) -> (Vec<String>, Vec<String>) {
        let declared: BTreeSet<String> = match self.probe.probe(dest, &self.entry).await {
            Ok(deps) => deps,
            Err(e) => {
                warn!("Could not determine dependencies of {}: {}", id, e);
                return (Vec::new(), Vec::new());
            }
        };
        if declared.is_empty() {
            return (Vec::new(), Vec::new());
        }

        let installed = match self.registry.installed_extensions().await {
            Ok(installed) => installed,
            Err(e) => {
                warn!("Could not read installed extensions: {}", e);
                return (Vec::new(), declared.into_iter().collect());
            }
        };

        let mut chain = ctx.chain.clone();
        chain.push(id.to_string());

        let mut done = Vec::new();
        let mut missing = Vec::new();

        for dependency in declared {
            if installed.contains_key(&dependency) || chain.contains(&dependency) {
                continue;
            }

            let Some(available) = self.catalog.find(&dependency).await else {
                warn!("Extension {} requires {}, which is not available", id, dependency);
                self.emit(InstallEvent::DependencyMissing {
                    install_id: ctx.install_id.clone(),
                    dependent: id.to_string(),
                    dependency: dependency.clone(),
                });
                missing.push(dependency);
                continue;
            };

            info!("Installing dependency {} of {}", dependency, id);
            self.emit(InstallEvent::DependencyInstalling {
                install_id: ctx.install_id.clone(),
                dependent: id.to_string(),
                dependency: dependency.clone(),
            });

            let outcome = match self.source.fetch(&available).await {
                Ok(archive) => {
                    let caller = available.caller_info();
                    Box::pin(self.install(&archive, Some(&caller), cancel, chain.clone())).await
                }
                Err(e) => Err(e),
            };

            match outcome {
                Ok(report) => done.push(report.record.id),
                Err(e) => {
                    if !e.is_silent() {
                        warn!("Dependency {} of {} failed to install: {}", dependency, id, e);
                    }
                    missing.push(dependency);
                }
            }
        }

        (done, missing)
    }

    /// Refresh the registry until `id` shows up
    ///
    /// When it never does the files are still in place, so the install
    /// counts as done with a record built from the manifest.
    async fn register(
        &self,
        id: &str,
        dest: &Path,
        manifest: &Manifest,
        kind: ExtensionKind,
    ) -> (ExtensionRecord, bool) {
        let registry = &self.registry;
        let found = retry("register extension", &self.registration_policy, move || async move {
            registry
                .force_refresh()
                .await?
                .remove(id)
                .ok_or_else(|| Error::Temporary(format!("{} not visible in the registry yet", id)))
        })
        .await;

        match found {
            Ok(record) => (record, false),
            Err(e) => {
                warn!(
                    "Installed {} but the registry does not list it yet ({}); restart to load it",
                    id,
                    Error::from(e)
                );
                let record = ManifestReader::record(dest, manifest, kind, Origin::User);
                (record, true)
            }
        }
    }
}

impl std::fmt::Debug for InstallPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstallPipeline")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("foo.zip", "foo")]
    #[test_case("Foo-1.2.tar.gz", "Foo-1.2")]
    #[test_case("bar.part1.rar", "bar")]
    #[test_case("baz.7z.001", "baz")]
    #[test_case("plain", "plain")]
    #[test_case(".zip", "extension")]
    fn test_archive_stem(name: &str, expected: &str) {
        assert_eq!(archive_stem(Path::new(name)), expected);
    }
}
