//! Test workspace with extension directories and fast timings

#![allow(dead_code)]

use super::builders::PackageBuilder;
use anyhow::{Context, Result};
use hearth_core::types::{
    operations, RetryPoliciesConfig, RetryPolicy, RetryStrategy, RuntimeConfig, SettleConfig,
    ValidationConfig,
};
use hearth_extensions::{
    EntryScriptResolver, ExtensionLoader, ExtensionRegistry, ExtensionStateStore,
    ExtensionValidator, InstallPipeline, ScanRoot,
};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// Retry policy that gives up quickly
pub fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 2,
        strategy: RetryStrategy::FixedDelay,
        backoff_multiplier: 1.0,
        initial_delay_ms: 1,
        max_delay_ms: 1,
    }
}

/// Runtime configuration tuned for tests
pub fn fast_config() -> RuntimeConfig {
    let operations = [
        operations::FILESYSTEM,
        operations::EXTRACTION,
        operations::REGISTRATION,
        operations::ENTRY_LOOKUP,
    ]
    .into_iter()
    .map(|op| (op.to_string(), fast_policy()))
    .collect::<HashMap<_, _>>();

    RuntimeConfig {
        retry_policies: RetryPoliciesConfig {
            default: fast_policy(),
            operations,
        },
        settle: SettleConfig {
            poll_interval_ms: 5,
            stable_checks: 2,
            timeout_ms: 200,
        },
        validation: ValidationConfig { timeout_ms: 2_000 },
        ..RuntimeConfig::default()
    }
}

/// Temporary host layout: a user directory, a bundled directory, a state
/// file and a scratch directory for archives
pub struct Workspace {
    temp: TempDir,
    pub plugins: PathBuf,
    pub bundled: PathBuf,
    pub state_file: PathBuf,
    pub archives: PathBuf,
    pub config: RuntimeConfig,
}

impl Workspace {
    pub fn new() -> Result<Self> {
        let temp = TempDir::new().context("Failed to create temp directory")?;
        let plugins = temp.path().join("plugins");
        let bundled = temp.path().join("bundled");
        let archives = temp.path().join("archives");
        for dir in [&plugins, &bundled, &archives] {
            fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        }

        Ok(Self {
            state_file: temp.path().join("extensions-state.json"),
            temp,
            plugins,
            bundled,
            archives,
            config: fast_config(),
        })
    }

    pub fn path(&self) -> &Path {
        self.temp.path()
    }

    pub fn state(&self) -> ExtensionStateStore {
        ExtensionStateStore::new(&self.state_file)
    }

    pub fn roots(&self) -> Vec<ScanRoot> {
        vec![ScanRoot::user(&self.plugins), ScanRoot::bundled(&self.bundled)]
    }

    pub fn loader(&self) -> ExtensionLoader {
        let policy = fast_policy();
        ExtensionLoader::new(
            self.state(),
            ExtensionValidator::new(
                self.config.validation.clone(),
                self.config.game_titles.clone(),
                EntryScriptResolver::new(policy.clone()),
            ),
            policy,
        )
    }

    pub fn registry(&self) -> Arc<ExtensionRegistry> {
        Arc::new(ExtensionRegistry::new(self.loader(), self.roots(), fast_policy()))
    }

    pub fn pipeline(&self) -> InstallPipeline {
        InstallPipeline::new(self.registry(), &self.config)
    }

    /// Write `package` as `<archives>/<file_name>` (zip or tar.gz by suffix)
    pub fn archive(&self, file_name: &str, package: &PackageBuilder) -> Result<PathBuf> {
        let path = self.archives.join(file_name);
        if file_name.ends_with(".tar.gz") || file_name.ends_with(".tgz") {
            package.write_tar_gz(&path)
        } else {
            package.write_zip(&path)
        }
    }

    /// Lay out an extension directly in `root/folder`
    pub fn place(&self, root: &Path, folder: &str, manifest: Option<&str>) -> Result<PathBuf> {
        let dir = root.join(folder);
        fs::create_dir_all(&dir)?;
        fs::write(dir.join("index.js"), "")?;
        if let Some(manifest) = manifest {
            fs::write(dir.join("info.json"), manifest)?;
        }
        Ok(dir)
    }
}
