//! Shared setup for extension commands

use anyhow::{Context, Result};
use camino::Utf8Path;
use hearth_core::retry::set_platform_delay_multiplier;
use hearth_core::types::{operations, RuntimeConfig};
use hearth_core::HierarchicalConfigLoader;
use hearth_extensions::{
    EntryScriptResolver, ExtensionLoader, ExtensionRegistry, ExtensionStateStore,
    ExtensionValidator, InstallPipeline, ScanRoot,
};
use std::sync::Arc;

/// Registry and pipeline wired from the runtime configuration
pub(super) struct Host {
    pub config: RuntimeConfig,
    pub registry: Arc<ExtensionRegistry>,
}

impl Host {
    pub fn open(home: Option<&Utf8Path>) -> Result<Self> {
        let loader = match home {
            Some(dir) => HierarchicalConfigLoader::with_dir(dir.to_path_buf()),
            None => HierarchicalConfigLoader::new().context("Failed to locate config home")?,
        };
        let config = loader
            .load_runtime_config()
            .context("Failed to load runtime configuration")?;
        let paths = loader.resolve_paths(&config);
        if let Some(multiplier) = config.platform.delay_multiplier {
            set_platform_delay_multiplier(multiplier);
        }
        tracing::debug!("Extension directories: {:?}", paths);

        let policies = &config.retry_policies;
        let validator = ExtensionValidator::new(
            config.validation.clone(),
            config.game_titles.clone(),
            EntryScriptResolver::new(policies.policy_for(operations::ENTRY_LOOKUP).clone()),
        );
        let filesystem = policies.policy_for(operations::FILESYSTEM).clone();
        let extension_loader = ExtensionLoader::new(
            ExtensionStateStore::new(paths.state_file.as_std_path()),
            validator,
            filesystem.clone(),
        );
        let registry = ExtensionRegistry::new(
            extension_loader,
            vec![
                ScanRoot::user(paths.user_plugins_dir.as_std_path()),
                ScanRoot::bundled(paths.bundled_plugins_dir.as_std_path()),
            ],
            filesystem,
        );

        Ok(Self {
            config,
            registry: Arc::new(registry),
        })
    }

    pub fn pipeline(&self) -> InstallPipeline {
        InstallPipeline::new(Arc::clone(&self.registry), &self.config)
    }
}
