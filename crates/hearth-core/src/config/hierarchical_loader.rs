//! Hierarchical configuration loader with precedence
//!
//! Loads configuration from multiple sources with the following precedence (low to high):
//! 1. Embedded defaults (built into binary)
//! 2. Runtime config (~/.hearth/hearth-runtime.yaml)
//! 3. Environment variables (HEARTH_* prefix)
//! 4. CLI flags (handled by caller)

use crate::error::{Error, Result};
use crate::types::{ResolvedPaths, RuntimeConfig};
use camino::{Utf8Path, Utf8PathBuf};
use rust_embed::RustEmbed;
use serde::de::DeserializeOwned;
use std::env;
use std::fs;

/// Embedded configuration files
#[derive(RustEmbed)]
#[folder = "$CARGO_MANIFEST_DIR/../../embedded/config/"]
#[prefix = ""]
struct EmbeddedConfigs;

const RUNTIME_FILE: &str = "hearth-runtime.yaml";

/// Configuration hierarchy loader
pub struct HierarchicalConfigLoader {
    config_dir: Utf8PathBuf,
}

impl HierarchicalConfigLoader {
    /// Create a loader rooted at `$HEARTH_HOME` or `~/.hearth`
    pub fn new() -> Result<Self> {
        let config_dir = Self::default_config_dir()?;
        Ok(Self { config_dir })
    }

    /// Create a loader with a custom config directory
    pub fn with_dir(config_dir: Utf8PathBuf) -> Self {
        Self { config_dir }
    }

    fn default_config_dir() -> Result<Utf8PathBuf> {
        if let Ok(home) = env::var("HEARTH_HOME") {
            if !home.is_empty() {
                return Ok(Utf8PathBuf::from(home));
            }
        }

        let home = dirs::home_dir().ok_or(Error::HomeDirUnavailable)?;
        let home = Utf8PathBuf::from_path_buf(home)
            .map_err(|p| Error::invalid_config(format!("Home directory is not UTF-8: {}", p.display())))?;
        Ok(home.join(".hearth"))
    }

    /// Load runtime configuration with hierarchical precedence
    pub fn load_runtime_config(&self) -> Result<RuntimeConfig> {
        let mut config = Self::load_embedded_config::<RuntimeConfig>("runtime-defaults.yaml")?;

        let runtime_config_path = self.config_dir.join(RUNTIME_FILE);
        if runtime_config_path.exists() {
            let file_config = self.load_yaml_file::<RuntimeConfig>(&runtime_config_path)?;
            config = Self::merge_runtime_config(config, file_config);
        }

        config = self.apply_env_overrides(config)?;

        tracing::debug!("Loaded runtime config from {}", self.config_dir);
        Ok(config)
    }

    /// Resolve extension directories for a loaded config
    pub fn resolve_paths(&self, config: &RuntimeConfig) -> ResolvedPaths {
        let exe_dir = env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|p| p.to_path_buf()))
            .and_then(|dir| Utf8PathBuf::from_path_buf(dir).ok());

        config.paths.resolve(&self.config_dir, exe_dir.as_deref())
    }

    fn load_embedded_config<T: DeserializeOwned>(filename: &str) -> Result<T> {
        let embedded_file = EmbeddedConfigs::get(filename).ok_or_else(|| {
            Error::config_not_found(format!("Embedded config not found: {}", filename))
        })?;

        let content = std::str::from_utf8(&embedded_file.data).map_err(|_| {
            Error::invalid_config(format!("Invalid UTF-8 in embedded config: {}", filename))
        })?;

        serde_yaml_ng::from_str(content).map_err(|e| {
            Error::invalid_config(format!(
                "Failed to parse embedded config {}: {}",
                filename, e
            ))
        })
    }

    fn load_yaml_file<T: DeserializeOwned>(&self, path: &Utf8Path) -> Result<T> {
        let content = fs::read_to_string(path)?;
        serde_yaml_ng::from_str(&content)
            .map_err(|e| Error::invalid_config(format!("Failed to parse {}: {}", path, e)))
    }

    /// Merge two runtime configs (base is overridden by overlay)
    ///
    /// Path entries and retry operations merge key by key; the other
    /// sections are replaced wholesale since serde fills their defaults.
    fn merge_runtime_config(base: RuntimeConfig, overlay: RuntimeConfig) -> RuntimeConfig {
        let mut retry_policies = base.retry_policies;
        retry_policies.operations.extend(overlay.retry_policies.operations);
        retry_policies.default = overlay.retry_policies.default;

        RuntimeConfig {
            paths: crate::types::PathsConfig {
                user_plugins_dir: overlay.paths.user_plugins_dir.or(base.paths.user_plugins_dir),
                bundled_plugins_dir: overlay
                    .paths
                    .bundled_plugins_dir
                    .or(base.paths.bundled_plugins_dir),
                state_file: overlay.paths.state_file.or(base.paths.state_file),
            },
            retry_policies,
            settle: overlay.settle,
            validation: overlay.validation,
            platform: crate::types::PlatformConfig {
                delay_multiplier: overlay
                    .platform
                    .delay_multiplier
                    .or(base.platform.delay_multiplier),
            },
            game_titles: overlay.game_titles,
        }
    }

    fn apply_env_overrides(&self, mut config: RuntimeConfig) -> Result<RuntimeConfig> {
        if let Ok(val) = env::var("HEARTH_USER_PLUGINS_DIR") {
            config.paths.user_plugins_dir = Some(Utf8PathBuf::from(val));
        }

        if let Ok(val) = env::var("HEARTH_BUNDLED_PLUGINS_DIR") {
            config.paths.bundled_plugins_dir = Some(Utf8PathBuf::from(val));
        }

        if let Ok(val) = env::var("HEARTH_STATE_FILE") {
            config.paths.state_file = Some(Utf8PathBuf::from(val));
        }

        if let Ok(val) = env::var("HEARTH_SETTLE_TIMEOUT_MS") {
            config.settle.timeout_ms = val.parse().map_err(|_| {
                Error::invalid_config("HEARTH_SETTLE_TIMEOUT_MS must be a valid number")
            })?;
        }

        if let Ok(val) = env::var("HEARTH_VALIDATION_TIMEOUT_MS") {
            config.validation.timeout_ms = val.parse().map_err(|_| {
                Error::invalid_config("HEARTH_VALIDATION_TIMEOUT_MS must be a valid number")
            })?;
        }

        if let Ok(val) = env::var("HEARTH_RETRY_MAX_ATTEMPTS") {
            let attempts: u32 = val.parse().map_err(|_| {
                Error::invalid_config("HEARTH_RETRY_MAX_ATTEMPTS must be a valid number")
            })?;
            config.retry_policies.default.max_attempts = attempts;
            for policy in config.retry_policies.operations.values_mut() {
                policy.max_attempts = attempts;
            }
        }

        if let Ok(val) = env::var("HEARTH_DELAY_MULTIPLIER") {
            let multiplier: f64 = val.parse().map_err(|_| {
                Error::invalid_config("HEARTH_DELAY_MULTIPLIER must be a number")
            })?;
            if !(multiplier.is_finite() && multiplier > 0.0) {
                return Err(Error::invalid_config(
                    "HEARTH_DELAY_MULTIPLIER must be positive",
                ));
            }
            config.platform.delay_multiplier = Some(multiplier);
        }

        Ok(config)
    }

    /// Get the config directory path
    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }
}
