//! Runtime configuration types for operational parameters
//!
//! These types control where extensions live, how aggressively filesystem
//! operations are retried, and how long the pipeline waits for a freshly
//! extracted tree to settle.

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Complete runtime configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RuntimeConfig {
    /// Extension directories and the state file
    #[serde(default)]
    pub paths: PathsConfig,

    /// Retry policy configurations
    #[serde(default)]
    pub retry_policies: RetryPoliciesConfig,

    /// Settling of freshly extracted directories
    #[serde(default)]
    pub settle: SettleConfig,

    /// Package validation
    #[serde(default)]
    pub validation: ValidationConfig,

    /// Platform-specific tuning
    #[serde(default)]
    pub platform: PlatformConfig,

    /// Titles that mark an extension as game support
    #[serde(default = "default_game_titles")]
    pub game_titles: Vec<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            paths: PathsConfig::default(),
            retry_policies: RetryPoliciesConfig::default(),
            settle: SettleConfig::default(),
            validation: ValidationConfig::default(),
            platform: PlatformConfig::default(),
            game_titles: default_game_titles(),
        }
    }
}

/// Extension directories
///
/// Unset entries are filled in by the config loader from the config home.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PathsConfig {
    /// Writable directory user extensions are installed into
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_plugins_dir: Option<Utf8PathBuf>,

    /// Read-only directory of extensions shipped with the host
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundled_plugins_dir: Option<Utf8PathBuf>,

    /// Persisted enabled/removal state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_file: Option<Utf8PathBuf>,
}

impl PathsConfig {
    /// Fill unset entries from the config home and the executable location
    pub fn resolve(&self, config_dir: &Utf8Path, exe_dir: Option<&Utf8Path>) -> ResolvedPaths {
        let bundled_default = exe_dir
            .map(|dir| dir.join("bundled-plugins"))
            .unwrap_or_else(|| config_dir.join("bundled-plugins"));

        ResolvedPaths {
            user_plugins_dir: self
                .user_plugins_dir
                .clone()
                .unwrap_or_else(|| config_dir.join("plugins")),
            bundled_plugins_dir: self
                .bundled_plugins_dir
                .clone()
                .unwrap_or(bundled_default),
            state_file: self
                .state_file
                .clone()
                .unwrap_or_else(|| config_dir.join("extensions-state.json")),
        }
    }
}

/// Extension directories with every default applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPaths {
    pub user_plugins_dir: Utf8PathBuf,
    pub bundled_plugins_dir: Utf8PathBuf,
    pub state_file: Utf8PathBuf,
}

/// Named operations with their own retry policy
pub mod operations {
    pub const FILESYSTEM: &str = "filesystem";
    pub const EXTRACTION: &str = "extraction";
    pub const REGISTRATION: &str = "registration";
    pub const ENTRY_LOOKUP: &str = "entry-lookup";
}

/// Retry policy configurations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RetryPoliciesConfig {
    /// Default retry policy
    #[serde(default)]
    pub default: RetryPolicy,

    /// Per-operation retry policies
    #[serde(default)]
    pub operations: HashMap<String, RetryPolicy>,
}

impl RetryPoliciesConfig {
    /// Policy for a named operation, falling back to the default
    pub fn policy_for(&self, operation: &str) -> &RetryPolicy {
        self.operations.get(operation).unwrap_or(&self.default)
    }
}

impl Default for RetryPoliciesConfig {
    fn default() -> Self {
        let exponential = |max_attempts, initial_delay_ms, max_delay_ms| RetryPolicy {
            max_attempts,
            strategy: RetryStrategy::ExponentialBackoff,
            backoff_multiplier: 2.0,
            initial_delay_ms,
            max_delay_ms,
        };

        let operations = HashMap::from([
            (operations::FILESYSTEM.to_string(), exponential(5, 50, 1000)),
            (operations::EXTRACTION.to_string(), exponential(3, 500, 4000)),
            (operations::REGISTRATION.to_string(), exponential(5, 200, 3000)),
            (operations::ENTRY_LOOKUP.to_string(), exponential(3, 50, 400)),
        ]);

        Self {
            default: RetryPolicy::default(),
            operations,
        }
    }
}

/// Retry policy for an operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Retry strategy
    #[serde(default)]
    pub strategy: RetryStrategy,

    /// Backoff multiplier for exponential strategies
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Initial delay in milliseconds
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,

    /// Maximum delay in milliseconds
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            strategy: RetryStrategy::default(),
            backoff_multiplier: default_backoff_multiplier(),
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}
fn default_backoff_multiplier() -> f64 {
    2.0
}
fn default_initial_delay() -> u64 {
    100
}
fn default_max_delay() -> u64 {
    2000
}

/// Retry strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RetryStrategy {
    /// Retry without waiting
    None,

    /// Fixed delay between retries
    FixedDelay,

    /// Exponential backoff (default)
    #[default]
    ExponentialBackoff,

    /// Linear backoff
    LinearBackoff,
}

/// Polling bounds for a freshly extracted directory
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SettleConfig {
    /// Interval between directory snapshots
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Consecutive identical snapshots required
    #[serde(default = "default_stable_checks")]
    pub stable_checks: u32,

    /// Wall-clock bound after which the pipeline proceeds anyway
    #[serde(default = "default_settle_timeout")]
    pub timeout_ms: u64,
}

impl SettleConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for SettleConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            stable_checks: default_stable_checks(),
            timeout_ms: default_settle_timeout(),
        }
    }
}

fn default_poll_interval() -> u64 {
    100
}
fn default_stable_checks() -> u32 {
    3
}
fn default_settle_timeout() -> u64 {
    5000
}

/// Package validation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ValidationConfig {
    /// Deadline for structural classification
    #[serde(default = "default_validation_timeout")]
    pub timeout_ms: u64,
}

impl ValidationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_validation_timeout(),
        }
    }
}

fn default_validation_timeout() -> u64 {
    10_000
}

/// Platform tuning
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PlatformConfig {
    /// Overrides the built-in retry delay multiplier for this host
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_multiplier: Option<f64>,
}

fn default_game_titles() -> Vec<String> {
    [
        "skyrim",
        "fallout",
        "oblivion",
        "morrowind",
        "starfield",
        "witcher",
        "cyberpunk",
        "baldur's gate",
        "stardew valley",
        "dragon age",
        "mount & blade",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_config_defaults() {
        let config = RuntimeConfig::default();
        assert!(config.paths.user_plugins_dir.is_none());
        assert_eq!(config.settle.stable_checks, 3);
        assert_eq!(config.settle.timeout(), Duration::from_secs(5));
        assert_eq!(config.validation.timeout_ms, 10_000);
        assert!(config.platform.delay_multiplier.is_none());
        assert!(config.game_titles.iter().any(|t| t == "skyrim"));
    }

    #[test]
    fn test_paths_resolve_defaults() {
        let paths = PathsConfig {
            state_file: Some(Utf8PathBuf::from("/var/lib/hearth/state.json")),
            ..Default::default()
        };

        let resolved = paths.resolve(Utf8Path::new("/home/u/.hearth"), None);
        assert_eq!(resolved.user_plugins_dir, "/home/u/.hearth/plugins");
        assert_eq!(resolved.bundled_plugins_dir, "/home/u/.hearth/bundled-plugins");
        assert_eq!(resolved.state_file, "/var/lib/hearth/state.json");

        let resolved = paths.resolve(Utf8Path::new("/cfg"), Some(Utf8Path::new("/opt/hearth")));
        assert_eq!(resolved.bundled_plugins_dir, "/opt/hearth/bundled-plugins");
    }

    #[test]
    fn test_policy_for_falls_back_to_default() {
        let config = RetryPoliciesConfig::default();
        assert_eq!(config.policy_for("no-such-op"), &config.default);

        let extraction = config.policy_for(operations::EXTRACTION);
        assert_eq!(extraction.max_attempts, 3);
        assert_eq!(extraction.initial_delay_ms, 500);
        assert_eq!(extraction.max_delay_ms, 4000);
    }

    #[test]
    fn test_retry_policy_partial_yaml_uses_defaults() {
        let policy: RetryPolicy = serde_yaml_ng::from_str("max-attempts: 7\n").unwrap();
        assert_eq!(policy.max_attempts, 7);
        assert_eq!(policy.strategy, RetryStrategy::ExponentialBackoff);
        assert_eq!(policy.initial_delay_ms, 100);
    }

    #[test]
    fn test_kebab_case_serialization() {
        let config = SettleConfig::default();
        let yaml = serde_yaml_ng::to_string(&config).unwrap();
        assert!(yaml.contains("poll-interval-ms: 100"));
        assert!(yaml.contains("stable-checks: 3"));
    }
}
