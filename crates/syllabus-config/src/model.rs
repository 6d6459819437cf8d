use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable naming the directory that holds `config.toml`.
pub const HOME_ENV_VAR: &str = "SYLLABUS_HOME";

/// Where an effective configuration value came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Value provided via CLI argument (highest precedence).
    Cli,
    /// Value loaded from the given configuration file.
    ConfigFile(PathBuf),
    /// Value provided programmatically via `Config::builder()`.
    Programmatic,
    /// Built-in default value (lowest precedence).
    Defaults,
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cli => write!(f, "cli"),
            Self::ConfigFile(path) => write!(f, "config ({})", path.display()),
            Self::Programmatic => write!(f, "programmatic"),
            Self::Defaults => write!(f, "default"),
        }
    }
}

/// Phase coordinator policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorSettings {
    /// Failed attempts allowed per phase before the workflow is marked failed.
    pub retry_ceiling: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    /// Wall-clock budget for one phase handler invocation.
    pub phase_timeout_secs: u64,
    /// How long terminal records are kept before they expire.
    pub retention_secs: u64,
    /// Re-read attempts after losing a conditional write.
    pub conflict_retries: u32,
}

impl CoordinatorSettings {
    pub const DEFAULT_RETRY_CEILING: u32 = 3;
    pub const DEFAULT_BACKOFF_BASE_MS: u64 = 500;
    pub const DEFAULT_BACKOFF_MAX_MS: u64 = 30_000;
    pub const DEFAULT_PHASE_TIMEOUT_SECS: u64 = 600;
    pub const MIN_PHASE_TIMEOUT_SECS: u64 = 1;
    pub const DEFAULT_RETENTION_SECS: u64 = 86_400;
    pub const DEFAULT_CONFLICT_RETRIES: u32 = 3;

    #[must_use]
    pub const fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    #[must_use]
    pub const fn backoff_max(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }

    /// Phase timeout, clamped to the minimum.
    #[must_use]
    pub fn phase_timeout(&self) -> Duration {
        Duration::from_secs(self.phase_timeout_secs.max(Self::MIN_PHASE_TIMEOUT_SECS))
    }

    #[must_use]
    pub const fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            retry_ceiling: Self::DEFAULT_RETRY_CEILING,
            backoff_base_ms: Self::DEFAULT_BACKOFF_BASE_MS,
            backoff_max_ms: Self::DEFAULT_BACKOFF_MAX_MS,
            phase_timeout_secs: Self::DEFAULT_PHASE_TIMEOUT_SECS,
            retention_secs: Self::DEFAULT_RETENTION_SECS,
            conflict_retries: Self::DEFAULT_CONFLICT_RETRIES,
        }
    }
}

/// Command executor policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorSettings {
    /// Metered inference calls allowed per executor.
    pub inference_budget: u32,
    /// Extra attempts made by the per-command retry middleware.
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
}

impl ExecutorSettings {
    pub const DEFAULT_INFERENCE_BUDGET: u32 = 50;
    pub const DEFAULT_RETRY_ATTEMPTS: u32 = 2;
    pub const DEFAULT_RETRY_DELAY_MS: u64 = 200;

    #[must_use]
    pub const fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            inference_budget: Self::DEFAULT_INFERENCE_BUDGET,
            retry_attempts: Self::DEFAULT_RETRY_ATTEMPTS,
            retry_delay_ms: Self::DEFAULT_RETRY_DELAY_MS,
        }
    }
}

/// Record store backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[default]
    Memory,
    File,
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memory => write!(f, "memory"),
            Self::File => write!(f, "file"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StoreSettings {
    pub kind: StoreKind,
    /// Directory for the file-backed store.
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoggingSettings {
    pub verbose: bool,
    pub json: bool,
}

/// Effective configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub coordinator: CoordinatorSettings,
    pub executor: ExecutorSettings,
    pub store: StoreSettings,
    pub logging: LoggingSettings,
    /// Source of each effective value, keyed by `section.key`.
    pub source_attribution: HashMap<String, ConfigSource>,
}

impl Config {
    /// All attributable keys, in display order.
    pub const KEYS: [&'static str; 14] = [
        "coordinator.retry_ceiling",
        "coordinator.backoff_base_ms",
        "coordinator.backoff_max_ms",
        "coordinator.phase_timeout_secs",
        "coordinator.retention_secs",
        "coordinator.conflict_retries",
        "executor.inference_budget",
        "executor.retry_attempts",
        "executor.retry_delay_ms",
        "store.kind",
        "store.dir",
        "logging.verbose",
        "logging.json",
        "config_file",
    ];

    /// Configuration with every value at its built-in default.
    #[must_use]
    pub fn defaults() -> Self {
        let source_attribution = Self::KEYS
            .iter()
            .filter(|k| **k != "config_file" && **k != "store.dir")
            .map(|k| ((*k).to_string(), ConfigSource::Defaults))
            .collect();

        Self {
            coordinator: CoordinatorSettings::default(),
            executor: ExecutorSettings::default(),
            store: StoreSettings::default(),
            logging: LoggingSettings::default(),
            source_attribution,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::defaults()
    }
}

/// On-disk shape of `config.toml`. Every key is optional.
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct TomlConfig {
    pub coordinator: Option<CoordinatorFile>,
    pub executor: Option<ExecutorFile>,
    pub store: Option<StoreFile>,
    pub logging: Option<LoggingFile>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct CoordinatorFile {
    pub retry_ceiling: Option<u32>,
    pub backoff_base_ms: Option<u64>,
    pub backoff_max_ms: Option<u64>,
    pub phase_timeout_secs: Option<u64>,
    pub retention_secs: Option<u64>,
    pub conflict_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct ExecutorFile {
    pub inference_budget: Option<u32>,
    pub retry_attempts: Option<u32>,
    pub retry_delay_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct StoreFile {
    pub kind: Option<StoreKind>,
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct LoggingFile {
    pub verbose: Option<bool>,
    pub json: Option<bool>,
}
