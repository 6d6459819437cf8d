use std::path::PathBuf;
use std::time::Duration;

use syllabus_utils::error::ConfigError;

use crate::model::{Config, ConfigSource, StoreKind};

impl Config {
    /// Create a builder for programmatic configuration.
    ///
    /// # Example
    ///
    /// ```rust
    /// use syllabus_config::Config;
    /// use std::time::Duration;
    ///
    /// let config = Config::builder()
    ///     .retry_ceiling(5)
    ///     .phase_timeout(Duration::from_secs(30))
    ///     .build()
    ///     .expect("valid config");
    /// assert_eq!(config.coordinator.retry_ceiling, 5);
    /// ```
    #[must_use]
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }
}

/// Builder for programmatic configuration.
///
/// Values set through the builder are attributed to
/// `ConfigSource::Programmatic`; everything else keeps its default.
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    retry_ceiling: Option<u32>,
    backoff_base: Option<Duration>,
    backoff_max: Option<Duration>,
    phase_timeout: Option<Duration>,
    retention: Option<Duration>,
    conflict_retries: Option<u32>,
    inference_budget: Option<u32>,
    retry_attempts: Option<u32>,
    retry_delay: Option<Duration>,
    store_dir: Option<PathBuf>,
    verbose: Option<bool>,
    json_logs: Option<bool>,
}

impl ConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn retry_ceiling(mut self, ceiling: u32) -> Self {
        self.retry_ceiling = Some(ceiling);
        self
    }

    /// Set the coordinator backoff bounds.
    #[must_use]
    pub fn backoff(mut self, base: Duration, max: Duration) -> Self {
        self.backoff_base = Some(base);
        self.backoff_max = Some(max);
        self
    }

    #[must_use]
    pub fn phase_timeout(mut self, timeout: Duration) -> Self {
        self.phase_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn retention(mut self, retention: Duration) -> Self {
        self.retention = Some(retention);
        self
    }

    #[must_use]
    pub fn conflict_retries(mut self, retries: u32) -> Self {
        self.conflict_retries = Some(retries);
        self
    }

    #[must_use]
    pub fn inference_budget(mut self, budget: u32) -> Self {
        self.inference_budget = Some(budget);
        self
    }

    /// Configure the per-command retry middleware.
    #[must_use]
    pub fn command_retry(mut self, attempts: u32, delay: Duration) -> Self {
        self.retry_attempts = Some(attempts);
        self.retry_delay = Some(delay);
        self
    }

    /// Use the file-backed store rooted at `dir`.
    #[must_use]
    pub fn store_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.store_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = Some(verbose);
        self
    }

    #[must_use]
    pub fn json_logs(mut self, json: bool) -> Self {
        self.json_logs = Some(json);
        self
    }

    /// Build and validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the resulting configuration is invalid.
    pub fn build(self) -> Result<Config, ConfigError> {
        let mut config = Config::defaults();
        let mut mark = |key: &str| {
            config
                .source_attribution
                .insert(key.to_string(), ConfigSource::Programmatic);
        };

        let millis = |d: Duration| u64::try_from(d.as_millis()).unwrap_or(u64::MAX);

        if let Some(v) = self.retry_ceiling {
            config.coordinator.retry_ceiling = v;
            mark("coordinator.retry_ceiling");
        }
        if let Some(v) = self.backoff_base {
            config.coordinator.backoff_base_ms = millis(v);
            mark("coordinator.backoff_base_ms");
        }
        if let Some(v) = self.backoff_max {
            config.coordinator.backoff_max_ms = millis(v);
            mark("coordinator.backoff_max_ms");
        }
        if let Some(v) = self.phase_timeout {
            config.coordinator.phase_timeout_secs = v.as_secs();
            mark("coordinator.phase_timeout_secs");
        }
        if let Some(v) = self.retention {
            config.coordinator.retention_secs = v.as_secs();
            mark("coordinator.retention_secs");
        }
        if let Some(v) = self.conflict_retries {
            config.coordinator.conflict_retries = v;
            mark("coordinator.conflict_retries");
        }
        if let Some(v) = self.inference_budget {
            config.executor.inference_budget = v;
            mark("executor.inference_budget");
        }
        if let Some(v) = self.retry_attempts {
            config.executor.retry_attempts = v;
            mark("executor.retry_attempts");
        }
        if let Some(v) = self.retry_delay {
            config.executor.retry_delay_ms = millis(v);
            mark("executor.retry_delay_ms");
        }
        if let Some(dir) = self.store_dir {
            config.store.dir = Some(dir);
            config.store.kind = StoreKind::File;
            mark("store.dir");
            mark("store.kind");
        }
        if let Some(v) = self.verbose {
            config.logging.verbose = v;
            mark("logging.verbose");
        }
        if let Some(v) = self.json_logs {
            config.logging.json = v;
            mark("logging.json");
        }

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults_match_default_config() {
        let config = ConfigBuilder::new().build().unwrap();
        assert_eq!(config.coordinator, Config::defaults().coordinator);
        assert_eq!(config.executor, Config::defaults().executor);
    }

    #[test]
    fn test_builder_rejects_inverted_backoff() {
        let err = Config::builder()
            .backoff(Duration::from_secs(10), Duration::from_secs(1))
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key, .. } if key == "backoff_base_ms"));
    }

    #[test]
    fn test_builder_store_dir_selects_file_store() {
        let config = Config::builder().store_dir("/tmp/records").build().unwrap();
        assert_eq!(config.store.kind, StoreKind::File);
        assert_eq!(
            config.source_attribution.get("store.dir"),
            Some(&ConfigSource::Programmatic)
        );
    }

    #[test]
    fn test_builder_rejects_subsecond_phase_timeout() {
        let err = Config::builder()
            .phase_timeout(Duration::from_millis(200))
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { key, .. } if key == "phase_timeout_secs"
        ));
    }
}
