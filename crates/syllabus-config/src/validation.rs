use syllabus_utils::error::ConfigError;

use crate::model::{Config, StoreKind};

impl Config {
    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` for a single problem, or
    /// `ConfigError::ValidationFailed` listing every problem when there are several.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems: Vec<(&str, String)> = Vec::new();

        if self.coordinator.retry_ceiling == 0 {
            problems.push(("retry_ceiling", "must be greater than 0".to_string()));
        }
        if self.coordinator.conflict_retries == 0 {
            problems.push(("conflict_retries", "must be greater than 0".to_string()));
        }
        if self.coordinator.backoff_base_ms > self.coordinator.backoff_max_ms {
            problems.push((
                "backoff_base_ms",
                format!(
                    "{} exceeds backoff_max_ms ({})",
                    self.coordinator.backoff_base_ms, self.coordinator.backoff_max_ms
                ),
            ));
        }
        if self.coordinator.phase_timeout_secs < Self::min_phase_timeout() {
            problems.push((
                "phase_timeout_secs",
                format!("must be at least {} second", Self::min_phase_timeout()),
            ));
        }
        if self.executor.inference_budget == 0 {
            problems.push(("inference_budget", "must be greater than 0".to_string()));
        }
        if self.store.kind == StoreKind::File && self.store.dir.is_none() {
            problems.push((
                "store.kind",
                "'file' requires [store] dir or --store-dir".to_string(),
            ));
        }

        match problems.len() {
            0 => Ok(()),
            1 => {
                let (key, value) = problems.remove(0);
                Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    value,
                })
            }
            n => Err(ConfigError::ValidationFailed {
                errors: problems
                    .into_iter()
                    .map(|(key, value)| format!("{key}: {value}"))
                    .collect(),
                error_count: n,
            }),
        }
    }

    const fn min_phase_timeout() -> u64 {
        crate::model::CoordinatorSettings::MIN_PHASE_TIMEOUT_SECS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(Config::defaults().validate().is_ok());
    }

    #[test]
    fn test_zero_ceiling_rejected() {
        let mut config = Config::defaults();
        config.coordinator.retry_ceiling = 0;
        match config.validate() {
            Err(ConfigError::InvalidValue { key, .. }) => assert_eq!(key, "retry_ceiling"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_multiple_problems_are_collected() {
        let mut config = Config::defaults();
        config.executor.inference_budget = 0;
        config.coordinator.backoff_base_ms = 60_000;
        config.store.kind = StoreKind::File;

        match config.validate() {
            Err(ConfigError::ValidationFailed {
                errors,
                error_count,
            }) => {
                assert_eq!(error_count, 3);
                assert!(errors.iter().any(|e| e.starts_with("backoff_base_ms")));
                assert!(errors.iter().any(|e| e.starts_with("store.kind")));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
