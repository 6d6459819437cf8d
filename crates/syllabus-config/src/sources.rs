use std::collections::BTreeMap;

use crate::model::{Config, ConfigSource};

impl Config {
    /// Effective configuration as `key -> (value, source)` for display.
    #[must_use]
    pub fn effective_config(&self) -> BTreeMap<String, (String, String)> {
        let mut config = BTreeMap::new();

        let mut add = |key: &str, value: String| {
            let source = self
                .source_attribution
                .get(key)
                .unwrap_or(&ConfigSource::Defaults)
                .to_string();
            config.insert(key.to_string(), (value, source));
        };

        let c = &self.coordinator;
        add("coordinator.retry_ceiling", c.retry_ceiling.to_string());
        add("coordinator.backoff_base_ms", c.backoff_base_ms.to_string());
        add("coordinator.backoff_max_ms", c.backoff_max_ms.to_string());
        add("coordinator.phase_timeout_secs", c.phase_timeout_secs.to_string());
        add("coordinator.retention_secs", c.retention_secs.to_string());
        add("coordinator.conflict_retries", c.conflict_retries.to_string());

        let e = &self.executor;
        add("executor.inference_budget", e.inference_budget.to_string());
        add("executor.retry_attempts", e.retry_attempts.to_string());
        add("executor.retry_delay_ms", e.retry_delay_ms.to_string());

        add("store.kind", self.store.kind.to_string());
        if let Some(dir) = &self.store.dir {
            add("store.dir", dir.display().to_string());
        }

        add("logging.verbose", self.logging.verbose.to_string());
        add("logging.json", self.logging.json.to_string());

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_config_reports_sources() {
        let config = Config::builder().retry_ceiling(9).build().unwrap();
        let effective = config.effective_config();

        assert_eq!(
            effective.get("coordinator.retry_ceiling"),
            Some(&("9".to_string(), "programmatic".to_string()))
        );
        assert_eq!(
            effective.get("executor.inference_budget"),
            Some(&("50".to_string(), "default".to_string()))
        );
        assert!(!effective.contains_key("store.dir"));
    }
}
