use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};

use syllabus_utils::error::ConfigError;

use crate::cli_args::CliArgs;
use crate::model::{
    Config, ConfigSource, CoordinatorFile, ExecutorFile, HOME_ENV_VAR, LoggingFile, StoreFile,
    StoreKind, TomlConfig,
};

fn overlay<T>(
    slot: &mut T,
    value: Option<T>,
    key: &str,
    source: &ConfigSource,
    attribution: &mut HashMap<String, ConfigSource>,
) {
    if let Some(value) = value {
        *slot = value;
        attribution.insert(key.to_string(), source.clone());
    }
}

impl Config {
    /// Discover and load configuration with precedence: CLI > file > defaults
    ///
    /// Reads `SYLLABUS_HOME` and the current directory for file discovery.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the current directory cannot be read, a config
    /// file cannot be parsed, or the merged configuration fails validation.
    pub fn discover(cli_args: &CliArgs) -> Result<Self, ConfigError> {
        let start_dir = env::current_dir().map_err(|e| ConfigError::DiscoveryFailed {
            reason: format!("failed to get current directory: {e}"),
        })?;
        let home = env::var_os(HOME_ENV_VAR).map(PathBuf::from);
        Self::discover_from(&start_dir, home.as_deref(), cli_args)
    }

    /// Path-driven variant of [`Config::discover`] that touches no process-global state.
    ///
    /// # Errors
    ///
    /// See [`Config::discover`].
    pub fn discover_from(
        start_dir: &Path,
        home: Option<&Path>,
        cli_args: &CliArgs,
    ) -> Result<Self, ConfigError> {
        let mut config = Self::defaults();

        let config_path = match (&cli_args.config_path, home) {
            (Some(explicit), _) => {
                if !explicit.exists() {
                    return Err(ConfigError::NotFound {
                        path: explicit.display().to_string(),
                    });
                }
                Some(explicit.clone())
            }
            (None, Some(home)) => Some(home.join("config.toml")).filter(|p| p.exists()),
            (None, None) => Self::discover_config_file_from(start_dir),
        };

        if let Some(path) = &config_path {
            let file_config = Self::load_config_file(path)?;
            config.apply_file(file_config, path);
            config
                .source_attribution
                .insert("config_file".to_string(), ConfigSource::ConfigFile(path.clone()));
        }

        config.apply_cli(cli_args);
        config.validate()?;

        Ok(config)
    }

    /// Search upward from `start_dir` for `.syllabus/config.toml`.
    ///
    /// Stops at repository root markers (.git, .hg, .svn) or the filesystem root.
    #[must_use]
    pub fn discover_config_file_from(start_dir: &Path) -> Option<PathBuf> {
        let mut current_dir = Some(start_dir);

        while let Some(dir) = current_dir {
            let config_path = dir.join(".syllabus").join("config.toml");
            if config_path.exists() {
                return Some(config_path);
            }

            if dir.join(".git").exists() || dir.join(".hg").exists() || dir.join(".svn").exists()
            {
                break;
            }

            current_dir = dir.parent();
        }

        None
    }

    fn load_config_file(path: &Path) -> Result<TomlConfig, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ConfigError::InvalidFile(format!("failed to read {}: {e}", path.display()))
        })?;
        toml::from_str(&content)
            .map_err(|e| ConfigError::InvalidFile(format!("{}: {e}", path.display())))
    }

    fn apply_file(&mut self, file: TomlConfig, path: &Path) {
        let source = ConfigSource::ConfigFile(path.to_path_buf());
        let attribution = &mut self.source_attribution;

        if let Some(CoordinatorFile {
            retry_ceiling,
            backoff_base_ms,
            backoff_max_ms,
            phase_timeout_secs,
            retention_secs,
            conflict_retries,
        }) = file.coordinator
        {
            let c = &mut self.coordinator;
            overlay(
                &mut c.retry_ceiling,
                retry_ceiling,
                "coordinator.retry_ceiling",
                &source,
                attribution,
            );
            overlay(
                &mut c.backoff_base_ms,
                backoff_base_ms,
                "coordinator.backoff_base_ms",
                &source,
                attribution,
            );
            overlay(
                &mut c.backoff_max_ms,
                backoff_max_ms,
                "coordinator.backoff_max_ms",
                &source,
                attribution,
            );
            overlay(
                &mut c.phase_timeout_secs,
                phase_timeout_secs,
                "coordinator.phase_timeout_secs",
                &source,
                attribution,
            );
            overlay(
                &mut c.retention_secs,
                retention_secs,
                "coordinator.retention_secs",
                &source,
                attribution,
            );
            overlay(
                &mut c.conflict_retries,
                conflict_retries,
                "coordinator.conflict_retries",
                &source,
                attribution,
            );
        }

        if let Some(ExecutorFile {
            inference_budget,
            retry_attempts,
            retry_delay_ms,
        }) = file.executor
        {
            let e = &mut self.executor;
            overlay(
                &mut e.inference_budget,
                inference_budget,
                "executor.inference_budget",
                &source,
                attribution,
            );
            overlay(
                &mut e.retry_attempts,
                retry_attempts,
                "executor.retry_attempts",
                &source,
                attribution,
            );
            overlay(
                &mut e.retry_delay_ms,
                retry_delay_ms,
                "executor.retry_delay_ms",
                &source,
                attribution,
            );
        }

        if let Some(StoreFile { kind, dir }) = file.store {
            overlay(&mut self.store.kind, kind, "store.kind", &source, attribution);
            // Relative store directories are anchored at the config file's directory.
            let dir = dir.map(|d| match path.parent() {
                Some(base) if d.is_relative() => base.join(d),
                _ => d,
            });
            if let Some(dir) = dir {
                self.store.dir = Some(dir);
                attribution.insert("store.dir".to_string(), source.clone());
            }
        }

        if let Some(LoggingFile { verbose, json }) = file.logging {
            overlay(&mut self.logging.verbose, verbose, "logging.verbose", &source, attribution);
            overlay(&mut self.logging.json, json, "logging.json", &source, attribution);
        }
    }

    fn apply_cli(&mut self, cli: &CliArgs) {
        let source = ConfigSource::Cli;
        let attribution = &mut self.source_attribution;

        overlay(
            &mut self.coordinator.retry_ceiling,
            cli.retry_ceiling,
            "coordinator.retry_ceiling",
            &source,
            attribution,
        );
        overlay(&mut self.logging.verbose, cli.verbose, "logging.verbose", &source, attribution);
        overlay(&mut self.logging.json, cli.json_logs, "logging.json", &source, attribution);

        // --store-dir implies the file-backed store.
        if let Some(dir) = &cli.store_dir {
            self.store.dir = Some(dir.clone());
            self.store.kind = StoreKind::File;
            attribution.insert("store.dir".to_string(), source.clone());
            attribution.insert("store.kind".to_string(), source);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_config(dir: &Path, content: &str) -> PathBuf {
        let config_dir = dir.join(".syllabus");
        fs::create_dir_all(&config_dir).unwrap();
        let path = config_dir.join("config.toml");
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_defaults_without_config_file() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join(".git")).unwrap();

        let config = Config::discover_from(temp.path(), None, &CliArgs::default()).unwrap();

        assert_eq!(config.coordinator.retry_ceiling, 3);
        assert_eq!(config.coordinator.backoff_base_ms, 500);
        assert_eq!(config.executor.inference_budget, 50);
        assert_eq!(config.store.kind, StoreKind::Memory);
        assert_eq!(
            config.source_attribution.get("coordinator.retry_ceiling"),
            Some(&ConfigSource::Defaults)
        );
        assert!(!config.source_attribution.contains_key("config_file"));
    }

    #[test]
    fn test_upward_discovery_and_precedence() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join(".git")).unwrap();
        let path = write_config(
            temp.path(),
            r#"
[coordinator]
retry_ceiling = 5
backoff_base_ms = 100

[store]
kind = "file"
dir = "records"
"#,
        );
        let nested = temp.path().join("a/b");
        fs::create_dir_all(&nested).unwrap();

        let cli = CliArgs {
            retry_ceiling: Some(7),
            ..CliArgs::default()
        };
        let config = Config::discover_from(&nested, None, &cli).unwrap();

        assert_eq!(config.coordinator.retry_ceiling, 7);
        assert_eq!(
            config.source_attribution.get("coordinator.retry_ceiling"),
            Some(&ConfigSource::Cli)
        );
        assert_eq!(config.coordinator.backoff_base_ms, 100);
        assert_eq!(
            config.source_attribution.get("coordinator.backoff_base_ms"),
            Some(&ConfigSource::ConfigFile(path.clone()))
        );
        assert_eq!(config.store.kind, StoreKind::File);
        assert_eq!(
            config.store.dir.as_deref(),
            Some(temp.path().join(".syllabus/records").as_path())
        );
    }

    #[test]
    fn test_home_directory_wins_over_search() {
        let temp = TempDir::new().unwrap();
        write_config(temp.path(), "[executor]\ninference_budget = 9\n");
        let home = TempDir::new().unwrap();
        fs::write(home.path().join("config.toml"), "[executor]\ninference_budget = 4\n").unwrap();

        let config =
            Config::discover_from(temp.path(), Some(home.path()), &CliArgs::default()).unwrap();
        assert_eq!(config.executor.inference_budget, 4);
    }

    #[test]
    fn test_store_dir_flag_selects_file_store() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join(".git")).unwrap();
        let cli = CliArgs {
            store_dir: Some(temp.path().join("store")),
            ..CliArgs::default()
        };

        let config = Config::discover_from(temp.path(), None, &cli).unwrap();
        assert_eq!(config.store.kind, StoreKind::File);
        assert_eq!(config.source_attribution.get("store.kind"), Some(&ConfigSource::Cli));
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let temp = TempDir::new().unwrap();
        write_config(temp.path(), "[coordinator]\nretry_cieling = 2\n");

        let err = Config::discover_from(temp.path(), None, &CliArgs::default()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidFile(_)));
    }

    #[test]
    fn test_explicit_missing_config_is_not_found() {
        let temp = TempDir::new().unwrap();
        let cli = CliArgs {
            config_path: Some(temp.path().join("nope.toml")),
            ..CliArgs::default()
        };

        let err = Config::discover_from(temp.path(), None, &cli).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound { .. }));
    }
}
