//! `config`: print the effective configuration with value sources.

use anyhow::Result;

use syllabus_config::ConfigSource;

use crate::Config;

pub fn execute_config_command(config: &Config) -> Result<()> {
    match config.source_attribution.get("config_file") {
        Some(ConfigSource::ConfigFile(path)) => println!("Config file: {}", path.display()),
        _ => println!("Config file: none (defaults and flags only)"),
    }
    println!("Effective configuration:");
    for (key, (value, source)) in config.effective_config() {
        println!("  {key:<32} = {value:<12} [{source}]");
    }
    Ok(())
}
