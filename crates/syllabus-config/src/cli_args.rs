use std::path::PathBuf;

/// Values supplied on the command line. `None` means "not given".
#[derive(Debug, Clone, Default)]
pub struct CliArgs {
    pub config_path: Option<PathBuf>,
    pub store_dir: Option<PathBuf>,
    pub verbose: Option<bool>,
    pub json_logs: Option<bool>,
    pub retry_ceiling: Option<u32>,
}
