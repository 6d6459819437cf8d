//! Command implementations.

mod chat;
mod config;
mod workflow;

pub use chat::execute_chat_command;
pub use config::execute_config_command;
pub use workflow::{
    execute_cancel_command, execute_purge_command, execute_resume_command,
    execute_revive_command, execute_rewind_command, execute_run_command, execute_status_command,
};
