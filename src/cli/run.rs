//! CLI entry point and dispatch logic
//!
//! `run()` parses arguments, discovers configuration, initializes tracing,
//! creates the tokio runtime, dispatches to a command handler and reports
//! every error itself.

use anyhow::Result;
use clap::Parser;

use super::args::{Cli, Commands};
use super::commands;

use crate::{Config, ExitCode, SyllabusError, WorkflowRequest};
use syllabus_utils::logging::init_tracing;

/// Main CLI execution function.
///
/// Prints all output, including errors, and returns the exit code to use on
/// failure. `main` only calls `std::process::exit`.
pub fn run() -> Result<(), ExitCode> {
    let cli = Cli::parse();
    let cli_args = cli.cli_args();

    let config = match Config::discover(&cli_args) {
        Ok(config) => config,
        Err(err) => {
            let err = SyllabusError::from(err);
            eprintln!("{}", err.display_for_user());
            return Err(err.to_exit_code());
        }
    };

    if let Err(e) = init_tracing(config.logging.verbose, config.logging.json) {
        eprintln!("⚠ Failed to initialize logging: {e}");
    }

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("✗ Failed to create async runtime: {e}");
            return Err(ExitCode::INTERNAL);
        }
    };

    let result = rt.block_on(async {
        match cli.command {
            Commands::Run {
                topic,
                level,
                goals,
                id,
                json,
            } => {
                let request = goals
                    .into_iter()
                    .fold(WorkflowRequest::new(topic, level), WorkflowRequest::with_goal);
                commands::execute_run_command(request, id.as_deref(), json, &config).await
            }
            Commands::Status { id, json } => {
                commands::execute_status_command(id.as_deref(), json, &config).await
            }
            Commands::Cancel { id, reason } => {
                commands::execute_cancel_command(&id, &reason, &config).await
            }
            Commands::Revive { id, reason } => {
                commands::execute_revive_command(&id, &reason, &config).await
            }
            Commands::Resume { id, reason } => {
                commands::execute_resume_command(&id, &reason, &config).await
            }
            Commands::Rewind { id, to, reason } => {
                commands::execute_rewind_command(&id, to, &reason, &config).await
            }
            Commands::Purge => commands::execute_purge_command(&config).await,
            Commands::Chat { text } => commands::execute_chat_command(&text, &config).await,
            Commands::Config => commands::execute_config_command(&config),
        }
    });

    if let Err(error) = result {
        if let Some(syllabus_error) = error.downcast_ref::<SyllabusError>() {
            eprintln!("{}", syllabus_error.display_for_user());
            return Err(syllabus_error.to_exit_code());
        }

        eprintln!("✗ Unexpected error: {error:#}");
        eprintln!("\n  General troubleshooting:");
        eprintln!("    - Run with --verbose for more detailed output");
        eprintln!("    - Run `syllabus config` to check the effective configuration");
        return Err(ExitCode::INTERNAL);
    }

    Ok(())
}
