//! CLI argument definitions (clap derive).

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use syllabus_config::CliArgs;
use syllabus_utils::types::PhaseId;

/// syllabus - multi-phase curriculum generation with a durable coordinator
#[derive(Parser, Debug)]
#[command(name = "syllabus")]
#[command(about = "Drive curriculum-generation workflows through durable, retryable phases")]
#[command(long_about = r#"
syllabus runs a curriculum workflow through six phases:
  expand_query → retrieve_candidates → draft_structure → draft_details → review → persist

Each phase is triggered by a signal, runs its commands through the effect
executor, and conditionally writes the advanced workflow record. Failed phases
retry with exponential backoff up to the configured ceiling.

EXAMPLES:
  # Run a workflow to completion with the offline adapters
  syllabus run --topic "ownership in rust" --level beginner --goal "read borrow errors"

  # Inspect, cancel, revive, resume or rewind a stored workflow (needs a file store)
  syllabus --store-dir .syllabus/records status wf-1234
  syllabus --store-dir .syllabus/records revive wf-1234 --reason "provider is back"
  syllabus --store-dir .syllabus/records resume wf-1234
  syllabus --store-dir .syllabus/records rewind wf-1234 --to draft_structure

  # One interactive session turn
  syllabus chat "what is a lifetime?"

CONFIGURATION:
  Precedence: CLI flags > config file > defaults.
  The config file is $SYLLABUS_HOME/config.toml, or .syllabus/config.toml found
  by searching upward from the working directory. --config overrides discovery.
"#)]
#[command(version)]
pub struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory for the file-backed record store (implies store.kind = file)
    #[arg(long, global = true)]
    pub store_dir: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Failed attempts allowed per phase before a workflow fails
    #[arg(long, global = true)]
    pub retry_ceiling: Option<u32>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Overrides handed to configuration discovery. Unset flags stay `None`.
    #[must_use]
    pub fn cli_args(&self) -> CliArgs {
        CliArgs {
            config_path: self.config.clone(),
            store_dir: self.store_dir.clone(),
            verbose: self.verbose.then_some(true),
            json_logs: self.json_logs.then_some(true),
            retry_ceiling: self.retry_ceiling,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start a workflow and drive it to a terminal state
    Run {
        /// Subject of the curriculum
        #[arg(long)]
        topic: String,

        /// Learner level (e.g. beginner, intermediate)
        #[arg(long, default_value = "beginner")]
        level: String,

        /// Learning goal (repeatable)
        #[arg(long = "goal")]
        goals: Vec<String>,

        /// Workflow id to use instead of a generated one
        #[arg(long)]
        id: Option<String>,

        /// Print the final record as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show a workflow, or list all workflows when no id is given
    Status {
        id: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Cancel a running workflow
    Cancel {
        id: String,

        #[arg(long, default_value = "cancelled by operator")]
        reason: String,
    },

    /// Retry a failed workflow from the phase that failed
    Revive {
        id: String,

        #[arg(long, default_value = "revived by operator")]
        reason: String,
    },

    /// Re-emit the pending signal of a stalled workflow and run it
    Resume {
        id: String,

        #[arg(long, default_value = "resumed by operator")]
        reason: String,
    },

    /// Move a workflow back to an earlier phase and run it again from there
    Rewind {
        id: String,

        /// Phase to rewind to
        #[arg(long, value_parser = parse_phase)]
        to: PhaseId,

        #[arg(long, default_value = "rewound by operator")]
        reason: String,
    },

    /// Delete workflow records past their retention window
    Purge,

    /// Send one message through an interactive session
    Chat { text: String },

    /// Show the effective configuration and where each value came from
    Config,
}

fn parse_phase(raw: &str) -> Result<PhaseId, String> {
    raw.parse()
}
