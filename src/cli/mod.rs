//! Command-line interface for syllabus
//!
//! - `args`: clap argument definitions
//! - `run`: entry point and command dispatch
//! - `commands`: command implementations

pub mod args;
mod commands;
mod run;

pub use args::{Cli, Commands};
pub use run::run;
