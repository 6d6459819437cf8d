//! Configuration management for syllabus
//!
//! Hierarchical configuration with discovery and precedence:
//! CLI > file > defaults. Configuration files are TOML with `[coordinator]`,
//! `[executor]`, `[store]` and `[logging]` sections.

mod builder;
mod cli_args;
mod discovery;
mod model;
mod sources;
mod validation;

pub use builder::ConfigBuilder;
pub use cli_args::CliArgs;
pub use model::*;
