use std::fmt;
use std::io;
use std::time::Duration;
use thiserror::Error;

use crate::types::{Fault, FaultKind};

/// Library-level error type with user-friendly reporting.
///
/// `SyllabusError` is what the CLI and embedding applications see. Component
/// crates return their own narrower error enums; each converts into this one
/// with `?`.
///
/// # Exit Code Mapping
///
/// | Exit Code | Error Type |
/// |-----------|------------|
/// | 2 | Configuration / argument errors |
/// | 3 | Workflow ended in `failed` |
/// | 4 | Workflow record not found |
/// | 5 | Store conflict retries exhausted |
/// | 1 | Other errors |
///
/// Library code returns `SyllabusError` and does NOT call `std::process::exit()`.
#[derive(Error, Debug)]
pub enum SyllabusError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Record store error: {0}")]
    Store(#[from] StoreError),

    #[error("Effect error: {0}")]
    Effect(#[from] EffectError),

    #[error("Executor error: {0}")]
    Executor(#[from] ExecutorError),

    #[error("Coordinator error: {0}")]
    Coordinator(#[from] CoordinatorError),

    #[error("Invalid workflow id: {0}")]
    WorkflowId(#[from] WorkflowIdError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Workflow {id} failed: {fault}")]
    WorkflowFailed { id: String, fault: Fault },

    #[error("Workflow {id} stalled at {phase} with {errors} unhandled signal error(s)")]
    WorkflowStalled {
        id: String,
        phase: String,
        errors: usize,
    },
}

/// Trait for providing user-friendly error reporting with context and suggestions
pub trait UserFriendlyError {
    /// Get a user-friendly error message
    fn user_message(&self) -> String;

    /// Get contextual information about the error
    fn context(&self) -> Option<String>;

    /// Get suggested actions to resolve the error
    fn suggestions(&self) -> Vec<String>;

    /// Get the error category for grouping similar errors
    fn category(&self) -> ErrorCategory;
}

/// Categories of errors for better organization and handling
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Persistence,
    Effects,
    Workflow,
    Concurrency,
    Validation,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration => write!(f, "Configuration"),
            Self::Persistence => write!(f, "Persistence"),
            Self::Effects => write!(f, "Effects"),
            Self::Workflow => write!(f, "Workflow"),
            Self::Concurrency => write!(f, "Concurrency"),
            Self::Validation => write!(f, "Validation"),
        }
    }
}

/// Workflow id validation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkflowIdError {
    #[error("workflow id is empty")]
    Empty,

    #[error("workflow id is {len} characters long (max {max})")]
    TooLong { len: usize, max: usize },

    #[error("workflow id '{id}' contains invalid character {bad:?}")]
    InvalidCharacter { id: String, bad: char },
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration file: {0}")]
    InvalidFile(String),

    #[error("Invalid configuration value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not found at {path}")]
    NotFound { path: String },

    #[error("Configuration discovery failed: {reason}")]
    DiscoveryFailed { reason: String },

    #[error("Configuration validation failed: {error_count} errors")]
    ValidationFailed {
        errors: Vec<String>,
        error_count: usize,
    },
}

impl UserFriendlyError for ConfigError {
    fn user_message(&self) -> String {
        match self {
            Self::InvalidFile(reason) => {
                format!("Configuration file has invalid format: {reason}")
            }
            Self::InvalidValue { key, value } => {
                format!("Configuration '{key}' has invalid value: {value}")
            }
            Self::NotFound { path } => format!("Configuration file not found: {path}"),
            Self::DiscoveryFailed { reason } => {
                format!("Failed to discover configuration: {reason}")
            }
            Self::ValidationFailed { errors, .. } => format!(
                "Configuration validation failed with {} errors: {}",
                errors.len(),
                errors.join(", ")
            ),
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::InvalidFile(_) => Some(
                "Configuration files must be valid TOML with [coordinator], [executor], \
                 [store] and [logging] sections."
                    .to_string(),
            ),
            Self::NotFound { .. } | Self::DiscoveryFailed { .. } => Some(
                "syllabus reads SYLLABUS_HOME/config.toml, or searches for \
                 .syllabus/config.toml upward from the current directory."
                    .to_string(),
            ),
            Self::InvalidValue { key, .. } => Some(format!(
                "The '{key}' configuration option has specific format requirements."
            )),
            Self::ValidationFailed { .. } => None,
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::InvalidFile(_) => vec![
                "Check the TOML syntax using a TOML validator".to_string(),
                "Remove unknown sections or keys".to_string(),
            ],
            Self::InvalidValue { key, .. } => match key.as_str() {
                "retry_ceiling" | "inference_budget" => {
                    vec!["Use a positive integer value".to_string()]
                }
                "backoff_base_ms" | "backoff_max_ms" => vec![
                    "Keep backoff_base_ms less than or equal to backoff_max_ms".to_string(),
                ],
                "store.kind" => vec!["Use 'memory' or 'file'".to_string()],
                _ => vec![
                    "Remove the option to use the default value".to_string(),
                ],
            },
            Self::NotFound { .. } => vec![
                "Create .syllabus/config.toml in your project root".to_string(),
                "Pass --config <path> explicitly".to_string(),
            ],
            Self::DiscoveryFailed { .. } => vec![
                "Check read permissions on the directory tree".to_string(),
                "Use --config <path> to specify configuration file explicitly".to_string(),
            ],
            Self::ValidationFailed { .. } => {
                vec!["Fix each listed value and re-run".to_string()]
            }
        }
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Configuration
    }
}

/// Durable record store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error in record store: {0}")]
    Io(#[from] io::Error),

    #[error("Record {id} is corrupted: {reason}")]
    Corrupted { id: String, reason: String },

    #[error("Failed to serialize record {id}: {reason}")]
    Serialization { id: String, reason: String },

    #[error("Failed to lock record {id}: {reason}")]
    LockFailed { id: String, reason: String },
}

impl UserFriendlyError for StoreError {
    fn user_message(&self) -> String {
        match self {
            Self::Io(e) => format!("Record store I/O failed: {e}"),
            Self::Corrupted { id, reason } => {
                format!("Stored record for workflow '{id}' cannot be read: {reason}")
            }
            Self::Serialization { id, reason } => {
                format!("Record for workflow '{id}' could not be encoded: {reason}")
            }
            Self::LockFailed { id, reason } => {
                format!("Could not lock record for workflow '{id}': {reason}")
            }
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::Corrupted { .. } => Some(
                "Records are JSON files written atomically; corruption usually means manual edits."
                    .to_string(),
            ),
            _ => None,
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::Io(_) | Self::LockFailed { .. } => vec![
                "Check that the store directory exists and is writable".to_string(),
            ],
            Self::Corrupted { id, .. } => vec![format!(
                "Inspect or delete the record file for '{id}' in the store directory"
            )],
            Self::Serialization { .. } => Vec::new(),
        }
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Persistence
    }
}

/// Errors reported by effect adapters.
///
/// Every adapter maps its provider-specific failures onto these variants so
/// the executor can classify them without knowing the provider.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EffectError {
    /// Transport-level failure (connection refused, reset, DNS)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Provider throttling or quota (429-style)
    #[error("Throttled: {0}")]
    Throttled(String),

    /// Adapter call exceeded its deadline
    #[error("Timeout after {duration:?}")]
    Timeout { duration: Duration },

    /// Provider outage (5xx-style)
    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    /// The payload was rejected by the provider
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Metered budget exhausted
    #[error("Budget exceeded: attempted {attempted} calls, limit is {limit}")]
    BudgetExceeded { limit: u32, attempted: u32 },
}

impl EffectError {
    /// Retry classification of this error.
    #[must_use]
    pub const fn fault_kind(&self) -> FaultKind {
        match self {
            Self::Transport(_)
            | Self::Throttled(_)
            | Self::Timeout { .. }
            | Self::Unavailable(_) => FaultKind::Transient,
            Self::InvalidInput(_) | Self::BudgetExceeded { .. } => FaultKind::Permanent,
        }
    }

    /// Convert into a storable [`Fault`] tagged with `origin`.
    #[must_use]
    pub fn to_fault(&self, origin: &str) -> Fault {
        Fault::new(self.fault_kind(), self.to_string()).with_origin(origin)
    }
}

impl UserFriendlyError for EffectError {
    fn user_message(&self) -> String {
        match self {
            Self::Transport(msg) => format!("Effect transport error: {msg}"),
            Self::Throttled(msg) => format!("Provider throttled the request: {msg}"),
            Self::Timeout { duration } => format!("Effect timed out after {duration:?}"),
            Self::Unavailable(msg) => format!("Provider is unavailable: {msg}"),
            Self::InvalidInput(msg) => format!("Provider rejected the request: {msg}"),
            Self::BudgetExceeded { limit, attempted } => format!(
                "Inference budget exceeded: attempted {attempted} calls, limit is {limit}"
            ),
        }
    }

    fn context(&self) -> Option<String> {
        match self.fault_kind() {
            FaultKind::Transient => {
                Some("Transient failures are retried with backoff by the coordinator.".to_string())
            }
            _ => None,
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::BudgetExceeded { .. } => vec![
                "Raise [executor] inference_budget in config.toml".to_string(),
            ],
            Self::InvalidInput(_) => vec!["Check the workflow request content".to_string()],
            _ => vec!["Retry later or raise [coordinator] retry_ceiling".to_string()],
        }
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Effects
    }
}

/// Command executor construction errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutorError {
    #[error("No {adapter} adapter bound for command '{command}'")]
    MissingAdapter { command: String, adapter: String },
}

impl UserFriendlyError for ExecutorError {
    fn user_message(&self) -> String {
        match self {
            Self::MissingAdapter { command, adapter } => format!(
                "Command '{command}' cannot be executed because no {adapter} adapter was configured"
            ),
        }
    }

    fn context(&self) -> Option<String> {
        Some(
            "Every command kind must be bound to an adapter when the executor is built."
                .to_string(),
        )
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::MissingAdapter { adapter, .. } => {
                vec![format!("Register a {adapter} adapter on the executor builder")]
            }
        }
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Configuration
    }
}

/// Phase coordinator errors
#[derive(Error, Debug)]
pub enum CoordinatorError {
    #[error("Workflow {id} not found")]
    NotFound { id: String },

    #[error("Workflow {id} already exists")]
    AlreadyExists { id: String },

    #[error("Invalid transition for workflow {id}: {from} -> {to}")]
    InvalidTransition { id: String, from: String, to: String },

    #[error("Cannot {action} workflow {id} while it is {phase}")]
    NotAllowed {
        id: String,
        action: &'static str,
        phase: String,
    },

    #[error("Workflow {id}: gave up after {attempts} conflicting writes")]
    ConflictRetriesExhausted { id: String, attempts: u32 },

    #[error("Failed to emit signal for workflow {id}: {reason}")]
    SignalFailed { id: String, reason: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl UserFriendlyError for CoordinatorError {
    fn user_message(&self) -> String {
        match self {
            Self::NotFound { id } => format!("No workflow named '{id}' exists (or it expired)"),
            Self::AlreadyExists { id } => format!("Workflow '{id}' already exists"),
            Self::InvalidTransition { id, from, to } => {
                format!("Workflow '{id}' cannot move from {from} to {to}")
            }
            Self::NotAllowed { id, action, phase } => {
                format!("Workflow '{id}' cannot {action} while it is {phase}")
            }
            Self::ConflictRetriesExhausted { id, attempts } => format!(
                "Workflow '{id}' is being modified concurrently; gave up after {attempts} attempts"
            ),
            Self::SignalFailed { id, reason } => {
                format!("Could not schedule the next phase of '{id}': {reason}")
            }
            Self::Store(e) => e.user_message(),
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::InvalidTransition { .. } => Some(
                "Phases only move forward; going back requires revive or rewind.".to_string(),
            ),
            Self::ConflictRetriesExhausted { .. } => Some(
                "Record writes are conditional on the version read; another writer won each race."
                    .to_string(),
            ),
            Self::Store(e) => e.context(),
            _ => None,
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::NotFound { .. } => vec!["List workflows with 'syllabus status'".to_string()],
            Self::NotAllowed { id, .. } => {
                vec![format!("Check the workflow with 'syllabus status {id}'")]
            }
            Self::InvalidTransition { .. } => vec![
                "Use 'syllabus revive' for failed workflows".to_string(),
                "Use 'syllabus rewind --to <phase>' to redo earlier phases".to_string(),
            ],
            Self::ConflictRetriesExhausted { .. } => {
                vec!["Retry the command once other handlers finish".to_string()]
            }
            Self::Store(e) => e.suggestions(),
            _ => Vec::new(),
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::ConflictRetriesExhausted { .. } => ErrorCategory::Concurrency,
            Self::Store(_) => ErrorCategory::Persistence,
            _ => ErrorCategory::Workflow,
        }
    }
}

impl UserFriendlyError for SyllabusError {
    fn user_message(&self) -> String {
        match self {
            Self::Config(e) => e.user_message(),
            Self::Store(e) => e.user_message(),
            Self::Effect(e) => e.user_message(),
            Self::Executor(e) => e.user_message(),
            Self::Coordinator(e) => e.user_message(),
            Self::WorkflowId(e) => format!("Invalid workflow id: {e}"),
            Self::Io(e) => format!("I/O error: {e}"),
            Self::WorkflowFailed { id, fault } => {
                format!("Workflow '{id}' failed: {}", fault.message)
            }
            Self::WorkflowStalled { id, phase, .. } => {
                format!("Workflow '{id}' is waiting at {phase} with no signal pending")
            }
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::Config(e) => e.context(),
            Self::Store(e) => e.context(),
            Self::Effect(e) => e.context(),
            Self::Executor(e) => e.context(),
            Self::Coordinator(e) => e.context(),
            Self::WorkflowFailed { fault, .. } => fault
                .origin
                .as_ref()
                .map(|origin| format!("The failure originated in {origin} ({}).", fault.kind)),
            Self::WorkflowStalled { errors, .. } => Some(format!(
                "{errors} signal(s) could not be handled after their record was written."
            )),
            Self::WorkflowId(_) | Self::Io(_) => None,
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::Config(e) => e.suggestions(),
            Self::Store(e) => e.suggestions(),
            Self::Effect(e) => e.suggestions(),
            Self::Executor(e) => e.suggestions(),
            Self::Coordinator(e) => e.suggestions(),
            Self::WorkflowId(_) => {
                vec!["Use only letters, digits, '-' and '_'".to_string()]
            }
            Self::Io(_) => Vec::new(),
            Self::WorkflowFailed { id, .. } => {
                vec![format!("Run 'syllabus revive {id}' once the cause is fixed")]
            }
            Self::WorkflowStalled { id, .. } => {
                vec![format!("Run 'syllabus resume {id}' to re-emit the pending signal")]
            }
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Config(e) => e.category(),
            Self::Store(e) => e.category(),
            Self::Effect(e) => e.category(),
            Self::Executor(e) => e.category(),
            Self::Coordinator(e) => e.category(),
            Self::WorkflowId(_) => ErrorCategory::Validation,
            Self::Io(_) => ErrorCategory::Persistence,
            Self::WorkflowFailed { .. } | Self::WorkflowStalled { .. } => ErrorCategory::Workflow,
        }
    }
}

impl SyllabusError {
    /// Get a user-friendly error message with context and actionable suggestions.
    ///
    /// ```text
    /// Error: <user message>
    ///
    /// Context: <context if available>
    ///
    /// Suggestions:
    ///   • <suggestion 1>
    /// ```
    #[must_use]
    pub fn display_for_user(&self) -> String {
        let mut output = String::new();
        output.push_str(&format!("Error: {}\n", self.user_message()));

        if let Some(ctx) = self.context() {
            output.push_str(&format!("\nContext: {ctx}\n"));
        }

        let suggestions = self.suggestions();
        if !suggestions.is_empty() {
            output.push_str("\nSuggestions:\n");
            for suggestion in suggestions {
                output.push_str(&format!("  • {suggestion}\n"));
            }
        }

        output
    }
}
