//! Command catalog: descriptions of side effects, and the outputs they produce.
//!
//! Adding a variant forces every `match` over `Command`, `CommandKind` and
//! `AdapterKind` to be updated, which is how a missing executor binding is
//! caught at build time.

use serde::{Deserialize, Serialize};
use std::fmt;

use syllabus_utils::types::TokenUsage;

use crate::signal::PhaseSignal;

/// Something that should happen. Carries data only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// Run a metered inference call.
    InvokeInference {
        /// Short label used for logs and accounting (`"chat"`, `"draft_structure"`).
        purpose: String,
        prompt: String,
        max_tokens: u32,
    },
    /// Query the retrieval backend.
    Search { query: String, limit: usize },
    /// Store a document in an external collection.
    PersistRecord {
        collection: String,
        key: String,
        document: serde_json::Value,
    },
    /// Hand a phase signal to the signal transport, to be delivered after
    /// `delay_ms` (retry backoff; zero for a normal advance).
    EmitPhaseSignal { signal: PhaseSignal, delay_ms: u64 },
    /// Deliver a message to a user-facing channel.
    Notify { channel: String, message: String },
    /// Surface an error to the user.
    ShowError { message: String },
}

impl Command {
    #[must_use]
    pub const fn kind(&self) -> CommandKind {
        match self {
            Self::InvokeInference { .. } => CommandKind::InvokeInference,
            Self::Search { .. } => CommandKind::Search,
            Self::PersistRecord { .. } => CommandKind::PersistRecord,
            Self::EmitPhaseSignal { .. } => CommandKind::EmitPhaseSignal,
            Self::Notify { .. } => CommandKind::Notify,
            Self::ShowError { .. } => CommandKind::ShowError,
        }
    }
}

/// Tag of a [`Command`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    InvokeInference,
    Search,
    PersistRecord,
    EmitPhaseSignal,
    Notify,
    ShowError,
}

impl CommandKind {
    pub const ALL: [CommandKind; 6] = [
        Self::InvokeInference,
        Self::Search,
        Self::PersistRecord,
        Self::EmitPhaseSignal,
        Self::Notify,
        Self::ShowError,
    ];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::InvokeInference => "invoke_inference",
            Self::Search => "search",
            Self::PersistRecord => "persist_record",
            Self::EmitPhaseSignal => "emit_phase_signal",
            Self::Notify => "notify",
            Self::ShowError => "show_error",
        }
    }

    /// The adapter that executes this kind of command.
    #[must_use]
    pub const fn adapter(&self) -> AdapterKind {
        match self {
            Self::InvokeInference => AdapterKind::Inference,
            Self::Search => AdapterKind::Retrieval,
            Self::PersistRecord => AdapterKind::Persistence,
            Self::EmitPhaseSignal => AdapterKind::Signal,
            Self::Notify | Self::ShowError => AdapterKind::Notification,
        }
    }

    /// Whether executions of this kind consume metered budget.
    #[must_use]
    pub const fn is_metered(&self) -> bool {
        matches!(self, Self::InvokeInference)
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Family of external collaborator that executes commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterKind {
    Inference,
    Retrieval,
    Persistence,
    Signal,
    Notification,
}

impl AdapterKind {
    pub const ALL: [AdapterKind; 5] = [
        Self::Inference,
        Self::Retrieval,
        Self::Persistence,
        Self::Signal,
        Self::Notification,
    ];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Inference => "inference",
            Self::Retrieval => "retrieval",
            Self::Persistence => "persistence",
            Self::Signal => "signal",
            Self::Notification => "notification",
        }
    }
}

impl fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One retrieval result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub title: String,
    pub snippet: String,
    pub score: f64,
}

/// What a successfully executed command produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EffectOutput {
    Inference { text: String, usage: TokenUsage },
    Search { hits: Vec<SearchHit> },
    Persisted { key: String },
    SignalEmitted,
    Notified,
}

impl EffectOutput {
    /// Metered usage carried by this output, if any.
    #[must_use]
    pub const fn usage(&self) -> Option<TokenUsage> {
        match self {
            Self::Inference { usage, .. } => Some(*usage),
            _ => None,
        }
    }
}
