//! Interactive session state and events.

use serde::{Deserialize, Serialize};

use syllabus_utils::types::{Fault, TokenUsage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub text: String,
}

impl Message {
    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    #[must_use]
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Idle,
    /// An inference request is in flight.
    Awaiting,
    /// The last inference failed; see `last_error`.
    Failed,
}

/// Snapshot of one interactive session. Replaced wholesale on every event.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SessionState {
    pub messages: Vec<Message>,
    pub status: SessionStatus,
    pub last_error: Option<Fault>,
    pub usage: TokenUsage,
}

/// Something that happened to a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// The user submitted text.
    Submit { text: String },
    InferenceSucceeded { text: String, usage: TokenUsage },
    InferenceFailed { fault: Fault },
    /// Discard the conversation.
    Reset,
}
