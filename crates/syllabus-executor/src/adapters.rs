//! Effect adapter interfaces.
//!
//! One trait per adapter family. Providers map their failures onto
//! [`EffectError`] so the executor can classify them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use syllabus_logic::{PhaseSignal, SearchHit};
use syllabus_utils::error::EffectError;
use syllabus_utils::types::TokenUsage;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InferenceRequest {
    pub purpose: String,
    pub prompt: String,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InferenceReply {
    pub text: String,
    pub usage: TokenUsage,
}

/// LLM inference provider.
#[async_trait]
pub trait InferenceAdapter: Send + Sync {
    /// # Errors
    ///
    /// Returns `EffectError` for transport, throttling, timeout or input failures.
    async fn infer(&self, request: InferenceRequest) -> Result<InferenceReply, EffectError>;
}

/// Retrieval / search provider.
#[async_trait]
pub trait RetrievalAdapter: Send + Sync {
    /// # Errors
    ///
    /// Returns `EffectError` if the search backend fails.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, EffectError>;
}

/// Document persistence provider.
#[async_trait]
pub trait PersistenceAdapter: Send + Sync {
    /// Store `document` and return the key it was stored under.
    ///
    /// # Errors
    ///
    /// Returns `EffectError` if the document cannot be stored.
    async fn persist(
        &self,
        collection: &str,
        key: &str,
        document: &serde_json::Value,
    ) -> Result<String, EffectError>;
}

/// Transport for phase signals.
///
/// Implementations deliver at least once, after `delay`, in no particular order.
#[async_trait]
pub trait SignalSink: Send + Sync {
    /// # Errors
    ///
    /// Returns `EffectError` if the signal cannot be queued.
    async fn emit(&self, signal: PhaseSignal, delay: Duration) -> Result<(), EffectError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Error,
}

/// A user-facing message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub channel: String,
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    /// Channel used for `ShowError` commands.
    pub const ERROR_CHANNEL: &'static str = "errors";
}

/// Notification / delivery provider.
#[async_trait]
pub trait NotificationAdapter: Send + Sync {
    /// # Errors
    ///
    /// Returns `EffectError` if the notice cannot be delivered.
    async fn notify(&self, notice: Notice) -> Result<(), EffectError>;
}
