//! Deterministic adapters that need no network.
//!
//! The CLI runs workflows against these so the whole pipeline can be driven
//! end to end on one machine. Outputs depend only on their inputs.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Mutex;
use tracing::{error, info};

use syllabus_logic::SearchHit;
use syllabus_utils::error::EffectError;
use syllabus_utils::types::TokenUsage;

use crate::adapters::{
    InferenceAdapter, InferenceReply, InferenceRequest, Notice, NoticeLevel, NotificationAdapter,
    PersistenceAdapter, RetrievalAdapter,
};

fn word_count(text: &str) -> u64 {
    u64::try_from(text.split_whitespace().count()).unwrap_or(u64::MAX)
}

/// Template-driven inference keyed on the request purpose.
#[derive(Debug, Default)]
pub struct OfflineInference;

impl OfflineInference {
    fn compose(request: &InferenceRequest) -> String {
        let subject = request.prompt.lines().next().unwrap_or_default();
        match request.purpose.as_str() {
            "expand_query" => [
                "core concepts",
                "worked examples",
                "common mistakes",
                "practice exercises",
            ]
            .iter()
            .map(|angle| format!("- {angle}"))
            .collect::<Vec<_>>()
            .join("\n"),
            "draft_structure" => [
                "Introduction",
                "Foundations",
                "Guided practice",
                "Capstone project",
            ]
            .join("\n"),
            "review" => format!("Reviewed outline for: {subject}\nNo blocking issues found."),
            _ => format!("Offline response to: {subject}"),
        }
    }
}

#[async_trait]
impl InferenceAdapter for OfflineInference {
    async fn infer(&self, request: InferenceRequest) -> Result<InferenceReply, EffectError> {
        if request.prompt.trim().is_empty() {
            return Err(EffectError::InvalidInput("prompt is empty".to_string()));
        }
        let text = Self::compose(&request);
        let usage = TokenUsage::new(word_count(&request.prompt), word_count(&text));
        Ok(InferenceReply { text, usage })
    }
}

/// Retrieval that synthesizes hits from the query text.
#[derive(Debug, Default)]
pub struct OfflineRetrieval;

#[async_trait]
impl RetrievalAdapter for OfflineRetrieval {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, EffectError> {
        let slug: String = query
            .split_whitespace()
            .map(str::to_lowercase)
            .collect::<Vec<_>>()
            .join("-");
        let count = limit.min(3);
        Ok((0..count)
            .map(|rank| {
                let rank_f = f64::from(u32::try_from(rank).unwrap_or(u32::MAX));
                SearchHit {
                    id: format!("{slug}-{rank}"),
                    title: format!("{query} ({})", rank + 1),
                    snippet: format!("Reference material about {query}."),
                    score: 1.0 / (1.0 + rank_f),
                }
            })
            .collect())
    }
}

/// Keeps persisted documents in memory, keyed by `(collection, key)`.
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    documents: Mutex<BTreeMap<(String, String), serde_json::Value>>,
}

impl MemoryPersistence {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, collection: &str, key: &str) -> Option<serde_json::Value> {
        self.documents
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&(collection.to_string(), key.to_string()))
            .cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.documents.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl PersistenceAdapter for MemoryPersistence {
    async fn persist(
        &self,
        collection: &str,
        key: &str,
        document: &serde_json::Value,
    ) -> Result<String, EffectError> {
        self.documents
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert((collection.to_string(), key.to_string()), document.clone());
        Ok(key.to_string())
    }
}

/// Writes notices to the log.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl NotificationAdapter for LogNotifier {
    async fn notify(&self, notice: Notice) -> Result<(), EffectError> {
        match notice.level {
            NoticeLevel::Info => info!(channel = %notice.channel, "{}", notice.message),
            NoticeLevel::Error => error!(channel = %notice.channel, "{}", notice.message),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_offline_inference_is_deterministic() {
        let request = InferenceRequest {
            purpose: "draft_structure".into(),
            prompt: "Outline modules".into(),
            max_tokens: 100,
        };
        let a = OfflineInference.infer(request.clone()).await.unwrap();
        let b = OfflineInference.infer(request).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.text.lines().count(), 4);
        assert_eq!(a.usage.input_tokens, 2);
    }

    #[tokio::test]
    async fn test_offline_retrieval_respects_limit() {
        let hits = OfflineRetrieval.search("Rust traits", 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "rust-traits-0");
        assert!(hits[0].score > hits[1].score);
    }

    #[tokio::test]
    async fn test_memory_persistence_stores_documents() {
        let store = MemoryPersistence::new();
        let key = store
            .persist("curricula", "k1", &serde_json::json!({"a": 1}))
            .await
            .unwrap();
        assert_eq!(key, "k1");
        assert_eq!(store.get("curricula", "k1"), Some(serde_json::json!({"a": 1})));
    }
}
