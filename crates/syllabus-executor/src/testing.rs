//! Scriptable adapters for tests (feature `test-utils`).
//!
//! Each double records what it was asked to do and falls back to the
//! offline adapter when nothing is scripted.

use async_trait::async_trait;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use syllabus_logic::{PhaseSignal, SearchHit};
use syllabus_utils::error::EffectError;
use syllabus_utils::types::TokenUsage;

use crate::adapters::{
    InferenceAdapter, InferenceReply, InferenceRequest, Notice, NotificationAdapter,
    RetrievalAdapter, SignalSink,
};
use crate::executor::CommandExecutorBuilder;
use crate::observer::CollectingObserver;
use crate::offline::{MemoryPersistence, OfflineInference, OfflineRetrieval};
use crate::CommandExecutor;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

enum Step {
    Reply(String),
    Fail(EffectError),
}

/// Inference double with a queue of scripted replies and failures.
#[derive(Default)]
pub struct ScriptedInference {
    script: Mutex<VecDeque<Step>>,
    always_fail: Mutex<BTreeMap<String, EffectError>>,
    requests: Mutex<Vec<InferenceRequest>>,
    panic_next: AtomicBool,
}

impl ScriptedInference {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply_next(&self, text: impl Into<String>) {
        lock(&self.script).push_back(Step::Reply(text.into()));
    }

    pub fn fail_next(&self, error: EffectError) {
        lock(&self.script).push_back(Step::Fail(error));
    }

    /// Fail every request with this purpose until [`ScriptedInference::heal`].
    pub fn fail_purpose(&self, purpose: &str, error: EffectError) {
        lock(&self.always_fail).insert(purpose.to_string(), error);
    }

    pub fn heal(&self, purpose: &str) {
        lock(&self.always_fail).remove(purpose);
    }

    pub fn panic_next(&self) {
        self.panic_next.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn requests(&self) -> Vec<InferenceRequest> {
        lock(&self.requests).clone()
    }

    #[must_use]
    pub fn calls_for(&self, purpose: &str) -> usize {
        lock(&self.requests)
            .iter()
            .filter(|r| r.purpose == purpose)
            .count()
    }
}

#[async_trait]
impl InferenceAdapter for ScriptedInference {
    async fn infer(&self, request: InferenceRequest) -> Result<InferenceReply, EffectError> {
        lock(&self.requests).push(request.clone());

        if self.panic_next.swap(false, Ordering::SeqCst) {
            panic!("scripted inference panic");
        }
        if let Some(error) = lock(&self.always_fail).get(&request.purpose) {
            return Err(error.clone());
        }
        let step = lock(&self.script).pop_front();
        match step {
            Some(Step::Reply(text)) => Ok(InferenceReply {
                usage: TokenUsage::new(10, 5),
                text,
            }),
            Some(Step::Fail(error)) => Err(error),
            None => OfflineInference.infer(request).await,
        }
    }
}

/// Retrieval double.
#[derive(Default)]
pub struct ScriptedRetrieval {
    failures: Mutex<VecDeque<EffectError>>,
    results: Mutex<Option<Vec<SearchHit>>>,
    queries: Mutex<Vec<String>>,
}

impl ScriptedRetrieval {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self, error: EffectError) {
        lock(&self.failures).push_back(error);
    }

    /// Return exactly these hits for every query.
    pub fn respond_with(&self, hits: Vec<SearchHit>) {
        *lock(&self.results) = Some(hits);
    }

    #[must_use]
    pub fn queries(&self) -> Vec<String> {
        lock(&self.queries).clone()
    }
}

#[async_trait]
impl RetrievalAdapter for ScriptedRetrieval {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, EffectError> {
        lock(&self.queries).push(query.to_string());
        let failure = lock(&self.failures).pop_front();
        if let Some(error) = failure {
            return Err(error);
        }
        let fixed = lock(&self.results).clone();
        match fixed {
            Some(hits) => Ok(hits),
            None => OfflineRetrieval.search(query, limit).await,
        }
    }
}

/// Captures emitted signals instead of delivering them.
#[derive(Default)]
pub struct RecordingSink {
    emitted: Mutex<Vec<(PhaseSignal, Duration)>>,
    failures: Mutex<VecDeque<EffectError>>,
}

impl RecordingSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self, error: EffectError) {
        lock(&self.failures).push_back(error);
    }

    #[must_use]
    pub fn signals(&self) -> Vec<PhaseSignal> {
        lock(&self.emitted).iter().map(|(s, _)| s.clone()).collect()
    }

    #[must_use]
    pub fn emitted(&self) -> Vec<(PhaseSignal, Duration)> {
        lock(&self.emitted).clone()
    }

    /// Remove and return everything captured so far.
    pub fn take(&self) -> Vec<PhaseSignal> {
        lock(&self.emitted).drain(..).map(|(s, _)| s).collect()
    }
}

#[async_trait]
impl SignalSink for RecordingSink {
    async fn emit(&self, signal: PhaseSignal, delay: Duration) -> Result<(), EffectError> {
        let failure = lock(&self.failures).pop_front();
        if let Some(error) = failure {
            return Err(error);
        }
        lock(&self.emitted).push((signal, delay));
        Ok(())
    }
}

/// Captures notices.
#[derive(Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn notices(&self) -> Vec<Notice> {
        lock(&self.notices).clone()
    }
}

#[async_trait]
impl NotificationAdapter for RecordingNotifier {
    async fn notify(&self, notice: Notice) -> Result<(), EffectError> {
        lock(&self.notices).push(notice);
        Ok(())
    }
}

/// One of each double, sharing handles with the executor they build.
#[derive(Clone)]
pub struct TestAdapters {
    pub inference: Arc<ScriptedInference>,
    pub retrieval: Arc<ScriptedRetrieval>,
    pub persistence: Arc<MemoryPersistence>,
    pub signals: Arc<RecordingSink>,
    pub notifier: Arc<RecordingNotifier>,
    pub observer: Arc<CollectingObserver>,
}

impl Default for TestAdapters {
    fn default() -> Self {
        Self::new()
    }
}

impl TestAdapters {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inference: Arc::new(ScriptedInference::new()),
            retrieval: Arc::new(ScriptedRetrieval::new()),
            persistence: Arc::new(MemoryPersistence::new()),
            signals: Arc::new(RecordingSink::new()),
            notifier: Arc::new(RecordingNotifier::new()),
            observer: Arc::new(CollectingObserver::new()),
        }
    }

    /// Builder with every adapter and the collecting observer bound.
    #[must_use]
    pub fn builder(&self) -> CommandExecutorBuilder {
        CommandExecutor::builder()
            .inference(self.inference.clone())
            .retrieval(self.retrieval.clone())
            .persistence(self.persistence.clone())
            .signals(self.signals.clone())
            .notifications(self.notifier.clone())
            .observer(self.observer.clone())
    }
}
