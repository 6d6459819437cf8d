//! Per-command execution records and their collectors.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

use syllabus_logic::CommandKind;
use syllabus_utils::types::{FaultKind, TokenUsage};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failure { kind: FaultKind, message: String },
}

/// One command execution, as seen by the observability middleware.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub kind: CommandKind,
    pub duration_ms: u64,
    pub outcome: Outcome,
    /// Metered usage, for inference commands that succeeded.
    pub usage: Option<TokenUsage>,
}

/// External collector for execution records.
pub trait ExecutionObserver: Send + Sync {
    fn record(&self, record: &ExecutionRecord);
}

/// Emits each record as a structured `tracing` event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl ExecutionObserver for TracingObserver {
    fn record(&self, record: &ExecutionRecord) {
        let (input_tokens, output_tokens) = record
            .usage
            .map_or((0, 0), |u| (u.input_tokens, u.output_tokens));
        match &record.outcome {
            Outcome::Success => info!(
                command = %record.kind,
                duration_ms = record.duration_ms,
                input_tokens,
                output_tokens,
                "Command succeeded"
            ),
            Outcome::Failure { kind, message } => warn!(
                command = %record.kind,
                duration_ms = record.duration_ms,
                fault_kind = %kind,
                error = %message,
                "Command failed"
            ),
        }
    }
}

/// Keeps every record in memory.
#[derive(Debug, Default)]
pub struct CollectingObserver {
    records: Mutex<Vec<ExecutionRecord>>,
}

impl CollectingObserver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn records(&self) -> Vec<ExecutionRecord> {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Sum of metered usage across all records.
    #[must_use]
    pub fn total_usage(&self) -> TokenUsage {
        let mut total = TokenUsage::default();
        for usage in self.records().iter().filter_map(|r| r.usage) {
            total.add(usage);
        }
        total
    }

    #[must_use]
    pub fn failures(&self) -> usize {
        self.records()
            .iter()
            .filter(|r| matches!(r.outcome, Outcome::Failure { .. }))
            .count()
    }
}

impl ExecutionObserver for CollectingObserver {
    fn record(&self, record: &ExecutionRecord) {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(record.clone());
    }
}

/// Forwards every record to each of its observers, in order.
#[derive(Default)]
pub struct FanoutObserver {
    observers: Vec<Arc<dyn ExecutionObserver>>,
}

impl FanoutObserver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, observer: Arc<dyn ExecutionObserver>) -> Self {
        self.observers.push(observer);
        self
    }
}

impl ExecutionObserver for FanoutObserver {
    fn record(&self, record: &ExecutionRecord) {
        for observer in &self.observers {
            observer.record(record);
        }
    }
}
