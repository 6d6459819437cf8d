#![allow(dead_code)]

use std::sync::Arc;

use syllabus_config::CoordinatorSettings;
use syllabus_coordinator::{Coordinator, SignalDisposition};
use syllabus_executor::CommandExecutorBuilder;
use syllabus_executor::testing::TestAdapters;
use syllabus_logic::WorkflowRequest;
use syllabus_store::MemoryRecordStore;

pub fn settings(ceiling: u32) -> CoordinatorSettings {
    CoordinatorSettings {
        retry_ceiling: ceiling,
        backoff_base_ms: 5,
        backoff_max_ms: 20,
        phase_timeout_secs: 5,
        ..CoordinatorSettings::default()
    }
}

pub fn request() -> WorkflowRequest {
    WorkflowRequest::new("ownership and borrowing", "beginner").with_goal("read lifetimes")
}

pub struct Harness {
    pub adapters: TestAdapters,
    pub store: Arc<MemoryRecordStore>,
    pub coordinator: Arc<Coordinator>,
}

impl Harness {
    pub fn new(ceiling: u32) -> Self {
        Self::with_builder(ceiling, |b| b)
    }

    pub fn with_builder(
        ceiling: u32,
        customize: impl FnOnce(CommandExecutorBuilder) -> CommandExecutorBuilder,
    ) -> Self {
        let adapters = TestAdapters::new();
        let executor = Arc::new(customize(adapters.builder()).build().unwrap());
        let store = Arc::new(MemoryRecordStore::new());
        let coordinator = Arc::new(Coordinator::new(store.clone(), executor, settings(ceiling)));
        Self {
            adapters,
            store,
            coordinator,
        }
    }

    /// Deliver captured signals until none are left.
    pub async fn drive(&self) -> Vec<SignalDisposition> {
        let mut seen = Vec::new();
        loop {
            let signals = self.adapters.signals.take();
            if signals.is_empty() {
                return seen;
            }
            for signal in signals {
                seen.push(self.coordinator.handle_signal(&signal).await.unwrap());
            }
        }
    }
}
