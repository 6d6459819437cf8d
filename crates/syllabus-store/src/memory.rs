use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

use syllabus_utils::clock::{Clock, SystemClock};
use syllabus_utils::error::StoreError;
use syllabus_utils::types::WorkflowId;

use crate::record::PhaseRecord;
use crate::store::{PutOutcome, RecordStore, check_version};

/// Process-local store backed by a mutex-guarded map.
pub struct MemoryRecordStore {
    records: Mutex<BTreeMap<WorkflowId, PhaseRecord>>,
    clock: Arc<dyn Clock>,
}

impl Default for MemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRecordStore {
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            records: Mutex::new(BTreeMap::new()),
            clock,
        }
    }

    fn records(&self) -> MutexGuard<'_, BTreeMap<WorkflowId, PhaseRecord>> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn get(&self, id: &WorkflowId) -> Result<Option<PhaseRecord>, StoreError> {
        let now = self.clock.now();
        Ok(self.records().get(id).filter(|r| !r.is_expired(now)).cloned())
    }

    async fn conditional_put(
        &self,
        id: &WorkflowId,
        expected_version: Option<u64>,
        mut record: PhaseRecord,
    ) -> Result<PutOutcome, StoreError> {
        let now = self.clock.now();
        let mut records = self.records();
        let live = records.get(id).filter(|r| !r.is_expired(now));
        let version = match check_version(live, expected_version) {
            Ok(version) => version,
            Err(conflict) => {
                debug!(workflow_id = %id, ?expected_version, ?conflict, "Conditional put rejected");
                return Ok(conflict);
            }
        };
        record.version = version;
        records.insert(id.clone(), record);
        Ok(PutOutcome::Stored { version })
    }

    async fn delete(&self, id: &WorkflowId) -> Result<bool, StoreError> {
        Ok(self.records().remove(id).is_some())
    }

    async fn list(&self) -> Result<Vec<WorkflowId>, StoreError> {
        let now = self.clock.now();
        Ok(self
            .records()
            .values()
            .filter(|r| !r.is_expired(now))
            .map(|r| r.workflow_id.clone())
            .collect())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut records = self.records();
        let before = records.len();
        records.retain(|_, r| !r.is_expired(now));
        Ok(before - records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use syllabus_logic::WorkflowRequest;
    use syllabus_utils::clock::FixedClock;
    use syllabus_utils::types::{PhaseId, PhaseTag};

    fn id(raw: &str) -> WorkflowId {
        WorkflowId::parse(raw).unwrap()
    }

    fn record(raw: &str) -> PhaseRecord {
        PhaseRecord::new(id(raw), WorkflowRequest::new("rust", "beginner"), Utc::now())
    }

    #[tokio::test]
    async fn test_create_only_put() {
        let store = MemoryRecordStore::new();
        let w = id("w1");

        let first = store.conditional_put(&w, None, record("w1")).await.unwrap();
        assert_eq!(first, PutOutcome::Stored { version: 1 });

        let second = store.conditional_put(&w, None, record("w1")).await.unwrap();
        assert_eq!(second, PutOutcome::Conflict { current: Some(1) });
    }

    #[tokio::test]
    async fn test_stale_writer_loses() {
        let store = MemoryRecordStore::new();
        let w = id("w1");
        store.conditional_put(&w, None, record("w1")).await.unwrap();

        let a = store.get(&w).await.unwrap().unwrap();
        let mut b = a.clone();

        let mut advanced = a.clone();
        advanced.phase = PhaseTag::Active(PhaseId::RetrieveCandidates);
        let won = store
            .conditional_put(&w, Some(a.version), advanced)
            .await
            .unwrap();
        assert_eq!(won, PutOutcome::Stored { version: 2 });

        b.phase = PhaseTag::Cancelled;
        let lost = store.conditional_put(&w, Some(b.version), b).await.unwrap();
        assert_eq!(lost, PutOutcome::Conflict { current: Some(2) });

        let stored = store.get(&w).await.unwrap().unwrap();
        assert_eq!(stored.phase, PhaseTag::Active(PhaseId::RetrieveCandidates));
        assert_eq!(stored.version, 2);
    }

    #[tokio::test]
    async fn test_update_of_missing_record_conflicts() {
        let store = MemoryRecordStore::new();
        let outcome = store
            .conditional_put(&id("ghost"), Some(3), record("ghost"))
            .await
            .unwrap();
        assert_eq!(outcome, PutOutcome::Conflict { current: None });
    }

    #[tokio::test]
    async fn test_expired_records_are_invisible_and_purged() {
        let start = Utc::now();
        let clock = Arc::new(FixedClock::new(start));
        let store = MemoryRecordStore::with_clock(clock.clone());

        let mut done = record("done");
        done.expires_at = Some(start + Duration::seconds(10));
        store.conditional_put(&id("done"), None, done).await.unwrap();
        store
            .conditional_put(&id("live"), None, record("live"))
            .await
            .unwrap();

        assert!(store.get(&id("done")).await.unwrap().is_some());
        clock.advance(Duration::seconds(10));
        assert!(store.get(&id("done")).await.unwrap().is_none());
        assert_eq!(store.list().await.unwrap(), vec![id("live")]);

        // The slot can be reused by a new workflow with the same id.
        let reused = store
            .conditional_put(&id("done"), None, record("done"))
            .await
            .unwrap();
        assert_eq!(reused, PutOutcome::Stored { version: 1 });

        let mut old = record("old");
        old.expires_at = Some(start);
        let stored = store.conditional_put(&id("old"), None, old).await.unwrap();
        assert!(stored.is_stored());
        assert_eq!(store.purge_expired(clock.now()).await.unwrap(), 1);
        assert!(store.delete(&id("live")).await.unwrap());
        assert!(!store.delete(&id("live")).await.unwrap());
    }
}
