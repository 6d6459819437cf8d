use async_trait::async_trait;
use chrono::{DateTime, Utc};

use syllabus_utils::error::StoreError;
use syllabus_utils::types::WorkflowId;

use crate::record::PhaseRecord;

/// Result of a conditional write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// The write landed; the record now has this version.
    Stored { version: u64 },
    /// The stored version did not match. `current` is `None` when no live
    /// record exists.
    Conflict { current: Option<u64> },
}

impl PutOutcome {
    #[must_use]
    pub const fn is_stored(&self) -> bool {
        matches!(self, Self::Stored { .. })
    }
}

/// Durable storage for phase records.
///
/// Expired records are invisible: `get` reports them as absent and a
/// create-only put may replace them.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get(&self, id: &WorkflowId) -> Result<Option<PhaseRecord>, StoreError>;

    /// Write `record` only if the live version equals `expected_version`.
    ///
    /// `None` means create-only. On success the stored record carries the
    /// new version, whatever `record.version` held.
    async fn conditional_put(
        &self,
        id: &WorkflowId,
        expected_version: Option<u64>,
        record: PhaseRecord,
    ) -> Result<PutOutcome, StoreError>;

    /// Returns whether a record was removed.
    async fn delete(&self, id: &WorkflowId) -> Result<bool, StoreError>;

    /// Ids of all live records, sorted.
    async fn list(&self) -> Result<Vec<WorkflowId>, StoreError>;

    /// Remove every record whose expiry marker is at or before `now`.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, StoreError>;
}

/// Version check shared by the store implementations.
pub(crate) fn check_version(
    live: Option<&PhaseRecord>,
    expected_version: Option<u64>,
) -> Result<u64, PutOutcome> {
    let current = live.map(|r| r.version);
    if current == expected_version {
        Ok(current.map_or(1, |v| v + 1))
    } else {
        Err(PutOutcome::Conflict { current })
    }
}
