//! One JSON file per workflow under `<dir>/records/`.
//!
//! Every read-compare-write runs under an exclusive `fd-lock` on
//! `<dir>/locks/<id>.lock`, so several processes can share a store
//! directory. Record files are replaced atomically.

use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use fd_lock::RwLock;
use std::fs::{self, OpenOptions};
use std::io;
use std::sync::Arc;
use tracing::{debug, warn};

use syllabus_utils::atomic_write::write_file_atomic;
use syllabus_utils::clock::{Clock, SystemClock};
use syllabus_utils::error::StoreError;
use syllabus_utils::types::WorkflowId;

use crate::record::PhaseRecord;
use crate::store::{PutOutcome, RecordStore, check_version};

const RECORDS_DIR: &str = "records";
const LOCKS_DIR: &str = "locks";

pub struct FileRecordStore {
    root: Utf8PathBuf,
    clock: Arc<dyn Clock>,
}

impl FileRecordStore {
    /// Open (and create if needed) a store rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the directories cannot be created.
    pub fn open(root: impl Into<Utf8PathBuf>) -> Result<Self, StoreError> {
        Self::open_with_clock(root, Arc::new(SystemClock))
    }

    /// Like [`FileRecordStore::open`] with an explicit clock for expiry checks.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the directories cannot be created.
    pub fn open_with_clock(
        root: impl Into<Utf8PathBuf>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(root.join(RECORDS_DIR))?;
        fs::create_dir_all(root.join(LOCKS_DIR))?;
        debug!(root = %root, "Opened file record store");
        Ok(Self { root, clock })
    }

    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    fn record_path(&self, id: &WorkflowId) -> Utf8PathBuf {
        self.root.join(RECORDS_DIR).join(format!("{id}.json"))
    }

    fn lock_path(&self, id: &WorkflowId) -> Utf8PathBuf {
        self.root.join(LOCKS_DIR).join(format!("{id}.lock"))
    }

    /// Run `f` while holding the exclusive lock for `id`.
    fn with_lock<T>(
        &self,
        id: &WorkflowId,
        f: impl FnOnce() -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let lock_failed = |e: io::Error| StoreError::LockFailed {
            id: id.to_string(),
            reason: e.to_string(),
        };
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.lock_path(id))
            .map_err(lock_failed)?;
        let mut lock = RwLock::new(file);
        let _guard = lock.write().map_err(lock_failed)?;
        f()
    }

    fn read(&self, id: &WorkflowId) -> Result<Option<PhaseRecord>, StoreError> {
        let content = match fs::read_to_string(self.record_path(id)) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| StoreError::Corrupted {
                id: id.to_string(),
                reason: e.to_string(),
            })
    }

    fn write(&self, id: &WorkflowId, record: &PhaseRecord) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(record).map_err(|e| StoreError::Serialization {
            id: id.to_string(),
            reason: e.to_string(),
        })?;
        write_file_atomic(&self.record_path(id), &json)
            .map_err(|e| StoreError::Io(io::Error::other(format!("{e:#}"))))
    }

    fn remove(&self, id: &WorkflowId) -> Result<bool, StoreError> {
        match fs::remove_file(self.record_path(id)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Ids of every record file on disk, expired or not.
    fn stored_ids(&self) -> Result<Vec<WorkflowId>, StoreError> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(self.root.join(RECORDS_DIR))? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match WorkflowId::parse(stem) {
                Ok(id) => ids.push(id),
                Err(e) => {
                    warn!(
                        file = %path.display(),
                        error = %e,
                        "Skipping foreign file in record store"
                    );
                }
            }
        }
        ids.sort();
        Ok(ids)
    }
}

#[async_trait]
impl RecordStore for FileRecordStore {
    async fn get(&self, id: &WorkflowId) -> Result<Option<PhaseRecord>, StoreError> {
        let now = self.clock.now();
        Ok(self.read(id)?.filter(|r| !r.is_expired(now)))
    }

    async fn conditional_put(
        &self,
        id: &WorkflowId,
        expected_version: Option<u64>,
        mut record: PhaseRecord,
    ) -> Result<PutOutcome, StoreError> {
        let now = self.clock.now();
        self.with_lock(id, || {
            let live = self.read(id)?.filter(|r| !r.is_expired(now));
            let version = match check_version(live.as_ref(), expected_version) {
                Ok(version) => version,
                Err(conflict) => {
                    debug!(
                        workflow_id = %id,
                        ?expected_version,
                        ?conflict,
                        "Conditional put rejected"
                    );
                    return Ok(conflict);
                }
            };
            record.version = version;
            self.write(id, &record)?;
            Ok(PutOutcome::Stored { version })
        })
    }

    async fn delete(&self, id: &WorkflowId) -> Result<bool, StoreError> {
        self.with_lock(id, || self.remove(id))
    }

    async fn list(&self) -> Result<Vec<WorkflowId>, StoreError> {
        let now = self.clock.now();
        let mut live = Vec::new();
        for id in self.stored_ids()? {
            match self.read(&id) {
                Ok(Some(record)) if !record.is_expired(now) => live.push(id),
                Ok(_) => {}
                Err(e) => warn!(workflow_id = %id, error = %e, "Skipping unreadable record"),
            }
        }
        Ok(live)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut purged = 0;
        for id in self.stored_ids()? {
            let removed = self.with_lock(&id, || match self.read(&id)? {
                Some(record) if record.is_expired(now) => self.remove(&id),
                _ => Ok(false),
            })?;
            if removed {
                debug!(workflow_id = %id, "Purged expired record");
                purged += 1;
            }
        }
        Ok(purged)
    }
}
