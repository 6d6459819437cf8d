//! At most one writer wins a race on the same version.

use camino::Utf8PathBuf;
use chrono::Utc;
use std::sync::Arc;

use syllabus_logic::WorkflowRequest;
use syllabus_store::{FileRecordStore, MemoryRecordStore, PhaseRecord, PutOutcome, RecordStore};
use syllabus_utils::types::{PhaseId, PhaseTag, WorkflowId};

async fn race(store: Arc<dyn RecordStore>) {
    let id = WorkflowId::parse("raced").unwrap();
    let seed = PhaseRecord::new(id.clone(), WorkflowRequest::new("rust", "beginner"), Utc::now());
    store.conditional_put(&id, None, seed).await.unwrap();
    let base = store.get(&id).await.unwrap().unwrap();

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let store = store.clone();
        let id = id.clone();
        let mut next = base.clone();
        next.phase = PhaseTag::Active(PhaseId::RetrieveCandidates);
        tasks.push(tokio::spawn(async move {
            store.conditional_put(&id, Some(next.version), next).await.unwrap()
        }));
    }

    let mut stored = 0;
    for task in tasks {
        match task.await.unwrap() {
            PutOutcome::Stored { version } => {
                assert_eq!(version, 2);
                stored += 1;
            }
            PutOutcome::Conflict { current } => assert_eq!(current, Some(2)),
        }
    }
    assert_eq!(stored, 1);
    assert_eq!(store.get(&id).await.unwrap().unwrap().version, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn memory_store_admits_one_writer() {
    race(Arc::new(MemoryRecordStore::new())).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn file_store_admits_one_writer() {
    let dir = tempfile::TempDir::new().unwrap();
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
    race(Arc::new(FileRecordStore::open(root).unwrap())).await;
}
