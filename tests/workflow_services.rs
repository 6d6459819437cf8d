//! End-to-end workflow runs through `Services` with a file-backed store.

use tempfile::TempDir;

use syllabus::{
    Config, ExitCode, PhaseId, PhaseTag, Services, SyllabusError, WorkflowId, WorkflowRequest,
    open_store,
};
use syllabus_config::{StoreKind, StoreSettings};
use syllabus_logic::plan::CURRICULUM_COLLECTION;
use syllabus_store::AuditAction;

fn file_config(dir: &TempDir) -> Config {
    Config::builder()
        .store_dir(dir.path().join("records"))
        .retry_ceiling(2)
        .build()
        .unwrap()
}

fn request() -> WorkflowRequest {
    WorkflowRequest::new("async rust", "intermediate").with_goal("write a tokio service")
}

#[tokio::test]
async fn test_run_completes_and_persists_curriculum() {
    let dir = TempDir::new().unwrap();
    let mut services = Services::offline(&file_config(&dir)).unwrap();

    let id = services.coordinator.start(request()).await.unwrap();
    let report = services.drain().await;

    assert_eq!(report.delivered, PhaseId::ALL.len());
    assert_eq!(report.completed, 1);
    assert_eq!(report.errors, 0);

    let record = services.coordinator.status(&id).await.unwrap();
    assert_eq!(record.phase, PhaseTag::Completed);
    assert!(record.expires_at.is_some());
    for phase in PhaseId::ALL {
        assert!(record.artifacts.contains(phase), "missing artifact for {phase}");
    }

    let key = request().curriculum_key();
    let document = services.documents.get(CURRICULUM_COLLECTION, &key).unwrap();
    assert_eq!(document["request"]["topic"], "async rust");
    assert!(services.executor.meter().calls() > 0);
    assert_eq!(
        services.observer.failures(),
        0,
        "offline adapters should never fail"
    );
}

#[tokio::test]
async fn test_records_survive_reopen_and_rewind_reruns_later_phases() {
    let dir = TempDir::new().unwrap();
    let config = file_config(&dir);
    let id = WorkflowId::parse("wf-reopen").unwrap();

    {
        let mut services = Services::offline(&config).unwrap();
        services
            .coordinator
            .start_with_id(id.clone(), request())
            .await
            .unwrap();
        services.drain().await;
    }

    let mut services = Services::offline(&config).unwrap();
    assert_eq!(services.coordinator.workflows().await.unwrap(), vec![id.clone()]);
    let before = services.coordinator.status(&id).await.unwrap();
    assert_eq!(before.phase, PhaseTag::Completed);

    let rewound = services
        .coordinator
        .rewind(&id, PhaseId::DraftStructure, "outline too shallow")
        .await
        .unwrap();
    assert_eq!(rewound.phase, PhaseTag::Active(PhaseId::DraftStructure));
    assert!(rewound.artifacts.contains(PhaseId::RetrieveCandidates));
    assert!(!rewound.artifacts.contains(PhaseId::DraftStructure));

    let report = services.drain().await;
    assert_eq!(report.delivered, 4);
    assert_eq!(report.completed, 1);

    let after = services.coordinator.status(&id).await.unwrap();
    assert_eq!(after.phase, PhaseTag::Completed);
    assert!(after.version > before.version);
    assert_eq!(after.audit.len(), 1);
    assert_eq!(after.audit[0].action, AuditAction::Rewind);
    assert_eq!(after.audit[0].from, PhaseTag::Completed);
    assert_eq!(after.audit[0].reason, "outline too shallow");
}

#[tokio::test]
async fn test_duplicate_start_is_rejected_after_reopen() {
    let dir = TempDir::new().unwrap();
    let config = file_config(&dir);
    let id = WorkflowId::parse("wf-dup").unwrap();

    let first = Services::offline(&config).unwrap();
    first
        .coordinator
        .start_with_id(id.clone(), request())
        .await
        .unwrap();

    let second = Services::offline(&config).unwrap();
    let err = second
        .coordinator
        .start_with_id(id, request())
        .await
        .unwrap_err();
    let err = SyllabusError::from(err);
    assert!(err.to_string().contains("already exists"), "{err}");
}

#[tokio::test]
async fn test_operator_errors_map_to_exit_codes() {
    let dir = TempDir::new().unwrap();
    let mut services = Services::offline(&file_config(&dir)).unwrap();

    let missing = WorkflowId::parse("wf-missing").unwrap();
    let err = SyllabusError::from(services.coordinator.status(&missing).await.unwrap_err());
    assert_eq!(err.to_exit_code(), ExitCode::NOT_FOUND);

    let id = services.coordinator.start(request()).await.unwrap();
    services.drain().await;

    let err = SyllabusError::from(services.coordinator.cancel(&id, "too late").await.unwrap_err());
    assert_eq!(err.to_exit_code(), ExitCode::CONFIG);

    let err = services.coordinator.revive(&id, "not failed").await.unwrap_err();
    let err = SyllabusError::from(err);
    assert_eq!(err.to_exit_code(), ExitCode::CONFIG);
}

#[tokio::test]
async fn test_cancel_before_drain_discards_pending_signal() {
    let dir = TempDir::new().unwrap();
    let mut services = Services::offline(&file_config(&dir)).unwrap();

    let id = services.coordinator.start(request()).await.unwrap();
    let cancelled = services.coordinator.cancel(&id, "changed my mind").await.unwrap();
    assert_eq!(cancelled.phase, PhaseTag::Cancelled);
    assert_eq!(cancelled.halted_at, Some(PhaseId::ExpandQuery));

    let report = services.drain().await;
    assert_eq!(report.delivered, 1);
    assert_eq!(report.discarded, 1);
    assert_eq!(services.executor.meter().calls(), 0);
}

#[tokio::test]
async fn test_resume_recovers_workflow_whose_signal_was_lost() {
    let dir = TempDir::new().unwrap();
    let config = file_config(&dir);
    let id = WorkflowId::parse("wf-lost").unwrap();

    {
        // The process exits before its in-memory bus delivers the first signal.
        let services = Services::offline(&config).unwrap();
        services
            .coordinator
            .start_with_id(id.clone(), request())
            .await
            .unwrap();
    }

    let mut services = Services::offline(&config).unwrap();
    assert_eq!(services.drain().await.delivered, 0);
    let waiting = services.coordinator.status(&id).await.unwrap();
    assert_eq!(waiting.phase, PhaseTag::Active(PhaseId::ExpandQuery));
    let err = SyllabusError::WorkflowStalled {
        id: id.to_string(),
        phase: waiting.phase.to_string(),
        errors: 0,
    };
    assert_eq!(err.to_exit_code(), ExitCode::WORKFLOW_FAILED);
    assert!(err.display_for_user().contains("syllabus resume wf-lost"));

    let resumed = services
        .coordinator
        .resume(&id, "process restarted")
        .await
        .unwrap();
    assert_eq!(resumed.audit.last().unwrap().action, AuditAction::Resume);

    let report = services.drain().await;
    assert_eq!(report.delivered, PhaseId::ALL.len());
    assert_eq!(report.completed, 1);
    assert_eq!(report.errors, 0);
    let done = services.coordinator.status(&id).await.unwrap();
    assert_eq!(done.phase, PhaseTag::Completed);
}

#[test]
fn test_file_store_requires_directory() {
    let settings = StoreSettings {
        kind: StoreKind::File,
        dir: None,
    };
    let err = open_store(&settings).err().unwrap();
    assert_eq!(err.to_exit_code(), ExitCode::CONFIG);
    assert!(err.to_string().contains("store.dir"));
}
