//! Workflow commands: `run`, `status`, `cancel`, `revive`, `resume`, `rewind`, `purge`.

use anyhow::{Context, Result};

use syllabus_coordinator::DrainReport;
use syllabus_logic::WorkflowRequest;
use syllabus_store::PhaseRecord;
use syllabus_utils::types::{Fault, PhaseId, PhaseTag, WorkflowId};

use crate::services::Services;
use crate::{Config, SyllabusError};

fn parse_id(raw: &str) -> Result<WorkflowId> {
    Ok(WorkflowId::parse(raw).map_err(SyllabusError::from)?)
}

/// Start a workflow and drive it until the signal bus is idle.
pub async fn execute_run_command(
    request: WorkflowRequest,
    id: Option<&str>,
    json: bool,
    config: &Config,
) -> Result<()> {
    let mut services = Services::offline(config)?;
    let id = match id {
        Some(raw) => parse_id(raw)?,
        None => WorkflowId::generate(),
    };

    services
        .coordinator
        .start_with_id(id.clone(), request)
        .await
        .map_err(SyllabusError::from)?;
    let report = services.drain().await;

    finish(&services, &id, json, &report).await
}

/// Show one workflow, or list every live workflow.
pub async fn execute_status_command(id: Option<&str>, json: bool, config: &Config) -> Result<()> {
    let services = Services::offline(config)?;

    let Some(raw) = id else {
        let ids = services
            .coordinator
            .workflows()
            .await
            .map_err(SyllabusError::from)?;
        let mut records = Vec::with_capacity(ids.len());
        for id in &ids {
            // A record can expire between list and get.
            if let Ok(record) = services.coordinator.status(id).await {
                records.push(record);
            }
        }

        if json {
            let rows: Vec<_> = records
                .iter()
                .map(|r| {
                    serde_json::json!({
                        "workflow_id": r.workflow_id,
                        "phase": r.phase,
                        "topic": r.request.topic,
                        "updated_at": r.updated_at,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&rows)?);
        } else if records.is_empty() {
            println!("No workflows found ({} store)", config.store.kind);
        } else {
            for r in &records {
                println!("{:<40} {:<20} {}", r.workflow_id, r.phase, r.request.topic);
            }
        }
        return Ok(());
    };

    let id = parse_id(raw)?;
    let record = services
        .coordinator
        .status(&id)
        .await
        .map_err(SyllabusError::from)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&record)?);
    } else {
        print_record(&record);
    }
    Ok(())
}

pub async fn execute_cancel_command(id: &str, reason: &str, config: &Config) -> Result<()> {
    let services = Services::offline(config)?;
    let id = parse_id(id)?;
    let record = services
        .coordinator
        .cancel(&id, reason)
        .await
        .map_err(SyllabusError::from)?;
    println!(
        "✓ Cancelled {} at {}",
        record.workflow_id,
        record.halted_at.map_or("-", |p| p.as_str())
    );
    Ok(())
}

/// Revive a failed workflow and drive it again.
pub async fn execute_revive_command(id: &str, reason: &str, config: &Config) -> Result<()> {
    let mut services = Services::offline(config)?;
    let id = parse_id(id)?;
    let record = services
        .coordinator
        .revive(&id, reason)
        .await
        .map_err(SyllabusError::from)?;
    println!("↻ Revived {} at {}", id, record.phase);

    let report = services.drain().await;
    finish(&services, &id, false, &report).await
}

/// Re-emit the pending signal of a stalled workflow and drive it again.
pub async fn execute_resume_command(id: &str, reason: &str, config: &Config) -> Result<()> {
    let mut services = Services::offline(config)?;
    let id = parse_id(id)?;
    let record = services
        .coordinator
        .resume(&id, reason)
        .await
        .map_err(SyllabusError::from)?;
    println!("▶ Resumed {} at {}", id, record.phase);

    let report = services.drain().await;
    finish(&services, &id, false, &report).await
}

/// Rewind a workflow to `to` and drive it again from there.
pub async fn execute_rewind_command(
    id: &str,
    to: PhaseId,
    reason: &str,
    config: &Config,
) -> Result<()> {
    let mut services = Services::offline(config)?;
    let id = parse_id(id)?;
    services
        .coordinator
        .rewind(&id, to, reason)
        .await
        .map_err(SyllabusError::from)?;
    println!("↺ Rewound {id} to {to}");

    let report = services.drain().await;
    finish(&services, &id, false, &report).await
}

pub async fn execute_purge_command(config: &Config) -> Result<()> {
    let services = Services::offline(config)?;
    let purged = services
        .coordinator
        .purge_expired()
        .await
        .map_err(SyllabusError::from)?;
    println!("Purged {purged} expired workflow record(s)");
    Ok(())
}

/// Report the final state. A failed workflow, one still waiting on a phase
/// after the drain, or a drain with unhandled signals is an error.
async fn finish(
    services: &Services,
    id: &WorkflowId,
    json: bool,
    report: &DrainReport,
) -> Result<()> {
    let record = services
        .coordinator
        .status(id)
        .await
        .map_err(SyllabusError::from)
        .with_context(|| format!("Failed to read workflow {id} after the run"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&record)?);
    } else {
        print_record(&record);
        let usage = services.observer.total_usage();
        println!(
            "  Signals: {} delivered, {} discarded, {} retries",
            report.delivered, report.discarded, report.retries
        );
        println!(
            "  Inference: {} calls, {} tokens",
            services.executor.meter().calls(),
            usage.total()
        );
    }

    if report.errors > 0 {
        tracing::warn!(errors = report.errors, "Some signals could not be handled");
    }

    match record.phase {
        PhaseTag::Failed => Err(SyllabusError::WorkflowFailed {
            id: id.to_string(),
            fault: record
                .last_error
                .clone()
                .unwrap_or_else(|| Fault::internal("no fault recorded")),
        }
        .into()),
        PhaseTag::Active(_) => Err(stalled(id, &record, report).into()),
        _ if report.errors > 0 => Err(stalled(id, &record, report).into()),
        _ => Ok(()),
    }
}

fn stalled(id: &WorkflowId, record: &PhaseRecord, report: &DrainReport) -> SyllabusError {
    SyllabusError::WorkflowStalled {
        id: id.to_string(),
        phase: record.phase.to_string(),
        errors: report.errors,
    }
}

fn print_record(record: &PhaseRecord) {
    let marker = match record.phase {
        PhaseTag::Completed => "✓",
        PhaseTag::Failed => "✗",
        PhaseTag::Cancelled => "⊘",
        PhaseTag::Active(_) => "…",
    };
    println!("{marker} Workflow {}: {}", record.workflow_id, record.phase);
    println!(
        "  Topic: {} ({})",
        record.request.topic, record.request.learner_level
    );

    for phase in PhaseId::ALL {
        let done = record.artifacts.contains(phase);
        let attempts = record.attempts_for(phase);
        let state = if done {
            "done"
        } else if record.halted_at == Some(phase) {
            "halted"
        } else if record.phase == PhaseTag::Active(phase) {
            "pending"
        } else {
            "-"
        };
        println!("    {:<20} {:<8} failures: {attempts}", phase.as_str(), state);
    }

    if let Some(fault) = &record.last_error {
        println!("  Last error: {fault}");
    }
    if let Some(document) = record.artifacts.get(PhaseId::Persist) {
        if let (Some(collection), Some(key)) = (
            document.get("collection").and_then(|v| v.as_str()),
            document.get("key").and_then(|v| v.as_str()),
        ) {
            println!("  Document: {collection}/{key}");
        }
    }
    for entry in &record.audit {
        println!(
            "  {} {} {} → {}: {}",
            entry.at.format("%Y-%m-%d %H:%M:%S"),
            entry.action.as_str(),
            entry.from,
            entry.to,
            entry.reason
        );
    }
}
