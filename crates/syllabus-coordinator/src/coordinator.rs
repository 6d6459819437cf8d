//! Phase coordinator state machine.
//!
//! Every mutation of a [`PhaseRecord`] is a read, a local change, and a
//! conditional write against the version that was read. A writer that loses
//! re-reads and decides again; if the record moved on in the meantime the
//! work is discarded. This is what makes at-least-once, unordered signal
//! delivery safe.

use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{Instrument, info, warn};

use syllabus_config::CoordinatorSettings;
use syllabus_executor::CommandExecutor;
use syllabus_logic::{Command, PhaseSignal, Reducer, WorkflowRequest};
use syllabus_store::{PhaseRecord, PutOutcome, RecordStore};
use syllabus_utils::clock::{Clock, SystemClock};
use syllabus_utils::error::CoordinatorError;
use syllabus_utils::logging::{
    log_phase_complete, log_phase_error, log_phase_start, log_signal_discarded, phase_span,
};
use syllabus_utils::types::{Fault, PhaseId, PhaseTag, WorkflowId};

use crate::handler::{PhaseHandler, PhaseInput, PhaseOutput};
use crate::reducer::{PhaseOutcome, WorkflowReducer, signal_command};

/// Why a signal was dropped without running the phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscardReason {
    UnknownWorkflow,
    /// The record is already terminal.
    Terminal(PhaseTag),
    /// The record is at a different phase (stale, duplicate or early).
    PhaseMismatch { current: PhaseTag },
    /// This attempt was already consumed.
    StaleAttempt { attempt: u32, consumed: u32 },
    /// The record changed while the phase ran (cancelled, rewound, or another
    /// handler won).
    Superseded { current: PhaseTag },
}

impl fmt::Display for DiscardReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownWorkflow => write!(f, "unknown workflow"),
            Self::Terminal(tag) => write!(f, "workflow is {tag}"),
            Self::PhaseMismatch { current } => write!(f, "workflow is at {current}"),
            Self::StaleAttempt { attempt, consumed } => {
                write!(f, "attempt {attempt} already consumed ({consumed} used)")
            }
            Self::Superseded { current } => {
                write!(f, "record changed during the run, now at {current}")
            }
        }
    }
}

/// Result of handling one phase signal.
#[derive(Debug, Clone, PartialEq)]
pub enum SignalDisposition {
    Advanced { next: PhaseId },
    Completed,
    Discarded(DiscardReason),
    RetryScheduled { attempt: u32, delay: Duration },
    Failed(Fault),
}

/// Drives workflows through their phases.
pub struct Coordinator {
    store: Arc<dyn RecordStore>,
    executor: Arc<CommandExecutor>,
    handler: PhaseHandler,
    reducer: WorkflowReducer,
    settings: CoordinatorSettings,
    clock: Arc<dyn Clock>,
}

impl Coordinator {
    #[must_use]
    pub fn new(
        store: Arc<dyn RecordStore>,
        executor: Arc<CommandExecutor>,
        settings: CoordinatorSettings,
    ) -> Self {
        Self {
            handler: PhaseHandler::new(executor.clone()),
            reducer: WorkflowReducer::new(&settings),
            store,
            executor,
            settings,
            clock: Arc::new(SystemClock),
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn settings(&self) -> &CoordinatorSettings {
        &self.settings
    }

    #[must_use]
    pub fn executor(&self) -> &CommandExecutor {
        &self.executor
    }

    /// Create a workflow with a generated id and emit its first signal.
    ///
    /// # Errors
    ///
    /// Store failures, or [`CoordinatorError::SignalFailed`] if the first
    /// signal cannot be emitted.
    pub async fn start(&self, request: WorkflowRequest) -> Result<WorkflowId, CoordinatorError> {
        let id = WorkflowId::generate();
        self.start_with_id(id.clone(), request).await?;
        Ok(id)
    }

    /// Like [`Coordinator::start`] with a caller-chosen id.
    ///
    /// # Errors
    ///
    /// [`CoordinatorError::AlreadyExists`] if a live record has this id.
    pub async fn start_with_id(
        &self,
        id: WorkflowId,
        request: WorkflowRequest,
    ) -> Result<PhaseRecord, CoordinatorError> {
        let record = PhaseRecord::new(id.clone(), request, self.clock.now());
        match self.store.conditional_put(&id, None, record.clone()).await? {
            PutOutcome::Stored { version } => {
                info!(workflow_id = %id, topic = %record.request.topic, "Started workflow");
                let stored = PhaseRecord { version, ..record };
                self.emit_phase(&stored, PhaseId::first(), 1).await?;
                Ok(stored)
            }
            PutOutcome::Conflict { .. } => {
                Err(CoordinatorError::AlreadyExists { id: id.to_string() })
            }
        }
    }

    /// Handle one phase-completion signal.
    ///
    /// Stale, duplicate and superseded signals are discarded without side
    /// effects on the record.
    ///
    /// # Errors
    ///
    /// Store failures, exhausted conflict retries, or a follow-up signal
    /// that could not be emitted after the record was written. The last case
    /// leaves the workflow waiting; [`Coordinator::resume`] re-emits it.
    pub async fn handle_signal(
        &self,
        signal: &PhaseSignal,
    ) -> Result<SignalDisposition, CoordinatorError> {
        let id = &signal.workflow_id;
        let phase = signal.phase;

        let record = match self.store.get(id).await? {
            Some(record) => record,
            None => return Ok(self.discard(signal, DiscardReason::UnknownWorkflow)),
        };
        if let Err(reason) = Self::check_signal(&record, signal) {
            return Ok(self.discard(signal, reason));
        }
        let consumed = record.attempts_for(phase);

        let span = phase_span(id.as_str(), phase.as_str(), signal.attempt);
        let started = Instant::now();
        let result = self
            .run_phase(&record, phase)
            .instrument(span.clone())
            .await;
        let elapsed = started.elapsed().as_millis();

        let at = self.clock.now();
        let outcome = match result {
            Ok(output) => PhaseOutcome::Succeeded {
                phase,
                artifacts: output.artifacts,
                at,
            },
            Err(fault) => PhaseOutcome::Failed { phase, fault, at },
        };

        let committed = self
            .commit(id, record, outcome, consumed)
            .instrument(span)
            .await?;
        let (record, commands) = match committed {
            Ok(committed) => committed,
            Err(reason) => return Ok(self.discard(signal, reason)),
        };

        let disposition = disposition_for(phase, &record, &commands);
        let fault_message = || {
            record
                .last_error
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default()
        };
        match &disposition {
            SignalDisposition::Advanced { next } => {
                log_phase_complete(id.as_str(), phase.as_str(), next.as_str(), elapsed);
            }
            SignalDisposition::Completed => {
                log_phase_complete(id.as_str(), phase.as_str(), "completed", elapsed);
            }
            SignalDisposition::RetryScheduled { attempt, delay } => {
                log_phase_error(id.as_str(), phase.as_str(), &fault_message(), elapsed);
                info!(
                    workflow_id = %id,
                    phase = %phase,
                    attempt = *attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "Scheduling phase retry"
                );
            }
            SignalDisposition::Failed(_) => {
                log_phase_error(id.as_str(), phase.as_str(), &fault_message(), elapsed);
                warn!(
                    workflow_id = %id,
                    phase = %phase,
                    attempts = record.attempts_for(phase),
                    "Workflow failed"
                );
            }
            SignalDisposition::Discarded(_) => {}
        }

        self.execute(&record, &commands).await?;
        Ok(disposition)
    }

    /// Flip a non-terminal workflow to `cancelled`.
    ///
    /// In-flight handlers lose their conditional write and discard.
    ///
    /// # Errors
    ///
    /// [`CoordinatorError::NotFound`], or
    /// [`CoordinatorError::InvalidTransition`] if the workflow is terminal.
    pub async fn cancel(
        &self,
        id: &WorkflowId,
        reason: &str,
    ) -> Result<PhaseRecord, CoordinatorError> {
        let retention = self.reducer.retention();
        let record = self
            .revise(id, |record, now| {
                if record.is_terminal() {
                    return Err(invalid(id, record.phase, PhaseTag::Cancelled));
                }
                record.cancel(reason, now, retention);
                Ok(())
            })
            .await?;
        info!(workflow_id = %id, reason = %reason, "Cancelled workflow");
        Ok(record)
    }

    /// Return a failed workflow to the phase that failed, with a fresh
    /// attempt budget, and emit its signal.
    ///
    /// # Errors
    ///
    /// [`CoordinatorError::NotAllowed`] unless the workflow is `failed`.
    pub async fn revive(
        &self,
        id: &WorkflowId,
        reason: &str,
    ) -> Result<PhaseRecord, CoordinatorError> {
        let record = self
            .revise(id, |record, now| match (record.phase, record.halted_at) {
                (PhaseTag::Failed, Some(phase)) => {
                    record.revive(phase, reason, now);
                    Ok(())
                }
                (current, _) => Err(not_allowed(id, "revive", current)),
            })
            .await?;
        let phase = record
            .phase
            .phase()
            .ok_or_else(|| not_allowed(id, "revive", record.phase))?;
        info!(workflow_id = %id, phase = %phase, reason = %reason, "Revived workflow");
        self.emit_phase(&record, phase, 1).await?;
        Ok(record)
    }

    /// Move a workflow back to `to`, dropping artifacts from that phase on,
    /// and emit its signal.
    ///
    /// Allowed from any active phase after `to`, from `completed`, and from
    /// `failed` when `to` is at or before the phase that failed.
    ///
    /// # Errors
    ///
    /// [`CoordinatorError::InvalidTransition`] for cancelled workflows and
    /// forward moves.
    pub async fn rewind(
        &self,
        id: &WorkflowId,
        to: PhaseId,
        reason: &str,
    ) -> Result<PhaseRecord, CoordinatorError> {
        let record = self
            .revise(id, |record, now| {
                let allowed = match record.phase {
                    PhaseTag::Active(current) => to.index() < current.index(),
                    PhaseTag::Completed => true,
                    PhaseTag::Failed => record
                        .halted_at
                        .is_some_and(|halted| to.index() <= halted.index()),
                    PhaseTag::Cancelled => false,
                };
                if !allowed {
                    return Err(invalid(id, record.phase, PhaseTag::Active(to)));
                }
                record.rewind(to, reason, now);
                Ok(())
            })
            .await?;
        info!(workflow_id = %id, to = %to, reason = %reason, "Rewound workflow");
        self.emit_phase(&record, to, 1).await?;
        Ok(record)
    }

    /// Re-emit the signal an active workflow is waiting on.
    ///
    /// Recovers a workflow whose next signal was lost after its record was
    /// written. The signal carries the next unconsumed attempt of the current
    /// phase, so if the lost signal does turn up, whichever of the two runs
    /// second is discarded.
    ///
    /// # Errors
    ///
    /// [`CoordinatorError::NotAllowed`] unless the workflow is active, or
    /// [`CoordinatorError::SignalFailed`] if the signal still cannot be
    /// emitted.
    pub async fn resume(
        &self,
        id: &WorkflowId,
        reason: &str,
    ) -> Result<PhaseRecord, CoordinatorError> {
        let record = self
            .revise(id, |record, now| {
                if record.phase.phase().is_none() {
                    return Err(not_allowed(id, "resume", record.phase));
                }
                record.resume(reason, now);
                Ok(())
            })
            .await?;
        let phase = record
            .phase
            .phase()
            .ok_or_else(|| not_allowed(id, "resume", record.phase))?;
        let attempt = record.attempts_for(phase) + 1;
        info!(workflow_id = %id, phase = %phase, attempt, reason = %reason, "Resumed workflow");
        self.emit_phase(&record, phase, attempt).await?;
        Ok(record)
    }

    /// Read-only snapshot of a workflow.
    ///
    /// # Errors
    ///
    /// [`CoordinatorError::NotFound`] for unknown or expired workflows.
    pub async fn status(&self, id: &WorkflowId) -> Result<PhaseRecord, CoordinatorError> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| CoordinatorError::NotFound { id: id.to_string() })
    }

    /// Ids of all live workflows.
    ///
    /// # Errors
    ///
    /// Store failures.
    pub async fn workflows(&self) -> Result<Vec<WorkflowId>, CoordinatorError> {
        Ok(self.store.list().await?)
    }

    /// Delete records past their retention window.
    ///
    /// # Errors
    ///
    /// Store failures.
    pub async fn purge_expired(&self) -> Result<usize, CoordinatorError> {
        let purged = self.store.purge_expired(self.clock.now()).await?;
        if purged > 0 {
            info!(purged, "Purged expired workflow records");
        }
        Ok(purged)
    }

    fn check_signal(record: &PhaseRecord, signal: &PhaseSignal) -> Result<(), DiscardReason> {
        match record.phase {
            tag if tag.is_terminal() => Err(DiscardReason::Terminal(tag)),
            PhaseTag::Active(current) if current != signal.phase => {
                Err(DiscardReason::PhaseMismatch { current: record.phase })
            }
            _ => {
                let consumed = record.attempts_for(signal.phase);
                if signal.attempt <= consumed {
                    Err(DiscardReason::StaleAttempt {
                        attempt: signal.attempt,
                        consumed,
                    })
                } else {
                    Ok(())
                }
            }
        }
    }

    fn discard(&self, signal: &PhaseSignal, reason: DiscardReason) -> SignalDisposition {
        log_signal_discarded(
            signal.workflow_id.as_str(),
            signal.phase.as_str(),
            &reason.to_string(),
        );
        SignalDisposition::Discarded(reason)
    }

    async fn run_phase(&self, record: &PhaseRecord, phase: PhaseId) -> Result<PhaseOutput, Fault> {
        log_phase_start(
            record.workflow_id.as_str(),
            phase.as_str(),
            record.attempts_for(phase) + 1,
        );
        let input = PhaseInput {
            phase,
            request: record.request.clone(),
            artifacts: record.artifacts.clone(),
        };
        let timeout = self.settings.phase_timeout();
        match tokio::time::timeout(timeout, self.handler.run(input)).await {
            Ok(Ok(output)) => {
                info!(
                    phase = %phase,
                    calls = output.metrics.calls,
                    input_tokens = output.metrics.usage.input_tokens,
                    output_tokens = output.metrics.usage.output_tokens,
                    duration_ms = output.metrics.duration_ms,
                    "Phase usage"
                );
                Ok(output)
            }
            Ok(Err((fault, _metrics))) => Err(fault),
            Err(_) => Err(Fault::transient(format!(
                "phase timed out after {}s",
                timeout.as_secs()
            ))
            .with_origin(phase.as_str())),
        }
    }

    /// Reduce the outcome of a phase run and write the result, re-reading
    /// after each lost race.
    ///
    /// The outer result carries store errors; the inner one is the discard
    /// reason when the record moved on while the phase ran.
    async fn commit(
        &self,
        id: &WorkflowId,
        mut record: PhaseRecord,
        outcome: PhaseOutcome,
        consumed: u32,
    ) -> Result<Result<(PhaseRecord, Vec<Command>), DiscardReason>, CoordinatorError> {
        let phase = outcome.phase();
        for _ in 0..=self.settings.conflict_retries {
            let (next, commands) = self.reducer.reduce(&record, outcome.clone());
            ensure_successor(id, &record, &next)?;
            match self
                .store
                .conditional_put(id, Some(record.version), next.clone())
                .await?
            {
                PutOutcome::Stored { version } => {
                    return Ok(Ok((PhaseRecord { version, ..next }, commands)));
                }
                PutOutcome::Conflict { current } => {
                    warn!(
                        workflow_id = %id,
                        expected = record.version,
                        ?current,
                        "Lost record write race"
                    );
                }
            }

            record = match self.store.get(id).await? {
                Some(fresh) => fresh,
                None => return Ok(Err(DiscardReason::UnknownWorkflow)),
            };
            let unchanged = record.phase == PhaseTag::Active(phase)
                && record.attempts_for(phase) == consumed;
            if !unchanged {
                return Ok(Err(DiscardReason::Superseded {
                    current: record.phase,
                }));
            }
        }
        Err(CoordinatorError::ConflictRetriesExhausted {
            id: id.to_string(),
            attempts: self.settings.conflict_retries + 1,
        })
    }

    /// Read-modify-write for operator actions.
    async fn revise(
        &self,
        id: &WorkflowId,
        change: impl Fn(&mut PhaseRecord, DateTime<Utc>) -> Result<(), CoordinatorError>
        + Send
        + Sync,
    ) -> Result<PhaseRecord, CoordinatorError> {
        for _ in 0..=self.settings.conflict_retries {
            let current = self.status(id).await?;
            let mut record = current.clone();
            change(&mut record, self.clock.now())?;
            ensure_successor(id, &current, &record)?;
            match self
                .store
                .conditional_put(id, Some(current.version), record.clone())
                .await?
            {
                PutOutcome::Stored { version } => return Ok(PhaseRecord { version, ..record }),
                PutOutcome::Conflict { current: found } => {
                    warn!(
                        workflow_id = %id,
                        expected = current.version,
                        current = ?found,
                        "Lost record write race"
                    );
                }
            }
        }
        Err(CoordinatorError::ConflictRetriesExhausted {
            id: id.to_string(),
            attempts: self.settings.conflict_retries + 1,
        })
    }

    async fn emit_phase(
        &self,
        record: &PhaseRecord,
        phase: PhaseId,
        attempt: u32,
    ) -> Result<(), CoordinatorError> {
        let command = signal_command(record, phase, attempt, Duration::ZERO);
        self.execute(record, std::slice::from_ref(&command)).await
    }

    /// Run the commands a committed transition produced.
    ///
    /// Signals must go out; notifications are best effort.
    async fn execute(
        &self,
        record: &PhaseRecord,
        commands: &[Command],
    ) -> Result<(), CoordinatorError> {
        let id = &record.workflow_id;
        for command in commands {
            let Err(fault) = self.executor.run(command).await else {
                continue;
            };
            if let Command::EmitPhaseSignal { signal, .. } = command {
                warn!(
                    workflow_id = %id,
                    phase = %signal.phase,
                    attempt = signal.attempt,
                    fault = %fault,
                    "Signal emission failed; run resume to re-emit it"
                );
                return Err(CoordinatorError::SignalFailed {
                    id: id.to_string(),
                    reason: fault.to_string(),
                });
            }
            warn!(workflow_id = %id, fault = %fault, "Workflow notification failed");
        }
        Ok(())
    }
}

/// What a committed record means for the signal that produced it.
fn disposition_for(
    phase: PhaseId,
    record: &PhaseRecord,
    commands: &[Command],
) -> SignalDisposition {
    match record.phase {
        PhaseTag::Active(current) if current == phase => commands
            .iter()
            .find_map(|command| match command {
                Command::EmitPhaseSignal { signal, delay_ms } => {
                    Some(SignalDisposition::RetryScheduled {
                        attempt: signal.attempt,
                        delay: Duration::from_millis(*delay_ms),
                    })
                }
                _ => None,
            })
            .unwrap_or(SignalDisposition::Discarded(DiscardReason::Superseded {
                current: record.phase,
            })),
        PhaseTag::Active(next) => SignalDisposition::Advanced { next },
        PhaseTag::Completed => SignalDisposition::Completed,
        PhaseTag::Failed => SignalDisposition::Failed(
            record
                .last_error
                .clone()
                .unwrap_or_else(|| Fault::internal("no fault recorded")),
        ),
        PhaseTag::Cancelled => SignalDisposition::Discarded(DiscardReason::Superseded {
            current: record.phase,
        }),
    }
}

/// Phase tags only move forward outside the audited operator paths.
fn ensure_successor(
    id: &WorkflowId,
    current: &PhaseRecord,
    next: &PhaseRecord,
) -> Result<(), CoordinatorError> {
    if current.accepts_successor(next) {
        Ok(())
    } else {
        Err(invalid(id, current.phase, next.phase))
    }
}

fn invalid(id: &WorkflowId, from: PhaseTag, to: PhaseTag) -> CoordinatorError {
    CoordinatorError::InvalidTransition {
        id: id.to_string(),
        from: from.to_string(),
        to: to.to_string(),
    }
}

fn not_allowed(id: &WorkflowId, action: &'static str, phase: PhaseTag) -> CoordinatorError {
    CoordinatorError::NotAllowed {
        id: id.to_string(),
        action,
        phase: phase.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_at(phase: PhaseId) -> PhaseRecord {
        let mut record = PhaseRecord::new(
            WorkflowId::parse("w1").unwrap(),
            WorkflowRequest::new("rust", "beginner"),
            Utc::now(),
        );
        record.phase = PhaseTag::Active(phase);
        record
    }

    #[test]
    fn test_unaudited_regression_is_rejected() {
        let current = record_at(PhaseId::Review);
        let mut regressed = current.clone();
        regressed.phase = PhaseTag::Active(PhaseId::DraftStructure);

        let err = ensure_successor(&current.workflow_id, &current, &regressed).unwrap_err();
        assert!(matches!(
            err,
            CoordinatorError::InvalidTransition { ref from, ref to, .. }
                if from == "review" && to == "draft_structure"
        ));

        let mut completed = current.clone();
        completed.phase = PhaseTag::Completed;
        assert!(ensure_successor(&current.workflow_id, &completed, &current).is_err());
    }

    #[test]
    fn test_audited_rewind_and_forward_moves_pass() {
        let current = record_at(PhaseId::Review);
        let mut rewound = current.clone();
        rewound.rewind(PhaseId::DraftStructure, "outline too thin", Utc::now());
        assert!(ensure_successor(&current.workflow_id, &current, &rewound).is_ok());

        let mut failed = current.clone();
        failed.fail(Fault::permanent("bad"), Utc::now(), chrono::Duration::hours(1));
        assert!(ensure_successor(&current.workflow_id, &current, &failed).is_ok());
    }

    #[test]
    fn test_disposition_reads_retry_from_signal_command() {
        let record = record_at(PhaseId::Review);
        let retry = signal_command(&record, PhaseId::Review, 3, Duration::from_millis(40));
        let commands = vec![retry];

        assert_eq!(
            disposition_for(PhaseId::Review, &record, &commands),
            SignalDisposition::RetryScheduled {
                attempt: 3,
                delay: Duration::from_millis(40)
            }
        );
        assert_eq!(
            disposition_for(PhaseId::DraftStructure, &record, &[]),
            SignalDisposition::Advanced {
                next: PhaseId::Review
            }
        );
    }
}
