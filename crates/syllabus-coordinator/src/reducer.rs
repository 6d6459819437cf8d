//! Workflow transitions as a pure reducer.
//!
//! Given the record a phase ran against and the outcome of that run, decide
//! the next record and the commands that follow from it: the next phase's
//! signal, a delayed retry signal, or a lifecycle notification. The
//! coordinator commits the record and executes the commands; nothing here
//! touches the store, the clock or an adapter.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::time::Duration;

use syllabus_config::CoordinatorSettings;
use syllabus_logic::{Artifacts, Command, PhaseSignal, Reducer};
use syllabus_store::PhaseRecord;
use syllabus_utils::types::{Fault, PhaseId, PhaseTag};

use crate::backoff::backoff_delay;

/// Channel used for workflow lifecycle notifications.
pub const WORKFLOW_CHANNEL: &str = "workflow";

/// How one phase run ended, stamped with the time it is applied.
#[derive(Debug, Clone, PartialEq)]
pub enum PhaseOutcome {
    Succeeded {
        phase: PhaseId,
        artifacts: Artifacts,
        at: DateTime<Utc>,
    },
    Failed {
        phase: PhaseId,
        fault: Fault,
        at: DateTime<Utc>,
    },
}

impl PhaseOutcome {
    #[must_use]
    pub const fn phase(&self) -> PhaseId {
        match self {
            Self::Succeeded { phase, .. } | Self::Failed { phase, .. } => *phase,
        }
    }
}

/// Command that emits the signal for `phase` of `record`'s workflow.
#[must_use]
pub fn signal_command(
    record: &PhaseRecord,
    phase: PhaseId,
    attempt: u32,
    delay: Duration,
) -> Command {
    Command::EmitPhaseSignal {
        signal: PhaseSignal::new(record.workflow_id.clone(), phase, attempt, &record.artifacts),
        delay_ms: u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
    }
}

fn notify(message: String) -> Command {
    Command::Notify {
        channel: WORKFLOW_CHANNEL.to_string(),
        message,
    }
}

/// Retry and retention policy applied to phase outcomes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowReducer {
    retry_ceiling: u32,
    backoff_base: Duration,
    backoff_max: Duration,
    retention: ChronoDuration,
}

impl WorkflowReducer {
    #[must_use]
    pub fn new(settings: &CoordinatorSettings) -> Self {
        Self {
            retry_ceiling: settings.retry_ceiling,
            backoff_base: settings.backoff_base(),
            backoff_max: settings.backoff_max(),
            retention: i64::try_from(settings.retention_secs)
                .ok()
                .and_then(ChronoDuration::try_seconds)
                .unwrap_or_else(|| ChronoDuration::days(36_500)),
        }
    }

    /// How long terminal records are kept.
    #[must_use]
    pub const fn retention(&self) -> ChronoDuration {
        self.retention
    }
}

impl Reducer for WorkflowReducer {
    type State = PhaseRecord;
    type Event = PhaseOutcome;
    type Command = Command;

    fn reduce(&self, record: &PhaseRecord, outcome: PhaseOutcome) -> (PhaseRecord, Vec<Command>) {
        // An outcome for a phase the record is not waiting on changes nothing.
        if record.phase != PhaseTag::Active(outcome.phase()) {
            return (record.clone(), Vec::new());
        }

        let mut next = record.clone();
        match outcome {
            PhaseOutcome::Succeeded {
                phase,
                artifacts,
                at,
            } => {
                next.advance(phase, artifacts, at, self.retention);
                let command = match next.phase {
                    PhaseTag::Active(following) => {
                        signal_command(&next, following, 1, Duration::ZERO)
                    }
                    _ => notify(format!(
                        "Workflow {} completed: curriculum for '{}' stored as {}",
                        next.workflow_id,
                        next.request.topic,
                        next.request.curriculum_key()
                    )),
                };
                (next, vec![command])
            }
            PhaseOutcome::Failed { phase, fault, at } => {
                let count = next.note_failure(phase, fault.clone(), at);
                if fault.is_retryable() && count < self.retry_ceiling {
                    let delay = backoff_delay(count, self.backoff_base, self.backoff_max);
                    let command = signal_command(&next, phase, count + 1, delay);
                    (next, vec![command])
                } else {
                    next.fail(fault.clone(), at, self.retention);
                    let message =
                        format!("Workflow {} failed at {phase}: {fault}", next.workflow_id);
                    (next, vec![notify(message)])
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;
    use syllabus_logic::WorkflowRequest;
    use syllabus_utils::types::WorkflowId;

    fn reducer(ceiling: u32) -> WorkflowReducer {
        WorkflowReducer::new(&CoordinatorSettings {
            retry_ceiling: ceiling,
            backoff_base_ms: 100,
            backoff_max_ms: 1_000,
            retention_secs: 60,
            ..CoordinatorSettings::default()
        })
    }

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    fn record_at(phase: PhaseId) -> PhaseRecord {
        let mut record = PhaseRecord::new(
            WorkflowId::parse("w1").unwrap(),
            WorkflowRequest::new("rust", "beginner"),
            at(0),
        );
        record.phase = PhaseTag::Active(phase);
        record.attempts.insert(phase, 0);
        record
    }

    fn succeeded(phase: PhaseId, secs: i64) -> PhaseOutcome {
        let mut artifacts = Artifacts::default();
        artifacts.insert(phase, json!(phase.as_str()));
        PhaseOutcome::Succeeded {
            phase,
            artifacts,
            at: at(secs),
        }
    }

    fn failed(phase: PhaseId, fault: Fault) -> PhaseOutcome {
        PhaseOutcome::Failed {
            phase,
            fault,
            at: at(5),
        }
    }

    #[test]
    fn test_success_advances_and_signals_next_phase() {
        let record = record_at(PhaseId::DraftStructure);
        let (next, commands) = reducer(3).reduce(&record, succeeded(PhaseId::DraftStructure, 1));

        assert_eq!(next.phase, PhaseTag::Active(PhaseId::DraftDetails));
        assert_eq!(next.updated_at, at(1));
        match commands.as_slice() {
            [Command::EmitPhaseSignal { signal, delay_ms }] => {
                assert_eq!(signal.phase, PhaseId::DraftDetails);
                assert_eq!(signal.attempt, 1);
                assert_eq!(*delay_ms, 0);
            }
            other => panic!("unexpected commands {other:?}"),
        }
    }

    #[test]
    fn test_last_phase_completes_and_notifies() {
        let record = record_at(PhaseId::Persist);
        let (next, commands) = reducer(3).reduce(&record, succeeded(PhaseId::Persist, 2));

        assert_eq!(next.phase, PhaseTag::Completed);
        assert_eq!(next.expires_at, Some(at(2) + ChronoDuration::seconds(60)));
        assert!(matches!(
            commands.as_slice(),
            [Command::Notify { channel, message }]
                if channel == WORKFLOW_CHANNEL && message.contains("completed")
        ));
    }

    #[test]
    fn test_transient_failure_below_ceiling_schedules_backoff() {
        let mut record = record_at(PhaseId::Review);
        record.attempts.insert(PhaseId::Review, 1);

        let (next, commands) =
            reducer(3).reduce(&record, failed(PhaseId::Review, Fault::transient("503")));

        assert_eq!(next.phase, PhaseTag::Active(PhaseId::Review));
        assert_eq!(next.attempts_for(PhaseId::Review), 2);
        match commands.as_slice() {
            [Command::EmitPhaseSignal { signal, delay_ms }] => {
                assert_eq!(signal.attempt, 3);
                assert_eq!(*delay_ms, 200);
            }
            other => panic!("unexpected commands {other:?}"),
        }
    }

    #[test]
    fn test_ceiling_or_permanent_fault_fails_workflow() {
        let mut record = record_at(PhaseId::Review);
        record.attempts.insert(PhaseId::Review, 2);
        let (exhausted, commands) =
            reducer(3).reduce(&record, failed(PhaseId::Review, Fault::transient("503")));
        assert_eq!(exhausted.phase, PhaseTag::Failed);
        assert_eq!(exhausted.halted_at, Some(PhaseId::Review));
        assert!(matches!(commands.as_slice(), [Command::Notify { .. }]));

        let fresh = record_at(PhaseId::Review);
        let (rejected, _) =
            reducer(3).reduce(&fresh, failed(PhaseId::Review, Fault::permanent("bad input")));
        assert_eq!(rejected.phase, PhaseTag::Failed);
        assert_eq!(rejected.attempts_for(PhaseId::Review), 1);
    }

    #[test]
    fn test_outcome_for_other_phase_is_ignored() {
        let record = record_at(PhaseId::Review);
        let (next, commands) = reducer(3).reduce(&record, succeeded(PhaseId::ExpandQuery, 1));
        assert_eq!(next, record);
        assert!(commands.is_empty());
    }

    fn arb_outcome() -> impl Strategy<Value = PhaseOutcome> {
        let phase = (0..PhaseId::ALL.len()).prop_map(|i| PhaseId::ALL[i]);
        let fault = prop_oneof![
            ".{0,8}".prop_map(|m| Fault::transient(m)),
            ".{0,8}".prop_map(|m| Fault::permanent(m)),
        ];
        prop_oneof![
            (phase.clone(), 0i64..1_000).prop_map(|(phase, secs)| succeeded(phase, secs)),
            (phase, fault, 0i64..1_000).prop_map(|(phase, fault, secs)| PhaseOutcome::Failed {
                phase,
                fault,
                at: at(secs),
            }),
        ]
    }

    proptest! {
        #[test]
        fn prop_reduce_is_deterministic_and_pure(
            history in proptest::collection::vec(arb_outcome(), 0..12),
            outcome in arb_outcome(),
        ) {
            let reducer = reducer(3);
            let mut record = record_at(PhaseId::ExpandQuery);
            for o in history {
                record = reducer.reduce(&record, o).0;
            }
            let before = record.clone();

            let first = reducer.reduce(&record, outcome.clone());
            let second = reducer.reduce(&record, outcome);

            prop_assert_eq!(&first, &second);
            prop_assert_eq!(&record, &before);
            prop_assert!(record.accepts_successor(&first.0));
        }
    }
}
