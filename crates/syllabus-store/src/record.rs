use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use syllabus_logic::{Artifacts, WorkflowRequest};
use syllabus_utils::types::{Fault, PhaseId, PhaseTag, WorkflowId};

/// Kind of manual intervention recorded in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Cancel,
    Revive,
    Rewind,
    Resume,
}

impl AuditAction {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Cancel => "cancel",
            Self::Revive => "revive",
            Self::Rewind => "rewind",
            Self::Resume => "resume",
        }
    }
}

/// One entry of a record's revision/retry/cancel trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub at: DateTime<Utc>,
    pub action: AuditAction,
    pub from: PhaseTag,
    pub to: PhaseTag,
    pub reason: String,
    /// Fault that was on the record when the action was taken.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fault: Option<Fault>,
}

/// Durable state of one workflow instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseRecord {
    pub workflow_id: WorkflowId,
    pub request: WorkflowRequest,
    pub phase: PhaseTag,
    #[serde(default)]
    pub artifacts: Artifacts,
    #[serde(default)]
    pub attempts: BTreeMap<PhaseId, u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<Fault>,
    /// Active phase at the moment the record went `failed` or `cancelled`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub halted_at: Option<PhaseId>,
    /// Bumped by the store on every successful write.
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub audit: Vec<AuditEntry>,
}

impl PhaseRecord {
    /// A fresh record positioned at the first phase with no attempts.
    #[must_use]
    pub fn new(workflow_id: WorkflowId, request: WorkflowRequest, now: DateTime<Utc>) -> Self {
        let first = PhaseId::first();
        Self {
            workflow_id,
            request,
            phase: PhaseTag::Active(first),
            artifacts: Artifacts::default(),
            attempts: BTreeMap::from([(first, 0)]),
            last_error: None,
            halted_at: None,
            version: 0,
            created_at: now,
            updated_at: now,
            expires_at: None,
            audit: Vec::new(),
        }
    }

    #[must_use]
    pub fn attempts_for(&self, phase: PhaseId) -> u32 {
        self.attempts.get(&phase).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }

    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    /// Whether `next` may replace this record.
    ///
    /// The phase tag stays put (a retry) or moves forward. Moving anywhere
    /// else requires `next` to carry a new audit entry.
    #[must_use]
    pub fn accepts_successor(&self, next: &PhaseRecord) -> bool {
        self.phase == next.phase
            || self.phase.is_forward_move(next.phase)
            || next.audit.len() > self.audit.len()
    }

    /// Record the result of a successful phase and move to the next tag.
    ///
    /// The next phase starts with an attempt counter of zero. Reaching
    /// `completed` sets the expiry marker.
    pub fn advance(
        &mut self,
        completed: PhaseId,
        artifacts: Artifacts,
        now: DateTime<Utc>,
        retention: Duration,
    ) {
        self.artifacts = artifacts;
        self.phase = PhaseTag::after(completed);
        self.last_error = None;
        match self.phase {
            PhaseTag::Active(next) => {
                self.attempts.insert(next, 0);
            }
            _ => self.expires_at = Some(now + retention),
        }
        self.updated_at = now;
    }

    /// Count a failed attempt of `phase` and return the new count.
    pub fn note_failure(&mut self, phase: PhaseId, fault: Fault, now: DateTime<Utc>) -> u32 {
        let count = self.attempts.entry(phase).or_insert(0);
        *count += 1;
        let count = *count;
        self.last_error = Some(fault);
        self.updated_at = now;
        count
    }

    /// Move to `failed`, keeping the fault for operators.
    pub fn fail(&mut self, fault: Fault, now: DateTime<Utc>, retention: Duration) {
        self.halted_at = self.phase.phase().or(self.halted_at);
        self.phase = PhaseTag::Failed;
        self.last_error = Some(fault);
        self.expires_at = Some(now + retention);
        self.updated_at = now;
    }

    /// Move to `cancelled` and append an audit entry.
    pub fn cancel(&mut self, reason: impl Into<String>, now: DateTime<Utc>, retention: Duration) {
        self.push_audit(AuditAction::Cancel, PhaseTag::Cancelled, reason, now);
        self.halted_at = self.phase.phase().or(self.halted_at);
        self.phase = PhaseTag::Cancelled;
        self.expires_at = Some(now + retention);
    }

    /// Return a failed record to the phase that failed with a reset counter.
    pub fn revive(&mut self, phase: PhaseId, reason: impl Into<String>, now: DateTime<Utc>) {
        self.push_audit(AuditAction::Revive, PhaseTag::Active(phase), reason, now);
        self.phase = PhaseTag::Active(phase);
        self.attempts.insert(phase, 0);
        self.last_error = None;
        self.halted_at = None;
        self.expires_at = None;
    }

    /// Move back to `to`, discarding artifacts and counters from that phase on.
    pub fn rewind(&mut self, to: PhaseId, reason: impl Into<String>, now: DateTime<Utc>) {
        self.push_audit(AuditAction::Rewind, PhaseTag::Active(to), reason, now);
        self.artifacts.truncate_from(to);
        self.attempts.retain(|phase, _| phase.index() < to.index());
        self.attempts.insert(to, 0);
        self.phase = PhaseTag::Active(to);
        self.last_error = None;
        self.halted_at = None;
        self.expires_at = None;
    }

    /// Note that the signal for the current phase was emitted again.
    pub fn resume(&mut self, reason: impl Into<String>, now: DateTime<Utc>) {
        self.push_audit(AuditAction::Resume, self.phase, reason, now);
    }

    fn push_audit(
        &mut self,
        action: AuditAction,
        to: PhaseTag,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) {
        self.audit.push(AuditEntry {
            at: now,
            action,
            from: self.phase,
            to,
            reason: reason.into(),
            fault: self.last_error.clone(),
        });
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record() -> PhaseRecord {
        let id = WorkflowId::parse("w1").unwrap();
        PhaseRecord::new(id, WorkflowRequest::new("rust", "beginner"), Utc::now())
    }

    #[test]
    fn test_new_record_starts_at_first_phase() {
        let r = record();
        assert_eq!(r.phase, PhaseTag::Active(PhaseId::ExpandQuery));
        assert_eq!(r.attempts_for(PhaseId::ExpandQuery), 0);
        assert_eq!(r.version, 0);
        assert!(!r.is_terminal());
    }

    #[test]
    fn test_advance_seeds_next_counter() {
        let mut r = record();
        r.phase = PhaseTag::Active(PhaseId::RetrieveCandidates);
        r.attempts = BTreeMap::from([(PhaseId::RetrieveCandidates, 0)]);

        let mut artifacts = Artifacts::default();
        artifacts.insert(PhaseId::RetrieveCandidates, json!([]));
        r.advance(PhaseId::RetrieveCandidates, artifacts, Utc::now(), Duration::hours(1));

        assert_eq!(r.phase, PhaseTag::Active(PhaseId::DraftStructure));
        assert_eq!(
            r.attempts,
            BTreeMap::from([(PhaseId::RetrieveCandidates, 0), (PhaseId::DraftStructure, 0)])
        );
        assert!(r.expires_at.is_none());
    }

    #[test]
    fn test_advance_past_last_phase_completes_and_expires() {
        let mut r = record();
        r.phase = PhaseTag::Active(PhaseId::Persist);
        let now = Utc::now();
        r.advance(PhaseId::Persist, Artifacts::default(), now, Duration::seconds(60));

        assert_eq!(r.phase, PhaseTag::Completed);
        assert_eq!(r.expires_at, Some(now + Duration::seconds(60)));
        assert!(r.is_expired(now + Duration::seconds(60)));
        assert!(!r.is_expired(now));
    }

    #[test]
    fn test_fail_then_revive_restores_phase() {
        let mut r = record();
        let now = Utc::now();
        assert_eq!(r.note_failure(PhaseId::ExpandQuery, Fault::transient("x"), now), 1);
        r.fail(Fault::transient("x"), now, Duration::hours(1));
        assert_eq!(r.phase, PhaseTag::Failed);
        assert_eq!(r.halted_at, Some(PhaseId::ExpandQuery));

        r.revive(PhaseId::ExpandQuery, "provider back", now);
        assert_eq!(r.phase, PhaseTag::Active(PhaseId::ExpandQuery));
        assert_eq!(r.attempts_for(PhaseId::ExpandQuery), 0);
        assert!(r.last_error.is_none());
        assert!(r.expires_at.is_none());

        let entry = r.audit.last().unwrap();
        assert_eq!(entry.action, AuditAction::Revive);
        assert_eq!(entry.from, PhaseTag::Failed);
        assert_eq!(entry.to, PhaseTag::Active(PhaseId::ExpandQuery));
        assert_eq!(entry.fault.as_ref().map(|f| f.message.as_str()), Some("x"));
    }

    #[test]
    fn test_rewind_drops_later_artifacts() {
        let mut r = record();
        let mut artifacts = Artifacts::default();
        for phase in [PhaseId::ExpandQuery, PhaseId::RetrieveCandidates, PhaseId::DraftStructure] {
            artifacts.insert(phase, json!(phase.as_str()));
            r.attempts.insert(phase, 1);
        }
        r.artifacts = artifacts;
        r.phase = PhaseTag::Active(PhaseId::DraftDetails);

        r.rewind(PhaseId::RetrieveCandidates, "bad sources", Utc::now());

        assert_eq!(r.phase, PhaseTag::Active(PhaseId::RetrieveCandidates));
        assert!(r.artifacts.contains(PhaseId::ExpandQuery));
        assert!(!r.artifacts.contains(PhaseId::RetrieveCandidates));
        assert!(!r.artifacts.contains(PhaseId::DraftStructure));
        assert_eq!(r.attempts_for(PhaseId::ExpandQuery), 1);
        assert_eq!(r.attempts_for(PhaseId::RetrieveCandidates), 0);
        assert!(!r.attempts.contains_key(&PhaseId::DraftStructure));
        assert_eq!(r.audit.len(), 1);
    }

    #[test]
    fn test_successor_must_move_forward_or_be_audited() {
        let mut at_draft = record();
        at_draft.phase = PhaseTag::Active(PhaseId::DraftStructure);

        let mut retried = at_draft.clone();
        retried.note_failure(PhaseId::DraftStructure, Fault::transient("x"), Utc::now());
        assert!(at_draft.accepts_successor(&retried));

        let mut advanced = at_draft.clone();
        advanced.advance(
            PhaseId::DraftStructure,
            Artifacts::default(),
            Utc::now(),
            Duration::hours(1),
        );
        assert!(at_draft.accepts_successor(&advanced));

        let mut regressed = at_draft.clone();
        regressed.phase = PhaseTag::Active(PhaseId::ExpandQuery);
        assert!(!at_draft.accepts_successor(&regressed));

        let mut rewound = at_draft.clone();
        rewound.rewind(PhaseId::ExpandQuery, "redo", Utc::now());
        assert!(at_draft.accepts_successor(&rewound));
    }

    #[test]
    fn test_resume_keeps_phase_and_audits() {
        let mut r = record();
        r.resume("signal lost", Utc::now());
        assert_eq!(r.phase, PhaseTag::Active(PhaseId::ExpandQuery));
        let entry = r.audit.last().unwrap();
        assert_eq!(entry.action, AuditAction::Resume);
        assert_eq!(entry.from, entry.to);
    }

    #[test]
    fn test_record_json_shape() {
        let r = record();
        let value = serde_json::to_value(&r).unwrap();
        assert_eq!(value["workflow_id"], "w1");
        assert_eq!(value["phase"], "expand_query");
        assert_eq!(value["attempts"]["expand_query"], 0);
        assert!(value.get("last_error").is_none());

        let back: PhaseRecord = serde_json::from_value(value).unwrap();
        assert_eq!(back, r);
    }
}
