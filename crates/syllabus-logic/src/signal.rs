//! Phase-completion signals.

use serde::{Deserialize, Serialize};
use std::fmt;

use syllabus_utils::types::{PhaseId, WorkflowId};

use crate::plan::Artifacts;

/// Opaque reference to the artifacts a signal was emitted for.
///
/// It is the BLAKE3 hash of the serialized artifacts, so two signals for the
/// same phase carry the same reference only if the inputs were identical.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PayloadRef(String);

impl PayloadRef {
    /// Hash the canonical JSON encoding of `artifacts`.
    #[must_use]
    pub fn for_artifacts(artifacts: &Artifacts) -> Self {
        // Artifacts are a string-keyed map of JSON values and always encode.
        let bytes = serde_json::to_vec(artifacts).unwrap_or_default();
        Self(blake3::hash(&bytes).to_hex().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PayloadRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// "Phase `phase` of `workflow_id` is ready to run."
///
/// Delivery is at-least-once and unordered; receivers must tolerate
/// duplicates and stale signals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseSignal {
    pub workflow_id: WorkflowId,
    pub phase: PhaseId,
    /// Attempt number this signal triggers, starting at 1.
    pub attempt: u32,
    pub payload_ref: PayloadRef,
}

impl PhaseSignal {
    #[must_use]
    pub fn new(
        workflow_id: WorkflowId,
        phase: PhaseId,
        attempt: u32,
        artifacts: &Artifacts,
    ) -> Self {
        Self {
            workflow_id,
            phase,
            attempt,
            payload_ref: PayloadRef::for_artifacts(artifacts),
        }
    }
}

impl fmt::Display for PhaseSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}#{}", self.workflow_id, self.phase, self.attempt)
    }
}
