//! Core vocabulary types shared across the workspace.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::WorkflowIdError;

/// Identifier for a generation phase.
///
/// Phases run strictly in declaration order; `ALL` is that order.
///
/// # Serialization
///
/// `PhaseId` serializes to its snake_case name (e.g., `"expand_query"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseId {
    /// Rewrites the learner request into focused search queries.
    ExpandQuery,
    /// Runs retrieval for every expanded query and collects candidate sources.
    RetrieveCandidates,
    /// Drafts the module outline of the curriculum.
    DraftStructure,
    /// Drafts lesson content for every module in the outline.
    DraftDetails,
    /// Reviews the drafted curriculum and records reviewer notes.
    Review,
    /// Persists the finished curriculum document.
    Persist,
}

impl PhaseId {
    /// Every phase, in execution order.
    pub const ALL: [PhaseId; 6] = [
        Self::ExpandQuery,
        Self::RetrieveCandidates,
        Self::DraftStructure,
        Self::DraftDetails,
        Self::Review,
        Self::Persist,
    ];

    /// Returns the canonical snake_case name used in records, signals and logs.
    ///
    /// # Example
    ///
    /// ```rust
    /// use syllabus_utils::types::PhaseId;
    ///
    /// assert_eq!(PhaseId::ExpandQuery.as_str(), "expand_query");
    /// assert_eq!(PhaseId::Persist.as_str(), "persist");
    /// ```
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ExpandQuery => "expand_query",
            Self::RetrieveCandidates => "retrieve_candidates",
            Self::DraftStructure => "draft_structure",
            Self::DraftDetails => "draft_details",
            Self::Review => "review",
            Self::Persist => "persist",
        }
    }

    /// Zero-based position of the phase in the workflow.
    #[must_use]
    pub const fn index(&self) -> usize {
        match self {
            Self::ExpandQuery => 0,
            Self::RetrieveCandidates => 1,
            Self::DraftStructure => 2,
            Self::DraftDetails => 3,
            Self::Review => 4,
            Self::Persist => 5,
        }
    }

    /// The phase that follows this one, or `None` for the last phase.
    #[must_use]
    pub const fn next(&self) -> Option<PhaseId> {
        match self {
            Self::ExpandQuery => Some(Self::RetrieveCandidates),
            Self::RetrieveCandidates => Some(Self::DraftStructure),
            Self::DraftStructure => Some(Self::DraftDetails),
            Self::DraftDetails => Some(Self::Review),
            Self::Review => Some(Self::Persist),
            Self::Persist => None,
        }
    }

    /// The first phase of every workflow.
    #[must_use]
    pub const fn first() -> PhaseId {
        Self::ExpandQuery
    }
}

impl fmt::Display for PhaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PhaseId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| {
                let known: Vec<&str> = Self::ALL.iter().map(PhaseId::as_str).collect();
                format!("unknown phase '{s}' (expected one of: {})", known.join(", "))
            })
    }
}

/// Position of a workflow: an active phase or one of the terminal tags.
///
/// Serialized as a plain string so records stay readable
/// (`"draft_structure"`, `"completed"`, `"failed"`, `"cancelled"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PhaseTag {
    Active(PhaseId),
    Completed,
    Failed,
    Cancelled,
}

impl PhaseTag {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active(phase) => phase.as_str(),
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Active(_))
    }

    /// The active phase, if the workflow has not reached a terminal tag.
    #[must_use]
    pub const fn phase(&self) -> Option<PhaseId> {
        match self {
            Self::Active(phase) => Some(*phase),
            _ => None,
        }
    }

    /// Tag reached after `phase` succeeds.
    #[must_use]
    pub const fn after(phase: PhaseId) -> PhaseTag {
        match phase.next() {
            Some(next) => Self::Active(next),
            None => Self::Completed,
        }
    }

    /// Whether moving from `self` to `to` is a forward move.
    ///
    /// Forward means a later active phase, `Completed` from the last phase,
    /// or `Failed`/`Cancelled` from any active phase. Anything else is a
    /// regression and must go through an audited revision.
    #[must_use]
    pub fn is_forward_move(&self, to: PhaseTag) -> bool {
        match (self, to) {
            (Self::Active(from), Self::Active(to)) => to.index() > from.index(),
            (Self::Active(from), Self::Completed) => from.next().is_none(),
            (Self::Active(_), Self::Failed | Self::Cancelled) => true,
            _ => false,
        }
    }
}

impl fmt::Display for PhaseTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<PhaseId> for PhaseTag {
    fn from(phase: PhaseId) -> Self {
        Self::Active(phase)
    }
}

impl From<PhaseTag> for String {
    fn from(tag: PhaseTag) -> Self {
        tag.as_str().to_string()
    }
}

impl TryFrom<String> for PhaseTag {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl FromStr for PhaseTag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            other => other.parse::<PhaseId>().map(Self::Active),
        }
    }
}

/// Identifier of one workflow instance.
///
/// Workflow ids become file names in the file-backed store, so they are
/// restricted to ASCII alphanumerics, `-` and `_`, at most 128 characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WorkflowId(String);

impl WorkflowId {
    pub const MAX_LEN: usize = 128;

    /// Validate and wrap an externally supplied id.
    ///
    /// # Errors
    ///
    /// Returns `WorkflowIdError` if the id is empty, too long, or contains
    /// characters outside `[A-Za-z0-9_-]`.
    pub fn parse(raw: impl Into<String>) -> Result<Self, WorkflowIdError> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(WorkflowIdError::Empty);
        }
        if raw.len() > Self::MAX_LEN {
            return Err(WorkflowIdError::TooLong {
                len: raw.len(),
                max: Self::MAX_LEN,
            });
        }
        if let Some(bad) = raw
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
        {
            return Err(WorkflowIdError::InvalidCharacter { id: raw, bad });
        }
        Ok(Self(raw))
    }

    /// Generate a fresh random id (`wf-<uuid v4>`).
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("wf-{}", uuid::Uuid::new_v4().simple()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for WorkflowId {
    type Err = WorkflowIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for WorkflowId {
    type Error = WorkflowIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<WorkflowId> for String {
    fn from(id: WorkflowId) -> Self {
        id.0
    }
}

/// Classification of an effect or phase failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    /// Network, timeout or throttling problem; worth retrying.
    Transient,
    /// Invalid input or exhausted budget; retrying cannot help.
    Permanent,
    /// The surrounding workflow was cancelled.
    Cancelled,
    /// A bug or an unexpected panic caught at an error boundary.
    Internal,
}

impl FaultKind {
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient)
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Transient => "transient",
            Self::Permanent => "permanent",
            Self::Cancelled => "cancelled",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed failure that can be stored on a record or carried through a
/// pipeline context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fault {
    pub kind: FaultKind,
    pub message: String,
    /// Where the fault originated (command tag, interceptor name, phase).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
}

impl Fault {
    #[must_use]
    pub fn new(kind: FaultKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            origin: None,
        }
    }

    #[must_use]
    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(FaultKind::Transient, message)
    }

    #[must_use]
    pub fn permanent(message: impl Into<String>) -> Self {
        Self::new(FaultKind::Permanent, message)
    }

    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(FaultKind::Internal, message)
    }

    #[must_use]
    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(FaultKind::Cancelled, message)
    }

    /// Attach the origin if none has been recorded yet.
    #[must_use]
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        if self.origin.is_none() {
            self.origin = Some(origin.into());
        }
        self
    }

    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.origin {
            Some(origin) => write!(f, "[{}] {}: {}", self.kind, origin, self.message),
            None => write!(f, "[{}] {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for Fault {}

/// Metered inference usage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    #[must_use]
    pub const fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    #[must_use]
    pub const fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }

    pub fn add(&mut self, other: TokenUsage) {
        self.input_tokens = self.input_tokens.saturating_add(other.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(other.output_tokens);
    }
}
