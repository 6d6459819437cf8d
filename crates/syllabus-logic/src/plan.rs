//! Per-phase command planning and artifact folding.
//!
//! Each phase reads the artifacts of the phases before it, plans the
//! commands it needs, and folds the effect outputs into its own artifact.
//! Everything here is pure; the coordinator executes the plan.
//!
//! # Artifact shapes
//!
//! | Phase | Artifact |
//! |-------|----------|
//! | `expand_query` | `{"queries": [string]}` |
//! | `retrieve_candidates` | `{"candidates": [SearchHit]}` |
//! | `draft_structure` | `{"modules": [string]}` |
//! | `draft_details` | `{"lessons": [{"module": string, "content": string}]}` |
//! | `review` | `{"notes": string}` |
//! | `persist` | `{"collection": string, "key": string}` |

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::{BTreeMap, BTreeSet};

use syllabus_utils::types::{Fault, PhaseId};

use crate::command::{Command, EffectOutput, SearchHit};

pub const MAX_QUERIES: usize = 5;
pub const SEARCH_LIMIT: usize = 5;
pub const MAX_MODULES: usize = 8;
pub const CURRICULUM_COLLECTION: &str = "curricula";

const EXPAND_MAX_TOKENS: u32 = 256;
const STRUCTURE_MAX_TOKENS: u32 = 1024;
const DETAILS_MAX_TOKENS: u32 = 2048;
const REVIEW_MAX_TOKENS: u32 = 512;

/// What the learner asked for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowRequest {
    pub topic: String,
    pub learner_level: String,
    #[serde(default)]
    pub goals: Vec<String>,
}

impl WorkflowRequest {
    #[must_use]
    pub fn new(topic: impl Into<String>, learner_level: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            learner_level: learner_level.into(),
            goals: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_goal(mut self, goal: impl Into<String>) -> Self {
        self.goals.push(goal.into());
        self
    }

    /// Stable key for the persisted curriculum document.
    #[must_use]
    pub fn curriculum_key(&self) -> String {
        let encoded = serde_json::to_vec(self).unwrap_or_default();
        let hash = blake3::hash(&encoded).to_hex();
        format!("curriculum-{}", &hash.as_str()[..16])
    }
}

/// Outputs of completed phases, keyed by phase.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Artifacts(BTreeMap<PhaseId, Value>);

impl Artifacts {
    #[must_use]
    pub fn get(&self, phase: PhaseId) -> Option<&Value> {
        self.0.get(&phase)
    }

    pub fn insert(&mut self, phase: PhaseId, value: Value) {
        self.0.insert(phase, value);
    }

    #[must_use]
    pub fn contains(&self, phase: PhaseId) -> bool {
        self.0.contains_key(&phase)
    }

    /// Drop the artifacts of `phase` and every later phase.
    pub fn truncate_from(&mut self, phase: PhaseId) {
        self.0.retain(|p, _| p.index() < phase.index());
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PhaseId, &Value)> {
        self.0.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn missing(phase: PhaseId, needs: PhaseId) -> Fault {
    Fault::permanent(format!("{phase} requires the {needs} artifact")).with_origin(phase.as_str())
}

fn strings(
    artifacts: &Artifacts,
    phase: PhaseId,
    needs: PhaseId,
    field: &str,
) -> Result<Vec<String>, Fault> {
    let value = artifacts.get(needs).ok_or_else(|| missing(phase, needs))?;
    serde_json::from_value(value[field].clone()).map_err(|e| {
        Fault::permanent(format!("{needs} artifact has malformed '{field}': {e}"))
            .with_origin(phase.as_str())
    })
}

fn candidates(artifacts: &Artifacts, phase: PhaseId) -> Result<Vec<SearchHit>, Fault> {
    let needs = PhaseId::RetrieveCandidates;
    let value = artifacts.get(needs).ok_or_else(|| missing(phase, needs))?;
    serde_json::from_value(value["candidates"].clone()).map_err(|e| {
        Fault::permanent(format!("{needs} artifact is malformed: {e}")).with_origin(phase.as_str())
    })
}

fn inference(purpose: PhaseId, prompt: String, max_tokens: u32) -> Command {
    Command::InvokeInference {
        purpose: purpose.as_str().to_string(),
        prompt,
        max_tokens,
    }
}

/// Non-empty, de-bulleted, de-duplicated lines of model output.
fn list_items(text: &str, limit: usize) -> Vec<String> {
    let mut seen = BTreeSet::new();
    text.lines()
        .map(|line| strip_marker(line).to_string())
        .filter(|item| !item.is_empty() && seen.insert(item.to_lowercase()))
        .take(limit)
        .collect()
}

/// `line` without its bullet (`-`, `*`) or ordinal (`1.`, `2)`) marker.
/// Leading digits are only a marker when `.` or `)` and whitespace follow.
fn strip_marker(line: &str) -> &str {
    let line = line.trim();
    let unbulleted = line.trim_start_matches(['-', '*']);
    if unbulleted.len() != line.len() {
        return unbulleted.trim_start();
    }

    let digits = line.len() - line.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    if digits > 0 {
        if let Some(rest) = line[digits..].strip_prefix(['.', ')']) {
            if rest.is_empty() || rest.starts_with(char::is_whitespace) {
                return rest.trim_start();
            }
        }
    }
    line
}

/// Commands phase `phase` must run, given the request and prior artifacts.
///
/// # Errors
///
/// Returns a `Permanent` fault if a prerequisite artifact is missing or malformed.
pub fn plan_phase(
    phase: PhaseId,
    request: &WorkflowRequest,
    artifacts: &Artifacts,
) -> Result<Vec<Command>, Fault> {
    match phase {
        PhaseId::ExpandQuery => {
            let mut prompt = format!(
                "List up to {MAX_QUERIES} search queries, one per line, for a {} curriculum on: {}",
                request.learner_level, request.topic
            );
            for goal in &request.goals {
                prompt.push_str(&format!("\nGoal: {goal}"));
            }
            Ok(vec![inference(phase, prompt, EXPAND_MAX_TOKENS)])
        }

        PhaseId::RetrieveCandidates => {
            let queries = strings(artifacts, phase, PhaseId::ExpandQuery, "queries")?;
            Ok(queries
                .into_iter()
                .map(|query| Command::Search {
                    query,
                    limit: SEARCH_LIMIT,
                })
                .collect())
        }

        PhaseId::DraftStructure => {
            let sources = candidates(artifacts, phase)?;
            let mut prompt = format!(
                "Outline up to {MAX_MODULES} modules, one per line, teaching {} to a {} learner.",
                request.topic, request.learner_level
            );
            prompt.push_str("\nSources:");
            for hit in &sources {
                prompt.push_str(&format!("\n- {}", hit.title));
            }
            Ok(vec![inference(phase, prompt, STRUCTURE_MAX_TOKENS)])
        }

        PhaseId::DraftDetails => {
            let modules = strings(artifacts, phase, PhaseId::DraftStructure, "modules")?;
            Ok(modules
                .iter()
                .map(|module| {
                    let prompt = format!(
                        "Write the lesson for module '{module}' of a {} course on {}.",
                        request.learner_level, request.topic
                    );
                    inference(phase, prompt, DETAILS_MAX_TOKENS)
                })
                .collect())
        }

        PhaseId::Review => {
            let modules = strings(artifacts, phase, PhaseId::DraftStructure, "modules")?;
            if !artifacts.contains(PhaseId::DraftDetails) {
                return Err(missing(phase, PhaseId::DraftDetails));
            }
            let prompt = format!(
                "Review this {} curriculum on {} for gaps and ordering problems:\n{}",
                request.learner_level,
                request.topic,
                modules.join("\n")
            );
            Ok(vec![inference(phase, prompt, REVIEW_MAX_TOKENS)])
        }

        PhaseId::Persist => {
            let modules = strings(artifacts, phase, PhaseId::DraftStructure, "modules")?;
            let lessons = artifacts
                .get(PhaseId::DraftDetails)
                .ok_or_else(|| missing(phase, PhaseId::DraftDetails))?;
            let review = artifacts
                .get(PhaseId::Review)
                .ok_or_else(|| missing(phase, PhaseId::Review))?;
            let sources: Vec<String> = candidates(artifacts, phase)?
                .into_iter()
                .map(|hit| hit.id)
                .collect();

            let document = json!({
                "request": request,
                "modules": modules,
                "lessons": lessons["lessons"],
                "review": review["notes"],
                "sources": sources,
            });
            Ok(vec![Command::PersistRecord {
                collection: CURRICULUM_COLLECTION.to_string(),
                key: request.curriculum_key(),
                document,
            }])
        }
    }
}

fn unexpected(phase: PhaseId, expected: &str, got: &EffectOutput) -> Fault {
    Fault::internal(format!("{phase} expected {expected} output, got {got:?}"))
        .with_origin(phase.as_str())
}

fn inference_texts(phase: PhaseId, outputs: &[EffectOutput]) -> Result<Vec<String>, Fault> {
    outputs
        .iter()
        .map(|output| match output {
            EffectOutput::Inference { text, .. } => Ok(text.clone()),
            other => Err(unexpected(phase, "inference", other)),
        })
        .collect()
}

fn single_text(phase: PhaseId, outputs: &[EffectOutput]) -> Result<String, Fault> {
    let mut texts = inference_texts(phase, outputs)?;
    match texts.len() {
        1 => Ok(texts.remove(0)),
        n => Err(Fault::internal(format!("{phase} expected 1 output, got {n}"))
            .with_origin(phase.as_str())),
    }
}

/// Fold the outputs of `phase`'s commands into a new artifact set.
///
/// `outputs` must be in the same order as the commands returned by
/// [`plan_phase`]. The input artifacts are left untouched.
///
/// # Errors
///
/// Returns an `Internal` fault if the outputs do not match the plan, or a
/// `Permanent` fault if a prerequisite artifact is missing.
pub fn fold_phase(
    phase: PhaseId,
    artifacts: &Artifacts,
    outputs: &[EffectOutput],
) -> Result<Artifacts, Fault> {
    let artifact = match phase {
        PhaseId::ExpandQuery => {
            let text = single_text(phase, outputs)?;
            json!({ "queries": list_items(&text, MAX_QUERIES) })
        }

        PhaseId::RetrieveCandidates => {
            let mut best: BTreeMap<String, SearchHit> = BTreeMap::new();
            for output in outputs {
                let EffectOutput::Search { hits } = output else {
                    return Err(unexpected(phase, "search", output));
                };
                for hit in hits {
                    match best.get(&hit.id) {
                        Some(existing) if existing.score >= hit.score => {}
                        _ => {
                            best.insert(hit.id.clone(), hit.clone());
                        }
                    }
                }
            }
            let mut hits: Vec<SearchHit> = best.into_values().collect();
            hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
            json!({ "candidates": hits })
        }

        PhaseId::DraftStructure => {
            let text = single_text(phase, outputs)?;
            json!({ "modules": list_items(&text, MAX_MODULES) })
        }

        PhaseId::DraftDetails => {
            let modules = strings(artifacts, phase, PhaseId::DraftStructure, "modules")?;
            let texts = inference_texts(phase, outputs)?;
            if texts.len() != modules.len() {
                return Err(Fault::internal(format!(
                    "{phase} expected {} outputs, got {}",
                    modules.len(),
                    texts.len()
                ))
                .with_origin(phase.as_str()));
            }
            let lessons: Vec<Value> = modules
                .into_iter()
                .zip(texts)
                .map(|(module, content)| json!({ "module": module, "content": content }))
                .collect();
            json!({ "lessons": lessons })
        }

        PhaseId::Review => {
            let notes = single_text(phase, outputs)?;
            json!({ "notes": notes.trim() })
        }

        PhaseId::Persist => match outputs {
            [EffectOutput::Persisted { key }] => {
                json!({ "collection": CURRICULUM_COLLECTION, "key": key })
            }
            [other] => return Err(unexpected(phase, "persisted", other)),
            _ => {
                return Err(Fault::internal(format!(
                    "{phase} expected 1 output, got {}",
                    outputs.len()
                ))
                .with_origin(phase.as_str()));
            }
        },
    };

    let mut next = artifacts.clone();
    next.insert(phase, artifact);
    Ok(next)
}

/// Check that the artifact a phase produced is usable by the phases after it.
///
/// # Errors
///
/// Returns a `Permanent` fault describing the first problem found.
pub fn validate_artifact(phase: PhaseId, artifacts: &Artifacts) -> Result<(), Fault> {
    let value = artifacts
        .get(phase)
        .ok_or_else(|| Fault::internal(format!("{phase} produced no artifact")))?;

    let non_empty = |field: &str| value[field].as_array().is_some_and(|items| !items.is_empty());

    let problem = match phase {
        PhaseId::ExpandQuery if !non_empty("queries") => Some("no search queries were produced"),
        PhaseId::RetrieveCandidates if !non_empty("candidates") => {
            Some("retrieval returned no candidates")
        }
        PhaseId::DraftStructure if !non_empty("modules") => Some("the outline has no modules"),
        PhaseId::DraftDetails if !non_empty("lessons") => Some("no lessons were drafted"),
        PhaseId::Review if value["notes"].as_str().is_none_or(str::is_empty) => {
            Some("the review is empty")
        }
        PhaseId::Persist if value["key"].as_str().is_none_or(str::is_empty) => {
            Some("the curriculum was not persisted")
        }
        _ => None,
    };

    match problem {
        Some(problem) => Err(Fault::permanent(problem).with_origin(phase.as_str())),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use syllabus_utils::types::{FaultKind, TokenUsage};

    fn request() -> WorkflowRequest {
        WorkflowRequest::new("Rust ownership", "beginner").with_goal("write safe code")
    }

    fn text(t: &str) -> EffectOutput {
        EffectOutput::Inference {
            text: t.to_string(),
            usage: TokenUsage::new(1, 1),
        }
    }

    fn hit(id: &str, score: f64) -> SearchHit {
        SearchHit {
            id: id.to_string(),
            title: format!("Title {id}"),
            snippet: String::new(),
            score,
        }
    }

    /// Runs plan/fold for every phase with canned outputs.
    fn run_all() -> Artifacts {
        let req = request();
        let mut artifacts = Artifacts::default();
        for phase in PhaseId::ALL {
            let commands = plan_phase(phase, &req, &artifacts).unwrap();
            let outputs: Vec<EffectOutput> = commands
                .iter()
                .map(|cmd| match cmd {
                    Command::InvokeInference { purpose, .. } if purpose == "expand_query" => {
                        text("- borrowing\n- lifetimes\n\n- Borrowing")
                    }
                    Command::InvokeInference { purpose, .. } if purpose == "draft_structure" => {
                        text("1. Ownership basics\n2. References")
                    }
                    Command::InvokeInference { prompt, .. } => {
                        text(&format!("content for {prompt}"))
                    }
                    Command::Search { query, .. } => EffectOutput::Search {
                        hits: vec![hit(&format!("{query}-1"), 0.5), hit("shared", 0.9)],
                    },
                    Command::PersistRecord { key, .. } => {
                        EffectOutput::Persisted { key: key.clone() }
                    }
                    other => panic!("unexpected command {other:?}"),
                })
                .collect();
            artifacts = fold_phase(phase, &artifacts, &outputs).unwrap();
            validate_artifact(phase, &artifacts).unwrap();
        }
        artifacts
    }

    #[test]
    fn test_full_plan_fold_sequence() {
        let artifacts = run_all();
        assert_eq!(artifacts.len(), PhaseId::ALL.len());

        let queries = &artifacts.get(PhaseId::ExpandQuery).unwrap()["queries"];
        assert_eq!(queries, &json!(["borrowing", "lifetimes"]));

        let candidates = artifacts.get(PhaseId::RetrieveCandidates).unwrap()["candidates"]
            .as_array()
            .unwrap()
            .clone();
        assert_eq!(candidates.len(), 3);
        assert_eq!(candidates[0]["id"], "shared");

        let lessons = artifacts.get(PhaseId::DraftDetails).unwrap()["lessons"]
            .as_array()
            .unwrap()
            .clone();
        assert_eq!(lessons.len(), 2);
        assert_eq!(lessons[0]["module"], "Ownership basics");

        assert_eq!(
            artifacts.get(PhaseId::Persist).unwrap()["key"],
            json!(request().curriculum_key())
        );
    }

    #[test]
    fn test_list_items_strips_only_list_markers() {
        let text = "1. intro\n2) next\n- bullet\n* star\n3D graphics\n10.5 hours\n1.\n";
        assert_eq!(
            list_items(text, 10),
            vec!["intro", "next", "bullet", "star", "3D graphics", "10.5 hours"]
        );
        assert_eq!(list_items("1. Intro\n2. intro\n3. more", 1), vec!["Intro"]);
    }

    #[test]
    fn test_missing_prerequisite_is_permanent() {
        let err =
            plan_phase(PhaseId::DraftStructure, &request(), &Artifacts::default()).unwrap_err();
        assert_eq!(err.kind, FaultKind::Permanent);
        assert_eq!(err.origin.as_deref(), Some("draft_structure"));
    }

    #[test]
    fn test_fold_rejects_mismatched_outputs() {
        let err = fold_phase(
            PhaseId::ExpandQuery,
            &Artifacts::default(),
            &[EffectOutput::Notified],
        )
        .unwrap_err();
        assert_eq!(err.kind, FaultKind::Internal);
    }

    #[test]
    fn test_fold_leaves_input_untouched() {
        let before = Artifacts::default();
        let after = fold_phase(PhaseId::ExpandQuery, &before, &[text("a\nb")]).unwrap();
        assert!(before.is_empty());
        assert!(after.contains(PhaseId::ExpandQuery));
    }

    #[test]
    fn test_validate_rejects_empty_retrieval() {
        let mut artifacts = Artifacts::default();
        artifacts.insert(PhaseId::RetrieveCandidates, json!({ "candidates": [] }));
        let err = validate_artifact(PhaseId::RetrieveCandidates, &artifacts).unwrap_err();
        assert_eq!(err.kind, FaultKind::Permanent);
    }

    #[test]
    fn test_truncate_from_drops_later_phases() {
        let mut artifacts = run_all();
        artifacts.truncate_from(PhaseId::DraftStructure);
        assert_eq!(artifacts.len(), 2);
        assert!(artifacts.contains(PhaseId::RetrieveCandidates));
        assert!(!artifacts.contains(PhaseId::DraftStructure));
    }

    #[test]
    fn test_curriculum_key_is_stable() {
        assert_eq!(request().curriculum_key(), request().curriculum_key());
        assert_ne!(
            request().curriculum_key(),
            WorkflowRequest::new("Go", "beginner").curriculum_key()
        );
    }
}
