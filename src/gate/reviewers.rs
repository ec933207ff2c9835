//! LLM-backed reviewers for the quality gate.
//!
//! Both reviewers ask the model for a strict JSON verdict and parse it with
//! the tolerant extractor from `llm`. An unparseable verdict is a
//! `GenerationError`, which the orchestrator counts against the stage's
//! retry budget like any other failed attempt.

use crate::document::{ProjectDocument, ReviewScores, Verdict};
use crate::errors::GenerationError;
use crate::gate::{
    ConsistencyReview, ConsistencyReviewer, CraftReview, CraftReviewer, LoreFinding,
    LoreViolation, content_summary,
};
use crate::llm::{TextGenerator, parse_payload};
use crate::lore::ScoredLore;
use crate::stage::Stage;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

const CRAFT_SYSTEM_PROMPT: &str = "You are a developmental editor reviewing a novel in progress. \
Score the submitted material 1-10 on structure, pacing, character_arcs, theme_integration, \
consistency, and overall. Approve only material that needs no structural rework. \
Respond with JSON only: {\"scores\": {\"structure\": n, \"pacing\": n, \"character_arcs\": n, \
\"theme_integration\": n, \"consistency\": n, \"overall\": n}, \
\"approval\": \"approved\" | \"needs_revision\", \"issues\": [..], \"required_fixes\": [..], \
\"strengths\": [..], \"notes\": \"..\"}";

const CONSISTENCY_SYSTEM_PROMPT: &str = "You are the keeper of a fiction series' lore bible. \
Check the submitted material against the established lore for contradictions, and list any \
world facts the material introduces that the bible does not yet record. \
Respond with JSON only: {\"approval\": \"approved\" | \"needs_revision\", \
\"consistency_score\": n, \"violations\": [{\"description\": \"..\", \
\"severity\": \"minor\" | \"major\" | \"critical\", \"suggested_fix\": \"..\"}], \
\"new_lore_detected\": [{\"kind\": \"character\" | \"location\" | \"world_element\", \
\"name\": \"..\", \"description\": \"..\", \"role\": \"..\", \"significance\": \"..\", \
\"element_type\": \"..\", \"rules\": [..], \"should_add\": true}], \"notes\": \"..\"}";

#[derive(Deserialize)]
struct CraftVerdictPayload {
    #[serde(default)]
    scores: ReviewScores,
    approval: String,
    #[serde(default)]
    issues: Vec<String>,
    #[serde(default)]
    required_fixes: Vec<String>,
    #[serde(default)]
    strengths: Vec<String>,
    #[serde(default)]
    notes: String,
}

#[derive(Deserialize)]
struct ConsistencyVerdictPayload {
    approval: String,
    #[serde(default)]
    consistency_score: u8,
    #[serde(default)]
    violations: Vec<LoreViolation>,
    #[serde(default)]
    new_lore_detected: Vec<LoreFinding>,
    #[serde(default)]
    notes: String,
}

fn parse_approval(raw: &str) -> Result<Verdict, GenerationError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "approved" => Ok(Verdict::Approved),
        "needs_revision" | "rejected" => Ok(Verdict::NeedsRevision),
        other => Err(GenerationError::MalformedOutput(format!(
            "unrecognized approval value: {other}"
        ))),
    }
}

pub struct LlmCraftReviewer {
    generator: Arc<dyn TextGenerator>,
}

impl LlmCraftReviewer {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl CraftReviewer for LlmCraftReviewer {
    async fn review(
        &self,
        doc: &ProjectDocument,
        stage: Stage,
    ) -> Result<CraftReview, GenerationError> {
        let prompt = format!(
            "Series: {} ({})\nStage under review: {}\n\nMaterial:\n{}",
            doc.series.title,
            doc.series.genre,
            stage,
            content_summary(doc, stage)
        );
        let response = self.generator.generate(CRAFT_SYSTEM_PROMPT, &prompt).await?;
        let payload: CraftVerdictPayload = parse_payload(&response)?;
        Ok(CraftReview {
            scores: payload.scores,
            verdict: parse_approval(&payload.approval)?,
            issues: payload.issues,
            required_fixes: payload.required_fixes,
            strengths: payload.strengths,
            notes: payload.notes,
        })
    }
}

pub struct LlmConsistencyReviewer {
    generator: Arc<dyn TextGenerator>,
}

impl LlmConsistencyReviewer {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl ConsistencyReviewer for LlmConsistencyReviewer {
    async fn review(
        &self,
        doc: &ProjectDocument,
        stage: Stage,
        relevant_lore: &[ScoredLore],
    ) -> Result<ConsistencyReview, GenerationError> {
        let lore_block = if relevant_lore.is_empty() {
            "(no established lore yet)".to_string()
        } else {
            relevant_lore
                .iter()
                .map(|s| s.entry.render())
                .collect::<Vec<_>>()
                .join("\n\n")
        };
        let prompt = format!(
            "Established lore:\n{lore_block}\n\nStage under review: {}\n\nMaterial:\n{}",
            stage,
            content_summary(doc, stage)
        );
        let response = self
            .generator
            .generate(CONSISTENCY_SYSTEM_PROMPT, &prompt)
            .await?;
        let payload: ConsistencyVerdictPayload = parse_payload(&response)?;
        Ok(ConsistencyReview {
            verdict: parse_approval(&payload.approval)?,
            consistency_score: payload.consistency_score,
            violations: payload.violations,
            new_lore: payload.new_lore_detected,
            notes: payload.notes,
        })
    }
}
