//! The quality gate: the mandatory checkpoint between a stage's generated
//! output and the marker advancing past it.
//!
//! Every attempt runs the same sequence: structural validation first (cheap,
//! no model calls), then the craft review, then the consistency review.
//! Both reviews must approve; a single rejection rejects the attempt. New
//! lore facts surfaced by the consistency review are formalized and stored
//! whether or not the attempt passes, so retries do not re-discover them.

pub mod reviewers;

pub use reviewers::{LlmConsistencyReviewer, LlmCraftReviewer};

use crate::document::{self, ProjectDocument, QualityReport, ReviewScores, Verdict};
use crate::errors::GenerationError;
use crate::lore::{
    Character, Location, LoreEntry, LoreKind, LoreStore, ScoredLore, WorldElement,
};
use crate::stage::Stage;
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// The itemized feedback a rejected attempt hands to the next one. Only the
/// latest attempt's feedback is carried; earlier attempts' feedback is
/// superseded, not accumulated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReviewFeedback {
    pub issues: Vec<String>,
    pub required_fixes: Vec<String>,
    #[serde(default)]
    pub notes: String,
}

impl ReviewFeedback {
    pub fn is_empty(&self) -> bool {
        self.issues.is_empty() && self.required_fixes.is_empty() && self.notes.trim().is_empty()
    }

    /// Render for prompt injection into the retry attempt.
    pub fn render(&self) -> String {
        let mut out = String::new();
        if !self.issues.is_empty() {
            out.push_str("Issues found in the previous attempt:\n");
            for issue in &self.issues {
                out.push_str(&format!("- {issue}\n"));
            }
        }
        if !self.required_fixes.is_empty() {
            out.push_str("Required fixes:\n");
            for fix in &self.required_fixes {
                out.push_str(&format!("- {fix}\n"));
            }
        }
        if !self.notes.trim().is_empty() {
            out.push_str(&format!("Reviewer notes: {}\n", self.notes));
        }
        out
    }
}

/// Craft review result: scores plus itemized feedback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CraftReview {
    pub scores: ReviewScores,
    pub verdict: Verdict,
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default)]
    pub required_fixes: Vec<String>,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Minor,
    Major,
    Critical,
}

/// One contradiction against established lore.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoreViolation {
    pub description: String,
    pub severity: Severity,
    #[serde(default)]
    pub suggested_fix: String,
}

/// A world fact the consistency review saw in the content but not in the
/// lore bible. Formalized into a structured entry when `should_add` holds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoreFinding {
    pub kind: LoreKind,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub significance: String,
    #[serde(default)]
    pub element_type: String,
    #[serde(default)]
    pub rules: Vec<String>,
    #[serde(default = "default_should_add")]
    pub should_add: bool,
}

fn default_should_add() -> bool {
    true
}

impl LoreFinding {
    /// Turn the finding into a structured lore entry, or `None` when the
    /// reviewer flagged it as not worth recording.
    pub fn formalize(&self) -> Option<LoreEntry> {
        if !self.should_add || self.name.trim().is_empty() {
            return None;
        }
        Some(match self.kind {
            LoreKind::Character => LoreEntry::Character(Character {
                name: self.name.clone(),
                role: self.role.clone(),
                description: self.description.clone(),
                traits: Vec::new(),
                relationships: Vec::new(),
            }),
            LoreKind::Location => LoreEntry::Location(Location {
                name: self.name.clone(),
                description: self.description.clone(),
                significance: self.significance.clone(),
            }),
            LoreKind::WorldElement => LoreEntry::WorldElement(WorldElement {
                name: self.name.clone(),
                kind: if self.element_type.trim().is_empty() {
                    "unspecified".to_string()
                } else {
                    self.element_type.clone()
                },
                description: self.description.clone(),
                rules: self.rules.clone(),
            }),
        })
    }
}

/// Consistency review result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsistencyReview {
    pub verdict: Verdict,
    #[serde(default)]
    pub consistency_score: u8,
    #[serde(default)]
    pub violations: Vec<LoreViolation>,
    #[serde(default)]
    pub new_lore: Vec<LoreFinding>,
    #[serde(default)]
    pub notes: String,
}

#[async_trait]
pub trait CraftReviewer: Send + Sync {
    async fn review(
        &self,
        doc: &ProjectDocument,
        stage: Stage,
    ) -> Result<CraftReview, GenerationError>;
}

#[async_trait]
pub trait ConsistencyReviewer: Send + Sync {
    async fn review(
        &self,
        doc: &ProjectDocument,
        stage: Stage,
        relevant_lore: &[ScoredLore],
    ) -> Result<ConsistencyReview, GenerationError>;
}

/// The gate's verdict on one attempt.
#[derive(Debug, Clone)]
pub struct GateOutcome {
    pub approved: bool,
    pub feedback: ReviewFeedback,
    pub new_lore_count: usize,
}

pub struct QualityGate {
    craft: Arc<dyn CraftReviewer>,
    consistency: Arc<dyn ConsistencyReviewer>,
    lore_top_k: usize,
}

impl QualityGate {
    pub fn new(craft: Arc<dyn CraftReviewer>, consistency: Arc<dyn ConsistencyReviewer>) -> Self {
        Self {
            craft,
            consistency,
            lore_top_k: 10,
        }
    }

    pub fn with_lore_top_k(mut self, top_k: usize) -> Self {
        self.lore_top_k = top_k;
        self
    }

    /// Run one full gate pass over `doc` at `stage`. Appends one quality
    /// report per review performed; formalizes and stores new lore
    /// regardless of the verdict.
    pub async fn review(
        &self,
        doc: &mut ProjectDocument,
        stage: Stage,
        attempt: u32,
        lore: &LoreStore,
    ) -> Result<GateOutcome, GenerationError> {
        // Structural check first. A malformed document never reaches a
        // reviewer.
        if let Err(err) = document::schema::validate(doc, stage) {
            warn!(stage = %stage, attempt, path = %err.path, "structural validation rejected stage output");
            let feedback = ReviewFeedback {
                issues: vec![err.to_string()],
                required_fixes: vec![format!("populate {}", err.path)],
                notes: String::new(),
            };
            doc.push_report(report(stage, attempt, "structural", ReviewScores::default(), &feedback, Verdict::NeedsRevision));
            return Ok(GateOutcome {
                approved: false,
                feedback,
                new_lore_count: 0,
            });
        }

        let craft = self.craft.review(doc, stage).await?;
        doc.push_report(QualityReport {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            scope: stage,
            target: stage.as_str().to_string(),
            reviewer: "craft".to_string(),
            attempt,
            scores: craft.scores,
            issues: craft.issues.clone(),
            required_fixes: craft.required_fixes.clone(),
            verdict: craft.verdict,
            notes: craft.notes.clone(),
        });

        let relevant = lore
            .query(&content_summary(doc, stage), self.lore_top_k, None)
            .await;
        let consistency = self.consistency.review(doc, stage, &relevant).await?;

        // Formalize new facts before judging the verdict: a rejected
        // attempt still taught us about the world.
        let mut new_lore_count = 0;
        let mut formalized = Vec::new();
        for finding in &consistency.new_lore {
            if let Some(entry) = finding.formalize() {
                doc.series.lore.upsert(entry.clone());
                formalized.push(entry);
                new_lore_count += 1;
            }
        }
        if !formalized.is_empty() {
            if let Err(e) = lore.store(&formalized).await {
                warn!(stage = %stage, error = %e, "failed to persist formalized lore");
            }
            info!(stage = %stage, count = new_lore_count, "formalized new lore entries");
        }

        let violation_issues: Vec<String> = consistency
            .violations
            .iter()
            .map(|v| v.description.clone())
            .collect();
        let violation_fixes: Vec<String> = consistency
            .violations
            .iter()
            .filter(|v| !v.suggested_fix.trim().is_empty())
            .map(|v| v.suggested_fix.clone())
            .collect();
        doc.push_report(QualityReport {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            scope: stage,
            target: stage.as_str().to_string(),
            reviewer: "consistency".to_string(),
            attempt,
            scores: ReviewScores {
                consistency: consistency.consistency_score,
                overall: consistency.consistency_score,
                ..ReviewScores::default()
            },
            issues: violation_issues.clone(),
            required_fixes: violation_fixes.clone(),
            verdict: consistency.verdict,
            notes: consistency.notes.clone(),
        });

        let approved = craft.verdict.is_approved() && consistency.verdict.is_approved();
        let feedback = if approved {
            ReviewFeedback::default()
        } else {
            let mut issues = Vec::new();
            let mut required_fixes = Vec::new();
            if !craft.verdict.is_approved() {
                issues.extend(craft.issues);
                required_fixes.extend(craft.required_fixes);
            }
            if !consistency.verdict.is_approved() {
                issues.extend(violation_issues);
                required_fixes.extend(violation_fixes);
            }
            ReviewFeedback {
                issues,
                required_fixes,
                notes: craft.notes,
            }
        };

        info!(
            stage = %stage,
            attempt,
            approved,
            craft = %craft.verdict,
            consistency = %consistency.verdict,
            new_lore_count,
            "quality gate verdict"
        );

        Ok(GateOutcome {
            approved,
            feedback,
            new_lore_count,
        })
    }
}

fn report(
    stage: Stage,
    attempt: u32,
    reviewer: &str,
    scores: ReviewScores,
    feedback: &ReviewFeedback,
    verdict: Verdict,
) -> QualityReport {
    QualityReport {
        id: Uuid::new_v4().to_string(),
        timestamp: Utc::now(),
        scope: stage,
        target: stage.as_str().to_string(),
        reviewer: reviewer.to_string(),
        attempt,
        scores,
        issues: feedback.issues.clone(),
        required_fixes: feedback.required_fixes.clone(),
        verdict,
        notes: feedback.notes.clone(),
    }
}

/// A compact textual summary of the content under review at `stage`, used
/// as the lore query and inside reviewer prompts.
pub fn content_summary(doc: &ProjectDocument, stage: Stage) -> String {
    let series = &doc.series;
    match stage {
        Stage::Series => format!(
            "{} ({}): {}. Themes: {}",
            series.title,
            series.genre,
            series.premise,
            series.themes.join(", ")
        ),
        Stage::Book => series
            .books
            .iter()
            .map(|b| format!("Book {}: {} — {}", b.number, b.title, b.premise))
            .collect::<Vec<_>>()
            .join("\n"),
        Stage::Chapter => series
            .books
            .iter()
            .flat_map(|b| b.chapters.iter())
            .map(|c| format!("Chapter {}: {} — {}", c.number, c.title, c.purpose))
            .collect::<Vec<_>>()
            .join("\n"),
        Stage::Scene => series
            .books
            .iter()
            .flat_map(|b| b.chapters.iter())
            .flat_map(|c| c.scenes.iter())
            .map(|s| format!("Scene {}: {} (POV {})", s.number, s.purpose, s.pov))
            .collect::<Vec<_>>()
            .join("\n"),
        Stage::Beat => series
            .books
            .iter()
            .flat_map(|b| b.chapters.iter())
            .flat_map(|c| c.scenes.iter())
            .flat_map(|s| s.beats.iter())
            .map(|b| format!("Beat {}: {}", b.number, b.description))
            .collect::<Vec<_>>()
            .join("\n"),
        Stage::Prose | Stage::Editorial => series
            .books
            .iter()
            .flat_map(|b| b.chapters.iter())
            .flat_map(|c| c.scenes.iter())
            .flat_map(|s| s.beats.iter())
            .filter_map(|b| b.prose.as_ref())
            .map(|p| p.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n"),
    }
}
