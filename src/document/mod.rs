//! The strongly-typed project document: a single root aggregate holding the
//! series tree (book → chapter → scene → beat), the lore collection, and the
//! append-only quality-report and revision logs.
//!
//! Ownership rule: the orchestrator exclusively owns the document while a
//! stage executes; between stages it lives with the checkpoint manager.
//! The processing-stage marker is advanced only through
//! [`ProjectDocument::mark_stage_approved`], which is crate-private so no
//! agent can move it.

pub mod schema;
pub mod update;

use crate::lore::Lore;
use crate::stage::Stage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Version tag written into every persisted document.
pub const SCHEMA_VERSION: &str = "1.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Draft,
    InReview,
    Approved,
    NeedsRevision,
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ApprovalStatus::Draft => "draft",
            ApprovalStatus::InReview => "in_review",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::NeedsRevision => "needs_revision",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub project_id: String,
    pub processing_stage: Stage,
    pub status: ApprovalStatus,
    pub revision: u32,
    pub last_updated: DateTime<Utc>,
    pub last_updated_by: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Setting {
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub time: String,
    #[serde(default)]
    pub atmosphere: String,
}

/// One act of a book's structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActSummary {
    pub act: u32,
    pub summary: String,
    #[serde(default)]
    pub key_events: Vec<String>,
    #[serde(default)]
    pub ending_hook: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterArc {
    pub character_name: String,
    pub starting_state: String,
    pub ending_state: String,
    #[serde(default)]
    pub transformation: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParagraphKind {
    Narrative,
    Dialogue,
    Description,
    Action,
    InternalMonologue,
    Mixed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paragraph {
    pub number: u32,
    pub kind: ParagraphKind,
    pub content: String,
    pub word_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProseStatus {
    Draft,
    Revised,
    Final,
}

/// Generated prose for one beat. `draft_version` increases strictly
/// monotonically; `revise` is the only mutator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prose {
    pub draft_version: u32,
    pub content: String,
    #[serde(default)]
    pub paragraphs: Vec<Paragraph>,
    pub word_count: u32,
    pub status: ProseStatus,
}

impl Prose {
    pub fn new(content: String, paragraphs: Vec<Paragraph>) -> Self {
        let word_count = count_words(&content);
        Self {
            draft_version: 1,
            content,
            paragraphs,
            word_count,
            status: ProseStatus::Draft,
        }
    }

    /// Replace the text and bump the draft version.
    pub fn revise(&mut self, content: String, paragraphs: Vec<Paragraph>, status: ProseStatus) {
        self.word_count = count_words(&content);
        self.content = content;
        self.paragraphs = paragraphs;
        self.draft_version += 1;
        self.status = status;
    }
}

/// Smallest addressable narrative unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Beat {
    pub number: u32,
    pub description: String,
    #[serde(default)]
    pub emotional_tone: String,
    #[serde(default)]
    pub character_actions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prose: Option<Prose>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub number: u32,
    #[serde(default)]
    pub title: String,
    pub purpose: String,
    pub pov: String,
    #[serde(default)]
    pub setting: Setting,
    #[serde(default)]
    pub characters_present: Vec<String>,
    #[serde(default)]
    pub conflict: String,
    #[serde(default)]
    pub turning_points: Vec<String>,
    #[serde(default)]
    pub beats: Vec<Beat>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    pub number: u32,
    #[serde(default)]
    pub title: String,
    pub act: u32,
    pub purpose: String,
    #[serde(default)]
    pub plot_points: Vec<String>,
    pub pov: String,
    #[serde(default)]
    pub setting: Setting,
    #[serde(default)]
    pub scenes: Vec<Scene>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    pub number: u32,
    #[serde(default)]
    pub title: String,
    pub premise: String,
    #[serde(default)]
    pub target_word_count: u32,
    #[serde(default)]
    pub act_structure: Vec<ActSummary>,
    #[serde(default)]
    pub character_arcs: Vec<CharacterArc>,
    #[serde(default)]
    pub chapters: Vec<Chapter>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub title: String,
    pub premise: String,
    pub genre: String,
    #[serde(default)]
    pub target_audience: String,
    #[serde(default)]
    pub themes: Vec<String>,
    #[serde(default)]
    pub style_guide: String,
    #[serde(default)]
    pub lore: Lore,
    #[serde(default)]
    pub books: Vec<Book>,
}

/// 1-10 scores produced by the craft review.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewScores {
    pub structure: u8,
    pub pacing: u8,
    pub character_arcs: u8,
    pub theme_integration: u8,
    pub consistency: u8,
    pub overall: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Approved,
    NeedsRevision,
}

impl Verdict {
    pub fn is_approved(self) -> bool {
        matches!(self, Verdict::Approved)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Verdict::Approved => "approved",
            Verdict::NeedsRevision => "needs_revision",
        };
        f.write_str(s)
    }
}

/// Immutable record of one gate pass. Appended to the document by the
/// quality gate, never mutated afterward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub scope: Stage,
    pub target: String,
    pub reviewer: String,
    pub attempt: u32,
    pub scores: ReviewScores,
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default)]
    pub required_fixes: Vec<String>,
    pub verdict: Verdict,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevisionEntry {
    pub timestamp: DateTime<Utc>,
    pub agent: String,
    pub scope: String,
    pub summary: String,
    #[serde(default)]
    pub reason: String,
}

/// The root aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectDocument {
    pub schema_version: String,
    pub metadata: Metadata,
    pub series: Series,
    #[serde(default)]
    pub quality_reports: Vec<QualityReport>,
    #[serde(default)]
    pub revision_entries: Vec<RevisionEntry>,
}

impl ProjectDocument {
    /// Create a fresh document from a minimal seed. The marker starts at
    /// the series stage in draft status: nothing is complete yet.
    pub fn from_seed(project_id: &str, title: &str, premise: &str, genre: &str) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            metadata: Metadata {
                project_id: project_id.to_string(),
                processing_stage: Stage::Series,
                status: ApprovalStatus::Draft,
                revision: 0,
                last_updated: Utc::now(),
                last_updated_by: "seed".to_string(),
            },
            series: Series {
                title: title.to_string(),
                premise: premise.to_string(),
                genre: genre.to_string(),
                target_audience: String::new(),
                themes: Vec::new(),
                style_guide: String::new(),
                lore: Lore::default(),
                books: Vec::new(),
            },
            quality_reports: Vec::new(),
            revision_entries: Vec::new(),
        }
    }

    /// The first stage whose output has not been gate-approved, or `None`
    /// when the pipeline is complete. The marker names the last approved
    /// stage once its status is `Approved`; before that it names the stage
    /// currently owed work.
    pub fn next_unfinished(&self) -> Option<Stage> {
        if self.metadata.status == ApprovalStatus::Approved {
            self.metadata.processing_stage.next()
        } else {
            Some(self.metadata.processing_stage)
        }
    }

    /// Advance the marker after gate approval. Crate-private: the
    /// orchestrator is the only caller.
    pub(crate) fn mark_stage_approved(&mut self, stage: Stage) {
        self.metadata.processing_stage = stage;
        self.metadata.status = ApprovalStatus::Approved;
        self.touch("orchestrator");
    }

    /// Rewind for an explicit resume-from-earlier request. The sole
    /// sanctioned marker regression.
    pub(crate) fn rewind_to(&mut self, stage: Stage) {
        self.metadata.processing_stage = stage;
        self.metadata.status = ApprovalStatus::Draft;
        self.touch("orchestrator");
    }

    pub fn touch(&mut self, agent: &str) {
        self.metadata.last_updated = Utc::now();
        self.metadata.last_updated_by = agent.to_string();
    }

    pub fn push_report(&mut self, report: QualityReport) {
        self.quality_reports.push(report);
    }

    pub fn push_revision(&mut self, agent: &str, scope: &str, summary: &str, reason: &str) {
        self.revision_entries.push(RevisionEntry {
            timestamp: Utc::now(),
            agent: agent.to_string(),
            scope: scope.to_string(),
            summary: summary.to_string(),
            reason: reason.to_string(),
        });
    }

    /// Reports for one stage, in append order, addressable by index.
    pub fn reports_for(&self, stage: Stage) -> Vec<&QualityReport> {
        self.quality_reports
            .iter()
            .filter(|r| r.scope == stage)
            .collect()
    }
}

pub fn count_words(text: &str) -> u32 {
    text.split_whitespace().count() as u32
}
