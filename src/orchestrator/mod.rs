//! The stage orchestrator: the only component that moves a project through
//! the ladder.
//!
//! Each stage is one unit of work: the stage's agent drafts a candidate
//! document, the quality gate reviews it, and only an approved candidate is
//! checkpointed and allowed to advance the marker. A rejected candidate's
//! quality reports and any formalized lore are kept; its content changes
//! are discarded and the agent retries with the latest feedback, up to the
//! attempt budget.

use crate::agents::{AgentContext, StageAgent};
use crate::checkpoint::CheckpointManager;
use crate::document::ProjectDocument;
use crate::errors::{CheckpointError, GenerationError, PipelineError, ValidationError};
use crate::gate::{QualityGate, ReviewFeedback};
use crate::lore::LoreStore;
use crate::stage::Stage;
use anyhow::anyhow;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{error, info, warn};

/// The minimal input a fresh project starts from.
#[derive(Debug, Clone)]
pub struct Seed {
    pub title: String,
    pub premise: String,
    pub genre: String,
}

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Continue from the latest checkpoint instead of seeding fresh.
    pub resume: bool,
    /// Rewind the marker before running. The only sanctioned regression.
    pub from_stage: Option<Stage>,
    /// Stop after this many stage completions (for stepwise runs).
    pub max_stages: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct RunSettings {
    /// Attempts per stage before the run halts.
    pub max_attempts: u32,
    /// Wall-clock bound on one agent invocation.
    pub stage_timeout: Duration,
    /// How many lore entries each agent sees.
    pub lore_top_k: usize,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            stage_timeout: Duration::from_secs(600),
            lore_top_k: 10,
        }
    }
}

pub struct Pipeline {
    project_id: String,
    agents: HashMap<Stage, Arc<dyn StageAgent>>,
    gate: QualityGate,
    checkpoints: CheckpointManager,
    lore: Arc<LoreStore>,
    settings: RunSettings,
    cancel: watch::Receiver<bool>,
}

impl Pipeline {
    pub fn new(
        project_id: &str,
        agents: HashMap<Stage, Arc<dyn StageAgent>>,
        gate: QualityGate,
        checkpoints: CheckpointManager,
        lore: Arc<LoreStore>,
    ) -> Self {
        let (_tx, rx) = watch::channel(false);
        Self {
            project_id: project_id.to_string(),
            agents,
            gate,
            checkpoints,
            lore,
            settings: RunSettings::default(),
            cancel: rx,
        }
    }

    pub fn with_settings(mut self, settings: RunSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Wire an external cancellation signal. Observed between stages only;
    /// a stage in flight finishes or fails as a whole.
    pub fn with_cancel(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run the pipeline to completion (or to `max_stages`). Returns the
    /// final document; on failure the project remains resumable from its
    /// last approved checkpoint.
    pub async fn run(
        &self,
        seed: Option<Seed>,
        options: RunOptions,
    ) -> Result<ProjectDocument, PipelineError> {
        let _lock = self
            .checkpoints
            .acquire_run_lock(&self.project_id)
            .map_err(|e| match e {
                CheckpointError::Locked { project_id } => {
                    PipelineError::ConcurrencyConflict { project_id }
                }
                other => PipelineError::Checkpoint(other),
            })?;

        let mut doc = if options.resume {
            let doc = self.checkpoints.load_latest(&self.project_id)?;
            info!(
                project_id = %self.project_id,
                stage = %doc.metadata.processing_stage,
                status = %doc.metadata.status,
                "resuming from latest checkpoint"
            );
            doc
        } else {
            let seed = seed.ok_or_else(|| {
                PipelineError::Other(anyhow!("a fresh run needs a seed (title, premise, genre)"))
            })?;
            info!(project_id = %self.project_id, title = %seed.title, "starting fresh project");
            ProjectDocument::from_seed(&self.project_id, &seed.title, &seed.premise, &seed.genre)
        };

        if let Some(stage) = options.from_stage {
            // Rewinding is the only sanctioned marker move outside the gate;
            // starting past the first unfinished stage would skip work.
            let first_unfinished = doc.next_unfinished().unwrap_or(Stage::Editorial);
            if stage > first_unfinished {
                return Err(PipelineError::Validation(ValidationError::new(
                    "from_stage",
                    format!("cannot skip ahead to {stage}; the next unfinished stage is {first_unfinished}"),
                )));
            }
            info!(project_id = %self.project_id, stage = %stage, "rewinding marker");
            doc.rewind_to(stage);
        }

        // hydrate the store so similarity queries see checkpointed lore
        if !doc.series.lore.is_empty() {
            self.lore
                .store(&doc.series.lore.entries())
                .await
                .map_err(PipelineError::Other)?;
        }

        let mut stages_run = 0usize;
        while let Some(stage) = doc.next_unfinished() {
            if *self.cancel.borrow() {
                warn!(project_id = %self.project_id, stage = %stage, "run cancelled");
                return Err(PipelineError::Cancelled { stage });
            }
            if let Some(max) = options.max_stages {
                if stages_run >= max {
                    info!(project_id = %self.project_id, stages_run, "stage budget reached");
                    break;
                }
            }
            self.run_stage(&mut doc, stage).await?;
            stages_run += 1;
        }

        if doc.next_unfinished().is_none() {
            info!(project_id = %self.project_id, "pipeline complete");
        }
        Ok(doc)
    }

    async fn run_stage(
        &self,
        doc: &mut ProjectDocument,
        stage: Stage,
    ) -> Result<(), PipelineError> {
        let agent = self
            .agents
            .get(&stage)
            .ok_or_else(|| PipelineError::Other(anyhow!("no agent registered for stage {stage}")))?;

        let mut feedback: Option<ReviewFeedback> = None;
        for attempt in 1..=self.settings.max_attempts {
            info!(project_id = %self.project_id, stage = %stage, attempt, "running stage attempt");

            let relevant_lore = self
                .lore
                .query(
                    &format!("{} {}", doc.series.title, doc.series.premise),
                    self.settings.lore_top_k,
                    None,
                )
                .await;
            let ctx = AgentContext {
                prior_feedback: feedback.take(),
                relevant_lore,
            };

            let generated = match timeout(self.settings.stage_timeout, agent.process(doc, &ctx))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(GenerationError::Timeout {
                    seconds: self.settings.stage_timeout.as_secs(),
                }),
            };

            let mut candidate = match generated {
                Ok(candidate) => candidate,
                Err(e) => {
                    warn!(project_id = %self.project_id, stage = %stage, attempt, error = %e, "agent attempt failed");
                    feedback = Some(ReviewFeedback {
                        issues: vec![e.to_string()],
                        required_fixes: vec![],
                        notes: String::new(),
                    });
                    continue;
                }
            };

            let outcome = match self
                .gate
                .review(&mut candidate, stage, attempt, &self.lore)
                .await
            {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(project_id = %self.project_id, stage = %stage, attempt, error = %e, "gate review failed");
                    feedback = Some(ReviewFeedback {
                        issues: vec![e.to_string()],
                        required_fixes: vec![],
                        notes: String::new(),
                    });
                    continue;
                }
            };

            if outcome.approved {
                candidate.mark_stage_approved(stage);
                candidate.metadata.revision += 1;
                self.checkpoints.save(&candidate)?;
                *doc = candidate;
                info!(project_id = %self.project_id, stage = %stage, attempt, "stage approved and checkpointed");
                return Ok(());
            }

            // Keep what the rejected attempt taught us: its reports and any
            // formalized lore. The content changes are discarded.
            doc.quality_reports = candidate.quality_reports.clone();
            for entry in candidate.series.lore.entries() {
                doc.series.lore.upsert(entry);
            }
            warn!(
                project_id = %self.project_id,
                stage = %stage,
                attempt,
                issues = outcome.feedback.issues.len(),
                "stage attempt rejected by quality gate"
            );
            feedback = Some(outcome.feedback);
        }

        let feedback = feedback.unwrap_or_default();
        error!(
            project_id = %self.project_id,
            stage = %stage,
            attempts = self.settings.max_attempts,
            "retry budget exhausted, halting run"
        );
        Err(PipelineError::RetryBudgetExhausted {
            stage,
            attempts: self.settings.max_attempts,
            feedback,
        })
    }
}

/// Human-readable rendering of a halted run, for the CLI.
pub struct FailureReport<'a> {
    pub stage: Stage,
    pub attempts: u32,
    pub feedback: &'a ReviewFeedback,
}

impl<'a> FailureReport<'a> {
    pub fn from_error(err: &'a PipelineError) -> Option<Self> {
        match err {
            PipelineError::RetryBudgetExhausted {
                stage,
                attempts,
                feedback,
            } => Some(Self {
                stage: *stage,
                attempts: *attempts,
                feedback,
            }),
            _ => None,
        }
    }
}

impl fmt::Display for FailureReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "stage {} failed after {} attempt(s)",
            self.stage, self.attempts
        )?;
        for issue in &self.feedback.issues {
            writeln!(f, "  issue: {issue}")?;
        }
        for fix in &self.feedback.required_fixes {
            writeln!(f, "  fix: {fix}")?;
        }
        if !self.feedback.notes.trim().is_empty() {
            writeln!(f, "  notes: {}", self.feedback.notes)?;
        }
        Ok(())
    }
}
