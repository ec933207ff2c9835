//! Per-stage generation agents.
//!
//! An agent takes the current document plus an [`AgentContext`] (relevant
//! lore and, on retries, the previous attempt's review feedback) and returns
//! a candidate document. Agents never checkpoint and never write to the
//! lore store; their only effect is the returned value. The orchestrator
//! decides what happens to it.

mod beat;
mod book;
mod chapter;
mod editorial;
mod prose;
mod scene;
mod series;

#[cfg(test)]
pub(crate) use prose::tests_support;

pub use beat::BeatAgent;
pub use book::BookAgent;
pub use chapter::ChapterAgent;
pub use editorial::EditorialAgent;
pub use prose::ProseAgent;
pub use scene::SceneAgent;
pub use series::SeriesAgent;

use crate::document::ProjectDocument;
use crate::errors::GenerationError;
use crate::gate::ReviewFeedback;
use crate::llm::TextGenerator;
use crate::lore::ScoredLore;
use crate::stage::Stage;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// What an agent knows beyond the document itself.
#[derive(Default)]
pub struct AgentContext {
    /// Feedback from the immediately preceding rejected attempt. Only the
    /// latest attempt's feedback is carried.
    pub prior_feedback: Option<ReviewFeedback>,
    /// Lore relevant to the content being generated, most similar first.
    pub relevant_lore: Vec<ScoredLore>,
}

impl AgentContext {
    /// Shared prompt suffix: established lore, then feedback to address.
    pub fn render(&self) -> String {
        let mut out = String::new();
        if !self.relevant_lore.is_empty() {
            out.push_str("\n\nEstablished lore (do not contradict):\n");
            for scored in &self.relevant_lore {
                out.push_str(&scored.entry.render());
                out.push_str("\n\n");
            }
        }
        if let Some(feedback) = &self.prior_feedback {
            if !feedback.is_empty() {
                out.push_str("\nYour previous attempt was rejected. Address this feedback:\n");
                out.push_str(&feedback.render());
            }
        }
        out
    }
}

/// One stage's generation step.
#[async_trait]
pub trait StageAgent: Send + Sync {
    fn stage(&self) -> Stage;

    /// Produce a candidate document for this agent's stage. Must not
    /// mutate anything outside the returned value.
    async fn process(
        &self,
        doc: &ProjectDocument,
        ctx: &AgentContext,
    ) -> Result<ProjectDocument, GenerationError>;
}

/// Build the standard agent set, one per stage, each with its own
/// generator (model and temperature come from per-role config).
pub fn default_agents<F>(generator_for: F) -> HashMap<Stage, Arc<dyn StageAgent>>
where
    F: Fn(Stage) -> Arc<dyn TextGenerator>,
{
    let mut agents: HashMap<Stage, Arc<dyn StageAgent>> = HashMap::new();
    agents.insert(
        Stage::Series,
        Arc::new(SeriesAgent::new(generator_for(Stage::Series))),
    );
    agents.insert(
        Stage::Book,
        Arc::new(BookAgent::new(generator_for(Stage::Book))),
    );
    agents.insert(
        Stage::Chapter,
        Arc::new(ChapterAgent::new(generator_for(Stage::Chapter))),
    );
    agents.insert(
        Stage::Scene,
        Arc::new(SceneAgent::new(generator_for(Stage::Scene))),
    );
    agents.insert(
        Stage::Beat,
        Arc::new(BeatAgent::new(generator_for(Stage::Beat))),
    );
    agents.insert(
        Stage::Prose,
        Arc::new(ProseAgent::new(generator_for(Stage::Prose))),
    );
    agents.insert(
        Stage::Editorial,
        Arc::new(EditorialAgent::new(generator_for(Stage::Editorial))),
    );
    agents
}

/// Structurally inapplicable model output is a malformed-output failure,
/// retryable like any other generation error.
pub(crate) fn inapplicable(err: crate::errors::ValidationError) -> GenerationError {
    GenerationError::MalformedOutput(format!("generated payload does not fit the document: {err}"))
}
