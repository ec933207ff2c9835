//! Series agent: expands the seed premise into a series outline and the
//! initial lore bible.

use crate::agents::{AgentContext, StageAgent, inapplicable};
use crate::document::update::{SeriesOutline, apply_series_outline};
use crate::document::ProjectDocument;
use crate::errors::GenerationError;
use crate::llm::{TextGenerator, parse_payload};
use crate::stage::Stage;
use async_trait::async_trait;
use std::sync::Arc;

const SYSTEM_PROMPT: &str = "You are a fiction series architect. Expand the given premise into \
a series outline: refined premise, target audience, themes, a style guide, and the initial \
lore bible (main characters, key locations, world elements with their rules). \
Respond with JSON only, matching this shape: {\"title\": \"..\", \"premise\": \"..\", \
\"genre\": \"..\", \"target_audience\": \"..\", \"themes\": [..], \"style_guide\": \"..\", \
\"characters\": [{\"name\": \"..\", \"role\": \"..\", \"description\": \"..\", \"traits\": [..], \
\"relationships\": [{\"name\": \"..\", \"kind\": \"..\"}]}], \
\"locations\": [{\"name\": \"..\", \"description\": \"..\", \"significance\": \"..\"}], \
\"world_elements\": [{\"name\": \"..\", \"kind\": \"..\", \"description\": \"..\", \"rules\": [..]}]}";

pub struct SeriesAgent {
    generator: Arc<dyn TextGenerator>,
}

impl SeriesAgent {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl StageAgent for SeriesAgent {
    fn stage(&self) -> Stage {
        Stage::Series
    }

    async fn process(
        &self,
        doc: &ProjectDocument,
        ctx: &AgentContext,
    ) -> Result<ProjectDocument, GenerationError> {
        let prompt = format!(
            "Title: {}\nPremise: {}\nGenre: {}{}",
            doc.series.title,
            doc.series.premise,
            doc.series.genre,
            ctx.render()
        );
        let response = self.generator.generate(SYSTEM_PROMPT, &prompt).await?;
        let outline: SeriesOutline = parse_payload(&response)?;

        let mut next = doc.clone();
        apply_series_outline(&mut next, outline).map_err(inapplicable)?;
        next.push_revision(
            "series",
            "series",
            "generated series outline and initial lore",
            "",
        );
        next.touch("series");
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lore::LoreKind;

    struct Canned(String);

    #[async_trait]
    impl TextGenerator for Canned {
        async fn generate(&self, _system: &str, _user: &str) -> Result<String, GenerationError> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn outline_is_applied_and_lore_seeded() {
        let response = r#"```json
{
  "premise": "A crew steals moments out of frozen time.",
  "target_audience": "adult",
  "themes": ["trust", "cost of memory"],
  "style_guide": "Close third person, noir register.",
  "characters": [{"name": "Vesper", "role": "protagonist", "description": "A thief."}],
  "locations": [{"name": "Meridian Station", "description": "A rim station.", "significance": "home port"}],
  "world_elements": []
}
```"#;
        let agent = SeriesAgent::new(Arc::new(Canned(response.to_string())));
        let doc = ProjectDocument::from_seed("p1", "The Quantum Heist", "A heist.", "sf");
        let next = agent.process(&doc, &AgentContext::default()).await.unwrap();

        assert_eq!(next.series.premise, "A crew steals moments out of frozen time.");
        assert!(next.series.lore.contains(LoreKind::Character, "Vesper"));
        assert!(next.series.lore.contains(LoreKind::Location, "meridian station"));
        assert_eq!(next.revision_entries.len(), 1);
        // input document untouched
        assert!(doc.series.lore.is_empty());
    }

    #[tokio::test]
    async fn prose_only_response_is_malformed_output() {
        let agent = SeriesAgent::new(Arc::new(Canned("A grand tale of...".to_string())));
        let doc = ProjectDocument::from_seed("p1", "T", "P", "g");
        let err = agent.process(&doc, &AgentContext::default()).await.unwrap_err();
        assert!(matches!(err, GenerationError::MalformedOutput(_)));
    }
}
