//! Beat agent: breaks every scene into its beats.

use crate::agents::{AgentContext, StageAgent, inapplicable};
use crate::document::update::{BeatBreakdown, apply_beat_breakdown};
use crate::document::ProjectDocument;
use crate::errors::GenerationError;
use crate::llm::{TextGenerator, parse_payload};
use crate::stage::Stage;
use async_trait::async_trait;
use std::sync::Arc;

const SYSTEM_PROMPT: &str = "You are a novelist breaking a scene into beats, the smallest units \
of narrative movement. Each beat needs a number, a one-or-two sentence description of what \
happens, its emotional tone, and the character actions it contains. \
Respond with JSON only: {\"beats\": [{\"number\": 1, \"description\": \"..\", \
\"emotional_tone\": \"..\", \"character_actions\": [..]}]}";

pub struct BeatAgent {
    generator: Arc<dyn TextGenerator>,
}

impl BeatAgent {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl StageAgent for BeatAgent {
    fn stage(&self) -> Stage {
        Stage::Beat
    }

    async fn process(
        &self,
        doc: &ProjectDocument,
        ctx: &AgentContext,
    ) -> Result<ProjectDocument, GenerationError> {
        let mut next = doc.clone();
        let keys: Vec<(u32, u32, u32)> = doc
            .series
            .books
            .iter()
            .flat_map(|b| {
                b.chapters.iter().flat_map(move |c| {
                    c.scenes.iter().map(move |s| (b.number, c.number, s.number))
                })
            })
            .collect();

        for (book_number, chapter_number, scene_number) in keys {
            let scene = doc
                .series
                .books
                .iter()
                .find(|b| b.number == book_number)
                .and_then(|b| b.chapters.iter().find(|c| c.number == chapter_number))
                .and_then(|c| c.scenes.iter().find(|s| s.number == scene_number))
                .expect("scene from same document");
            let prompt = format!(
                "Scene {}: {}\nPOV: {}\nSetting: {}\nConflict: {}\nTurning points: {}{}",
                scene.number,
                scene.purpose,
                scene.pov,
                scene.setting.location,
                scene.conflict,
                scene.turning_points.join("; "),
                ctx.render()
            );
            let response = self.generator.generate(SYSTEM_PROMPT, &prompt).await?;
            let breakdown: BeatBreakdown = parse_payload(&response)?;
            if breakdown.beats.is_empty() {
                return Err(GenerationError::MalformedOutput(format!(
                    "beat breakdown for scene {scene_number} contained no beats"
                )));
            }
            apply_beat_breakdown(&mut next, book_number, chapter_number, scene_number, breakdown)
                .map_err(inapplicable)?;
        }

        next.push_revision("beat", "series.books", "broke scenes into beats", "");
        next.touch("beat");
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::tests_support::doc_with_beats;

    struct Canned(String);

    #[async_trait]
    impl TextGenerator for Canned {
        async fn generate(&self, _system: &str, _user: &str) -> Result<String, GenerationError> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn beats_replace_the_scene_breakdown() {
        let response = r#"{"beats": [
            {"number": 1, "description": "Vesper cases the room.", "emotional_tone": "wary"},
            {"number": 2, "description": "The fence names a price.", "emotional_tone": "tense"}
        ]}"#;
        let agent = BeatAgent::new(Arc::new(Canned(response.to_string())));
        let next = agent
            .process(&doc_with_beats(1), &AgentContext::default())
            .await
            .unwrap();

        let beats = &next.series.books[0].chapters[0].scenes[0].beats;
        assert_eq!(beats.len(), 2);
        assert_eq!(beats[0].description, "Vesper cases the room.");
        assert_eq!(beats[1].emotional_tone, "tense");
    }

    #[tokio::test]
    async fn empty_beat_list_is_rejected() {
        let agent = BeatAgent::new(Arc::new(Canned(r#"{"beats": []}"#.to_string())));
        let err = agent
            .process(&doc_with_beats(1), &AgentContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::MalformedOutput(_)));
    }
}
