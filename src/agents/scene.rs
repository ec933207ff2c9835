//! Scene agent: plans the scenes of every chapter.

use crate::agents::{AgentContext, StageAgent, inapplicable};
use crate::document::update::{ScenePlan, apply_scene_plans};
use crate::document::ProjectDocument;
use crate::errors::GenerationError;
use crate::llm::{TextGenerator, parse_payload};
use crate::stage::Stage;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

const SYSTEM_PROMPT: &str = "You are a novelist breaking a chapter into scenes. Each scene \
needs a number, purpose, POV character, setting, the characters present, its central conflict, \
and turning points. \
Respond with JSON only: {\"scenes\": [{\"number\": 1, \"title\": \"..\", \"purpose\": \"..\", \
\"pov\": \"..\", \"setting\": {\"location\": \"..\", \"time\": \"..\", \"atmosphere\": \"..\"}, \
\"characters_present\": [..], \"conflict\": \"..\", \"turning_points\": [..]}]}";

#[derive(Deserialize)]
struct ScenesPayload {
    scenes: Vec<ScenePlan>,
}

pub struct SceneAgent {
    generator: Arc<dyn TextGenerator>,
}

impl SceneAgent {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl StageAgent for SceneAgent {
    fn stage(&self) -> Stage {
        Stage::Scene
    }

    async fn process(
        &self,
        doc: &ProjectDocument,
        ctx: &AgentContext,
    ) -> Result<ProjectDocument, GenerationError> {
        let mut next = doc.clone();
        let keys: Vec<(u32, u32)> = doc
            .series
            .books
            .iter()
            .flat_map(|b| b.chapters.iter().map(move |c| (b.number, c.number)))
            .collect();

        for (book_number, chapter_number) in keys {
            let book = doc
                .series
                .books
                .iter()
                .find(|b| b.number == book_number)
                .expect("book from same document");
            let chapter = book
                .chapters
                .iter()
                .find(|c| c.number == chapter_number)
                .expect("chapter from same document");
            let prompt = format!(
                "Book {}: {}\nChapter {}: {}\nPurpose: {}\nPlot points: {}\nPOV: {}\nSetting: {}{}",
                book.number,
                book.title,
                chapter.number,
                chapter.title,
                chapter.purpose,
                chapter.plot_points.join("; "),
                chapter.pov,
                chapter.setting.location,
                ctx.render()
            );
            let response = self.generator.generate(SYSTEM_PROMPT, &prompt).await?;
            let payload: ScenesPayload = parse_payload(&response)?;
            if payload.scenes.is_empty() {
                return Err(GenerationError::MalformedOutput(format!(
                    "scene plan for chapter {chapter_number} contained no scenes"
                )));
            }
            apply_scene_plans(&mut next, book_number, chapter_number, payload.scenes)
                .map_err(inapplicable)?;
        }

        next.push_revision("scene", "series.books", "planned scenes", "");
        next.touch("scene");
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::update::{
        BookOutline, ChapterPlan, apply_book_outline, apply_chapter_plans,
    };
    use crate::document::{ActSummary, Setting};

    struct Canned(String);

    #[async_trait]
    impl TextGenerator for Canned {
        async fn generate(&self, _system: &str, _user: &str) -> Result<String, GenerationError> {
            Ok(self.0.clone())
        }
    }

    fn doc_with_chapters() -> ProjectDocument {
        let mut doc = ProjectDocument::from_seed("p1", "T", "P", "g");
        apply_book_outline(
            &mut doc,
            BookOutline {
                number: 1,
                title: "Book One".to_string(),
                premise: "The job.".to_string(),
                target_word_count: 0,
                act_structure: vec![ActSummary {
                    act: 1,
                    summary: "Setup.".to_string(),
                    key_events: vec![],
                    ending_hook: String::new(),
                }],
                character_arcs: vec![],
            },
        )
        .unwrap();
        apply_chapter_plans(
            &mut doc,
            1,
            vec![
                ChapterPlan {
                    number: 1,
                    title: "One".to_string(),
                    act: 1,
                    purpose: "Open.".to_string(),
                    plot_points: vec![],
                    pov: "Vesper".to_string(),
                    setting: Setting::default(),
                },
                ChapterPlan {
                    number: 2,
                    title: "Two".to_string(),
                    act: 1,
                    purpose: "Complicate.".to_string(),
                    plot_points: vec![],
                    pov: "Vesper".to_string(),
                    setting: Setting::default(),
                },
            ],
        )
        .unwrap();
        doc
    }

    #[tokio::test]
    async fn every_chapter_receives_scenes() {
        let response = r#"{"scenes": [
            {"number": 1, "purpose": "Meet.", "pov": "Vesper",
             "setting": {"location": "Dockside bar"}}
        ]}"#;
        let agent = SceneAgent::new(Arc::new(Canned(response.to_string())));
        let next = agent
            .process(&doc_with_chapters(), &AgentContext::default())
            .await
            .unwrap();
        for chapter in &next.series.books[0].chapters {
            assert_eq!(chapter.scenes.len(), 1);
        }
    }
}
