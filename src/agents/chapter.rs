//! Chapter agent: plans the chapters of each book.

use crate::agents::{AgentContext, StageAgent, inapplicable};
use crate::document::update::{ChapterPlan, apply_chapter_plans};
use crate::document::ProjectDocument;
use crate::errors::GenerationError;
use crate::llm::{TextGenerator, parse_payload};
use crate::stage::Stage;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

const SYSTEM_PROMPT: &str = "You are a novelist breaking a book into chapters. Each chapter \
needs a number, title, the act it belongs to, its narrative purpose, the plot points it \
advances, a POV character, and a setting. \
Respond with JSON only: {\"chapters\": [{\"number\": 1, \"title\": \"..\", \"act\": 1, \
\"purpose\": \"..\", \"plot_points\": [..], \"pov\": \"..\", \
\"setting\": {\"location\": \"..\", \"time\": \"..\", \"atmosphere\": \"..\"}}]}";

#[derive(Deserialize)]
struct ChaptersPayload {
    chapters: Vec<ChapterPlan>,
}

pub struct ChapterAgent {
    generator: Arc<dyn TextGenerator>,
}

impl ChapterAgent {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl StageAgent for ChapterAgent {
    fn stage(&self) -> Stage {
        Stage::Chapter
    }

    async fn process(
        &self,
        doc: &ProjectDocument,
        ctx: &AgentContext,
    ) -> Result<ProjectDocument, GenerationError> {
        let mut next = doc.clone();
        let book_numbers: Vec<u32> = doc.series.books.iter().map(|b| b.number).collect();

        for number in book_numbers {
            let book = doc
                .series
                .books
                .iter()
                .find(|b| b.number == number)
                .expect("book number from same document");
            let acts = book
                .act_structure
                .iter()
                .map(|a| format!("Act {}: {}", a.act, a.summary))
                .collect::<Vec<_>>()
                .join("\n");
            let prompt = format!(
                "Series: {}\nBook {}: {}\nPremise: {}\nAct structure:\n{}{}",
                doc.series.title,
                book.number,
                book.title,
                book.premise,
                acts,
                ctx.render()
            );
            let response = self.generator.generate(SYSTEM_PROMPT, &prompt).await?;
            let payload: ChaptersPayload = parse_payload(&response)?;
            if payload.chapters.is_empty() {
                return Err(GenerationError::MalformedOutput(format!(
                    "chapter plan for book {number} contained no chapters"
                )));
            }
            apply_chapter_plans(&mut next, number, payload.chapters).map_err(inapplicable)?;
        }

        next.push_revision("chapter", "series.books", "planned chapters", "");
        next.touch("chapter");
        Ok(next)
    }
}
