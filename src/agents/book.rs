//! Book agent: turns the series outline into per-book outlines with act
//! structures and character arcs.

use crate::agents::{AgentContext, StageAgent, inapplicable};
use crate::document::update::{BookOutline, apply_book_outline};
use crate::document::ProjectDocument;
use crate::errors::GenerationError;
use crate::llm::{TextGenerator, parse_payload};
use crate::stage::Stage;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

const SYSTEM_PROMPT: &str = "You are a novelist planning the books of a series. For each book \
produce a premise, a target word count, a three-act structure with key events and an ending \
hook per act, and the character arcs it carries. \
Respond with JSON only: {\"books\": [{\"number\": 1, \"title\": \"..\", \"premise\": \"..\", \
\"target_word_count\": 90000, \"act_structure\": [{\"act\": 1, \"summary\": \"..\", \
\"key_events\": [..], \"ending_hook\": \"..\"}], \"character_arcs\": [{\"character_name\": \"..\", \
\"starting_state\": \"..\", \"ending_state\": \"..\", \"transformation\": \"..\"}]}]}";

#[derive(Deserialize)]
struct BooksPayload {
    books: Vec<BookOutline>,
}

pub struct BookAgent {
    generator: Arc<dyn TextGenerator>,
}

impl BookAgent {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl StageAgent for BookAgent {
    fn stage(&self) -> Stage {
        Stage::Book
    }

    async fn process(
        &self,
        doc: &ProjectDocument,
        ctx: &AgentContext,
    ) -> Result<ProjectDocument, GenerationError> {
        let prompt = format!(
            "Series: {} ({})\nPremise: {}\nThemes: {}\nStyle: {}{}",
            doc.series.title,
            doc.series.genre,
            doc.series.premise,
            doc.series.themes.join(", "),
            doc.series.style_guide,
            ctx.render()
        );
        let response = self.generator.generate(SYSTEM_PROMPT, &prompt).await?;
        let payload: BooksPayload = parse_payload(&response)?;
        if payload.books.is_empty() {
            return Err(GenerationError::MalformedOutput(
                "book outline payload contained no books".to_string(),
            ));
        }

        let mut next = doc.clone();
        let count = payload.books.len();
        for outline in payload.books {
            apply_book_outline(&mut next, outline).map_err(inapplicable)?;
        }
        next.push_revision("book", "series.books", &format!("outlined {count} book(s)"), "");
        next.touch("book");
        Ok(next)
    }
}
