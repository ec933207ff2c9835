//! Prose agent: drafts the text of every beat, in order, carrying a bounded
//! window of the immediately preceding prose so consecutive beats read as
//! one continuous scene.

use crate::agents::{AgentContext, StageAgent, inapplicable};
use crate::document::update::{BeatProse, apply_beat_prose};
use crate::document::ProjectDocument;
use crate::errors::GenerationError;
use crate::llm::{TextGenerator, parse_payload};
use crate::stage::Stage;
use async_trait::async_trait;
use std::sync::Arc;

const SYSTEM_PROMPT: &str = "You are a novelist drafting prose for one beat of a scene. Write \
vivid, publishable prose that covers exactly this beat, continuous with the preceding text. \
Respond with JSON only: {\"content\": \"the full prose\", \"paragraphs\": [{\"kind\": \
\"narrative\" | \"dialogue\" | \"description\" | \"action\" | \"internal_monologue\" | \"mixed\", \
\"content\": \"..\"}]}";

/// Upper bound on the continuity window carried between beats.
const CONTINUITY_WINDOW_CHARS: usize = 2000;

pub struct ProseAgent {
    generator: Arc<dyn TextGenerator>,
}

impl ProseAgent {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl StageAgent for ProseAgent {
    fn stage(&self) -> Stage {
        Stage::Prose
    }

    async fn process(
        &self,
        doc: &ProjectDocument,
        ctx: &AgentContext,
    ) -> Result<ProjectDocument, GenerationError> {
        let mut next = doc.clone();
        let keys: Vec<(u32, u32, u32, u32)> = doc
            .series
            .books
            .iter()
            .flat_map(|b| {
                b.chapters.iter().flat_map(move |c| {
                    c.scenes.iter().flat_map(move |s| {
                        s.beats
                            .iter()
                            .map(move |beat| (b.number, c.number, s.number, beat.number))
                    })
                })
            })
            .collect();

        // Sequential on purpose: each beat's prompt carries the tail of the
        // prose drafted so far.
        let mut window = String::new();
        for (book_number, chapter_number, scene_number, beat_number) in keys {
            let beat = doc
                .series
                .books
                .iter()
                .find(|b| b.number == book_number)
                .and_then(|b| b.chapters.iter().find(|c| c.number == chapter_number))
                .and_then(|c| c.scenes.iter().find(|s| s.number == scene_number))
                .and_then(|s| s.beats.iter().find(|be| be.number == beat_number))
                .expect("beat from same document");

            let continuity = if window.is_empty() {
                String::new()
            } else {
                format!("\n\nPreceding prose (continue from here):\n{window}")
            };
            let prompt = format!(
                "Style guide: {}\nBeat {}: {}\nEmotional tone: {}\nCharacter actions: {}{}{}",
                doc.series.style_guide,
                beat.number,
                beat.description,
                beat.emotional_tone,
                beat.character_actions.join("; "),
                continuity,
                ctx.render()
            );
            let response = self.generator.generate(SYSTEM_PROMPT, &prompt).await?;
            let draft: BeatProse = parse_payload(&response)?;
            if draft.content.trim().is_empty() && draft.paragraphs.is_empty() {
                return Err(GenerationError::MalformedOutput(format!(
                    "prose for beat {beat_number} was empty"
                )));
            }

            apply_beat_prose(
                &mut next,
                book_number,
                chapter_number,
                scene_number,
                beat_number,
                draft,
            )
            .map_err(inapplicable)?;

            let written = next
                .series
                .books
                .iter()
                .find(|b| b.number == book_number)
                .and_then(|b| b.chapters.iter().find(|c| c.number == chapter_number))
                .and_then(|c| c.scenes.iter().find(|s| s.number == scene_number))
                .and_then(|s| s.beats.iter().find(|be| be.number == beat_number))
                .and_then(|be| be.prose.as_ref())
                .map(|p| p.content.as_str())
                .unwrap_or_default();
            window = tail(written, CONTINUITY_WINDOW_CHARS).to_string();
        }

        next.push_revision("prose", "series.books", "drafted beat prose", "");
        next.touch("prose");
        Ok(next)
    }
}

fn tail(text: &str, max_chars: usize) -> &str {
    let count = text.chars().count();
    if count <= max_chars {
        return text;
    }
    let skip = count - max_chars;
    let (idx, _) = text.char_indices().nth(skip).expect("skip < char count");
    &text[idx..]
}

/// Test-only document builder shared by the prose and editorial agent tests.
#[cfg(test)]
pub(crate) mod tests_support {
    use crate::document::update::{
        BeatBreakdown, BeatPlan, BookOutline, ChapterPlan, ScenePlan, apply_beat_breakdown,
        apply_book_outline, apply_chapter_plans, apply_scene_plans,
    };
    use crate::document::{ActSummary, ProjectDocument, Setting};

    pub(crate) fn doc_with_beats(beat_count: u32) -> ProjectDocument {
        let mut doc = ProjectDocument::from_seed("p1", "T", "P", "g");
        apply_book_outline(
            &mut doc,
            BookOutline {
                number: 1,
                title: "B".to_string(),
                premise: "p".to_string(),
                target_word_count: 0,
                act_structure: vec![ActSummary {
                    act: 1,
                    summary: "s".to_string(),
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
            vec![ChapterPlan {
                number: 1,
                title: String::new(),
                act: 1,
                purpose: "p".to_string(),
                plot_points: vec![],
                pov: "V".to_string(),
                setting: Setting::default(),
            }],
        )
        .unwrap();
        apply_scene_plans(
            &mut doc,
            1,
            1,
            vec![ScenePlan {
                number: 1,
                title: String::new(),
                purpose: "p".to_string(),
                pov: "V".to_string(),
                setting: Setting::default(),
                characters_present: vec![],
                conflict: String::new(),
                turning_points: vec![],
            }],
        )
        .unwrap();
        apply_beat_breakdown(
            &mut doc,
            1,
            1,
            1,
            BeatBreakdown {
                beats: (1..=beat_count)
                    .map(|n| BeatPlan {
                        number: n,
                        description: format!("Beat {n}."),
                        emotional_tone: String::new(),
                        character_actions: vec![],
                    })
                    .collect(),
            },
        )
        .unwrap();
        doc
    }
}
