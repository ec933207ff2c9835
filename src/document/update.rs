//! Typed per-level update payloads and the functions that apply them to a
//! project document.
//!
//! Each stage agent parses model output into one of these payload structs,
//! then applies it here. The apply functions are the only write path into
//! the series tree below the metadata, so structural mistakes surface as
//! `ValidationError` with a field path instead of silently corrupting the
//! document.

use crate::document::{
    ActSummary, Beat, Book, Chapter, CharacterArc, Paragraph, ParagraphKind, ProjectDocument,
    Prose, ProseStatus, Scene, Setting, count_words,
};
use crate::errors::ValidationError;
use crate::lore::{Character, Location, WorldElement};
use serde::{Deserialize, Serialize};

/// Series-level outline: premise refinement, themes, style, and the initial
/// lore bible.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeriesOutline {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub premise: String,
    #[serde(default)]
    pub genre: String,
    #[serde(default)]
    pub target_audience: String,
    #[serde(default)]
    pub themes: Vec<String>,
    #[serde(default)]
    pub style_guide: String,
    #[serde(default)]
    pub characters: Vec<Character>,
    #[serde(default)]
    pub locations: Vec<Location>,
    #[serde(default)]
    pub world_elements: Vec<WorldElement>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookOutline {
    pub number: u32,
    pub title: String,
    pub premise: String,
    #[serde(default)]
    pub target_word_count: u32,
    #[serde(default)]
    pub act_structure: Vec<ActSummary>,
    #[serde(default)]
    pub character_arcs: Vec<CharacterArc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChapterPlan {
    pub number: u32,
    #[serde(default)]
    pub title: String,
    #[serde(default = "default_act")]
    pub act: u32,
    pub purpose: String,
    #[serde(default)]
    pub plot_points: Vec<String>,
    pub pov: String,
    #[serde(default)]
    pub setting: Setting,
}

fn default_act() -> u32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenePlan {
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
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeatPlan {
    pub number: u32,
    pub description: String,
    #[serde(default)]
    pub emotional_tone: String,
    #[serde(default)]
    pub character_actions: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BeatBreakdown {
    #[serde(default)]
    pub beats: Vec<BeatPlan>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParagraphDraft {
    #[serde(default = "default_paragraph_kind")]
    pub kind: ParagraphKind,
    pub content: String,
}

fn default_paragraph_kind() -> ParagraphKind {
    ParagraphKind::Narrative
}

impl Default for ParagraphKind {
    fn default() -> Self {
        ParagraphKind::Narrative
    }
}

/// Generated prose for one beat, as the model emits it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BeatProse {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub paragraphs: Vec<ParagraphDraft>,
}

/// One beat's revised text from the editorial pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeatRevision {
    pub beat_number: u32,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub paragraphs: Vec<ParagraphDraft>,
    #[serde(default)]
    pub summary: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EditorialPass {
    #[serde(default)]
    pub revisions: Vec<BeatRevision>,
}

/// Apply a series outline. Seed fields are kept when the payload leaves
/// them blank; lore entries are upserted by name.
pub fn apply_series_outline(
    doc: &mut ProjectDocument,
    outline: SeriesOutline,
) -> Result<(), ValidationError> {
    let series = &mut doc.series;
    if !outline.title.trim().is_empty() {
        series.title = outline.title;
    }
    if !outline.premise.trim().is_empty() {
        series.premise = outline.premise;
    }
    if !outline.genre.trim().is_empty() {
        series.genre = outline.genre;
    }
    if !outline.target_audience.trim().is_empty() {
        series.target_audience = outline.target_audience;
    }
    if !outline.themes.is_empty() {
        series.themes = outline.themes;
    }
    if !outline.style_guide.trim().is_empty() {
        series.style_guide = outline.style_guide;
    }
    for c in outline.characters {
        series.lore.upsert(crate::lore::LoreEntry::Character(c));
    }
    for l in outline.locations {
        series.lore.upsert(crate::lore::LoreEntry::Location(l));
    }
    for w in outline.world_elements {
        series.lore.upsert(crate::lore::LoreEntry::WorldElement(w));
    }
    Ok(())
}

/// Insert or replace one book outline, keyed by book number. Existing
/// chapters are preserved on replacement.
pub fn apply_book_outline(
    doc: &mut ProjectDocument,
    outline: BookOutline,
) -> Result<(), ValidationError> {
    if outline.number == 0 {
        return Err(ValidationError::new("book.number", "must be 1-based"));
    }
    let books = &mut doc.series.books;
    if let Some(existing) = books.iter_mut().find(|b| b.number == outline.number) {
        existing.title = outline.title;
        existing.premise = outline.premise;
        existing.target_word_count = outline.target_word_count;
        existing.act_structure = outline.act_structure;
        existing.character_arcs = outline.character_arcs;
    } else {
        books.push(Book {
            number: outline.number,
            title: outline.title,
            premise: outline.premise,
            target_word_count: outline.target_word_count,
            act_structure: outline.act_structure,
            character_arcs: outline.character_arcs,
            chapters: Vec::new(),
        });
        books.sort_by_key(|b| b.number);
    }
    Ok(())
}

/// Replace the chapter plan of one book.
pub fn apply_chapter_plans(
    doc: &mut ProjectDocument,
    book_number: u32,
    plans: Vec<ChapterPlan>,
) -> Result<(), ValidationError> {
    let book = find_book(doc, book_number)?;
    book.chapters = plans
        .into_iter()
        .map(|p| Chapter {
            number: p.number,
            title: p.title,
            act: p.act,
            purpose: p.purpose,
            plot_points: p.plot_points,
            pov: p.pov,
            setting: p.setting,
            scenes: Vec::new(),
        })
        .collect();
    book.chapters.sort_by_key(|c| c.number);
    Ok(())
}

/// Replace the scene plan of one chapter.
pub fn apply_scene_plans(
    doc: &mut ProjectDocument,
    book_number: u32,
    chapter_number: u32,
    plans: Vec<ScenePlan>,
) -> Result<(), ValidationError> {
    let chapter = find_chapter(doc, book_number, chapter_number)?;
    chapter.scenes = plans
        .into_iter()
        .map(|p| Scene {
            number: p.number,
            title: p.title,
            purpose: p.purpose,
            pov: p.pov,
            setting: p.setting,
            characters_present: p.characters_present,
            conflict: p.conflict,
            turning_points: p.turning_points,
            beats: Vec::new(),
        })
        .collect();
    chapter.scenes.sort_by_key(|s| s.number);
    Ok(())
}

/// Replace the beat breakdown of one scene.
pub fn apply_beat_breakdown(
    doc: &mut ProjectDocument,
    book_number: u32,
    chapter_number: u32,
    scene_number: u32,
    breakdown: BeatBreakdown,
) -> Result<(), ValidationError> {
    let scene = find_scene(doc, book_number, chapter_number, scene_number)?;
    scene.beats = breakdown
        .beats
        .into_iter()
        .map(|p| Beat {
            number: p.number,
            description: p.description,
            emotional_tone: p.emotional_tone,
            character_actions: p.character_actions,
            prose: None,
        })
        .collect();
    scene.beats.sort_by_key(|b| b.number);
    Ok(())
}

/// Attach generated prose to one beat. First application creates draft v1;
/// re-application revises, bumping the draft version.
pub fn apply_beat_prose(
    doc: &mut ProjectDocument,
    book_number: u32,
    chapter_number: u32,
    scene_number: u32,
    beat_number: u32,
    draft: BeatProse,
) -> Result<(), ValidationError> {
    let scene = find_scene(doc, book_number, chapter_number, scene_number)?;
    let beat = scene
        .beats
        .iter_mut()
        .find(|b| b.number == beat_number)
        .ok_or_else(|| {
            ValidationError::new(
                format!("scene[{scene_number}].beats[{beat_number}]"),
                "beat not found",
            )
        })?;
    let (content, paragraphs) = materialize(draft.content, draft.paragraphs);
    match &mut beat.prose {
        Some(prose) => prose.revise(content, paragraphs, ProseStatus::Draft),
        None => beat.prose = Some(Prose::new(content, paragraphs)),
    }
    Ok(())
}

/// Apply an editorial pass to one scene. Only beats named in the payload
/// are rewritten; each rewrite bumps the draft version and marks the prose
/// revised. Returns the number of beats touched.
pub fn apply_editorial_pass(
    doc: &mut ProjectDocument,
    book_number: u32,
    chapter_number: u32,
    scene_number: u32,
    pass: EditorialPass,
) -> Result<usize, ValidationError> {
    let scene = find_scene(doc, book_number, chapter_number, scene_number)?;
    let mut touched = 0;
    for revision in pass.revisions {
        let beat = scene
            .beats
            .iter_mut()
            .find(|b| b.number == revision.beat_number)
            .ok_or_else(|| {
                ValidationError::new(
                    format!("scene[{scene_number}].beats[{}]", revision.beat_number),
                    "beat not found",
                )
            })?;
        let prose = beat.prose.as_mut().ok_or_else(|| {
            ValidationError::new(
                format!(
                    "scene[{scene_number}].beats[{}].prose",
                    revision.beat_number
                ),
                "cannot revise prose that was never generated",
            )
        })?;
        let (content, paragraphs) = materialize(revision.content, revision.paragraphs);
        prose.revise(content, paragraphs, ProseStatus::Revised);
        touched += 1;
    }
    Ok(touched)
}

/// Mark every remaining draft prose revised without changing text. Used by
/// the editorial agent for scenes the model judged clean.
pub fn finalize_untouched_prose(doc: &mut ProjectDocument) {
    for book in &mut doc.series.books {
        for chapter in &mut book.chapters {
            for scene in &mut chapter.scenes {
                for beat in &mut scene.beats {
                    if let Some(prose) = &mut beat.prose {
                        if prose.status == ProseStatus::Draft {
                            prose.status = ProseStatus::Revised;
                        }
                    }
                }
            }
        }
    }
}

fn materialize(content: String, drafts: Vec<ParagraphDraft>) -> (String, Vec<Paragraph>) {
    let paragraphs: Vec<Paragraph> = drafts
        .into_iter()
        .enumerate()
        .map(|(i, d)| Paragraph {
            number: i as u32 + 1,
            kind: d.kind,
            word_count: count_words(&d.content),
            content: d.content,
        })
        .collect();
    let content = if content.trim().is_empty() && !paragraphs.is_empty() {
        paragraphs
            .iter()
            .map(|p| p.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    } else {
        content
    };
    (content, paragraphs)
}

fn find_book(
    doc: &mut ProjectDocument,
    book_number: u32,
) -> Result<&mut Book, ValidationError> {
    doc.series
        .books
        .iter_mut()
        .find(|b| b.number == book_number)
        .ok_or_else(|| {
            ValidationError::new(format!("series.books[number={book_number}]"), "book not found")
        })
}

fn find_chapter(
    doc: &mut ProjectDocument,
    book_number: u32,
    chapter_number: u32,
) -> Result<&mut Chapter, ValidationError> {
    find_book(doc, book_number)?
        .chapters
        .iter_mut()
        .find(|c| c.number == chapter_number)
        .ok_or_else(|| {
            ValidationError::new(
                format!("books[number={book_number}].chapters[number={chapter_number}]"),
                "chapter not found",
            )
        })
}

fn find_scene(
    doc: &mut ProjectDocument,
    book_number: u32,
    chapter_number: u32,
    scene_number: u32,
) -> Result<&mut Scene, ValidationError> {
    find_chapter(doc, book_number, chapter_number)?
        .scenes
        .iter_mut()
        .find(|s| s.number == scene_number)
        .ok_or_else(|| {
            ValidationError::new(
                format!(
                    "books[number={book_number}].chapters[number={chapter_number}].scenes[number={scene_number}]"
                ),
                "scene not found",
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lore::LoreKind;

    fn seeded() -> ProjectDocument {
        ProjectDocument::from_seed("p1", "The Quantum Heist", "A heist across time.", "sf")
    }

    fn outline(number: u32) -> BookOutline {
        BookOutline {
            number,
            title: format!("Book {number}"),
            premise: "The job goes wrong.".to_string(),
            target_word_count: 90_000,
            act_structure: vec![ActSummary {
                act: 1,
                summary: "Setup.".to_string(),
                key_events: vec![],
                ending_hook: String::new(),
            }],
            character_arcs: vec![],
        }
    }

    #[test]
    fn series_outline_keeps_seed_fields_when_blank() {
        let mut doc = seeded();
        apply_series_outline(
            &mut doc,
            SeriesOutline {
                themes: vec!["trust".to_string()],
                characters: vec![Character {
                    name: "Vesper".to_string(),
                    role: "protagonist".to_string(),
                    description: "A thief.".to_string(),
                    traits: vec![],
                    relationships: vec![],
                }],
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(doc.series.title, "The Quantum Heist");
        assert_eq!(doc.series.themes, vec!["trust".to_string()]);
        assert!(doc.series.lore.contains(LoreKind::Character, "vesper"));
    }

    #[test]
    fn book_outline_replaces_by_number_preserving_chapters() {
        let mut doc = seeded();
        apply_book_outline(&mut doc, outline(1)).unwrap();
        apply_chapter_plans(
            &mut doc,
            1,
            vec![ChapterPlan {
                number: 1,
                title: String::new(),
                act: 1,
                purpose: "Open.".to_string(),
                plot_points: vec![],
                pov: "Vesper".to_string(),
                setting: Setting::default(),
            }],
        )
        .unwrap();
        let mut revised = outline(1);
        revised.title = "Book One, Revised".to_string();
        apply_book_outline(&mut doc, revised).unwrap();
        assert_eq!(doc.series.books.len(), 1);
        assert_eq!(doc.series.books[0].title, "Book One, Revised");
        assert_eq!(doc.series.books[0].chapters.len(), 1);
    }

    #[test]
    fn books_are_kept_sorted_by_number() {
        let mut doc = seeded();
        apply_book_outline(&mut doc, outline(2)).unwrap();
        apply_book_outline(&mut doc, outline(1)).unwrap();
        let numbers: Vec<u32> = doc.series.books.iter().map(|b| b.number).collect();
        assert_eq!(numbers, vec![1, 2]);
    }

    #[test]
    fn scene_plans_require_existing_chapter() {
        let mut doc = seeded();
        apply_book_outline(&mut doc, outline(1)).unwrap();
        let err = apply_scene_plans(&mut doc, 1, 9, vec![]).unwrap_err();
        assert!(err.path.contains("chapters[number=9]"));
    }

    #[test]
    fn beat_prose_first_application_is_draft_v1_then_revises() {
        let mut doc = seeded();
        apply_book_outline(&mut doc, outline(1)).unwrap();
        apply_chapter_plans(
            &mut doc,
            1,
            vec![ChapterPlan {
                number: 1,
                title: String::new(),
                act: 1,
                purpose: "Open.".to_string(),
                plot_points: vec![],
                pov: "Vesper".to_string(),
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
                purpose: "Meet.".to_string(),
                pov: "Vesper".to_string(),
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
                beats: vec![BeatPlan {
                    number: 1,
                    description: "Scan the room.".to_string(),
                    emotional_tone: String::new(),
                    character_actions: vec![],
                }],
            },
        )
        .unwrap();

        apply_beat_prose(
            &mut doc,
            1,
            1,
            1,
            1,
            BeatProse {
                content: "She watched the door.".to_string(),
                paragraphs: vec![],
            },
        )
        .unwrap();
        let beat = &doc.series.books[0].chapters[0].scenes[0].beats[0];
        assert_eq!(beat.prose.as_ref().unwrap().draft_version, 1);

        apply_beat_prose(
            &mut doc,
            1,
            1,
            1,
            1,
            BeatProse {
                content: "She watched the door, counting exits.".to_string(),
                paragraphs: vec![],
            },
        )
        .unwrap();
        let beat = &doc.series.books[0].chapters[0].scenes[0].beats[0];
        assert_eq!(beat.prose.as_ref().unwrap().draft_version, 2);
    }

    #[test]
    fn paragraphs_fill_content_when_content_blank() {
        let (content, paragraphs) = materialize(
            String::new(),
            vec![
                ParagraphDraft {
                    kind: ParagraphKind::Narrative,
                    content: "First.".to_string(),
                },
                ParagraphDraft {
                    kind: ParagraphKind::Dialogue,
                    content: "\"Second.\"".to_string(),
                },
            ],
        );
        assert_eq!(content, "First.\n\n\"Second.\"");
        assert_eq!(paragraphs.len(), 2);
        assert_eq!(paragraphs[1].number, 2);
    }

    #[test]
    fn editorial_pass_marks_revised_and_counts_touched() {
        let mut doc = seeded();
        apply_book_outline(&mut doc, outline(1)).unwrap();
        apply_chapter_plans(
            &mut doc,
            1,
            vec![ChapterPlan {
                number: 1,
                title: String::new(),
                act: 1,
                purpose: "Open.".to_string(),
                plot_points: vec![],
                pov: "Vesper".to_string(),
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
                purpose: "Meet.".to_string(),
                pov: "Vesper".to_string(),
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
                beats: vec![BeatPlan {
                    number: 1,
                    description: "Scan.".to_string(),
                    emotional_tone: String::new(),
                    character_actions: vec![],
                }],
            },
        )
        .unwrap();
        apply_beat_prose(
            &mut doc,
            1,
            1,
            1,
            1,
            BeatProse {
                content: "Rough draft.".to_string(),
                paragraphs: vec![],
            },
        )
        .unwrap();

        let touched = apply_editorial_pass(
            &mut doc,
            1,
            1,
            1,
            EditorialPass {
                revisions: vec![BeatRevision {
                    beat_number: 1,
                    content: "Polished draft.".to_string(),
                    paragraphs: vec![],
                    summary: "Tightened pacing.".to_string(),
                }],
            },
        )
        .unwrap();
        assert_eq!(touched, 1);
        let prose = doc.series.books[0].chapters[0].scenes[0].beats[0]
            .prose
            .as_ref()
            .unwrap();
        assert_eq!(prose.status, ProseStatus::Revised);
        assert_eq!(prose.draft_version, 2);
    }
}
