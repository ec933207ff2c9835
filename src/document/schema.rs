//! Pure structural validation of a project document against the
//! requirements of a given stage. No I/O, no clock, no randomness.
//!
//! The validator only checks presence and shape. Whether well-formed
//! content is any good is the quality gate's call.

use crate::document::{ProjectDocument, ProseStatus};
use crate::errors::ValidationError;
use crate::stage::Stage;

/// Check that `doc` satisfies the structural requirements of `stage`.
/// Returns the first failure found, with the exact field path.
pub fn validate(doc: &ProjectDocument, stage: Stage) -> Result<(), ValidationError> {
    match stage {
        Stage::Series => validate_series(doc),
        Stage::Book => validate_books(doc),
        Stage::Chapter => validate_chapters(doc),
        Stage::Scene => validate_scenes(doc),
        Stage::Beat => validate_beats(doc),
        Stage::Prose => validate_prose(doc, false),
        Stage::Editorial => validate_prose(doc, true),
    }
}

fn require(value: &str, path: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::new(path, "must not be empty"))
    } else {
        Ok(())
    }
}

fn validate_series(doc: &ProjectDocument) -> Result<(), ValidationError> {
    require(&doc.series.title, "series.title")?;
    require(&doc.series.premise, "series.premise")?;
    require(&doc.series.genre, "series.genre")
}

fn validate_books(doc: &ProjectDocument) -> Result<(), ValidationError> {
    validate_series(doc)?;
    if doc.series.books.is_empty() {
        return Err(ValidationError::new("series.books", "at least one book required"));
    }
    for (b, book) in doc.series.books.iter().enumerate() {
        require(&book.title, &format!("series.books[{b}].title"))?;
        require(&book.premise, &format!("series.books[{b}].premise"))?;
        if book.act_structure.is_empty() {
            return Err(ValidationError::new(
                format!("series.books[{b}].act_structure"),
                "must not be empty",
            ));
        }
        if book.character_arcs.is_empty() {
            return Err(ValidationError::new(
                format!("series.books[{b}].character_arcs"),
                "must not be empty",
            ));
        }
    }
    Ok(())
}

fn validate_chapters(doc: &ProjectDocument) -> Result<(), ValidationError> {
    validate_books(doc)?;
    for (b, book) in doc.series.books.iter().enumerate() {
        if book.chapters.is_empty() {
            return Err(ValidationError::new(
                format!("series.books[{b}].chapters"),
                "at least one chapter required",
            ));
        }
        for (c, chapter) in book.chapters.iter().enumerate() {
            let base = format!("series.books[{b}].chapters[{c}]");
            require(&chapter.purpose, &format!("{base}.purpose"))?;
            require(&chapter.pov, &format!("{base}.pov"))?;
            require(&chapter.setting.location, &format!("{base}.setting.location"))?;
        }
    }
    Ok(())
}

fn validate_scenes(doc: &ProjectDocument) -> Result<(), ValidationError> {
    validate_chapters(doc)?;
    for (b, book) in doc.series.books.iter().enumerate() {
        for (c, chapter) in book.chapters.iter().enumerate() {
            if chapter.scenes.is_empty() {
                return Err(ValidationError::new(
                    format!("series.books[{b}].chapters[{c}].scenes"),
                    "at least one scene required",
                ));
            }
            for (s, scene) in chapter.scenes.iter().enumerate() {
                let base = format!("series.books[{b}].chapters[{c}].scenes[{s}]");
                require(&scene.purpose, &format!("{base}.purpose"))?;
                require(&scene.pov, &format!("{base}.pov"))?;
                require(&scene.setting.location, &format!("{base}.setting.location"))?;
            }
        }
    }
    Ok(())
}

fn validate_beats(doc: &ProjectDocument) -> Result<(), ValidationError> {
    validate_scenes(doc)?;
    for_each_scene(doc, |base, scene| {
        if scene.beats.is_empty() {
            return Err(ValidationError::new(
                format!("{base}.beats"),
                "at least one beat required",
            ));
        }
        for (i, beat) in scene.beats.iter().enumerate() {
            require(&beat.description, &format!("{base}.beats[{i}].description"))?;
        }
        Ok(())
    })
}

fn validate_prose(doc: &ProjectDocument, editorial: bool) -> Result<(), ValidationError> {
    validate_beats(doc)?;
    for_each_scene(doc, |base, scene| {
        for (i, beat) in scene.beats.iter().enumerate() {
            let path = format!("{base}.beats[{i}].prose");
            let Some(prose) = &beat.prose else {
                return Err(ValidationError::new(path, "prose not yet generated"));
            };
            if prose.content.trim().is_empty() && prose.paragraphs.is_empty() {
                return Err(ValidationError::new(
                    format!("{path}.content"),
                    "prose has neither content nor paragraphs",
                ));
            }
            if prose.draft_version < 1 {
                return Err(ValidationError::new(
                    format!("{path}.draft_version"),
                    "must be at least 1",
                ));
            }
            if editorial && prose.status == ProseStatus::Draft {
                return Err(ValidationError::new(
                    format!("{path}.status"),
                    "editorial pass must leave no draft prose",
                ));
            }
        }
        Ok(())
    })
}

fn for_each_scene<F>(doc: &ProjectDocument, mut f: F) -> Result<(), ValidationError>
where
    F: FnMut(&str, &crate::document::Scene) -> Result<(), ValidationError>,
{
    for (b, book) in doc.series.books.iter().enumerate() {
        for (c, chapter) in book.chapters.iter().enumerate() {
            for (s, scene) in chapter.scenes.iter().enumerate() {
                let base = format!("series.books[{b}].chapters[{c}].scenes[{s}]");
                f(&base, scene)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{
        ActSummary, Beat, Book, Chapter, CharacterArc, Paragraph, ParagraphKind, Prose,
        ProseStatus, Scene, Setting,
    };

    fn seeded() -> ProjectDocument {
        ProjectDocument::from_seed("p1", "The Quantum Heist", "A heist across time.", "sf")
    }

    fn with_book(mut doc: ProjectDocument) -> ProjectDocument {
        doc.series.books.push(Book {
            number: 1,
            title: "Book One".to_string(),
            premise: "The first job.".to_string(),
            target_word_count: 90_000,
            act_structure: vec![ActSummary {
                act: 1,
                summary: "Setup.".to_string(),
                key_events: vec![],
                ending_hook: String::new(),
            }],
            character_arcs: vec![CharacterArc {
                character_name: "Vesper".to_string(),
                starting_state: "cynical".to_string(),
                ending_state: "hopeful".to_string(),
                transformation: String::new(),
            }],
            chapters: vec![],
        });
        doc
    }

    fn with_full_tree() -> ProjectDocument {
        let mut doc = with_book(seeded());
        doc.series.books[0].chapters.push(Chapter {
            number: 1,
            title: "Arrival".to_string(),
            act: 1,
            purpose: "Introduce the crew.".to_string(),
            plot_points: vec![],
            pov: "Vesper".to_string(),
            setting: Setting {
                location: "Meridian Station".to_string(),
                time: "night".to_string(),
                atmosphere: "tense".to_string(),
            },
            scenes: vec![Scene {
                number: 1,
                title: String::new(),
                purpose: "Meet the fence.".to_string(),
                pov: "Vesper".to_string(),
                setting: Setting {
                    location: "Dockside bar".to_string(),
                    time: String::new(),
                    atmosphere: String::new(),
                },
                characters_present: vec!["Vesper".to_string()],
                conflict: String::new(),
                turning_points: vec![],
                beats: vec![Beat {
                    number: 1,
                    description: "Vesper scans the room.".to_string(),
                    emotional_tone: "wary".to_string(),
                    character_actions: vec![],
                    prose: None,
                }],
            }],
        });
        doc
    }

    #[test]
    fn seed_passes_series_validation() {
        assert!(validate(&seeded(), Stage::Series).is_ok());
    }

    #[test]
    fn empty_title_fails_with_field_path() {
        let mut doc = seeded();
        doc.series.title = "  ".to_string();
        let err = validate(&doc, Stage::Series).unwrap_err();
        assert_eq!(err.path, "series.title");
    }

    #[test]
    fn book_stage_requires_act_structure() {
        let mut doc = with_book(seeded());
        doc.series.books[0].act_structure.clear();
        let err = validate(&doc, Stage::Book).unwrap_err();
        assert_eq!(err.path, "series.books[0].act_structure");
        doc.series.books[0].act_structure.push(ActSummary {
            act: 1,
            summary: "Setup.".to_string(),
            key_events: vec![],
            ending_hook: String::new(),
        });
        assert!(validate(&doc, Stage::Book).is_ok());
    }

    #[test]
    fn chapter_stage_requires_setting_location() {
        let mut doc = with_full_tree();
        doc.series.books[0].chapters[0].setting.location.clear();
        let err = validate(&doc, Stage::Chapter).unwrap_err();
        assert_eq!(err.path, "series.books[0].chapters[0].setting.location");
    }

    #[test]
    fn beat_stage_accepts_full_tree() {
        assert!(validate(&with_full_tree(), Stage::Beat).is_ok());
    }

    #[test]
    fn prose_stage_requires_prose_on_every_beat() {
        let doc = with_full_tree();
        let err = validate(&doc, Stage::Prose).unwrap_err();
        assert_eq!(
            err.path,
            "series.books[0].chapters[0].scenes[0].beats[0].prose"
        );
    }

    #[test]
    fn prose_with_paragraphs_only_is_accepted() {
        let mut doc = with_full_tree();
        let mut prose = Prose::new(String::new(), vec![Paragraph {
            number: 1,
            kind: ParagraphKind::Narrative,
            content: "She watched the door.".to_string(),
            word_count: 4,
        }]);
        prose.content = String::new();
        doc.series.books[0].chapters[0].scenes[0].beats[0].prose = Some(prose);
        assert!(validate(&doc, Stage::Prose).is_ok());
    }

    #[test]
    fn editorial_rejects_draft_status_prose() {
        let mut doc = with_full_tree();
        doc.series.books[0].chapters[0].scenes[0].beats[0].prose =
            Some(Prose::new("She watched the door.".to_string(), vec![]));
        let err = validate(&doc, Stage::Editorial).unwrap_err();
        assert!(err.path.ends_with(".prose.status"));
        let prose = doc.series.books[0].chapters[0].scenes[0].beats[0]
            .prose
            .as_mut()
            .unwrap();
        prose.revise(
            "She watched the door, counting exits.".to_string(),
            vec![],
            ProseStatus::Revised,
        );
        assert!(validate(&doc, Stage::Editorial).is_ok());
    }
}
