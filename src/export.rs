//! Read-only manuscript projection: the drafted prose flattened into one
//! Markdown document, in reading order.

use crate::document::ProjectDocument;

/// Render the manuscript. Structured paragraphs are preferred; beats whose
/// prose only carries whole-text content fall back to that. Beats with no
/// prose yet are skipped.
pub fn manuscript(doc: &ProjectDocument) -> String {
    let mut out = String::new();
    out.push_str(&format!("# {}\n\n", doc.series.title));
    if !doc.series.premise.trim().is_empty() {
        out.push_str(&format!("*{}*\n\n", doc.series.premise));
    }

    for book in &doc.series.books {
        if doc.series.books.len() > 1 {
            out.push_str(&format!("## Book {}: {}\n\n", book.number, book.title));
        }
        for chapter in &book.chapters {
            let title = if chapter.title.trim().is_empty() {
                format!("Chapter {}", chapter.number)
            } else {
                format!("Chapter {}: {}", chapter.number, chapter.title)
            };
            out.push_str(&format!("### {title}\n\n"));
            for scene in &chapter.scenes {
                for beat in &scene.beats {
                    let Some(prose) = &beat.prose else { continue };
                    if !prose.paragraphs.is_empty() {
                        for paragraph in &prose.paragraphs {
                            out.push_str(paragraph.content.trim());
                            out.push_str("\n\n");
                        }
                    } else if !prose.content.trim().is_empty() {
                        out.push_str(prose.content.trim());
                        out.push_str("\n\n");
                    }
                }
                // scene break
                out.push_str("---\n\n");
            }
        }
    }

    // drop a trailing scene break
    while out.ends_with("---\n\n") {
        out.truncate(out.len() - 5);
    }
    out.trim_end().to_string() + "\n"
}

/// Total words of drafted prose across the document.
pub fn word_count(doc: &ProjectDocument) -> u32 {
    doc.series
        .books
        .iter()
        .flat_map(|b| b.chapters.iter())
        .flat_map(|c| c.scenes.iter())
        .flat_map(|s| s.beats.iter())
        .filter_map(|b| b.prose.as_ref())
        .map(|p| p.word_count)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::update::{BeatProse, ParagraphDraft, apply_beat_prose};
    use crate::document::ParagraphKind;

    fn doc_with_prose(beats: &[(&str, Vec<&str>)]) -> ProjectDocument {
        let mut doc = crate::agents::tests_support::doc_with_beats(beats.len() as u32);
        for (i, (content, paragraphs)) in beats.iter().enumerate() {
            apply_beat_prose(
                &mut doc,
                1,
                1,
                1,
                i as u32 + 1,
                BeatProse {
                    content: content.to_string(),
                    paragraphs: paragraphs
                        .iter()
                        .map(|p| ParagraphDraft {
                            kind: ParagraphKind::Narrative,
                            content: p.to_string(),
                        })
                        .collect(),
                },
            )
            .unwrap();
        }
        doc
    }

    #[test]
    fn paragraphs_are_preferred_over_whole_content() {
        let doc = doc_with_prose(&[("ignored whole text", vec!["First paragraph.", "Second."])]);
        let text = manuscript(&doc);
        assert!(text.contains("First paragraph.\n\nSecond."));
        assert!(!text.contains("ignored whole text"));
    }

    #[test]
    fn content_is_the_fallback_when_no_paragraphs() {
        let doc = doc_with_prose(&[("Whole text fallback.", vec![])]);
        let text = manuscript(&doc);
        assert!(text.contains("Whole text fallback."));
    }

    #[test]
    fn header_carries_title_and_premise() {
        let doc = doc_with_prose(&[("Some prose.", vec![])]);
        let text = manuscript(&doc);
        assert!(text.starts_with("# T\n\n*P*\n\n"));
        assert!(text.contains("### Chapter 1"));
    }

    #[test]
    fn beats_without_prose_are_skipped() {
        let doc = crate::agents::tests_support::doc_with_beats(2);
        let text = manuscript(&doc);
        assert!(!text.contains("null"));
        assert!(text.contains("### Chapter 1"));
    }

    #[test]
    fn word_count_sums_all_prose() {
        let doc = doc_with_prose(&[("one two three", vec![]), ("four five", vec![])]);
        assert_eq!(word_count(&doc), 5);
    }
}
