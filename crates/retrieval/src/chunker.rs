//! Sentence-aware fixed-window chunking.
//!
//! Windows are measured in characters, not bytes, so multi-byte text is
//! never split inside a code point.

use crate::locale::Locale;
use crate::types::{Chunk, SourceDocument};
use kb_core::config::ChunkingSettings;

/// Split `text` into trimmed, non-empty pieces of at most `chunk_size`
/// characters.
///
/// Each window is shrunk to end right after the last `". "` it contains,
/// provided that period sits more than `min_break` characters into the
/// window. Without such a period the window is cut at full length.
pub fn split_text(text: &str, chunk_size: usize, min_break: usize) -> Vec<String> {
    let chars: Vec<char> = text.trim().chars().collect();
    let chunk_size = chunk_size.max(1);

    let mut pieces = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let mut end = (start + chunk_size).min(chars.len());

        if let Some(period) = last_sentence_break(&chars[start..end]) {
            if period > min_break {
                end = start + period + 1;
            }
        }

        let piece: String = chars[start..end].iter().collect();
        let piece = piece.trim();
        if !piece.is_empty() {
            pieces.push(piece.to_string());
        }

        start = end;
    }

    pieces
}

/// Offset of the last `.` that is directly followed by a space.
fn last_sentence_break(window: &[char]) -> Option<usize> {
    window.windows(2).rposition(|pair| pair[0] == '.' && pair[1] == ' ')
}

/// Chunk one locale section of a document, assigning sequential ids.
pub fn chunk_section(
    document: &SourceDocument,
    locale: Locale,
    settings: &ChunkingSettings,
) -> Vec<Chunk> {
    let Some(section) = document.sections.get(&locale) else {
        return Vec::new();
    };

    let chunks: Vec<Chunk> = split_text(section, settings.chunk_size, settings.min_break)
        .into_iter()
        .enumerate()
        .map(|(position, text)| Chunk {
            id: format!("{}-{}-{}", document.name, locale, position),
            locale,
            title: document.title.clone(),
            text,
            embedding: None,
        })
        .collect();

    tracing::debug!(
        "Chunked {} [{}] into {} chunks (size: {}, min break: {})",
        document.name,
        locale,
        chunks.len(),
        settings.chunk_size,
        settings.min_break
    );

    chunks
}

/// Chunk every document for every locale, locale-major.
///
/// The order is stable for unchanged input, which keeps ids and embedding
/// batches reproducible.
pub fn chunk_documents(
    documents: &[SourceDocument],
    settings: &ChunkingSettings,
) -> Vec<Chunk> {
    Locale::ALL
        .iter()
        .flat_map(|locale| {
            documents
                .iter()
                .flat_map(move |doc| chunk_section(doc, *locale, settings))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::parse_document;
    use std::path::Path;

    fn strip_whitespace(s: &str) -> String {
        s.chars().filter(|c| !c.is_whitespace()).collect()
    }

    #[test]
    fn test_short_text_yields_one_chunk() {
        let pieces = split_text("  A short note about audits.  ", 800, 200);
        assert_eq!(pieces, vec!["A short note about audits.".to_string()]);
    }

    #[test]
    fn test_empty_text_yields_nothing() {
        assert!(split_text("   \n\t ", 800, 200).is_empty());
    }

    #[test]
    fn test_hard_cut_without_period() {
        let text = "a".repeat(1000);
        let pieces = split_text(&text, 800, 200);

        assert_eq!(pieces.len(), 2);
        assert_eq!(pieces[0].chars().count(), 800);
        assert_eq!(pieces[1].chars().count(), 200);
    }

    #[test]
    fn test_sentence_boundary_preferred() {
        // Period at 650 followed by a space; nothing else in the window.
        let mut text = "x".repeat(650);
        text.push_str(". ");
        text.push_str(&"y".repeat(348));
        assert_eq!(text.chars().count(), 1000);

        let pieces = split_text(&text, 800, 200);

        assert_eq!(pieces[0].chars().count(), 651);
        assert!(pieces[0].ends_with('.'));
        assert_eq!(pieces[1], "y".repeat(348));
    }

    #[test]
    fn test_period_below_floor_is_ignored() {
        let mut text = "x".repeat(150);
        text.push_str(". ");
        text.push_str(&"z".repeat(848));

        let pieces = split_text(&text, 800, 200);
        assert_eq!(pieces[0].chars().count(), 800);
    }

    #[test]
    fn test_period_exactly_at_floor_is_ignored() {
        let mut text = "x".repeat(200);
        text.push_str(". ");
        text.push_str(&"z".repeat(798));

        let pieces = split_text(&text, 800, 200);
        assert_eq!(pieces[0].chars().count(), 800);
    }

    #[test]
    fn test_last_period_in_window_wins() {
        let sentence = format!("{}. ", "w".repeat(298));
        let text = sentence.repeat(4);

        let pieces = split_text(&text, 800, 200);
        // Periods at 298 and 598 are both eligible; the later one is taken.
        assert_eq!(pieces[0].chars().count(), 599);
    }

    #[test]
    fn test_never_exceeds_chunk_size() {
        let text = "Lorem ipsum dolor sit amet. Consectetur adipiscing elit sed do. ".repeat(60);
        for piece in split_text(&text, 800, 200) {
            assert!(piece.chars().count() <= 800);
            assert!(!piece.is_empty());
        }
    }

    #[test]
    fn test_coverage_reconstructs_text() {
        let text = "Ship quick wins first. Scale only when the numbers say so. \
                    Audits come before automation. "
            .repeat(40);
        let pieces = split_text(&text, 800, 200);

        assert_eq!(strip_whitespace(&pieces.concat()), strip_whitespace(&text));
    }

    #[test]
    fn test_multibyte_text_is_split_on_char_boundaries() {
        let text = "Acentuación, añadir, ñandú 🎮. ".repeat(80);
        let pieces = split_text(&text, 800, 200);

        assert!(pieces.len() > 1);
        assert_eq!(strip_whitespace(&pieces.concat()), strip_whitespace(&text));
    }

    #[test]
    fn test_chunk_ids_are_sequential_and_stable() {
        let body = format!("## EN\n{}\n## ES\nHola.\n", "Sentence here. ".repeat(120));
        let doc = parse_document("services.md", Path::new("services.md"), &body);
        let settings = ChunkingSettings::default();

        let first = chunk_documents(std::slice::from_ref(&doc), &settings);
        let second = chunk_documents(std::slice::from_ref(&doc), &settings);

        let ids: Vec<&str> = first.iter().map(|c| c.id.as_str()).collect();
        let again: Vec<&str> = second.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, again);

        assert_eq!(ids[0], "services.md-en-0");
        assert_eq!(ids[1], "services.md-en-1");
        assert_eq!(*ids.last().unwrap(), "services.md-es-0");
        assert!(first.iter().all(|c| c.title == "services"));
    }

    #[test]
    fn test_chunks_carry_their_locale() {
        let doc = parse_document("faq.md", Path::new("faq.md"), "## EN\nHi.\n## ES\nHola.\n");
        let chunks = chunk_documents(&[doc], &ChunkingSettings::default());

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].locale, Locale::En);
        assert_eq!(chunks[0].text, "Hi.");
        assert_eq!(chunks[1].locale, Locale::Es);
        assert_eq!(chunks[1].text, "Hola.");
    }
}
