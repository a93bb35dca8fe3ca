//! Rendering retrieved chunks for an answer generator.

use crate::types::ScoredChunk;
use serde::Serialize;

/// Numbered source blocks: `Source {i} [{title}]:` followed by the chunk
/// text, separated by blank lines. Numbering starts at 1.
pub fn format_context(results: &[ScoredChunk]) -> String {
    results
        .iter()
        .enumerate()
        .map(|(i, r)| format!("Source {} [{}]:\n{}", i + 1, r.title, r.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// One `• ({i}) {title}` line per result.
pub fn source_outline(results: &[ScoredChunk]) -> String {
    results
        .iter()
        .enumerate()
        .map(|(i, r)| format!("• ({}) {}", i + 1, r.title))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Retrieved sources plus their rendered context.
///
/// `has_sources` is false when nothing was retrieved; callers use it to
/// tell the generator there is no grounding material.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievalContext {
    pub sources: Vec<ScoredChunk>,
    pub context: String,
    pub has_sources: bool,
}

impl RetrievalContext {
    pub fn new(sources: Vec<ScoredChunk>) -> Self {
        Self {
            context: format_context(&sources),
            has_sources: !sources.is_empty(),
            sources,
        }
    }

    pub fn outline(&self) -> String {
        source_outline(&self.sources)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locale::Locale;

    fn result(title: &str, text: &str) -> ScoredChunk {
        ScoredChunk {
            id: format!("{}.md-en-0", title),
            locale: Locale::En,
            title: title.to_string(),
            text: text.to_string(),
            score: 0.5,
        }
    }

    #[test]
    fn test_format_context() {
        let results = vec![
            result("services", "We build websites."),
            result("pricing", "Plans start small."),
        ];

        assert_eq!(
            format_context(&results),
            "Source 1 [services]:\nWe build websites.\n\nSource 2 [pricing]:\nPlans start small."
        );
    }

    #[test]
    fn test_source_outline() {
        let results = vec![result("services", "a"), result("faq", "b")];
        assert_eq!(source_outline(&results), "• (1) services\n• (2) faq");
    }

    #[test]
    fn test_empty_context_has_no_sources() {
        let context = RetrievalContext::new(vec![]);
        assert!(!context.has_sources);
        assert!(context.context.is_empty());
        assert!(context.outline().is_empty());
    }

    #[test]
    fn test_context_wraps_results() {
        let context = RetrievalContext::new(vec![result("services", "We build websites.")]);
        assert!(context.has_sources);
        assert_eq!(context.sources.len(), 1);
        assert!(context.context.starts_with("Source 1 [services]:"));
    }
}
