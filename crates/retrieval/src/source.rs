//! Bilingual markdown source reading.
//!
//! A source document holds an English and a Spanish section, each opened by
//! a heading line such as `## EN` or `## ES`. When a document lacks the
//! section for a locale, that locale receives the whole document body.

use crate::locale::Locale;
use crate::types::SourceDocument;
use kb_core::{AppError, AppResult};
use regex::Regex;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;
use walkdir::WalkDir;

static SECTION_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^##[ \t]+(EN|ES)[ \t]*\r?$").expect("section marker pattern is valid")
});

/// Split a document body into per-locale sections.
///
/// Text before the first marker belongs to no section. A repeated marker
/// replaces the earlier section for that locale.
pub fn split_sections(body: &str) -> BTreeMap<Locale, String> {
    let markers: Vec<(Locale, usize, usize)> = SECTION_MARKER
        .captures_iter(body)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let tag = caps.get(1)?.as_str();
            let locale = Locale::ALL.into_iter().find(|l| l.marker() == tag)?;
            Some((locale, whole.start(), whole.end()))
        })
        .collect();

    let mut found = BTreeMap::new();
    for (i, (locale, _, end)) in markers.iter().enumerate() {
        let next_start = markers.get(i + 1).map_or(body.len(), |m| m.1);
        found.insert(*locale, body[*end..next_start].to_string());
    }

    Locale::ALL
        .iter()
        .map(|locale| {
            let text = found.remove(locale).unwrap_or_else(|| body.to_string());
            (*locale, text)
        })
        .collect()
}

/// Derive a display title from a file name: extension dropped, `-` and `_`
/// turned into spaces.
pub fn title_from_file_name(name: &str) -> String {
    let stem = name.strip_suffix(".md").unwrap_or(name);
    stem.replace(['-', '_'], " ")
}

/// Build a source document from a file name and its contents.
pub fn parse_document(name: &str, path: &Path, body: &str) -> SourceDocument {
    SourceDocument {
        name: name.to_string(),
        title: title_from_file_name(name),
        path: path.to_path_buf(),
        sections: split_sections(body),
    }
}

/// Read every `*.md` file directly inside `dir`, sorted by file name.
pub fn read_sources(dir: &Path) -> AppResult<Vec<SourceDocument>> {
    if !dir.is_dir() {
        return Err(AppError::Index(format!(
            "Content directory does not exist: {:?}",
            dir
        )));
    }

    let mut documents = Vec::new();

    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
    {
        let entry = entry.map_err(|e| {
            AppError::Index(format!("Failed to walk content directory {:?}: {}", dir, e))
        })?;
        let path = entry.path();

        if !entry.file_type().is_file() || path.extension().and_then(|e| e.to_str()) != Some("md")
        {
            continue;
        }

        let name = entry.file_name().to_string_lossy().to_string();
        let body = std::fs::read_to_string(path)?;

        tracing::debug!("Read source document {:?} ({} bytes)", path, body.len());
        documents.push(parse_document(&name, path, &body));
    }

    tracing::info!("Read {} source documents from {:?}", documents.len(), dir);

    Ok(documents)
}
