//! In-process lexical search engine.
//!
//! A small inverted index over named text fields, ranked with BM25+. Query
//! terms can be expanded to indexed terms they prefix and to terms within a
//! bounded edit distance, so partial words and typos still match. The whole
//! index serializes to a JSON string, which is how it travels inside a
//! lexical artifact.
//!
//! # Scoring
//!
//! For each query term, every matching indexed term contributes
//! `weight * idf * (delta + tf * (k1 + 1) / (tf + k1 * (1 - b + b * len / avg_len)))`
//! per field. Exact matches weigh 1.0; prefix and fuzzy expansions weigh
//! less the further they are from the query term. A document's final score
//! is the sum over query terms multiplied by how many distinct query terms
//! it matched.

use kb_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

const K1: f64 = 1.2;
const B: f64 = 0.7;
const DELTA: f64 = 0.5;

const PREFIX_WEIGHT: f64 = 0.375;
const FUZZY_WEIGHT: f64 = 0.45;
const MAX_FUZZY_DISTANCE: usize = 6;

/// Fields indexed for every chunk, in the order values are supplied.
pub const CHUNK_FIELDS: [&str; 2] = ["text", "title"];

/// Split text into lowercase alphanumeric terms.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

/// Query expansion options.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchOptions {
    /// Also match indexed terms that start with a query term
    pub prefix: bool,

    /// Edit distance tolerance as a fraction of the query term length;
    /// 0 disables fuzzy matching
    pub fuzzy: f64,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            prefix: true,
            fuzzy: 0.2,
        }
    }
}

/// A ranked match: the stored document id and its relevance.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub id: String,
    pub score: f64,
}

type Postings = BTreeMap<u32, u32>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LexicalIndex {
    fields: Vec<String>,

    /// Stored id per document ordinal
    document_ids: Vec<String>,

    /// Token count per document ordinal, per field
    field_lengths: Vec<Vec<u32>>,

    /// term -> field position -> document ordinal -> term frequency
    terms: BTreeMap<String, BTreeMap<usize, Postings>>,
}

impl LexicalIndex {
    pub fn new(fields: &[&str]) -> Self {
        Self {
            fields: fields.iter().map(|f| f.to_string()).collect(),
            document_ids: Vec::new(),
            field_lengths: Vec::new(),
            terms: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.document_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.document_ids.is_empty()
    }

    /// Number of distinct indexed terms.
    pub fn term_count(&self) -> usize {
        self.terms.len()
    }

    /// Index one document; `values` holds one string per field.
    pub fn add(&mut self, id: &str, values: &[&str]) -> AppResult<()> {
        if values.len() != self.fields.len() {
            return Err(AppError::Index(format!(
                "Document '{}' has {} field values, index expects {}",
                id,
                values.len(),
                self.fields.len()
            )));
        }

        if self.document_ids.iter().any(|existing| existing == id) {
            return Err(AppError::Index(format!("Duplicate document id '{}'", id)));
        }

        let ordinal = self.document_ids.len() as u32;
        let mut lengths = Vec::with_capacity(values.len());

        for (field, value) in values.iter().enumerate() {
            let tokens = tokenize(value);
            lengths.push(tokens.len() as u32);

            for token in tokens {
                *self
                    .terms
                    .entry(token)
                    .or_default()
                    .entry(field)
                    .or_default()
                    .entry(ordinal)
                    .or_insert(0) += 1;
            }
        }

        self.document_ids.push(id.to_string());
        self.field_lengths.push(lengths);
        Ok(())
    }

    /// Index several documents in order.
    pub fn add_all<'a, I>(&mut self, documents: I) -> AppResult<()>
    where
        I: IntoIterator<Item = (&'a str, Vec<&'a str>)>,
    {
        for (id, values) in documents {
            self.add(id, &values)?;
        }
        Ok(())
    }

    pub fn to_json(&self) -> AppResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Restore an index produced by [`LexicalIndex::to_json`].
    pub fn from_json(json: &str) -> AppResult<Self> {
        let index: Self = serde_json::from_str(json)
            .map_err(|e| AppError::Artifact(format!("Invalid lexical index: {}", e)))?;
        index.validate()?;
        Ok(index)
    }

    fn validate(&self) -> AppResult<()> {
        if self.field_lengths.len() != self.document_ids.len() {
            return Err(AppError::Artifact(format!(
                "Lexical index lists {} documents but {} length records",
                self.document_ids.len(),
                self.field_lengths.len()
            )));
        }

        if self
            .field_lengths
            .iter()
            .any(|lengths| lengths.len() != self.fields.len())
        {
            return Err(AppError::Artifact(
                "Lexical index length records do not match its fields".to_string(),
            ));
        }

        let documents = self.document_ids.len() as u32;
        for (term, by_field) in &self.terms {
            for (field, postings) in by_field {
                if *field >= self.fields.len() || postings.keys().any(|&doc| doc >= documents) {
                    return Err(AppError::Artifact(format!(
                        "Lexical index postings for '{}' point outside the index",
                        term
                    )));
                }
            }
        }

        Ok(())
    }

    fn average_lengths(&self) -> Vec<f64> {
        let count = self.document_ids.len().max(1) as f64;
        (0..self.fields.len())
            .map(|field| {
                let total: u64 = self
                    .field_lengths
                    .iter()
                    .map(|lengths| lengths[field] as u64)
                    .sum();
                (total as f64 / count).max(1.0)
            })
            .collect()
    }

    /// Indexed terms a query term reaches, with the weight of each route.
    fn expand(&self, query_term: &str, options: &SearchOptions) -> HashMap<&str, f64> {
        let mut matches: HashMap<&str, f64> = HashMap::new();
        let query_len = query_term.chars().count() as f64;

        if let Some((term, _)) = self.terms.get_key_value(query_term) {
            matches.insert(term.as_str(), 1.0);
        }

        if options.prefix {
            for term in self
                .terms
                .range::<str, _>((
                    std::ops::Bound::Excluded(query_term),
                    std::ops::Bound::Unbounded,
                ))
                .map(|(term, _)| term)
                .take_while(|term| term.starts_with(query_term))
            {
                let extra = term.chars().count() as f64 - query_len;
                let weight = PREFIX_WEIGHT * query_len / (query_len + 0.3 * extra);
                upsert_max(&mut matches, term.as_str(), weight);
            }
        }

        let max_distance = fuzzy_distance(query_term, options.fuzzy);
        if max_distance > 0 {
            let query_chars: Vec<char> = query_term.chars().collect();
            for term in self.terms.keys() {
                let term_chars: Vec<char> = term.chars().collect();
                if term_chars.len().abs_diff(query_chars.len()) > max_distance {
                    continue;
                }
                if let Some(distance) = bounded_levenshtein(&query_chars, &term_chars, max_distance)
                {
                    if distance > 0 {
                        let weight = FUZZY_WEIGHT * query_len / (query_len + distance as f64);
                        upsert_max(&mut matches, term.as_str(), weight);
                    }
                }
            }
        }

        matches
    }

    /// Rank documents against `query`, best first.
    ///
    /// Ties keep insertion order. An empty query or index yields no hits.
    pub fn search(&self, query: &str, options: &SearchOptions) -> Vec<SearchHit> {
        if self.is_empty() {
            return Vec::new();
        }

        let mut query_terms = tokenize(query);
        let mut seen = std::collections::HashSet::new();
        query_terms.retain(|t| seen.insert(t.clone()));

        let total = self.document_ids.len() as f64;
        let averages = self.average_lengths();

        // ordinal -> (summed score, matched query terms)
        let mut accumulated: HashMap<u32, (f64, u32)> = HashMap::new();

        for query_term in &query_terms {
            let mut term_scores: HashMap<u32, f64> = HashMap::new();

            for (term, weight) in self.expand(query_term, options) {
                let Some(by_field) = self.terms.get(term) else {
                    continue;
                };

                for (&field, postings) in by_field {
                    let matching = postings.len() as f64;
                    let idf = (1.0 + (total - matching + 0.5) / (matching + 0.5)).ln();

                    for (&doc, &tf) in postings {
                        let tf = tf as f64;
                        let length = self.field_lengths[doc as usize][field] as f64;
                        let norm = K1 * (1.0 - B + B * length / averages[field]);
                        let score = idf * (DELTA + tf * (K1 + 1.0) / (tf + norm));
                        *term_scores.entry(doc).or_insert(0.0) += weight * score;
                    }
                }
            }

            for (doc, score) in term_scores {
                let entry = accumulated.entry(doc).or_insert((0.0, 0));
                entry.0 += score;
                entry.1 += 1;
            }
        }

        let mut ranked: Vec<(u32, f64)> = accumulated
            .into_iter()
            .map(|(doc, (score, matched))| (doc, score * matched as f64))
            .collect();

        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

        ranked
            .into_iter()
            .map(|(doc, score)| SearchHit {
                id: self.document_ids[doc as usize].clone(),
                score,
            })
            .collect()
    }
}

fn upsert_max<'a>(matches: &mut HashMap<&'a str, f64>, term: &'a str, weight: f64) {
    let entry = matches.entry(term).or_insert(weight);
    if weight > *entry {
        *entry = weight;
    }
}

/// Largest edit distance tolerated for `term` at the given fraction.
fn fuzzy_distance(term: &str, fuzzy: f64) -> usize {
    if fuzzy <= 0.0 {
        return 0;
    }
    let length = term.chars().count() as f64;
    ((fuzzy * length).round() as usize).min(MAX_FUZZY_DISTANCE)
}

/// Levenshtein distance, or `None` once it must exceed `max`.
fn bounded_levenshtein(a: &[char], b: &[char], max: usize) -> Option<usize> {
    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        let mut row_min = current[0];

        for (j, cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != cb);
            current[j + 1] = substitution
                .min(previous[j + 1] + 1)
                .min(current[j] + 1);
            row_min = row_min.min(current[j + 1]);
        }

        if row_min > max {
            return None;
        }
        std::mem::swap(&mut previous, &mut current);
    }

    let distance = previous[b.len()];
    (distance <= max).then_some(distance)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_index() -> LexicalIndex {
        let mut index = LexicalIndex::new(&CHUNK_FIELDS);
        index
            .add_all(vec![
                (
                    "audit.md-en-0",
                    vec!["We start every engagement with an automation audit.", "audit"],
                ),
                (
                    "dashboards.md-en-0",
                    vec!["Dashboards in Looker Studio or Metabase.", "dashboards"],
                ),
                (
                    "chatbots.md-en-0",
                    vec!["Lightweight RAG chatbots built on embeddings.", "chatbots"],
                ),
            ])
            .unwrap();
        index
    }

    fn ids(hits: &[SearchHit]) -> Vec<&str> {
        hits.iter().map(|h| h.id.as_str()).collect()
    }

    #[test]
    fn test_tokenize() {
        assert_eq!(
            tokenize("Hello, World! n8n/Zapier — automatización"),
            vec!["hello", "world", "n8n", "zapier", "automatización"]
        );
        assert!(tokenize("  ... ").is_empty());
    }

    #[test]
    fn test_exact_match_ranks_first() {
        let index = sample_index();
        let hits = index.search("metabase", &SearchOptions::default());

        assert_eq!(ids(&hits), vec!["dashboards.md-en-0"]);
        assert!(hits[0].score > 0.0);
    }

    #[test]
    fn test_prefix_match() {
        let index = sample_index();

        let hits = index.search("dashb", &SearchOptions::default());
        assert_eq!(ids(&hits), vec!["dashboards.md-en-0"]);

        let no_prefix = SearchOptions {
            prefix: false,
            fuzzy: 0.0,
        };
        assert!(index.search("dashb", &no_prefix).is_empty());
    }

    #[test]
    fn test_fuzzy_match_tolerates_typos() {
        let index = sample_index();

        // "chatbts" is one deletion away from "chatbots".
        let hits = index.search("chatbts", &SearchOptions::default());
        assert_eq!(ids(&hits), vec!["chatbots.md-en-0"]);

        let strict = SearchOptions {
            prefix: true,
            fuzzy: 0.0,
        };
        assert!(index.search("chatbts", &strict).is_empty());
    }

    #[test]
    fn test_exact_beats_expansion() {
        let mut index = LexicalIndex::new(&CHUNK_FIELDS);
        index
            .add_all(vec![
                ("a", vec!["automation services", "a"]),
                ("b", vec!["auto repair", "b"]),
            ])
            .unwrap();

        let hits = index.search("auto", &SearchOptions::default());
        assert_eq!(ids(&hits), vec!["b", "a"]);
        assert!(hits[0].score > hits[1].score);
    }

    #[test]
    fn test_more_matched_terms_rank_higher() {
        let mut index = LexicalIndex::new(&CHUNK_FIELDS);
        index
            .add_all(vec![
                ("one", vec!["privacy consent", "x"]),
                ("both", vec!["privacy consent unsubscribe", "y"]),
            ])
            .unwrap();

        let hits = index.search("consent unsubscribe", &SearchOptions::default());
        assert_eq!(hits[0].id, "both");
    }

    #[test]
    fn test_title_field_is_searched() {
        let index = sample_index();
        let hits = index.search("audit", &SearchOptions::default());
        assert_eq!(hits[0].id, "audit.md-en-0");
    }

    #[test]
    fn test_empty_query_and_index() {
        let index = sample_index();
        assert!(index.search("", &SearchOptions::default()).is_empty());
        assert!(index.search("?!", &SearchOptions::default()).is_empty());

        let empty = LexicalIndex::new(&CHUNK_FIELDS);
        assert!(empty.search("audit", &SearchOptions::default()).is_empty());
    }

    #[test]
    fn test_add_rejects_bad_documents() {
        let mut index = LexicalIndex::new(&CHUNK_FIELDS);
        assert!(index.add("a", &["only one field"]).is_err());

        index.add("a", &["text", "title"]).unwrap();
        assert!(index.add("a", &["text", "title"]).is_err());
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_json_round_trip_preserves_ranking() {
        let index = sample_index();
        let restored = LexicalIndex::from_json(&index.to_json().unwrap()).unwrap();

        assert_eq!(restored, index);
        let options = SearchOptions::default();
        assert_eq!(
            restored.search("embeddings chatbots", &options),
            index.search("embeddings chatbots", &options)
        );
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        assert!(matches!(
            LexicalIndex::from_json("{\"fields\": 3}"),
            Err(AppError::Artifact(_))
        ));
    }

    #[test]
    fn test_from_json_rejects_dangling_postings() {
        let mut index = sample_index();
        index
            .terms
            .entry("ghost".to_string())
            .or_default()
            .entry(0)
            .or_default()
            .insert(99, 1);

        let json = index.to_json().unwrap();
        assert!(LexicalIndex::from_json(&json).is_err());
    }

    #[test]
    fn test_bounded_levenshtein() {
        let chars = |s: &str| s.chars().collect::<Vec<_>>();
        assert_eq!(bounded_levenshtein(&chars("kitten"), &chars("sitting"), 3), Some(3));
        assert_eq!(bounded_levenshtein(&chars("kitten"), &chars("sitting"), 2), None);
        assert_eq!(bounded_levenshtein(&chars("same"), &chars("same"), 0), Some(0));
    }

    #[test]
    fn test_fuzzy_distance() {
        assert_eq!(fuzzy_distance("chatbots", 0.2), 2);
        assert_eq!(fuzzy_distance("ai", 0.2), 0);
        assert_eq!(fuzzy_distance("chatbots", 0.0), 0);
        assert_eq!(fuzzy_distance(&"x".repeat(100), 0.2), 6);
    }
}
