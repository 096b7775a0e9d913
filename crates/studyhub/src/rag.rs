//! Bounded text excerpts on resources, and substring search over them.

use serde::Serialize;
use tracing::{debug, warn};

use crate::db::resource_repo;
use crate::db::{Database, DatabaseError};
use crate::pipeline::IndexResult;

pub const DEFAULT_EXCERPT_CHARS: usize = 2000;

const SNIPPET_LEAD_CHARS: usize = 60;
const SNIPPET_CHARS: usize = 200;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub resource_id: String,
    pub title: String,
    pub snippet: String,
}

pub struct RagIndexer {
    db: Database,
    max_chars: usize,
}

impl RagIndexer {
    pub fn new(db: Database, max_chars: usize) -> Self {
        Self { db, max_chars }
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    /// Stores the first `max_chars` characters of `text` as the resource's
    /// excerpt. Running it again with the same text stores the same value.
    pub fn update(&self, resource_id: &str, text: &str) -> Result<IndexResult, DatabaseError> {
        let (excerpt, truncated) = excerpt(text, self.max_chars);
        let indexed = resource_repo::set_rag_content(&self.db, resource_id, excerpt)?;
        if !indexed {
            warn!(resource_id, "Resource disappeared before its excerpt was stored");
        }

        let excerpt_chars = excerpt.chars().count();
        debug!(resource_id, excerpt_chars, truncated, "RAG excerpt updated");
        Ok(IndexResult {
            indexed,
            excerpt_chars,
            truncated,
        })
    }

    /// Case-insensitive substring search over stored excerpts.
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, DatabaseError> {
        let query = query.trim();
        if query.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        // LIKE only folds ASCII case; the snippet search below is Unicode-aware.
        let hits = resource_repo::search_rag_content(&self.db, query, limit)?;
        Ok(hits
            .into_iter()
            .map(|hit| SearchHit {
                snippet: snippet(&hit.rag_content, query),
                resource_id: hit.resource_id,
                title: hit.title,
            })
            .collect())
    }
}

/// The first `max_chars` characters, cut on a char boundary.
pub fn excerpt(text: &str, max_chars: usize) -> (&str, bool) {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => (&text[..idx], true),
        None => (text, false),
    }
}

/// Char offset of the first case-insensitive occurrence of `needle`.
fn find_ignore_case(haystack: &[char], needle: &str) -> Option<usize> {
    let needle: Vec<char> = needle.chars().flat_map(char::to_lowercase).collect();
    if needle.is_empty() {
        return Some(0);
    }
    (0..haystack.len()).find(|&start| {
        let mut folded = haystack[start..].iter().flat_map(|c| c.to_lowercase());
        needle.iter().all(|n| folded.next() == Some(*n))
    })
}

fn snippet(content: &str, query: &str) -> String {
    let chars: Vec<char> = content.chars().collect();
    let start = find_ignore_case(&chars, query)
        .map(|pos| pos.saturating_sub(SNIPPET_LEAD_CHARS))
        .unwrap_or(0);
    let end = (start + SNIPPET_CHARS).min(chars.len());

    let mut out = String::new();
    if start > 0 {
        out.push('…');
    }
    out.extend(&chars[start..end]);
    if end < chars.len() {
        out.push('…');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::resource_repo::ResourceRow;

    fn setup() -> (Database, RagIndexer) {
        let db = Database::open_in_memory().unwrap();
        resource_repo::insert(&db, &ResourceRow::new("r1", "Networks past paper")).unwrap();
        let indexer = RagIndexer::new(db.clone(), DEFAULT_EXCERPT_CHARS);
        (db, indexer)
    }

    #[test]
    fn test_excerpt_is_bounded() {
        let (db, indexer) = setup();
        let text = "x".repeat(5000);
        let result = indexer.update("r1", &text).unwrap();
        assert!(result.indexed);
        assert!(result.truncated);
        assert_eq!(result.excerpt_chars, 2000);

        let stored = resource_repo::find_by_id(&db, "r1").unwrap().unwrap();
        assert_eq!(stored.rag_content.unwrap().chars().count(), 2000);
    }

    #[test]
    fn test_excerpt_counts_chars_not_bytes() {
        let text = "é".repeat(10);
        let (cut, truncated) = excerpt(&text, 4);
        assert_eq!(cut, "éééé");
        assert!(truncated);
        assert_eq!(excerpt("short", 2000), ("short", false));
    }

    #[test]
    fn test_update_is_idempotent() {
        let (db, indexer) = setup();
        indexer.update("r1", "TCP handshake").unwrap();
        indexer.update("r1", "TCP handshake").unwrap();
        let stored = resource_repo::find_by_id(&db, "r1").unwrap().unwrap();
        assert_eq!(stored.rag_content.as_deref(), Some("TCP handshake"));
    }

    #[test]
    fn test_update_missing_resource() {
        let (_db, indexer) = setup();
        let result = indexer.update("missing", "text").unwrap();
        assert!(!result.indexed);
    }

    #[test]
    fn test_search_returns_snippet() {
        let (_db, indexer) = setup();
        let text = format!("{} The three-way HANDSHAKE opens a connection.", "filler ".repeat(30));
        indexer.update("r1", &text).unwrap();

        let hits = indexer.search("handshake", 5).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].resource_id, "r1");
        assert_eq!(hits[0].title, "Networks past paper");
        assert!(hits[0].snippet.starts_with('…'));
        assert!(hits[0].snippet.contains("HANDSHAKE"));

        assert!(indexer.search("   ", 5).unwrap().is_empty());
        assert!(indexer.search("udp", 5).unwrap().is_empty());
    }

    #[test]
    fn test_find_ignore_case() {
        let chars: Vec<char> = "Ünïcode Text".chars().collect();
        assert_eq!(find_ignore_case(&chars, "text"), Some(8));
        assert_eq!(find_ignore_case(&chars, "ünï"), Some(0));
        assert_eq!(find_ignore_case(&chars, "zzz"), None);
    }
}
