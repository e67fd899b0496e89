//! Source citation for retrieved chunks.
//!
//! The rule is simple: the first whitespace-delimited token of the question is
//! the keyword, and every retrieved chunk containing it (case-insensitive substring) is cited
//! in retrieval order. When nothing matches, the top-ranked chunk is cited alone. Match counts
//! are not ranked, later query words are ignored and duplicate citations are kept.

use super::types::Chunk;
use std::path::Path;

const UNKNOWN_SOURCE: &str = "Unknown";
const UNKNOWN_PAGE: &str = "N/A";

/// First whitespace-delimited token of `query`, if any.
pub fn query_keyword(query: &str) -> Option<&str> {
    query.split_whitespace().next()
}

/// Format a chunk's origin as `{basename} (Page {page})`.
pub fn format_source(chunk: &Chunk) -> String {
    let source = chunk
        .source
        .as_deref()
        .map(|path| {
            Path::new(path)
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.to_string())
        })
        .unwrap_or_else(|| UNKNOWN_SOURCE.to_string());
    let page = chunk
        .page
        .map(|page| page.to_string())
        .unwrap_or_else(|| UNKNOWN_PAGE.to_string());
    format!("{source} (Page {page})")
}

/// Pick citation strings for `retrieved` (ordered best first).
///
/// A blank `query` has no keyword and gets the top-chunk fallback. `RagService::ask` rejects
/// blank questions before retrieval, so that case only arises for direct callers.
pub fn cite_sources(query: &str, retrieved: &[Chunk]) -> Vec<String> {
    let mut sources: Vec<String> = match query_keyword(query) {
        Some(keyword) => {
            let keyword = keyword.to_lowercase();
            retrieved
                .iter()
                .filter(|chunk| chunk.text.to_lowercase().contains(&keyword))
                .map(format_source)
                .collect()
        }
        None => Vec::new(),
    };

    if sources.is_empty() {
        if let Some(top) = retrieved.first() {
            sources.push(format_source(top));
        }
    }
    sources
}
