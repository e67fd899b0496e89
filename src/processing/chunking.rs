//! Page splitting with bounded, overlapping chunks.
//!
//! - Boundaries come from `semchunk-rs`, which prefers paragraph, sentence and word breaks.
//! - Base chunks are cut at `chunk_size - chunk_overlap`; the overlap then copies the trailing
//!   words of the previous chunk into the next one and the result is trimmed back under
//!   `chunk_size`.
//! - Length is measured in characters by default. With `TEXT_SPLITTER_LENGTH_UNIT=tokens` it
//!   is measured in `cl100k_base` tokens; when that encoding cannot be loaded the splitter falls
//!   back to a whitespace counter.
//! - Every page is split on its own, so a chunk never spans two pages.

use super::types::{Chunk, ChunkingError, Document};
use crate::config::{Config, LengthUnit};
use semchunk_rs::Chunker;
use std::sync::Arc;
use tiktoken_rs::cl100k_base;

type LengthCounter = Arc<dyn Fn(&str) -> usize + Send + Sync>;

/// Splitter parameters for one ingestion batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitterSettings {
    /// Hard upper bound on chunk length.
    pub chunk_size: usize,
    /// Length copied from the end of one chunk into the start of the next.
    pub chunk_overlap: usize,
    /// How length is measured.
    pub length_unit: LengthUnit,
}

impl SplitterSettings {
    /// Read splitter parameters from configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            chunk_size: config.text_splitter_chunk_size,
            chunk_overlap: config.text_splitter_chunk_overlap,
            length_unit: config.text_splitter_length_unit,
        }
    }
}

/// Split every page of every document into chunks carrying source and page metadata.
///
/// Positions are assigned in order across the whole batch. Identical input always yields an
/// identical chunk sequence.
pub fn split_documents(
    documents: &[Document],
    settings: SplitterSettings,
) -> Result<Vec<Chunk>, ChunkingError> {
    check_budget(settings.chunk_size, settings.chunk_overlap)?;
    let counter = build_length_counter(settings.length_unit)?;

    let mut chunks = Vec::new();
    for document in documents {
        let source = document.source.to_string_lossy().into_owned();
        for page in &document.pages {
            if page.text.trim().is_empty() {
                continue;
            }
            let texts = chunk_text_with_counter(
                &page.text,
                settings.chunk_size,
                settings.chunk_overlap,
                counter.clone(),
            );
            for text in texts {
                if text.trim().is_empty() {
                    continue;
                }
                chunks.push(Chunk {
                    text,
                    source: Some(source.clone()),
                    page: Some(page.number),
                    position: chunks.len(),
                });
            }
        }
        tracing::debug!(
            filename = %document.filename,
            chunks_so_far = chunks.len(),
            "Split document"
        );
    }
    Ok(chunks)
}

/// Chunk a single text. Returns an empty vector when the input is all whitespace.
pub fn chunk_text(
    text: &str,
    chunk_size: usize,
    overlap: usize,
    length_unit: LengthUnit,
) -> Result<Vec<String>, ChunkingError> {
    check_budget(chunk_size, overlap)?;
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    let counter = build_length_counter(length_unit)?;
    Ok(chunk_text_with_counter(text, chunk_size, overlap, counter))
}

fn check_budget(chunk_size: usize, chunk_overlap: usize) -> Result<(), ChunkingError> {
    if chunk_size == 0 {
        return Err(ChunkingError::InvalidChunkSize);
    }
    if chunk_overlap >= chunk_size {
        return Err(ChunkingError::InvalidOverlap {
            chunk_size,
            chunk_overlap,
        });
    }
    Ok(())
}

fn build_length_counter(unit: LengthUnit) -> Result<LengthCounter, ChunkingError> {
    match unit {
        LengthUnit::Characters => Ok(character_counter()),
        LengthUnit::Tokens => match build_tiktoken_counter() {
            Ok(counter) => Ok(counter),
            Err(error) => {
                tracing::warn!(
                    error = %error,
                    "Tokenizer unavailable; falling back to whitespace counter"
                );
                Ok(whitespace_counter())
            }
        },
    }
}

fn build_tiktoken_counter() -> Result<LengthCounter, ChunkingError> {
    let encoding = cl100k_base().map_err(|source| ChunkingError::Tokenizer {
        encoding: "cl100k_base".to_string(),
        source,
    })?;
    let encoding = Arc::new(encoding);
    Ok(Arc::new(move |segment: &str| {
        encoding.encode_ordinary(segment).len()
    }))
}

fn character_counter() -> LengthCounter {
    Arc::new(|segment: &str| segment.chars().count())
}

fn whitespace_counter() -> LengthCounter {
    Arc::new(|segment: &str| {
        let tokens = segment.split_whitespace().count();
        if tokens == 0 && !segment.is_empty() {
            1
        } else {
            tokens
        }
    })
}

fn chunk_text_with_counter(
    text: &str,
    chunk_size: usize,
    overlap: usize,
    counter: LengthCounter,
) -> Vec<String> {
    let counter_for_chunker = counter.clone();
    let chunker = Chunker::new(
        chunk_size - overlap,
        Box::new(move |segment: &str| counter_for_chunker.as_ref()(segment)),
    );
    let base_chunks = chunker.chunk(text);
    apply_overlap(base_chunks, chunk_size, overlap, &counter)
}

/// Prefix each chunk after the first with the tail of its predecessor, staying within budget.
fn apply_overlap(
    chunks: Vec<String>,
    chunk_size: usize,
    overlap: usize,
    counter: &LengthCounter,
) -> Vec<String> {
    if chunks.len() < 2 || overlap == 0 {
        return chunks;
    }

    let mut overlapped = Vec::with_capacity(chunks.len());
    let mut previous: Option<String> = None;
    for current in chunks {
        let next = match previous.as_deref() {
            Some(prev) => build_overlapped_chunk(prev, &current, overlap, chunk_size, counter),
            None => current.clone(),
        };
        overlapped.push(next);
        previous = Some(current);
    }
    overlapped
}

fn build_overlapped_chunk(
    previous: &str,
    current: &str,
    overlap: usize,
    chunk_size: usize,
    counter: &LengthCounter,
) -> String {
    let tail = trailing_words_within(previous, overlap, counter);
    let mut combined = String::with_capacity(tail.len() + current.len() + 1);

    if !tail.is_empty() {
        combined.push_str(tail);
        let needs_space = !tail.ends_with(char::is_whitespace)
            && !current.starts_with(char::is_whitespace);
        if needs_space {
            combined.push(' ');
        }
    }

    combined.push_str(current);
    longest_suffix_within(&combined, chunk_size, counter).to_string()
}

/// Longest suffix of `text` starting at a word boundary whose length is at most `limit`.
fn trailing_words_within<'a>(text: &'a str, limit: usize, counter: &LengthCounter) -> &'a str {
    let trimmed = text.trim_start();
    if counter.as_ref()(trimmed) <= limit {
        return trimmed;
    }

    let mut previous_was_space = false;
    for (offset, ch) in text.char_indices() {
        if previous_was_space && !ch.is_whitespace() && counter.as_ref()(&text[offset..]) <= limit
        {
            return &text[offset..];
        }
        previous_was_space = ch.is_whitespace();
    }
    ""
}

/// Longest whitespace-trimmed suffix of `text` whose length is at most `limit`.
fn longest_suffix_within<'a>(text: &'a str, limit: usize, counter: &LengthCounter) -> &'a str {
    if limit == 0 {
        return "";
    }
    let trimmed = text.trim_start();
    if counter.as_ref()(trimmed) <= limit {
        return trimmed;
    }

    for (offset, _) in text.char_indices().skip(1) {
        let candidate = text[offset..].trim_start();
        if counter.as_ref()(candidate) <= limit {
            return candidate;
        }
    }
    ""
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::types::Page;
    use std::path::PathBuf;

    fn document(name: &str, pages: &[&str]) -> Document {
        Document {
            filename: name.to_string(),
            source: PathBuf::from("uploads").join(name),
            pages: pages
                .iter()
                .enumerate()
                .map(|(idx, text)| Page {
                    number: idx as u32,
                    text: text.to_string(),
                })
                .collect(),
        }
    }

    fn settings(chunk_size: usize, chunk_overlap: usize) -> SplitterSettings {
        SplitterSettings {
            chunk_size,
            chunk_overlap,
            length_unit: LengthUnit::Characters,
        }
    }

    #[test]
    fn whitespace_counter_respects_chunk_size() {
        let text = "one two three four five";
        let chunks = chunk_text_with_counter(text, 2, 0, whitespace_counter());
        assert_eq!(chunks, vec!["one two", "three four", "five"]);
    }

    #[test]
    fn whitespace_counter_applies_overlap() {
        let text = "one two three four five";
        let counter = whitespace_counter();
        let chunks = chunk_text_with_counter(text, 3, 1, counter.clone());
        assert_eq!(chunks, vec!["one two", "two three four", "four five"]);
        for chunk in &chunks {
            assert!(counter.as_ref()(chunk) <= 3);
        }
    }

    #[test]
    fn chunk_text_handles_blank_input() {
        let chunks = chunk_text("  \n\t ", 10, 2, LengthUnit::Characters).expect("chunks");
        assert!(chunks.is_empty());
    }

    #[test]
    fn chunk_text_rejects_zero_chunk_size() {
        let error = chunk_text("hello", 0, 0, LengthUnit::Characters).unwrap_err();
        assert!(matches!(error, ChunkingError::InvalidChunkSize));
    }

    #[test]
    fn overlap_must_leave_room_for_new_text() {
        let text = "Error code 404 means the requested page could not be found. ".repeat(4);
        let error = chunk_text(&text, 100, 200, LengthUnit::Characters).unwrap_err();
        assert!(matches!(
            error,
            ChunkingError::InvalidOverlap {
                chunk_size: 100,
                chunk_overlap: 200
            }
        ));
        assert!(matches!(
            chunk_text(&text, 100, 100, LengthUnit::Characters).unwrap_err(),
            ChunkingError::InvalidOverlap { .. }
        ));

        let docs = vec![document("manual.pdf", &[text.as_str()])];
        assert!(matches!(
            split_documents(&docs, settings(50, 80)).unwrap_err(),
            ChunkingError::InvalidOverlap { .. }
        ));
    }

    #[test]
    fn character_chunks_never_exceed_budget() {
        let text = "Error code 404 means the page could not be found. ".repeat(40);
        let chunks = chunk_text(&text, 120, 30, LengthUnit::Characters).expect("chunks");
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 120, "chunk too long: {chunk:?}");
        }
    }

    #[test]
    fn consecutive_chunks_share_overlap() {
        let text = (0..200)
            .map(|n| format!("word{n}"))
            .collect::<Vec<_>>()
            .join(" ");
        let overlapped = chunk_text(&text, 80, 20, LengthUnit::Characters).expect("overlapped");
        assert!(overlapped.len() > 2);
        for pair in overlapped.windows(2) {
            let first_word_of_next = pair[1].split_whitespace().next().expect("word");
            assert!(
                pair[0].contains(first_word_of_next),
                "expected {first_word_of_next} to repeat from previous chunk"
            );
        }
    }

    #[test]
    fn token_unit_counts_bpe_tokens() {
        let text = "The quick brown fox jumps over the lazy dog.";
        let chunks = chunk_text(text, 5, 0, LengthUnit::Tokens).expect("chunks");
        let counter = build_tiktoken_counter().expect("encoding");
        for chunk in &chunks {
            assert!(counter.as_ref()(chunk) <= 5);
        }
        let rejoined: Vec<&str> = chunks.iter().flat_map(|c| c.split_whitespace()).collect();
        let original: Vec<&str> = text.split_whitespace().collect();
        assert_eq!(rejoined, original);
    }

    #[test]
    fn split_documents_is_idempotent() {
        let docs = vec![
            document("manual.pdf", &["First page text. ".repeat(30).as_str(), "Second."]),
            document("guide.pdf", &["Guide body. ".repeat(20).as_str()]),
        ];
        let first = split_documents(&docs, settings(100, 20)).expect("first");
        let second = split_documents(&docs, settings(100, 20)).expect("second");
        assert_eq!(first, second);
    }

    #[test]
    fn split_documents_tags_source_page_and_position() {
        let docs = vec![document("manual.pdf", &["", "Only page one has text."])];
        let chunks = split_documents(&docs, settings(1000, 200)).expect("chunks");
        assert_eq!(chunks.len(), 1);
        let chunk = &chunks[0];
        assert_eq!(chunk.text, "Only page one has text.");
        assert_eq!(chunk.page, Some(1));
        assert_eq!(chunk.position, 0);
        let source = chunk.source.as_deref().expect("source");
        assert!(source.ends_with("manual.pdf"));
    }

    #[test]
    fn split_documents_numbers_positions_across_batch() {
        let docs = vec![
            document("a.pdf", &["alpha one", "alpha two"]),
            document("b.pdf", &["beta"]),
        ];
        let chunks = split_documents(&docs, settings(1000, 200)).expect("chunks");
        let positions: Vec<usize> = chunks.iter().map(|c| c.position).collect();
        assert_eq!(positions, vec![0, 1, 2]);
        assert_eq!(chunks[2].text, "beta");
    }
}
