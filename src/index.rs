//! In-memory vector index with exact cosine-similarity search.
//!
//! The index is built once per upload batch and never mutated afterwards; a new batch builds a
//! new index.

use crate::processing::Chunk;
use thiserror::Error;

/// Errors raised while assembling an index.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Chunks and vectors are not parallel.
    #[error("received {vectors} vectors for {chunks} chunks")]
    LengthMismatch {
        /// Chunk count.
        chunks: usize,
        /// Vector count.
        vectors: usize,
    },
    /// Vectors in one batch do not share a dimension.
    #[error("vector {position} has dimension {actual}, expected {expected}")]
    DimensionMismatch {
        /// Offending chunk position.
        position: usize,
        /// Dimension of the first vector.
        expected: usize,
        /// Dimension found.
        actual: usize,
    },
}

#[derive(Debug, Clone)]
struct IndexEntry {
    chunk: Chunk,
    embedding: Vec<f32>,
}

/// A retrieved chunk with its similarity score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    /// Retrieved chunk.
    pub chunk: Chunk,
    /// Cosine similarity against the query vector.
    pub score: f32,
}

/// Immutable collection of `(chunk, embedding)` pairs.
#[derive(Debug, Clone, Default)]
pub struct VectorIndex {
    entries: Vec<IndexEntry>,
    dimension: usize,
}

impl VectorIndex {
    /// Build an index from parallel chunk and embedding lists.
    pub fn build(chunks: Vec<Chunk>, embeddings: Vec<Vec<f32>>) -> Result<Self, IndexError> {
        if chunks.len() != embeddings.len() {
            return Err(IndexError::LengthMismatch {
                chunks: chunks.len(),
                vectors: embeddings.len(),
            });
        }

        let dimension = embeddings.first().map(Vec::len).unwrap_or(0);
        let mut entries = Vec::with_capacity(chunks.len());
        for (position, (chunk, embedding)) in chunks.into_iter().zip(embeddings).enumerate() {
            if embedding.len() != dimension {
                return Err(IndexError::DimensionMismatch {
                    position,
                    expected: dimension,
                    actual: embedding.len(),
                });
            }
            entries.push(IndexEntry { chunk, embedding });
        }

        Ok(Self { entries, dimension })
    }

    /// Number of indexed chunks.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index holds no chunks.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Vector dimension shared by all entries (0 when empty).
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Return the `k` most similar chunks, best first.
    ///
    /// Ties keep insertion order, so results are deterministic for a given index.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<ScoredChunk> {
        let mut scored: Vec<(f32, usize)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(idx, entry)| (cosine_similarity(query, &entry.embedding), idx))
            .collect();

        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.1.cmp(&b.1))
        });
        scored.truncate(k);

        scored
            .into_iter()
            .map(|(score, idx)| ScoredChunk {
                chunk: self.entries[idx].chunk.clone(),
                score,
            })
            .collect()
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let (dot, norm_a, norm_b) = a
        .iter()
        .zip(b)
        .fold((0.0f32, 0.0f32, 0.0f32), |(dot, na, nb), (x, y)| {
            (dot + x * y, na + x * x, nb + y * y)
        });

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 { 0.0 } else { dot / denom }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(text: &str, position: usize) -> Chunk {
        Chunk {
            text: text.to_string(),
            source: Some("uploads/manual.pdf".into()),
            page: Some(position as u32),
            position,
        }
    }

    fn sample_index() -> VectorIndex {
        VectorIndex::build(
            vec![chunk("north", 0), chunk("east", 1), chunk("north-east", 2)],
            vec![vec![0.0, 1.0], vec![1.0, 0.0], vec![0.7, 0.7]],
        )
        .expect("index")
    }

    #[test]
    fn search_orders_by_cosine_similarity() {
        let hits = sample_index().search(&[0.1, 1.0], 3);
        let texts: Vec<&str> = hits.iter().map(|hit| hit.chunk.text.as_str()).collect();
        assert_eq!(texts, vec!["north", "north-east", "east"]);
        assert!(hits[0].score > hits[1].score);
    }

    #[test]
    fn search_truncates_to_k() {
        let hits = sample_index().search(&[1.0, 0.0], 1);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.text, "east");
    }

    #[test]
    fn ties_keep_insertion_order() {
        let index = VectorIndex::build(
            vec![chunk("first", 0), chunk("second", 1)],
            vec![vec![1.0, 0.0], vec![1.0, 0.0]],
        )
        .expect("index");
        let hits = index.search(&[1.0, 0.0], 2);
        assert_eq!(hits[0].chunk.text, "first");
        assert_eq!(hits[1].chunk.text, "second");
    }

    #[test]
    fn build_rejects_mismatched_inputs() {
        let error = VectorIndex::build(vec![chunk("a", 0)], vec![]).unwrap_err();
        assert!(matches!(error, IndexError::LengthMismatch { chunks: 1, vectors: 0 }));

        let error = VectorIndex::build(
            vec![chunk("a", 0), chunk("b", 1)],
            vec![vec![1.0, 0.0], vec![1.0]],
        )
        .unwrap_err();
        assert!(matches!(error, IndexError::DimensionMismatch { position: 1, .. }));
    }

    #[test]
    fn zero_vectors_score_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }
}
