use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing ingestion and question-answering activity.
#[derive(Default)]
pub struct CodeMetrics {
    documents_indexed: AtomicU64,
    chunks_indexed: AtomicU64,
    questions_answered: AtomicU64,
    last_chunk_size: AtomicU64,
}

impl CodeMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an indexed upload batch.
    pub fn record_batch(&self, document_count: u64, chunk_count: u64, chunk_size: u64) {
        self.documents_indexed
            .fetch_add(document_count, Ordering::Relaxed);
        self.chunks_indexed.fetch_add(chunk_count, Ordering::Relaxed);
        self.last_chunk_size.store(chunk_size, Ordering::Relaxed);
    }

    /// Record a question that produced an answer.
    pub fn record_answer(&self) {
        self.questions_answered.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let last = self.last_chunk_size.load(Ordering::Relaxed);
        MetricsSnapshot {
            documents_indexed: self.documents_indexed.load(Ordering::Relaxed),
            chunks_indexed: self.chunks_indexed.load(Ordering::Relaxed),
            questions_answered: self.questions_answered.load(Ordering::Relaxed),
            last_chunk_size: (last > 0).then_some(last),
        }
    }
}

/// Immutable view of counters used for reporting.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Number of PDF files indexed since startup.
    pub documents_indexed: u64,
    /// Total chunks produced across all indexed batches.
    pub chunks_indexed: u64,
    /// Questions answered successfully by the language model.
    pub questions_answered: u64,
    /// Chunk size used by the most recent batch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_chunk_size: Option<u64>,
}
