//! Core data types and error definitions for the question-answering pipeline.

use crate::{
    config::ConfigError, embedding::EmbeddingClientError, index::IndexError, llm::ChatClientError,
};
use anyhow::Error as TokenizerError;
use axum::http::StatusCode;
use std::path::PathBuf;
use thiserror::Error;

/// One page of extracted PDF text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// Zero-based page index inside the source PDF.
    pub number: u32,
    /// Extracted text; may be empty for image-only pages.
    pub text: String,
}

/// One uploaded file and its pages in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Filename as stored under the upload directory.
    pub filename: String,
    /// Path of the stored file; used as the chunk source.
    pub source: PathBuf,
    /// Pages in document order.
    pub pages: Vec<Page>,
}

/// A bounded text segment carried through embedding, retrieval and citation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Segment text.
    pub text: String,
    /// Source path of the originating file, when known.
    pub source: Option<String>,
    /// Page index of the originating page, when known.
    pub page: Option<u32>,
    /// Position within the batch's split sequence.
    pub position: usize,
}

/// A raw upload received from a client.
#[derive(Debug, Clone)]
pub struct Upload {
    /// Client-supplied filename.
    pub filename: String,
    /// File contents.
    pub bytes: Vec<u8>,
}

/// Summary of a completed upload batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestOutcome {
    /// Filenames stored for this batch, in upload order.
    pub filenames: Vec<String>,
    /// Total pages extracted across the batch.
    pub page_count: usize,
    /// Chunks produced and indexed.
    pub chunk_count: usize,
    /// Chunk size used during splitting.
    pub chunk_size: usize,
}

/// Answer to a question together with the material it was grounded on.
#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    /// Raw completion text (markdown).
    pub text: String,
    /// Formatted citation strings, e.g. `manual.pdf (Page 3)`.
    pub sources: Vec<String>,
    /// Chunks retrieved for the question, most relevant first.
    pub retrieved: Vec<Chunk>,
}

/// Errors raised while reading PDF files.
#[derive(Debug, Error)]
pub enum LoaderError {
    /// Filesystem operation on the upload directory failed.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// File or directory that failed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// PDF parser rejected the file.
    #[error("Failed to extract text from {filename}: {reason}")]
    ExtractionFailed {
        /// Offending file.
        filename: String,
        /// Parser diagnostic.
        reason: String,
    },
    /// Blocking extraction task panicked or was cancelled.
    #[error("PDF extraction task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Errors produced while turning page text into chunks.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// Ingestion configured an impossible length budget.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
    /// Overlap would leave no room for new text in a chunk.
    #[error("chunk overlap ({chunk_overlap}) must be smaller than chunk size ({chunk_size})")]
    InvalidOverlap {
        /// Configured chunk size.
        chunk_size: usize,
        /// Configured overlap.
        chunk_overlap: usize,
    },
    /// Tokenizer resources were unavailable.
    #[error("failed to initialize tokenizer '{encoding}': {source}")]
    Tokenizer {
        /// Encoding we attempted to load.
        encoding: String,
        /// Underlying error raised by the tokenizer library.
        #[source]
        source: TokenizerError,
    },
}

/// Errors emitted by the upload pipeline.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Request carried no usable PDF file.
    #[error("No PDF files were uploaded.")]
    NoFiles,
    /// Every page of every file was empty.
    #[error("No extractable text found in the uploaded PDFs.")]
    NoText,
    /// Loading a file failed.
    #[error(transparent)]
    Loader(#[from] LoaderError),
    /// Chunking step failed to segment the text.
    #[error("Failed to chunk document: {0}")]
    Chunking(#[from] ChunkingError),
    /// Embedding provider failed to produce vectors.
    #[error(transparent)]
    Embedding(#[from] EmbeddingClientError),
    /// Embeddings could not be assembled into an index.
    #[error("Failed to build vector index: {0}")]
    Index(#[from] IndexError),
}

/// Errors raised while retrieving context for a question.
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// Embedding provider failed to embed the question.
    #[error(transparent)]
    Embedding(#[from] EmbeddingClientError),
    /// Embedding provider returned no vector for the question.
    #[error("Embedding provider returned no vector for the query")]
    EmptyEmbedding,
}

/// Errors surfaced when answering a question.
#[derive(Debug, Error)]
pub enum AskError {
    /// No upload batch has been indexed yet.
    #[error("No document loaded.")]
    NoDocument,
    /// Question was missing or blank.
    #[error("Query must not be empty.")]
    EmptyQuery,
    /// Required configuration (typically an API key) is missing.
    #[error(transparent)]
    Configuration(#[from] ConfigError),
    /// Context retrieval failed.
    #[error(transparent)]
    Retrieval(#[from] RetrievalError),
    /// Remote language model call failed.
    #[error(transparent)]
    Upstream(ChatClientError),
}

impl From<ChatClientError> for AskError {
    fn from(error: ChatClientError) -> Self {
        match error {
            ChatClientError::MissingApiKey(config) => Self::Configuration(config),
            other => Self::Upstream(other),
        }
    }
}

impl AskError {
    /// HTTP status used when the error crosses the JSON API.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NoDocument | Self::EmptyQuery => StatusCode::BAD_REQUEST,
            Self::Configuration(_) | Self::Retrieval(_) | Self::Upstream(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ask_error_statuses_split_client_and_server_faults() {
        assert_eq!(AskError::NoDocument.status(), StatusCode::BAD_REQUEST);
        assert_eq!(AskError::EmptyQuery.status(), StatusCode::BAD_REQUEST);
        let upstream = AskError::from(ChatClientError::EmptyCompletion);
        assert_eq!(upstream.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn missing_chat_key_becomes_configuration_error() {
        let error = AskError::from(ChatClientError::MissingApiKey(
            ConfigError::MissingVariable("OPENROUTER_API_KEY".into()),
        ));
        assert!(matches!(error, AskError::Configuration(_)));
        assert_eq!(
            error.to_string(),
            "Missing environment variable: OPENROUTER_API_KEY"
        );
    }

    #[test]
    fn no_document_message_matches_api_contract() {
        assert_eq!(AskError::NoDocument.to_string(), "No document loaded.");
    }
}
