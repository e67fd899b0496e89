//! Question-answering pipeline: PDF loading, chunking, embedding, retrieval and citation.

pub mod chunking;
pub mod citation;
pub mod loader;
mod service;
mod session;
pub mod types;

pub use loader::{DocumentLoader, PdfLoader};
pub use service::{RagApi, RagService};
pub use session::{Session, SessionStore};
pub use types::{
    Answer, AskError, Chunk, ChunkingError, Document, IngestError, IngestOutcome, LoaderError,
    Page, RetrievalError, Upload,
};
