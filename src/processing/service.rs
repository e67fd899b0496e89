//! Service coordinating upload ingestion and question answering.

use crate::{
    config::Config,
    embedding::{EmbeddingClient, get_embedding_client},
    index::VectorIndex,
    llm::{ChatClient, OpenRouterChatClient},
    metrics::{CodeMetrics, MetricsSnapshot},
    processing::{
        chunking::{SplitterSettings, split_documents},
        citation::cite_sources,
        loader::{DocumentLoader, PdfLoader, save_upload},
        session::{Session, SessionStore},
        types::{Answer, AskError, Chunk, IngestError, IngestOutcome, RetrievalError, Upload},
    },
};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

/// Abstraction over the pipeline used by the HTTP surface.
#[async_trait]
pub trait RagApi: Send + Sync {
    /// Store, parse, chunk and embed an upload batch, replacing the active session.
    async fn ingest(&self, uploads: Vec<Upload>) -> Result<IngestOutcome, IngestError>;

    /// Answer a question against the active session.
    async fn ask(&self, query: &str) -> Result<Answer, AskError>;

    /// Filenames of the active session, if any.
    async fn loaded_files(&self) -> Option<Vec<String>>;

    /// Retrieve the current metrics snapshot for diagnostics.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

/// Owns the loader, embedding and chat clients plus the active session.
///
/// Construct once at start-up and share through an `Arc`.
pub struct RagService {
    loader: Box<dyn DocumentLoader>,
    embedding_client: Box<dyn EmbeddingClient + Send + Sync>,
    chat_client: Box<dyn ChatClient>,
    sessions: SessionStore,
    metrics: Arc<CodeMetrics>,
    splitter: SplitterSettings,
    top_k: usize,
    upload_dir: PathBuf,
}

impl RagService {
    /// Build the service with the clients selected by `config`.
    pub fn new(config: &Config) -> Self {
        tracing::info!(
            provider = ?config.embedding_provider,
            llm_model = %config.llm_model,
            "Initializing question-answering service"
        );
        Self::with_clients(
            config,
            Box::new(PdfLoader::new()),
            get_embedding_client(config),
            Box::new(OpenRouterChatClient::new(
                config.llm_base_url.clone(),
                config.llm_model.clone(),
            )),
        )
    }

    /// Build the service around explicit collaborators.
    pub fn with_clients(
        config: &Config,
        loader: Box<dyn DocumentLoader>,
        embedding_client: Box<dyn EmbeddingClient + Send + Sync>,
        chat_client: Box<dyn ChatClient>,
    ) -> Self {
        Self {
            loader,
            embedding_client,
            chat_client,
            sessions: SessionStore::new(),
            metrics: Arc::new(CodeMetrics::new()),
            splitter: SplitterSettings::from_config(config),
            top_k: config.retrieval_top_k.max(1),
            upload_dir: config.upload_dir.clone(),
        }
    }

    /// Store, parse, chunk and embed an upload batch, then make it the active session.
    ///
    /// On failure the previously active session stays in place.
    pub async fn ingest(&self, uploads: Vec<Upload>) -> Result<IngestOutcome, IngestError> {
        let mut stored = Vec::with_capacity(uploads.len());
        for upload in &uploads {
            if let Some(entry) = save_upload(&self.upload_dir, upload).await? {
                stored.push(entry);
            }
        }
        if stored.is_empty() {
            return Err(IngestError::NoFiles);
        }
        tracing::info!(files = stored.len(), "Processing upload batch");

        let mut documents = Vec::with_capacity(stored.len());
        for (filename, path) in &stored {
            documents.push(self.loader.load(path, filename).await?);
        }
        let page_count = documents.iter().map(|doc| doc.pages.len()).sum();

        let chunks = split_documents(&documents, self.splitter)?;
        tracing::debug!(
            pages = page_count,
            chunks = chunks.len(),
            chunk_size = self.splitter.chunk_size,
            chunk_overlap = self.splitter.chunk_overlap,
            "Split upload batch"
        );

        let filenames: Vec<String> = stored.into_iter().map(|(name, _)| name).collect();
        let chunk_count = self.index_chunks(filenames.clone(), chunks).await?;

        Ok(IngestOutcome {
            filenames,
            page_count,
            chunk_count,
            chunk_size: self.splitter.chunk_size,
        })
    }

    /// Embed already split chunks and make them the active session.
    ///
    /// Returns the number of indexed chunks. An empty chunk list is rejected with
    /// [`IngestError::NoText`] and leaves the active session untouched.
    pub async fn index_chunks(
        &self,
        filenames: Vec<String>,
        chunks: Vec<Chunk>,
    ) -> Result<usize, IngestError> {
        if chunks.is_empty() {
            return Err(IngestError::NoText);
        }

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let embeddings = self.embedding_client.generate_embeddings(texts).await?;
        let chunk_count = chunks.len();
        let index = VectorIndex::build(chunks, embeddings)?;

        let document_count = filenames.len();
        let session = Session::new(filenames, index);
        let session_id = session.id();
        self.sessions.replace(session).await;

        self.metrics.record_batch(
            document_count as u64,
            chunk_count as u64,
            self.splitter.chunk_size as u64,
        );
        tracing::info!(
            session = %session_id,
            files = document_count,
            chunks = chunk_count,
            "Upload batch indexed"
        );
        Ok(chunk_count)
    }

    /// Retrieve context for `query`, pick citations and ask the language model.
    pub async fn ask(&self, query: &str) -> Result<Answer, AskError> {
        let session = self.sessions.current().await.ok_or(AskError::NoDocument)?;
        if query.trim().is_empty() {
            return Err(AskError::EmptyQuery);
        }

        let mut vectors = self
            .embedding_client
            .generate_embeddings(vec![query.to_string()])
            .await
            .map_err(RetrievalError::from)?;
        let vector = vectors.pop().ok_or(RetrievalError::EmptyEmbedding)?;

        let retrieved: Vec<_> = session
            .index()
            .search(&vector, self.top_k)
            .into_iter()
            .map(|hit| hit.chunk)
            .collect();
        let context = retrieved
            .iter()
            .map(|chunk| chunk.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        let sources = cite_sources(query, &retrieved);
        tracing::debug!(
            session = %session.id(),
            retrieved = retrieved.len(),
            citations = sources.len(),
            "Retrieved context"
        );

        let text = self.chat_client.complete(query, Some(&context)).await?;
        self.metrics.record_answer();
        tracing::info!(
            session = %session.id(),
            citations = sources.len(),
            answer_chars = text.len(),
            "Question answered"
        );

        Ok(Answer {
            text,
            sources,
            retrieved,
        })
    }

    /// Filenames of the active session, if any.
    pub async fn loaded_files(&self) -> Option<Vec<String>> {
        self.sessions
            .current()
            .await
            .map(|session| session.filenames().to_vec())
    }

    /// Return the current metrics snapshot.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

#[async_trait]
impl RagApi for RagService {
    async fn ingest(&self, uploads: Vec<Upload>) -> Result<IngestOutcome, IngestError> {
        RagService::ingest(self, uploads).await
    }

    async fn ask(&self, query: &str) -> Result<Answer, AskError> {
        RagService::ask(self, query).await
    }

    async fn loaded_files(&self) -> Option<Vec<String>> {
        RagService::loaded_files(self).await
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        RagService::metrics_snapshot(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbeddingClient;
    use crate::llm::ChatClientError;
    use crate::processing::types::{Document, LoaderError, Page};
    use std::path::Path;
    use tokio::sync::Mutex;

    struct StubLoader {
        pages: Vec<&'static str>,
    }

    #[async_trait]
    impl DocumentLoader for StubLoader {
        async fn load(&self, path: &Path, filename: &str) -> Result<Document, LoaderError> {
            Ok(Document {
                filename: filename.to_string(),
                source: path.to_path_buf(),
                pages: self
                    .pages
                    .iter()
                    .enumerate()
                    .map(|(idx, text)| Page {
                        number: idx as u32,
                        text: text.to_string(),
                    })
                    .collect(),
            })
        }
    }

    #[derive(Default)]
    struct RecordingChat {
        calls: Mutex<Vec<(String, Option<String>)>>,
        fail: bool,
    }

    #[async_trait]
    impl ChatClient for Arc<RecordingChat> {
        async fn complete(
            &self,
            query: &str,
            context: Option<&str>,
        ) -> Result<String, ChatClientError> {
            self.calls
                .lock()
                .await
                .push((query.to_string(), context.map(str::to_string)));
            if self.fail {
                return Err(ChatClientError::RequestFailed("connection refused".into()));
            }
            Ok(format!("Answer to: {query}"))
        }
    }

    fn test_config() -> Config {
        Config {
            upload_dir: std::env::temp_dir().join(format!("pdfqa-svc-{}", uuid::Uuid::new_v4())),
            embedding_dimension: 64,
            ..Config::default()
        }
    }

    fn service(pages: Vec<&'static str>, chat: Arc<RecordingChat>) -> (RagService, Config) {
        let config = test_config();
        let service = RagService::with_clients(
            &config,
            Box::new(StubLoader { pages }),
            Box::new(HashEmbeddingClient::new(config.embedding_dimension)),
            Box::new(chat),
        );
        (service, config)
    }

    fn upload(name: &str) -> Upload {
        Upload {
            filename: name.to_string(),
            bytes: b"%PDF-1.4".to_vec(),
        }
    }

    #[tokio::test]
    async fn ask_before_upload_reports_no_document() {
        let chat = Arc::new(RecordingChat::default());
        let (service, _config) = service(vec!["text"], chat.clone());
        let error = service.ask("anything").await.unwrap_err();
        assert!(matches!(error, AskError::NoDocument));
        assert!(chat.calls.lock().await.is_empty());
    }

    #[tokio::test]
    async fn ingest_then_ask_returns_answer_with_citations() {
        let chat = Arc::new(RecordingChat::default());
        let (service, config) = service(
            vec![
                "Error 404 means the manual page is missing.",
                "Power cycle the unit to recover.",
            ],
            chat.clone(),
        );

        let outcome = service
            .ingest(vec![upload("manual.pdf")])
            .await
            .expect("ingest");
        assert_eq!(outcome.filenames, vec!["manual.pdf"]);
        assert_eq!(outcome.page_count, 2);
        assert_eq!(outcome.chunk_count, 2);
        assert!(config.upload_dir.join("manual.pdf").exists());

        let answer = service.ask("error 404 procedure").await.expect("answer");
        assert_eq!(answer.text, "Answer to: error 404 procedure");
        assert_eq!(answer.retrieved.len(), 2);
        assert_eq!(answer.sources, vec!["manual.pdf (Page 0)"]);

        let calls = chat.calls.lock().await;
        let context = calls[0].1.as_deref().expect("context");
        assert!(context.contains("Error 404"));
        assert!(context.contains("\n\n"));

        let metrics = service.metrics_snapshot();
        assert_eq!(metrics.documents_indexed, 1);
        assert_eq!(metrics.questions_answered, 1);

        std::fs::remove_dir_all(&config.upload_dir).ok();
    }

    #[tokio::test]
    async fn retrieval_is_limited_to_top_k() {
        let chat = Arc::new(RecordingChat::default());
        let (service, config) = service(vec!["one", "two", "three", "four", "five"], chat);
        service.ingest(vec![upload("a.pdf")]).await.expect("ingest");
        let answer = service.ask("zzz").await.expect("answer");
        assert_eq!(answer.retrieved.len(), 3);
        assert_eq!(answer.sources.len(), 1);
        std::fs::remove_dir_all(&config.upload_dir).ok();
    }

    #[tokio::test]
    async fn upstream_failure_is_tagged() {
        let chat = Arc::new(RecordingChat {
            fail: true,
            ..RecordingChat::default()
        });
        let (service, config) = service(vec!["text"], chat);
        service.ingest(vec![upload("a.pdf")]).await.expect("ingest");
        let error = service.ask("text").await.unwrap_err();
        assert!(matches!(error, AskError::Upstream(_)));
        assert_eq!(service.metrics_snapshot().questions_answered, 0);
        std::fs::remove_dir_all(&config.upload_dir).ok();
    }

    #[tokio::test]
    async fn blank_query_is_rejected_before_retrieval() {
        let chat = Arc::new(RecordingChat::default());
        let (service, config) = service(vec!["text"], chat.clone());
        service.ingest(vec![upload("a.pdf")]).await.expect("ingest");
        for blank in ["", "   ", "\t\n"] {
            assert!(matches!(
                service.ask(blank).await.unwrap_err(),
                AskError::EmptyQuery
            ));
        }
        assert!(chat.calls.lock().await.is_empty());
        assert_eq!(service.metrics_snapshot().questions_answered, 0);
        std::fs::remove_dir_all(&config.upload_dir).ok();
    }

    #[tokio::test]
    async fn failed_batch_keeps_previous_session() {
        let chat = Arc::new(RecordingChat::default());
        let config = test_config();
        let service = RagService::with_clients(
            &config,
            Box::new(StubLoader { pages: vec!["first batch text"] }),
            Box::new(HashEmbeddingClient::new(32)),
            Box::new(chat),
        );
        service.ingest(vec![upload("first.pdf")]).await.expect("ingest");

        let error = service.ingest(vec![upload("")]).await.unwrap_err();
        assert!(matches!(error, IngestError::NoFiles));
        assert_eq!(
            service.loaded_files().await,
            Some(vec!["first.pdf".to_string()])
        );
        std::fs::remove_dir_all(&config.upload_dir).ok();
    }

    #[tokio::test]
    async fn blank_pages_only_is_no_text() {
        let chat = Arc::new(RecordingChat::default());
        let (service, config) = service(vec!["", "   "], chat);
        let error = service.ingest(vec![upload("scan.pdf")]).await.unwrap_err();
        assert!(matches!(error, IngestError::NoText));
        assert!(service.loaded_files().await.is_none());
        std::fs::remove_dir_all(&config.upload_dir).ok();
    }
}
