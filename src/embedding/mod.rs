use crate::config::{Config, EmbeddingProvider, openai_api_key};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod local;

pub use local::SentenceEmbeddingClient;

const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Errors raised by embedding providers.
#[derive(Debug, Error)]
pub enum EmbeddingClientError {
    /// Hosted provider selected but its API key is not set.
    #[error("Missing API key: {0}")]
    MissingApiKey(String),
    /// Provider was unable to produce embeddings for the supplied input.
    #[error("Failed to generate embeddings: {0}")]
    GenerationFailed(String),
    /// Local model weights or tokenizer could not be loaded.
    #[error("Failed to load embedding model: {0}")]
    ModelLoadFailed(String),
    /// Provider answered with a payload we could not use.
    #[error("Malformed embedding response: {0}")]
    InvalidResponse(String),
}

/// Interface implemented by embedding backends.
#[async_trait]
pub trait EmbeddingClient {
    /// Produce an embedding vector for each supplied chunk of text.
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError>;
}

/// Deterministic feature-hashing embedder over lowercase word tokens.
///
/// Each word lands in one of `dimension` slots with a hash-derived sign, so texts sharing
/// vocabulary score high under cosine similarity. Purely lexical and offline; used when no
/// model is available and in tests.
pub struct HashEmbeddingClient {
    dimension: usize,
}

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

fn fnv1a(word: &str) -> u64 {
    word.bytes()
        .fold(FNV_OFFSET, |hash, byte| (hash ^ u64::from(byte)).wrapping_mul(FNV_PRIME))
}

impl HashEmbeddingClient {
    /// Construct a hashing embedder producing `dimension`-sized vectors.
    pub const fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn encode(text: &str, dimension: usize) -> Vec<f32> {
        let mut embedding = vec![0.0_f32; dimension];

        let words = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|word| !word.is_empty())
            .map(str::to_lowercase);
        for word in words {
            let hash = fnv1a(&word);
            let slot = (hash % dimension as u64) as usize;
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            embedding[slot] += sign;
        }

        let norm = embedding.iter().map(|value| value * value).sum::<f32>().sqrt();
        if norm > 0.0 {
            embedding.iter_mut().for_each(|value| *value /= norm);
        }
        embedding
    }
}

#[async_trait]
impl EmbeddingClient for HashEmbeddingClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        if self.dimension == 0 {
            return Err(EmbeddingClientError::GenerationFailed(
                "embedding dimension must be greater than zero".to_string(),
            ));
        }
        if texts.is_empty() {
            return Err(EmbeddingClientError::GenerationFailed(
                "no texts provided".to_string(),
            ));
        }

        tracing::debug!(
            dimension = self.dimension,
            count = texts.len(),
            "Hashing embeddings"
        );
        Ok(texts
            .iter()
            .map(|text| Self::encode(text, self.dimension))
            .collect())
    }
}

#[derive(Serialize)]
struct OpenAiEmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct OpenAiEmbeddingResponse {
    data: Vec<OpenAiEmbeddingData>,
}

#[derive(Deserialize)]
struct OpenAiEmbeddingData {
    embedding: Vec<f32>,
}

/// OpenAI-compatible `/embeddings` client. The key is read from `OPENAI_API_KEY` per call.
pub struct OpenAiEmbeddingClient {
    http: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl OpenAiEmbeddingClient {
    /// Build a client against `base_url` (defaults to the public OpenAI API).
    pub fn new(base_url: Option<String>, model: String) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
            model,
            api_key: None,
        }
    }

    /// Use a fixed API key instead of reading the environment.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/embeddings", self.base_url.trim_end_matches('/'))
    }

    fn resolve_key(&self) -> Result<String, EmbeddingClientError> {
        match &self.api_key {
            Some(key) => Ok(key.clone()),
            None => openai_api_key()
                .map_err(|err| EmbeddingClientError::MissingApiKey(err.to_string())),
        }
    }
}

#[async_trait]
impl EmbeddingClient for OpenAiEmbeddingClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        if texts.is_empty() {
            return Err(EmbeddingClientError::GenerationFailed(
                "no texts provided".to_string(),
            ));
        }
        let api_key = self.resolve_key()?;

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(api_key)
            .json(&OpenAiEmbeddingRequest {
                model: &self.model,
                input: &texts,
            })
            .send()
            .await
            .map_err(|error| EmbeddingClientError::GenerationFailed(error.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingClientError::GenerationFailed(format!(
                "embeddings endpoint returned {status}: {body}"
            )));
        }

        let body: OpenAiEmbeddingResponse = response
            .json()
            .await
            .map_err(|error| EmbeddingClientError::InvalidResponse(error.to_string()))?;

        if body.data.len() != texts.len() {
            return Err(EmbeddingClientError::InvalidResponse(format!(
                "expected {} vectors, got {}",
                texts.len(),
                body.data.len()
            )));
        }

        Ok(body.data.into_iter().map(|item| item.embedding).collect())
    }
}

#[derive(Serialize)]
struct OllamaEmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
    truncate: bool,
}

#[derive(Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Client for a local Ollama runtime (`POST /api/embed`).
pub struct OllamaEmbeddingClient {
    http: Client,
    base_url: String,
    model: String,
}

impl OllamaEmbeddingClient {
    /// Build a client against the Ollama runtime at `base_url`.
    pub fn new(base_url: String, model: String) -> Self {
        Self {
            http: Client::new(),
            base_url,
            model,
        }
    }
}

#[async_trait]
impl EmbeddingClient for OllamaEmbeddingClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        if texts.is_empty() {
            return Err(EmbeddingClientError::GenerationFailed(
                "no texts provided".to_string(),
            ));
        }
        let url = format!("{}/api/embed", self.base_url.trim_end_matches('/'));
        let response = self
            .http
            .post(&url)
            .json(&OllamaEmbedRequest {
                model: &self.model,
                input: &texts,
                truncate: true,
            })
            .send()
            .await
            .map_err(|error| {
                EmbeddingClientError::GenerationFailed(format!(
                    "failed to reach Ollama at {}: {error}",
                    self.base_url
                ))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingClientError::GenerationFailed(format!(
                "Ollama returned {status}: {body}"
            )));
        }

        let body: OllamaEmbedResponse = response
            .json()
            .await
            .map_err(|error| EmbeddingClientError::InvalidResponse(error.to_string()))?;
        Ok(body.embeddings)
    }
}

/// Build an embedding client suitable for the current configuration.
pub fn get_embedding_client(config: &Config) -> Box<dyn EmbeddingClient + Send + Sync> {
    tracing::debug!(
        provider = ?config.embedding_provider,
        model = %config.embedding_model,
        dimension = config.embedding_dimension,
        "Selecting embedding client"
    );
    match config.embedding_provider {
        EmbeddingProvider::Local => {
            Box::new(SentenceEmbeddingClient::new(config.embedding_model.clone()))
        }
        EmbeddingProvider::Hash => Box::new(HashEmbeddingClient::new(config.embedding_dimension)),
        EmbeddingProvider::OpenAI => Box::new(OpenAiEmbeddingClient::new(
            config.embedding_base_url.clone(),
            config.embedding_model.clone(),
        )),
        EmbeddingProvider::Ollama => Box::new(OllamaEmbeddingClient::new(
            config
                .embedding_base_url
                .clone()
                .unwrap_or_else(|| config.ollama_url.clone()),
            config.embedding_model.clone(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::VectorIndex;
    use crate::processing::Chunk;
    use httpmock::{Method::POST, MockServer};
    use serde_json::json;

    #[tokio::test]
    async fn hash_client_is_deterministic_and_normalized() {
        let client = HashEmbeddingClient::new(16);
        let first = client
            .generate_embeddings(vec!["Error code 404".into(), "Error code 404".into()])
            .await
            .expect("embeddings");
        assert_eq!(first.len(), 2);
        assert_eq!(first[0], first[1]);
        let norm: f32 = first[0].iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn hash_client_ranks_shared_vocabulary_first() {
        let pages = [
            "Warranty: the device is covered for two years from the date of purchase.",
            "To fix error code 404, restart your router and check its cable.",
            "Cleaning: wipe the device with a dry cloth. Do not use solvents.",
            "Shipping: pack the device in its original box before returning it.",
        ];
        let client = HashEmbeddingClient::new(384);
        let vectors = client
            .generate_embeddings(pages.iter().map(|page| page.to_string()).collect())
            .await
            .expect("page vectors");
        let chunks = pages
            .iter()
            .enumerate()
            .map(|(position, text)| Chunk {
                text: text.to_string(),
                source: Some("uploads/manual.pdf".into()),
                page: Some(position as u32),
                position,
            })
            .collect();
        let index = VectorIndex::build(chunks, vectors).expect("index");

        for (query, expected_page) in [
            ("How do I fix error code 404?", 1),
            ("error 404", 1),
            ("what is the warranty period", 0),
        ] {
            let query_vector = client
                .generate_embeddings(vec![query.to_string()])
                .await
                .expect("query vector")
                .remove(0);
            let hits = index.search(&query_vector, 3);
            assert_eq!(hits[0].chunk.page, Some(expected_page), "query: {query}");
        }
    }

    #[tokio::test]
    async fn hash_client_ignores_case_and_punctuation() {
        let client = HashEmbeddingClient::new(64);
        let vectors = client
            .generate_embeddings(vec!["Error-404!".into(), "error 404".into()])
            .await
            .expect("vectors");
        assert_eq!(vectors[0], vectors[1]);
    }

    #[test]
    fn factory_defaults_to_local_model() {
        let config = Config::default();
        assert_eq!(config.embedding_provider, EmbeddingProvider::Local);
        assert_eq!(
            config.embedding_model,
            "sentence-transformers/all-MiniLM-L6-v2"
        );
    }

    #[tokio::test]
    async fn hash_client_rejects_zero_dimension() {
        let error = HashEmbeddingClient::new(0)
            .generate_embeddings(vec!["text".into()])
            .await
            .unwrap_err();
        assert!(matches!(error, EmbeddingClientError::GenerationFailed(_)));
    }

    #[tokio::test]
    async fn openai_client_posts_batch_and_parses_vectors() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/embeddings")
                    .header("authorization", "Bearer sk-test")
                    .json_body_partial(r#"{"model":"text-embedding-3-small"}"#);
                then.status(200).json_body(json!({
                    "data": [
                        { "embedding": [0.1, 0.2] },
                        { "embedding": [0.3, 0.4] }
                    ]
                }));
            })
            .await;

        let client = OpenAiEmbeddingClient::new(
            Some(server.base_url()),
            "text-embedding-3-small".into(),
        )
        .with_api_key("sk-test");
        let vectors = client
            .generate_embeddings(vec!["a".into(), "b".into()])
            .await
            .expect("vectors");

        mock.assert_async().await;
        assert_eq!(vectors, vec![vec![0.1, 0.2], vec![0.3, 0.4]]);
    }

    #[tokio::test]
    async fn openai_client_surfaces_error_status() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/embeddings");
                then.status(401).body("bad key");
            })
            .await;

        let client = OpenAiEmbeddingClient::new(Some(server.base_url()), "m".into())
            .with_api_key("sk-wrong");
        let error = client
            .generate_embeddings(vec!["a".into()])
            .await
            .unwrap_err();
        assert!(
            matches!(error, EmbeddingClientError::GenerationFailed(ref message) if message.contains("401"))
        );
    }

    #[tokio::test]
    async fn ollama_client_reads_embeddings_field() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/embed");
                then.status(200)
                    .json_body(json!({ "embeddings": [[1.0, 0.0, 0.0]] }));
            })
            .await;

        let client = OllamaEmbeddingClient::new(server.base_url(), "nomic-embed-text".into());
        let vectors = client
            .generate_embeddings(vec!["hello".into()])
            .await
            .expect("vectors");
        assert_eq!(vectors, vec![vec![1.0, 0.0, 0.0]]);
    }
}
