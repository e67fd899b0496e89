//! Local sentence-transformer embeddings (BERT + mean pooling) through `candle`.
//!
//! Weights and tokenizer are fetched from the Hugging Face hub on first use and cached by
//! `hf-hub`. Loading and inference are CPU bound and run on the blocking pool.

use super::{EmbeddingClient, EmbeddingClientError};
use async_trait::async_trait;
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use hf_hub::api::sync::Api;
use hf_hub::{Repo, RepoType};
use std::sync::Arc;
use tokenizers::{Tokenizer, TruncationParams};
use tokio::sync::OnceCell;

struct SentenceModel {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
}

impl SentenceModel {
    fn load(model_id: &str) -> Result<Self, EmbeddingClientError> {
        let failed = |what: &str, error: String| {
            EmbeddingClientError::ModelLoadFailed(format!("{model_id} {what}: {error}"))
        };
        let device = Device::Cpu;
        tracing::info!(model = model_id, "Loading local embedding model");

        let api = Api::new().map_err(|e| failed("hub", e.to_string()))?;
        let repo = api.repo(Repo::new(model_id.to_string(), RepoType::Model));
        let config_path = repo
            .get("config.json")
            .map_err(|e| failed("config.json", e.to_string()))?;
        let tokenizer_path = repo
            .get("tokenizer.json")
            .map_err(|e| failed("tokenizer.json", e.to_string()))?;
        let weights_path = repo
            .get("model.safetensors")
            .map_err(|e| failed("model.safetensors", e.to_string()))?;

        let config_contents = std::fs::read_to_string(&config_path)
            .map_err(|e| failed("read config", e.to_string()))?;
        let config: BertConfig = serde_json::from_str(&config_contents)
            .map_err(|e| failed("parse config", e.to_string()))?;

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| failed("tokenizer", e.to_string()))?;
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: config.max_position_embeddings,
                ..Default::default()
            }))
            .map_err(|e| failed("truncation", e.to_string()))?;

        // SAFETY: safetensors files are memory-mapped read-only.
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[weights_path], DType::F32, &device)
                .map_err(|e| failed("weights", e.to_string()))?
        };
        let model = BertModel::load(vb, &config).map_err(|e| failed("model", e.to_string()))?;

        tracing::info!(model = model_id, "Local embedding model ready");
        Ok(Self {
            model,
            tokenizer,
            device,
        })
    }

    fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        let inference = |error: candle_core::Error| {
            EmbeddingClientError::GenerationFailed(format!("inference: {error}"))
        };

        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| EmbeddingClientError::GenerationFailed(format!("tokenization: {e}")))?;
        let max_len = encodings
            .iter()
            .map(|encoding| encoding.get_ids().len())
            .max()
            .unwrap_or(0);

        let batch = texts.len();
        let mut input_ids = Vec::with_capacity(batch * max_len);
        let mut type_ids = Vec::with_capacity(batch * max_len);
        let mut attention = Vec::with_capacity(batch * max_len);
        for encoding in &encodings {
            let pad = max_len - encoding.get_ids().len();
            input_ids.extend_from_slice(encoding.get_ids());
            input_ids.extend(std::iter::repeat_n(0u32, pad));
            type_ids.extend_from_slice(encoding.get_type_ids());
            type_ids.extend(std::iter::repeat_n(0u32, pad));
            attention.extend_from_slice(encoding.get_attention_mask());
            attention.extend(std::iter::repeat_n(0u32, pad));
        }

        let input_ids =
            Tensor::from_vec(input_ids, (batch, max_len), &self.device).map_err(inference)?;
        let type_ids =
            Tensor::from_vec(type_ids, (batch, max_len), &self.device).map_err(inference)?;
        let attention =
            Tensor::from_vec(attention, (batch, max_len), &self.device).map_err(inference)?;

        let hidden = self
            .model
            .forward(&input_ids, &type_ids, Some(&attention))
            .map_err(inference)?;

        // Mean pooling over real tokens only.
        let mask = attention.to_dtype(DType::F32).map_err(inference)?;
        let summed = hidden
            .broadcast_mul(&mask.unsqueeze(2).map_err(inference)?)
            .and_then(|masked| masked.sum(1))
            .map_err(inference)?;
        let counts = mask
            .sum(1)
            .and_then(|counts| counts.unsqueeze(1))
            .map_err(inference)?;
        let pooled = summed.broadcast_div(&counts).map_err(inference)?;

        let mut vectors = Vec::with_capacity(batch);
        for row in 0..batch {
            let mut values: Vec<f32> = pooled
                .get(row)
                .and_then(|vector| vector.to_vec1())
                .map_err(inference)?;
            l2_normalize(&mut values);
            vectors.push(values);
        }
        Ok(vectors)
    }
}

fn l2_normalize(values: &mut [f32]) {
    let norm = values.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        values.iter_mut().for_each(|x| *x /= norm);
    }
}

/// Sentence-transformer embedder running in-process (default model `all-MiniLM-L6-v2`).
///
/// The model is loaded lazily on the first request so start-up stays fast and offline.
pub struct SentenceEmbeddingClient {
    model_id: String,
    model: OnceCell<Arc<SentenceModel>>,
}

impl SentenceEmbeddingClient {
    /// Build a client for a Hugging Face model id such as
    /// `sentence-transformers/all-MiniLM-L6-v2`.
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            model: OnceCell::new(),
        }
    }

    async fn model(&self) -> Result<Arc<SentenceModel>, EmbeddingClientError> {
        self.model
            .get_or_try_init(|| async {
                let model_id = self.model_id.clone();
                let model =
                    tokio::task::spawn_blocking(move || SentenceModel::load(&model_id))
                        .await
                        .map_err(|e| EmbeddingClientError::ModelLoadFailed(e.to_string()))??;
                Ok::<_, EmbeddingClientError>(Arc::new(model))
            })
            .await
            .cloned()
    }
}

#[async_trait]
impl EmbeddingClient for SentenceEmbeddingClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        if texts.is_empty() {
            return Err(EmbeddingClientError::GenerationFailed(
                "no texts provided".to_string(),
            ));
        }
        let model = self.model().await?;
        tracing::debug!(model = %self.model_id, count = texts.len(), "Encoding locally");
        tokio::task::spawn_blocking(move || model.encode(&texts))
            .await
            .map_err(|e| EmbeddingClientError::GenerationFailed(e.to_string()))?
    }
}
