use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;
use thiserror::Error;

const DEFAULT_UPLOAD_DIR: &str = "uploads";
const DEFAULT_CHUNK_SIZE: usize = 1000;
const DEFAULT_CHUNK_OVERLAP: usize = 200;
const DEFAULT_TOP_K: usize = 3;
const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";
const DEFAULT_LLM_BASE_URL: &str = "https://openrouter.ai/api/v1";
const DEFAULT_LLM_MODEL: &str = "deepseek/deepseek-chat-v3.1:free";

/// Environment variable holding the OpenRouter key used for chat completions.
pub const OPENROUTER_API_KEY: &str = "OPENROUTER_API_KEY";
/// Environment variable holding the OpenAI key (chat fallback and hosted embeddings).
pub const OPENAI_API_KEY: &str = "OPENAI_API_KEY";

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the question-answering server.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory that receives uploaded PDF files.
    pub upload_dir: PathBuf,
    /// Upper bound on chunk length, measured in `text_splitter_length_unit`.
    pub text_splitter_chunk_size: usize,
    /// Overlap carried from one chunk into the next.
    pub text_splitter_chunk_overlap: usize,
    /// Unit used to measure chunk length.
    pub text_splitter_length_unit: LengthUnit,
    /// Number of nearest chunks fetched for each question.
    pub retrieval_top_k: usize,
    /// Embedding provider used to generate vector representations.
    pub embedding_provider: EmbeddingProvider,
    /// Embedding model identifier passed to the provider; defaults per provider.
    pub embedding_model: String,
    /// Vector size of the hashing embedder (the other providers report their own size).
    pub embedding_dimension: usize,
    /// Optional base URL override for the OpenAI-compatible embeddings endpoint.
    pub embedding_base_url: Option<String>,
    /// Base URL of the Ollama runtime.
    pub ollama_url: String,
    /// Base URL of the OpenAI-compatible chat-completion API.
    pub llm_base_url: String,
    /// Model identifier sent with every chat completion.
    pub llm_model: String,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

/// Supported embedding backends for the processing pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmbeddingProvider {
    /// In-process sentence-transformer model fetched from the Hugging Face hub.
    Local,
    /// Deterministic word-hashing embedder; needs no model and no network access.
    Hash,
    /// Local Ollama runtime.
    Ollama,
    /// Hosted OpenAI embeddings API.
    OpenAI,
}

/// Length measure applied by the text splitter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LengthUnit {
    /// Unicode scalar values.
    Characters,
    /// `cl100k_base` BPE tokens.
    Tokens,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from(DEFAULT_UPLOAD_DIR),
            text_splitter_chunk_size: DEFAULT_CHUNK_SIZE,
            text_splitter_chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            text_splitter_length_unit: LengthUnit::Characters,
            retrieval_top_k: DEFAULT_TOP_K,
            embedding_provider: EmbeddingProvider::Local,
            embedding_model: EmbeddingProvider::Local.default_model().to_string(),
            embedding_dimension: EmbeddingProvider::Local.default_dimension(),
            embedding_base_url: None,
            ollama_url: DEFAULT_OLLAMA_URL.to_string(),
            llm_base_url: DEFAULT_LLM_BASE_URL.to_string(),
            llm_model: DEFAULT_LLM_MODEL.to_string(),
            server_port: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let embedding_provider = load_env_optional("EMBEDDING_PROVIDER")
            .map(|value| {
                value
                    .parse()
                    .map_err(|()| ConfigError::InvalidValue("EMBEDDING_PROVIDER".to_string()))
            })
            .transpose()?
            .unwrap_or(defaults.embedding_provider);
        let config = Self {
            upload_dir: load_env_optional("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.upload_dir),
            text_splitter_chunk_size: parse_optional("TEXT_SPLITTER_CHUNK_SIZE")?
                .unwrap_or(defaults.text_splitter_chunk_size),
            text_splitter_chunk_overlap: parse_optional("TEXT_SPLITTER_CHUNK_OVERLAP")?
                .unwrap_or(defaults.text_splitter_chunk_overlap),
            text_splitter_length_unit: load_env_optional("TEXT_SPLITTER_LENGTH_UNIT")
                .map(|value| {
                    value.parse().map_err(|()| {
                        ConfigError::InvalidValue("TEXT_SPLITTER_LENGTH_UNIT".to_string())
                    })
                })
                .transpose()?
                .unwrap_or(defaults.text_splitter_length_unit),
            retrieval_top_k: parse_optional("RETRIEVAL_TOP_K")?
                .unwrap_or(defaults.retrieval_top_k)
                .max(1),
            embedding_provider,
            embedding_model: load_env_optional("EMBEDDING_MODEL")
                .unwrap_or_else(|| embedding_provider.default_model().to_string()),
            embedding_dimension: parse_optional("EMBEDDING_DIMENSION")?
                .unwrap_or_else(|| embedding_provider.default_dimension()),
            embedding_base_url: load_env_optional("EMBEDDING_BASE_URL"),
            ollama_url: load_env_optional("OLLAMA_URL").unwrap_or(defaults.ollama_url),
            llm_base_url: load_env_optional("LLM_BASE_URL").unwrap_or(defaults.llm_base_url),
            llm_model: load_env_optional("LLM_MODEL").unwrap_or(defaults.llm_model),
            server_port: parse_optional("SERVER_PORT")?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject splitter settings that cannot produce sensible chunks.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.text_splitter_chunk_size == 0 {
            return Err(ConfigError::InvalidValue(
                "TEXT_SPLITTER_CHUNK_SIZE".to_string(),
            ));
        }
        if self.text_splitter_chunk_overlap >= self.text_splitter_chunk_size {
            return Err(ConfigError::InvalidValue(
                "TEXT_SPLITTER_CHUNK_OVERLAP".to_string(),
            ));
        }
        Ok(())
    }
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_optional<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

/// Resolve the chat-completion API key at call time.
///
/// `OPENROUTER_API_KEY` wins; `OPENAI_API_KEY` is accepted as a fallback.
pub fn chat_api_key() -> Result<String, ConfigError> {
    chat_api_key_from(|key| env::var(key).ok())
}

/// Resolve the OpenAI key used by the hosted embedding provider.
pub fn openai_api_key() -> Result<String, ConfigError> {
    openai_api_key_from(|key| env::var(key).ok())
}

/// [`chat_api_key`] against an arbitrary variable lookup.
pub fn chat_api_key_from(
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<String, ConfigError> {
    non_blank(&lookup, OPENROUTER_API_KEY)
        .or_else(|| non_blank(&lookup, OPENAI_API_KEY))
        .ok_or_else(|| ConfigError::MissingVariable(OPENROUTER_API_KEY.to_string()))
}

/// [`openai_api_key`] against an arbitrary variable lookup.
pub fn openai_api_key_from(
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<String, ConfigError> {
    non_blank(&lookup, OPENAI_API_KEY)
        .ok_or_else(|| ConfigError::MissingVariable(OPENAI_API_KEY.to_string()))
}

fn non_blank(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key).filter(|value| !value.trim().is_empty())
}

impl EmbeddingProvider {
    /// Model identifier each provider actually serves out of the box.
    pub const fn default_model(self) -> &'static str {
        match self {
            Self::Local => "sentence-transformers/all-MiniLM-L6-v2",
            Self::Hash => "word-hash",
            Self::Ollama => "nomic-embed-text",
            Self::OpenAI => "text-embedding-3-small",
        }
    }

    /// Vector size produced by [`Self::default_model`].
    pub const fn default_dimension(self) -> usize {
        match self {
            Self::Local | Self::Hash => 384,
            Self::Ollama => 768,
            Self::OpenAI => 1536,
        }
    }
}

impl std::str::FromStr for EmbeddingProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "local" | "sentence-transformers" | "candle" => Ok(Self::Local),
            "hash" => Ok(Self::Hash),
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAI),
            _ => Err(()),
        }
    }
}

impl std::str::FromStr for LengthUnit {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "characters" | "chars" => Ok(Self::Characters),
            "tokens" => Ok(Self::Tokens),
            _ => Err(()),
        }
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() {
    dotenvy::dotenv().ok();
    let config = Config::from_env().expect("Failed to load config from environment");
    tracing::debug!(
        upload_dir = %config.upload_dir.display(),
        chunk_size = config.text_splitter_chunk_size,
        chunk_overlap = config.text_splitter_chunk_overlap,
        top_k = config.retrieval_top_k,
        embedding_provider = ?config.embedding_provider,
        llm_model = %config.llm_model,
        server_port = ?config.server_port,
        "Loaded configuration"
    );
    CONFIG.set(config).expect("Failed to set config");
}
