//! Chat-completion client used to answer questions.
//!
//! The client talks to any OpenAI-compatible `/chat/completions` endpoint (OpenRouter by
//! default). One request per question: no retries, no backoff, no request timeout. The API key
//! is resolved when the call is made so a key added to the environment after start-up is
//! picked up without a restart.

use crate::config::{ConfigError, chat_api_key};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// System instruction sent ahead of every question.
pub const SYSTEM_PROMPT: &str = "You are a helpful assistant for technical documents.";

/// Errors surfaced while requesting an answer from the language model.
#[derive(Debug, Error)]
pub enum ChatClientError {
    /// No API key is configured for the chat endpoint.
    #[error(transparent)]
    MissingApiKey(#[from] ConfigError),
    /// Transport failed before a response arrived.
    #[error("Chat completion request failed: {0}")]
    RequestFailed(String),
    /// Endpoint answered with a non-success status.
    #[error("Chat completion endpoint returned {status}: {body}")]
    UpstreamStatus {
        /// HTTP status code.
        status: u16,
        /// Response body, verbatim.
        body: String,
    },
    /// Response body did not match the chat-completion schema.
    #[error("Malformed chat completion response: {0}")]
    InvalidResponse(String),
    /// Response carried no choices.
    #[error("Chat completion returned no choices")]
    EmptyCompletion,
}

/// One chat message in OpenAI wire format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// `system`, `user`, or `assistant`.
    pub role: String,
    /// Message body.
    pub content: String,
}

impl ChatMessage {
    fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

/// Assemble the message sequence for a question.
///
/// The context message is only present when `context` is non-empty.
pub fn build_messages(query: &str, context: Option<&str>) -> Vec<ChatMessage> {
    let mut messages = vec![ChatMessage::system(SYSTEM_PROMPT)];
    if let Some(context) = context.filter(|value| !value.is_empty()) {
        messages.push(ChatMessage::system(format!("Context: {context}")));
    }
    messages.push(ChatMessage::user(query));
    messages
}

/// Interface implemented by answer generators.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Answer `query`, optionally grounded in `context`, returning the raw completion text.
    async fn complete(
        &self,
        query: &str,
        context: Option<&str>,
    ) -> Result<String, ChatClientError>;
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// HTTP client for an OpenAI-compatible chat-completion API.
pub struct OpenRouterChatClient {
    http: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl OpenRouterChatClient {
    /// Build a client for `model` at `base_url`; the key is read from the environment per call.
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into(),
            model: model.into(),
            api_key: None,
        }
    }

    /// Use a fixed API key instead of reading the environment.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn resolve_key(&self) -> Result<String, ChatClientError> {
        match &self.api_key {
            Some(key) => Ok(key.clone()),
            None => Ok(chat_api_key()?),
        }
    }
}

#[async_trait]
impl ChatClient for OpenRouterChatClient {
    async fn complete(
        &self,
        query: &str,
        context: Option<&str>,
    ) -> Result<String, ChatClientError> {
        let api_key = self.resolve_key()?;
        let messages = build_messages(query, context);
        tracing::debug!(
            model = %self.model,
            messages = messages.len(),
            "Requesting chat completion"
        );

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(api_key)
            .json(&ChatCompletionRequest {
                model: &self.model,
                messages,
            })
            .send()
            .await
            .map_err(|error| ChatClientError::RequestFailed(error.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ChatClientError::UpstreamStatus { status, body });
        }

        let body: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|error| ChatClientError::InvalidResponse(error.to_string()))?;

        let first = body
            .choices
            .into_iter()
            .next()
            .ok_or(ChatClientError::EmptyCompletion)?;
        Ok(first.message.content.unwrap_or_default())
    }
}
