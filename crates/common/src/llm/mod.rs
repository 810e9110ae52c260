//! LLM backend client
//!
//! Single point of contact with the chat-completion and embeddings
//! endpoints:
//! - Provider autodetection (OpenAI-style vs OpenRouter-style)
//! - Bounded retry with exponential backoff; quota errors never retried
//! - Structured-output parsing with a defensive JSON path
//! - Deterministic hash-embedding fallback

mod http;
pub mod parse;

pub use http::HttpLlmClient;

use crate::errors::AppError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Dimension of fallback embeddings (chat-emitted and hash-derived)
pub const FALLBACK_EMBEDDING_DIM: usize = 128;

/// LLM call failures
#[derive(Error, Debug, Clone)]
pub enum LlmError {
    /// Quota/exhaustion signal; never retried
    #[error("LLM quota exhausted: {message}")]
    Quota {
        message: String,
        retry_after_secs: Option<u64>,
    },

    /// Transient condition (5xx, network, plain rate-limit); retried
    #[error("LLM transient error: {message}")]
    Transient {
        message: String,
        status_code: Option<u16>,
    },

    /// The backend answered but the payload was unusable
    #[error("LLM invalid response: {message}")]
    InvalidResponse { message: String },
}

impl LlmError {
    pub fn is_quota(&self) -> bool {
        matches!(self, LlmError::Quota { .. })
    }
}

impl From<LlmError> for AppError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::Quota {
                retry_after_secs, ..
            } => AppError::LlmQuota { retry_after_secs },
            other => AppError::LlmUnavailable {
                message: other.to_string(),
            },
        }
    }
}

/// Chat message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One chat turn
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Per-call options; unset fields fall back to configuration
#[derive(Debug, Clone, Default)]
pub struct ChatOptions {
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

/// Token accounting reported by the backend
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

/// Successful chat outcome
#[derive(Debug, Clone)]
pub struct ChatOutcome {
    pub content: String,
    pub model: String,
    pub finish_reason: Option<String>,
    pub usage: Option<TokenUsage>,
}

/// Raw chat text plus the best-effort JSON parse of its first object
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub raw: String,
    pub parsed: Option<serde_json::Value>,
}

/// Chat-completion surface
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        opts: &ChatOptions,
    ) -> std::result::Result<ChatOutcome, LlmError>;

    /// Chat plus a best-effort parse of the first JSON object in the
    /// response. Callers schema-validate the parsed payload.
    async fn evaluate(
        &self,
        system: &str,
        prompt: &str,
        opts: &ChatOptions,
    ) -> std::result::Result<Evaluation, LlmError> {
        let messages = [ChatMessage::system(system), ChatMessage::user(prompt)];
        let outcome = self.chat(&messages, opts).await?;
        let parsed = parse::extract_json(&outcome.content);
        Ok(Evaluation {
            raw: outcome.content,
            parsed,
        })
    }
}

/// Embedding surface
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, LlmError>;

    async fn embed_batch(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, LlmError>;
}

/// Detected backend flavor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    OpenAi,
    OpenRouter,
}

impl Provider {
    /// Classify the backend from the configured key, base URL and
    /// optional override ("openai" | "openrouter" | "auto").
    pub fn detect(api_key: Option<&str>, base_url: Option<&str>, provider_override: &str) -> Self {
        match provider_override {
            "openai" => return Provider::OpenAi,
            "openrouter" => return Provider::OpenRouter,
            _ => {}
        }

        if let Some(url) = base_url {
            if url.contains("openrouter") {
                return Provider::OpenRouter;
            }
        }
        if let Some(key) = api_key {
            if key.starts_with("sk-or-") {
                return Provider::OpenRouter;
            }
        }
        Provider::OpenAi
    }

    pub fn name(&self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::OpenRouter => "openrouter",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            Provider::OpenAi => "https://api.openai.com/v1",
            Provider::OpenRouter => "https://openrouter.ai/api/v1",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Provider::OpenAi => "gpt-4o-mini",
            Provider::OpenRouter => "openai/gpt-4o-mini",
        }
    }

    pub fn default_embedding_model(&self) -> &'static str {
        match self {
            Provider::OpenAi => "text-embedding-3-small",
            Provider::OpenRouter => "openai/text-embedding-3-small",
        }
    }

    /// Name of the completion token limit field in the chat request
    pub fn token_limit_field(&self) -> &'static str {
        match self {
            Provider::OpenAi => "max_completion_tokens",
            Provider::OpenRouter => "max_tokens",
        }
    }

    /// Resolve a requested model against this provider. A model name
    /// that clearly belongs to the other flavor (OpenRouter names are
    /// `vendor/model`, OpenAI names are bare) is replaced by the
    /// provider default. Returns the model and whether a substitution
    /// happened.
    pub fn resolve_model(&self, requested: Option<&str>) -> (String, bool) {
        let Some(requested) = requested.filter(|m| !m.is_empty()) else {
            return (self.default_model().to_string(), false);
        };

        let namespaced = requested.contains('/');
        let valid = match self {
            Provider::OpenAi => !namespaced,
            Provider::OpenRouter => namespaced,
        };

        if valid {
            (requested.to_string(), false)
        } else {
            (self.default_model().to_string(), true)
        }
    }
}

/// Deterministic 128-dim embedding derived from character codes.
/// The same text always yields the same unit-norm vector.
pub fn hash_embedding(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0_f32; FALLBACK_EMBEDDING_DIM];

    for (position, ch) in text.chars().enumerate() {
        let code = ch as u32 as usize;
        let index = (code * 31 + position * 7) % FALLBACK_EMBEDDING_DIM;
        let value = (code % 97) as f32 / 48.5 - 1.0;
        vector[index] += value;
    }

    l2_normalize(&mut vector);
    vector
}

/// Scale a vector to unit norm; a zero vector becomes a unit basis
/// vector so downstream cosine math never divides by zero.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    } else if let Some(first) = vector.first_mut() {
        *first = 1.0;
    }
}
