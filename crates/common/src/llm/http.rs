//! HTTP LLM client
//!
//! Speaks the chat-completion and embeddings protocols over reqwest.
//! Every outbound call is wrapped in bounded retry with exponential
//! backoff; explicit quota signals are propagated without retrying.

use super::parse::parse_float_list;
use super::{
    hash_embedding, l2_normalize, ChatMessage, ChatOptions, ChatOutcome, Embedder, LlmClient,
    LlmError, Provider, TokenUsage, FALLBACK_EMBEDDING_DIM,
};
use crate::config::LlmConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info, warn};

pub struct HttpLlmClient {
    client: reqwest::Client,
    provider: Provider,
    api_key: String,
    base_url: String,
    default_model: Option<String>,
    temperature: f32,
    max_tokens: u32,
    chat_timeout: Duration,
    embed_timeout: Duration,
    max_retries: u32,
    retry_base: Duration,
    referer: Option<String>,
    app_name: Option<String>,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    usage: Option<TokenUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingEntry>,
}

#[derive(Deserialize)]
struct EmbeddingEntry {
    embedding: Vec<f32>,
}

impl HttpLlmClient {
    /// Build a client from configuration without probing the backend
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let provider = Provider::detect(
            config.api_key.as_deref(),
            config.base_url.as_deref(),
            &config.provider,
        );

        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| provider.default_base_url().to_string());

        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| AppError::Internal {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            provider,
            api_key: config.api_key.clone().unwrap_or_default(),
            base_url: base_url.trim_end_matches('/').to_string(),
            default_model: config.default_model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            chat_timeout: config.chat_timeout(),
            embed_timeout: config.embed_timeout(),
            max_retries: config.max_retries.max(1),
            retry_base: Duration::from_millis(config.retry_base_ms),
            referer: config.referer.clone(),
            app_name: config.app_name.clone(),
        })
    }

    /// Build a client and probe `/models` for backend health
    pub async fn connect(config: &LlmConfig) -> Result<Self> {
        let client = Self::new(config)?;

        match client
            .client
            .get(format!("{}/models", client.base_url))
            .bearer_auth(&client.api_key)
            .timeout(Duration::from_secs(10))
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => {
                info!(provider = client.provider.name(), "LLM backend reachable");
            }
            Ok(response) => {
                warn!(
                    provider = client.provider.name(),
                    status = response.status().as_u16(),
                    "LLM backend health check returned an error"
                );
            }
            Err(e) => {
                warn!(
                    provider = client.provider.name(),
                    error = %e,
                    "LLM backend health check failed"
                );
            }
        }

        Ok(client)
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    fn resolve_model(&self, opts: &ChatOptions) -> String {
        let requested = opts.model.as_deref().or(self.default_model.as_deref());
        let (model, substituted) = self.provider.resolve_model(requested);
        if substituted {
            warn!(
                provider = self.provider.name(),
                requested = requested.unwrap_or_default(),
                substituted = %model,
                "Requested model is invalid for the detected provider"
            );
        }
        model
    }

    fn apply_headers(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let mut request = request.bearer_auth(&self.api_key);
        if self.provider == Provider::OpenRouter {
            if let Some(referer) = &self.referer {
                request = request.header("HTTP-Referer", referer);
            }
            if let Some(app_name) = &self.app_name {
                request = request.header("X-Title", app_name);
            }
        }
        request
    }

    async fn chat_once(&self, body: &serde_json::Value) -> std::result::Result<ChatOutcome, LlmError> {
        let response = self
            .apply_headers(
                self.client
                    .post(format!("{}/chat/completions", self.base_url)),
            )
            .timeout(self.chat_timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| LlmError::Transient {
                message: format!("chat request failed: {}", e),
                status_code: None,
            })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = parse_retry_after(response.headers());
            let text = response.text().await.unwrap_or_default();
            return Err(classify_failure(status.as_u16(), &text, retry_after));
        }

        let parsed: ChatCompletionResponse =
            response.json().await.map_err(|e| LlmError::InvalidResponse {
                message: format!("failed to parse chat response: {}", e),
            })?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse {
                message: "chat response has no choices".into(),
            })?;

        Ok(ChatOutcome {
            content: choice.message.content,
            model: parsed.model.unwrap_or_default(),
            finish_reason: choice.finish_reason,
            usage: parsed.usage,
        })
    }

    async fn embeddings_once(
        &self,
        texts: &[String],
    ) -> std::result::Result<Vec<Vec<f32>>, LlmError> {
        let body = json!({
            "model": self.provider.default_embedding_model(),
            "input": texts,
        });

        let response = self
            .apply_headers(self.client.post(format!("{}/embeddings", self.base_url)))
            .timeout(self.embed_timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Transient {
                message: format!("embeddings request failed: {}", e),
                status_code: None,
            })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = parse_retry_after(response.headers());
            let text = response.text().await.unwrap_or_default();
            return Err(classify_failure(status.as_u16(), &text, retry_after));
        }

        let parsed: EmbeddingsResponse =
            response.json().await.map_err(|e| LlmError::InvalidResponse {
                message: format!("failed to parse embeddings response: {}", e),
            })?;

        if parsed.data.len() != texts.len() {
            return Err(LlmError::InvalidResponse {
                message: format!(
                    "embeddings response count mismatch: {} for {} inputs",
                    parsed.data.len(),
                    texts.len()
                ),
            });
        }

        Ok(parsed.data.into_iter().map(|e| e.embedding).collect())
    }

    /// Retry transient failures with exponential backoff. Quota and
    /// invalid-response outcomes return immediately.
    async fn with_retry<T, F, Fut>(&self, operation: &str, call: F) -> std::result::Result<T, LlmError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = std::result::Result<T, LlmError>>,
    {
        let mut attempt = 0;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(LlmError::Transient {
                    message,
                    status_code,
                }) if attempt + 1 < self.max_retries => {
                    let delay = retry_delay(self.retry_base, attempt);
                    warn!(
                        operation,
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        status = status_code,
                        error = %message,
                        "Transient LLM failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Ask the chat endpoint to emit an embedding as plain floats.
    async fn chat_embedding(&self, text: &str) -> std::result::Result<Vec<f32>, LlmError> {
        let prompt = format!(
            "Respond with exactly {} comma-separated floating point numbers between -1 and 1 \
             that represent the semantics of the following text. No prose, no brackets.\n\n{}",
            FALLBACK_EMBEDDING_DIM, text
        );
        let messages = [ChatMessage::user(prompt)];
        let opts = ChatOptions {
            max_tokens: Some(2048),
            temperature: Some(0.0),
            ..Default::default()
        };

        let outcome = self.chat(&messages, &opts).await?;
        let mut values = parse_float_list(&outcome.content, FALLBACK_EMBEDDING_DIM).ok_or_else(
            || LlmError::InvalidResponse {
                message: "chat embedding output was not a float list".into(),
            },
        )?;
        l2_normalize(&mut values);
        Ok(values)
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        opts: &ChatOptions,
    ) -> std::result::Result<ChatOutcome, LlmError> {
        let model = self.resolve_model(opts);

        let mut body = json!({
            "model": model,
            "messages": messages,
            "temperature": opts.temperature.unwrap_or(self.temperature),
            "stream": false,
        });
        body[self.provider.token_limit_field()] =
            json!(opts.max_tokens.unwrap_or(self.max_tokens));

        let outcome = self.with_retry("chat", || self.chat_once(&body)).await?;
        debug!(
            model = %outcome.model,
            finish_reason = outcome.finish_reason.as_deref().unwrap_or(""),
            "Chat completion succeeded"
        );
        Ok(outcome)
    }
}

#[async_trait]
impl Embedder for HttpLlmClient {
    async fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, LlmError> {
        let texts = [text.to_string()];
        let embeddings = self.embed_batch(&texts).await?;
        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse {
                message: "empty embedding batch".into(),
            })
    }

    /// Embedding strategy, in order: the dedicated embeddings endpoint,
    /// chat-emitted float lists, then the deterministic hash embedding.
    /// The final fallback means this never fails.
    async fn embed_batch(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, LlmError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        match self
            .with_retry("embeddings", || self.embeddings_once(texts))
            .await
        {
            Ok(embeddings) => return Ok(embeddings),
            Err(e) => {
                warn!(error = %e, "Embeddings endpoint unavailable, falling back to chat");
            }
        }

        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            let vector = match self.chat_embedding(text).await {
                Ok(vector) => vector,
                Err(e) => {
                    warn!(error = %e, "Chat embedding failed, using hash embedding");
                    hash_embedding(text)
                }
            };
            embeddings.push(vector);
        }

        Ok(embeddings)
    }
}

/// Backoff before retry `attempt` (0-based): `base · 2^attempt`
fn retry_delay(base: Duration, attempt: u32) -> Duration {
    base * 2u32.saturating_pow(attempt)
}

/// Parse a Retry-After header value in seconds
fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

/// Classify a non-2xx response into the retry taxonomy.
///
/// Explicit quota/exhaustion signals become `Quota` and are never
/// retried; plain rate limits and server errors are `Transient`.
fn classify_failure(status: u16, body: &str, retry_after_secs: Option<u64>) -> LlmError {
    let lowered = body.to_lowercase();
    let quota_signal = lowered.contains("quota")
        || lowered.contains("insufficient")
        || lowered.contains("billing")
        || lowered.contains("exceeded your current");

    match status {
        402 => LlmError::Quota {
            message: truncate(body, 200),
            retry_after_secs,
        },
        429 if quota_signal => LlmError::Quota {
            message: truncate(body, 200),
            retry_after_secs,
        },
        429 | 408 => LlmError::Transient {
            message: truncate(body, 200),
            status_code: Some(status),
        },
        500..=599 => LlmError::Transient {
            message: truncate(body, 200),
            status_code: Some(status),
        },
        _ => LlmError::InvalidResponse {
            message: format!("unexpected status {}: {}", status, truncate(body, 200)),
        },
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        text.to_string()
    } else {
        let mut end = max;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text[..end].to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quota_classification() {
        let err = classify_failure(429, r#"{"error": "insufficient_quota"}"#, Some(60));
        assert!(matches!(
            err,
            LlmError::Quota {
                retry_after_secs: Some(60),
                ..
            }
        ));

        let err = classify_failure(402, "payment required", None);
        assert!(err.is_quota());
    }

    #[test]
    fn test_plain_rate_limit_is_transient() {
        let err = classify_failure(429, "slow down", None);
        assert!(matches!(err, LlmError::Transient { .. }));
    }

    #[test]
    fn test_server_errors_are_transient() {
        for status in [500, 502, 503] {
            let err = classify_failure(status, "upstream unavailable", None);
            assert!(matches!(err, LlmError::Transient { .. }));
        }
    }

    #[test]
    fn test_client_errors_are_not_retried() {
        let err = classify_failure(400, "bad request", None);
        assert!(matches!(err, LlmError::InvalidResponse { .. }));
    }

    #[test]
    fn test_retry_schedule_is_bounded_exponential() {
        let base = Duration::from_secs(1);
        assert_eq!(retry_delay(base, 0), Duration::from_secs(1));
        assert_eq!(retry_delay(base, 1), Duration::from_secs(2));
        assert_eq!(retry_delay(base, 2), Duration::from_secs(4));

        // Total wall-clock for N attempts is base · (2^N − 1)
        let total: Duration = (0..3).map(|i| retry_delay(base, i)).sum();
        assert_eq!(total, Duration::from_secs(7));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let text = "héllo wörld";
        let out = truncate(text, 3);
        assert!(out.len() <= 3);
    }
}
