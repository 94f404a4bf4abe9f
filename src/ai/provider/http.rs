//! HTTP Text Model
//!
//! Chat-completions client over reqwest. Every way a call can go wrong lands
//! in the shared failure taxonomy: non-2xx statuses through
//! `Classifier::from_http_status` (keeping any Retry-After header), transport
//! errors through `Classifier::from_transport`, safety-filter refusals as
//! `Rejected`.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use super::{GenerationParams, ModelReply, TextModel};
use crate::config::AiConfig;
use crate::constants::network;
use crate::types::{Classifier, Failure, FailureKind, LoomError, Result, truncate_chars};

const SOURCE: &str = "ai-endpoint";

/// Chat-completions client with secure API key handling
pub struct HttpTextModel {
    /// Never exposed in logs or debug output
    api_key: SecretString,
    api_base: String,
    model: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for HttpTextModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTextModel")
            .field("api_key", &"[REDACTED]")
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .finish()
    }
}

impl HttpTextModel {
    pub fn new(config: &AiConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var("PLANLOOM_AI_API_KEY").ok())
            .ok_or_else(|| {
                LoomError::Config(
                    "AI API key not found. Set PLANLOOM_AI_API_KEY or ai.api_key in config"
                        .to_string(),
                )
            })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(network::CONNECTION_TIMEOUT_SECS))
            .build()
            .map_err(|e| LoomError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            api_key: SecretString::from(api_key),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            client,
        })
    }

    fn build_request(&self, prompt: &str, params: &GenerationParams) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            temperature: params.temperature,
            max_tokens: Some(params.max_tokens),
        }
    }
}

#[async_trait]
impl TextModel for HttpTextModel {
    async fn complete(&self, prompt: &str, params: &GenerationParams) -> Result<ModelReply> {
        let url = format!("{}/chat/completions", self.api_base);
        let request = self.build_request(prompt, params);
        let start = std::time::Instant::now();

        debug!(model = %self.model, "sending completion request");

        let response = self
            .client
            .post(&url)
            .header(
                "Authorization",
                format!("Bearer {}", self.api_key.expose_secret()),
            )
            .json(&request)
            .send()
            .await
            .map_err(|e| Classifier::from_transport(&e, SOURCE))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(Classifier::parse_retry_after);
            let body = response.text().await.unwrap_or_default();
            let mut failure = Classifier::from_http_status(
                status.as_u16(),
                &format!(
                    "endpoint returned {}: {}",
                    status,
                    truncate_chars(&body, network::ERROR_BODY_SNIPPET_CHARS)
                ),
                SOURCE,
            );
            if let Some(delay) = retry_after {
                failure = failure.retry_after(delay);
            }
            return Err(failure.into());
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| Classifier::from_transport(&e, SOURCE))?;

        let choice = body.choices.into_iter().next().ok_or_else(|| {
            Failure::with_source(
                FailureKind::Rejected,
                "model returned no candidates",
                SOURCE,
            )
        })?;

        if choice.finish_reason.as_deref() == Some("content_filter") {
            return Err(Failure::with_source(
                FailureKind::Rejected,
                "completion blocked by the endpoint's safety filter",
                SOURCE,
            )
            .into());
        }

        let text = choice.message.content.ok_or_else(|| {
            Failure::with_source(
                FailureKind::DecodeFailure,
                "candidate carried no text content",
                SOURCE,
            )
        })?;

        let model = body.model.unwrap_or_else(|| self.model.clone());
        let latency = start.elapsed();
        info!(
            model = %model,
            latency_ms = latency.as_millis() as u64,
            "completion received"
        );

        Ok(ModelReply {
            text,
            model,
            latency,
        })
    }

    fn name(&self) -> &str {
        "http"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

// Request/response wire types

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ReplyMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
}
