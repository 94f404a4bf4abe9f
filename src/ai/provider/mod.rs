//! Text Model Boundary
//!
//! The plan engine talks to AI endpoints through the `TextModel` trait so
//! tests can substitute deterministic fakes. The live implementation is the
//! reqwest-backed chat-completions client in `http`.

mod http;

pub use http::HttpTextModel;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::constants::plan as plan_constants;
use crate::types::Result;

/// Raw reply from a text model, before extraction
#[derive(Debug, Clone)]
pub struct ModelReply {
    /// Response text, usually prose wrapping a fenced JSON block
    pub text: String,
    /// Model that produced the reply
    pub model: String,
    /// Wall-clock round-trip time
    pub latency: Duration,
}

impl ModelReply {
    /// Reply carrying text only, for fakes and fixtures
    pub fn text_only(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            model: String::new(),
            latency: Duration::ZERO,
        }
    }
}

/// Knobs forwarded with every completion request
#[derive(Debug, Clone)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_tokens: usize,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: plan_constants::DEFAULT_TEMPERATURE,
            max_tokens: plan_constants::DEFAULT_MAX_TOKENS,
        }
    }
}

/// Shared model handle for concurrent use across engine tasks.
pub type SharedModel = Arc<dyn TextModel + Send + Sync>;

/// Text completion boundary
#[async_trait]
pub trait TextModel: Send + Sync {
    /// Run one completion attempt against the backing endpoint
    async fn complete(&self, prompt: &str, params: &GenerationParams) -> Result<ModelReply>;

    /// Endpoint name for logging
    fn name(&self) -> &str;

    /// Model identifier currently in use
    fn model(&self) -> &str;
}
