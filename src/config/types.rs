//! Configuration Types
//!
//! All configuration structures with sensible defaults.
//! Supports global (~/.config/planloom/) and project (.planloom/) level
//! configuration. Secrets (API key, sync token) are never serialized and
//! are redacted from debug output.

use serde::{Deserialize, Serialize};

use crate::constants::{network, plan, rate_limit, retry};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Configuration version
    pub version: String,

    /// AI endpoint settings
    pub ai: AiConfig,

    /// Request pacing settings
    pub rate_limit: RateLimitConfig,

    /// Retry orchestration settings
    pub retry: RetryConfig,

    /// Remote sync settings
    pub sync: SyncConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            ai: AiConfig::default(),
            rate_limit: RateLimitConfig::default(),
            retry: RetryConfig::default(),
            sync: SyncConfig::default(),
        }
    }
}

impl Config {
    /// Validate configuration values are within acceptable ranges.
    /// Returns `LoomError::Config` on validation failure.
    pub fn validate(&self) -> crate::types::Result<()> {
        if !(0.0..=2.0).contains(&self.ai.temperature) {
            return Err(crate::types::LoomError::Config(format!(
                "ai.temperature must be between 0.0 and 2.0, got {}",
                self.ai.temperature
            )));
        }

        if self.ai.timeout_secs == 0 {
            return Err(crate::types::LoomError::Config(
                "ai.timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.ai.max_tokens == 0 {
            return Err(crate::types::LoomError::Config(
                "ai.max_tokens must be greater than 0".to_string(),
            ));
        }

        if self.rate_limit.max_requests == 0 {
            return Err(crate::types::LoomError::Config(
                "rate_limit.max_requests must be greater than 0".to_string(),
            ));
        }

        if self.rate_limit.window_secs == 0 {
            return Err(crate::types::LoomError::Config(
                "rate_limit.window_secs must be greater than 0".to_string(),
            ));
        }

        if self.retry.base_delay_secs == 0 {
            return Err(crate::types::LoomError::Config(
                "retry.base_delay_secs must be greater than 0".to_string(),
            ));
        }

        if self.retry.ai_attempt_timeout_secs == 0 || self.retry.store_attempt_timeout_secs == 0 {
            return Err(crate::types::LoomError::Config(
                "retry attempt timeouts must be greater than 0".to_string(),
            ));
        }

        if self.sync.timeout_secs == 0 {
            return Err(crate::types::LoomError::Config(
                "sync.timeout_secs must be greater than 0".to_string(),
            ));
        }

        // an empty endpoint means sync is not configured, which is fine
        if !self.sync.endpoint.is_empty() {
            url::Url::parse(&self.sync.endpoint).map_err(|e| {
                crate::types::LoomError::Config(format!(
                    "sync.endpoint is not a valid URL: {}",
                    e
                ))
            })?;
        }

        Ok(())
    }
}

// =============================================================================
// AI Endpoint Configuration
// =============================================================================

/// Settings for the chat-completions endpoint
///
/// Note: the API key is handled securely. It is never serialized to output
/// and is redacted in debug output; the HTTP client converts it to
/// SecretString internally for runtime protection.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    /// API base URL
    pub api_base: String,

    /// Model name
    pub model: String,

    /// API key; falls back to the PLANLOOM_AI_API_KEY environment variable
    #[serde(skip_serializing)]
    pub api_key: Option<String>,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Sampling temperature (0.0 = deterministic)
    pub temperature: f32,

    /// Completion token ceiling
    pub max_tokens: usize,
}

impl std::fmt::Debug for AiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AiConfig")
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("timeout_secs", &self.timeout_secs)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: None,
            timeout_secs: network::DEFAULT_TIMEOUT_SECS,
            temperature: plan::DEFAULT_TEMPERATURE,
            max_tokens: plan::DEFAULT_MAX_TOKENS,
        }
    }
}

// =============================================================================
// Rate Limit Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Admissions allowed per window
    pub max_requests: usize,

    /// Sliding window length in seconds
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: rate_limit::MAX_REQUESTS,
            window_secs: rate_limit::WINDOW_SECS,
        }
    }
}

// =============================================================================
// Retry Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt (3 means 4 attempts total)
    pub max_retries: u32,

    /// Base delay for exponential backoff, in seconds
    pub base_delay_secs: u64,

    /// Per-attempt deadline for AI calls, in seconds
    pub ai_attempt_timeout_secs: u64,

    /// Per-attempt deadline for remote store calls, in seconds
    pub store_attempt_timeout_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: retry::MAX_RETRIES,
            base_delay_secs: retry::BASE_DELAY_SECS,
            ai_attempt_timeout_secs: retry::AI_ATTEMPT_TIMEOUT_SECS,
            store_attempt_timeout_secs: retry::STORE_ATTEMPT_TIMEOUT_SECS,
        }
    }
}

// =============================================================================
// Sync Configuration
// =============================================================================

/// Settings for the remote document store
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Document store base URL; empty means sync is not configured
    pub endpoint: String,

    /// Bearer token for the document store
    #[serde(skip_serializing)]
    pub token: Option<String>,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl std::fmt::Debug for SyncConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncConfig")
            .field("endpoint", &self.endpoint)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            token: None,
            timeout_secs: retry::STORE_ATTEMPT_TIMEOUT_SECS,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
