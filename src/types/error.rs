//! Unified Error Type System
//!
//! Centralized error types for the entire crate.
//! Every failure crossing a service boundary is classified into a closed
//! set of kinds so retry, backoff, and messaging decisions happen by kind
//! instead of by string inspection at call sites.
//!
//! ## Failure Kinds
//!
//! - **RateLimited**: provider asked us to slow down (wait and retry)
//! - **QuotaExhausted**: local daily budget spent (do not retry today)
//! - **Timeout**: an attempt exceeded its deadline (retry)
//! - **TransportFailure**: connection-level trouble (retry with backoff)
//! - **MalformedPayload**: decoded but structurally invalid (fix prompt/data)
//! - **DecodeFailure**: response could not be decoded at all (fail fast)
//! - **Unauthorized**: credentials rejected (fail fast, critical)
//! - **Rejected**: request explicitly refused (fail fast, critical)
//! - **Unknown**: anything unclassified (fail fast, critical)
//!
//! ## Design Principles
//!
//! - Classification happens once, at the failure's origin
//! - Single crate error type (LoomError) wrapping classified failures
//! - Kind-based routing for retry and user messaging decisions
//! - No panic/unwrap - all errors are recoverable values

use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Failure Kinds
// =============================================================================

/// Closed set of failure kinds for routing and retry decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Provider rate limit hit - wait then retry
    RateLimited,
    /// Local request budget for the day is spent - do not retry today
    QuotaExhausted,
    /// Attempt exceeded its deadline - retry
    Timeout,
    /// Connection-level failure (DNS, reset, unreachable) - retry with backoff
    TransportFailure,
    /// Response decoded but required structure is missing - don't retry
    MalformedPayload,
    /// Response could not be decoded at all - don't retry
    DecodeFailure,
    /// Credentials missing or rejected - fail fast
    Unauthorized,
    /// Request explicitly refused (e.g. content policy) - fail fast
    Rejected,
    /// Unclassified - fail fast, surface loudly
    Unknown,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RateLimited => write!(f, "RATE_LIMITED"),
            Self::QuotaExhausted => write!(f, "QUOTA_EXHAUSTED"),
            Self::Timeout => write!(f, "TIMEOUT"),
            Self::TransportFailure => write!(f, "TRANSPORT_FAILURE"),
            Self::MalformedPayload => write!(f, "MALFORMED_PAYLOAD"),
            Self::DecodeFailure => write!(f, "DECODE_FAILURE"),
            Self::Unauthorized => write!(f, "UNAUTHORIZED"),
            Self::Rejected => write!(f, "REJECTED"),
            Self::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Backoff guidance attached to a failure kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffHint {
    /// Wait at least this long before the next attempt
    After(Duration),
    /// Do not retry until the budget window resets (tomorrow)
    Never,
}

impl FailureKind {
    /// Check if an attempt with this failure kind may be repeated
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited | Self::Timeout | Self::TransportFailure
        )
    }

    /// Critical kinds are surfaced loudly; the rest are operational noise
    pub fn is_critical(&self) -> bool {
        matches!(self, Self::Unauthorized | Self::Rejected | Self::Unknown)
    }

    /// Recommended minimum wait before the next attempt, if any.
    ///
    /// Only rate limits carry a default wait; other transient kinds leave
    /// the schedule to the retry policy's exponential ladder.
    pub fn backoff_hint(&self) -> Option<BackoffHint> {
        match self {
            Self::RateLimited => Some(BackoffHint::After(Duration::from_secs(60))),
            Self::QuotaExhausted => Some(BackoffHint::Never),
            _ => None,
        }
    }

    /// Short, non-technical message suitable for direct display
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::RateLimited => "The service is busy right now. Please try again in a minute.",
            Self::QuotaExhausted => "You've reached today's plan limit. Try again tomorrow.",
            Self::Timeout => "That took too long. Please try again.",
            Self::TransportFailure => "Connection problem. Check your network and try again.",
            Self::MalformedPayload => "The plan came back incomplete. Please try again.",
            Self::DecodeFailure => "The plan couldn't be read. Please try again.",
            Self::Unauthorized => "There was a sign-in problem. Please sign in again.",
            Self::Rejected => "That request can't be completed.",
            Self::Unknown => "Something unexpected went wrong.",
        }
    }
}

// =============================================================================
// Classified Failure
// =============================================================================

/// A classified failure with origin context and retry hints
#[derive(Debug, Clone)]
pub struct Failure {
    /// Kind for routing decisions
    pub kind: FailureKind,
    /// Detailed error message (internal, may be technical)
    pub message: String,
    /// Collaborator that produced the failure (e.g. "model", "remote-store")
    pub source: Option<String>,
    /// Server-recommended wait before retry, when the response carried one
    pub retry_after: Option<Duration>,
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(source) = &self.source {
            write!(f, "[{}:{}] {}", source, self.kind, self.message)
        } else {
            write!(f, "[{}] {}", self.kind, self.message)
        }
    }
}

impl std::error::Error for Failure {}

impl Failure {
    /// Create a new classified failure
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
            retry_after: None,
        }
    }

    /// Create a failure with origin context
    pub fn with_source(
        kind: FailureKind,
        message: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            source: Some(source.into()),
            retry_after: None,
        }
    }

    /// Add origin context to an existing failure
    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Add a server-recommended retry delay
    pub fn retry_after(mut self, duration: Duration) -> Self {
        self.retry_after = Some(duration);
        self
    }

    /// Check if an attempt with this failure may be repeated
    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    /// Check if this failure should be surfaced loudly
    pub fn is_critical(&self) -> bool {
        self.kind.is_critical()
    }

    /// Backoff guidance; an explicit server delay wins over the kind default
    pub fn backoff_hint(&self) -> Option<BackoffHint> {
        match self.retry_after {
            Some(d) => Some(BackoffHint::After(d)),
            None => self.kind.backoff_hint(),
        }
    }

    /// Short, non-technical message suitable for direct display
    pub fn user_message(&self) -> &'static str {
        self.kind.user_message()
    }
}

// =============================================================================
// Classifier
// =============================================================================

/// Retry-After values above this are treated as misconfigured and capped
const RETRY_AFTER_CAP_SECS: u64 = 300;

/// Maps raw errors from collaborators onto the shared failure kinds
pub struct Classifier;

impl Classifier {
    /// Classify an error message body from any endpoint
    pub fn classify(message: &str, source: &str) -> Failure {
        let lower = message.to_lowercase();

        // Budget/quota patterns (do-not-retry-today sentinel)
        if lower.contains("quota")
            || lower.contains("billing")
            || lower.contains("insufficient credit")
            || lower.contains("daily limit")
        {
            return Failure::with_source(FailureKind::QuotaExhausted, message, source);
        }

        // Rate limiting patterns
        if lower.contains("rate limit")
            || lower.contains("429")
            || lower.contains("too many requests")
            || lower.contains("slow down")
        {
            return Failure::with_source(FailureKind::RateLimited, message, source);
        }

        // Deadline patterns
        if lower.contains("timeout") || lower.contains("timed out") || lower.contains("deadline") {
            return Failure::with_source(FailureKind::Timeout, message, source);
        }

        // Authentication patterns
        if lower.contains("auth")
            || lower.contains("401")
            || lower.contains("403")
            || lower.contains("api key")
            || lower.contains("forbidden")
            || lower.contains("permission denied")
        {
            return Failure::with_source(FailureKind::Unauthorized, message, source);
        }

        // Refusal patterns (content policy, safety filters)
        if lower.contains("safety")
            || lower.contains("content policy")
            || lower.contains("blocked")
            || lower.contains("refused")
            || lower.contains("prohibited")
        {
            return Failure::with_source(FailureKind::Rejected, message, source);
        }

        // Connection-level patterns
        if lower.contains("network")
            || lower.contains("connection")
            || lower.contains("dns")
            || lower.contains("unreachable")
            || lower.contains("reset by peer")
            || lower.contains("broken pipe")
        {
            return Failure::with_source(FailureKind::TransportFailure, message, source);
        }

        // Server-side trouble (retryable like transport)
        if lower.contains("500")
            || lower.contains("502")
            || lower.contains("503")
            || lower.contains("504")
            || lower.contains("overloaded")
            || lower.contains("service unavailable")
            || lower.contains("internal error")
            || lower.contains("temporarily")
        {
            return Failure::with_source(FailureKind::TransportFailure, message, source);
        }

        // Decode patterns
        if lower.contains("json")
            || lower.contains("parse")
            || lower.contains("syntax")
            || lower.contains("unexpected token")
        {
            return Failure::with_source(FailureKind::DecodeFailure, message, source);
        }

        // Request rejected as invalid
        if lower.contains("400") || lower.contains("bad request") || lower.contains("invalid") {
            return Failure::with_source(FailureKind::Rejected, message, source);
        }

        Failure::with_source(FailureKind::Unknown, message, source)
    }

    /// Classify an HTTP status directly (more accurate than string matching)
    pub fn from_http_status(status: u16, message: &str, source: &str) -> Failure {
        match status {
            429 => Failure::with_source(FailureKind::RateLimited, message, source),
            401 | 403 => Failure::with_source(FailureKind::Unauthorized, message, source),
            402 => Failure::with_source(FailureKind::QuotaExhausted, message, source),
            400 | 422 => Failure::with_source(FailureKind::Rejected, message, source),
            408 => Failure::with_source(FailureKind::Timeout, message, source),
            500 | 502 | 503 | 504 => {
                Failure::with_source(FailureKind::TransportFailure, message, source)
            }
            _ => Failure::with_source(FailureKind::Unknown, message, source),
        }
    }

    /// Classify a transport error from the HTTP client
    pub fn from_transport(err: &reqwest::Error, source: &str) -> Failure {
        let kind = if err.is_timeout() {
            FailureKind::Timeout
        } else if err.is_connect() {
            FailureKind::TransportFailure
        } else if err.is_decode() {
            FailureKind::DecodeFailure
        } else if err.is_request() || err.is_body() {
            FailureKind::TransportFailure
        } else {
            FailureKind::Unknown
        };
        Failure::with_source(kind, err.to_string(), source)
    }

    /// Parse a Retry-After header value (seconds form), capped at 5 minutes
    pub fn parse_retry_after(value: &str) -> Option<Duration> {
        let secs: u64 = value.trim().parse().ok()?;
        Some(Duration::from_secs(secs.clamp(1, RETRY_AFTER_CAP_SECS)))
    }
}

// =============================================================================
// Crate Error
// =============================================================================

#[derive(Debug, Error)]
pub enum LoomError {
    // -------------------------------------------------------------------------
    // System Errors (auto From impl)
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // -------------------------------------------------------------------------
    // Classified Failures
    // -------------------------------------------------------------------------
    /// A failure from a service boundary, already classified by kind
    #[error("{0}")]
    Api(Failure),

    // -------------------------------------------------------------------------
    // Infrastructure Errors
    // -------------------------------------------------------------------------
    #[error("Config error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<Failure> for LoomError {
    fn from(failure: Failure) -> Self {
        LoomError::Api(failure)
    }
}

pub type Result<T> = std::result::Result<T, LoomError>;

// =============================================================================
// Helper Functions
// =============================================================================

impl LoomError {
    /// Create a classified failure error (convenience wrapper)
    pub fn api(kind: FailureKind, message: impl Into<String>) -> Self {
        Self::Api(Failure::new(kind, message))
    }

    /// The classified failure, when this error carries one
    pub fn failure(&self) -> Option<&Failure> {
        match self {
            Self::Api(f) => Some(f),
            _ => None,
        }
    }

    /// The failure kind, when this error carries one
    pub fn failure_kind(&self) -> Option<FailureKind> {
        self.failure().map(|f| f.kind)
    }

    /// Retryable means a repeat of the same attempt could succeed.
    /// Infrastructure variants (Json, Config, Storage, ...) are programming
    /// or environment faults and are never retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Api(f) => f.is_retryable(),
            _ => false,
        }
    }

    /// Backoff guidance for retryable errors
    pub fn backoff_hint(&self) -> Option<BackoffHint> {
        self.failure().and_then(|f| f.backoff_hint())
    }

    /// Short, non-technical message suitable for direct display
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Api(f) => f.user_message(),
            _ => "Something went wrong. Please try again.",
        }
    }
}

/// Context extension trait for adding context to errors
pub trait ResultExt<T> {
    /// Add context to an error
    fn with_context<C: Into<String>>(self, context: C) -> Result<T>;

    /// Add context using a closure (lazy evaluation)
    fn with_context_fn<F, C>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Into<String>;
}

impl<T, E: std::error::Error + Send + Sync + 'static> ResultExt<T> for std::result::Result<T, E> {
    fn with_context<C: Into<String>>(self, context: C) -> Result<T> {
        self.map_err(|e| LoomError::Storage(format!("{}: {}", context.into(), e)))
    }

    fn with_context_fn<F, C>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Into<String>,
    {
        self.map_err(|e| LoomError::Storage(format!("{}: {}", f().into(), e)))
    }
}

// =============================================================================
// Tests
// =============================================================================
