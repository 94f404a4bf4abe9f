//! Global Constants
//!
//! Centralized constants for configuration and tuning.
//! All magic numbers should be defined here with documentation.

/// Rate limiter constants
pub mod rate_limit {
    /// Default admissions allowed per window
    pub const MAX_REQUESTS: usize = 10;

    /// Default sliding window length (seconds)
    pub const WINDOW_SECS: u64 = 60;
}

/// Retry orchestration constants
pub mod retry {
    /// Default retries after the first attempt (4 attempts total)
    pub const MAX_RETRIES: u32 = 3;

    /// Base delay for exponential backoff (seconds)
    pub const BASE_DELAY_SECS: u64 = 1;

    /// Default per-attempt deadline for AI calls (seconds)
    pub const AI_ATTEMPT_TIMEOUT_SECS: u64 = 120;

    /// Default per-attempt deadline for remote store calls (seconds)
    pub const STORE_ATTEMPT_TIMEOUT_SECS: u64 = 15;
}

/// Response extraction constants
pub mod extract {
    /// Characters of raw text quoted in decode failure messages
    pub const PREVIEW_CHARS: usize = 100;
}

/// Plan payload contract
pub mod plan {
    /// Fields every generated plan must carry to be accepted
    pub const REQUIRED_FIELDS: &[&str] = &["title", "days", "meals"];

    /// Default model sampling temperature
    pub const DEFAULT_TEMPERATURE: f32 = 0.7;

    /// Default completion token ceiling
    pub const DEFAULT_MAX_TOKENS: usize = 4096;
}

/// HTTP/Network constants
pub mod network {
    /// Default request timeout (seconds)
    pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

    /// Connection timeout (seconds)
    pub const CONNECTION_TIMEOUT_SECS: u64 = 10;

    /// Characters of an error response body quoted in failure messages
    pub const ERROR_BODY_SNIPPET_CHARS: usize = 200;
}

/// Sync repository constants
pub mod sync {
    /// Remote document store path segment for profile records
    pub const RECORDS_PATH: &str = "records";
}
