//! AI Reliability Layer
//!
//! Everything between the plan engine and the AI endpoint: request pacing,
//! retries with exponential backoff, per-attempt deadlines, response
//! extraction, prompt construction, and the model boundary itself.

pub mod extract;
pub mod limiter;
pub mod prompt;
pub mod provider;
pub mod retry;
pub mod timeout;

pub use extract::{extract, extract_block, validate_required_fields};
pub use limiter::RateLimiter;
pub use prompt::{build_plan_prompt, build_revision_prompt};
pub use provider::{GenerationParams, HttpTextModel, ModelReply, SharedModel, TextModel};
pub use retry::{
    CancelHandle, RetryEvent, RetryObserver, RetryOrchestrator, RetryPolicy, RetryProfile,
};
pub use timeout::with_timeout;
