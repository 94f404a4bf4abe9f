//! PlanLoom - Reliability Layer for AI-Backed Plan Generation
//!
//! An offline-first core that calls a chat-completions endpoint to
//! generate structured plan documents and keeps user profiles in sync
//! with a remote store, surviving flaky networks along the way.
//!
//! ## Core Features
//!
//! - **Failure Taxonomy**: Every fault classified as retryable or terminal
//! - **Rate Limiting**: Sliding-window pacing shared across callers
//! - **Retry Orchestration**: Exponential backoff with server hint override
//! - **Payload Extraction**: Tolerant JSON recovery from model replies
//! - **Offline-First Sync**: Local cache is the source of truth; the
//!   remote store catches up when it can
//!
//! ## Quick Start
//!
//! ```ignore
//! use planloom::{Config, PlanEngine, RateLimiter};
//! use planloom::ai::HttpTextModel;
//! use std::sync::Arc;
//!
//! let config = planloom::ConfigLoader::load()?;
//! let limiter = Arc::new(RateLimiter::from_config(&config.rate_limit));
//! let model = Arc::new(HttpTextModel::new(&config.ai)?);
//! let engine = PlanEngine::new(limiter, model, &config);
//! let plan = engine.generate_plan(&profile).await?;
//! ```
//!
//! ## Modules
//!
//! - [`ai`]: text model client, rate limiting, retry, reply extraction
//! - [`plan`]: plan generation and revision on top of the AI layer
//! - [`storage`]: SQLite profile cache with connection pooling
//! - [`sync`]: offline-first repository over cache and remote store
//! - [`config`]: layered configuration

pub mod ai;
pub mod config;
pub mod constants;
pub mod plan;
pub mod storage;
pub mod sync;
pub mod types;

// =============================================================================
// Core Re-exports
// =============================================================================

// Configuration
pub use config::{Config, ConfigLoader};

// Error Types
pub use types::error::{BackoffHint, Failure, FailureKind, LoomError, Result, ResultExt};

// Domain Types
pub use types::{PlanDocument, ProfileRecord, UserId};

// =============================================================================
// AI Re-exports
// =============================================================================

pub use ai::{
    CancelHandle, GenerationParams, HttpTextModel, ModelReply, RateLimiter, RetryEvent,
    RetryObserver, RetryOrchestrator, RetryPolicy, RetryProfile, SharedModel, TextModel,
    with_timeout,
};

// =============================================================================
// Plan & Sync Re-exports
// =============================================================================

pub use plan::PlanEngine;
pub use storage::{ProfileCache, SharedCache};
pub use sync::{HttpRemoteStore, RemoteStore, SharedRemote, SyncOutcome, SyncRepository};
