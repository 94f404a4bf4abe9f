//! Plan Engine
//!
//! The user-facing facade over the AI reliability layer. Generating or
//! revising a weekly plan runs the same pipeline:
//!
//! 1. retry orchestration with the model-call profile
//! 2. a rate-limiter slot per attempt
//! 3. the completion request itself, under a per-attempt deadline
//! 4. payload extraction and required-field validation on the final reply
//!
//! Extraction runs outside the retry loop: a reply that arrives but cannot
//! be decoded is a final answer for that call, not a transient fault.

use std::sync::Arc;
use tracing::info;

use crate::ai::{
    CancelHandle, GenerationParams, RateLimiter, RetryObserver, RetryOrchestrator, RetryPolicy,
    RetryProfile, SharedModel, build_plan_prompt, build_revision_prompt, extract,
    validate_required_fields,
};
use crate::config::Config;
use crate::constants::plan as plan_constants;
use crate::types::{PlanDocument, ProfileRecord, Result};

/// Generates and revises weekly plans against a text model
pub struct PlanEngine {
    limiter: Arc<RateLimiter>,
    model: SharedModel,
    params: GenerationParams,
    orchestrator: RetryOrchestrator,
}

impl PlanEngine {
    pub fn new(limiter: Arc<RateLimiter>, model: SharedModel, config: &Config) -> Self {
        Self {
            limiter,
            model,
            params: GenerationParams {
                temperature: config.ai.temperature,
                max_tokens: config.ai.max_tokens,
            },
            orchestrator: RetryOrchestrator::new(RetryPolicy::from_config(
                &config.retry,
                RetryProfile::AiCall,
            )),
        }
    }

    /// Attach an observer notified before every retry wait (UI hook)
    pub fn with_observer(mut self, observer: RetryObserver) -> Self {
        self.orchestrator = self.orchestrator.with_observer(observer);
        self
    }

    /// Handle that stops the current retry sequence at its next wait
    pub fn cancel_handle(&self) -> CancelHandle {
        self.orchestrator.cancel_handle()
    }

    /// Generate a fresh weekly plan from a user profile
    pub async fn generate_plan(&self, profile: &ProfileRecord) -> Result<PlanDocument> {
        let prompt = build_plan_prompt(profile);
        self.run_plan_call("generate-plan", &prompt).await
    }

    /// Apply a conversational revision to an existing plan.
    ///
    /// A change the endpoint refuses to make surfaces as `Rejected` and is
    /// never retried.
    pub async fn revise_plan(
        &self,
        plan: &PlanDocument,
        instruction: &str,
    ) -> Result<PlanDocument> {
        let prompt = build_revision_prompt(plan, instruction);
        self.run_plan_call("revise-plan", &prompt).await
    }

    async fn run_plan_call(&self, operation: &str, prompt: &str) -> Result<PlanDocument> {
        let limiter = &self.limiter;
        let model = &self.model;
        let params = &self.params;

        let reply = self
            .orchestrator
            .run(operation, move || async move {
                limiter.acquire().await;
                model.complete(prompt, params).await
            })
            .await?;

        let payload = extract(&reply.text)?;
        validate_required_fields(&payload, plan_constants::REQUIRED_FIELDS)?;

        info!(operation, model = %reply.model, "plan payload accepted");
        Ok(PlanDocument::new(payload))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{ModelReply, TextModel};
    use crate::types::{FailureKind, LoomError};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tokio::time::Instant;

    const VALID_REPLY: &str = r#"Here is the plan.

```json
{"title": "Push week", "days": [{"day": "mon"}], "meals": [{"day": "mon"}]}
```
"#;

    /// Fails the first `failures` calls with a transport error, then replies
    struct FlakyModel {
        calls: AtomicU32,
        failures: u32,
        reply: String,
    }

    impl FlakyModel {
        fn new(failures: u32, reply: &str) -> Self {
            Self {
                calls: AtomicU32::new(0),
                failures,
                reply: reply.to_string(),
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TextModel for FlakyModel {
        async fn complete(&self, _prompt: &str, _params: &GenerationParams) -> Result<ModelReply> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(LoomError::api(FailureKind::TransportFailure, "flaky"))
            } else {
                Ok(ModelReply::text_only(self.reply.clone()))
            }
        }

        fn name(&self) -> &str {
            "flaky"
        }

        fn model(&self) -> &str {
            "test"
        }
    }

    /// Always refuses, as an endpoint safety filter would
    struct RefusingModel;

    #[async_trait]
    impl TextModel for RefusingModel {
        async fn complete(&self, _prompt: &str, _params: &GenerationParams) -> Result<ModelReply> {
            Err(LoomError::api(
                FailureKind::Rejected,
                "completion blocked by the endpoint's safety filter",
            ))
        }

        fn name(&self) -> &str {
            "refusing"
        }

        fn model(&self) -> &str {
            "test"
        }
    }

    fn engine_with(model: Arc<dyn TextModel + Send + Sync>) -> (PlanEngine, Arc<RateLimiter>) {
        let limiter = Arc::new(RateLimiter::new(10, Duration::from_secs(60)));
        let engine = PlanEngine::new(Arc::clone(&limiter), model, &Config::default());
        (engine, limiter)
    }

    fn sample_profile() -> ProfileRecord {
        let mut payload = serde_json::Map::new();
        payload.insert("goal".to_string(), serde_json::json!("strength"));
        ProfileRecord::new(payload)
    }

    #[tokio::test(start_paused = true)]
    async fn test_generate_plan_produces_document() {
        let model = Arc::new(FlakyModel::new(0, VALID_REPLY));
        let (engine, limiter) = engine_with(Arc::clone(&model) as _);

        let plan = engine.generate_plan(&sample_profile()).await.unwrap();

        assert_eq!(plan.payload["title"], "Push week");
        assert_eq!(model.calls(), 1);
        // one limiter slot consumed
        assert_eq!(limiter.available().await, 9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_generate_plan_retries_transport_failures() {
        let model = Arc::new(FlakyModel::new(2, VALID_REPLY));
        let (engine, _limiter) = engine_with(Arc::clone(&model) as _);

        let start = Instant::now();
        let plan = engine.generate_plan(&sample_profile()).await.unwrap();

        assert_eq!(plan.payload["title"], "Push week");
        assert_eq!(model.calls(), 3);
        // 1s + 2s backoff before the successful third attempt
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_each_attempt_consumes_a_limiter_slot() {
        let model = Arc::new(FlakyModel::new(2, VALID_REPLY));
        let (engine, limiter) = engine_with(Arc::clone(&model) as _);

        engine.generate_plan(&sample_profile()).await.unwrap();
        assert_eq!(limiter.available().await, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_required_fields_fail_without_retry() {
        let model = Arc::new(FlakyModel::new(0, r#"{"title": "only a title"}"#));
        let (engine, _limiter) = engine_with(Arc::clone(&model) as _);

        let err = engine.generate_plan(&sample_profile()).await.unwrap_err();
        assert_eq!(err.failure_kind(), Some(FailureKind::MalformedPayload));
        assert_eq!(model.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_undecodable_reply_fails_without_retry() {
        let model = Arc::new(FlakyModel::new(0, "I could not produce a plan, sorry."));
        let (engine, _limiter) = engine_with(Arc::clone(&model) as _);

        let start = Instant::now();
        let err = engine.generate_plan(&sample_profile()).await.unwrap_err();

        assert_eq!(err.failure_kind(), Some(FailureKind::DecodeFailure));
        assert_eq!(model.calls(), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refused_revision_is_not_retried() {
        let (engine, _limiter) = engine_with(Arc::new(RefusingModel));
        let plan = PlanDocument::new(serde_json::Map::new());

        let err = engine
            .revise_plan(&plan, "remove all rest days")
            .await
            .unwrap_err();
        assert_eq!(err.failure_kind(), Some(FailureKind::Rejected));
    }

    #[tokio::test(start_paused = true)]
    async fn test_observer_reports_retry_waits() {
        let events: Arc<Mutex<Vec<(u32, Duration)>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let observer: RetryObserver =
            Arc::new(move |e| sink.lock().unwrap().push((e.attempt, e.delay)));

        let model = Arc::new(FlakyModel::new(2, VALID_REPLY));
        let limiter = Arc::new(RateLimiter::new(10, Duration::from_secs(60)));
        let engine = PlanEngine::new(Arc::clone(&limiter), Arc::clone(&model) as _, &Config::default())
            .with_observer(observer);

        engine.generate_plan(&sample_profile()).await.unwrap();

        let seen = events.lock().unwrap();
        assert_eq!(
            *seen,
            vec![
                (1, Duration::from_secs(1)),
                (2, Duration::from_secs(2)),
            ]
        );
    }
}
