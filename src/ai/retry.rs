//! Retry Orchestration
//!
//! Drives repeated attempts of fallible async operations with exponential
//! backoff. Which failures are worth repeating is decided by kind, through
//! a retry profile chosen per call site:
//!
//! - **AiCall**: model requests; repeats rate limits, timeouts, transport
//! - **RemoteStore**: document store requests; repeats timeouts, transport
//! - **BackgroundSync**: reconcile sweeps; repeats anything transient but
//!   never programming faults
//!
//! Waits honor the failure's own backoff hint when it exceeds the
//! exponential schedule, and a `Never` hint ends the sequence outright.
//! An observer callback fires before each wait so a UI can show progress.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time;

use crate::ai::timeout::with_timeout;
use crate::config::RetryConfig;
use crate::constants::retry as retry_constants;
use crate::types::{BackoffHint, FailureKind, LoomError, Result};

// =============================================================================
// Profiles
// =============================================================================

/// Per-call-site policy preset deciding which failure kinds to repeat
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryProfile {
    /// Model endpoint calls
    AiCall,
    /// Remote document store calls
    RemoteStore,
    /// Opportunistic background pushes
    BackgroundSync,
}

impl RetryProfile {
    /// Whether this profile repeats an attempt after the given error.
    ///
    /// Errors without a classified failure (Json, Config, Storage, ...) are
    /// programming or environment faults; no profile repeats those.
    pub fn permits(&self, error: &LoomError) -> bool {
        let Some(kind) = error.failure_kind() else {
            return false;
        };
        match self {
            Self::AiCall => matches!(
                kind,
                FailureKind::RateLimited | FailureKind::Timeout | FailureKind::TransportFailure
            ),
            Self::RemoteStore => {
                matches!(kind, FailureKind::Timeout | FailureKind::TransportFailure)
            }
            Self::BackgroundSync => kind.is_retryable(),
        }
    }
}

// =============================================================================
// Policy
// =============================================================================

/// Retry tuning: attempt count, backoff schedule, per-attempt deadline
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt (3 means 4 attempts total)
    pub max_retries: u32,
    /// First wait; later waits double it per retry already spent
    pub base_delay: Duration,
    /// Deadline applied to every individual attempt
    pub attempt_timeout: Option<Duration>,
    /// Failure kinds worth repeating
    pub profile: RetryProfile,
}

impl RetryPolicy {
    pub fn new(profile: RetryProfile) -> Self {
        Self {
            max_retries: retry_constants::MAX_RETRIES,
            base_delay: Duration::from_secs(retry_constants::BASE_DELAY_SECS),
            attempt_timeout: None,
            profile,
        }
    }

    /// Preset for model endpoint calls
    pub fn ai_call() -> Self {
        Self::new(RetryProfile::AiCall).with_attempt_timeout(Duration::from_secs(
            retry_constants::AI_ATTEMPT_TIMEOUT_SECS,
        ))
    }

    /// Preset for remote document store calls
    pub fn remote_store() -> Self {
        Self::new(RetryProfile::RemoteStore).with_attempt_timeout(Duration::from_secs(
            retry_constants::STORE_ATTEMPT_TIMEOUT_SECS,
        ))
    }

    /// Preset for opportunistic background pushes
    pub fn background_sync() -> Self {
        Self::new(RetryProfile::BackgroundSync)
    }

    /// Build a profile preset with tuning from loaded configuration
    pub fn from_config(config: &RetryConfig, profile: RetryProfile) -> Self {
        let attempt_timeout = match profile {
            RetryProfile::AiCall => Some(Duration::from_secs(config.ai_attempt_timeout_secs)),
            RetryProfile::RemoteStore => {
                Some(Duration::from_secs(config.store_attempt_timeout_secs))
            }
            RetryProfile::BackgroundSync => None,
        };
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_secs(config.base_delay_secs),
            attempt_timeout,
            profile,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = Some(timeout);
        self
    }

    /// Whether the sequence continues after this error.
    ///
    /// A `Never` backoff hint (spent daily budget) overrides the profile.
    pub fn should_retry(&self, error: &LoomError) -> bool {
        if matches!(error.backoff_hint(), Some(BackoffHint::Never)) {
            return false;
        }
        self.profile.permits(error)
    }

    /// Wait before the attempt after `retries_spent` failures.
    ///
    /// Exponential from `base_delay`, but a failure recommending a longer
    /// wait (rate-limit hints, Retry-After) always gets it.
    pub fn delay_for(&self, retries_spent: u32, error: &LoomError) -> Duration {
        let exponential = self.base_delay * 2u32.saturating_pow(retries_spent.min(16));
        match error.backoff_hint() {
            Some(BackoffHint::After(hint)) => exponential.max(hint),
            _ => exponential,
        }
    }
}

// =============================================================================
// Observer
// =============================================================================

/// Snapshot handed to observers before each retry wait
#[derive(Debug, Clone)]
pub struct RetryEvent {
    /// Operation label the orchestrator was run with
    pub operation: String,
    /// 1-based number of the attempt that just failed
    pub attempt: u32,
    /// Wait before the next attempt starts
    pub delay: Duration,
    /// Failure kind, when the error carried one
    pub kind: Option<FailureKind>,
    /// Rendered error message
    pub message: String,
}

/// Callback notified before each retry wait. Must not block or panic;
/// it cannot influence the sequence.
pub type RetryObserver = Arc<dyn Fn(&RetryEvent) + Send + Sync>;

// =============================================================================
// Cancellation
// =============================================================================

/// Cooperative stop signal for an in-flight retry sequence.
///
/// Cancelling takes effect at wait boundaries: the current wait is cut
/// short and the sequence returns its last failure without further
/// attempts or observer calls. In-flight attempts are not aborted; drop
/// the whole `run` future for a hard abort.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Signal every sequence holding this handle to stop retrying
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Runs operations under a [`RetryPolicy`] with observer and cancel wiring
pub struct RetryOrchestrator {
    policy: RetryPolicy,
    observer: Option<RetryObserver>,
    cancel: CancelHandle,
}

impl RetryOrchestrator {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            observer: None,
            cancel: CancelHandle::new(),
        }
    }

    /// Attach a progress observer
    pub fn with_observer(mut self, observer: RetryObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Share an external cancel handle instead of the built-in one
    pub fn with_cancel_handle(mut self, cancel: CancelHandle) -> Self {
        self.cancel = cancel;
        self
    }

    /// Handle for cancelling sequences started by this orchestrator
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `operation` until it succeeds, the policy gives up, or the
    /// sequence is cancelled. The final error is returned unchanged.
    pub async fn run<F, Fut, T>(&self, operation_name: &str, operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let policy = self.policy.clone();
        self.run_with(operation_name, operation, move |err| {
            policy.should_retry(err)
        })
        .await
    }

    /// Like [`run`](Self::run) but with a caller-supplied retry predicate
    /// replacing the profile decision. A `Never` backoff hint still ends
    /// the sequence regardless of the predicate; backoff and attempt
    /// accounting are unchanged.
    pub async fn run_with<F, Fut, T, P>(
        &self,
        operation_name: &str,
        mut operation: F,
        should_retry: P,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
        P: Fn(&LoomError) -> bool,
    {
        let mut cancelled = self.cancel.subscribe();
        let mut retries_spent: u32 = 0;

        loop {
            let attempt = retries_spent + 1;
            let result = match self.policy.attempt_timeout {
                Some(deadline) => with_timeout(deadline, operation(), operation_name).await,
                None => operation().await,
            };

            let err = match result {
                Ok(value) => {
                    if retries_spent > 0 {
                        tracing::debug!(
                            operation = operation_name,
                            attempt,
                            "succeeded after retries"
                        );
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            // A Never hint (spent budget) ends the sequence no matter
            // what the predicate says.
            let budget_spent = matches!(err.backoff_hint(), Some(BackoffHint::Never));
            let out_of_attempts = retries_spent >= self.policy.max_retries;
            if out_of_attempts || budget_spent || !should_retry(&err) {
                if err.failure().is_some_and(|f| f.is_critical()) {
                    tracing::error!(operation = operation_name, attempt, error = %err, "giving up");
                } else {
                    tracing::debug!(operation = operation_name, attempt, error = %err, "giving up");
                }
                return Err(err);
            }

            let delay = self.policy.delay_for(retries_spent, &err);
            tracing::warn!(
                operation = operation_name,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "attempt failed, will retry"
            );
            if let Some(observer) = &self.observer {
                observer(&RetryEvent {
                    operation: operation_name.to_string(),
                    attempt,
                    delay,
                    kind: err.failure_kind(),
                    message: err.to_string(),
                });
            }

            tokio::select! {
                _ = time::sleep(delay) => {}
                changed = cancelled.changed() => {
                    if changed.is_err() || *cancelled.borrow() {
                        tracing::debug!(operation = operation_name, attempt, "retry cancelled");
                        return Err(err);
                    }
                }
            }
            if self.cancel.is_cancelled() {
                tracing::debug!(operation = operation_name, attempt, "retry cancelled");
                return Err(err);
            }

            retries_spent += 1;
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
