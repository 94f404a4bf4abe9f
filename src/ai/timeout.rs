//! Attempt Deadlines
//!
//! Wraps async operations in a deadline and surfaces expiry as a classified
//! `Timeout` failure, so a hung request is indistinguishable from any other
//! retryable failure downstream.

use std::future::Future;
use std::time::Duration;

use crate::types::{Failure, FailureKind, Result};

/// Execute an async operation with a deadline.
///
/// The operation's own result passes through untouched; only expiry is
/// converted, into a `Timeout`-kind failure naming the operation.
pub async fn with_timeout<T, F>(timeout: Duration, future: F, operation: &str) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => result,
        Err(_) => Err(Failure::with_source(
            FailureKind::Timeout,
            format!("timed out after {}s", timeout.as_secs()),
            operation,
        )
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LoomError;

    #[tokio::test(start_paused = true)]
    async fn test_with_timeout_success_passes_through() {
        let result = with_timeout(Duration::from_secs(1), async { Ok(42) }, "fast op").await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_timeout_expiry_is_classified() {
        let result: Result<u32> = with_timeout(
            Duration::from_millis(10),
            async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(42)
            },
            "slow op",
        )
        .await;
        let err = result.unwrap_err();
        assert_eq!(err.failure_kind(), Some(FailureKind::Timeout));
        assert!(err.is_retryable());
        assert!(err.to_string().contains("slow op"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_timeout_inner_error_passes_through() {
        let result: Result<u32> = with_timeout(
            Duration::from_secs(1),
            async { Err(LoomError::api(FailureKind::Rejected, "refused")) },
            "op",
        )
        .await;
        assert_eq!(
            result.unwrap_err().failure_kind(),
            Some(FailureKind::Rejected)
        );
    }
}
