//! Bounded retry with a fixed delay.
//!
//! [`with_retry`] re-runs an operation while it fails with a retryable error
//! (see [`SdkError::is_retryable`]) and the budget allows it:
//!
//! ```text
//! attempt 1 ─ fail (retryable, budget left) ─ delay ─ attempt 2 ─ ... ─ success
//!                                                                    └─ RetryExhausted
//! ```
//!
//! Both the in-flight attempt and the delay race the call context, so a
//! cancelled call stops within one scheduler tick instead of running out the
//! remaining budget.

use std::{
    future::Future,
    sync::atomic::{AtomicU32, Ordering},
    time::Duration,
};

use backon::{ConstantBuilder, Retryable};

use crate::{
    config::RetryPolicy,
    context::CallContext,
    error::{CancelledSnafu, Result, SdkError},
    metrics::SdkMetrics,
};

/// Runs `attempt` until it succeeds, fails permanently, or the budget is spent.
///
/// At most `policy.max_retries + 1` attempts are made. Non-retryable errors
/// are returned unchanged after the attempt that produced them. When the last
/// permitted attempt fails with a retryable error the result is
/// [`SdkError::RetryExhausted`] wrapping that error.
///
/// # Errors
///
/// Returns [`SdkError::Cancelled`] if `ctx` is done before an attempt, during
/// an attempt or during a delay.
///
/// # Example
///
/// ```
/// use relaykit_sdk::{CallContext, NoopSdkMetrics, RetryPolicy, SdkError, with_retry};
///
/// # async fn example() -> relaykit_sdk::Result<()> {
/// let value = with_retry(&RetryPolicy::default(), &CallContext::new(), &NoopSdkMetrics, "ping", || async {
///     Ok::<_, SdkError>("pong")
/// })
/// .await?;
/// assert_eq!(value, "pong");
/// # Ok(())
/// # }
/// ```
pub async fn with_retry<F, Fut, T>(
    policy: &RetryPolicy,
    ctx: &CallContext,
    metrics: &dyn SdkMetrics,
    operation: &str,
    mut attempt: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    // backon's max_times counts retries, not attempts.
    let backoff = ConstantBuilder::default()
        .with_delay(policy.retry_delay)
        .with_max_times(policy.max_retries as usize);

    let attempts = AtomicU32::new(0);
    let sleep_ctx = ctx.clone();

    let run = || {
        let started = match ctx.is_done() {
            Some(reason) => Err(reason),
            None => {
                attempts.fetch_add(1, Ordering::SeqCst);
                Ok(attempt())
            },
        };
        async move {
            let in_flight = match started {
                Ok(in_flight) => in_flight,
                Err(reason) => return CancelledSnafu { reason }.fail(),
            };
            tokio::select! {
                biased;
                reason = ctx.done() => CancelledSnafu { reason }.fail(),
                result = in_flight => result,
            }
        }
    };

    let result = run
        .retry(backoff)
        // A cancelled delay ends early; the next attempt then reports the cancellation.
        .sleep(move |delay: Duration| {
            let ctx = sleep_ctx.clone();
            async move {
                tokio::select! {
                    biased;
                    _ = ctx.done() => {},
                    () = tokio::time::sleep(delay) => {},
                }
            }
        })
        .when(|err: &SdkError| err.is_retryable())
        .notify(|err: &SdkError, delay: Duration| {
            let failed = attempts.load(Ordering::SeqCst);
            metrics.record_retry(operation, failed + 1, err.error_type());
            tracing::debug!(
                operation,
                attempt = failed,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "retrying after delay"
            );
        })
        .await;

    let attempts = attempts.load(Ordering::SeqCst);
    match result {
        Ok(value) => {
            if attempts > 1 {
                tracing::debug!(operation, attempts, "succeeded after retry");
            }
            Ok(value)
        },
        Err(err) if err.is_retryable() => {
            tracing::warn!(operation, attempts, error = %err, "retry budget exhausted");
            Err(SdkError::RetryExhausted { attempts, source: Box::new(err) })
        },
        Err(err) => Err(err),
    }
}
