//! Polling assertions for async tests.

use std::time::Duration;

use tokio::time::{Instant, sleep};

/// Polling interval used by [`assert_eventually`].
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Polls `condition` every 10ms until it holds or `timeout` passes.
///
/// Returns `true` if the condition held before the timeout. Prefer this over
/// fixed sleeps when waiting for a background task or a dispatched call.
///
/// # Example
///
/// ```no_run
/// use std::{
///     sync::{
///         Arc,
///         atomic::{AtomicBool, Ordering},
///     },
///     time::Duration,
/// };
///
/// use relaykit_test_utils::assert_eventually;
///
/// # async fn example() {
/// let done = Arc::new(AtomicBool::new(false));
/// let setter = Arc::clone(&done);
/// tokio::spawn(async move { setter.store(true, Ordering::SeqCst) });
///
/// assert!(assert_eventually(Duration::from_millis(200), || done.load(Ordering::SeqCst)).await);
/// # }
/// ```
pub async fn assert_eventually<F>(timeout: Duration, condition: F) -> bool
where
    F: Fn() -> bool,
{
    assert_eventually_every(timeout, DEFAULT_POLL_INTERVAL, condition).await
}

/// Like [`assert_eventually`], with an explicit polling interval.
pub async fn assert_eventually_every<F>(timeout: Duration, interval: Duration, condition: F) -> bool
where
    F: Fn() -> bool,
{
    let start = Instant::now();

    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        sleep(interval).await;
    }

    // One last look once the timeout has passed.
    condition()
}
