//! Background dispatch with single-shot result delivery.
//!
//! [`AsyncDispatcher::dispatch`] moves a call onto its own tokio task and
//! returns an [`AsyncHandle`] right away. The task always sends exactly one
//! result: the call's own outcome, `Cancelled` if the context finishes
//! first, or `Internal` if the call panics.

use std::{
    future::Future,
    panic::AssertUnwindSafe,
    pin::Pin,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    task::{Context, Poll},
};

use futures::FutureExt;
use tokio::{runtime::Handle, sync::oneshot};

use crate::{
    context::CallContext,
    error::{CancelledSnafu, InternalSnafu, Result},
};

/// Spawns calls onto a tokio runtime.
#[derive(Debug, Clone)]
pub struct AsyncDispatcher {
    runtime: Handle,
}

impl AsyncDispatcher {
    /// Creates a dispatcher on the given runtime.
    #[must_use]
    pub fn new(runtime: Handle) -> Self {
        Self { runtime }
    }

    /// Creates a dispatcher on the current runtime, if there is one.
    #[must_use]
    pub fn try_current() -> Option<Self> {
        Handle::try_current().ok().map(Self::new)
    }

    /// Runs `call` on a new task and returns a handle to its result.
    ///
    /// Never blocks. Dropping the handle does not stop the task; its result
    /// is discarded.
    pub fn dispatch<T, F>(&self, ctx: CallContext, call: F) -> AsyncHandle<T>
    where
        T: Send + 'static,
        F: Future<Output = Result<T>> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let finished = Arc::new(AtomicBool::new(false));
        let task_finished = Arc::clone(&finished);

        self.runtime.spawn(async move {
            let result = match ctx.is_done() {
                Some(reason) => CancelledSnafu { reason }.fail(),
                None => {
                    tokio::select! {
                        biased;
                        reason = ctx.done() => CancelledSnafu { reason }.fail(),
                        outcome = AssertUnwindSafe(call).catch_unwind() => match outcome {
                            Ok(result) => result,
                            Err(panic) => {
                                let message = panic_message(panic.as_ref());
                                tracing::error!(%message, "dispatched call panicked");
                                InternalSnafu { message: format!("dispatched call panicked: {message}") }.fail()
                            },
                        },
                    }
                },
            };
            // The receiver may be gone; the result is then discarded.
            let _ = tx.send(result);
            task_finished.store(true, Ordering::Release);
        });

        AsyncHandle { rx: Some(rx), finished }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

/// Single-use receiver for a dispatched call's result.
///
/// Await it, poll it with [`try_recv`](Self::try_recv), or block on it from
/// synchronous code with [`blocking_recv`](Self::blocking_recv).
#[derive(Debug)]
#[must_use = "the result of a dispatched call is only observable through its handle"]
pub struct AsyncHandle<T> {
    rx: Option<oneshot::Receiver<Result<T>>>,
    finished: Arc<AtomicBool>,
}

impl<T> AsyncHandle<T> {
    /// Creates a handle that already holds `result`.
    pub(crate) fn ready(result: Result<T>) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(result);
        Self { rx: Some(rx), finished: Arc::new(AtomicBool::new(true)) }
    }

    /// Returns the result if it has been delivered, without waiting.
    ///
    /// Returns `None` while the call is still running. Once the result has
    /// been taken, later calls report [`SdkError::Internal`](crate::SdkError::Internal).
    pub fn try_recv(&mut self) -> Option<Result<T>> {
        let Some(rx) = self.rx.as_mut() else {
            return Some(dropped());
        };
        let received = match rx.try_recv() {
            Ok(result) => result,
            Err(oneshot::error::TryRecvError::Empty) => return None,
            Err(oneshot::error::TryRecvError::Closed) => dropped(),
        };
        self.rx = None;
        Some(received)
    }

    /// Blocks the current thread until the result arrives.
    ///
    /// # Panics
    ///
    /// Panics if called from within an asynchronous execution context.
    pub fn blocking_recv(mut self) -> Result<T> {
        match self.rx.take() {
            Some(rx) => rx.blocking_recv().unwrap_or_else(|_| dropped()),
            None => dropped(),
        }
    }

    /// Returns true once the call has produced its result.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }
}

impl<T> Future for AsyncHandle<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let Some(rx) = self.rx.as_mut() else {
            return Poll::Ready(dropped());
        };
        let received = match Pin::new(rx).poll(cx) {
            Poll::Ready(received) => received.unwrap_or_else(|_| dropped()),
            Poll::Pending => return Poll::Pending,
        };
        self.rx = None;
        Poll::Ready(received)
    }
}

fn dropped<T>() -> Result<T> {
    InternalSnafu { message: "dispatched call ended without a result" }.fail()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::error::{CancelReason, SdkError};

    fn dispatcher() -> AsyncDispatcher {
        AsyncDispatcher::try_current().unwrap()
    }

    #[tokio::test]
    async fn test_delivers_success() {
        let handle = dispatcher().dispatch(CallContext::new(), async { Ok(5) });
        assert_eq!(handle.await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_delivers_error() {
        let handle = dispatcher()
            .dispatch(CallContext::new(), async { Err::<(), _>(SdkError::Closed) });
        assert!(matches!(handle.await, Err(SdkError::Closed)));
    }

    #[tokio::test]
    async fn test_precancelled_context_delivers_cancelled() {
        let ctx = CallContext::new();
        ctx.cancel();

        let handle = dispatcher().dispatch(ctx, async { Ok(1) });

        assert!(matches!(handle.await, Err(SdkError::Cancelled { reason: CancelReason::Caller })));
    }

    #[tokio::test]
    async fn test_panic_delivers_internal() {
        let handle = dispatcher().dispatch(CallContext::new(), async {
            if true {
                panic!("boom");
            }
            Ok(())
        });

        let err = handle.await.unwrap_err();
        assert!(matches!(err, SdkError::Internal { .. }));
        assert!(err.to_string().contains("boom"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_while_running() {
        let ctx = CallContext::new();
        let handle = dispatcher().dispatch(ctx.clone(), async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        ctx.cancel();

        assert!(handle.await.unwrap_err().is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_try_recv_and_is_finished() {
        let (release_tx, release_rx) = oneshot::channel::<()>();
        let mut handle = dispatcher().dispatch(CallContext::new(), async move {
            let _ = release_rx.await;
            Ok("done")
        });

        tokio::task::yield_now().await;
        assert!(handle.try_recv().is_none());
        assert!(!handle.is_finished());

        release_tx.send(()).unwrap();
        assert!(
            relaykit_test_utils::assert_eventually(Duration::from_secs(1), || handle.is_finished())
                .await
        );

        assert_eq!(handle.try_recv().unwrap().unwrap(), "done");
        assert!(matches!(handle.try_recv(), Some(Err(SdkError::Internal { .. }))));
    }

    #[tokio::test]
    async fn test_dropped_handle_does_not_stop_task() {
        let (done_tx, done_rx) = oneshot::channel();
        drop(dispatcher().dispatch(CallContext::new(), async move {
            let _ = done_tx.send(());
            Ok(())
        }));

        tokio::time::timeout(Duration::from_secs(1), done_rx).await.unwrap().unwrap();
    }

    #[test]
    fn test_blocking_recv_from_sync_code() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let dispatcher = AsyncDispatcher::new(runtime.handle().clone());

        let handle = dispatcher.dispatch(CallContext::new(), async { Ok(42) });

        assert_eq!(handle.blocking_recv().unwrap(), 42);
    }
}
