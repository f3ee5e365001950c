//! Per-call cancellation context.
//!
//! A [`CallContext`] pairs a [`CancellationToken`] with an optional absolute
//! deadline. It is cheap to clone and every clone observes the same token,
//! so a caller can keep one handle and cancel a call that was handed to the
//! dispatcher.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::CancelReason;

/// Cancellation signal and deadline for a single call.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl CallContext {
    /// Creates a context that is never cancelled and has no deadline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a context driven by an existing token.
    #[must_use]
    pub fn with_token(token: CancellationToken) -> Self {
        Self { token, deadline: None }
    }

    /// Sets an absolute deadline.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Sets a deadline `timeout` from now.
    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Returns the cancellation token.
    #[must_use]
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Returns the deadline, if one is set.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns the time left before the deadline, if one is set.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline.map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Cancels the context. All clones observe the cancellation.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Returns the reason the context is done, or `None` while it is live.
    #[must_use]
    pub fn is_done(&self) -> Option<CancelReason> {
        if self.token.is_cancelled() {
            return Some(CancelReason::Caller);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => {
                Some(CancelReason::Deadline(Duration::ZERO))
            },
            _ => None,
        }
    }

    /// Resolves once the context is cancelled or its deadline passes.
    pub async fn done(&self) -> CancelReason {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    biased;
                    () = self.token.cancelled() => CancelReason::Caller,
                    () = tokio::time::sleep_until(deadline) => CancelReason::Deadline(Duration::ZERO),
                }
            },
            None => {
                self.token.cancelled().await;
                CancelReason::Caller
            },
        }
    }
}
