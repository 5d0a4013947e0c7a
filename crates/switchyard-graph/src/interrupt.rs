//! Cooperative cancellation for runs.
//!
//! Cancellation never preempts a node. The executor checks the flag at every
//! step boundary; nodes that wait on timers or external signals use
//! [`Interrupt::sleep`] / [`Interrupt::cancelled`] so the wait ends promptly.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// How a cancellable sleep ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SleepOutcome {
    Elapsed,
    Cancelled,
}

/// Cancellation handle shared between whoever requests shutdown and the runs
/// that observe it. Cloning shares the same flag.
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    token: CancellationToken,
}

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn request_cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once cancellation has been requested.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    /// Sleep for `duration` unless cancellation is requested first.
    pub async fn sleep(&self, duration: Duration) -> SleepOutcome {
        if self.is_cancel_requested() {
            return SleepOutcome::Cancelled;
        }
        tokio::select! {
            biased;
            _ = self.token.cancelled() => SleepOutcome::Cancelled,
            _ = tokio::time::sleep(duration) => SleepOutcome::Elapsed,
        }
    }

    /// A handle cancelled together with this one, but cancellable on its own
    /// without affecting the parent.
    pub fn child(&self) -> Interrupt {
        Interrupt {
            token: self.token.child_token(),
        }
    }

    /// The underlying token, for collaborators that take one directly.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Turn Ctrl-C (and SIGTERM on Unix) into a cancellation request.
    ///
    /// The spawned task ends after the first signal, or when the interrupt is
    /// cancelled some other way.
    pub fn install_signal_handlers(&self) -> JoinHandle<()> {
        let token = self.token.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!(signal = "SIGINT", "Shutdown requested, finishing current step");
                }
                _ = terminate() => {
                    info!(signal = "SIGTERM", "Shutdown requested, finishing current step");
                }
                _ = token.cancelled() => return,
            }
            token.cancel();
        })
    }
}

impl From<CancellationToken> for Interrupt {
    fn from(token: CancellationToken) -> Self {
        Self { token }
    }
}

#[cfg(unix)]
async fn terminate() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut stream) => {
            stream.recv().await;
        }
        Err(_) => std::future::pending::<()>().await,
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_is_idempotent() {
        let interrupt = Interrupt::new();
        assert!(!interrupt.is_cancel_requested());
        interrupt.request_cancel();
        interrupt.request_cancel();
        assert!(interrupt.is_cancel_requested());
    }

    #[test]
    fn clones_share_the_flag() {
        let a = Interrupt::new();
        let b = a.clone();
        b.request_cancel();
        assert!(a.is_cancel_requested());
    }

    #[test]
    fn child_follows_parent_but_not_back() {
        let parent = Interrupt::new();
        let child = parent.child();
        child.request_cancel();
        assert!(child.is_cancel_requested());
        assert!(!parent.is_cancel_requested());

        let other = parent.child();
        parent.request_cancel();
        assert!(other.is_cancel_requested());
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_elapses() {
        let interrupt = Interrupt::new();
        let outcome = interrupt.sleep(Duration::from_secs(5)).await;
        assert_eq!(outcome, SleepOutcome::Elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_is_cut_short_by_cancel() {
        let interrupt = Interrupt::new();
        let canceller = interrupt.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            canceller.request_cancel();
        });

        let start = tokio::time::Instant::now();
        let outcome = interrupt.sleep(Duration::from_secs(3600)).await;
        assert_eq!(outcome, SleepOutcome::Cancelled);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn sleep_after_cancel_returns_immediately() {
        let interrupt = Interrupt::new();
        interrupt.request_cancel();
        assert_eq!(
            interrupt.sleep(Duration::from_secs(3600)).await,
            SleepOutcome::Cancelled
        );
    }

    #[tokio::test]
    async fn signal_task_exits_when_cancelled_elsewhere() {
        let interrupt = Interrupt::new();
        let handle = interrupt.install_signal_handlers();
        interrupt.request_cancel();
        handle.await.unwrap();
    }
}
