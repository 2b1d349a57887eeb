//! Detached work: futures that outlive the request that submitted them.
//!
//! Each submitted item runs at most once. It is never retried and nobody waits for
//! its result; a failure or panic is logged and counted, then dropped. The only
//! observable state is how many items are still running, which the readiness probe
//! reports and shutdown uses to drain.

use crate::metrics_defs::{DETACHED_TASKS_FAILED, DETACHED_TASKS_INFLIGHT};
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Notify;

#[derive(Default)]
struct Inner {
    inflight: AtomicUsize,
    idle: Notify,
}

#[derive(Clone, Default)]
pub struct DetachedTasks {
    inner: Arc<Inner>,
}

impl DetachedTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns `work` on the runtime and returns immediately.
    pub fn submit<F, E>(&self, name: &'static str, work: F)
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        self.inner.inflight.fetch_add(1, Ordering::SeqCst);
        shared::gauge!(DETACHED_TASKS_INFLIGHT).increment(1.0);

        let inner = self.inner.clone();
        tokio::spawn(async move {
            // Run in its own task so a panic is reported here instead of lost.
            match tokio::spawn(work).await {
                Ok(Ok(())) => tracing::debug!(task = name, "detached task finished"),
                Ok(Err(e)) => {
                    shared::counter!(DETACHED_TASKS_FAILED, "task" => name).increment(1);
                    tracing::error!(task = name, error = %e, "detached task failed");
                }
                Err(e) => {
                    shared::counter!(DETACHED_TASKS_FAILED, "task" => name).increment(1);
                    tracing::error!(task = name, error = %e, "detached task panicked");
                }
            }

            shared::gauge!(DETACHED_TASKS_INFLIGHT).decrement(1.0);
            if inner.inflight.fetch_sub(1, Ordering::SeqCst) == 1 {
                inner.idle.notify_waiters();
            }
        });
    }

    pub fn inflight(&self) -> usize {
        self.inner.inflight.load(Ordering::SeqCst)
    }

    /// Resolves once no submitted work is running.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            if self.inflight() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Waits up to `grace` for running work. Returns how many items were abandoned.
    pub async fn drain(&self, grace: Duration) -> usize {
        if tokio::time::timeout(grace, self.wait_idle()).await.is_err() {
            let abandoned = self.inflight();
            tracing::warn!(abandoned, "detached tasks still running at shutdown");
            return abandoned;
        }
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_submit_returns_before_work_runs() {
        let tasks = DetachedTasks::new();
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();

        tasks.submit("mark", async move {
            flag.store(true, Ordering::SeqCst);
            Ok::<_, String>(())
        });

        assert!(!ran.load(Ordering::SeqCst));
        assert_eq!(tasks.inflight(), 1);

        tasks.wait_idle().await;
        assert!(ran.load(Ordering::SeqCst));
        assert_eq!(tasks.inflight(), 0);
    }

    fn tasks_should_panic() -> bool {
        true
    }

    #[tokio::test]
    async fn test_failures_and_panics_are_swallowed() {
        let tasks = DetachedTasks::new();

        tasks.submit("fails", async { Err::<(), _>("upstream said no") });
        tasks.submit("panics", async {
            if tasks_should_panic() {
                panic!("boom");
            }
            Ok::<(), String>(())
        });

        tasks.wait_idle().await;
        assert_eq!(tasks.inflight(), 0);
    }

    #[tokio::test]
    async fn test_drain_gives_up_after_grace() {
        let tasks = DetachedTasks::new();
        let (_tx, rx) = oneshot::channel::<()>();

        tasks.submit("stuck", async move {
            let _ = rx.await;
            Ok::<_, String>(())
        });

        let abandoned = tasks.drain(Duration::from_millis(20)).await;
        assert_eq!(abandoned, 1);
    }

    #[tokio::test]
    async fn test_drain_when_idle() {
        let tasks = DetachedTasks::new();
        assert_eq!(tasks.drain(Duration::from_millis(1)).await, 0);
    }
}
