//! Cancellable task handles
//!
//! A [`TaskHandle`] pairs a spawned tokio task with the [`CancellationToken`]
//! the task checks before acting on its result. Cancelling a handle never
//! interrupts the task; it only flips the liveness flag.

use crate::cancel::CancellationToken;
use std::fmt;
use std::future::Future;
use tokio::task::JoinHandle;

/// Handle to an asynchronous, cooperatively cancellable operation
pub struct TaskHandle<T> {
    token: CancellationToken,
    join: JoinHandle<T>,
}

impl<T: Send + 'static> TaskHandle<T> {
    /// Spawn a task on the current runtime
    ///
    /// The closure receives the task's own token. It must check that token
    /// after every await point and before touching shared state.
    pub fn spawn<F, Fut>(task: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let token = CancellationToken::new();
        let join = tokio::spawn(task(token.clone()));
        Self { token, join }
    }

    /// Wait for the task to finish
    ///
    /// Returns `None` if the task panicked or was aborted by the runtime.
    pub async fn join(self) -> Option<T> {
        match self.join.await {
            Ok(value) => Some(value),
            Err(err) => {
                log::warn!("viewer task did not complete: {err}");
                None
            }
        }
    }
}

impl<T> TaskHandle<T> {
    /// Mark the task as cancelled
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether `cancel()` has been called on this task
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Whether the underlying future has run to completion
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// The task's liveness token
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl<T> fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("cancelled", &self.token.is_cancelled())
            .field("finished", &self.join.is_finished())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_task_runs_to_completion() {
        let handle = TaskHandle::spawn(|_token| async { 42 });
        assert_eq!(handle.join().await, Some(42));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_task_skips_side_effects() {
        let writes = Arc::new(AtomicUsize::new(0));
        let task_writes = Arc::clone(&writes);

        let handle = TaskHandle::spawn(move |token| async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            if token.is_live() {
                task_writes.fetch_add(1, Ordering::SeqCst);
            }
        });

        handle.cancel();
        assert!(handle.is_cancelled());
        handle.join().await;

        assert_eq!(writes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_live_task_applies_side_effects() {
        let writes = Arc::new(AtomicUsize::new(0));
        let task_writes = Arc::clone(&writes);

        let handle = TaskHandle::spawn(move |token| async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            if token.is_live() {
                task_writes.fetch_add(1, Ordering::SeqCst);
            }
        });

        assert!(!handle.is_finished());
        handle.join().await;
        assert_eq!(writes.load(Ordering::SeqCst), 1);
    }
}
