//! Cancellation token system for viewer tasks
//!
//! Provides cancellation tokens that allow running loads and renders to be
//! cancelled cooperatively. A task checks its token before acting on its
//! result, so a cancelled task that finishes late has no side effects.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Cancellation token for cooperative task cancellation
///
/// Tasks check `is_cancelled()` before mutating shared state. Multiple
/// clones share the same underlying flag via Arc.
///
/// Unlike a job token in a worker pool, a viewer token is never reset:
/// once a load has been superseded it stays dead.
///
/// # Example
///
/// ```
/// use signview_scheduler::CancellationToken;
///
/// let token = CancellationToken::new();
/// let task_token = token.clone();
///
/// // In the task, after the await point:
/// // if task_token.is_cancelled() {
/// //     return; // Drop the result
/// // }
///
/// token.cancel();
/// assert!(task_token.is_cancelled());
/// ```
#[derive(Debug, Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a new cancellation token
    ///
    /// The token starts in a live (non-cancelled) state.
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Cancel this token
    ///
    /// All clones of this token will also observe the cancellation.
    /// Calling it more than once is a no-op.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Check if this token has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Liveness check, the inverse of `is_cancelled()`
    pub fn is_live(&self) -> bool {
        !self.is_cancelled()
    }

    /// Check whether two tokens share the same flag
    pub fn same_as(&self, other: &CancellationToken) -> bool {
        Arc::ptr_eq(&self.cancelled, &other.cancelled)
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancellation_token_basic() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        assert!(token.is_live());

        token.cancel();
        assert!(token.is_cancelled());
        assert!(!token.is_live());
    }

    #[test]
    fn test_cancellation_token_clone() {
        let token1 = CancellationToken::new();
        let token2 = token1.clone();

        assert!(!token2.is_cancelled());

        token1.cancel();
        assert!(token1.is_cancelled());
        assert!(token2.is_cancelled());
        assert!(token1.same_as(&token2));
    }

    #[test]
    fn test_cancellation_token_idempotent() {
        let token = CancellationToken::new();

        token.cancel();
        token.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_independent_tokens() {
        let token1 = CancellationToken::new();
        let token2 = CancellationToken::default();

        token1.cancel();
        assert!(!token2.is_cancelled());
        assert!(!token1.same_as(&token2));
    }
}
