//! Cooperative cancellation.
//!
//! Every execution plan polls a [`CancellationToken`] at each `next`
//! boundary. The token combines an externally set abort flag with an
//! optional deadline; no thread is ever interrupted.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{QueryError, QueryResult};

/// Shared cancellation flag plus optional deadline.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    aborted: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancellationToken {
    /// A token that never fires.
    #[must_use]
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// A token firing [`QueryError::Timeout`] once `timeout` has elapsed.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { aborted: Arc::default(), deadline: Instant::now().checked_add(timeout) }
    }

    /// Requests cancellation; the running query fails with
    /// [`QueryError::Aborted`] at its next step.
    pub fn abort(&self) {
        self.aborted.store(true, Ordering::Relaxed);
    }

    /// Checks the token. Called at every `next` boundary.
    pub fn check(&self) -> QueryResult<()> {
        if self.aborted.load(Ordering::Relaxed) {
            return Err(QueryError::Aborted);
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() > deadline {
                return Err(QueryError::Timeout);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unbounded_never_fires() {
        let token = CancellationToken::unbounded();
        assert_eq!(Ok(()), token.check());
    }

    #[test]
    fn abort_is_visible_through_clones() {
        let token = CancellationToken::unbounded();
        let clone = token.clone();
        token.abort();
        assert_eq!(Err(QueryError::Aborted), clone.check());
    }

    #[test]
    fn elapsed_deadline_times_out() {
        let token = CancellationToken::with_timeout(Duration::from_millis(0));
        std::thread::sleep(Duration::from_millis(2));
        assert_eq!(Err(QueryError::Timeout), token.check());
    }
}
