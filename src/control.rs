//! Cancellation flag and progress events shared between a batch and its caller.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::classify::Category;
use crate::types::{OutcomeStatus, RunState, YearTally};

/// Cooperative cancellation. Checked between years and between files; an
/// in-flight download is allowed to finish or time out.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// True when both tokens share one flag.
    pub fn same_as(&self, other: &CancelToken) -> bool {
        Arc::ptr_eq(&self.flag, &other.flag)
    }
}

/// Events emitted while a batch runs, in processing order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// Browser is being started
    SessionStarting,
    /// Year page discovered; `files` is the number of descriptors found
    YearStarted { year: i32, files: usize },
    /// Year page empty or unreachable
    YearWithoutData { year: i32, reason: String },
    /// One file finished, whatever its outcome
    FileFinished {
        year: i32,
        label: String,
        category: Category,
        status: OutcomeStatus,
        position: usize,
        total: usize,
        totals: YearTally,
    },
    /// Run reached a terminal state
    Finished { state: RunState, totals: YearTally },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_token_is_shared_between_clones() {
        let token = CancelToken::new();
        let observer = token.clone();
        assert!(!observer.is_cancelled());
        token.cancel();
        assert!(observer.is_cancelled());
        assert!(observer.same_as(&token));
        assert!(!CancelToken::new().same_as(&token));
    }
}
