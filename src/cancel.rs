//! Generation-based cancellation.
//!
//! Starting an operation bumps a shared counter and hands out a token that
//! remembers the value it was issued with. The token is cancelled as soon as
//! anyone starts a newer operation on the same counter.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct LoadGeneration(Arc<AtomicU64>);

impl LoadGeneration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Invalidate every outstanding token and issue a fresh one.
    pub fn begin(&self) -> CancelToken {
        let generation = self.0.fetch_add(1, Ordering::SeqCst).wrapping_add(1);
        CancelToken {
            generation,
            current: Arc::clone(&self.0),
        }
    }

    /// Invalidate every outstanding token without starting new work.
    pub fn cancel(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone)]
pub struct CancelToken {
    generation: u64,
    current: Arc<AtomicU64>,
}

impl CancelToken {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_cancelled(&self) -> bool {
        self.generation != self.current.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_newer_token_cancels_older() {
        let generation = LoadGeneration::new();
        let first = generation.begin();
        assert!(!first.is_cancelled());

        let second = generation.begin();
        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());
        assert!(second.generation() > first.generation());
    }

    #[test]
    fn test_cancel_without_new_work() {
        let generation = LoadGeneration::new();
        let token = generation.begin();
        generation.cancel();
        assert!(token.is_cancelled());
    }
}
