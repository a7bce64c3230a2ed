//! Load generations
//!
//! Each time a viewer starts a new load it stamps the load with a fresh
//! generation. A completion whose generation is no longer current belongs to
//! a superseded request and must be discarded.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

/// Stamp identifying one request
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(u64);

impl Generation {
    /// Raw counter value
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Shared, monotonically increasing generation counter
///
/// Clones observe the same counter, so a spawned task can hold a clone and
/// compare its own stamp against the latest one when it completes.
#[derive(Debug, Clone, Default)]
pub struct GenerationCounter {
    current: Arc<AtomicU64>,
}

impl GenerationCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin a new generation, superseding every earlier one
    pub fn advance(&self) -> Generation {
        Generation(self.current.fetch_add(1, Ordering::AcqRel) + 1)
    }

    /// The latest generation handed out
    pub fn current(&self) -> Generation {
        Generation(self.current.load(Ordering::Acquire))
    }

    /// Whether `generation` is still the latest one
    pub fn is_current(&self, generation: Generation) -> bool {
        self.current() == generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_supersedes() {
        let counter = GenerationCounter::new();
        let first = counter.advance();
        assert!(counter.is_current(first));

        let second = counter.advance();
        assert!(second > first);
        assert!(!counter.is_current(first));
        assert!(counter.is_current(second));
    }

    #[test]
    fn test_clones_share_counter() {
        let counter = GenerationCounter::new();
        let observer = counter.clone();

        let generation = counter.advance();
        assert!(observer.is_current(generation));

        observer.advance();
        assert!(!counter.is_current(generation));
    }

    #[test]
    fn test_initial_generation_is_zero() {
        let counter = GenerationCounter::new();
        assert_eq!(counter.current().raw(), 0);
    }
}
