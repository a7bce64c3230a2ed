//! Prefetch working set
//!
//! The viewer keeps the current page and its immediate neighbours decoded so
//! that page flips are instant. Pages are 1-based.

use std::collections::BTreeSet;

/// The pages worth having loaded for a given current page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkingSet {
    pages: BTreeSet<u32>,
}

impl WorkingSet {
    /// Compute `{current - 1, current, current + 1} ∩ [1, page_count]`
    pub fn around(current: u32, page_count: u32) -> Self {
        let pages = [
            current.checked_sub(1),
            Some(current),
            current.checked_add(1),
        ]
        .into_iter()
        .flatten()
        .filter(|page| (1..=page_count).contains(page))
        .collect();

        Self { pages }
    }

    /// An empty working set (nothing worth loading)
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn contains(&self, page: u32) -> bool {
        self.pages.contains(&page)
    }

    /// Pages in ascending order
    pub fn pages(&self) -> impl Iterator<Item = u32> + '_ {
        self.pages.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Pages in `self` that are not in `other`
    pub fn without<'a>(&'a self, other: &'a WorkingSet) -> impl Iterator<Item = u32> + 'a {
        self.pages.difference(&other.pages).copied()
    }
}
