//! Signview Cache Library
//!
//! Bounded render cache with strict LRU eviction, keyed by
//! (page, scale, rotation).

pub mod render_cache;

pub use render_cache::{CacheKey, CacheStats, RenderCache, DEFAULT_CAPACITY};
