//! Pageturn cache library
//!
//! In-memory cache of rendered pages with a byte budget and LRU eviction.

pub mod page_cache;

pub use page_cache::{CacheStats, PageCache, PageKey, DEFAULT_CACHE_SIZE};
