//! Rendered page cache with LRU eviction
//!
//! Pages are keyed by everything that changes their pixels: the document,
//! the page, the output size, the rotation and the decoration flags. The cache
//! holds at most `cache_size` bytes of RGBA data; the least recently used
//! pages are evicted first.

use pageturn_engine::{RenderRequest, RgbaImage, Rotation};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Default budget, matching the `pageItem/cacheSize` setting default (32 MiB).
pub const DEFAULT_CACHE_SIZE: usize = 32 * 1024 * 1024;

/// Identifies one rendered page image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageKey {
    pub document_id: u64,
    pub page_index: u32,
    pub width_px: u32,
    pub height_px: u32,
    pub rotation: Rotation,
    pub decorate_page: bool,
    pub decorate_links: bool,
}

impl PageKey {
    /// Key for the image `request` produces at `width_px` x `height_px`.
    pub fn for_request(
        document_id: u64,
        request: &RenderRequest,
        width_px: u32,
        height_px: u32,
    ) -> Self {
        Self {
            document_id,
            page_index: request.page_index,
            width_px,
            height_px,
            rotation: request.rotation,
            decorate_page: request.decorate_page,
            decorate_links: request.decorate_links,
        }
    }
}

/// Statistics about cache usage
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CacheStats {
    /// Number of pages currently in cache
    pub page_count: usize,

    /// Total bytes used by cached pages
    pub memory_used: usize,

    /// Maximum bytes allowed
    pub memory_limit: usize,

    pub hits: u64,
    pub misses: u64,

    /// Pages dropped to stay within the budget
    pub evictions: u64,
}

impl CacheStats {
    /// Cache hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct CacheState {
    pages: HashMap<PageKey, Arc<RgbaImage>>,

    /// Least recently used at the front
    lru_queue: VecDeque<PageKey>,

    stats: CacheStats,
}

fn image_cost(image: &RgbaImage) -> usize {
    image.as_raw().len()
}

impl CacheState {
    fn new(memory_limit: usize) -> Self {
        Self {
            pages: HashMap::new(),
            lru_queue: VecDeque::new(),
            stats: CacheStats { memory_limit, ..CacheStats::default() },
        }
    }

    fn touch(&mut self, key: PageKey) {
        self.lru_queue.retain(|k| *k != key);
        self.lru_queue.push_back(key);
    }

    fn take(&mut self, key: &PageKey) -> Option<Arc<RgbaImage>> {
        let image = self.pages.remove(key)?;
        self.lru_queue.retain(|k| k != key);
        self.stats.memory_used = self.stats.memory_used.saturating_sub(image_cost(&image));
        self.stats.page_count = self.pages.len();
        Some(image)
    }

    fn evict_to_fit(&mut self, required: usize) {
        while self.stats.memory_used + required > self.stats.memory_limit {
            let Some(key) = self.lru_queue.front().copied() else {
                break;
            };
            self.take(&key);
            self.stats.evictions += 1;
            tracing::debug!(
                document = key.document_id,
                page = key.page_index,
                memory_used = self.stats.memory_used,
                "evicted cached page"
            );
        }
    }
}

/// Thread-safe LRU cache of rendered pages.
///
/// Clones share the same storage.
///
/// ```
/// use pageturn_cache::{PageCache, PageKey};
/// use pageturn_engine::{RenderRequest, RgbaImage};
///
/// let cache = PageCache::new(1024 * 1024);
/// let request = RenderRequest::page(0);
/// let key = PageKey::for_request(1, &request, 16, 16);
///
/// cache.insert(key, RgbaImage::new(16, 16));
/// assert!(cache.get(&key).is_some());
/// ```
#[derive(Clone)]
pub struct PageCache {
    state: Arc<Mutex<CacheState>>,
}

impl Default for PageCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_SIZE)
    }
}

impl std::fmt::Debug for PageCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageCache").field("stats", &self.stats()).finish()
    }
}

impl PageCache {
    pub fn new(memory_limit: usize) -> Self {
        Self { state: Arc::new(Mutex::new(CacheState::new(memory_limit))) }
    }

    // Every operation leaves the state consistent, so a poisoned lock is still
    // safe to use.
    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores `image` under `key`, evicting least recently used pages to make
    /// room. Images larger than the whole budget are not cached.
    pub fn insert(&self, key: PageKey, image: RgbaImage) -> Arc<RgbaImage> {
        let image = Arc::new(image);
        let cost = image_cost(&image);
        let mut state = self.lock();

        state.take(&key);

        if cost > state.stats.memory_limit {
            tracing::trace!(?key, cost, "page larger than cache budget, not cached");
            return image;
        }

        state.evict_to_fit(cost);
        state.stats.memory_used += cost;
        state.pages.insert(key, Arc::clone(&image));
        state.touch(key);
        state.stats.page_count = state.pages.len();

        image
    }

    /// Returns the cached page and marks it most recently used.
    pub fn get(&self, key: &PageKey) -> Option<Arc<RgbaImage>> {
        let mut state = self.lock();

        match state.pages.get(key).cloned() {
            Some(image) => {
                state.stats.hits += 1;
                state.touch(*key);
                Some(image)
            }
            None => {
                state.stats.misses += 1;
                None
            }
        }
    }

    /// Returns the cached page or renders, stores and returns it.
    pub fn get_or_insert_with<E>(
        &self,
        key: PageKey,
        render: impl FnOnce() -> Result<RgbaImage, E>,
    ) -> Result<Arc<RgbaImage>, E> {
        if let Some(image) = self.get(&key) {
            return Ok(image);
        }

        // Rendering happens outside the lock.
        let image = render()?;
        Ok(self.insert(key, image))
    }

    pub fn contains(&self, key: &PageKey) -> bool {
        self.lock().pages.contains_key(key)
    }

    pub fn remove(&self, key: &PageKey) -> Option<Arc<RgbaImage>> {
        self.lock().take(key)
    }

    /// Drops every page of one document, e.g. after it was refreshed or closed.
    pub fn invalidate_document(&self, document_id: u64) -> usize {
        let mut state = self.lock();
        let keys: Vec<PageKey> =
            state.pages.keys().filter(|key| key.document_id == document_id).copied().collect();

        for key in &keys {
            state.take(key);
        }

        keys.len()
    }

    pub fn clear(&self) {
        let mut state = self.lock();
        state.pages.clear();
        state.lru_queue.clear();
        state.stats.memory_used = 0;
        state.stats.page_count = 0;
    }

    /// Changes the budget, evicting immediately when it shrinks.
    pub fn set_memory_limit(&self, memory_limit: usize) {
        let mut state = self.lock();
        state.stats.memory_limit = memory_limit;
        state.evict_to_fit(0);
    }

    pub fn memory_limit(&self) -> usize {
        self.lock().stats.memory_limit
    }

    pub fn memory_used(&self) -> usize {
        self.lock().stats.memory_used
    }

    pub fn len(&self) -> usize {
        self.lock().pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        self.lock().stats
    }
}
