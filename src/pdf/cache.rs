//! LRU cache for rendered pages

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;

use super::request::{PageRender, RenderTag};

/// Cache key for rendered pages
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub tag: RenderTag,
    /// Device pixel ratio (stored as millionths for stable hashing)
    pub dpr_millionths: u32,
}

impl CacheKey {
    #[must_use]
    pub fn new(tag: RenderTag, device_pixel_ratio: f32) -> Self {
        Self {
            tag,
            dpr_millionths: (device_pixel_ratio * 1_000_000.0).round() as u32,
        }
    }
}

/// LRU cache for rendered page data
pub struct PageCache {
    cache: LruCache<CacheKey, Arc<PageRender>>,
}

impl PageCache {
    /// Create a new cache with the given capacity (at least one entry)
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: LruCache::new(NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN)),
        }
    }

    /// Get a cached page, promoting it in the LRU order
    #[must_use]
    pub fn get(&mut self, key: &CacheKey) -> Option<Arc<PageRender>> {
        self.cache.get(key).cloned()
    }

    /// Check if a key is in the cache without promoting it
    #[must_use]
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.cache.contains(key)
    }

    /// Insert a page into the cache, returning an Arc to the data
    pub fn insert(&mut self, key: CacheKey, data: PageRender) -> Arc<PageRender> {
        let arc = Arc::new(data);
        self.cache.put(key, arc.clone());
        arc
    }

    pub fn invalidate_all(&mut self) {
        self.cache.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.cache.cap().get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::engine::PageSize;
    use crate::pdf::raster::RasterSurface;
    use crate::pdf::text_layer::{LayerOrigin, TextLayer};
    use crate::pdf::viewport::Viewport;

    fn render(page: usize) -> PageRender {
        let viewport = Viewport::new(PageSize::new(10.0, 10.0), 1.0);
        PageRender {
            tag: RenderTag::new(page, 1.0),
            viewport,
            raster: RasterSurface {
                pixels: vec![255; 300],
                width_px: 10,
                height_px: 10,
                css_width: 10.0,
                css_height: 10.0,
                device_pixel_ratio: 1.0,
            },
            overlay: TextLayer {
                width: 10.0,
                height: 10.0,
                spans: vec![],
                origin: LayerOrigin::Fallback,
            },
        }
    }

    fn key(page: usize) -> CacheKey {
        CacheKey::new(RenderTag::new(page, 1.0), 1.0)
    }

    #[test]
    fn cache_insert_and_get() {
        let mut cache = PageCache::new(4);
        cache.insert(key(1), render(1));

        assert!(cache.contains(&key(1)));
        assert_eq!(cache.get(&key(1)).map(|r| r.tag.page), Some(1));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn cache_lru_eviction() {
        let mut cache = PageCache::new(2);
        for page in 1..=3 {
            cache.insert(key(page), render(page));
        }

        assert_eq!(cache.len(), 2);
        assert!(!cache.contains(&key(1)));
        assert!(cache.contains(&key(2)));
        assert!(cache.contains(&key(3)));
    }

    #[test]
    fn dpr_is_part_of_the_key() {
        let mut cache = PageCache::new(4);
        cache.insert(key(1), render(1));
        assert!(!cache.contains(&CacheKey::new(RenderTag::new(1, 1.0), 2.0)));
    }

    #[test]
    fn zero_capacity_holds_one_entry() {
        let mut cache = PageCache::new(0);
        assert_eq!(cache.capacity(), 1);
        cache.insert(key(1), render(1));
        cache.invalidate_all();
        assert!(cache.is_empty());
    }
}
