use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

/// Heap page usage of a page resource, in heap pages (granules).
pub struct PageAccounting {
    /// Granules handed out to pages, plus granules parked in the page cache.
    committed: AtomicUsize,
    /// Granules parked in the page cache. They stay committed but belong to no page.
    cached: AtomicUsize,
    /// The highest value `committed` has reached.
    peak: AtomicUsize,
}

impl PageAccounting {
    pub fn new() -> Self {
        Self {
            committed: AtomicUsize::new(0),
            cached: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    /// Inform of committing a certain number of granules.
    pub fn commit(&self, pages: usize) {
        let now = self.committed.fetch_add(pages, Ordering::Relaxed) + pages;
        self.peak.fetch_max(now, Ordering::Relaxed);
    }

    /// Inform of decommitting a certain number of granules.
    pub fn release(&self, pages: usize) {
        let _prev = self.committed.fetch_sub(pages, Ordering::Relaxed);
        debug_assert!(_prev >= pages);
    }

    /// A granule moved from a freed page into the cache.
    pub fn cache(&self, pages: usize) {
        self.cached.fetch_add(pages, Ordering::Relaxed);
    }

    /// A cached granule was reused for a page, or decommitted.
    pub fn uncache(&self, pages: usize) {
        let _prev = self.cached.fetch_sub(pages, Ordering::Relaxed);
        debug_assert!(_prev >= pages);
    }

    pub fn get_committed_pages(&self) -> usize {
        self.committed.load(Ordering::Relaxed)
    }

    pub fn get_cached_pages(&self) -> usize {
        self.cached.load(Ordering::Relaxed)
    }

    /// Committed granules that belong to a page.
    pub fn get_used_pages(&self) -> usize {
        self.get_committed_pages() - self.get_cached_pages()
    }

    pub fn get_peak_pages(&self) -> usize {
        self.peak.load(Ordering::Relaxed)
    }
}

impl Default for PageAccounting {
    fn default() -> Self {
        Self::new()
    }
}
