use super::PageAccounting;
use crate::util::alloc::AllocationError;
use crate::util::constants::{BYTES_IN_HEAP_PAGE, LOG_BYTES_IN_HEAP_PAGE};
use crate::util::conversions::{bytes_to_heap_pages_up, heap_pages_to_bytes};
use crate::util::memory::{Protection, VirtualMemory};
use crate::util::Address;
use std::io::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// The source of page memory. It reserves the whole heap as one aligned range at startup
/// and hands out runs of heap-page granules from it.
///
/// Freed single-granule pages are kept committed in a small cache, so that a space that
/// keeps freeing and allocating standard pages does not go to the OS every time.
/// The cache is set up by `init` and torn down by `cleanup`, once per heap.
pub struct PageResource {
    memory: VirtualMemory,
    sync: Mutex<PageResourceSync>,
    cache_capacity: usize,
    accounting: PageAccounting,
    torn_down: AtomicBool,
}

struct PageResourceSync {
    /// One entry per granule: is it committed (given to a page, or cached)?
    used: Vec<bool>,
    /// Where the next search for free granules starts.
    cursor: usize,
    /// Committed granules that belong to no page.
    cache: Vec<Address>,
}

impl PageResource {
    /// Reserve `heap_size` bytes (rounded up to whole heap pages) and set up an empty cache
    /// of at most `cache_capacity` pages.
    pub fn init(heap_size: usize, cache_capacity: usize) -> Result<Self> {
        let granules = bytes_to_heap_pages_up(heap_size);
        let memory = VirtualMemory::reserve(heap_pages_to_bytes(granules), BYTES_IN_HEAP_PAGE)?;
        debug!(
            "Page resource: {} heap pages at {}..{}",
            granules,
            memory.start(),
            memory.end()
        );
        Ok(PageResource {
            memory,
            sync: Mutex::new(PageResourceSync {
                used: vec![false; granules],
                cursor: 0,
                cache: Vec::with_capacity(cache_capacity),
            }),
            cache_capacity,
            accounting: PageAccounting::new(),
            torn_down: AtomicBool::new(false),
        })
    }

    pub fn start(&self) -> Address {
        self.memory.start()
    }

    pub fn end(&self) -> Address {
        self.memory.end()
    }

    pub fn contains(&self, addr: Address) -> bool {
        self.memory.contains(addr)
    }

    /// The number of granules in the reservation.
    pub fn total_granules(&self) -> usize {
        self.memory.size() >> LOG_BYTES_IN_HEAP_PAGE
    }

    /// The index of the granule that contains `addr`.
    pub fn granule_index(&self, addr: Address) -> usize {
        debug_assert!(self.contains(addr));
        (addr - self.memory.start()) >> LOG_BYTES_IN_HEAP_PAGE
    }

    pub fn accounting(&self) -> &PageAccounting {
        &self.accounting
    }

    /// Bytes in granules that belong to a page.
    pub fn used_bytes(&self) -> usize {
        heap_pages_to_bytes(self.accounting.get_used_pages())
    }

    /// Allocate `granules` contiguous heap pages. The memory is committed, but only fresh
    /// granules are guaranteed to be zero: a granule taken from the cache still holds
    /// whatever its previous page left there.
    pub fn allocate(&self, granules: usize) -> std::result::Result<Address, AllocationError> {
        debug_assert!(granules > 0);
        assert!(
            !self.torn_down.load(Ordering::Relaxed),
            "Allocating pages after cleanup"
        );
        let mut sync = self.sync.lock().unwrap();
        if granules == 1 {
            if let Some(start) = sync.cache.pop() {
                self.accounting.uncache(1);
                trace!("Reused cached page {}", start);
                return Ok(start);
            }
        }
        let index = match find_free_run(&sync.used, sync.cursor, granules) {
            Some(index) => index,
            None => {
                // Cached granules may be what stands in the way of a large run.
                if granules > 1 && !sync.cache.is_empty() {
                    self.drain_cache(&mut sync);
                    find_free_run(&sync.used, 0, granules).ok_or(AllocationError::HeapOutOfMemory)?
                } else {
                    return Err(AllocationError::HeapOutOfMemory);
                }
            }
        };
        let start = self.memory.start() + heap_pages_to_bytes(index);
        let bytes = heap_pages_to_bytes(granules);
        if let Err(e) = self.memory.commit(start, bytes) {
            warn!("Failed to commit {} bytes at {}: {}", bytes, start, e);
            return Err(AllocationError::MmapOutOfMemory);
        }
        sync.used[index..index + granules].fill(true);
        sync.cursor = index + granules;
        self.accounting.commit(granules);
        trace!("Allocated {} heap pages at {}", granules, start);
        Ok(start)
    }

    /// Give back `granules` heap pages starting at `start`. A single granule goes to the
    /// cache while it has room. Everything else is decommitted.
    pub fn free(&self, start: Address, granules: usize) {
        let mut sync = self.sync.lock().unwrap();
        let index = self.granule_index(start);
        debug_assert!(sync.used[index..index + granules].iter().all(|u| *u));
        if granules == 1 && sync.cache.len() < self.cache_capacity {
            sync.cache.push(start);
            self.accounting.cache(1);
            trace!("Cached page {}", start);
            return;
        }
        self.decommit(&mut sync, start, granules);
    }

    fn decommit(&self, sync: &mut PageResourceSync, start: Address, granules: usize) {
        let index = self.granule_index(start);
        if let Err(e) = self.memory.decommit(start, heap_pages_to_bytes(granules)) {
            warn!("Failed to decommit {} heap pages at {}: {}", granules, start, e);
        }
        sync.used[index..index + granules].fill(false);
        sync.cursor = sync.cursor.min(index);
        self.accounting.release(granules);
    }

    fn drain_cache(&self, sync: &mut PageResourceSync) {
        while let Some(start) = sync.cache.pop() {
            self.accounting.uncache(1);
            self.decommit(sync, start, 1);
        }
    }

    /// Decommit every cached page.
    pub fn clear_cache(&self) {
        let mut sync = self.sync.lock().unwrap();
        let cached = sync.cache.len();
        self.drain_cache(&mut sync);
        if cached > 0 {
            debug!("Cleared {} cached pages", cached);
        }
    }

    /// The number of bytes held in the page cache.
    pub fn cached_size(&self) -> usize {
        heap_pages_to_bytes(self.accounting.get_cached_pages())
    }

    /// Tear down the page cache. No page can be allocated afterwards. The reservation
    /// itself is released when the resource is dropped.
    pub fn cleanup(&self) {
        if self.torn_down.swap(true, Ordering::Relaxed) {
            return;
        }
        self.clear_cache();
        debug!(
            "Page resource cleaned up ({} heap pages still in use, peak {})",
            self.accounting.get_used_pages(),
            self.accounting.get_peak_pages()
        );
    }

    pub fn protect(&self, start: Address, size: usize, prot: Protection) -> Result<()> {
        self.memory.protect(start, size, prot)
    }
}

/// Find `n` free entries in a row, searching from `hint` first and then from the start.
fn find_free_run(used: &[bool], hint: usize, n: usize) -> Option<usize> {
    if n > used.len() {
        return None;
    }
    let search = |from: usize| -> Option<usize> {
        let mut run = 0;
        for (i, u) in used.iter().enumerate().skip(from) {
            if *u {
                run = 0;
            } else {
                run += 1;
                if run == n {
                    return Some(i + 1 - n);
                }
            }
        }
        None
    };
    search(hint.min(used.len())).or_else(|| search(0))
}
