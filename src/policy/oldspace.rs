//! Old space: standard pages filled by bump allocation and a free list, and large pages
//! that each hold one object. Old space is collected by the marker and the compactor.

use super::page::{Page, PageCollectorAccess, PageFlags};
use super::page_list::PageList;
use crate::util::alloc::AllocationError;
use crate::util::constants::{ALLOCATION_RED_ZONE_SIZE, BYTES_IN_HEAP_PAGE};
use crate::util::heap::{PageId, PageTable};
use crate::util::object_model;
use crate::util::Address;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

/// The largest object that fits on a standard page.
pub const MAX_STANDARD_OBJECT_SIZE: usize = BYTES_IN_HEAP_PAGE - ALLOCATION_RED_ZONE_SIZE;

/// Free chunks of old-space pages, by size. Every chunk is formatted as a filler so that
/// pages stay walkable.
#[derive(Default)]
pub struct FreeList {
    chunks: BTreeMap<usize, Vec<Address>>,
    free_bytes: usize,
}

impl FreeList {
    pub fn add(&mut self, start: Address, size: usize) {
        object_model::initialize_filler(start, size);
        self.chunks.entry(size).or_default().push(start);
        self.free_bytes += size;
    }

    /// Take the smallest chunk that fits `size` bytes. The rest of the chunk goes back.
    pub fn allocate(&mut self, size: usize) -> Option<Address> {
        let (&chunk_size, starts) = self.chunks.range_mut(size..).next()?;
        let start = starts.pop()?;
        if starts.is_empty() {
            self.chunks.remove(&chunk_size);
        }
        self.free_bytes -= chunk_size;
        if chunk_size > size {
            self.add(start + size, chunk_size - size);
        }
        Some(start)
    }

    pub fn clear(&mut self) {
        self.chunks.clear();
        self.free_bytes = 0;
    }

    pub fn free_bytes(&self) -> usize {
        self.free_bytes
    }

    pub fn num_chunks(&self) -> usize {
        self.chunks.values().map(|v| v.len()).sum()
    }
}

struct OldSpaceSync {
    pages: PageList,
    large_pages: PageList,
    free_list: FreeList,
    bump_page: Option<PageId>,
}

pub struct OldSpace {
    sync: Mutex<OldSpaceSync>,
}

impl OldSpace {
    pub fn new() -> Self {
        OldSpace {
            sync: Mutex::new(OldSpaceSync {
                pages: PageList::new(),
                large_pages: PageList::new(),
                free_list: FreeList::default(),
                bump_page: None,
            }),
        }
    }

    /// Allocate `size` bytes. Objects that do not fit on a standard page get a large page.
    /// Others come from the free list, then the bump page, then a new page.
    pub fn allocate(&self, table: &PageTable, size: usize) -> Result<Address, AllocationError> {
        let mut sync = self.sync.lock().unwrap();
        if size > MAX_STANDARD_OBJECT_SIZE {
            let page = Page::allocate(table, size, PageFlags::LARGE)?;
            sync.large_pages.push_back(table, &page);
            trace!("Large object of {} bytes on {:?}", size, page);
            return page
                .try_allocate_gc(size)
                .ok_or(AllocationError::HeapOutOfMemory);
        }
        if let Some(addr) = sync.free_list.allocate(size) {
            return Ok(addr);
        }
        if let Some(bump) = sync.bump_page {
            if let Some(addr) = table.page(bump).try_allocate_gc(size) {
                return Ok(addr);
            }
        }
        let page = Page::allocate(table, BYTES_IN_HEAP_PAGE, PageFlags::empty())?;
        sync.pages.push_back(table, &page);
        sync.bump_page = Some(page.id());
        page.try_allocate_gc(size)
            .ok_or(AllocationError::HeapOutOfMemory)
    }

    /// Add an empty standard page. It does not become the bump page.
    pub(crate) fn allocate_page(&self, table: &PageTable) -> Result<Arc<Page>, AllocationError> {
        let page = Page::allocate(table, BYTES_IN_HEAP_PAGE, PageFlags::empty())?;
        self.sync.lock().unwrap().pages.push_back(table, &page);
        Ok(page)
    }

    pub fn pages(&self, table: &PageTable) -> Vec<Arc<Page>> {
        self.sync.lock().unwrap().pages.to_vec(table)
    }

    pub fn large_pages(&self, table: &PageTable) -> Vec<Arc<Page>> {
        self.sync.lock().unwrap().large_pages.to_vec(table)
    }

    /// Standard and large pages.
    pub fn all_pages(&self, table: &PageTable) -> Vec<Arc<Page>> {
        let sync = self.sync.lock().unwrap();
        sync.pages
            .iter(table)
            .chain(sync.large_pages.iter(table))
            .collect()
    }

    /// Unlink and free every page for which `free` returns true. Returns the freed ids.
    pub(crate) fn free_pages(
        &self,
        table: &PageTable,
        mut free: impl FnMut(&Page) -> bool,
    ) -> Vec<PageId> {
        let mut sync = self.sync.lock().unwrap();
        let mut removed = sync.pages.retain(table, |p| !free(p));
        removed.extend(sync.large_pages.retain(table, |p| !free(p)));
        if sync
            .bump_page
            .is_some_and(|id| removed.iter().any(|p| p.id() == id))
        {
            sync.bump_page = None;
        }
        removed
            .into_iter()
            .map(|page| {
                let id = page.id();
                Page::deallocate(page, table);
                id
            })
            .collect()
    }

    /// Forget all free chunks. The compactor rebuilds the free list while sweeping.
    pub(crate) fn reset_free_list(&self) {
        self.sync.lock().unwrap().free_list.clear();
    }

    pub(crate) fn add_free_chunk(&self, start: Address, size: usize) {
        self.sync.lock().unwrap().free_list.add(start, size);
    }

    pub(crate) fn set_bump_page(&self, page: Option<PageId>) {
        self.sync.lock().unwrap().bump_page = page;
    }

    pub fn free_list_bytes(&self) -> usize {
        self.sync.lock().unwrap().free_list.free_bytes()
    }

    /// Bytes of objects in old space, free-list chunks excluded.
    pub fn used_bytes(&self, table: &PageTable) -> usize {
        let sync = self.sync.lock().unwrap();
        let allocated: usize = sync
            .pages
            .iter(table)
            .chain(sync.large_pages.iter(table))
            .map(|p| p.used())
            .sum();
        allocated - sync.free_list.free_bytes()
    }

    /// Bytes of page memory held by old space.
    pub fn capacity_bytes(&self, table: &PageTable) -> usize {
        let sync = self.sync.lock().unwrap();
        sync.pages
            .iter(table)
            .chain(sync.large_pages.iter(table))
            .map(|p| p.memory_end() - p.start())
            .sum()
    }

    pub fn num_pages(&self) -> usize {
        let sync = self.sync.lock().unwrap();
        sync.pages.len() + sync.large_pages.len()
    }
}

impl Default for OldSpace {
    fn default() -> Self {
        Self::new()
    }
}
