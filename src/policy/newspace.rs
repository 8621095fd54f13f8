//! New space: the pages mutators allocate into, scavenged by copying.
//!
//! Only the to-space exists between scavenges. A scavenge turns it into from-space and
//! starts a fresh to-space that the survivors are copied into. Mutators then keep
//! allocating into the to-space pages after the survivors.

use super::page::{Page, PageCollectorAccess, PageFlags};
use super::page_list::PageList;
use crate::plan::Mutator;
use crate::util::alloc::AllocationError;
use crate::util::constants::BYTES_IN_HEAP_PAGE;
use crate::util::conversions::{bytes_to_heap_pages_up, heap_pages_to_bytes};
use crate::util::heap::PageTable;
use crate::util::options::Options;
use crate::util::Address;
use std::sync::{Arc, Mutex};

/// One half of new space.
pub struct SemiSpace {
    pages: PageList,
    /// How many pages mutators may fill before a scavenge is needed.
    capacity: usize,
}

impl SemiSpace {
    fn new(capacity: usize) -> Self {
        SemiSpace {
            pages: PageList::new(),
            capacity,
        }
    }

    pub fn pages(&self) -> &PageList {
        &self.pages
    }

    pub fn capacity_in_pages(&self) -> usize {
        self.capacity
    }
}

pub struct NewSpace {
    to_space: Mutex<SemiSpace>,
    max_capacity: usize,
}

impl NewSpace {
    pub fn new(options: &Options) -> Self {
        NewSpace {
            to_space: Mutex::new(SemiSpace::new(bytes_to_heap_pages_up(options.new_space_size))),
            max_capacity: bytes_to_heap_pages_up(options.max_new_space_size),
        }
    }

    /// Give `mutator` a TLAB with room for at least `size` bytes. Its current TLAB, if any,
    /// is released first. Fails when to-space is at capacity.
    pub fn refill_tlab(
        &self,
        table: &PageTable,
        mutator: &Mutator,
        size: usize,
    ) -> Result<(), AllocationError> {
        let mut to = self.to_space.lock().unwrap();
        Self::release_tlab_locked(table, mutator);
        if let Some(tail) = to.pages.tail() {
            let page = table.page(tail);
            if !page.is_owned() && page.end() - page.top() >= size {
                page.acquire(mutator);
                mutator.set_tlab_page(Some(tail));
                return Ok(());
            }
        }
        if to.pages.len() >= to.capacity {
            trace!(
                "New space is full ({} pages), mutator {} needs a scavenge",
                to.pages.len(),
                mutator.id()
            );
            return Err(AllocationError::HeapOutOfMemory);
        }
        let page = Page::allocate(table, BYTES_IN_HEAP_PAGE, PageFlags::NEW)?;
        to.pages.push_back(table, &page);
        page.acquire(mutator);
        mutator.set_tlab_page(Some(page.id()));
        Ok(())
    }

    /// Take the TLAB back from `mutator`. Returns the bytes it allocated in the TLAB.
    pub fn release_tlab(&self, table: &PageTable, mutator: &Mutator) -> usize {
        let _to = self.to_space.lock().unwrap();
        Self::release_tlab_locked(table, mutator)
    }

    fn release_tlab_locked(table: &PageTable, mutator: &Mutator) -> usize {
        let released = match mutator.take_tlab_page() {
            Some(id) => table.page(id).release(mutator),
            None => 0,
        };
        mutator.add_allocated_bytes(released);
        released
    }

    /// Start a scavenge: the current to-space becomes from-space and is returned, and an
    /// empty to-space takes its place. No mutator may own a to-space page.
    pub(crate) fn flip(&self) -> PageList {
        let mut to = self.to_space.lock().unwrap();
        std::mem::take(&mut to.pages)
    }

    /// Allocate `size` bytes in to-space for a copied object. To-space may exceed its
    /// capacity here, since survivors never need more room than from-space had.
    pub(crate) fn allocate_gc(&self, table: &PageTable, size: usize) -> Option<Address> {
        let mut to = self.to_space.lock().unwrap();
        if let Some(tail) = to.pages.tail() {
            if let Some(addr) = table.page(tail).try_allocate_gc(size) {
                return Some(addr);
            }
        }
        let page = match Page::allocate(table, BYTES_IN_HEAP_PAGE, PageFlags::NEW) {
            Ok(page) => page,
            Err(e) => {
                warn!("No page for scavenge survivors: {}", e);
                return None;
            }
        };
        to.pages.push_back(table, &page);
        page.try_allocate_gc(size)
    }

    /// A snapshot of the to-space pages.
    pub fn pages(&self, table: &PageTable) -> Vec<Arc<Page>> {
        self.to_space.lock().unwrap().pages.to_vec(table)
    }

    /// Finish a scavenge that copied `survivor_bytes` into to-space. Survivors are recorded
    /// on every page. If they fill more than `early_tenure_threshold` percent of the
    /// capacity, every to-space object is promoted by the next scavenge. New space grows
    /// when survivors fill more than half of it.
    pub(crate) fn finish_scavenge(
        &self,
        table: &PageTable,
        survivor_bytes: usize,
        early_tenure_threshold: usize,
    ) -> bool {
        let mut to = self.to_space.lock().unwrap();
        let capacity_bytes = heap_pages_to_bytes(to.capacity);
        let early_tenure = survivor_bytes * 100 > capacity_bytes * early_tenure_threshold;
        for page in to.pages.iter(table) {
            page.set_resolved_top(page.object_end());
            if early_tenure {
                page.early_tenure();
            } else {
                page.record_survivors();
            }
        }
        if survivor_bytes * 2 > capacity_bytes && to.capacity < self.max_capacity {
            let grown = (to.capacity * 2).min(self.max_capacity);
            debug!("New space grows from {} to {} pages", to.capacity, grown);
            to.capacity = grown;
        }
        early_tenure
    }

    /// Bytes of objects in to-space. TLABs that are owned count up to their last release.
    pub fn used_bytes(&self, table: &PageTable) -> usize {
        self.to_space
            .lock()
            .unwrap()
            .pages
            .iter(table)
            .map(|p| p.used())
            .sum()
    }

    pub fn capacity_bytes(&self) -> usize {
        heap_pages_to_bytes(self.to_space.lock().unwrap().capacity)
    }

    pub fn capacity_in_pages(&self) -> usize {
        self.to_space.lock().unwrap().capacity_in_pages()
    }

    pub fn num_pages(&self) -> usize {
        self.to_space.lock().unwrap().pages().len()
    }
}
