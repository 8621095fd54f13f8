//! The compactor: evacuates sparse old pages after marking, then sweeps old space.
//!
//! Evacuation is planned per forwarding block. All live objects that start in a block
//! move together to one destination range, so an object's new address is computed from
//! the block's destination and the live bits before it. Destinations are the free tails
//! of the old pages that stay, densest pages first, then fresh pages. If no destination
//! can be found for a page, the page is not evacuated and only swept.

use crate::heap::Heap;
use crate::policy::forwarding::ForwardingPage;
use crate::policy::page::PageCollectorAccess;
use crate::policy::Page;
use crate::util::heap::PageId;
use crate::util::memory;
use crate::util::object_model::{self, objects_in, RawObjectIterator};
use crate::util::{Address, ObjectReference};
use crate::vm::VMBinding;
use itertools::Itertools;
use std::cmp::Reverse;
use std::collections::HashSet;
use std::sync::Arc;

/// What a compaction did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CompactionSummary {
    /// Pages whose objects were moved out. They are freed.
    pub evacuated: Vec<PageId>,
    /// Old pages freed, evacuated ones included.
    pub freed_pages: usize,
    pub moved_bytes: usize,
    /// Live bytes left in old space.
    pub live_bytes: usize,
}

struct Destination {
    page: Arc<Page>,
    /// Where the next block moved to this page goes.
    top: Address,
}

pub(crate) struct Compactor<'a, VM: VMBinding> {
    heap: &'a Heap<VM>,
    destinations: Vec<Destination>,
    cursor: usize,
}

impl<'a, VM: VMBinding> Compactor<'a, VM> {
    pub fn new(heap: &'a Heap<VM>) -> Self {
        Compactor {
            heap,
            destinations: vec![],
            cursor: 0,
        }
    }

    /// Compact old space. Every live object must be marked.
    pub fn compact(mut self) -> CompactionSummary {
        let heap = self.heap;
        let candidates = self.select_candidates();
        self.destinations = heap
            .old_space
            .pages(&heap.table)
            .into_iter()
            .filter(|p| !p.is_evacuation_candidate() && !p.is_never_evacuate() && !p.is_executable())
            .sorted_by_key(|p| Reverse(p.live_bytes()))
            .map(|page| Destination {
                top: page.top(),
                page,
            })
            .collect();

        let mut evacuated = vec![];
        let mut moved_bytes = 0;
        for page in candidates {
            match self.plan_page(&page) {
                Some(bytes) => {
                    moved_bytes += bytes;
                    evacuated.push(page);
                }
                None => {
                    debug!("No room to evacuate {:?}, sweeping it instead", page);
                    page.free_forwarding_page();
                    page.set_evacuation_candidate(false);
                }
            }
        }
        for dest in &self.destinations {
            dest.page.set_top(dest.top);
        }
        for page in &evacuated {
            self.move_objects(page);
        }
        self.update_pointers();
        let (live_bytes, freed_pages) = self.sweep(&evacuated);

        let summary = CompactionSummary {
            evacuated: evacuated.iter().map(|p| p.id()).collect(),
            freed_pages,
            moved_bytes,
            live_bytes,
        };
        debug!("Compaction done: {:?}", summary);
        summary
    }

    /// Standard old pages whose live bytes are below `evacuation_threshold` percent of
    /// their capacity. Pinned, executable and empty pages are not evacuated.
    fn select_candidates(&self) -> Vec<Arc<Page>> {
        let heap = self.heap;
        let threshold = heap.options.evacuation_threshold;
        let candidates: Vec<Arc<Page>> = heap
            .old_space
            .pages(&heap.table)
            .into_iter()
            .filter(|p| {
                !p.is_never_evacuate()
                    && !p.is_image()
                    && !p.is_large()
                    && !p.is_executable()
                    && p.live_bytes() > 0
                    && p.live_bytes() * 100 < p.usable_bytes() * threshold
            })
            .collect();
        for page in &candidates {
            page.set_evacuation_candidate(true);
        }
        debug!("{} evacuation candidates", candidates.len());
        candidates
    }

    /// Compute the forwarding information of a candidate page. Returns the bytes it will
    /// move, or `None` (with the destinations unchanged) if they do not fit anywhere.
    fn plan_page(&mut self, page: &Page) -> Option<usize> {
        let saved_cursor = self.cursor;
        let saved_tops: Vec<Address> = self.destinations[saved_cursor..]
            .iter()
            .map(|d| d.top)
            .collect();

        let mut fp = page.allocate_forwarding_page();
        let blocks = record_live_blocks(&mut fp, page);
        let mut moved = 0;
        for (index, live) in blocks {
            match self.reserve(live) {
                Some(to) => fp.block_mut(index).set_new_address(to),
                None => {
                    self.cursor = saved_cursor;
                    let kept = saved_cursor + saved_tops.len();
                    for (dest, top) in self.destinations[saved_cursor..].iter_mut().zip(saved_tops) {
                        dest.top = top;
                    }
                    for dest in &mut self.destinations[kept..] {
                        dest.top = dest.page.object_start();
                    }
                    return None;
                }
            }
            moved += live;
        }
        Some(moved)
    }

    /// Reserve `bytes` at the current destination, moving on to the next one (or a fresh
    /// page) if it does not fit.
    fn reserve(&mut self, bytes: usize) -> Option<Address> {
        loop {
            if let Some(dest) = self.destinations.get_mut(self.cursor) {
                if dest.page.end() - dest.top >= bytes {
                    let to = dest.top;
                    dest.top += bytes;
                    return Some(to);
                }
                self.cursor += 1;
                continue;
            }
            let heap = self.heap;
            match heap.old_space.allocate_page(&heap.table) {
                Ok(page) => self.destinations.push(Destination {
                    top: page.object_start(),
                    page,
                }),
                Err(e) => {
                    debug!("No fresh page for evacuation: {}", e);
                    return None;
                }
            }
        }
    }

    fn move_objects(&self, page: &Page) {
        let fp = page.forwarding_page();
        let Some(fp) = fp.as_ref() else {
            return;
        };
        for object in objects_in(page.object_start(), page.object_end()) {
            if !object_model::is_marked(object) {
                continue;
            }
            let from = object.to_raw_address();
            let to = fp.lookup(from);
            unsafe {
                memory::copy_nonoverlapping(from, to, object_model::get_size(object));
            }
        }
    }

    /// The new location of `object` if it was on an evacuated page.
    fn forwarded(&self, object: ObjectReference) -> Option<ObjectReference> {
        let addr = object.to_raw_address();
        let page = self.heap.table.page_of(addr)?;
        if !page.is_evacuation_candidate() {
            return None;
        }
        let fp = page.forwarding_page();
        let fp = fp.as_ref()?;
        debug_assert!(fp.block_for(addr).is_live(addr), "{} is dead but referenced", object);
        Some(unsafe { ObjectReference::from_raw_address_unchecked(fp.lookup(addr)) })
    }

    fn forward_slot(&self, slot: Address) {
        if let Some(object) = object_model::load_slot(slot) {
            if let Some(new_object) = self.forwarded(object) {
                object_model::store_slot(slot, Some(new_object));
            }
        }
    }

    fn points_to_new_space(&self, slot: Address) -> bool {
        object_model::load_slot(slot)
            .and_then(|object| self.heap.table.page_of(object.to_raw_address()))
            .is_some_and(|page| page.is_new())
    }

    /// Update every reference to a moved object, and rebuild the remembered cards of the
    /// old pages that stay.
    fn update_pointers(&self) {
        let heap = self.heap;
        heap.binding.scan_roots(&mut |slot: Address| self.forward_slot(slot));
        for page in heap.old_space.all_pages(&heap.table) {
            if page.is_evacuation_candidate() {
                continue;
            }
            page.clear_cards();
            for object in objects_in(page.object_start(), page.object_end()) {
                if !object_model::is_marked(object) {
                    continue;
                }
                object_model::scan_object(object, &mut |slot: Address| {
                    self.forward_slot(slot);
                    if self.points_to_new_space(slot) {
                        page.remember_card(slot);
                    }
                });
            }
        }
        for page in heap.new_space.pages(&heap.table) {
            for object in objects_in(page.object_start(), page.object_end()) {
                if object_model::is_marked(object) {
                    object_model::scan_object(object, &mut |slot: Address| self.forward_slot(slot));
                }
            }
        }
    }

    /// Rebuild the free list from the dead objects of the pages that stay, clear all
    /// marks, and free evacuated and empty pages. Returns the live bytes and the number
    /// of freed pages.
    fn sweep(&self, evacuated: &[Arc<Page>]) -> (usize, usize) {
        let heap = self.heap;
        let table = &heap.table;
        heap.old_space.reset_free_list();

        let mut live_bytes = 0;
        let mut empty: HashSet<PageId> = HashSet::new();
        let mut bump_page: Option<(usize, PageId)> = None;
        for page in heap.old_space.pages(table) {
            if page.is_evacuation_candidate() {
                continue;
            }
            let live = self.sweep_page(&page);
            if live == 0 {
                empty.insert(page.id());
                continue;
            }
            live_bytes += live;
            let room = page.end() - page.top();
            if bump_page.map_or(true, |(best, _)| room > best) {
                bump_page = Some((room, page.id()));
            }
        }
        for page in heap.old_space.large_pages(table) {
            match objects_in(page.object_start(), page.object_end()).next() {
                Some(object) if object_model::is_marked(object) => {
                    object_model::clear_mark(object);
                    live_bytes += object_model::get_size(object);
                }
                _ => {
                    empty.insert(page.id());
                }
            }
        }
        for page in heap.new_space.pages(table) {
            for object in objects_in(page.object_start(), page.object_end()) {
                object_model::clear_mark(object);
            }
        }
        for page in evacuated {
            page.free_forwarding_page();
        }

        heap.old_space.set_bump_page(bump_page.map(|(_, id)| id));
        let freed = heap
            .old_space
            .free_pages(table, |p| p.is_evacuation_candidate() || empty.contains(&p.id()));
        (live_bytes, freed.len())
    }

    /// Turn runs of dead objects into free-list chunks, and give an empty tail back to
    /// bump allocation. Returns the live bytes on the page.
    fn sweep_page(&self, page: &Page) -> usize {
        let mut live = 0;
        let mut free_start: Option<Address> = None;
        for addr in RawObjectIterator::new(page.object_start(), page.object_end()) {
            let object = unsafe { ObjectReference::from_raw_address_unchecked(addr) };
            if !object_model::is_filler_at(addr) && object_model::is_marked(object) {
                object_model::clear_mark(object);
                live += object_model::get_size(object);
                if let Some(start) = free_start.take() {
                    self.heap.old_space.add_free_chunk(start, addr - start);
                }
            } else if free_start.is_none() {
                free_start = Some(addr);
            }
        }
        if let Some(start) = free_start {
            page.set_top(start);
        }
        page.set_live_bytes(live);
        live
    }
}

/// Record the live objects of `page` in its forwarding blocks. Returns the blocks that have
/// live objects, with the bytes of the objects that start in each.
fn record_live_blocks(fp: &mut ForwardingPage, page: &Page) -> Vec<(usize, usize)> {
    let mut blocks: Vec<(usize, usize)> = vec![];
    for object in objects_in(page.object_start(), page.object_end()) {
        if !object_model::is_marked(object) {
            continue;
        }
        let addr = object.to_raw_address();
        let size = object_model::get_size(object);
        let index = fp.block_index(addr);
        fp.block_mut(index).record_live(addr, size);
        match blocks.last_mut() {
            Some((last, live)) if *last == index => *live += size,
            _ => blocks.push((index, size)),
        }
    }
    blocks
}
