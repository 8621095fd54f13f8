//! The scavenger: a copying collection of new space.
//!
//! 1. Flip: the to-space pages become from-space and a new, empty to-space starts.
//! 2. Roots and remembered cards of old pages are scanned. Every reference into
//!    from-space is replaced by the address of the object's copy.
//! 3. Objects are copied into to-space, or promoted into old space if they already
//!    survived a scavenge. The old copy gets a forwarding pointer.
//! 4. Copied objects are scanned in turn, until to-space (scanned from each page's
//!    `resolved_top`) and the promotion stack are both exhausted.
//! 5. Survivors are recorded, and the from-space pages are freed.

use crate::heap::Heap;
use crate::policy::page::PageCollectorAccess;
use crate::policy::Page;
use crate::util::alloc::AllocationError;
use crate::util::heap::PageId;
use crate::util::memory;
use crate::util::object_forwarding;
use crate::util::object_model;
use crate::util::{Address, ObjectReference};
use crate::vm::VMBinding;
use std::collections::HashSet;
use std::sync::Arc;

/// What a scavenge did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScavengeSummary {
    /// Bytes copied into to-space.
    pub survivor_bytes: usize,
    /// Bytes moved into old space.
    pub promoted_bytes: usize,
    /// The number of from-space pages freed.
    pub freed_pages: usize,
    /// Will the next scavenge promote everything left in new space?
    pub early_tenure: bool,
}

pub(crate) struct Scavenger<'a, VM: VMBinding> {
    heap: &'a Heap<VM>,
    tenure_all: bool,
    from_pages: HashSet<PageId>,
    promo_stack: Vec<ObjectReference>,
    survivor_bytes: usize,
    promoted_bytes: usize,
}

impl<'a, VM: VMBinding> Scavenger<'a, VM> {
    /// With `tenure_all`, every live new-space object is promoted.
    pub fn new(heap: &'a Heap<VM>, tenure_all: bool) -> Self {
        Scavenger {
            heap,
            tenure_all,
            from_pages: HashSet::new(),
            promo_stack: vec![],
            survivor_bytes: 0,
            promoted_bytes: 0,
        }
    }

    pub fn scavenge(mut self) -> ScavengeSummary {
        let heap = self.heap;
        let table = &heap.table;

        let from: Vec<Arc<Page>> = heap.new_space.flip().to_vec(table);
        self.from_pages = from.iter().map(|p| p.id()).collect();
        debug!(
            "Scavenge of {} pages{}",
            from.len(),
            if self.tenure_all { ", tenuring all" } else { "" }
        );

        heap.binding.scan_roots(&mut |slot: Address| self.scavenge_slot(slot));

        let old_pages = heap.old_space.all_pages(table);
        for page in &old_pages {
            page.reset_progress_bar();
        }
        for page in &old_pages {
            page.visit_remembered_cards(
                &mut |slot: Address| {
                    self.scavenge_slot(slot);
                    self.points_to_new_space(slot)
                },
                false,
            );
        }

        self.drain();

        let early_tenure = heap.new_space.finish_scavenge(
            table,
            self.survivor_bytes,
            heap.options.early_tenure_threshold,
        );
        let freed_pages = from.len();
        for page in from {
            Page::deallocate(page, table);
        }
        let summary = ScavengeSummary {
            survivor_bytes: self.survivor_bytes,
            promoted_bytes: self.promoted_bytes,
            freed_pages,
            early_tenure,
        };
        debug!("Scavenge done: {:?}", summary);
        summary
    }

    fn in_from_space(&self, object: ObjectReference) -> Option<PageId> {
        self.heap
            .table
            .page_id_of(object.to_raw_address())
            .filter(|id| self.from_pages.contains(id))
    }

    fn points_to_new_space(&self, slot: Address) -> bool {
        object_model::load_slot(slot)
            .and_then(|object| self.heap.table.page_of(object.to_raw_address()))
            .is_some_and(|page| page.is_new())
    }

    /// Make `slot` point to the to-space or old-space copy of the object it refers to.
    fn scavenge_slot(&mut self, slot: Address) {
        let Some(object) = object_model::load_slot(slot) else {
            return;
        };
        let Some(page) = self.in_from_space(object) else {
            return;
        };
        let new_object = if object_forwarding::is_forwarded(object) {
            object_forwarding::read_forwarding_pointer(object)
        } else {
            self.copy_object(object, page)
        };
        object_model::store_slot(slot, Some(new_object));
    }

    fn copy_object(&mut self, object: ObjectReference, page: PageId) -> ObjectReference {
        let heap = self.heap;
        let size = object_model::get_size(object);
        let promote = self.tenure_all || heap.table.page(page).is_survivor(object.to_raw_address());
        let (new_addr, promoted) = if promote {
            match heap.old_space.allocate(&heap.table, size) {
                Ok(addr) => (addr, true),
                Err(e) => {
                    trace!("Promotion of {} failed ({}), copying within new space", object, e);
                    (self.allocate_survivor(size), false)
                }
            }
        } else {
            match heap.new_space.allocate_gc(&heap.table, size) {
                Some(addr) => (addr, false),
                None => (self.allocate_promoted(size), true),
            }
        };
        unsafe {
            memory::copy_nonoverlapping(object.to_raw_address(), new_addr, size);
        }
        let new_object = unsafe { ObjectReference::from_raw_address_unchecked(new_addr) };
        object_forwarding::write_forwarding_pointer(object, new_object);
        if promoted {
            self.promoted_bytes += size;
            self.promo_stack.push(new_object);
        } else {
            self.survivor_bytes += size;
        }
        trace!("Copied {} -> {} ({} bytes)", object, new_object, size);
        new_object
    }

    fn allocate_survivor(&self, size: usize) -> Address {
        let heap = self.heap;
        match heap.new_space.allocate_gc(&heap.table, size) {
            Some(addr) => addr,
            None => heap.binding.out_of_memory(AllocationError::HeapOutOfMemory),
        }
    }

    fn allocate_promoted(&self, size: usize) -> Address {
        let heap = self.heap;
        match heap.old_space.allocate(&heap.table, size) {
            Ok(addr) => addr,
            Err(e) => heap.binding.out_of_memory(e),
        }
    }

    /// Scan copied objects until no new copies are made.
    fn drain(&mut self) {
        let heap = self.heap;
        loop {
            let mut progress = false;
            for page in heap.new_space.pages(&heap.table) {
                let mut cursor = page.resolved_top();
                while cursor < page.object_end() {
                    let object = unsafe { ObjectReference::from_raw_address_unchecked(cursor) };
                    object_model::scan_object(object, &mut |slot: Address| self.scavenge_slot(slot));
                    cursor += object_model::get_size(object);
                    progress = true;
                }
                page.set_resolved_top(cursor);
            }
            while let Some(object) = self.promo_stack.pop() {
                progress = true;
                let page = heap
                    .table
                    .page_of(object.to_raw_address())
                    .unwrap_or_else(|| panic!("promoted object {} is not in the heap", object));
                object_model::scan_object(object, &mut |slot: Address| {
                    self.scavenge_slot(slot);
                    if self.points_to_new_space(slot) {
                        page.remember_card(slot);
                    }
                });
            }
            if !progress {
                break;
            }
        }
    }
}
