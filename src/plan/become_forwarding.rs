//! Become: make every reference to one object refer to another.
//!
//! Each `before` object is turned into a forwarder. Its tag word points to its `after`
//! object and its size word is kept, so its page stays walkable. Every slot of every
//! object outside the image pages, and every root, is then rewritten through the
//! forwarders, and the cards of old pages are rebuilt for the new targets. Finally the
//! forwarders become fillers.

use crate::heap::Heap;
use crate::policy::page::PageCollectorAccess;
use crate::policy::Page;
use crate::util::object_forwarding;
use crate::util::object_model::{self, RawObjectIterator};
use crate::util::{Address, ObjectReference};
use crate::vm::VMBinding;
use std::collections::HashSet;

/// A batch of identity forwardings, applied by
/// [`memory_manager::become_forward`](crate::memory_manager::become_forward).
#[derive(Debug, Default)]
pub struct Become {
    pairs: Vec<(ObjectReference, ObjectReference)>,
}

/// What a become did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BecomeSummary {
    pub forwarded_objects: usize,
    /// Root and heap slots that now hold an `after` object.
    pub updated_slots: usize,
}

impl Become {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make references to `before` refer to `after`. `before` stops being an object.
    pub fn add(&mut self, before: ObjectReference, after: ObjectReference) {
        self.pairs.push((before, after));
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Panics on a pair that cannot be forwarded. Nothing has been written when it does.
    fn validate<VM: VMBinding>(&self, heap: &Heap<VM>) {
        let mut befores = HashSet::with_capacity(self.pairs.len());
        for &(before, after) in self.pairs.iter() {
            if before == after {
                panic!("Cannot self-forward {}", before);
            }
            match heap.table.page_of(before.to_raw_address()) {
                None => panic!("Cannot forward {}: not in the heap", before),
                Some(page) if page.is_image() => panic!("Cannot forward image object {}", before),
                Some(_) => {}
            }
            if !befores.insert(before) || object_forwarding::is_forwarded(before) {
                panic!("Cannot forward {} to multiple targets", before);
            }
        }
        for &(before, after) in self.pairs.iter() {
            if heap.table.page_of(after.to_raw_address()).is_none() {
                panic!("Cannot forward {} to {}: not in the heap", before, after);
            }
            if befores.contains(&after) || object_forwarding::is_forwarded(after) {
                panic!("No indirect chains of forwarding: {} -> {}", before, after);
            }
        }
    }

    pub(crate) fn forward<VM: VMBinding>(self, heap: &Heap<VM>) -> BecomeSummary {
        let mut summary = BecomeSummary::default();
        if self.pairs.is_empty() {
            return summary;
        }
        self.validate(heap);
        for &(before, after) in self.pairs.iter() {
            object_forwarding::write_forwarding_pointer(before, after);
        }
        summary.forwarded_objects = self.pairs.len();

        heap.binding.scan_roots(&mut |slot: Address| {
            if forward_slot(slot) {
                summary.updated_slots += 1;
            }
        });
        for page in heap.new_space.pages(&heap.table) {
            summary.updated_slots += forward_page(heap, &page);
        }
        for page in heap.old_space.all_pages(&heap.table) {
            summary.updated_slots += forward_page(heap, &page);
        }

        for &(before, _) in self.pairs.iter() {
            object_model::initialize_filler(before.to_raw_address(), object_model::get_size(before));
        }
        summary
    }
}

/// Rewrite `slot` if it refers to a forwarder. Returns whether it did.
fn forward_slot(slot: Address) -> bool {
    match object_model::load_slot(slot) {
        Some(object) if object_forwarding::is_forwarded(object) => {
            let after = object_forwarding::read_forwarding_pointer(object);
            object_model::store_slot(slot, Some(after));
            true
        }
        _ => false,
    }
}

/// Rewrite the slots of every object on `page`. The cards of an old page are rebuilt
/// from scratch, since an `after` object may live in a different space than its
/// `before`.
fn forward_page<VM: VMBinding>(heap: &Heap<VM>, page: &Page) -> usize {
    let remember = page.card_table().is_some();
    if remember {
        page.clear_cards();
    }
    let mut updated = 0;
    for addr in RawObjectIterator::new(page.object_start(), page.object_end()) {
        if object_model::is_filler_at(addr) {
            continue;
        }
        let object = unsafe { ObjectReference::from_raw_address_unchecked(addr) };
        if object_forwarding::is_forwarded(object) {
            continue;
        }
        object_model::scan_object(object, &mut |slot: Address| {
            if forward_slot(slot) {
                updated += 1;
            }
            if remember
                && object_model::load_slot(slot)
                    .and_then(|target| heap.table.page_of(target.to_raw_address()))
                    .is_some_and(|target_page| target_page.is_new())
            {
                page.remember_card(slot);
            }
        });
    }
    trace!("Forwarded {} slots on {:?}", updated, page);
    updated
}

