//! Runtime-to-heap interface: safe Rust APIs.
//!
//! A runtime builds a [`Heap`] from a [`HeapBuilder`] and a value implementing
//! [`VMBinding`], binds one [`Mutator`] per thread, and allocates and writes objects
//! through the functions here. Collections are triggered by allocation, or explicitly
//! by [`handle_user_collection_request`].
//!
//! The functions take the mutator by shared reference. A mutator must still only be used
//! by the thread it was bound for: its TLAB is not synchronized.

use crate::heap::{Heap, HeapBuilder, HeapUsage};
use crate::plan::barriers;
use crate::plan::{AllocationSemantics, Become, BecomeSummary, GcKind, Mutator};
use crate::policy::Page;
use crate::util::alloc::AllocationError;
use crate::util::heap::PageId;
use crate::util::object_model;
use crate::util::{Address, ObjectReference};
use crate::vm::{ObjectVisitor, VMBinding};
use std::sync::Arc;

/// Build a heap. This reserves the heap address range and sets up the page cache.
///
/// This attempts to initialize a logger. A runtime that wants its own logger should
/// install it before calling this function.
///
/// Arguments:
/// * `builder`: The options of the heap.
/// * `binding`: The runtime side of the heap.
pub fn heap_init<VM: VMBinding>(builder: &HeapBuilder, binding: VM) -> std::io::Result<Heap<VM>> {
    builder.build(binding)
}

/// Set an option on a builder by name. Returns false if the option is unknown or the
/// value is invalid.
pub fn process(builder: &mut HeapBuilder, name: &str, value: &str) -> bool {
    builder.set_option(name, value)
}

/// Set options from a space-separated list of `name=value` pairs.
pub fn process_bulk(builder: &mut HeapBuilder, options: &str) -> bool {
    options.split_ascii_whitespace().all(|opt| match opt.split_once('=') {
        Some((name, value)) => builder.set_option(name, value),
        None => {
            warn!("Malformed option {:?}", opt);
            false
        }
    })
}

/// Create a mutator for the current thread. The runtime should keep it in thread-local
/// storage.
pub fn bind_mutator<VM: VMBinding>(heap: &Heap<VM>) -> Arc<Mutator> {
    heap.bind_mutator()
}

/// Release the mutator's TLAB and forget the mutator.
pub fn destroy_mutator<VM: VMBinding>(heap: &Heap<VM>, mutator: Arc<Mutator>) {
    heap.destroy_mutator(&mutator);
}

/// Give the mutator's TLAB back to new space, so that its objects can be walked.
pub fn flush_mutator<VM: VMBinding>(heap: &Heap<VM>, mutator: &Mutator) -> usize {
    heap.new_space.release_tlab(&heap.table, mutator)
}

/// Allocate and initialize an object with `pointer_slots` slots and `payload_bytes` of raw
/// data. All slots are empty and the payload is zeroed. This may collect; if the heap
/// cannot satisfy the request even after a full GC, the binding's `out_of_memory` is
/// called.
///
/// Arguments:
/// * `mutator`: The mutator of the current thread.
/// * `pointer_slots`: The number of reference fields.
/// * `payload_bytes`: The size of the raw data after the reference fields.
/// * `semantics`: Where the object should go.
#[inline(always)]
pub fn alloc<VM: VMBinding>(
    heap: &Heap<VM>,
    mutator: &Mutator,
    pointer_slots: usize,
    payload_bytes: usize,
    semantics: AllocationSemantics,
) -> ObjectReference {
    let size = object_model::required_size(pointer_slots, payload_bytes);
    if heap.is_old_allocation(size, semantics) {
        return heap.alloc_old(size, pointer_slots);
    }
    match mutator.alloc_fast(size, pointer_slots) {
        Some(object) => object,
        None => heap.alloc_slow(mutator, size, pointer_slots),
    }
}

/// Like [`alloc`], but never collects. Returns the error instead.
pub fn try_alloc<VM: VMBinding>(
    heap: &Heap<VM>,
    mutator: &Mutator,
    pointer_slots: usize,
    payload_bytes: usize,
    semantics: AllocationSemantics,
) -> Result<ObjectReference, AllocationError> {
    let size = object_model::required_size(pointer_slots, payload_bytes);
    heap.try_alloc(mutator, size, pointer_slots, semantics)
}

/// Undo the most recent allocation, which must be `object`. The object must not have
/// been published anywhere. A new-space object is removed from the mutator's TLAB; an
/// old-space object is removed from the top of its page, or its memory goes back to the
/// free list if it was allocated from there.
pub fn unallocate<VM: VMBinding>(heap: &Heap<VM>, mutator: &Mutator, object: ObjectReference) {
    let size = object_model::get_size(object);
    heap.unallocate(mutator, object, size);
}

/// Store `target` into the `index`-th reference field of `src`, with the write barrier.
///
/// Arguments:
/// * `src`: The modified object.
/// * `index`: The index of the reference field.
/// * `target`: The new value of the field.
#[inline(always)]
pub fn object_reference_write<VM: VMBinding>(
    heap: &Heap<VM>,
    src: ObjectReference,
    index: usize,
    target: Option<ObjectReference>,
) {
    let slot = object_model::pointer_slot(src, index);
    object_model::store_slot(slot, target);
    barriers::card_marking_post_write(&heap.table, src, slot, target);
}

/// The write barrier alone, for a runtime that stores into `slot` of `src` itself. It
/// must be called after the store.
#[inline(always)]
pub fn object_reference_write_post<VM: VMBinding>(
    heap: &Heap<VM>,
    src: ObjectReference,
    slot: Address,
    target: Option<ObjectReference>,
) {
    barriers::card_marking_post_write(&heap.table, src, slot, target);
}

/// Load the `index`-th reference field of `object`.
pub fn object_reference_read(object: ObjectReference, index: usize) -> Option<ObjectReference> {
    object_model::load_slot(object_model::pointer_slot(object, index))
}

/// Run a collection of the given kind now.
pub fn collect<VM: VMBinding>(heap: &Heap<VM>, kind: GcKind) {
    heap.collect(kind);
}

/// Trigger a full collection as requested by the runtime (e.g. `System.gc()`). Ignored
/// if the `ignore_system_gc` option is set.
pub fn handle_user_collection_request<VM: VMBinding>(heap: &Heap<VM>) {
    heap.request_user_collection();
}

/// Make every reference to each `before` object in `forwarding` refer to its `after`
/// object, in roots and in all objects outside image pages. Runs with the mutators
/// stopped; it is not a collection. The `before` objects become fillers.
///
/// Panics, before changing anything, if a pair forwards an object to itself, forwards
/// an image object or an object outside the heap, names the same `before` twice, or
/// forwards to an object that is itself forwarded.
pub fn become_forward<VM: VMBinding>(heap: &Heap<VM>, forwarding: Become) -> BecomeSummary {
    heap.become_forward(forwarding)
}

/// Visit every object in the heap. Mutators are stopped for the duration.
pub fn visit_objects<VM: VMBinding>(heap: &Heap<VM>, visitor: &mut dyn ObjectVisitor) {
    heap.visit_objects(visitor);
}

/// Register `size` bytes of snapshot memory at `start` as an image page. The memory
/// must hold a sequence of objects that fills it, must lie outside the heap, and must
/// outlive the heap. Image pages are never collected, moved or freed.
pub fn add_image_pages<VM: VMBinding>(
    heap: &Heap<VM>,
    start: Address,
    size: usize,
    is_vm_isolate: bool,
) -> PageId {
    heap.add_image_pages(start, size, is_vm_isolate)
}

/// Is `addr` in a page of this heap (image pages included)?
pub fn is_in_heap<VM: VMBinding>(heap: &Heap<VM>, addr: Address) -> bool {
    heap.table.page_id_of(addr).is_some()
}

/// The page that contains `addr`.
pub fn page_of<VM: VMBinding>(heap: &Heap<VM>, addr: Address) -> Option<Arc<Page>> {
    heap.table.page_of(addr)
}

/// Return used memory in bytes.
pub fn used_bytes<VM: VMBinding>(heap: &Heap<VM>) -> usize {
    heap.used_bytes()
}

/// Return free memory in bytes.
pub fn free_bytes<VM: VMBinding>(heap: &Heap<VM>) -> usize {
    heap.free_bytes()
}

/// Return the total memory in bytes.
pub fn total_bytes<VM: VMBinding>(heap: &Heap<VM>) -> usize {
    heap.total_bytes()
}

/// Used and reserved bytes per generation.
pub fn heap_usage<VM: VMBinding>(heap: &Heap<VM>) -> HeapUsage {
    heap.heap_usage()
}
