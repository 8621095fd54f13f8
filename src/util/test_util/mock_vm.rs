//! A runtime for tests: a fixed array of root slots, and counters for the safepoint calls.

use crate::heap::{Heap, HeapBuilder};
use crate::plan::{AllocationSemantics, Mutator};
use crate::util::alloc::AllocationError;
use crate::util::constants::BYTES_IN_HEAP_PAGE;
use crate::util::{Address, ObjectReference};
use crate::vm::{Collection, ObjectPointerVisitor, Scanning};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub const DEFAULT_ROOTS: usize = 64;

pub struct MockVM {
    roots: Box<[AtomicUsize]>,
    pub stop_count: AtomicUsize,
    pub resume_count: AtomicUsize,
}

impl MockVM {
    pub fn new(num_roots: usize) -> Self {
        MockVM {
            roots: (0..num_roots).map(|_| AtomicUsize::new(0)).collect(),
            stop_count: AtomicUsize::new(0),
            resume_count: AtomicUsize::new(0),
        }
    }

    pub fn set_root(&self, index: usize, object: Option<ObjectReference>) {
        self.roots[index].store(object.map_or(0, |o| o.value()), Ordering::Relaxed);
    }

    pub fn root(&self, index: usize) -> Option<ObjectReference> {
        let raw = self.roots[index].load(Ordering::Relaxed);
        ObjectReference::from_raw_address(unsafe { Address::from_usize(raw) })
    }

    /// Root `index`, which must hold an object.
    pub fn get(&self, index: usize) -> ObjectReference {
        self.root(index)
            .unwrap_or_else(|| panic!("root {} is empty", index))
    }
}

impl Default for MockVM {
    fn default() -> Self {
        Self::new(DEFAULT_ROOTS)
    }
}

impl Scanning for MockVM {
    fn scan_roots(&self, visitor: &mut dyn ObjectPointerVisitor) {
        for root in self.roots.iter() {
            visitor.visit_slot(Address::from_ref(root));
        }
    }
}

impl Collection for MockVM {
    fn stop_all_mutators(&self) {
        self.stop_count.fetch_add(1, Ordering::Relaxed);
    }

    fn resume_mutators(&self) {
        self.resume_count.fetch_add(1, Ordering::Relaxed);
    }

    fn out_of_memory(&self, err: AllocationError) -> ! {
        panic!("Out of memory with {:?}!", err);
    }
}

/// A builder for a small heap: `heap_pages` pages reserved, `new_pages` pages per
/// semi-space, and no environment variables.
pub fn small_heap_builder(heap_pages: usize, new_pages: usize) -> HeapBuilder {
    let mut builder = HeapBuilder::new_no_env_vars();
    builder.options.heap_size = heap_pages * BYTES_IN_HEAP_PAGE;
    builder.options.new_space_size = new_pages * BYTES_IN_HEAP_PAGE;
    builder.options.max_new_space_size = new_pages * BYTES_IN_HEAP_PAGE;
    builder.options.page_cache_capacity = 0;
    builder
}

/// Build a heap with a [`MockVM`] and bind one mutator.
pub fn with_heap<F>(builder: HeapBuilder, f: F)
where
    F: FnOnce(&Heap<MockVM>, &Arc<Mutator>),
{
    let heap = builder
        .build(MockVM::default())
        .expect("Failed to reserve the test heap");
    let mutator = heap.bind_mutator();
    f(&heap, &mutator);
    heap.destroy_mutator(&mutator);
}

/// Allocate an object with `slots` pointer slots and `payload` bytes of raw data.
pub fn alloc(
    heap: &Heap<MockVM>,
    mutator: &Mutator,
    slots: usize,
    payload: usize,
) -> ObjectReference {
    crate::memory_manager::alloc(heap, mutator, slots, payload, AllocationSemantics::Default)
}

pub fn alloc_old(heap: &Heap<MockVM>, mutator: &Mutator, slots: usize, payload: usize) -> ObjectReference {
    crate::memory_manager::alloc(heap, mutator, slots, payload, AllocationSemantics::Old)
}

/// Store `value` in the first payload word of `object`.
pub fn write_payload(object: ObjectReference, value: usize) {
    unsafe { crate::util::object_model::payload(object).store::<usize>(value) }
}

pub fn read_payload(object: ObjectReference) -> usize {
    unsafe { crate::util::object_model::payload(object).load::<usize>() }
}

/// Build a list of `len` objects through slot 0, held by root `root`. Object `i` carries
/// `i` in its payload; the head is the last one allocated.
pub fn build_list(
    heap: &Heap<MockVM>,
    mutator: &Mutator,
    root: usize,
    len: usize,
    semantics: AllocationSemantics,
) {
    for i in 0..len {
        let object = crate::memory_manager::alloc(heap, mutator, 1, 8, semantics);
        write_payload(object, i);
        let head = heap.binding().root(root);
        crate::memory_manager::object_reference_write(heap, object, 0, head);
        heap.binding().set_root(root, Some(object));
    }
}

/// Walk the list held by root `root` and check that it holds `len, len-1, ..., 0`.
/// Returns the objects from the head.
pub fn check_list(heap: &Heap<MockVM>, root: usize, len: usize) -> Vec<ObjectReference> {
    let mut objects = vec![];
    let mut cursor = heap.binding().root(root);
    while let Some(object) = cursor {
        assert!(
            crate::memory_manager::is_in_heap(heap, object.to_raw_address()),
            "{} is not in the heap",
            object
        );
        assert_eq!(read_payload(object), len - 1 - objects.len());
        objects.push(object);
        cursor = crate::memory_manager::object_reference_read(object, 0);
    }
    assert_eq!(objects.len(), len);
    objects
}
