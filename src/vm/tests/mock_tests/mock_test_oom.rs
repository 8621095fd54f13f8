use super::mock_test_prelude::*;
use crate::util::alloc::AllocationError;

/// Keep everything alive until the heap is full. The allocation that cannot be satisfied
/// even after a full collection ends in `Collection::out_of_memory`.
#[test]
#[should_panic(expected = "Out of memory")]
pub fn allocate_until_out_of_memory() {
    with_heap(small_heap_builder(8, 1), |heap, mutator| {
        for i in 0.. {
            let object = alloc(heap, mutator, 1, 4096);
            write_payload(object, i);
            let head = heap.binding().root(0);
            memory_manager::object_reference_write(heap, object, 0, head);
            heap.binding().set_root(0, Some(object));
        }
    })
}

/// `try_alloc` reports exhaustion instead.
#[test]
pub fn try_alloc_old_reports_exhaustion() {
    with_heap(small_heap_builder(8, 1), |heap, mutator| {
        let result = (0..100)
            .map(|_| {
                memory_manager::try_alloc(heap, mutator, 0, 300 * 1024, AllocationSemantics::Old)
            })
            .find(|r| r.is_err());
        assert!(matches!(result, Some(Err(AllocationError::HeapOutOfMemory))));
        assert_eq!(heap.state().gc_count(), 0);
    })
}
