use super::mock_test_compaction::{fragment_old_space, PAYLOAD, PER_PAGE};
use super::mock_test_prelude::*;

/// Unallocating the last object in the TLAB moves the cursor back to where it was before
/// the allocation, and the same address is handed out again.
#[test]
pub fn unallocate_in_tlab() {
    with_heap(small_heap_builder(16, 2), |heap, mutator| {
        alloc(heap, mutator, 1, 8);
        let top_before = mutator.tlab().top();
        let object = alloc(heap, mutator, 2, 32);
        assert_eq!(
            mutator.tlab().top(),
            top_before + object_model::get_size(object)
        );
        memory_manager::unallocate(heap, mutator, object);
        assert_eq!(mutator.tlab().top(), top_before);
        #[cfg(debug_assertions)]
        assert_eq!(
            unsafe { object_model::pointer_slot(object, 0).load::<usize>() },
            crate::util::constants::ALLOCATION_CANARY
        );
        assert_eq!(alloc(heap, mutator, 2, 32), object);
        assert_eq!(memory_manager::object_reference_read(object, 0), None);
    })
}

/// Old-space objects are unallocated on their page.
#[test]
pub fn unallocate_in_old_space() {
    with_heap(small_heap_builder(16, 2), |heap, mutator| {
        let first = alloc_old(heap, mutator, 0, 8);
        let page = memory_manager::page_of(heap, first.to_raw_address()).unwrap();
        let top_before = page.top();
        let object = alloc_old(heap, mutator, 0, 100);
        assert_eq!(page.top(), top_before + object_model::get_size(object));
        memory_manager::unallocate(heap, mutator, object);
        assert_eq!(page.top(), top_before);
        assert_eq!(memory_manager::used_bytes(heap), object_model::get_size(first));
    })
}

/// After a sweep, old objects come from free-list chunks below the page top. Unallocating
/// one gives its chunk back to the free list.
#[test]
pub fn unallocate_from_free_list() {
    with_heap(small_heap_builder(64, 2), |heap, mutator| {
        let kept = fragment_old_space(heap, mutator, 1, 1);
        // Unlink one object in the middle of the page.
        memory_manager::object_reference_write(heap, kept[59], 0, Some(kept[61]));
        memory_manager::collect(heap, GcKind::Full);
        let old_space = heap.old_space();
        assert_eq!(old_space.free_list_bytes(), 4096);
        let used = memory_manager::used_bytes(heap);

        let object = alloc_old(heap, mutator, 1, PAYLOAD);
        assert_eq!(object, kept[60]);
        assert_eq!(old_space.free_list_bytes(), 0);
        let page = memory_manager::page_of(heap, object.to_raw_address()).unwrap();
        assert!(object.to_raw_address() + 4096usize < page.top());

        memory_manager::unallocate(heap, mutator, object);
        assert_eq!(old_space.free_list_bytes(), 4096);
        assert_eq!(memory_manager::used_bytes(heap), used);
        let mut visited = 0;
        page.visit_objects(&mut |_object: ObjectReference| visited += 1);
        assert_eq!(visited, PER_PAGE - 1);
        assert_eq!(alloc_old(heap, mutator, 1, PAYLOAD), object);
    })
}

#[test]
#[should_panic(expected = "does not end at the TLAB top")]
pub fn unallocate_not_last() {
    with_heap(small_heap_builder(16, 2), |heap, mutator| {
        let first = alloc(heap, mutator, 1, 8);
        alloc(heap, mutator, 1, 8);
        memory_manager::unallocate(heap, mutator, first);
    })
}
