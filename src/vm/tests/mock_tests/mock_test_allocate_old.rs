use super::mock_test_prelude::*;
use crate::util::constants::BYTES_IN_HEAP_PAGE;

#[test]
pub fn allocate_old_and_large() {
    with_heap(small_heap_builder(32, 2), |heap, mutator| {
        let old = alloc_old(heap, mutator, 3, 0);
        let old_page = memory_manager::page_of(heap, old.to_raw_address()).unwrap();
        assert!(old_page.is_old() && !old_page.is_large());
        assert!(old_page.card_table().is_some());

        // At the large object threshold the object goes to old space, on a standard page.
        let threshold = heap.options().large_object_threshold;
        let big = alloc(heap, mutator, 0, threshold);
        let big_page = memory_manager::page_of(heap, big.to_raw_address()).unwrap();
        assert!(big_page.is_old() && !big_page.is_large());

        // Larger than a page: a large page of its own, spanning several granules.
        let huge = alloc(heap, mutator, 4, 2 * BYTES_IN_HEAP_PAGE);
        let huge_page = memory_manager::page_of(heap, huge.to_raw_address()).unwrap();
        assert!(huge_page.is_large());
        assert_eq!(huge_page.memory_end() - huge_page.start(), 3 * BYTES_IN_HEAP_PAGE);
        let last_byte = huge.to_raw_address() + object_model::get_size(huge) - 1usize;
        assert_eq!(
            memory_manager::page_of(heap, last_byte).map(|p| p.id()),
            Some(huge_page.id())
        );
        assert_eq!(heap.old_space().large_pages(heap.page_table()).len(), 1);

        let usage = memory_manager::heap_usage(heap);
        assert_eq!(usage.new_space.used, 0);
        assert_eq!(
            usage.old_space.used,
            object_model::get_size(old) + object_model::get_size(big) + object_model::get_size(huge)
        );
        assert_eq!(usage.old_space.capacity, 4 * BYTES_IN_HEAP_PAGE);
        assert_eq!(heap.state().gc_count(), 0);
    })
}

/// A large object that dies is freed by the next full collection; a live one survives
/// in place.
#[test]
pub fn large_objects_are_not_moved() {
    with_heap(small_heap_builder(32, 2), |heap, mutator| {
        let live = alloc(heap, mutator, 1, BYTES_IN_HEAP_PAGE);
        write_payload(live, 11);
        heap.binding().set_root(0, Some(live));
        let dead = alloc(heap, mutator, 1, BYTES_IN_HEAP_PAGE);
        let dead_page = memory_manager::page_of(heap, dead.to_raw_address())
            .unwrap()
            .id();

        memory_manager::collect(heap, GcKind::Full);

        assert_eq!(heap.binding().get(0), live);
        assert_eq!(read_payload(live), 11);
        assert!(!object_model::is_marked(live));
        assert!(heap.page_table().get(dead_page).is_none());
        assert_eq!(heap.old_space().large_pages(heap.page_table()).len(), 1);
        assert_eq!(heap.last_compaction_summary().unwrap().freed_pages, 1);
    })
}
