use super::mock_test_prelude::*;
use std::sync::atomic::Ordering;

/// Live objects are copied by the first scavenge and promoted by the second. Garbage is
/// reclaimed and the list is intact after each.
#[test]
pub fn scavenge_copies_then_promotes() {
    with_heap(small_heap_builder(32, 2), |heap, mutator| {
        const LEN: usize = 10;
        let size = object_model::required_size(1, 8);
        build_list(heap, mutator, 0, LEN, AllocationSemantics::Default);
        for _ in 0..1000 {
            alloc(heap, mutator, 2, 64);
        }
        let before = check_list(heap, 0, LEN);

        memory_manager::collect(heap, GcKind::Scavenge);
        let copied = check_list(heap, 0, LEN);
        for (old, new) in before.iter().zip(&copied) {
            assert_ne!(old, new);
            assert!(memory_manager::page_of(heap, new.to_raw_address())
                .unwrap()
                .is_new());
        }
        let summary = heap.last_scavenge_summary().unwrap();
        assert_eq!(summary.survivor_bytes, LEN * size);
        assert_eq!(summary.promoted_bytes, 0);
        assert!(!summary.early_tenure);
        assert_eq!(memory_manager::used_bytes(heap), LEN * size);
        assert_eq!(heap.state().last_gc_kind(), Some(GcKind::Scavenge));

        memory_manager::collect(heap, GcKind::Scavenge);
        let promoted = check_list(heap, 0, LEN);
        for object in &promoted {
            assert!(memory_manager::page_of(heap, object.to_raw_address())
                .unwrap()
                .is_old());
        }
        let summary = heap.last_scavenge_summary().unwrap();
        assert_eq!(summary.survivor_bytes, 0);
        assert_eq!(summary.promoted_bytes, LEN * size);
        let usage = memory_manager::heap_usage(heap);
        assert_eq!(usage.new_space.used, 0);
        assert_eq!(usage.old_space.used, LEN * size);

        assert_eq!(heap.state().gc_count(), 2);
        assert_eq!(heap.stats().gc_count(GcKind::Scavenge), 2);
        assert_eq!(heap.stats().gc_count(GcKind::Full), 0);
        assert_eq!(heap.binding().stop_count.load(Ordering::Relaxed), 2);
        assert_eq!(heap.binding().resume_count.load(Ordering::Relaxed), 2);
        assert!(!heap.state().is_gc_in_progress());
    })
}

/// Objects allocated after a scavenge, on the page that holds its survivors, are copied
/// again by the next scavenge instead of being promoted.
#[test]
pub fn new_objects_are_not_promoted_early() {
    with_heap(small_heap_builder(32, 2), |heap, mutator| {
        build_list(heap, mutator, 0, 4, AllocationSemantics::Default);
        memory_manager::collect(heap, GcKind::Scavenge);

        build_list(heap, mutator, 1, 4, AllocationSemantics::Default);
        let fresh = heap.binding().get(1);
        let page = memory_manager::page_of(heap, fresh.to_raw_address()).unwrap();
        assert!(page.is_new());
        assert!(!page.is_survivor(fresh.to_raw_address()));

        memory_manager::collect(heap, GcKind::Scavenge);
        for object in check_list(heap, 0, 4) {
            assert!(memory_manager::page_of(heap, object.to_raw_address())
                .unwrap()
                .is_old());
        }
        for object in check_list(heap, 1, 4) {
            assert!(memory_manager::page_of(heap, object.to_raw_address())
                .unwrap()
                .is_new());
        }
    })
}

/// When most of new space survives, the survivors are all tenured by the next scavenge
/// and new space grows.
#[test]
pub fn early_tenure_and_growth() {
    let mut builder = small_heap_builder(64, 1);
    builder.options.max_new_space_size = 4 * crate::util::constants::BYTES_IN_HEAP_PAGE;
    with_heap(builder, |heap, mutator| {
        let capacity = heap.new_space().capacity_bytes();
        // About 80% of new space, all reachable.
        let len = capacity * 8 / 10 / object_model::required_size(1, 8);
        build_list(heap, mutator, 0, len, AllocationSemantics::Default);

        memory_manager::collect(heap, GcKind::Scavenge);
        assert!(heap.last_scavenge_summary().unwrap().early_tenure);
        assert_eq!(heap.new_space().capacity_bytes(), 2 * capacity);

        memory_manager::collect(heap, GcKind::Scavenge);
        assert_eq!(
            heap.last_scavenge_summary().unwrap().promoted_bytes,
            len * object_model::required_size(1, 8)
        );
        check_list(heap, 0, len);
        assert_eq!(heap.new_space().used_bytes(heap.page_table()), 0);
    })
}
