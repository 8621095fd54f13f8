use super::mock_test_prelude::*;
use std::sync::atomic::Ordering;

#[test]
pub fn user_collection_request() {
    with_heap(small_heap_builder(16, 2), |heap, mutator| {
        build_list(heap, mutator, 0, 5, AllocationSemantics::Default);
        memory_manager::handle_user_collection_request(heap);
        assert_eq!(heap.state().gc_count(), 1);
        assert_eq!(heap.state().last_gc_kind(), Some(GcKind::Full));
        assert!(!heap.state().is_user_triggered_collection());
        assert_eq!(heap.binding().stop_count.load(Ordering::Relaxed), 1);
        for object in check_list(heap, 0, 5) {
            assert!(memory_manager::page_of(heap, object.to_raw_address())
                .unwrap()
                .is_old());
        }
        let full = heap.stats().get(GcKind::Full);
        assert_eq!(full.count, 1);
        assert!(full.moved_bytes >= 5 * object_model::required_size(1, 8));
        assert!(heap.stats().report().contains("Full: 1 GCs"));
    })
}

#[test]
pub fn ignore_system_gc() {
    let mut builder = small_heap_builder(16, 2);
    assert!(memory_manager::process_bulk(
        &mut builder,
        "ignore_system_gc=true evacuation_threshold=30"
    ));
    assert_eq!(builder.options.evacuation_threshold, 30);
    with_heap(builder, |heap, _mutator| {
        memory_manager::handle_user_collection_request(heap);
        assert_eq!(heap.state().gc_count(), 0);
        assert_eq!(heap.binding().stop_count.load(Ordering::Relaxed), 0);
        // An explicit collection still runs.
        memory_manager::collect(heap, GcKind::Full);
        assert_eq!(heap.state().gc_count(), 1);
    })
}

#[test]
pub fn invalid_options_are_rejected() {
    let mut builder = small_heap_builder(16, 2);
    assert!(!memory_manager::process(&mut builder, "evacuation_threshold", "150"));
    assert!(!memory_manager::process(&mut builder, "no_such_option", "1"));
    assert!(!memory_manager::process_bulk(&mut builder, "heap_size"));
    assert_eq!(builder.options.evacuation_threshold, 50);
}
