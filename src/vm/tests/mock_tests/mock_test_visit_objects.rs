use super::mock_test_prelude::*;

/// `visit_objects` releases TLABs first, so objects still in a TLAB are visited too.
/// Free-list fillers are skipped.
#[test]
pub fn visit_objects() {
    let mut builder = small_heap_builder(16, 2);
    // Sweep only, so that the surviving object stays in place.
    builder.options.evacuation_threshold = 0;
    with_heap(builder, |heap, mutator| {
        let young: Vec<ObjectReference> = (0..10).map(|_| alloc(heap, mutator, 1, 8)).collect();
        let old: Vec<ObjectReference> = (0..5).map(|_| alloc_old(heap, mutator, 0, 64)).collect();
        assert!(mutator.tlab_page().is_some());

        let mut seen = vec![];
        memory_manager::visit_objects(heap, &mut |o: ObjectReference| seen.push(o));
        assert_eq!(seen.len(), 15);
        assert!(young.iter().chain(&old).all(|o| seen.contains(o)));
        assert!(mutator.tlab_page().is_none());

        // Only the last old object survives; the others become a free chunk.
        heap.binding().set_root(0, Some(old[4]));
        memory_manager::collect(heap, GcKind::Full);
        let mut seen = vec![];
        memory_manager::visit_objects(heap, &mut |o: ObjectReference| seen.push(o));
        assert_eq!(seen, vec![old[4]]);
        assert!(heap.last_compaction_summary().unwrap().evacuated.is_empty());
        assert_eq!(heap.old_space().free_list_bytes(), 4 * object_model::get_size(old[0]));
    })
}
