use super::mock_test_prelude::*;

/// Allocate a few hundred small objects. They fit in one TLAB, so they are laid out
/// back to back on one page and no collection happens.
#[test]
pub fn allocate_no_gc() {
    with_heap(small_heap_builder(16, 2), |heap, mutator| {
        let size = object_model::required_size(2, 8);
        let objects: Vec<ObjectReference> = (0..300)
            .map(|i| {
                let object = alloc(heap, mutator, 2, 8);
                write_payload(object, i);
                object
            })
            .collect();

        for pair in objects.windows(2) {
            assert_eq!(pair[0].to_raw_address() + size, pair[1].to_raw_address());
        }
        for object in &objects {
            assert_eq!(object_model::get_size(*object), size);
            assert_eq!(object_model::num_pointer_slots(*object), 2);
            assert_eq!(memory_manager::object_reference_read(*object, 0), None);
            assert_eq!(memory_manager::object_reference_read(*object, 1), None);
        }

        let page = memory_manager::page_of(heap, objects[0].to_raw_address()).unwrap();
        assert!(page.is_new());
        assert_eq!(page.owner(), Some(mutator.id()));
        assert_eq!(mutator.tlab_page(), Some(page.id()));

        assert_eq!(memory_manager::flush_mutator(heap, mutator), 300 * size);
        assert!(!page.is_owned());
        assert_eq!(page.used(), 300 * size);
        assert_eq!(mutator.allocated_bytes(), 300 * size);
        assert_eq!(memory_manager::used_bytes(heap), 300 * size);
        assert_eq!(
            memory_manager::free_bytes(heap),
            memory_manager::total_bytes(heap) - 300 * size
        );

        for (i, object) in objects.iter().enumerate() {
            assert_eq!(read_payload(*object), i);
        }
        assert_eq!(heap.state().gc_count(), 0);
        assert_eq!(heap.binding().stop_count.load(std::sync::atomic::Ordering::Relaxed), 0);
    })
}

/// `try_alloc` fails instead of collecting once new space is full.
#[test]
pub fn try_alloc_does_not_collect() {
    with_heap(small_heap_builder(16, 1), |heap, mutator| {
        let payload = 64 * 1024;
        let mut count = 0;
        while memory_manager::try_alloc(heap, mutator, 0, payload, AllocationSemantics::Default)
            .is_ok()
        {
            count += 1;
            assert!(count < 100, "new space does not fill up");
        }
        assert_eq!(count, 7);
        assert_eq!(heap.state().gc_count(), 0);
        assert_eq!(heap.new_space().num_pages(), 1);
    })
}
