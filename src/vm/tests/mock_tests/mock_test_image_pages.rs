use super::mock_test_prelude::*;

#[repr(C, align(16))]
struct Snapshot([u8; 1024]);

/// Snapshot memory registered as an image page is found by range lookup, is visited with
/// the heap, and is neither marked, moved nor freed by collections.
#[test]
pub fn image_pages() {
    // The snapshot must outlive the heap.
    let mut snapshot = Box::new(Snapshot([0; 1024]));
    with_heap(small_heap_builder(16, 2), |heap, mutator| {
        let start = Address::from_mut_ptr(snapshot.0.as_mut_ptr());
        let a = object_model::initialize_object(start, 512, 2);
        let b = object_model::initialize_object(start + 512usize, 512, 0);
        object_model::store_slot(object_model::pointer_slot(a, 0), Some(b));
        write_payload(b, 77);

        let id = memory_manager::add_image_pages(heap, start, 1024, false);
        assert!(memory_manager::is_in_heap(heap, start + 700usize));
        assert!(!memory_manager::is_in_heap(heap, start + 1024usize));
        let page = memory_manager::page_of(heap, b.to_raw_address()).unwrap();
        assert_eq!(page.id(), id);
        assert!(page.is_image() && page.is_never_evacuate() && !page.is_vm_isolate());
        assert!(page.card_table().is_none());
        assert_eq!(page.used(), 1024);

        // A heap object that refers into the image. The barrier ignores the store.
        let young = alloc(heap, mutator, 1, 0);
        memory_manager::object_reference_write(heap, young, 0, Some(a));
        heap.binding().set_root(0, Some(young));

        memory_manager::collect(heap, GcKind::Full);

        let young = heap.binding().get(0);
        assert!(memory_manager::page_of(heap, young.to_raw_address())
            .unwrap()
            .is_old());
        assert_eq!(memory_manager::object_reference_read(young, 0), Some(a));
        assert_eq!(memory_manager::object_reference_read(a, 0), Some(b));
        assert_eq!(read_payload(b), 77);
        assert!(!object_model::is_marked(a));
        assert_eq!(
            memory_manager::page_of(heap, a.to_raw_address()).map(|p| p.id()),
            Some(id)
        );

        let mut seen = vec![];
        memory_manager::visit_objects(heap, &mut |o: ObjectReference| seen.push(o));
        assert_eq!(seen.len(), 3);
        assert!(seen.contains(&a) && seen.contains(&b) && seen.contains(&young));

        // Image pages are not part of the used heap.
        assert_eq!(
            memory_manager::used_bytes(heap),
            object_model::get_size(young)
        );
    })
}
