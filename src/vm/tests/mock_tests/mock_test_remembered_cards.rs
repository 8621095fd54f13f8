use super::mock_test_prelude::*;
use crate::util::constants::BYTES_IN_KBYTE;

/// An old-to-new store sets the card of the slot. The scavenge finds the young object
/// through that card alone, and leaves the cards of other old pages alone.
#[test]
pub fn young_object_found_through_card() {
    with_heap(small_heap_builder(32, 2), |heap, mutator| {
        let vm = heap.binding();
        // Two old pages: the second object does not fit after the first padding object.
        let _padding = alloc_old(heap, mutator, 0, 300 * BYTES_IN_KBYTE);
        let old = alloc_old(heap, mutator, 4, 0);
        let unrelated = alloc_old(heap, mutator, 4, 300 * BYTES_IN_KBYTE);
        vm.set_root(0, Some(old));
        vm.set_root(1, Some(unrelated));
        let old_page = memory_manager::page_of(heap, old.to_raw_address()).unwrap();
        let unrelated_page = memory_manager::page_of(heap, unrelated.to_raw_address()).unwrap();
        assert_ne!(old_page.id(), unrelated_page.id());

        let young = alloc(heap, mutator, 0, 8);
        write_payload(young, 42);
        memory_manager::object_reference_write(heap, old, 2, Some(young));
        let slot = object_model::pointer_slot(old, 2);
        assert!(old_page.is_card_remembered(slot));
        assert_eq!(old_page.card_table().unwrap().count_remembered(), 1);
        assert_eq!(unrelated_page.card_table().unwrap().count_remembered(), 0);

        // Old-to-old stores are not remembered.
        memory_manager::object_reference_write(heap, unrelated, 0, Some(old));
        assert_eq!(unrelated_page.card_table().unwrap().count_remembered(), 0);

        // The young object is not a root: only the card keeps it alive.
        memory_manager::collect(heap, GcKind::Scavenge);
        let copied = memory_manager::object_reference_read(old, 2).unwrap();
        assert_ne!(copied, young);
        assert_eq!(read_payload(copied), 42);
        assert!(memory_manager::page_of(heap, copied.to_raw_address())
            .unwrap()
            .is_new());
        // The slot still points into new space, so its card stays set.
        assert!(old_page.is_card_remembered(slot));
        assert_eq!(unrelated_page.card_table().unwrap().count_remembered(), 0);

        // Promoted by the second scavenge: the card is no longer needed.
        memory_manager::collect(heap, GcKind::Scavenge);
        let promoted = memory_manager::object_reference_read(old, 2).unwrap();
        assert_eq!(read_payload(promoted), 42);
        assert!(memory_manager::page_of(heap, promoted.to_raw_address())
            .unwrap()
            .is_old());
        assert!(!old_page.is_card_remembered(slot));
        assert_eq!(old_page.card_table().unwrap().count_remembered(), 0);
    })
}

/// A young object stored into a large old array survives through the card of its slot.
#[test]
pub fn large_array_cards() {
    with_heap(small_heap_builder(32, 2), |heap, mutator| {
        let slots = 100_000;
        let array = alloc_old(heap, mutator, slots, 0);
        heap.binding().set_root(0, Some(array));
        let page = memory_manager::page_of(heap, array.to_raw_address()).unwrap();
        assert!(page.is_large());

        let indices = [0, 31, 32, 5_000, slots - 1];
        for (n, &index) in indices.iter().enumerate() {
            let young = alloc(heap, mutator, 0, 8);
            write_payload(young, n);
            memory_manager::object_reference_write(heap, array, index, Some(young));
        }
        assert_eq!(page.card_table().unwrap().count_remembered(), 4);

        memory_manager::collect(heap, GcKind::Scavenge);
        for (n, &index) in indices.iter().enumerate() {
            let object = memory_manager::object_reference_read(array, index).unwrap();
            assert_eq!(read_payload(object), n);
            assert!(memory_manager::page_of(heap, object.to_raw_address())
                .unwrap()
                .is_new());
        }
        assert_eq!(page.card_table().unwrap().count_remembered(), 4);
        assert_eq!(memory_manager::object_reference_read(array, 1), None);
    })
}

/// A runtime that does its own stores calls the barrier afterwards; the card it sets keeps
/// the young object alive.
#[test]
pub fn barrier_after_runtime_store() {
    with_heap(small_heap_builder(32, 2), |heap, mutator| {
        let old = alloc_old(heap, mutator, 2, 0);
        heap.binding().set_root(0, Some(old));
        let young = alloc(heap, mutator, 0, 8);
        write_payload(young, 7);

        let slot = object_model::pointer_slot(old, 1);
        object_model::store_slot(slot, Some(young));
        let page = memory_manager::page_of(heap, old.to_raw_address()).unwrap();
        assert!(!page.is_card_remembered(slot));
        memory_manager::object_reference_write_post(heap, old, slot, Some(young));
        assert!(page.is_card_remembered(slot));

        memory_manager::collect(heap, GcKind::Scavenge);
        let copied = memory_manager::object_reference_read(old, 1).unwrap();
        assert_eq!(read_payload(copied), 7);
    })
}
