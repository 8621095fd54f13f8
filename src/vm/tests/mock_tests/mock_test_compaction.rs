use super::mock_test_prelude::*;
use crate::util::constants::BYTES_IN_HEAP_PAGE;
use std::collections::HashSet;

/// 4096-byte objects: 127 of them fill a standard page.
pub(super) const PAYLOAD: usize = 4096 - 24;
pub(super) const PER_PAGE: usize = 127;

/// Fill `pages` old pages with objects and keep every `stride`-th one alive, linked
/// through slot 0 from root 0. Returns the objects kept, from the list head.
pub(super) fn fragment_old_space(
    heap: &crate::Heap<MockVM>,
    mutator: &crate::Mutator,
    pages: usize,
    stride: usize,
) -> Vec<ObjectReference> {
    let mut kept = vec![];
    for i in 0..pages * PER_PAGE {
        let object = alloc_old(heap, mutator, 1, PAYLOAD);
        assert_eq!(object_model::get_size(object), 4096);
        if i % stride == 0 {
            write_payload(object, i);
            let head = heap.binding().root(0);
            memory_manager::object_reference_write(heap, object, 0, head);
            heap.binding().set_root(0, Some(object));
            kept.push(object);
        }
    }
    assert_eq!(heap.old_space().num_pages(), pages);
    kept.reverse();
    kept
}

/// Walk the list from root 0 and return the payloads.
pub(super) fn list_payloads(heap: &crate::Heap<MockVM>) -> Vec<usize> {
    let mut payloads = vec![];
    let mut cursor = heap.binding().root(0);
    while let Some(object) = cursor {
        payloads.push(read_payload(object));
        cursor = memory_manager::object_reference_read(object, 0);
    }
    payloads
}

/// Sparse pages are evacuated. Following every live pointer after the compaction only
/// reaches pages that still exist, and every object kept its contents.
#[test]
pub fn sparse_pages_are_evacuated() {
    with_heap(small_heap_builder(64, 2), |heap, mutator| {
        let kept = fragment_old_space(heap, mutator, 4, 8);
        let expected: Vec<usize> = kept.iter().map(|o| read_payload(*o)).collect();
        let before: HashSet<_> = heap
            .old_space()
            .pages(heap.page_table())
            .iter()
            .map(|p| p.id())
            .collect();

        memory_manager::collect(heap, GcKind::Full);

        let summary = heap.last_compaction_summary().unwrap();
        assert_eq!(summary.evacuated.len(), 4);
        assert!(summary.evacuated.iter().all(|id| before.contains(id)));
        assert_eq!(summary.freed_pages, 4);
        assert_eq!(summary.moved_bytes, kept.len() * 4096);
        assert_eq!(summary.live_bytes, kept.len() * 4096);

        let mut cursor = heap.binding().root(0);
        while let Some(object) = cursor {
            let page = memory_manager::page_of(heap, object.to_raw_address())
                .expect("pointer into a freed page");
            assert!(page.is_old());
            assert!(!summary.evacuated.contains(&page.id()));
            assert!(!object_model::is_marked(object));
            cursor = memory_manager::object_reference_read(object, 0);
        }
        assert_eq!(list_payloads(heap), expected);

        // All survivors were packed into one fresh page.
        assert_eq!(heap.old_space().num_pages(), 1);
        let usage = memory_manager::heap_usage(heap);
        assert_eq!(usage.old_space.used, kept.len() * 4096);
        assert_eq!(usage.old_space.capacity, BYTES_IN_HEAP_PAGE);
        assert_eq!(heap.stats().gc_count(GcKind::Full), 1);
    })
}

/// Dense pages stay in place and are swept: dead objects become free-list chunks that
/// later old-space allocations reuse.
#[test]
pub fn dense_pages_are_swept() {
    with_heap(small_heap_builder(64, 2), |heap, mutator| {
        // Keep 3 of every 4 objects: 75% live, above the evacuation threshold.
        let mut kept = vec![];
        for i in 0..2 * PER_PAGE {
            let object = alloc_old(heap, mutator, 1, PAYLOAD);
            if i % 4 != 3 {
                write_payload(object, i);
                let head = heap.binding().root(0);
                memory_manager::object_reference_write(heap, object, 0, head);
                heap.binding().set_root(0, Some(object));
                kept.push(object);
            }
        }
        kept.reverse();
        let pages_before = heap.old_space().num_pages();

        memory_manager::collect(heap, GcKind::Full);

        let summary = heap.last_compaction_summary().unwrap();
        assert!(summary.evacuated.is_empty());
        assert_eq!(heap.old_space().num_pages(), pages_before);
        let mut cursor = heap.binding().root(0);
        for object in &kept {
            assert_eq!(cursor, Some(*object));
            cursor = memory_manager::object_reference_read(*object, 0);
        }
        let dead = 2 * PER_PAGE - kept.len();
        assert!(heap.old_space().free_list_bytes() >= (dead - 1) * 4096);

        let reused = alloc_old(heap, mutator, 1, PAYLOAD);
        let page = memory_manager::page_of(heap, reused.to_raw_address()).unwrap();
        assert!(page.start() <= reused.to_raw_address() && reused.to_raw_address() < page.top());
        assert_eq!(heap.old_space().num_pages(), pages_before);
    })
}
