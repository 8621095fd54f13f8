use super::mock_test_compaction::{fragment_old_space, list_payloads};
use super::mock_test_prelude::*;

/// A never-evacuate page is not evacuated, however sparse it is. Its live objects stay
/// where they are; the other sparse pages are evacuated as usual.
#[test]
pub fn never_evacuate_page_stays() {
    with_heap(small_heap_builder(64, 2), |heap, mutator| {
        let kept = fragment_old_space(heap, mutator, 4, 16);
        let expected = list_payloads(heap);
        let pinned = memory_manager::page_of(heap, kept[0].to_raw_address()).unwrap();
        pinned.set_never_evacuate(true);
        let pinned_objects: Vec<ObjectReference> = kept
            .iter()
            .copied()
            .filter(|o| pinned.contains(o.to_raw_address()))
            .collect();
        assert!(!pinned_objects.is_empty());

        memory_manager::collect(heap, GcKind::Full);

        let summary = heap.last_compaction_summary().unwrap();
        assert!(!summary.evacuated.contains(&pinned.id()));
        assert_eq!(summary.evacuated.len(), 3);
        assert!(heap.page_table().get(pinned.id()).is_some());
        assert!(pinned.is_never_evacuate());
        for object in pinned_objects {
            assert!(pinned.contains(object.to_raw_address()));
            assert!(!object_model::is_marked(object));
        }
        assert_eq!(list_payloads(heap), expected);
    })
}
