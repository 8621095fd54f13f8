use super::mock_test_prelude::*;

/// With a stress factor, the slow path scavenges every `stress_factor` bytes, long
/// before new space is full. Live data survives every one of those collections.
#[test]
pub fn stress_scavenges() {
    let mut builder = small_heap_builder(32, 4);
    assert!(memory_manager::process(&mut builder, "stress_factor", "65536"));
    assert!(builder.options.is_stress_test_gc_enabled());
    with_heap(builder, |heap, mutator| {
        const LEN: usize = 50;
        for i in 0..LEN {
            // 1 KiB of garbage between list elements.
            for _ in 0..20 {
                alloc(heap, mutator, 0, 1024);
            }
            let object = alloc(heap, mutator, 1, 8);
            write_payload(object, i);
            let head = heap.binding().root(0);
            memory_manager::object_reference_write(heap, object, 0, head);
            heap.binding().set_root(0, Some(object));
        }
        check_list(heap, 0, LEN);
        let scavenges = heap.stats().gc_count(GcKind::Scavenge);
        assert!(scavenges >= 8, "only {} scavenges", scavenges);
        assert_eq!(heap.stats().gc_count(GcKind::Full), 0);
        assert_eq!(heap.new_space().capacity_in_pages(), 4);
    })
}
