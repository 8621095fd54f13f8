use super::mock_test_prelude::*;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::HashSet;

const ROOTS: usize = 16;
const STEPS: usize = 3000;

/// The expected object graph: two outgoing edges per node, and the node held by each root.
struct Shadow {
    edges: Vec<[Option<usize>; 2]>,
    roots: [Option<usize>; ROOTS],
}

impl Shadow {
    /// Compare everything reachable from the roots with the heap.
    fn check(&self, heap: &crate::Heap<MockVM>) {
        let mut visited = HashSet::new();
        let mut stack = vec![];
        for (r, expected) in self.roots.iter().enumerate() {
            match (heap.binding().root(r), expected) {
                (None, None) => {}
                (Some(object), Some(id)) => stack.push((object, *id)),
                (actual, expected) => panic!("root {}: {:?} vs node {:?}", r, actual, expected),
            }
        }
        while let Some((object, id)) = stack.pop() {
            assert!(memory_manager::is_in_heap(heap, object.to_raw_address()));
            assert_eq!(read_payload(object), id, "node {} is at {}", id, object);
            if !visited.insert(id) {
                continue;
            }
            for (k, edge) in self.edges[id].iter().enumerate() {
                match (memory_manager::object_reference_read(object, k), edge) {
                    (None, None) => {}
                    (Some(target), Some(target_id)) => stack.push((target, *target_id)),
                    (actual, expected) => {
                        panic!("node {} slot {}: {:?} vs node {:?}", id, k, actual, expected)
                    }
                }
            }
        }
    }
}

/// Random allocation, stores and collections. After every collection the graph reachable
/// from the roots is the one the program built.
#[test]
pub fn random_graph_survives_collections() {
    serial_test(|| {
        with_heap(small_heap_builder(64, 2), |heap, mutator| {
            let vm = heap.binding();
            let mut rng = ChaCha8Rng::seed_from_u64(0x5eed);
            let mut shadow = Shadow {
                edges: vec![],
                roots: [None; ROOTS],
            };
            let mut collections = 0;
            for _ in 0..STEPS {
                alloc(heap, mutator, 0, rng.random_range(16..4096));
                match rng.random_range(0..100) {
                    0..=44 => {
                        let semantics = if rng.random_bool(0.2) {
                            AllocationSemantics::Old
                        } else {
                            AllocationSemantics::Default
                        };
                        let object = memory_manager::alloc(heap, mutator, 2, 8, semantics);
                        let id = shadow.edges.len();
                        write_payload(object, id);
                        shadow.edges.push([None, None]);
                        let r = rng.random_range(0..ROOTS);
                        vm.set_root(r, Some(object));
                        shadow.roots[r] = Some(id);
                    }
                    45..=84 => {
                        let a = rng.random_range(0..ROOTS);
                        let b = rng.random_range(0..ROOTS);
                        let k = rng.random_range(0..2);
                        if let Some(src) = shadow.roots[a] {
                            memory_manager::object_reference_write(heap, vm.get(a), k, vm.root(b));
                            shadow.edges[src][k] = shadow.roots[b];
                        }
                    }
                    85..=94 => {
                        let r = rng.random_range(0..ROOTS);
                        vm.set_root(r, None);
                        shadow.roots[r] = None;
                    }
                    _ => {
                        let kind = if rng.random_bool(0.3) {
                            GcKind::Full
                        } else {
                            GcKind::Scavenge
                        };
                        memory_manager::collect(heap, kind);
                        collections += 1;
                        shadow.check(heap);
                    }
                }
            }
            memory_manager::collect(heap, GcKind::Full);
            shadow.check(heap);
            assert!(collections > 0);
            assert!(heap.state().gc_count() > collections);
        })
    })
}
