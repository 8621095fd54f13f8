// Mock tests should have the prefix 'mock_test_' in their file name.

// Common includes for mock tests.
pub(crate) mod mock_test_prelude {
    pub use crate::memory_manager;
    pub use crate::util::object_model;
    pub use crate::util::test_util::mock_vm::*;
    pub use crate::util::test_util::*;
    pub use crate::util::{Address, ObjectReference};
    pub use crate::vm::*;
    pub use crate::{AllocationSemantics, GcKind};
}

mod mock_test_allocate_no_gc;
mod mock_test_allocate_old;
mod mock_test_compaction;
mod mock_test_image_pages;
mod mock_test_never_evacuate;
mod mock_test_oom;
mod mock_test_random_graph;
mod mock_test_remembered_cards;
mod mock_test_scavenge;
mod mock_test_stress_gc;
mod mock_test_unallocate;
mod mock_test_user_collection;
mod mock_test_visit_objects;
