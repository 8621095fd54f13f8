//! A page-based generational heap for a managed-language runtime.
//!
//! The heap is split into a copying new space and a mark-compact old space, both made
//! of aligned 512 KiB pages taken from one reserved address range:
//!
//! * Mutators allocate in thread-local allocation buffers (TLABs) carved from new-space
//!   pages. Large objects and explicitly old allocations go to old space.
//! * Old pages keep a card table. The write barrier remembers cards holding old-to-new
//!   references, so a scavenge only scans those.
//! * A scavenge copies live new-space objects into a fresh to-space and promotes
//!   survivors of an earlier scavenge. A full collection tenures everything, marks the
//!   heap, evacuates sparse old pages and sweeps the rest into a free list.
//! * [`plan::Become`] redirects references from one object to another at a safepoint.
//!
//! A runtime embeds the heap by implementing [`vm::VMBinding`] and calling the functions
//! in [`memory_manager`]:
//!
//! ```ignore
//! let heap = memory_manager::heap_init(&HeapBuilder::new(), MyRuntime::new())?;
//! let mutator = memory_manager::bind_mutator(&heap);
//! let object = memory_manager::alloc(&heap, &mutator, 2, 16, AllocationSemantics::Default);
//! memory_manager::object_reference_write(&heap, object, 0, Some(other));
//! ```

#[macro_use]
extern crate log;
#[cfg(test)]
#[macro_use]
extern crate lazy_static;

mod global_state;
pub use global_state::{GcStatus, GlobalState};

mod heap;
pub use heap::{Heap, HeapBuilder, HeapUsage, SpaceUsage};

pub mod memory_manager;
pub mod plan;
pub use plan::{AllocationSemantics, GcKind, Mutator};

pub mod policy;
pub mod util;
pub mod vm;
