//! Allocation errors and the thread-local allocation buffer cursor.

pub(crate) mod allocator;
pub use allocator::AllocationError;

mod tlab;
pub use tlab::Tlab;
