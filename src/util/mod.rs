//! Utilities shared by the heap: addresses, the object layout, memory mapping and the
//! page-level heap infrastructure.

/// Address and object reference types.
pub mod address;
/// The TLAB and allocation errors.
pub mod alloc;
/// Constants: page, card and forwarding block geometry.
pub mod constants;
/// Alignment and size conversions.
pub mod conversions;
/// Page resource, page table, page accounting and the full-GC trigger.
pub mod heap;
/// Logger initialization.
pub mod logger;
/// Reserving, committing and protecting memory.
pub mod memory;
/// Forwarding pointers installed in object headers by the scavenger.
pub mod object_forwarding;
/// The object header layout and object walking.
pub mod object_model;
/// Heap options.
pub mod options;
/// Per-kind collection statistics.
pub mod statistics;


pub use self::address::Address;
pub use self::address::ObjectReference;
