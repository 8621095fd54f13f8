//! Collection algorithms and the mutator allocation context.
//!
//! The heap is collected in two ways:
//! * A [`GcKind::Scavenge`] copies live new-space objects into a fresh to-space, and
//!   promotes objects that already survived one scavenge into old space. Old-to-new
//!   references are found through the remembered cards.
//! * A [`GcKind::Full`] first tenures all of new space, then marks the whole heap and
//!   compacts old space by evacuating sparse pages.
//!
//! Both run with the mutators stopped, on the thread that requested the collection.
//! [`Become`] rewrites references from one object to another under the same stop,
//! without collecting.

pub(crate) mod barriers;
pub mod become_forwarding;
pub(crate) mod compactor;
pub(crate) mod marker;
pub mod mutator_context;
pub(crate) mod scavenger;

pub use self::become_forwarding::{Become, BecomeSummary};
pub use self::compactor::CompactionSummary;
pub use self::mutator_context::Mutator;
pub use self::scavenger::ScavengeSummary;

use enum_map::Enum;

/// Allocation semantics the heap provides.
/// Each allocation request names the space it wants the object in.
#[repr(i32)]
#[derive(Clone, Copy, Debug, Enum, PartialEq, Eq)]
pub enum AllocationSemantics {
    /// Allocate in the mutator's TLAB in new space, unless the object is at least
    /// `large_object_threshold` bytes, in which case it goes to old space.
    Default = 0,
    /// Allocate directly in old space.
    Old = 1,
}

/// The kinds of collection.
#[derive(Clone, Copy, Debug, Enum, PartialEq, Eq, strum_macros::Display, strum_macros::EnumIter)]
pub enum GcKind {
    Scavenge,
    Full,
}
