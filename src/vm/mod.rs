//! The interface between the heap and the runtime that embeds it.
//!
//! A runtime implements [`VMBinding`] (that is, [`Scanning`] and [`Collection`]) on a
//! value it hands to `HeapBuilder::build`. The heap calls back into it to find roots and to
//! bring mutators to a safepoint.

mod collection;
mod scanning;
pub use self::collection::Collection;
pub use self::scanning::ObjectPointerVisitor;
pub use self::scanning::ObjectVisitor;
pub use self::scanning::PredicateObjectPointerVisitor;
pub use self::scanning::Scanning;

/// The runtime side of a heap.
pub trait VMBinding: Scanning + Collection + Send + Sync + 'static {}

impl<T: Scanning + Collection + Send + Sync + 'static> VMBinding for T {}

#[cfg(test)]
mod tests;
