use crate::util::Address;
use crate::util::ObjectReference;

/// Callback trait of functions that report objects.
pub trait ObjectVisitor {
    /// Call this function for each object.
    fn visit_object(&mut self, object: ObjectReference);
}

/// This lets us use closures as ObjectVisitor.
impl<F: FnMut(ObjectReference)> ObjectVisitor for F {
    fn visit_object(&mut self, object: ObjectReference) {
        self(object)
    }
}

/// Callback trait of functions that report pointer slots.
pub trait ObjectPointerVisitor {
    /// Call this function for each slot. The slot holds an `ObjectReference` or zero, and
    /// the visitor may store a new reference into it.
    fn visit_slot(&mut self, slot: Address);
}

/// This lets us use closures as ObjectPointerVisitor.
impl<F: FnMut(Address)> ObjectPointerVisitor for F {
    fn visit_slot(&mut self, slot: Address) {
        self(slot)
    }
}

/// Like [`ObjectPointerVisitor`], but the visitor also tells whether the slot is still of
/// interest. Used for remembered cards: a card stays set only if one of its slots is.
pub trait PredicateObjectPointerVisitor {
    fn predicate_visit_slot(&mut self, slot: Address) -> bool;
}

/// This lets us use closures as PredicateObjectPointerVisitor.
impl<F: FnMut(Address) -> bool> PredicateObjectPointerVisitor for F {
    fn predicate_visit_slot(&mut self, slot: Address) -> bool {
        self(slot)
    }
}

/// VM-specific methods for scanning roots.
pub trait Scanning {
    /// Report every root slot: thread stacks, handles, global tables. Slots may be updated
    /// by the visitor, so they must stay at a fixed address while this call runs. Image
    /// pages are not roots; they are found through the page table.
    fn scan_roots(&self, visitor: &mut dyn ObjectPointerVisitor);
}
