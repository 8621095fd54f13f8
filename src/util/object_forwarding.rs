//! Forwarding pointers left behind by the scavenger in copied objects.
//!
//! A forwarded object keeps its size word, so the page it is on stays walkable. Its tag
//! word becomes the address of the new copy with the forwarded bit set.

use crate::util::object_model::{load_tags, store_tags, FORWARDED_BIT};
use crate::util::{Address, ObjectReference};

pub fn is_forwarded(object: ObjectReference) -> bool {
    load_tags(object) & FORWARDED_BIT != 0
}

/// Read the new location of a forwarded object.
pub fn read_forwarding_pointer(object: ObjectReference) -> ObjectReference {
    let tags = load_tags(object);
    debug_assert!(tags & FORWARDED_BIT != 0, "{} is not forwarded", object);
    unsafe { ObjectReference::from_raw_address_unchecked(Address::from_usize(tags & !FORWARDED_BIT)) }
}

/// Overwrite the tag word of `object` with a pointer to `new_object`.
pub fn write_forwarding_pointer(object: ObjectReference, new_object: ObjectReference) {
    debug_assert!(!is_forwarded(object), "{} is forwarded twice", object);
    debug_assert!(new_object.value() & FORWARDED_BIT == 0);
    store_tags(object, new_object.value() | FORWARDED_BIT);
}
