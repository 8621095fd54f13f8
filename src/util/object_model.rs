//! The heap object layout.
//!
//! Every object starts with a two-word header:
//!
//! ```text
//! +-----------------------------+  <- ObjectReference
//! | tags: slots << 8 | F | M | X|  word 0
//! +-----------------------------+
//! | size in bytes               |  word 1
//! +-----------------------------+
//! | pointer slot 0              |
//! | ...                         |
//! | pointer slot n-1            |
//! +-----------------------------+
//! | raw payload                 |
//! +-----------------------------+  <- object + size
//! ```
//!
//! X is the forwarded bit. Once it is set, word 0 holds `new_address | 1` and the slot
//! count is no longer available from this copy. M is the mark bit and F marks a filler
//! (a free chunk that keeps pages walkable). The size word is never overwritten, so a
//! page can always be walked object by object.

use crate::util::constants::{BYTES_IN_WORD, MIN_OBJECT_SIZE, OBJECT_ALIGNMENT};
use crate::util::conversions::object_size_align_up;
use crate::util::memory;
use crate::util::{Address, ObjectReference};
use crate::vm::ObjectPointerVisitor;
use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};

pub(crate) const FORWARDED_BIT: usize = 1 << 0;
const MARK_BIT: usize = 1 << 1;
const FILLER_BIT: usize = 1 << 2;
const POINTER_SLOTS_SHIFT: usize = 8;

/// The number of bytes in an object header.
pub const HEADER_BYTES: usize = 2 * BYTES_IN_WORD;
/// The largest number of pointer slots an object can have.
pub const MAX_POINTER_SLOTS: usize = usize::MAX >> POINTER_SLOTS_SHIFT;

static_assertions::const_assert_eq!(HEADER_BYTES, MIN_OBJECT_SIZE);

/// The allocation size of an object with `pointer_slots` slots and `payload_bytes` of raw data.
pub fn required_size(pointer_slots: usize, payload_bytes: usize) -> usize {
    object_size_align_up(HEADER_BYTES + pointer_slots * BYTES_IN_WORD + payload_bytes)
}

fn tags(addr: Address) -> &'static AtomicUsize {
    unsafe { &*addr.to_ptr::<AtomicUsize>() }
}

pub(crate) fn load_tags(object: ObjectReference) -> usize {
    tags(object.to_raw_address()).load(Ordering::Relaxed)
}

pub(crate) fn store_tags(object: ObjectReference, value: usize) {
    tags(object.to_raw_address()).store(value, Ordering::Relaxed)
}

/// Initialise an object at `start`: zero its body, then write the header.
pub fn initialize_object(start: Address, size: usize, pointer_slots: usize) -> ObjectReference {
    debug_assert!(start.is_aligned_to(OBJECT_ALIGNMENT));
    debug_assert!(size % OBJECT_ALIGNMENT == 0 && size >= required_size(pointer_slots, 0));
    memory::zero(start + HEADER_BYTES, size - HEADER_BYTES);
    unsafe {
        (start + BYTES_IN_WORD).store::<usize>(size);
    }
    tags(start).store(pointer_slots << POINTER_SLOTS_SHIFT, Ordering::Relaxed);
    unsafe { ObjectReference::from_raw_address_unchecked(start) }
}

/// Turn `[start, start + size)` into a filler. Fillers are skipped by object visitors.
pub fn initialize_filler(start: Address, size: usize) {
    debug_assert!(size >= MIN_OBJECT_SIZE && size % OBJECT_ALIGNMENT == 0);
    unsafe {
        (start + BYTES_IN_WORD).store::<usize>(size);
    }
    tags(start).store(FILLER_BIT, Ordering::Relaxed);
}

/// The size of the object (or filler) that starts at `addr`.
pub fn size_at(addr: Address) -> usize {
    let size = unsafe { (addr + BYTES_IN_WORD).load::<usize>() };
    debug_assert!(
        size >= MIN_OBJECT_SIZE && size % OBJECT_ALIGNMENT == 0,
        "Corrupted object size {} at {}",
        size,
        addr
    );
    size
}

/// The size of an object in bytes, header included.
pub fn get_size(object: ObjectReference) -> usize {
    size_at(object.to_raw_address())
}

pub fn is_filler_at(addr: Address) -> bool {
    let t = tags(addr).load(Ordering::Relaxed);
    t & FORWARDED_BIT == 0 && t & FILLER_BIT != 0
}

pub fn num_pointer_slots(object: ObjectReference) -> usize {
    let t = load_tags(object);
    debug_assert!(
        t & FORWARDED_BIT == 0,
        "{} is forwarded; read the slots of its new copy",
        object
    );
    t >> POINTER_SLOTS_SHIFT
}

/// The address of the `index`-th pointer slot of an object.
pub fn pointer_slot(object: ObjectReference, index: usize) -> Address {
    debug_assert!(index < num_pointer_slots(object));
    object.to_raw_address() + HEADER_BYTES + index * BYTES_IN_WORD
}

/// The range of an object's pointer slots.
pub fn pointer_slots(object: ObjectReference) -> Range<Address> {
    let first = object.to_raw_address() + HEADER_BYTES;
    first..first + num_pointer_slots(object) * BYTES_IN_WORD
}

/// The start of an object's raw payload.
pub fn payload(object: ObjectReference) -> Address {
    pointer_slots(object).end
}

/// Visit every pointer slot of an object.
pub fn scan_object<V: ObjectPointerVisitor + ?Sized>(object: ObjectReference, visitor: &mut V) {
    let slots = pointer_slots(object);
    let mut slot = slots.start;
    while slot < slots.end {
        visitor.visit_slot(slot);
        slot += BYTES_IN_WORD;
    }
}

/// Load the reference held in a pointer slot.
pub fn load_slot(slot: Address) -> Option<ObjectReference> {
    let raw = unsafe { slot.atomic_load::<AtomicUsize>(Ordering::Relaxed) };
    ObjectReference::from_raw_address(unsafe { Address::from_usize(raw) })
}

/// Store a reference into a pointer slot. This does not run the write barrier.
pub fn store_slot(slot: Address, value: Option<ObjectReference>) {
    let raw = value.map_or(0, |v| v.value());
    unsafe { slot.atomic_store::<AtomicUsize>(raw, Ordering::Relaxed) }
}

pub fn is_marked(object: ObjectReference) -> bool {
    load_tags(object) & MARK_BIT != 0
}

/// Set the mark bit. Returns true if this call marked the object.
pub fn test_and_mark(object: ObjectReference) -> bool {
    let old = tags(object.to_raw_address()).fetch_or(MARK_BIT, Ordering::Relaxed);
    debug_assert!(old & FORWARDED_BIT == 0, "marking forwarded object {}", object);
    old & MARK_BIT == 0
}

pub fn clear_mark(object: ObjectReference) {
    tags(object.to_raw_address()).fetch_and(!MARK_BIT, Ordering::Relaxed);
}

/// Iterate the objects and fillers in `[start, end)`, yielding each start address.
pub(crate) struct RawObjectIterator {
    cursor: Address,
    end: Address,
}

impl RawObjectIterator {
    pub fn new(start: Address, end: Address) -> Self {
        RawObjectIterator { cursor: start, end }
    }
}

impl Iterator for RawObjectIterator {
    type Item = Address;

    fn next(&mut self) -> Option<Address> {
        if self.cursor >= self.end {
            return None;
        }
        let current = self.cursor;
        self.cursor += size_at(current);
        debug_assert!(self.cursor <= self.end, "object at {} overruns {}", current, self.end);
        Some(current)
    }
}

/// Iterate the objects in `[start, end)`, skipping fillers.
pub(crate) fn objects_in(start: Address, end: Address) -> impl Iterator<Item = ObjectReference> {
    RawObjectIterator::new(start, end)
        .filter(|addr| !is_filler_at(*addr))
        .map(|addr| unsafe { ObjectReference::from_raw_address_unchecked(addr) })
}
