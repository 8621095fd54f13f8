#[cfg(debug_assertions)]
use crate::util::constants::ALLOCATION_CANARY;
#[cfg(debug_assertions)]
use crate::util::memory;
use crate::util::Address;
use atomic::Atomic;
use std::sync::atomic::Ordering;

/// The allocation cursor of a mutator: the range of its current TLAB it has not used yet.
///
/// Only the owning mutator moves `top`. The collector reads it at a safepoint, so `top` is
/// stored with release ordering after the object header is written.
/// `true_end` is the real end of the TLAB. `end` may be lowered below it to make the fast
/// path fail early, which is how stress GC gets control.
pub struct Tlab {
    top: Atomic<Address>,
    end: Atomic<Address>,
    true_end: Atomic<Address>,
}

impl Tlab {
    pub const fn new() -> Self {
        Tlab {
            top: Atomic::new(Address::ZERO),
            end: Atomic::new(Address::ZERO),
            true_end: Atomic::new(Address::ZERO),
        }
    }

    pub fn top(&self) -> Address {
        self.top.load(Ordering::Acquire)
    }

    pub fn end(&self) -> Address {
        self.end.load(Ordering::Relaxed)
    }

    pub fn true_end(&self) -> Address {
        self.true_end.load(Ordering::Relaxed)
    }

    pub fn set_top(&self, top: Address) {
        self.top.store(top, Ordering::Release)
    }

    pub fn set_end(&self, end: Address) {
        self.end.store(end, Ordering::Relaxed)
    }

    pub fn set_true_end(&self, true_end: Address) {
        self.true_end.store(true_end, Ordering::Relaxed)
    }

    /// Is the TLAB empty (no page acquired)?
    pub fn is_unset(&self) -> bool {
        self.top().is_zero() && self.end().is_zero() && self.true_end().is_zero()
    }

    /// Is `end` lowered below the real end of the TLAB?
    pub fn is_limited(&self) -> bool {
        self.end() < self.true_end()
    }

    /// Bump the cursor by `size` bytes. `init` is called on the claimed range before the new
    /// cursor is published. Returns `None` if the range does not fit below `end`.
    pub fn bump<T>(&self, size: usize, init: impl FnOnce(Address) -> T) -> Option<T> {
        let top = self.top.load(Ordering::Relaxed);
        let end = self.end.load(Ordering::Relaxed);
        if size > end - top {
            return None;
        }
        let result = init(top);
        self.top.store(top + size, Ordering::Release);
        Some(result)
    }

    /// Roll back the most recent allocation of `size` bytes at `addr`. Debug builds
    /// overwrite the bytes with the allocation canary.
    pub fn unbump(&self, addr: Address, size: usize) {
        let top = self.top.load(Ordering::Relaxed);
        assert!(
            addr + size == top,
            "Unallocate of {} bytes at {} does not end at the TLAB top {}",
            size,
            addr,
            top
        );
        #[cfg(debug_assertions)]
        memory::fill_words(addr, size, ALLOCATION_CANARY);
        self.top.store(addr, Ordering::Release);
    }

    pub fn reset(&self) {
        self.set_top(Address::ZERO);
        self.set_end(Address::ZERO);
        self.set_true_end(Address::ZERO);
    }
}

impl Default for Tlab {
    fn default() -> Self {
        Self::new()
    }
}
