use crate::util::alloc::Tlab;
use crate::util::heap::PageId;
use crate::util::object_model;
use crate::util::ObjectReference;
use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

/// A mutator is the per-thread allocation context handed out by `bind_mutator`.
///
/// It owns at most one new-space page at a time; the unused part of that page is its TLAB.
/// Allocation in the TLAB needs no synchronization. Everything else (refilling the TLAB,
/// collecting) goes through the heap.
pub struct Mutator {
    id: usize,
    tlab: Tlab,
    tlab_page: AtomicU32,
    /// Bytes allocated in TLABs that were since released.
    allocated_bytes: AtomicUsize,
}

impl Mutator {
    /// Create a mutator. Ids are unique per heap and never zero, since zero marks an
    /// unowned page.
    pub(crate) fn new(id: usize) -> Self {
        assert_ne!(id, 0, "mutator id 0 is reserved");
        Mutator {
            id,
            tlab: Tlab::new(),
            tlab_page: AtomicU32::new(0),
            allocated_bytes: AtomicUsize::new(0),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn tlab(&self) -> &Tlab {
        &self.tlab
    }

    /// The page that backs the current TLAB.
    pub fn tlab_page(&self) -> Option<PageId> {
        PageId::from_raw(self.tlab_page.load(Ordering::Relaxed))
    }

    pub(crate) fn set_tlab_page(&self, page: Option<PageId>) {
        self.tlab_page.store(PageId::to_raw(page), Ordering::Relaxed);
    }

    pub(crate) fn take_tlab_page(&self) -> Option<PageId> {
        PageId::from_raw(self.tlab_page.swap(0, Ordering::Relaxed))
    }

    /// Bytes this mutator allocated in new space, up to its last TLAB release.
    pub fn allocated_bytes(&self) -> usize {
        self.allocated_bytes.load(Ordering::Relaxed)
    }

    pub(crate) fn add_allocated_bytes(&self, bytes: usize) {
        self.allocated_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    /// The allocation fast path: bump the TLAB and initialize the object.
    #[inline(always)]
    pub(crate) fn alloc_fast(&self, size: usize, pointer_slots: usize) -> Option<ObjectReference> {
        self.tlab
            .bump(size, |start| object_model::initialize_object(start, size, pointer_slots))
    }

    /// Lower the TLAB end so that the fast path fails after `bytes` more bytes.
    pub(crate) fn limit_tlab(&self, bytes: usize) {
        let top = self.tlab.top();
        let room = self.tlab.true_end() - top;
        self.tlab.set_end(top + room.min(bytes));
    }
}

impl fmt::Debug for Mutator {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Mutator({}, tlab {}..{} on {:?})",
            self.id,
            self.tlab.top(),
            self.tlab.end(),
            self.tlab_page()
        )
    }
}
