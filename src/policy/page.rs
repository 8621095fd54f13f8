//! Heap pages.
//!
//! A page is the unit in which the heap takes memory from the page resource. A standard
//! page is one heap-page granule. A large page holds a single object and spans as many
//! granules as the object needs. Image pages wrap memory provided by the embedder: they are
//! neither aligned nor freed.
//!
//! ```text
//! start == object_start          top            end      memory_end
//! |  objects ...                 |  free ...    | red zone |
//! ```

use super::card_table::{self, CardTable};
use super::forwarding::ForwardingPage;
use crate::plan::Mutator;
use crate::util::alloc::AllocationError;
use crate::util::constants::*;
use crate::util::conversions::{bytes_to_heap_pages_up, heap_pages_to_bytes};
use crate::util::heap::{PageId, PageTable};
use crate::util::memory::{self, Protection};
use crate::util::object_model::{self, objects_in};
use crate::util::Address;
use crate::vm::{ObjectPointerVisitor, ObjectVisitor, PredicateObjectPointerVisitor};
use atomic::Atomic;
use atomic_refcell::{AtomicRef, AtomicRefCell, AtomicRefMut};
use bitflags::bitflags;
use std::fmt;
use std::ops::Range;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

bitflags! {
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct PageFlags: u32 {
        /// The page holds code.
        const EXECUTABLE = 1 << 0;
        /// The page holds a single object that is too big for a standard page.
        const LARGE = 1 << 1;
        /// The page wraps snapshot memory provided by the embedder.
        const IMAGE = 1 << 2;
        /// The page belongs to the VM isolate's snapshot.
        const VM_ISOLATE = 1 << 3;
        /// The page belongs to new space.
        const NEW = 1 << 4;
        /// The compactor is moving the live objects out of this page.
        const EVACUATION_CANDIDATE = 1 << 5;
        /// The compactor must not move objects out of this page.
        const NEVER_EVACUATE = 1 << 6;
        /// The page memory is read-only.
        const WRITE_PROTECTED = 1 << 7;
    }
}

pub struct Page {
    id: PageId,
    start: Address,
    memory_end: Address,
    flags: AtomicU32,
    /// The allocation cursor. Stale while a mutator owns the page.
    top: Atomic<Address>,
    end: Atomic<Address>,
    /// Objects below this address survived a scavenge and are promoted by the next one.
    survivor_end: Atomic<Address>,
    /// Objects below this address have had their slots scavenged.
    resolved_top: Atomic<Address>,
    live_bytes: AtomicUsize,
    /// The id of the owning mutator, or 0.
    owner: AtomicUsize,
    next: AtomicU32,
    card_table: Option<CardTable>,
    /// Cards of a large page already claimed by a scan.
    progress_bar: AtomicUsize,
    forwarding_page: AtomicRefCell<Option<Box<ForwardingPage>>>,
}

impl Page {
    fn new(id: PageId, start: Address, size: usize, flags: PageFlags) -> Page {
        let memory_end = start + size;
        let image = flags.contains(PageFlags::IMAGE);
        let (top, end) = if image {
            (memory_end, memory_end)
        } else {
            (start, memory_end - ALLOCATION_RED_ZONE_SIZE)
        };
        Page {
            id,
            start,
            memory_end,
            flags: AtomicU32::new(flags.bits()),
            top: Atomic::new(top),
            end: Atomic::new(end),
            survivor_end: Atomic::new(start),
            resolved_top: Atomic::new(start),
            live_bytes: AtomicUsize::new(0),
            owner: AtomicUsize::new(0),
            next: AtomicU32::new(0),
            card_table: (!image && !flags.contains(PageFlags::NEW))
                .then(|| CardTable::new(start, size)),
            progress_bar: AtomicUsize::new(0),
            forwarding_page: AtomicRefCell::new(None),
        }
    }

    /// Allocate a page. A standard page is one heap page. A page flagged `LARGE` is sized to
    /// hold an object of `size` bytes, rounded up to whole heap pages.
    pub fn allocate(
        table: &PageTable,
        size: usize,
        flags: PageFlags,
    ) -> Result<Arc<Page>, AllocationError> {
        debug_assert!(!flags.contains(PageFlags::IMAGE));
        let granules = if flags.contains(PageFlags::LARGE) {
            bytes_to_heap_pages_up(size + ALLOCATION_RED_ZONE_SIZE)
        } else {
            debug_assert!(size <= BYTES_IN_HEAP_PAGE);
            1
        };
        let start = table.resource().allocate(granules)?;
        let page = table.insert(|id| Page::new(id, start, heap_pages_to_bytes(granules), flags));
        trace!("Allocated {:?}", page);
        Ok(page)
    }

    /// Free a page. Its memory goes back to the page resource and its id may be reused.
    pub fn deallocate(page: Arc<Page>, table: &PageTable) {
        assert!(!page.is_image(), "{} is an image page and is never freed", page.id);
        debug_assert!(!page.is_owned(), "{} is freed while owned", page.id);
        trace!("Freeing {:?}", page);
        if page.is_write_protected() {
            if let Err(e) = page.write_protect(false) {
                panic!("Failed to unprotect {:?} before freeing it: {}", page, e);
            }
        }
        table.remove(page.id);
        let granules = (page.memory_end - page.start) >> LOG_BYTES_IN_HEAP_PAGE;
        table.resource().free(page.start, granules);
    }

    /// Wrap `size` bytes of snapshot memory at `start`. The memory must already hold a
    /// sequence of objects that fills it completely.
    pub(crate) fn register_image(
        table: &PageTable,
        start: Address,
        size: usize,
        is_vm_isolate: bool,
    ) -> Arc<Page> {
        assert!(start.is_aligned_to(OBJECT_ALIGNMENT) && size % OBJECT_ALIGNMENT == 0);
        assert!(
            !table.resource().contains(start),
            "image memory {} overlaps the heap",
            start
        );
        let mut flags = PageFlags::IMAGE | PageFlags::NEVER_EVACUATE;
        if is_vm_isolate {
            flags |= PageFlags::VM_ISOLATE;
        }
        let page = table.insert(|id| Page::new(id, start, size, flags));
        debug!("Registered image {:?}", page);
        page
    }

    pub fn id(&self) -> PageId {
        self.id
    }

    pub fn start(&self) -> Address {
        self.start
    }

    pub fn memory_end(&self) -> Address {
        self.memory_end
    }

    pub fn object_start(&self) -> Address {
        self.start
    }

    /// The end of the allocated objects. Only meaningful when no mutator owns the page.
    pub fn object_end(&self) -> Address {
        self.top()
    }

    pub fn top(&self) -> Address {
        self.top.load(Ordering::Acquire)
    }

    pub fn end(&self) -> Address {
        self.end.load(Ordering::Relaxed)
    }

    /// Bytes of allocated objects.
    pub fn used(&self) -> usize {
        self.object_end() - self.object_start()
    }

    /// Bytes that can hold objects.
    pub fn usable_bytes(&self) -> usize {
        self.end() - self.object_start()
    }

    pub fn contains(&self, addr: Address) -> bool {
        self.start <= addr && addr < self.memory_end
    }

    pub fn flags(&self) -> PageFlags {
        PageFlags::from_bits_truncate(self.flags.load(Ordering::Relaxed))
    }

    fn set_flag(&self, flag: PageFlags, value: bool) {
        if value {
            self.flags.fetch_or(flag.bits(), Ordering::Relaxed);
        } else {
            self.flags.fetch_and(!flag.bits(), Ordering::Relaxed);
        }
    }

    pub fn is_executable(&self) -> bool {
        self.flags().contains(PageFlags::EXECUTABLE)
    }

    pub fn is_large(&self) -> bool {
        self.flags().contains(PageFlags::LARGE)
    }

    pub fn is_image(&self) -> bool {
        self.flags().contains(PageFlags::IMAGE)
    }

    pub fn is_vm_isolate(&self) -> bool {
        self.flags().contains(PageFlags::VM_ISOLATE)
    }

    pub fn is_new(&self) -> bool {
        self.flags().contains(PageFlags::NEW)
    }

    pub fn is_old(&self) -> bool {
        !self.is_new()
    }

    pub fn is_evacuation_candidate(&self) -> bool {
        self.flags().contains(PageFlags::EVACUATION_CANDIDATE)
    }

    pub fn is_never_evacuate(&self) -> bool {
        self.flags().contains(PageFlags::NEVER_EVACUATE)
    }

    pub fn is_write_protected(&self) -> bool {
        self.flags().contains(PageFlags::WRITE_PROTECTED)
    }

    /// Pin the objects of this page: the compactor will not move them.
    pub fn set_never_evacuate(&self, value: bool) {
        self.set_flag(PageFlags::NEVER_EVACUATE, value);
    }

    pub fn survivor_end(&self) -> Address {
        self.survivor_end.load(Ordering::Relaxed)
    }

    pub fn resolved_top(&self) -> Address {
        self.resolved_top.load(Ordering::Relaxed)
    }

    pub fn live_bytes(&self) -> usize {
        self.live_bytes.load(Ordering::Relaxed)
    }

    /// Did the object at `addr` survive the last scavenge?
    pub fn is_survivor(&self, addr: Address) -> bool {
        addr < self.survivor_end()
    }

    /// Have the slots of the object at `addr` been scavenged?
    pub fn is_resolved(&self, addr: Address) -> bool {
        addr < self.resolved_top()
    }

    /// Words that the next scavenge will promote.
    pub fn promo_candidate_words(&self) -> usize {
        (self.survivor_end() - self.object_start()) / BYTES_IN_WORD
    }

    /// The id of the mutator that owns this page as its TLAB.
    pub fn owner(&self) -> Option<usize> {
        match self.owner.load(Ordering::Acquire) {
            0 => None,
            id => Some(id),
        }
    }

    pub fn is_owned(&self) -> bool {
        self.owner().is_some()
    }

    /// The next page in the list this page is on.
    pub fn next(&self) -> Option<PageId> {
        PageId::from_raw(self.next.load(Ordering::Relaxed))
    }

    pub fn card_table(&self) -> Option<&CardTable> {
        self.card_table.as_ref()
    }

    /// Hand `[top, end)` to a mutator as its TLAB. The page must not have an owner.
    pub fn acquire(&self, mutator: &Mutator) {
        let claimed = self
            .owner
            .compare_exchange(0, mutator.id(), Ordering::AcqRel, Ordering::Relaxed);
        assert!(
            claimed.is_ok(),
            "{} is already owned by mutator {:?}",
            self.id,
            claimed.err()
        );
        let tlab = mutator.tlab();
        debug_assert!(tlab.is_unset(), "mutator {} already has a TLAB", mutator.id());
        let end = self.end();
        tlab.set_top(self.top.load(Ordering::Relaxed));
        tlab.set_end(end);
        tlab.set_true_end(end);
    }

    /// Take the TLAB back from its owner. The owner's cursor becomes the page's `top`.
    /// Returns the number of bytes allocated since `acquire`.
    pub fn release(&self, mutator: &Mutator) -> usize {
        assert_eq!(
            self.owner(),
            Some(mutator.id()),
            "{} is released by a mutator that does not own it",
            self.id
        );
        let tlab = mutator.tlab();
        let old_top = self.top.load(Ordering::Relaxed);
        let new_top = tlab.top();
        self.top.store(new_top, Ordering::Release);
        self.owner.store(0, Ordering::Release);
        tlab.reset();
        debug_assert!(new_top >= old_top);
        new_top - old_top
    }

    /// Roll back the most recent allocation of `size` bytes at `addr` from an unowned page.
    pub fn unallocate(&self, addr: Address, size: usize) {
        debug_assert!(!self.is_owned(), "unallocate on owned {}", self.id);
        let top = self.top.load(Ordering::Relaxed);
        assert!(
            addr + size == top,
            "Unallocate of {} bytes at {} does not end at top {} of {}",
            size,
            addr,
            top,
            self.id
        );
        #[cfg(debug_assertions)]
        memory::fill_words(addr, size, ALLOCATION_CANARY);
        self.top.store(addr, Ordering::Release);
    }

    /// Set the card that covers `slot`.
    pub fn remember_card(&self, slot: Address) {
        debug_assert!(self.contains(slot));
        match &self.card_table {
            Some(cards) => cards.remember(slot),
            None => panic!("{} has no card table", self.id),
        }
    }

    pub fn is_card_remembered(&self, slot: Address) -> bool {
        self.card_table
            .as_ref()
            .is_some_and(|cards| cards.is_remembered(slot))
    }

    /// Visit every object of the page. No mutator may own the page.
    pub fn visit_objects(&self, visitor: &mut dyn ObjectVisitor) {
        assert!(!self.is_owned(), "visiting objects of owned {}", self.id);
        self.visit_objects_unsafe(visitor);
    }

    /// Visit every object up to the current `top`, without checking for an owner. If a
    /// mutator owns the page, objects it allocated since `acquire` are not visited.
    pub fn visit_objects_unsafe(&self, visitor: &mut dyn ObjectVisitor) {
        for object in objects_in(self.object_start(), self.object_end()) {
            visitor.visit_object(object);
        }
    }

    /// Visit every pointer slot of every object of the page.
    pub fn visit_object_pointers(&self, visitor: &mut dyn ObjectPointerVisitor) {
        assert!(!self.is_owned(), "visiting objects of owned {}", self.id);
        for object in objects_in(self.object_start(), self.object_end()) {
            object_model::scan_object(object, visitor);
        }
    }

    /// Make the page memory read-only, or writable again.
    pub fn write_protect(&self, read_only: bool) -> std::io::Result<()> {
        let prot = match (read_only, self.is_executable()) {
            (true, true) => Protection::ReadExecute,
            (true, false) => Protection::ReadOnly,
            (false, true) => Protection::ReadWriteExecute,
            (false, false) => Protection::ReadWrite,
        };
        memory::mprotect(self.start, self.memory_end - self.start, prot)?;
        self.set_flag(PageFlags::WRITE_PROTECTED, read_only);
        Ok(())
    }
}

impl fmt::Debug for Page {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}[{}..{}, top {}, {:?}]",
            self.id,
            self.start,
            self.memory_end,
            self.top(),
            self.flags()
        )
    }
}

/// Page operations reserved for the spaces and the collectors.
pub(crate) trait PageCollectorAccess {
    /// Bump-allocate `size` bytes on an unowned page. Returns `None` if they do not fit.
    fn try_allocate_gc(&self, size: usize) -> Option<Address>;
    fn set_top(&self, top: Address);
    fn set_next(&self, next: Option<PageId>);
    fn set_resolved_top(&self, addr: Address);
    fn set_live_bytes(&self, bytes: usize);
    fn add_live_bytes(&self, bytes: usize);
    fn set_evacuation_candidate(&self, value: bool);
    /// Every object allocated so far is a survivor.
    fn record_survivors(&self);
    /// Every object on this page, including ones allocated later, will be promoted.
    fn early_tenure(&self);
    /// Visit the slots in set cards. The card of a slot is set again if the visitor returns
    /// true for it. With `only_marked`, slots of unmarked objects are skipped.
    fn visit_remembered_cards(
        &self,
        visitor: &mut dyn PredicateObjectPointerVisitor,
        only_marked: bool,
    );
    fn reset_progress_bar(&self);
    fn clear_cards(&self);
    /// Set up empty forwarding information for this page and return it.
    fn allocate_forwarding_page(&self) -> AtomicRefMut<'_, ForwardingPage>;
    fn forwarding_page(&self) -> AtomicRef<'_, Option<Box<ForwardingPage>>>;
    fn free_forwarding_page(&self);
}

impl PageCollectorAccess for Page {
    fn try_allocate_gc(&self, size: usize) -> Option<Address> {
        debug_assert!(!self.is_owned());
        let result = self.top.load(Ordering::Relaxed);
        if size <= self.end() - result {
            self.top.store(result + size, Ordering::Release);
            Some(result)
        } else {
            None
        }
    }

    fn set_top(&self, top: Address) {
        debug_assert!(self.object_start() <= top && top <= self.end());
        self.top.store(top, Ordering::Release);
    }

    fn set_next(&self, next: Option<PageId>) {
        self.next.store(PageId::to_raw(next), Ordering::Relaxed);
    }

    fn set_resolved_top(&self, addr: Address) {
        debug_assert!(addr <= self.top.load(Ordering::Relaxed));
        self.resolved_top.store(addr, Ordering::Relaxed);
    }

    fn set_live_bytes(&self, bytes: usize) {
        self.live_bytes.store(bytes, Ordering::Relaxed);
    }

    fn add_live_bytes(&self, bytes: usize) {
        self.live_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    fn set_evacuation_candidate(&self, value: bool) {
        self.set_flag(PageFlags::EVACUATION_CANDIDATE, value);
    }

    fn record_survivors(&self) {
        self.survivor_end.store(self.object_end(), Ordering::Relaxed);
    }

    fn early_tenure(&self) {
        self.survivor_end.store(self.end(), Ordering::Relaxed);
    }

    fn visit_remembered_cards(
        &self,
        visitor: &mut dyn PredicateObjectPointerVisitor,
        only_marked: bool,
    ) {
        let Some(cards) = &self.card_table else {
            return;
        };
        if self.is_large() {
            self.visit_large_object_cards(cards, visitor, only_marked);
            return;
        }
        let snapshot = cards.take_all();
        if snapshot.iter().all(|word| *word == 0) {
            return;
        }
        for object in objects_in(self.object_start(), self.object_end()) {
            if only_marked && !object_model::is_marked(object) {
                continue;
            }
            let slots = object_model::pointer_slots(object);
            if slots.is_empty() {
                continue;
            }
            let first = cards.card_index(slots.start);
            let last = cards.card_index(slots.end - BYTES_IN_WORD);
            for card in first..=last {
                if card_table::is_set_in(&snapshot, card) {
                    visit_card_slots(cards, card, &slots, visitor);
                }
            }
        }
    }

    fn reset_progress_bar(&self) {
        self.progress_bar.store(0, Ordering::Relaxed);
    }

    fn clear_cards(&self) {
        if let Some(cards) = &self.card_table {
            cards.clear();
        }
    }

    fn allocate_forwarding_page(&self) -> AtomicRefMut<'_, ForwardingPage> {
        let fp = self.forwarding_page.borrow_mut();
        debug_assert!(fp.is_none());
        let size = self.memory_end - self.start;
        AtomicRefMut::map(fp, |fp| {
            &mut **fp.insert(Box::new(ForwardingPage::new(self.start, size)))
        })
    }

    fn forwarding_page(&self) -> AtomicRef<'_, Option<Box<ForwardingPage>>> {
        self.forwarding_page.borrow()
    }

    fn free_forwarding_page(&self) {
        *self.forwarding_page.borrow_mut() = None;
    }
}

impl Page {
    /// Scan the cards of a large page in chunks claimed from the progress bar, so that
    /// several scanners can share one big array.
    fn visit_large_object_cards(
        &self,
        cards: &CardTable,
        visitor: &mut dyn PredicateObjectPointerVisitor,
        only_marked: bool,
    ) {
        let Some(object) = objects_in(self.object_start(), self.object_end()).next() else {
            return;
        };
        if only_marked && !object_model::is_marked(object) {
            return;
        }
        let slots = object_model::pointer_slots(object);
        if slots.is_empty() {
            return;
        }
        let first = cards.card_index(slots.start);
        let last = cards.card_index(slots.end - BYTES_IN_WORD);
        loop {
            let claimed = self
                .progress_bar
                .fetch_add(CARDS_PER_INTERRUPT_CHECK, Ordering::Relaxed);
            let from = first + claimed;
            if from > last {
                break;
            }
            let to = (from + CARDS_PER_INTERRUPT_CHECK).min(last + 1);
            for card in from..to {
                if cards.take_card(card) {
                    visit_card_slots(cards, card, &slots, visitor);
                }
            }
        }
    }
}

fn visit_card_slots(
    cards: &CardTable,
    card: usize,
    slots: &Range<Address>,
    visitor: &mut dyn PredicateObjectPointerVisitor,
) {
    let range = Address::range_intersection(&cards.card_range(card), slots);
    let mut slot = range.start;
    while slot < range.end {
        if visitor.predicate_visit_slot(slot) {
            cards.remember(slot);
        }
        slot += BYTES_IN_WORD;
    }
}
