//! The heap: pages, spaces, mutators and the collections that tie them together.

use crate::global_state::{GcStatus, GlobalState};
use crate::plan::compactor::Compactor;
use crate::plan::marker::Marker;
use crate::plan::scavenger::Scavenger;
use crate::plan::{
    AllocationSemantics, Become, BecomeSummary, CompactionSummary, GcKind, Mutator, ScavengeSummary,
};
use crate::policy::{NewSpace, OldSpace, Page};
use crate::util::alloc::AllocationError;
use crate::util::heap::{GcTrigger, PageId, PageResource, PageTable};
use crate::util::object_model;
use crate::util::options::Options;
use crate::util::statistics::Statistics;
use crate::util::{Address, ObjectReference};
use crate::vm::{ObjectVisitor, VMBinding};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Builds a heap from options. Options come from their defaults, then `PAGEHEAP_*`
/// environment variables, then `set_option`.
pub struct HeapBuilder {
    pub options: Options,
}

impl HeapBuilder {
    pub fn new() -> Self {
        let mut options = Options::default();
        options.read_env_var_settings();
        HeapBuilder { options }
    }

    /// A builder that ignores `PAGEHEAP_*` environment variables.
    pub fn new_no_env_vars() -> Self {
        HeapBuilder {
            options: Options::default(),
        }
    }

    /// Set an option by name. Returns false if the name is unknown or the value is invalid.
    pub fn set_option(&mut self, name: &str, val: &str) -> bool {
        self.options.set_from_str(name, val)
    }

    /// Reserve the heap and set up its page cache.
    pub fn build<VM: VMBinding>(&self, binding: VM) -> std::io::Result<Heap<VM>> {
        match crate::util::logger::try_init() {
            Ok(_) => debug!("The heap initialized the logger."),
            Err(_) => debug!("The heap failed to initialize the logger. Possibly a logger has been initialized by user."),
        }
        let mut options = self.options.clone();
        options.normalize();
        Heap::new(binding, options)
    }
}

impl Default for HeapBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Used and reserved bytes of one space.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SpaceUsage {
    pub used: usize,
    pub capacity: usize,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HeapUsage {
    pub new_space: SpaceUsage,
    pub old_space: SpaceUsage,
}

pub struct Heap<VM: VMBinding> {
    pub(crate) binding: VM,
    pub(crate) options: Options,
    pub(crate) state: GlobalState,
    pub(crate) table: PageTable,
    pub(crate) new_space: NewSpace,
    pub(crate) old_space: OldSpace,
    pub(crate) trigger: GcTrigger,
    pub(crate) stats: Statistics,
    mutators: Mutex<Vec<Arc<Mutator>>>,
    next_mutator_id: AtomicUsize,
    /// Held for the whole of a collection, and while objects are visited.
    gc_lock: Mutex<()>,
    last_scavenge: Mutex<Option<ScavengeSummary>>,
    last_compaction: Mutex<Option<CompactionSummary>>,
}

impl<VM: VMBinding> Heap<VM> {
    fn new(binding: VM, options: Options) -> std::io::Result<Self> {
        let resource = PageResource::init(options.heap_size, options.page_cache_capacity)?;
        info!(
            "Initialized heap: {} bytes reserved, new space {}..{} bytes",
            options.heap_size, options.new_space_size, options.max_new_space_size
        );
        #[cfg(feature = "extreme_assertions")]
        warn!("The feature 'extreme_assertions' is enabled. The heap will run expensive run-time checks. Slow performance should be expected.");
        if options.is_stress_test_gc_enabled() {
            info!("Stress GC every {} bytes", options.stress_factor);
        }
        Ok(Heap {
            new_space: NewSpace::new(&options),
            old_space: OldSpace::new(),
            trigger: GcTrigger::new(&options),
            table: PageTable::new(resource),
            state: GlobalState::default(),
            stats: Statistics::default(),
            mutators: Mutex::new(vec![]),
            next_mutator_id: AtomicUsize::new(1),
            gc_lock: Mutex::new(()),
            last_scavenge: Mutex::new(None),
            last_compaction: Mutex::new(None),
            binding,
            options,
        })
    }

    pub fn binding(&self) -> &VM {
        &self.binding
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn state(&self) -> &GlobalState {
        &self.state
    }

    pub fn page_table(&self) -> &PageTable {
        &self.table
    }

    pub fn new_space(&self) -> &NewSpace {
        &self.new_space
    }

    pub fn old_space(&self) -> &OldSpace {
        &self.old_space
    }

    pub fn gc_trigger(&self) -> &GcTrigger {
        &self.trigger
    }

    pub fn stats(&self) -> &Statistics {
        &self.stats
    }

    pub fn last_scavenge_summary(&self) -> Option<ScavengeSummary> {
        *self.last_scavenge.lock().unwrap()
    }

    pub fn last_compaction_summary(&self) -> Option<CompactionSummary> {
        self.last_compaction.lock().unwrap().clone()
    }

    pub(crate) fn bind_mutator(&self) -> Arc<Mutator> {
        let id = self.next_mutator_id.fetch_add(1, Ordering::Relaxed);
        let mutator = Arc::new(Mutator::new(id));
        self.mutators.lock().unwrap().push(mutator.clone());
        debug!("Bound mutator {}", id);
        mutator
    }

    pub(crate) fn destroy_mutator(&self, mutator: &Mutator) {
        self.new_space.release_tlab(&self.table, mutator);
        self.mutators
            .lock()
            .unwrap()
            .retain(|m| m.id() != mutator.id());
        debug!("Destroyed mutator {}", mutator.id());
    }

    pub fn num_mutators(&self) -> usize {
        self.mutators.lock().unwrap().len()
    }

    /// Does an object of `size` bytes with these semantics go to old space?
    pub(crate) fn is_old_allocation(&self, size: usize, semantics: AllocationSemantics) -> bool {
        semantics == AllocationSemantics::Old || size >= self.options.large_object_threshold
    }

    /// The new-space allocation slow path: refill the TLAB, collecting when new space is
    /// full. Collections escalate from a scavenge to a full GC; a collection another thread
    /// ran in the meantime only counts as a retry. If that does not help, the binding is
    /// told that the heap is out of memory.
    pub(crate) fn alloc_slow(
        &self,
        mutator: &Mutator,
        size: usize,
        pointer_slots: usize,
    ) -> ObjectReference {
        if self.options.is_stress_test_gc_enabled() && mutator.tlab().is_limited() {
            trace!("Stress GC for mutator {}", mutator.id());
            self.collect_for_allocation(GcKind::Scavenge, self.state.gc_count());
        }
        let mut last_err = AllocationError::HeapOutOfMemory;
        let mut escalation = [GcKind::Scavenge, GcKind::Full].into_iter().peekable();
        loop {
            let seen = self.state.gc_count();
            match self.refill_tlab(mutator, size) {
                Ok(()) => {
                    if let Some(object) = mutator.alloc_fast(size, pointer_slots) {
                        return object;
                    }
                }
                Err(e) => last_err = e,
            }
            let Some(&kind) = escalation.peek() else {
                break;
            };
            if self.collect_for_allocation(kind, seen) {
                escalation.next();
            }
        }
        self.binding.out_of_memory(last_err)
    }

    fn refill_tlab(&self, mutator: &Mutator, size: usize) -> Result<(), AllocationError> {
        self.new_space.refill_tlab(&self.table, mutator, size)?;
        if self.options.is_stress_test_gc_enabled() {
            mutator.limit_tlab(self.options.stress_factor.max(size));
        }
        Ok(())
    }

    /// Allocate in old space, with a full GC first if old space is over its budget and
    /// another one if the allocation fails.
    pub(crate) fn alloc_old(&self, size: usize, pointer_slots: usize) -> ObjectReference {
        let seen = self.state.gc_count();
        if self
            .trigger
            .is_full_gc_required(self.old_space.used_bytes(&self.table) + size)
        {
            self.collect_for_allocation(GcKind::Full, seen);
        }
        let mut collected = false;
        loop {
            let seen = self.state.gc_count();
            match self.old_space.allocate(&self.table, size) {
                Ok(addr) => return object_model::initialize_object(addr, size, pointer_slots),
                Err(e) if collected => self.binding.out_of_memory(e),
                Err(e) => {
                    debug!("Old-space allocation of {} bytes failed: {}", size, e);
                    collected = self.collect_for_allocation(GcKind::Full, seen);
                }
            }
        }
    }

    /// Allocate without collecting.
    pub(crate) fn try_alloc(
        &self,
        mutator: &Mutator,
        size: usize,
        pointer_slots: usize,
        semantics: AllocationSemantics,
    ) -> Result<ObjectReference, AllocationError> {
        if self.is_old_allocation(size, semantics) {
            let addr = self.old_space.allocate(&self.table, size)?;
            return Ok(object_model::initialize_object(addr, size, pointer_slots));
        }
        if let Some(object) = mutator.alloc_fast(size, pointer_slots) {
            return Ok(object);
        }
        self.refill_tlab(mutator, size)?;
        mutator
            .alloc_fast(size, pointer_slots)
            .ok_or(AllocationError::HeapOutOfMemory)
    }

    /// Roll back the most recent allocation of `size` bytes at `object`: either in the
    /// mutator's TLAB, on an unowned page, or, for an old object carved from the free list,
    /// by giving its chunk back to the free list.
    pub(crate) fn unallocate(&self, mutator: &Mutator, object: ObjectReference, size: usize) {
        let addr = object.to_raw_address();
        let page = self
            .table
            .page_of(addr)
            .unwrap_or_else(|| panic!("{} is not in the heap", object));
        if page.owner() == Some(mutator.id()) {
            mutator.tlab().unbump(addr, size);
        } else if page.is_old() && !page.is_large() && addr + size != page.top() {
            trace!("Unallocated {} bytes at {} back to the free list", size, addr);
            #[cfg(debug_assertions)]
            crate::util::memory::fill_words(addr, size, crate::util::constants::ALLOCATION_CANARY);
            self.old_space.add_free_chunk(addr, size);
        } else {
            page.unallocate(addr, size);
        }
    }

    /// Collect unless another collection finished since the caller saw `seen_gc_count`.
    /// Returns whether this call collected.
    fn collect_for_allocation(&self, kind: GcKind, seen_gc_count: usize) -> bool {
        let _gc = self.gc_lock.lock().unwrap();
        if self.state.gc_count() != seen_gc_count {
            debug!("Another thread collected while we waited; retrying the allocation");
            return false;
        }
        self.do_collection(kind);
        true
    }

    /// Run a collection of `kind`. A scavenge is followed by a full GC if old space ends
    /// up over its budget.
    pub fn collect(&self, kind: GcKind) {
        let _gc = self.gc_lock.lock().unwrap();
        self.do_collection(kind);
    }

    pub(crate) fn request_user_collection(&self) {
        if self.options.ignore_system_gc {
            info!("User collection request ignored");
            return;
        }
        let _gc = self.gc_lock.lock().unwrap();
        self.state
            .user_triggered_collection
            .store(true, Ordering::Relaxed);
        self.do_collection(GcKind::Full);
    }

    fn do_collection(&self, kind: GcKind) {
        self.binding.stop_all_mutators();
        self.state.set_gc_status(GcStatus::GcPrepare);
        self.release_all_tlabs();
        self.state.set_gc_status(GcStatus::GcProper);

        let performed = self.with_writable_pages(|| match kind {
            GcKind::Scavenge => {
                self.scavenge();
                if self
                    .trigger
                    .is_full_gc_required(self.old_space.used_bytes(&self.table))
                {
                    self.full_collection();
                    GcKind::Full
                } else {
                    GcKind::Scavenge
                }
            }
            GcKind::Full => {
                self.full_collection();
                GcKind::Full
            }
        });

        #[cfg(feature = "extreme_assertions")]
        self.verify_heap();

        self.state.set_gc_status(GcStatus::NotInGC);
        self.state.finish_collection(performed);
        self.binding.resume_mutators();
    }

    fn scavenge(&self) {
        let start = Instant::now();
        let before = self.used_bytes();
        let summary = Scavenger::new(self, false).scavenge();
        let after = self.used_bytes();
        self.stats.record(
            GcKind::Scavenge,
            start.elapsed(),
            before,
            after,
            summary.promoted_bytes,
        );
        info!(
            "Scavenge: {} -> {} bytes, {} promoted, in {:?}",
            before,
            after,
            summary.promoted_bytes,
            start.elapsed()
        );
        *self.last_scavenge.lock().unwrap() = Some(summary);
    }

    /// Promote everything in new space, then mark the heap and compact old space.
    fn full_collection(&self) {
        let start = Instant::now();
        let before = self.used_bytes();
        let scavenge = Scavenger::new(self, true).scavenge();
        let marked = Marker::new(self).mark();
        let summary = Compactor::new(self).compact();
        self.trigger.on_full_gc_end(summary.live_bytes);
        let after = self.used_bytes();
        self.stats.record(
            GcKind::Full,
            start.elapsed(),
            before,
            after,
            scavenge.promoted_bytes + summary.moved_bytes,
        );
        info!(
            "Full GC: {} -> {} bytes, {} objects marked, {} pages evacuated, {} pages freed, in {:?}",
            before,
            after,
            marked.marked_objects,
            summary.evacuated.len(),
            summary.freed_pages,
            start.elapsed()
        );
        *self.last_scavenge.lock().unwrap() = Some(scavenge);
        *self.last_compaction.lock().unwrap() = Some(summary);
    }

    /// Check the heap after a collection: every page walks exactly to its top, and every
    /// object reachable from the roots is in the heap, unmarked, not forwarded, and has its
    /// old-to-new references covered by remembered cards.
    #[cfg(feature = "extreme_assertions")]
    fn verify_heap(&self) {
        use crate::util::object_forwarding;
        use crate::util::object_model::RawObjectIterator;
        use std::collections::HashSet;

        let pages = self.new_space.pages(&self.table);
        for page in pages.iter().chain(self.old_space.all_pages(&self.table).iter()) {
            let mut cursor = page.object_start();
            for addr in RawObjectIterator::new(page.object_start(), page.top()) {
                cursor = addr + object_model::size_at(addr);
            }
            assert_eq!(cursor, page.top(), "{:?} does not walk to its top", page);
        }

        let mut visited: HashSet<ObjectReference> = HashSet::new();
        let mut stack: Vec<ObjectReference> = vec![];
        self.binding.scan_roots(&mut |slot: Address| {
            if let Some(object) = object_model::load_slot(slot) {
                stack.push(object);
            }
        });
        while let Some(object) = stack.pop() {
            if !visited.insert(object) {
                continue;
            }
            let page = self
                .table
                .page_of(object.to_raw_address())
                .unwrap_or_else(|| panic!("{} is not in the heap", object));
            if page.is_image() {
                continue;
            }
            assert!(!object_model::is_marked(object), "{} is still marked", object);
            assert!(!object_forwarding::is_forwarded(object), "{} is forwarded", object);
            object_model::scan_object(object, &mut |slot: Address| {
                let Some(target) = object_model::load_slot(slot) else {
                    return;
                };
                let target_page = self
                    .table
                    .page_of(target.to_raw_address())
                    .unwrap_or_else(|| panic!("{} points outside the heap", slot));
                if page.is_old() && target_page.is_new() && page.card_table().is_some() {
                    assert!(
                        page.is_card_remembered(slot),
                        "old-to-new slot {} of {} has no remembered card",
                        slot,
                        object
                    );
                }
                stack.push(target);
            });
        }
        debug!("Verified {} reachable objects", visited.len());
    }

    /// Make every write-protected heap page writable while `f` runs, then protect again
    /// the ones that are still in the heap. Image pages are left alone.
    fn with_writable_pages<R>(&self, f: impl FnOnce() -> R) -> R {
        let protected: Vec<Arc<Page>> = self
            .table
            .pages()
            .into_iter()
            .filter(|p| p.is_write_protected() && !p.is_image())
            .collect();
        for page in protected.iter() {
            if let Err(e) = page.write_protect(false) {
                panic!("Failed to unprotect {:?}: {}", page, e);
            }
        }
        let result = f();
        if !protected.is_empty() {
            let live = self.table.pages();
            for page in protected.iter().filter(|p| live.iter().any(|l| Arc::ptr_eq(l, *p))) {
                if let Err(e) = page.write_protect(true) {
                    panic!("Failed to protect {:?}: {}", page, e);
                }
            }
            trace!("Restored write protection on {} pages", protected.len());
        }
        result
    }

    /// Forward the identities in `become` at a safepoint. This is not a collection and
    /// does not count as one.
    pub(crate) fn become_forward(&self, forwarding: Become) -> BecomeSummary {
        let _gc = self.gc_lock.lock().unwrap();
        self.binding.stop_all_mutators();
        self.release_all_tlabs();
        let summary = self.with_writable_pages(|| forwarding.forward(self));
        info!(
            "Become: {} objects forwarded, {} slots updated",
            summary.forwarded_objects, summary.updated_slots
        );
        #[cfg(feature = "extreme_assertions")]
        self.verify_heap();
        self.binding.resume_mutators();
        summary
    }

    fn release_all_tlabs(&self) {
        for mutator in self.mutators.lock().unwrap().iter() {
            self.new_space.release_tlab(&self.table, mutator);
        }
    }

    /// Visit every object in the heap, image pages included. Mutators are stopped and
    /// their TLABs released for the duration.
    pub(crate) fn visit_objects(&self, visitor: &mut dyn ObjectVisitor) {
        let _gc = self.gc_lock.lock().unwrap();
        self.binding.stop_all_mutators();
        self.release_all_tlabs();
        for page in self.new_space.pages(&self.table) {
            page.visit_objects(visitor);
        }
        for page in self.old_space.all_pages(&self.table) {
            page.visit_objects(visitor);
        }
        for page in self.table.pages().into_iter().filter(|p| p.is_image()) {
            page.visit_objects(visitor);
        }
        self.binding.resume_mutators();
    }

    pub(crate) fn add_image_pages(&self, start: Address, size: usize, is_vm_isolate: bool) -> PageId {
        Page::register_image(&self.table, start, size, is_vm_isolate).id()
    }

    /// Bytes of objects in new and old space. Objects in TLABs count from their release on.
    pub fn used_bytes(&self) -> usize {
        self.new_space.used_bytes(&self.table) + self.old_space.used_bytes(&self.table)
    }

    /// Bytes of the heap reservation.
    pub fn total_bytes(&self) -> usize {
        self.table.resource().end() - self.table.resource().start()
    }

    pub fn free_bytes(&self) -> usize {
        self.total_bytes().saturating_sub(self.used_bytes())
    }

    pub fn heap_usage(&self) -> HeapUsage {
        HeapUsage {
            new_space: SpaceUsage {
                used: self.new_space.used_bytes(&self.table),
                capacity: self.new_space.capacity_bytes(),
            },
            old_space: SpaceUsage {
                used: self.old_space.used_bytes(&self.table),
                capacity: self.old_space.capacity_bytes(&self.table),
            },
        }
    }
}

impl<VM: VMBinding> Drop for Heap<VM> {
    fn drop(&mut self) {
        if self.state.gc_count() > 0 {
            self.stats.print_stats();
        }
        self.table.resource().cleanup();
    }
}
