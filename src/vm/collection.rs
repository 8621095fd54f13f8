use crate::util::alloc::AllocationError;

/// VM-specific methods for bringing mutators to a safepoint.
pub trait Collection {
    /// Stop all mutator threads except the current one. Every mutator that is stopped must
    /// have left the allocation fast path. This is called before each collection.
    fn stop_all_mutators(&self);

    /// Resume all mutator threads stopped by `stop_all_mutators`.
    fn resume_mutators(&self);

    /// The heap could not satisfy an allocation even after collecting. This must not return.
    /// The default implementation panics, the way a runtime would raise a fatal error.
    ///
    /// Arguments:
    /// * `err`: What went wrong.
    fn out_of_memory(&self, err: AllocationError) -> ! {
        panic!("Out of memory with {:?}!", err);
    }
}
