use crate::plan::GcKind;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

/// Collection state of a heap, shared by the allocation slow path and the collectors.
pub struct GlobalState {
    /// The current GC status.
    pub(crate) gc_status: Mutex<GcStatus>,
    /// The number of finished collections of any kind. The allocation slow path uses it to
    /// notice that another thread collected while it waited for the GC lock.
    pub(crate) gc_count: AtomicUsize,
    /// Is the current GC triggered by the runtime (not by an allocation failure)?
    pub(crate) user_triggered_collection: AtomicBool,
    /// The kind of the last finished collection.
    pub(crate) last_gc_kind: Mutex<Option<GcKind>>,
}

impl GlobalState {
    pub fn gc_count(&self) -> usize {
        self.gc_count.load(Ordering::Acquire)
    }

    pub(crate) fn set_gc_status(&self, s: GcStatus) {
        let mut gc_status = self.gc_status.lock().unwrap();
        debug_assert!(
            *gc_status != s,
            "GC status is already {:?}",
            s
        );
        *gc_status = s;
    }

    pub fn gc_status(&self) -> GcStatus {
        *self.gc_status.lock().unwrap()
    }

    pub fn is_gc_in_progress(&self) -> bool {
        self.gc_status() != GcStatus::NotInGC
    }

    /// Return true if the current collection was requested by the runtime.
    pub fn is_user_triggered_collection(&self) -> bool {
        self.user_triggered_collection.load(Ordering::Relaxed)
    }

    pub fn last_gc_kind(&self) -> Option<GcKind> {
        *self.last_gc_kind.lock().unwrap()
    }

    pub(crate) fn finish_collection(&self, kind: GcKind) {
        *self.last_gc_kind.lock().unwrap() = Some(kind);
        self.user_triggered_collection.store(false, Ordering::Relaxed);
        self.gc_count.fetch_add(1, Ordering::Release);
    }
}

impl Default for GlobalState {
    fn default() -> Self {
        Self {
            gc_status: Mutex::new(GcStatus::NotInGC),
            gc_count: AtomicUsize::new(0),
            user_triggered_collection: AtomicBool::new(false),
            last_gc_kind: Mutex::new(None),
        }
    }
}

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum GcStatus {
    NotInGC,
    /// Mutators are stopped and their TLABs are being released.
    GcPrepare,
    /// Objects are being copied, marked or moved.
    GcProper,
}
