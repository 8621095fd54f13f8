use crate::util::constants::BYTES_IN_HEAP_PAGE;
use crate::util::options::Options;
use std::sync::atomic::{AtomicUsize, Ordering};

/// The smallest old-space budget the trigger will set.
const MIN_OLD_SPACE_THRESHOLD: usize = 4 * BYTES_IN_HEAP_PAGE;

/// GcTrigger decides when a scavenge should be followed by a full collection.
///
/// Old space may grow up to a threshold. After every full collection the threshold is
/// reset to the surviving old-space size plus `old_gen_growth` percent, bounded by the
/// heap size.
pub struct GcTrigger {
    threshold: AtomicUsize,
    growth_percent: usize,
    limit: usize,
}

impl GcTrigger {
    pub fn new(options: &Options) -> Self {
        let limit = options.heap_size;
        GcTrigger {
            threshold: AtomicUsize::new((limit / 2).max(MIN_OLD_SPACE_THRESHOLD)),
            growth_percent: options.old_gen_growth,
            limit,
        }
    }

    /// The old-space size in bytes above which a full collection is due.
    pub fn old_space_threshold(&self) -> usize {
        self.threshold.load(Ordering::Relaxed)
    }

    /// Is a full collection due with `old_used` bytes in old space?
    pub fn is_full_gc_required(&self, old_used: usize) -> bool {
        let threshold = self.old_space_threshold();
        if old_used > threshold {
            debug!(
                "Old space uses {} bytes, above the threshold of {} bytes",
                old_used, threshold
            );
            true
        } else {
            false
        }
    }

    /// Called at the end of a full collection with the live old-space size.
    pub fn on_full_gc_end(&self, old_live: usize) {
        let growth = old_live.saturating_mul(self.growth_percent) / 100;
        let threshold = old_live
            .saturating_add(growth)
            .max(MIN_OLD_SPACE_THRESHOLD)
            .min(self.limit);
        debug!("Old space threshold set to {} bytes", threshold);
        self.threshold.store(threshold, Ordering::Relaxed);
    }
}
