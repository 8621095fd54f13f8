//! Per-kind collection statistics.

use crate::plan::GcKind;
use enum_map::EnumMap;
use strum::IntoEnumIterator;
use std::fmt::Write;
use std::sync::Mutex;
use std::time::Duration;

/// What the collections of one kind did so far.
#[derive(Clone, Copy, Debug, Default)]
pub struct GcKindStats {
    pub count: usize,
    pub total_time: Duration,
    /// Heap bytes in use before the collections, summed.
    pub used_before: usize,
    /// Heap bytes in use after the collections, summed.
    pub used_after: usize,
    /// Bytes moved into old space by scavenges, or moved by the compactor.
    pub moved_bytes: usize,
}

impl GcKindStats {
    pub fn reclaimed_bytes(&self) -> usize {
        self.used_before.saturating_sub(self.used_after)
    }
}

#[derive(Default)]
pub struct Statistics {
    per_kind: Mutex<EnumMap<GcKind, GcKindStats>>,
}

impl Statistics {
    pub(crate) fn record(
        &self,
        kind: GcKind,
        elapsed: Duration,
        used_before: usize,
        used_after: usize,
        moved_bytes: usize,
    ) {
        let mut per_kind = self.per_kind.lock().unwrap();
        let stats = &mut per_kind[kind];
        stats.count += 1;
        stats.total_time += elapsed;
        stats.used_before += used_before;
        stats.used_after += used_after;
        stats.moved_bytes += moved_bytes;
    }

    pub fn get(&self, kind: GcKind) -> GcKindStats {
        self.per_kind.lock().unwrap()[kind]
    }

    pub fn gc_count(&self, kind: GcKind) -> usize {
        self.get(kind).count
    }

    /// One line per kind, e.g. `Scavenge: 3 GCs in 1.2ms, 4096 bytes reclaimed`.
    pub fn report(&self) -> String {
        let per_kind = self.per_kind.lock().unwrap();
        let mut out = String::new();
        for kind in GcKind::iter() {
            let stats = &per_kind[kind];
            let _ = writeln!(
                out,
                "{}: {} GCs in {:?}, {} bytes reclaimed, {} bytes moved",
                kind,
                stats.count,
                stats.total_time,
                stats.reclaimed_bytes(),
                stats.moved_bytes
            );
        }
        out
    }

    /// Log the report, one line per kind.
    pub fn print_stats(&self) {
        for line in self.report().lines() {
            info!("{}", line);
        }
    }
}
