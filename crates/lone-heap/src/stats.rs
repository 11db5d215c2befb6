//! Collection statistics.
//!
//! [`CycleStats`] describes one collection; [`GcStats`] accumulates them
//! over the life of a runtime.

/// Counters for a single collection cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CycleStats {
    /// Precise roots enumerated (named roots plus temporary roots).
    pub precise_roots: usize,
    /// Conservative words that resolved to a live cell.
    pub conservative_hits: usize,
    /// Cells marked reachable.
    pub marked: usize,
    /// Cells swept back to the dead state.
    pub freed_cells: usize,
    /// Auxiliary buffers returned to the arena.
    pub freed_buffers: usize,
    /// Arena bytes held by those buffers, headers included.
    pub freed_bytes: usize,
    /// Empty heaps released during compaction.
    pub released_heaps: usize,
    /// Wall-clock duration of the cycle, in microseconds.
    pub duration_us: u64,
}

/// Cumulative collector statistics.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GcStats {
    /// Completed collection cycles.
    pub cycles: u64,
    /// Cells freed across all cycles.
    pub freed_cells: u64,
    /// Buffer bytes freed across all cycles.
    pub freed_bytes: u64,
    /// Heaps released across all cycles.
    pub released_heaps: u64,
    /// Total pause time across all cycles, in microseconds.
    pub total_us: u64,
    /// Statistics of the most recent cycle.
    pub last: CycleStats,
}

impl GcStats {
    /// Fold a finished cycle into the totals.
    pub fn record(&mut self, cycle: CycleStats) {
        self.cycles += 1;
        self.freed_cells += cycle.freed_cells as u64;
        self.freed_bytes += cycle.freed_bytes as u64;
        self.released_heaps += cycle.released_heaps as u64;
        self.total_us += cycle.duration_us;
        self.last = cycle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_stats_are_zero() {
        let stats = GcStats::default();
        assert_eq!(stats.cycles, 0);
        assert_eq!(stats.last, CycleStats::default());
    }

    #[test]
    fn record_accumulates_and_keeps_last() {
        let mut stats = GcStats::default();
        stats.record(CycleStats {
            freed_cells: 3,
            freed_bytes: 64,
            duration_us: 10,
            ..CycleStats::default()
        });
        stats.record(CycleStats {
            freed_cells: 1,
            released_heaps: 2,
            duration_us: 5,
            ..CycleStats::default()
        });
        assert_eq!(stats.cycles, 2);
        assert_eq!(stats.freed_cells, 4);
        assert_eq!(stats.freed_bytes, 64);
        assert_eq!(stats.released_heaps, 2);
        assert_eq!(stats.total_us, 15);
        assert_eq!(stats.last.freed_cells, 1);
    }
}
