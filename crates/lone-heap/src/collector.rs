//! Mark-sweep collection.
//!
//! One cycle runs three phases on the calling thread:
//!
//! 1. **Mark.** Precise roots are pushed on a work-list and traced through
//!    every reference a composite cell holds. Then conservative roots
//!    (caller word buffers, spilled registers, the native stack) are
//!    filtered through the heap membership predicate and traced the same
//!    way. The `marked` bit is the only cycle guard.
//! 2. **Sweep.** Every live, unmarked cell returns its auxiliary buffer to
//!    the arena and becomes dead. Survivors have `marked` cleared.
//! 3. **Compact.** Heaps left without a live cell are released.
//!
//! Cells never move. The work-list is kept between cycles.

use std::time::Instant;

use lone_arena::Arena;
use lone_core::CellRef;
use tracing::debug;

use crate::cell::{CellHeader, Value};
use crate::heap::HeapList;
use crate::scan::{self, StackRoots};
use crate::stats::{CycleStats, GcStats};

/// Phase the collector is in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// No collection is running.
    Idle,
    /// Tracing from roots.
    Mark,
    /// Reclaiming unmarked cells.
    Sweep,
    /// Releasing empty heaps.
    Compact,
}

/// Roots for one collection.
#[derive(Clone, Copy, Debug, Default)]
pub struct RootSet<'a> {
    /// Cells known to be live. Each must be a live cell.
    pub precise: &'a [CellRef],
    /// Words that may or may not be references.
    pub stack: StackRoots<'a>,
}

/// Stop-the-world mark-sweep collector.
#[derive(Debug)]
pub struct Collector {
    worklist: Vec<CellRef>,
    phase: Phase,
    stats: GcStats,
}

impl Collector {
    /// Create an idle collector.
    pub fn new() -> Self {
        Self {
            worklist: Vec::new(),
            phase: Phase::Idle,
            stats: GcStats::default(),
        }
    }

    /// Current phase. Anything other than [`Phase::Idle`] means a cycle is
    /// on the stack.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Cumulative statistics.
    pub fn stats(&self) -> &GcStats {
        &self.stats
    }

    /// Run one full cycle.
    ///
    /// # Panics
    ///
    /// Panics if a precise root, or a reference held by a reachable cell,
    /// names a dead cell or no cell at all. Both mean the object graph is
    /// already corrupt.
    pub fn collect(
        &mut self,
        arena: &mut Arena,
        heaps: &mut HeapList,
        roots: RootSet<'_>,
    ) -> CycleStats {
        assert_eq!(self.phase, Phase::Idle, "collection re-entered");
        let started = Instant::now();
        let mut cycle = CycleStats::default();

        self.phase = Phase::Mark;
        for &root in roots.precise {
            assert!(
                heaps.is_live(arena, root),
                "precise root {root} is not a live cell"
            );
            self.worklist.push(root);
        }
        cycle.precise_roots = roots.precise.len();
        self.drain(arena, heaps, &mut cycle);

        let candidates = scan::conservative_candidates(&roots.stack, |word| heaps.resolve(word));
        for cell in candidates {
            if heaps.is_live(arena, cell) {
                cycle.conservative_hits += 1;
                self.worklist.push(cell);
            }
        }
        self.drain(arena, heaps, &mut cycle);

        self.phase = Phase::Sweep;
        Self::sweep(arena, heaps, &mut cycle);

        self.phase = Phase::Compact;
        cycle.released_heaps = heaps.release_empty_heaps(arena);

        self.phase = Phase::Idle;
        cycle.duration_us = started.elapsed().as_micros() as u64;
        self.stats.record(cycle);
        debug!(
            marked = cycle.marked,
            freed_cells = cycle.freed_cells,
            freed_bytes = cycle.freed_bytes,
            released_heaps = cycle.released_heaps,
            conservative_hits = cycle.conservative_hits,
            heaps = heaps.heap_count(),
            duration_us = cycle.duration_us,
            "collection complete"
        );
        cycle
    }

    fn drain(&mut self, arena: &mut Arena, heaps: &HeapList, cycle: &mut CycleStats) {
        while let Some(cell) = self.worklist.pop() {
            let header = match heaps.header(arena, cell) {
                Some(header) if header.live => header,
                Some(_) => panic!("marking reached dead cell {cell}"),
                None => panic!("marking reached cell {cell} outside every heap"),
            };
            if header.marked {
                continue;
            }
            heaps.set_header(
                arena,
                cell,
                CellHeader {
                    marked: true,
                    ..header
                },
            );
            cycle.marked += 1;
            if header.tag.is_composite() {
                if let Some(value) = heaps.load(arena, cell) {
                    self.push_children(arena, &value);
                }
            }
        }
    }

    fn push_children(&mut self, arena: &Arena, value: &Value) {
        self.worklist.extend(value.record_references());
        match value {
            Value::Vector(vector) => {
                if let Some(buffer) = vector.buffer {
                    let elements = (0..vector.count)
                        .filter_map(|i| CellRef::from_word(arena.read_word(buffer, i)));
                    self.worklist.extend(elements);
                }
            }
            Value::Table(table) => {
                for slot in 0..table.capacity {
                    let key = arena.read_word(table.entries, 2 * slot);
                    if let Some(key) = CellRef::from_word(key) {
                        let value = arena.read_word(table.entries, 2 * slot + 1);
                        self.worklist.push(key);
                        self.worklist.extend(CellRef::from_word(value));
                    }
                }
            }
            _ => {}
        }
    }

    fn sweep(arena: &mut Arena, heaps: &HeapList, cycle: &mut CycleStats) {
        for cell in heaps.cells() {
            let Some(header) = heaps.header(arena, cell) else {
                continue;
            };
            if !header.live {
                continue;
            }
            if header.marked {
                heaps.set_header(
                    arena,
                    cell,
                    CellHeader {
                        marked: false,
                        ..header
                    },
                );
                continue;
            }

            if let Some(buffer) = heaps.load(arena, cell).and_then(|v| v.owned_buffer()) {
                let bytes = arena
                    .block_size(buffer)
                    .unwrap_or_else(|e| panic!("cell {cell} owns {buffer}: {e}"));
                arena
                    .deallocate(buffer)
                    .unwrap_or_else(|e| panic!("cell {cell} owns {buffer}: {e}"));
                cycle.freed_buffers += 1;
                cycle.freed_bytes += bytes;
            }
            heaps.kill(arena, cell);
            cycle.freed_cells += 1;
        }
    }
}

impl Default for Collector {
    fn default() -> Self {
        Self::new()
    }
}
