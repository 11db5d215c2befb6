//! Heaps of value cells.
//!
//! A [`HeapList`] owns a growable list of fixed-capacity heaps. Each heap
//! is a single arena allocation holding `capacity` cell records. The first
//! heap is permanent; later heaps are added when every cell is live and
//! released by the collector once they hold no live cell.

use lone_arena::{Arena, ArenaError, ArenaPtr};
use lone_core::{CellRef, HeapId};
use tracing::debug;

use crate::cell::{CellHeader, Value, CELL_BYTES, CELL_WORDS, PAYLOAD_WORDS};

/// One fixed-capacity array of cells.
#[derive(Clone, Copy, Debug)]
struct Heap {
    id: HeapId,
    cells: ArenaPtr,
}

/// The runtime's list of heaps, in list order.
///
/// Heap ids grow monotonically along the list, so lookups by id are a
/// binary search. Ids of released heaps are never handed out again.
#[derive(Debug)]
pub struct HeapList {
    heaps: Vec<Heap>,
    capacity: u32,
    next_id: Option<HeapId>,
}

impl HeapList {
    /// Create the list with its permanent first heap.
    pub fn new(arena: &mut Arena, capacity: u32) -> Result<Self, ArenaError> {
        assert!(capacity > 0, "heap capacity must be at least 1");
        let mut list = Self {
            heaps: Vec::new(),
            capacity,
            next_id: Some(HeapId(0)),
        };
        let first = list.allocate_heap(arena)?;
        list.heaps.push(first);
        Ok(list)
    }

    /// Bytes of arena needed for one heap.
    pub fn heap_bytes(capacity: u32) -> usize {
        capacity as usize * CELL_BYTES
    }

    fn allocate_heap(&mut self, arena: &mut Arena) -> Result<Heap, ArenaError> {
        let id = self
            .next_id
            .unwrap_or_else(|| panic!("heap id space exhausted"));
        // Zeroed payload: every record starts out as a dead cell.
        let cells = arena.allocate(Self::heap_bytes(self.capacity))?;
        self.next_id = id.next();
        Ok(Heap { id, cells })
    }

    // ── Acquire / release ───────────────────────────────────────

    /// Hand out a dead cell as a live `Nil`.
    ///
    /// Scans the heaps in list order for the first dead cell. When every
    /// cell is live, allocates one more heap of the same capacity, links it
    /// at the tail and returns its first cell. Fails only if the arena
    /// cannot fit the new heap.
    pub fn acquire(&mut self, arena: &mut Arena) -> Result<CellRef, ArenaError> {
        for heap in &self.heaps {
            for slot in 0..self.capacity {
                if !self.header_at(arena, heap, slot).live {
                    let cell = CellRef::new(heap.id, slot);
                    self.reset(arena, heap, slot, CellHeader::FRESH);
                    return Ok(cell);
                }
            }
        }

        let heap = self.allocate_heap(arena)?;
        self.heaps.push(heap);
        debug!(
            heap = %heap.id,
            heaps = self.heaps.len(),
            capacity = self.capacity,
            "heap list grown"
        );
        self.reset(arena, &heap, 0, CellHeader::FRESH);
        Ok(CellRef::new(heap.id, 0))
    }

    /// Unlink every heap after the first that holds no live cell and return
    /// its array to the arena. Returns the number of heaps released.
    pub fn release_empty_heaps(&mut self, arena: &mut Arena) -> usize {
        let before = self.heaps.len();
        let capacity = self.capacity;
        let mut index = 0;
        self.heaps.retain(|heap| {
            let keep = index == 0
                || (0..capacity).any(|slot| {
                    let word = arena.read_word(heap.cells, slot as usize * CELL_WORDS);
                    CellHeader::decode(word).is_some_and(|h| h.live)
                });
            index += 1;
            if !keep {
                arena
                    .deallocate(heap.cells)
                    .unwrap_or_else(|e| panic!("heap {} array: {e}", heap.id));
                debug!(heap = %heap.id, "empty heap released");
            }
            keep
        });
        before - self.heaps.len()
    }

    // ── Membership ──────────────────────────────────────────────

    /// Heap membership predicate: the reference encoded by `word`, if it
    /// names a slot within a heap currently in the list. Says nothing about
    /// whether that cell is live.
    pub fn resolve(&self, word: u64) -> Option<CellRef> {
        let cell = CellRef::from_word(word)?;
        (cell.slot() < self.capacity && self.find(cell.heap()).is_some()).then_some(cell)
    }

    fn find(&self, id: HeapId) -> Option<&Heap> {
        self.heaps
            .binary_search_by_key(&id, |h| h.id)
            .ok()
            .map(|index| &self.heaps[index])
    }

    /// Heap and slot of `cell`, if it is a member.
    fn locate(&self, cell: CellRef) -> Option<(Heap, u32)> {
        if cell.slot() >= self.capacity {
            return None;
        }
        self.find(cell.heap()).map(|heap| (*heap, cell.slot()))
    }

    // ── Cell records ────────────────────────────────────────────

    fn header_at(&self, arena: &Arena, heap: &Heap, slot: u32) -> CellHeader {
        let word = arena.read_word(heap.cells, slot as usize * CELL_WORDS);
        CellHeader::decode(word)
            .unwrap_or_else(|| panic!("corrupt header {word:#x} in cell {}:{slot}", heap.id))
    }

    fn reset(&self, arena: &mut Arena, heap: &Heap, slot: u32, header: CellHeader) {
        let base = slot as usize * CELL_WORDS;
        arena.write_word(heap.cells, base, header.encode());
        for word in 1..CELL_WORDS {
            arena.write_word(heap.cells, base + word, 0);
        }
    }

    /// Header of `cell`, or `None` if it is not a member of any heap.
    pub fn header(&self, arena: &Arena, cell: CellRef) -> Option<CellHeader> {
        let (heap, slot) = self.locate(cell)?;
        Some(self.header_at(arena, &heap, slot))
    }

    /// Overwrite the header of a member cell, leaving its payload alone.
    pub fn set_header(&self, arena: &mut Arena, cell: CellRef, header: CellHeader) {
        let (heap, slot) = self.member(cell);
        arena.write_word(heap.cells, slot as usize * CELL_WORDS, header.encode());
    }

    /// Whether `cell` is a member and live.
    pub fn is_live(&self, arena: &Arena, cell: CellRef) -> bool {
        self.header(arena, cell).is_some_and(|h| h.live)
    }

    /// Decoded value of a live cell, or `None` if the cell is dead or not
    /// a member.
    pub fn load(&self, arena: &Arena, cell: CellRef) -> Option<Value> {
        let (heap, slot) = self.locate(cell)?;
        let header = self.header_at(arena, &heap, slot);
        if !header.live {
            return None;
        }
        let base = slot as usize * CELL_WORDS + 1;
        let mut payload = [0u64; PAYLOAD_WORDS];
        for (i, word) in payload.iter_mut().enumerate() {
            *word = arena.read_word(heap.cells, base + i);
        }
        Some(Value::decode(header.tag, &payload))
    }

    /// Write `value` into a live member cell, keeping its mark bit.
    ///
    /// # Panics
    ///
    /// Panics if `cell` is not a live member.
    pub fn store(&self, arena: &mut Arena, cell: CellRef, value: &Value) {
        let (heap, slot) = self.member(cell);
        let header = self.header_at(arena, &heap, slot);
        assert!(header.live, "store into dead cell {cell}");
        let base = slot as usize * CELL_WORDS;
        let header = CellHeader {
            tag: value.tag(),
            ..header
        };
        arena.write_word(heap.cells, base, header.encode());
        for (i, word) in value.encode().into_iter().enumerate() {
            arena.write_word(heap.cells, base + 1 + i, word);
        }
    }

    /// Return a member cell to the dead state with an all-zero record.
    pub fn kill(&self, arena: &mut Arena, cell: CellRef) {
        let (heap, slot) = self.member(cell);
        self.reset(arena, &heap, slot, CellHeader::DEAD);
    }

    fn member(&self, cell: CellRef) -> (Heap, u32) {
        self.locate(cell)
            .unwrap_or_else(|| panic!("cell {cell} is not in any heap"))
    }

    // ── Introspection ───────────────────────────────────────────

    /// Every cell slot of every heap, in list order.
    pub fn cells(&self) -> impl Iterator<Item = CellRef> + '_ {
        self.heaps
            .iter()
            .flat_map(|heap| (0..self.capacity).map(move |slot| CellRef::new(heap.id, slot)))
    }

    /// Ids of the heaps in list order.
    pub fn heap_ids(&self) -> impl Iterator<Item = HeapId> + '_ {
        self.heaps.iter().map(|h| h.id)
    }

    /// Number of heaps in the list.
    pub fn heap_count(&self) -> usize {
        self.heaps.len()
    }

    /// Cells per heap.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Total cell slots across all heaps.
    pub fn total_cells(&self) -> usize {
        self.heaps.len() * self.capacity as usize
    }

    /// Number of live cells across all heaps.
    pub fn live_cells(&self, arena: &Arena) -> usize {
        self.cells().filter(|&c| self.is_live(arena, c)).count()
    }
}
