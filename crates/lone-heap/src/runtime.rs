//! The runtime's memory context.
//!
//! [`Runtime`] owns the arena, the heap list, the collector and every root.
//! All allocation funnels through it so that an exhausted arena triggers
//! exactly one collection before the request is retried.

use lone_arena::{Arena, ArenaConfig, ArenaError, ArenaPtr};
use lone_core::{CellRef, Tag};
use smallvec::SmallVec;
use tracing::{debug, error, warn};

use crate::cell::Value;
use crate::collector::{Collector, Phase, RootSet};
use crate::config::RuntimeConfig;
use crate::error::MemoryError;
use crate::heap::HeapList;
use crate::roots::Roots;
use crate::scan::StackRoots;
use crate::stats::{CycleStats, GcStats};

/// Memory context of one lone runtime.
///
/// Single-threaded and `&mut`-driven. Created fully initialized: the named
/// roots (nil, the symbol table, `true`, the module registry, the
/// top-level environment, the root module and the module search path)
/// exist as soon as [`Runtime::new`] returns.
#[derive(Debug)]
pub struct Runtime {
    pub(crate) arena: Arena,
    pub(crate) heaps: HeapList,
    collector: Collector,
    pub(crate) roots: Roots,
    temporary_roots: Vec<CellRef>,
    /// Outermost native frame for conservative scanning.
    pub(crate) stack_anchor: Option<usize>,
    pub(crate) config: RuntimeConfig,
}

impl Runtime {
    /// Allocate the region described by `config` and initialize the
    /// runtime in it.
    pub fn new(config: RuntimeConfig) -> Result<Self, MemoryError> {
        config.validate()?;
        let arena = Arena::new(config.arena.clone())?;
        Self::with_arena(arena, config)
    }

    /// Initialize the runtime in a region supplied by the caller. The
    /// region's length replaces `config.arena.region_bytes`.
    pub fn with_region(region: Box<[u8]>, config: RuntimeConfig) -> Result<Self, MemoryError> {
        let config = RuntimeConfig {
            arena: ArenaConfig {
                region_bytes: region.len(),
                ..config.arena
            },
            ..config
        };
        config.validate()?;
        let arena = Arena::from_region(region, &config.arena)?;
        Self::with_arena(arena, config)
    }

    fn with_arena(mut arena: Arena, config: RuntimeConfig) -> Result<Self, MemoryError> {
        let heaps = HeapList::new(&mut arena, config.heap_capacity)?;
        let mut runtime = Self {
            arena,
            heaps,
            collector: Collector::new(),
            roots: Roots::default(),
            temporary_roots: Vec::new(),
            stack_anchor: None,
            config,
        };
        runtime.initialize()?;
        debug!(
            region_bytes = runtime.arena.region_bytes(),
            heap_capacity = runtime.config.heap_capacity,
            live_cells = runtime.heaps.live_cells(&runtime.arena),
            "runtime initialized"
        );
        Ok(runtime)
    }

    /// Create the named roots. Each is registered as soon as it exists so
    /// that a collection triggered by the next one keeps it alive.
    fn initialize(&mut self) -> Result<(), MemoryError> {
        let nil = self.new_cell(Value::Nil)?;
        self.roots.nil = Some(nil);

        let symbols = self.table_create(self.config.symbol_table_capacity, None)?;
        self.roots.symbol_table = Some(symbols);
        self.roots.truth = Some(self.intern(b"true")?);

        let environment_capacity = self.config.environment_capacity;
        self.roots.loaded_modules = Some(self.table_create(environment_capacity, None)?);
        self.roots.top_level_environment = Some(self.table_create(environment_capacity, None)?);
        self.roots.root_module = Some(self.module_create(nil)?);
        self.roots.module_path = Some(self.vector_create(0)?);
        Ok(())
    }

    // ── Accessors ───────────────────────────────────────────────

    /// The arena, for inspection.
    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    /// The heap list, for inspection.
    pub fn heaps(&self) -> &HeapList {
        &self.heaps
    }

    /// The named roots.
    pub fn roots(&self) -> &Roots {
        &self.roots
    }

    /// The configuration the runtime was built with.
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Cumulative collector statistics.
    pub fn gc_stats(&self) -> &GcStats {
        self.collector.stats()
    }

    fn root(cell: Option<CellRef>, name: &str) -> CellRef {
        cell.unwrap_or_else(|| panic!("{name} used before the runtime was initialized"))
    }

    /// The nil constant.
    pub fn nil(&self) -> CellRef {
        Self::root(self.roots.nil, "nil")
    }

    /// The interned `true` symbol.
    pub fn truth(&self) -> CellRef {
        Self::root(self.roots.truth, "true")
    }

    /// The symbol table.
    pub fn symbol_table(&self) -> CellRef {
        Self::root(self.roots.symbol_table, "symbol table")
    }

    /// The registry of loaded modules.
    pub fn loaded_modules(&self) -> CellRef {
        Self::root(self.roots.loaded_modules, "module registry")
    }

    /// The environment every module environment inherits from.
    pub fn top_level_environment(&self) -> CellRef {
        Self::root(self.roots.top_level_environment, "top-level environment")
    }

    /// The module used when no other module is active.
    pub fn root_module(&self) -> CellRef {
        Self::root(self.roots.root_module, "root module")
    }

    /// The module search path vector.
    pub fn module_path(&self) -> CellRef {
        Self::root(self.roots.module_path, "module path")
    }

    // ── Cell state ──────────────────────────────────────────────

    /// Whether `cell` names a live cell.
    pub fn is_live(&self, cell: CellRef) -> bool {
        self.heaps.is_live(&self.arena, cell)
    }

    /// `Ok` if `cell` names a live cell.
    pub fn check_live(&self, cell: CellRef) -> Result<(), MemoryError> {
        if self.is_live(cell) {
            Ok(())
        } else {
            Err(MemoryError::DeadCell { cell })
        }
    }

    /// Decoded value of a live cell.
    pub fn value(&self, cell: CellRef) -> Result<Value, MemoryError> {
        self.heaps
            .load(&self.arena, cell)
            .ok_or(MemoryError::DeadCell { cell })
    }

    /// Variant of a live cell.
    pub fn tag(&self, cell: CellRef) -> Result<Tag, MemoryError> {
        Ok(self.value(cell)?.tag())
    }

    // ── Allocation ──────────────────────────────────────────────

    /// Allocate `size` zeroed bytes, collecting once if the arena is full.
    pub fn allocate(&mut self, size: usize) -> Result<ArenaPtr, MemoryError> {
        self.with_retry(size, |arena, _| arena.allocate(size))
    }

    /// Allocate `size` zeroed bytes at `alignment`, collecting once if the
    /// arena is full.
    pub fn allocate_aligned(
        &mut self,
        size: usize,
        alignment: usize,
    ) -> Result<ArenaPtr, MemoryError> {
        self.with_retry(size, |arena, _| arena.allocate_aligned(size, alignment))
    }

    /// Resize an allocation, collecting once if the arena is full.
    ///
    /// Buffers owned by a live cell are rejected with
    /// [`MemoryError::BufferOwned`].
    pub fn reallocate(&mut self, ptr: ArenaPtr, size: usize) -> Result<ArenaPtr, MemoryError> {
        self.check_unowned(ptr)?;
        self.resize(ptr, size)
    }

    pub(crate) fn resize(&mut self, ptr: ArenaPtr, size: usize) -> Result<ArenaPtr, MemoryError> {
        self.with_retry(size, |arena, _| arena.reallocate(ptr, size))
    }

    /// Return an allocation to the arena. Never collects.
    ///
    /// Only buffers no live cell owns may be freed; a cell's buffer is
    /// rejected with [`MemoryError::BufferOwned`] and stays allocated.
    pub fn deallocate(&mut self, ptr: ArenaPtr) -> Result<(), MemoryError> {
        self.check_unowned(ptr)?;
        Ok(self.arena.deallocate(ptr)?)
    }

    /// The live cell that frees `buffer` when swept, if any.
    pub(crate) fn buffer_owner(&self, buffer: ArenaPtr) -> Option<CellRef> {
        self.heaps.cells().find(|&cell| {
            self.heaps
                .load(&self.arena, cell)
                .and_then(|value| value.owned_buffer())
                == Some(buffer)
        })
    }

    fn check_unowned(&self, buffer: ArenaPtr) -> Result<(), MemoryError> {
        match self.buffer_owner(buffer) {
            Some(cell) => Err(MemoryError::BufferOwned { buffer, cell }),
            None => Ok(()),
        }
    }

    /// Run `attempt`; on exhaustion collect and run it once more. A second
    /// exhaustion is fatal and reported as [`MemoryError::Exhausted`].
    fn with_retry<T>(
        &mut self,
        requested: usize,
        mut attempt: impl FnMut(&mut Arena, &mut HeapList) -> Result<T, ArenaError>,
    ) -> Result<T, MemoryError> {
        assert_eq!(
            self.collector.phase(),
            Phase::Idle,
            "allocation during collection"
        );
        match attempt(&mut self.arena, &mut self.heaps) {
            Err(ArenaError::OutOfMemory { .. }) => {}
            other => return other.map_err(MemoryError::from),
        }

        warn!(requested, "arena exhausted, collecting before retry");
        self.collect();
        attempt(&mut self.arena, &mut self.heaps).map_err(|e| match e {
            ArenaError::OutOfMemory {
                requested,
                largest_free,
            } => {
                error!(requested, largest_free, "memory exhausted after collection");
                MemoryError::Exhausted {
                    requested,
                    largest_free,
                }
            }
            other => other.into(),
        })
    }

    /// Acquire a cell and store `value` in it.
    ///
    /// References held in the record are pinned while the heap list may
    /// grow or a collection may run.
    pub(crate) fn new_cell(&mut self, value: Value) -> Result<CellRef, MemoryError> {
        let refs: SmallVec<[CellRef; 3]> = value.record_references().collect();
        let heap_bytes = HeapList::heap_bytes(self.heaps.capacity());
        let cell = self.with_temporary_roots(&refs, |rt| {
            rt.with_retry(heap_bytes, |arena, heaps| heaps.acquire(arena))
        })?;
        self.heaps.store(&mut self.arena, cell, &value);
        Ok(cell)
    }

    /// Release a buffer no cell has taken ownership of yet.
    pub(crate) fn discard(&mut self, buffer: Option<ArenaPtr>) {
        if let Some(buffer) = buffer {
            if let Err(e) = self.arena.deallocate(buffer) {
                panic!("unowned buffer {buffer}: {e}");
            }
        }
    }

    // ── Temporary roots ─────────────────────────────────────────

    /// Pin `cell` until a matching [`pop_temporary_roots`](Self::pop_temporary_roots).
    pub fn push_temporary_root(&mut self, cell: CellRef) -> Result<(), MemoryError> {
        self.check_live(cell)?;
        self.temporary_roots.push(cell);
        Ok(())
    }

    /// Unpin the `count` most recently pinned cells.
    pub fn pop_temporary_roots(&mut self, count: usize) {
        let keep = self.temporary_roots.len().saturating_sub(count);
        self.temporary_roots.truncate(keep);
    }

    /// Number of pinned cells.
    pub fn temporary_root_count(&self) -> usize {
        self.temporary_roots.len()
    }

    /// Run `f` with `cells` pinned. Every cell must be live.
    pub(crate) fn with_temporary_roots<T>(
        &mut self,
        cells: &[CellRef],
        f: impl FnOnce(&mut Self) -> Result<T, MemoryError>,
    ) -> Result<T, MemoryError> {
        for &cell in cells {
            self.check_live(cell)?;
        }
        let depth = self.temporary_roots.len();
        self.temporary_roots.extend_from_slice(cells);
        let result = f(self);
        self.temporary_roots.truncate(depth);
        result
    }

    // ── Collection ──────────────────────────────────────────────

    /// Run a full collection with the named and temporary roots, plus the
    /// native stack if an anchor is recorded.
    pub fn collect(&mut self) -> CycleStats {
        self.collect_with_stack(&[])
    }

    /// Like [`collect`](Self::collect), also treating every word of
    /// `words` as a possible reference.
    pub fn collect_with_stack(&mut self, words: &[usize]) -> CycleStats {
        let precise: SmallVec<[CellRef; 32]> = self
            .roots
            .iter()
            .chain(self.temporary_roots.iter().copied())
            .collect();
        let roots = RootSet {
            precise: &precise,
            stack: StackRoots {
                native_anchor: self.stack_anchor,
                words,
            },
        };
        self.collector
            .collect(&mut self.arena, &mut self.heaps, roots)
    }

    /// Stop scanning the native stack.
    pub fn release_stack_anchor(&mut self) {
        self.stack_anchor = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runtime() -> Runtime {
        Runtime::new(RuntimeConfig {
            heap_capacity: 16,
            ..RuntimeConfig::new(64 * 1024)
        })
        .unwrap()
    }

    #[test]
    fn initialization_registers_every_root() {
        let rt = runtime();
        assert_eq!(rt.roots().iter().count(), 7);
        assert_eq!(rt.tag(rt.nil()).unwrap(), Tag::Nil);
        assert_eq!(rt.tag(rt.truth()).unwrap(), Tag::Symbol);
        assert_eq!(rt.tag(rt.symbol_table()).unwrap(), Tag::Table);
        assert_eq!(rt.tag(rt.root_module()).unwrap(), Tag::Module);
        assert_eq!(rt.tag(rt.module_path()).unwrap(), Tag::Vector);
    }

    #[test]
    fn collection_keeps_roots_and_frees_the_rest() {
        let mut rt = runtime();
        let before = rt.heaps().live_cells(rt.arena());
        let garbage = rt.integer(1).unwrap();
        let stats = rt.collect();
        assert_eq!(stats.freed_cells, 1);
        assert!(!rt.is_live(garbage));
        assert_eq!(rt.heaps().live_cells(rt.arena()), before);
        assert!(rt.is_live(rt.truth()));
    }

    #[test]
    fn temporary_roots_pin_until_popped() {
        let mut rt = runtime();
        let pinned = rt.integer(5).unwrap();
        rt.push_temporary_root(pinned).unwrap();
        rt.collect();
        assert!(rt.is_live(pinned));

        rt.pop_temporary_roots(1);
        assert_eq!(rt.temporary_root_count(), 0);
        rt.collect();
        assert!(!rt.is_live(pinned));
        assert_eq!(
            rt.push_temporary_root(pinned),
            Err(MemoryError::DeadCell { cell: pinned })
        );
    }

    #[test]
    fn stack_words_are_conservative_roots() {
        let mut rt = runtime();
        let held = rt.text("held").unwrap();
        let dropped = rt.text("dropped").unwrap();
        rt.collect_with_stack(&[held.to_word() as usize]);
        assert!(rt.is_live(held));
        assert!(!rt.is_live(dropped));
    }

    #[test]
    fn exhaustion_collects_then_retries() {
        let mut rt = runtime();
        let free = rt.arena().largest_free_block();
        let garbage = rt.allocate(free / 2).unwrap();
        let _owner = rt.bytes(&[0; 8]).unwrap();
        let text = rt.text(&"x".repeat(free / 4)).unwrap();
        // The text is garbage; its buffer must be reclaimed to fit this.
        let big = rt.allocate(free / 2 - 64);
        assert!(big.is_ok(), "{big:?}");
        assert!(!rt.is_live(text));
        assert_eq!(rt.gc_stats().cycles, 1);
        rt.deallocate(garbage).unwrap();
    }

    #[test]
    fn second_exhaustion_is_fatal() {
        let mut rt = runtime();
        let too_big = rt.arena().region_bytes();
        match rt.allocate(too_big) {
            Err(MemoryError::Exhausted { requested, .. }) => assert_eq!(requested, too_big),
            other => panic!("expected exhaustion, got {other:?}"),
        }
        assert_eq!(rt.gc_stats().cycles, 1);
    }

    #[test]
    fn invalid_free_is_a_caller_error() {
        let mut rt = runtime();
        let ptr = rt.allocate(8).unwrap();
        rt.deallocate(ptr).unwrap();
        assert!(matches!(
            rt.deallocate(ptr),
            Err(MemoryError::Arena(ArenaError::InvalidPointer { .. }))
        ));
    }

    #[test]
    fn cell_buffers_cannot_be_freed_by_hand() {
        let mut rt = runtime();
        let text = rt.text("owned by its cell").unwrap();
        let Value::Text(span) = rt.value(text).unwrap() else {
            panic!("text cell holds {:?}", rt.value(text));
        };
        let buffer = span.buffer.unwrap();
        let owned = MemoryError::BufferOwned { buffer, cell: text };
        assert_eq!(rt.deallocate(buffer), Err(owned.clone()));
        assert_eq!(rt.reallocate(buffer, 64), Err(owned));
        assert_eq!(rt.byte_contents(text).unwrap(), b"owned by its cell");

        let stats = rt.collect();
        assert_eq!(stats.freed_buffers, 1);
        rt.arena().verify().unwrap();
    }

    #[test]
    fn with_region_adopts_the_buffer_size() {
        let region = vec![0u8; 32 * 1024].into_boxed_slice();
        let rt = Runtime::with_region(
            region,
            RuntimeConfig {
                heap_capacity: 8,
                ..RuntimeConfig::default()
            },
        )
        .unwrap();
        assert_eq!(rt.arena().region_bytes(), 32 * 1024);
        assert_eq!(rt.config().arena.region_bytes, 32 * 1024);
    }

    #[test]
    fn invalid_config_is_rejected_before_allocating() {
        let result = Runtime::new(RuntimeConfig {
            heap_capacity: 0,
            ..RuntimeConfig::default()
        });
        assert!(matches!(result, Err(MemoryError::Config(_))));
    }
}
