//! Open-addressed hash tables with prototype inheritance.
//!
//! The entry array is `capacity` pairs of reference words, key then value;
//! a zero key word marks an empty slot. Capacity is always a power of two
//! and the load factor is kept at or below one half, so every probe
//! sequence ends at an empty slot.
//!
//! Lookups that miss locally continue in the prototype, then its
//! prototype, and so on. Writes and deletes never touch a prototype.

use lone_arena::ArenaPtr;
use lone_core::{CellRef, Tag};
use smallvec::SmallVec;
use tracing::debug;

use crate::cell::{TableData, Value};
use crate::error::MemoryError;
use crate::runtime::Runtime;

/// Smallest entry array, in slots.
pub const MIN_TABLE_CAPACITY: usize = 2;

/// Bytes per entry: a key word and a value word.
pub const ENTRY_BYTES: usize = 16;

/// Outcome of probing for a key.
enum Slot {
    /// The key is stored at this index.
    Occupied(usize),
    /// The key is absent; this is the empty slot that ended the probe.
    Vacant(usize),
}

/// Slot count actually reserved for a requested capacity, or `None` if
/// no power of two that large exists.
pub fn table_slots(requested: usize) -> Option<usize> {
    requested
        .max(MIN_TABLE_CAPACITY)
        .checked_next_power_of_two()
}

fn entry_bytes(capacity: usize) -> usize {
    capacity.saturating_mul(ENTRY_BYTES)
}

impl Runtime {
    /// A new empty table with room for `capacity` slots (rounded up to a
    /// power of two) inheriting from `prototype`.
    pub fn table_create(
        &mut self,
        capacity: usize,
        prototype: Option<CellRef>,
    ) -> Result<CellRef, MemoryError> {
        if let Some(prototype) = prototype {
            self.table_data(prototype)?;
        }
        let Some(capacity) = table_slots(capacity) else {
            return Err(MemoryError::Exhausted {
                requested: entry_bytes(capacity),
                largest_free: self.arena.largest_free_block(),
            });
        };
        self.with_temporary_roots(prototype.as_slice(), |rt| {
            let entries = rt.allocate(entry_bytes(capacity))?;
            let data = TableData {
                entries,
                capacity,
                count: 0,
                prototype,
            };
            rt.new_cell(Value::Table(data))
                .inspect_err(|_| rt.discard(Some(entries)))
        })
    }

    pub(crate) fn table_data(&self, table: CellRef) -> Result<TableData, MemoryError> {
        match self.value(table)? {
            Value::Table(data) => Ok(data),
            other => Err(MemoryError::TypeMismatch {
                expected: Tag::Table,
                found: other.tag(),
            }),
        }
    }

    fn store_table(&mut self, table: CellRef, data: TableData) {
        self.heaps
            .store(&mut self.arena, table, &Value::Table(data));
    }

    fn entry_key(&self, data: &TableData, slot: usize) -> Option<CellRef> {
        CellRef::from_word(self.arena.read_word(data.entries, 2 * slot))
    }

    fn entry_value(&self, data: &TableData, slot: usize) -> CellRef {
        let word = self.arena.read_word(data.entries, 2 * slot + 1);
        CellRef::from_word(word)
            .unwrap_or_else(|| panic!("table slot {slot} has a key but value {word:#x}"))
    }

    fn write_entry(&mut self, entries: ArenaPtr, slot: usize, key: u64, value: u64) {
        self.arena.write_word(entries, 2 * slot, key);
        self.arena.write_word(entries, 2 * slot + 1, value);
    }

    /// Probe `data` from `hash` until `matches` accepts a key or an empty
    /// slot ends the sequence.
    fn probe(
        &self,
        data: &TableData,
        hash: u64,
        mut matches: impl FnMut(&Self, CellRef) -> bool,
    ) -> Slot {
        let mask = data.capacity - 1;
        let mut slot = hash as usize & mask;
        for _ in 0..data.capacity {
            match self.entry_key(data, slot) {
                None => return Slot::Vacant(slot),
                Some(key) if matches(self, key) => return Slot::Occupied(slot),
                Some(_) => slot = (slot + 1) & mask,
            }
        }
        panic!(
            "table with {} of {} slots occupied has no empty slot",
            data.count, data.capacity
        );
    }

    fn probe_key(&self, data: &TableData, key: CellRef) -> Slot {
        self.probe(data, self.hash_value(key), |rt, k| rt.values_equal(k, key))
    }

    /// Value bound to `key` in `table` or the nearest prototype that binds
    /// it. A prototype chain that loops back on itself ends the lookup.
    pub fn table_get(&self, table: CellRef, key: CellRef) -> Result<Option<CellRef>, MemoryError> {
        self.check_live(key)?;
        let mut data = self.table_data(table)?;
        let mut visited: SmallVec<[CellRef; 8]> = SmallVec::new();
        visited.push(table);
        loop {
            if let Slot::Occupied(slot) = self.probe_key(&data, key) {
                return Ok(Some(self.entry_value(&data, slot)));
            }
            let Some(prototype) = data.prototype else {
                return Ok(None);
            };
            if visited.contains(&prototype) {
                return Ok(None);
            }
            visited.push(prototype);
            data = self.table_data(prototype)?;
        }
    }

    /// Bind `key` to `value` in `table` itself, growing it first if the
    /// insertion would push the load factor past one half.
    pub fn table_set(
        &mut self,
        table: CellRef,
        key: CellRef,
        value: CellRef,
    ) -> Result<(), MemoryError> {
        self.with_temporary_roots(&[table, key, value], |rt| {
            let mut data = rt.table_data(table)?;
            match rt.probe_key(&data, key) {
                Slot::Occupied(slot) => {
                    rt.arena
                        .write_word(data.entries, 2 * slot + 1, value.to_word());
                    return Ok(());
                }
                Slot::Vacant(_) if data.count + 1 > data.capacity / 2 => {
                    data = rt.grow_table(table, data)?;
                }
                Slot::Vacant(_) => {}
            }

            let Slot::Vacant(slot) = rt.probe_key(&data, key) else {
                unreachable!("key appeared while growing");
            };
            rt.write_entry(data.entries, slot, key.to_word(), value.to_word());
            data.count += 1;
            rt.store_table(table, data);
            Ok(())
        })
    }

    /// Rehash `data` into an array twice the size and free the old one.
    fn grow_table(&mut self, table: CellRef, data: TableData) -> Result<TableData, MemoryError> {
        let capacity = data.capacity * 2;
        let entries = self.allocate(entry_bytes(capacity))?;
        let grown = TableData {
            entries,
            capacity,
            ..data
        };
        for slot in 0..data.capacity {
            if let Some(key) = self.entry_key(&data, slot) {
                let value = self.entry_value(&data, slot);
                let Slot::Vacant(target) = self.probe(&grown, self.hash_value(key), |_, _| false)
                else {
                    unreachable!("rehash probe only stops at empty slots");
                };
                self.write_entry(entries, target, key.to_word(), value.to_word());
            }
        }
        self.store_table(table, grown);
        self.arena.deallocate(data.entries)?;
        debug!(
            %table,
            from = data.capacity,
            to = capacity,
            count = data.count,
            "table grown"
        );
        Ok(grown)
    }

    /// Remove `key` from `table` itself and return the value it was bound
    /// to. Entries later in the same cluster are reinserted so no probe
    /// sequence is cut short.
    pub fn table_delete(
        &mut self,
        table: CellRef,
        key: CellRef,
    ) -> Result<Option<CellRef>, MemoryError> {
        self.check_live(key)?;
        let mut data = self.table_data(table)?;
        let Slot::Occupied(hole) = self.probe_key(&data, key) else {
            return Ok(None);
        };
        let removed = self.entry_value(&data, hole);
        self.write_entry(data.entries, hole, 0, 0);
        data.count -= 1;

        let mask = data.capacity - 1;
        let mut slot = (hole + 1) & mask;
        while let Some(moved) = self.entry_key(&data, slot) {
            let value = self.entry_value(&data, slot);
            self.write_entry(data.entries, slot, 0, 0);
            let Slot::Vacant(target) = self.probe(&data, self.hash_value(moved), |_, _| false)
            else {
                unreachable!("reinsert probe only stops at empty slots");
            };
            self.write_entry(data.entries, target, moved.to_word(), value.to_word());
            slot = (slot + 1) & mask;
        }

        self.store_table(table, data);
        Ok(Some(removed))
    }

    /// Number of entries stored in `table` itself.
    pub fn table_len(&self, table: CellRef) -> Result<usize, MemoryError> {
        Ok(self.table_data(table)?.count)
    }

    /// Number of slots in the entry array.
    pub fn table_capacity(&self, table: CellRef) -> Result<usize, MemoryError> {
        Ok(self.table_data(table)?.capacity)
    }

    /// The table consulted when a lookup misses locally.
    pub fn table_prototype(&self, table: CellRef) -> Result<Option<CellRef>, MemoryError> {
        Ok(self.table_data(table)?.prototype)
    }

    /// Replace or clear the prototype.
    pub fn table_set_prototype(
        &mut self,
        table: CellRef,
        prototype: Option<CellRef>,
    ) -> Result<(), MemoryError> {
        if let Some(prototype) = prototype {
            self.table_data(prototype)?;
        }
        let data = self.table_data(table)?;
        self.store_table(table, TableData { prototype, ..data });
        Ok(())
    }

    /// Local entries in slot order.
    pub fn table_entries(&self, table: CellRef) -> Result<Vec<(CellRef, CellRef)>, MemoryError> {
        let data = self.table_data(table)?;
        Ok((0..data.capacity)
            .filter_map(|slot| {
                self.entry_key(&data, slot)
                    .map(|key| (key, self.entry_value(&data, slot)))
            })
            .collect())
    }

    /// The symbol named `name` stored as a key in `table`, if any.
    pub(crate) fn find_symbol(
        &self,
        table: CellRef,
        name: &[u8],
    ) -> Result<Option<CellRef>, MemoryError> {
        let data = self.table_data(table)?;
        let hash = self.hash_symbol_name(name);
        Ok(match self.probe(&data, hash, |rt, key| rt.symbol_named(key, name)) {
            Slot::Occupied(slot) => self.entry_key(&data, slot),
            Slot::Vacant(_) => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;

    fn runtime() -> Runtime {
        Runtime::new(RuntimeConfig {
            heap_capacity: 64,
            ..RuntimeConfig::new(128 * 1024)
        })
        .unwrap()
    }

    #[test]
    fn capacity_rounds_to_a_power_of_two() {
        assert_eq!(table_slots(0), Some(2));
        assert_eq!(table_slots(1), Some(2));
        assert_eq!(table_slots(5), Some(8));
        assert_eq!(table_slots(16), Some(16));
        assert_eq!(table_slots(usize::MAX), None);
    }

    #[test]
    fn oversized_capacity_is_exhaustion() {
        let mut rt = runtime();
        let cycles = rt.gc_stats().cycles;
        assert!(matches!(
            rt.table_create(usize::MAX, None),
            Err(MemoryError::Exhausted {
                requested: usize::MAX,
                ..
            })
        ));
        assert_eq!(rt.gc_stats().cycles, cycles);
    }

    #[test]
    fn set_get_and_overwrite() {
        let mut rt = runtime();
        let table = rt.table_create(4, None).unwrap();
        let key = rt.intern(b"x").unwrap();
        let one = rt.integer(1).unwrap();
        let two = rt.integer(2).unwrap();

        assert_eq!(rt.table_get(table, key).unwrap(), None);
        rt.table_set(table, key, one).unwrap();
        rt.table_set(table, key, two).unwrap();
        assert_eq!(rt.table_get(table, key).unwrap(), Some(two));
        assert_eq!(rt.table_len(table).unwrap(), 1);
    }

    #[test]
    fn equal_keys_find_the_same_entry() {
        let mut rt = runtime();
        let table = rt.table_create(4, None).unwrap();
        let a = rt.text("key").unwrap();
        let b = rt.text("key").unwrap();
        let value = rt.integer(3).unwrap();
        rt.table_set(table, a, value).unwrap();
        assert_eq!(rt.table_get(table, b).unwrap(), Some(value));
    }

    #[test]
    fn growth_keeps_load_factor_at_most_half() {
        let mut rt = runtime();
        let table = rt.table_create(2, None).unwrap();
        for n in 0..40 {
            let key = rt.integer(n).unwrap();
            rt.table_set(table, key, key).unwrap();
            let (len, capacity) = (rt.table_len(table).unwrap(), rt.table_capacity(table).unwrap());
            assert!(2 * len <= capacity, "{len} entries in {capacity} slots");
        }
        for n in 0..40 {
            let key = rt.integer(n).unwrap();
            let found = rt.table_get(table, key).unwrap().unwrap();
            assert_eq!(rt.as_integer(found).unwrap(), n);
        }
        rt.arena().verify().unwrap();
    }

    #[test]
    fn prototype_lookup_and_shadowing() {
        let mut rt = runtime();
        let parent = rt.table_create(4, None).unwrap();
        let child = rt.table_create(4, Some(parent)).unwrap();
        let key = rt.intern(b"k").unwrap();
        let inherited = rt.integer(1).unwrap();
        let own = rt.integer(2).unwrap();

        rt.table_set(parent, key, inherited).unwrap();
        assert_eq!(rt.table_get(child, key).unwrap(), Some(inherited));
        rt.table_set(child, key, own).unwrap();
        assert_eq!(rt.table_get(child, key).unwrap(), Some(own));
        assert_eq!(rt.table_get(parent, key).unwrap(), Some(inherited));

        assert_eq!(rt.table_delete(child, key).unwrap(), Some(own));
        assert_eq!(rt.table_get(child, key).unwrap(), Some(inherited));
        assert_eq!(rt.table_delete(child, key).unwrap(), None);
    }

    #[test]
    fn prototype_cycle_ends_as_absent() {
        let mut rt = runtime();
        let a = rt.table_create(2, None).unwrap();
        let b = rt.table_create(2, Some(a)).unwrap();
        rt.table_set_prototype(a, Some(b)).unwrap();
        let key = rt.intern(b"missing").unwrap();
        assert_eq!(rt.table_get(a, key).unwrap(), None);
        assert_eq!(rt.table_get(b, key).unwrap(), None);
    }

    #[test]
    fn delete_keeps_the_rest_of_the_cluster_reachable() {
        let mut rt = runtime();
        let table = rt.table_create(64, None).unwrap();
        let keys: Vec<_> = (0..20).map(|n| rt.integer(n).unwrap()).collect();
        for &key in &keys {
            rt.table_set(table, key, key).unwrap();
        }
        for &key in keys.iter().step_by(3) {
            assert_eq!(rt.table_delete(table, key).unwrap(), Some(key));
        }
        for (n, &key) in keys.iter().enumerate() {
            let expected = (n % 3 != 0).then_some(key);
            assert_eq!(rt.table_get(table, key).unwrap(), expected, "key {n}");
        }
        assert_eq!(rt.table_len(table).unwrap(), 13);
        assert_eq!(rt.table_entries(table).unwrap().len(), 13);
    }

    #[test]
    fn wrong_variants_are_rejected() {
        let mut rt = runtime();
        let not_a_table = rt.integer(0).unwrap();
        let key = rt.integer(1).unwrap();
        assert_eq!(
            rt.table_get(not_a_table, key),
            Err(MemoryError::TypeMismatch {
                expected: Tag::Table,
                found: Tag::Integer,
            })
        );
        assert!(matches!(
            rt.table_create(2, Some(not_a_table)),
            Err(MemoryError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn entries_and_keys_survive_collection() {
        let mut rt = runtime();
        let table = rt.table_create(2, None).unwrap();
        rt.push_temporary_root(table).unwrap();
        let key = rt.text("k").unwrap();
        let value = rt.list_from(&[key, key]).unwrap();
        rt.table_set(table, key, value).unwrap();
        rt.collect();
        assert!(rt.is_live(key) && rt.is_live(value));
        assert_eq!(rt.table_entries(table).unwrap(), vec![(key, value)]);
    }
}
