//! Integration tests: end-to-end scenarios through the public runtime API.

use lone_heap::{MemoryError, Runtime, RuntimeConfig, Value};
use lone_test_utils::fixtures::{cyclic_list, garbage, integer_list, list_integers, table_chain};
use lone_test_utils::{init_tracing, small_runtime};

// ── Tables ──────────────────────────────────────────────────────────

#[test]
fn fifth_insert_into_capacity_eight_rehashes_first() {
    init_tracing();
    let mut rt = small_runtime(64, 64 * 1024);
    let table = rt.table_create(8, None).unwrap();
    rt.push_temporary_root(table).unwrap();

    let keys: Vec<_> = ["a", "b", "c", "d", "e"]
        .iter()
        .map(|name| rt.intern_str(name).unwrap())
        .collect();
    for (n, &key) in keys.iter().take(4).enumerate() {
        let value = rt.integer(n as i64).unwrap();
        rt.table_set(table, key, value).unwrap();
    }
    assert_eq!(rt.table_capacity(table).unwrap(), 8);

    let value = rt.integer(4).unwrap();
    rt.table_set(table, keys[4], value).unwrap();
    assert!(rt.table_capacity(table).unwrap() >= 16);
    assert_eq!(rt.table_len(table).unwrap(), 5);

    for (n, &key) in keys.iter().enumerate() {
        let found = rt.table_get(table, key).unwrap().unwrap();
        assert_eq!(rt.as_integer(found).unwrap(), n as i64);
    }
    rt.arena().verify().unwrap();
}

#[test]
fn environments_resolve_through_three_levels() {
    let mut rt = small_runtime(64, 64 * 1024);
    let chain = table_chain(&mut rt, 3).unwrap();
    let leaf = chain[2];
    rt.push_temporary_root(leaf).unwrap();

    let x = rt.intern(b"x").unwrap();
    let outer = rt.integer(1).unwrap();
    let inner = rt.integer(2).unwrap();
    rt.table_set(chain[0], x, outer).unwrap();
    assert_eq!(rt.table_get(leaf, x).unwrap(), Some(outer));

    rt.table_set(chain[1], x, inner).unwrap();
    assert_eq!(rt.table_get(leaf, x).unwrap(), Some(inner));
    assert_eq!(rt.table_len(leaf).unwrap(), 0);

    // Only the leaf is pinned; the chain stays alive through prototypes.
    rt.collect();
    assert!(chain.iter().all(|&t| rt.is_live(t)));
    assert_eq!(rt.table_get(leaf, x).unwrap(), Some(inner));
}

#[test]
fn module_bindings_see_top_level_definitions() {
    let mut rt = small_runtime(64, 64 * 1024);
    let top = rt.top_level_environment();
    let name = rt.intern(b"print").unwrap();
    let primitive = rt
        .primitive_create(name, lone_core::PrimitiveId(0), rt.nil(), 0)
        .unwrap();
    rt.table_set(top, name, primitive).unwrap();

    let module_name = rt.intern(b"user").unwrap();
    let module = rt.module_create(module_name).unwrap();
    let registry = rt.loaded_modules();
    rt.table_set(registry, module_name, module).unwrap();

    rt.collect();
    let environment = rt.module_environment(module).unwrap();
    assert_eq!(rt.table_get(environment, name).unwrap(), Some(primitive));
    assert_eq!(rt.table_get(registry, module_name).unwrap(), Some(module));
}

// ── Heaps and collection ────────────────────────────────────────────

#[test]
fn runtime_heaps_grow_then_shrink_back() {
    let mut rt = small_runtime(8, 64 * 1024);
    let first = rt.heaps().heap_count();
    let cells = garbage(&mut rt, 60).unwrap();
    assert!(rt.heaps().heap_count() > first);

    let stats = rt.collect();
    assert!(stats.freed_cells >= cells.len());
    assert!(stats.released_heaps > 0);
    assert_eq!(rt.heaps().heap_count(), first);
    assert!(cells.iter().all(|&c| !rt.is_live(c)));
    rt.arena().verify().unwrap();
}

#[test]
fn freed_cell_is_reused_before_the_heap_list_grows() {
    let mut rt = small_runtime(16, 64 * 1024);
    let mut kept = Vec::new();
    while rt.heaps().live_cells(rt.arena()) < rt.heaps().total_cells() {
        let cell = rt.integer(kept.len() as i64).unwrap();
        rt.push_temporary_root(cell).unwrap();
        kept.push(cell);
    }
    let heaps = rt.heaps().heap_count();

    // Drop exactly the most recent cell.
    let dropped = kept.pop().unwrap();
    rt.pop_temporary_roots(1);
    rt.collect();
    assert!(!rt.is_live(dropped));

    let reused = rt.integer(-1).unwrap();
    assert_eq!(reused, dropped);
    assert_eq!(rt.heaps().heap_count(), heaps);
}

#[test]
fn cycles_are_reclaimed_once_unreachable() {
    let mut rt = small_runtime(32, 64 * 1024);
    let ring = cyclic_list(&mut rt, 5).unwrap();
    rt.push_temporary_root(ring).unwrap();
    rt.collect();
    assert!(rt.is_live(ring));

    rt.pop_temporary_roots(1);
    let stats = rt.collect();
    assert!(!rt.is_live(ring));
    assert_eq!(stats.freed_cells, 10);
}

#[test]
fn exhaustion_reclaims_garbage_and_retries() {
    let mut rt = small_runtime(16, 32 * 1024);
    let list = integer_list(&mut rt, &[1, 2, 3]).unwrap();
    rt.push_temporary_root(list).unwrap();

    // Far more text than the region holds at once; all of it is garbage.
    for n in 0..200 {
        rt.text(&"z".repeat(512 + n)).unwrap();
    }
    assert!(rt.gc_stats().cycles > 0);
    assert_eq!(list_integers(&rt, list).unwrap(), vec![1, 2, 3]);
    rt.arena().verify().unwrap();
}

/// Fill every free block with unreachable byte cells, so the next arena
/// allocation can only succeed after a collection.
fn crowd_arena(rt: &mut Runtime) {
    let cycles = rt.gc_stats().cycles;
    loop {
        let free = rt.arena().largest_free_block();
        if free == 0 {
            break;
        }
        rt.bytes(&vec![0xee; free]).unwrap();
    }
    assert_eq!(rt.gc_stats().cycles, cycles, "crowding must not collect");
}

#[test]
fn table_growth_keeps_unpinned_key_and_value() {
    let mut rt = small_runtime(64, 16 * 1024);
    let table = rt.table_create(8, None).unwrap();
    rt.push_temporary_root(table).unwrap();
    for n in 0..4 {
        let key = rt.integer(n).unwrap();
        let value = rt.integer(n * 10).unwrap();
        rt.table_set(table, key, value).unwrap();
    }
    crowd_arena(&mut rt);

    let key = rt.integer(100).unwrap();
    let value = rt.integer(1000).unwrap();
    let cycles = rt.gc_stats().cycles;
    rt.table_set(table, key, value).unwrap();

    assert_eq!(rt.gc_stats().cycles, cycles + 1);
    assert_eq!(rt.table_capacity(table).unwrap(), 16);
    assert!(rt.is_live(key) && rt.is_live(value));
    assert_eq!(rt.table_get(table, key).unwrap(), Some(value));
    assert_eq!(rt.as_integer(value).unwrap(), 1000);
    assert_eq!(rt.table_len(table).unwrap(), 5);
    rt.arena().verify().unwrap();
}

#[test]
fn vector_growth_keeps_unpinned_value() {
    let mut rt = small_runtime(64, 16 * 1024);
    let vector = rt.vector_create(4).unwrap();
    rt.push_temporary_root(vector).unwrap();
    for n in 0..4 {
        let element = rt.integer(n).unwrap();
        rt.vector_push(vector, element).unwrap();
    }
    crowd_arena(&mut rt);

    let value = rt.integer(42).unwrap();
    let cycles = rt.gc_stats().cycles;
    rt.vector_set(vector, 4, value).unwrap();

    assert_eq!(rt.gc_stats().cycles, cycles + 1);
    assert!(rt.is_live(value));
    assert_eq!(rt.vector_get(vector, 4).unwrap(), value);
    assert_eq!(rt.as_integer(value).unwrap(), 42);
    for n in 0..4 {
        let element = rt.vector_get(vector, n).unwrap();
        assert_eq!(rt.as_integer(element).unwrap(), n as i64);
    }
    rt.arena().verify().unwrap();
}

#[test]
fn heap_growth_keeps_unpinned_list_parts() {
    let mut rt = small_runtime(64, 16 * 1024);
    crowd_arena(&mut rt);
    let first = rt.integer(7).unwrap();
    let rest = rt.integer(8).unwrap();
    while rt.heaps().live_cells(rt.arena()) < rt.heaps().total_cells() {
        rt.integer(0).unwrap();
    }

    let cycles = rt.gc_stats().cycles;
    let pair = rt.list(first, rest).unwrap();

    assert_eq!(rt.gc_stats().cycles, cycles + 1);
    assert!(rt.is_live(first) && rt.is_live(rest));
    assert_eq!(rt.first(pair).unwrap(), first);
    assert_eq!(rt.rest(pair).unwrap(), rest);
    assert_eq!(rt.as_integer(first).unwrap(), 7);
    assert_eq!(rt.as_integer(rest).unwrap(), 8);
    rt.arena().verify().unwrap();
}

#[test]
fn live_data_larger_than_the_region_is_fatal() {
    let mut rt = small_runtime(16, 32 * 1024);
    let vector = rt.vector_create(0).unwrap();
    rt.push_temporary_root(vector).unwrap();
    let result = (0..).try_for_each(|n| {
        let text = rt.text(&"y".repeat(256))?;
        rt.vector_set(vector, n, text)
    });
    assert!(matches!(result, Err(MemoryError::Exhausted { .. })));
}

#[test]
fn dead_handles_are_rejected_everywhere() {
    let mut rt = small_runtime(16, 64 * 1024);
    let table = rt.table_create(2, None).unwrap();
    let key = rt.integer(1).unwrap();
    rt.collect();
    let dead = MemoryError::DeadCell { cell: table };

    assert_eq!(rt.value(table), Err(dead.clone()));
    assert_eq!(rt.table_len(table), Err(dead.clone()));
    assert_eq!(rt.vector_len(table), Err(dead));
    let nil = rt.nil();
    assert_eq!(
        rt.table_get(rt.symbol_table(), key),
        Err(MemoryError::DeadCell { cell: key })
    );
    assert!(matches!(rt.value(nil), Ok(Value::Nil)));
}

#[test]
fn caller_supplied_region_hosts_the_runtime() {
    let region = vec![0u8; 48 * 1024].into_boxed_slice();
    let mut rt = Runtime::with_region(
        region,
        RuntimeConfig {
            heap_capacity: 32,
            ..RuntimeConfig::default()
        },
    )
    .unwrap();
    let text = rt.text("borrowed region").unwrap();
    assert_eq!(rt.byte_contents(text).unwrap(), b"borrowed region");
}
