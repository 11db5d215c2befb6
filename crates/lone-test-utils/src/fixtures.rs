//! Object-graph fixtures.
//!
//! Each builder returns the cells it created so tests can root, drop or
//! inspect them. Nothing here pins its result; push a temporary root if a
//! collection may run before the caller is done.

use lone_core::CellRef;
use lone_heap::{MemoryError, Runtime};

/// A proper list of integer cells holding `values`.
pub fn integer_list(rt: &mut Runtime, values: &[i64]) -> Result<CellRef, MemoryError> {
    let mut items = Vec::with_capacity(values.len());
    for &value in values {
        let cell = rt.integer(value)?;
        rt.push_temporary_root(cell)?;
        items.push(cell);
    }
    let list = rt.list_from(&items);
    rt.pop_temporary_roots(items.len());
    list
}

/// Integer values of a proper list, in order.
pub fn list_integers(rt: &Runtime, mut list: CellRef) -> Result<Vec<i64>, MemoryError> {
    let mut values = Vec::new();
    while list != rt.nil() {
        values.push(rt.as_integer(rt.first(list)?)?);
        list = rt.rest(list)?;
    }
    Ok(values)
}

/// A chain of `depth` tables, each the prototype of the next. Returns them
/// root first; the last one inherits from all the others.
pub fn table_chain(rt: &mut Runtime, depth: usize) -> Result<Vec<CellRef>, MemoryError> {
    let mut chain: Vec<CellRef> = Vec::with_capacity(depth);
    for _ in 0..depth {
        let table = rt.table_create(4, chain.last().copied())?;
        rt.push_temporary_root(table)?;
        chain.push(table);
    }
    rt.pop_temporary_roots(chain.len());
    Ok(chain)
}

/// `count` unreachable cells: texts, pairs and vectors in rotation, so a
/// collection has both cells and buffers to reclaim.
pub fn garbage(rt: &mut Runtime, count: usize) -> Result<Vec<CellRef>, MemoryError> {
    let mut cells = Vec::with_capacity(count);
    for n in 0..count {
        let cell = match n % 3 {
            0 => rt.text(&format!("garbage-{n}"))?,
            1 => {
                let nil = rt.nil();
                rt.list(nil, nil)?
            }
            _ => {
                let nil = rt.nil();
                rt.vector_from(&[nil, nil, nil])?
            }
        };
        cells.push(cell);
    }
    Ok(cells)
}

/// A circular list of `len` integer pairs whose last tail points back at
/// the head.
pub fn cyclic_list(rt: &mut Runtime, len: usize) -> Result<CellRef, MemoryError> {
    assert!(len > 0, "a cycle needs at least one pair");
    let values: Vec<i64> = (0..len as i64).collect();
    let head = integer_list(rt, &values)?;
    let mut last = head;
    for _ in 1..len {
        last = rt.rest(last)?;
    }
    rt.set_rest(last, head)?;
    Ok(head)
}
