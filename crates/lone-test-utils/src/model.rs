//! Reference model of table semantics.
//!
//! [`TableModel`] is an insertion-ordered map from plain Rust keys to
//! integers. Tests drive a real table and the model with the same
//! operations and compare the results.

use indexmap::IndexMap;
use lone_core::CellRef;
use lone_heap::{MemoryError, Runtime};

/// A key the model can mirror as a cell.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ModelKey {
    Integer(i64),
    Text(String),
    Symbol(String),
    /// A proper list of integers.
    List(Vec<i64>),
}

impl ModelKey {
    /// Build a fresh cell equal to this key. Symbols are interned.
    pub fn to_cell(&self, rt: &mut Runtime) -> Result<CellRef, MemoryError> {
        match self {
            ModelKey::Integer(n) => rt.integer(*n),
            ModelKey::Text(text) => rt.text(text),
            ModelKey::Symbol(name) => rt.intern_str(name),
            ModelKey::List(values) => crate::fixtures::integer_list(rt, values),
        }
    }
}

/// Expected contents of one table.
#[derive(Clone, Debug, Default)]
pub struct TableModel {
    entries: IndexMap<ModelKey, i64>,
}

impl TableModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the previous value.
    pub fn set(&mut self, key: ModelKey, value: i64) -> Option<i64> {
        self.entries.insert(key, value)
    }

    pub fn get(&self, key: &ModelKey) -> Option<i64> {
        self.entries.get(key).copied()
    }

    /// Returns the removed value.
    pub fn delete(&mut self, key: &ModelKey) -> Option<i64> {
        self.entries.shift_remove(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ModelKey, i64)> {
        self.entries.iter().map(|(k, &v)| (k, v))
    }
}
