//! Key hashing and equality for tables.
//!
//! Both walk a key in the same pre-order: tag byte first, then leaf
//! contents, then list and vector elements. Every other composite is keyed
//! by identity. A walk visits at most [`KEY_BUDGET`] cells; past that,
//! hashing stops and equality falls back to identity, which keeps cyclic
//! keys finite while two equal keys still hash alike.

use lone_core::{CellRef, Fnv1a, Tag};
use smallvec::SmallVec;

use crate::cell::Value;
use crate::runtime::Runtime;

/// Cells visited per key before the walk gives up on structure.
const KEY_BUDGET: usize = 4096;

impl Runtime {
    fn key_value(&self, cell: CellRef) -> Value {
        self.heaps
            .load(&self.arena, cell)
            .unwrap_or_else(|| panic!("key reaches dead cell {cell}"))
    }

    /// Hash of `key` under the configured seed. `key` must be live.
    pub(crate) fn hash_value(&self, key: CellRef) -> u64 {
        let mut hasher = Fnv1a::with_seed(self.config.hash_seed);
        let mut pending: SmallVec<[CellRef; 16]> = SmallVec::new();
        pending.push(key);

        let mut visited = 0;
        while let Some(cell) = pending.pop() {
            visited += 1;
            if visited > KEY_BUDGET {
                break;
            }
            let value = self.key_value(cell);
            hasher.write_bytes(&[value.tag().to_byte()]);
            match value {
                Value::Nil => {}
                Value::Integer(n) => hasher.write_bytes(&n.to_le_bytes()),
                Value::Pointer(p) => hasher.write_bytes(&p.to_le_bytes()),
                Value::Symbol(span) | Value::Text(span) | Value::Bytes(span) => {
                    hasher.write_bytes(self.span_bytes(&span));
                }
                Value::List { first, rest } => {
                    pending.push(rest);
                    pending.push(first);
                }
                Value::Vector(data) => {
                    hasher.write_bytes(&(data.count as u64).to_le_bytes());
                    if let Some(buffer) = data.buffer {
                        for index in (0..data.count).rev() {
                            pending.push(self.element(buffer, index));
                        }
                    }
                }
                _ => hasher.write_bytes(&cell.to_word().to_le_bytes()),
            }
        }
        hasher.value()
    }

    /// Hash a symbol named `name` would have, without creating it.
    pub(crate) fn hash_symbol_name(&self, name: &[u8]) -> u64 {
        let mut hasher = Fnv1a::with_seed(self.config.hash_seed);
        hasher.write_bytes(&[Tag::Symbol.to_byte()]);
        hasher.write_bytes(name);
        hasher.value()
    }

    /// Key equality, consistent with [`hash_value`](Self::hash_value).
    pub(crate) fn values_equal(&self, a: CellRef, b: CellRef) -> bool {
        let mut pending: SmallVec<[(CellRef, CellRef); 16]> = SmallVec::new();
        pending.push((a, b));

        let mut visited = 0;
        while let Some((a, b)) = pending.pop() {
            if a == b {
                continue;
            }
            visited += 1;
            if visited > KEY_BUDGET {
                return false;
            }
            match (self.key_value(a), self.key_value(b)) {
                (Value::Nil, Value::Nil) => {}
                (Value::Integer(x), Value::Integer(y)) if x == y => {}
                (Value::Pointer(x), Value::Pointer(y)) if x == y => {}
                (Value::Symbol(x), Value::Symbol(y))
                | (Value::Text(x), Value::Text(y))
                | (Value::Bytes(x), Value::Bytes(y))
                    if self.span_bytes(&x) == self.span_bytes(&y) => {}
                (
                    Value::List {
                        first: first_a,
                        rest: rest_a,
                    },
                    Value::List {
                        first: first_b,
                        rest: rest_b,
                    },
                ) => {
                    pending.push((rest_a, rest_b));
                    pending.push((first_a, first_b));
                }
                (Value::Vector(x), Value::Vector(y)) if x.count == y.count => {
                    if let (Some(xs), Some(ys)) = (x.buffer, y.buffer) {
                        for index in (0..x.count).rev() {
                            pending.push((self.element(xs, index), self.element(ys, index)));
                        }
                    }
                }
                _ => return false,
            }
        }
        true
    }

    /// Whether symbol `cell` is named `name`.
    pub(crate) fn symbol_named(&self, cell: CellRef, name: &[u8]) -> bool {
        match self.key_value(cell) {
            Value::Symbol(span) => self.span_bytes(&span) == name,
            _ => false,
        }
    }

    fn element(&self, buffer: lone_arena::ArenaPtr, index: usize) -> CellRef {
        let word = self.arena.read_word(buffer, index);
        CellRef::from_word(word)
            .unwrap_or_else(|| panic!("vector element {index} holds {word:#x}"))
    }
}
