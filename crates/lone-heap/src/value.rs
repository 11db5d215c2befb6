//! Value constructors and accessors.
//!
//! Constructors check that every `CellRef` argument is live and pin those
//! arguments while they allocate, so a collection triggered halfway
//! through never frees an input.

use lone_arena::ArenaPtr;
use lone_core::{CellRef, PrimitiveId, Tag};

use crate::cell::{ByteSpan, Value, VectorData};
use crate::error::MemoryError;
use crate::runtime::Runtime;

/// Smallest capacity a vector grows to.
const MIN_VECTOR_CAPACITY: usize = 4;

const WORD_BYTES: usize = 8;

fn span_value(tag: Tag, span: ByteSpan) -> Value {
    match tag {
        Tag::Symbol => Value::Symbol(span),
        Tag::Text => Value::Text(span),
        _ => Value::Bytes(span),
    }
}

fn mismatch(expected: Tag, found: &Value) -> MemoryError {
    MemoryError::TypeMismatch {
        expected,
        found: found.tag(),
    }
}

impl Runtime {
    // ── Leaves ──────────────────────────────────────────────────

    /// A new integer cell.
    pub fn integer(&mut self, value: i64) -> Result<CellRef, MemoryError> {
        self.new_cell(Value::Integer(value))
    }

    /// A new pointer cell holding an opaque native address.
    pub fn pointer(&mut self, address: u64) -> Result<CellRef, MemoryError> {
        self.new_cell(Value::Pointer(address))
    }

    /// A new text cell with a copy of `text`.
    pub fn text(&mut self, text: &str) -> Result<CellRef, MemoryError> {
        self.byte_cell(Tag::Text, text.as_bytes())
    }

    /// A new bytes cell with a copy of `bytes`.
    pub fn bytes(&mut self, bytes: &[u8]) -> Result<CellRef, MemoryError> {
        self.byte_cell(Tag::Bytes, bytes)
    }

    /// A new, uninterned symbol. Two uninterned symbols with the same name
    /// are still equal as table keys.
    pub fn symbol(&mut self, name: &[u8]) -> Result<CellRef, MemoryError> {
        self.byte_cell(Tag::Symbol, name)
    }

    fn byte_cell(&mut self, tag: Tag, contents: &[u8]) -> Result<CellRef, MemoryError> {
        let buffer = if contents.is_empty() {
            None
        } else {
            let buffer = self.allocate(contents.len())?;
            self.arena
                .bytes_mut(buffer, contents.len())
                .copy_from_slice(contents);
            Some(buffer)
        };
        let span = ByteSpan {
            buffer,
            len: contents.len(),
            owned: true,
        };
        self.new_cell(span_value(tag, span))
            .inspect_err(|_| self.discard(buffer))
    }

    /// A new text cell that takes over `buffer`, whose first `len` bytes
    /// are the contents.
    ///
    /// `buffer` must come from [`allocate`](Self::allocate) and must not
    /// belong to another cell. The cell frees it when swept. If the cell
    /// cannot be created the buffer stays with the caller.
    pub fn text_from_buffer(
        &mut self,
        buffer: ArenaPtr,
        len: usize,
    ) -> Result<CellRef, MemoryError> {
        self.span_cell(Tag::Text, buffer, len, true)
    }

    /// A new bytes cell that takes over `buffer`. See
    /// [`text_from_buffer`](Self::text_from_buffer).
    pub fn bytes_from_buffer(
        &mut self,
        buffer: ArenaPtr,
        len: usize,
    ) -> Result<CellRef, MemoryError> {
        self.span_cell(Tag::Bytes, buffer, len, true)
    }

    /// A new text cell viewing the first `len` bytes of `buffer` without
    /// owning it. Sweeping the cell leaves the buffer allocated; the caller
    /// keeps it alive for as long as the cell is read and frees it with
    /// [`deallocate`](Self::deallocate).
    pub fn text_borrowing(
        &mut self,
        buffer: ArenaPtr,
        len: usize,
    ) -> Result<CellRef, MemoryError> {
        self.span_cell(Tag::Text, buffer, len, false)
    }

    /// A new bytes cell viewing `buffer` without owning it. See
    /// [`text_borrowing`](Self::text_borrowing).
    pub fn bytes_borrowing(
        &mut self,
        buffer: ArenaPtr,
        len: usize,
    ) -> Result<CellRef, MemoryError> {
        self.span_cell(Tag::Bytes, buffer, len, false)
    }

    fn span_cell(
        &mut self,
        tag: Tag,
        buffer: ArenaPtr,
        len: usize,
        owned: bool,
    ) -> Result<CellRef, MemoryError> {
        let usable = self.arena.usable_size(buffer)?;
        if len > usable {
            return Err(MemoryError::SpanTooLong { len, usable });
        }
        if let Some(cell) = self.buffer_owner(buffer) {
            return Err(MemoryError::BufferOwned { buffer, cell });
        }
        let span = ByteSpan {
            buffer: Some(buffer),
            len,
            owned,
        };
        self.new_cell(span_value(tag, span))
    }

    /// The symbol named `name`, creating and registering it in the symbol
    /// table on first use.
    pub fn intern(&mut self, name: &[u8]) -> Result<CellRef, MemoryError> {
        let table = self.symbol_table();
        if let Some(symbol) = self.find_symbol(table, name)? {
            return Ok(symbol);
        }
        let symbol = self.symbol(name)?;
        self.table_set(table, symbol, symbol)?;
        Ok(symbol)
    }

    /// [`intern`](Self::intern) for UTF-8 names.
    pub fn intern_str(&mut self, name: &str) -> Result<CellRef, MemoryError> {
        self.intern(name.as_bytes())
    }

    /// Contents of a symbol, text or bytes cell.
    pub fn byte_contents(&self, cell: CellRef) -> Result<&[u8], MemoryError> {
        match self.value(cell)? {
            Value::Symbol(span) | Value::Text(span) | Value::Bytes(span) => {
                Ok(self.span_bytes(&span))
            }
            other => Err(mismatch(Tag::Bytes, &other)),
        }
    }

    pub(crate) fn span_bytes(&self, span: &ByteSpan) -> &[u8] {
        match span.buffer {
            Some(buffer) => self.arena.bytes(buffer, span.len),
            None => &[],
        }
    }

    /// Value of an integer cell.
    pub fn as_integer(&self, cell: CellRef) -> Result<i64, MemoryError> {
        match self.value(cell)? {
            Value::Integer(n) => Ok(n),
            other => Err(mismatch(Tag::Integer, &other)),
        }
    }

    /// Address held by a pointer cell.
    pub fn as_pointer(&self, cell: CellRef) -> Result<u64, MemoryError> {
        match self.value(cell)? {
            Value::Pointer(p) => Ok(p),
            other => Err(mismatch(Tag::Pointer, &other)),
        }
    }

    // ── Lists ───────────────────────────────────────────────────

    /// A new pair.
    pub fn list(&mut self, first: CellRef, rest: CellRef) -> Result<CellRef, MemoryError> {
        self.new_cell(Value::List { first, rest })
    }

    /// A proper list of `items`, terminated by nil.
    pub fn list_from(&mut self, items: &[CellRef]) -> Result<CellRef, MemoryError> {
        self.with_temporary_roots(items, |rt| {
            let mut list = rt.nil();
            for &item in items.iter().rev() {
                list = rt.list(item, list)?;
            }
            Ok(list)
        })
    }

    fn list_parts(&self, list: CellRef) -> Result<(CellRef, CellRef), MemoryError> {
        match self.value(list)? {
            Value::List { first, rest } => Ok((first, rest)),
            other => Err(mismatch(Tag::List, &other)),
        }
    }

    /// Head of a pair.
    pub fn first(&self, list: CellRef) -> Result<CellRef, MemoryError> {
        Ok(self.list_parts(list)?.0)
    }

    /// Tail of a pair.
    pub fn rest(&self, list: CellRef) -> Result<CellRef, MemoryError> {
        Ok(self.list_parts(list)?.1)
    }

    /// Replace the head of a pair.
    pub fn set_first(&mut self, list: CellRef, first: CellRef) -> Result<(), MemoryError> {
        self.check_live(first)?;
        let (_, rest) = self.list_parts(list)?;
        self.heaps
            .store(&mut self.arena, list, &Value::List { first, rest });
        Ok(())
    }

    /// Replace the tail of a pair.
    pub fn set_rest(&mut self, list: CellRef, rest: CellRef) -> Result<(), MemoryError> {
        self.check_live(rest)?;
        let (first, _) = self.list_parts(list)?;
        self.heaps
            .store(&mut self.arena, list, &Value::List { first, rest });
        Ok(())
    }

    // ── Vectors ─────────────────────────────────────────────────

    /// A new empty vector with room for `capacity` elements.
    pub fn vector_create(&mut self, capacity: usize) -> Result<CellRef, MemoryError> {
        let buffer = if capacity == 0 {
            None
        } else {
            Some(self.allocate(capacity.saturating_mul(WORD_BYTES))?)
        };
        let data = VectorData {
            buffer,
            count: 0,
            capacity,
        };
        self.new_cell(Value::Vector(data))
            .inspect_err(|_| self.discard(buffer))
    }

    /// A new vector holding `items`.
    pub fn vector_from(&mut self, items: &[CellRef]) -> Result<CellRef, MemoryError> {
        self.with_temporary_roots(items, |rt| {
            let vector = rt.vector_create(items.len())?;
            let data = rt.vector_data(vector)?;
            if let Some(buffer) = data.buffer {
                for (index, item) in items.iter().enumerate() {
                    rt.arena.write_word(buffer, index, item.to_word());
                }
            }
            rt.store_vector(
                vector,
                VectorData {
                    count: items.len(),
                    ..data
                },
            );
            Ok(vector)
        })
    }

    pub(crate) fn vector_data(&self, vector: CellRef) -> Result<VectorData, MemoryError> {
        match self.value(vector)? {
            Value::Vector(data) => Ok(data),
            other => Err(mismatch(Tag::Vector, &other)),
        }
    }

    fn store_vector(&mut self, vector: CellRef, data: VectorData) {
        self.heaps
            .store(&mut self.arena, vector, &Value::Vector(data));
    }

    /// Number of elements.
    pub fn vector_len(&self, vector: CellRef) -> Result<usize, MemoryError> {
        Ok(self.vector_data(vector)?.count)
    }

    /// Element at `index`.
    pub fn vector_get(&self, vector: CellRef, index: usize) -> Result<CellRef, MemoryError> {
        let data = self.vector_data(vector)?;
        match data.buffer {
            Some(buffer) if index < data.count => {
                let word = self.arena.read_word(buffer, index);
                Ok(CellRef::from_word(word)
                    .unwrap_or_else(|| panic!("vector {vector} slot {index} holds {word:#x}")))
            }
            _ => Err(MemoryError::IndexOutOfBounds {
                index,
                len: data.count,
            }),
        }
    }

    /// Set the element at `index`, growing the vector as needed. Slots
    /// between the old length and `index` are filled with nil.
    pub fn vector_set(
        &mut self,
        vector: CellRef,
        index: usize,
        value: CellRef,
    ) -> Result<(), MemoryError> {
        self.with_temporary_roots(&[vector, value], |rt| {
            let mut data = rt.vector_data(vector)?;
            let Some(needed) = index.checked_add(1) else {
                return Err(MemoryError::IndexOutOfBounds {
                    index,
                    len: data.count,
                });
            };
            let buffer = match data.buffer {
                Some(buffer) if index < data.capacity => buffer,
                current => {
                    let capacity = needed
                        .max(data.capacity.saturating_mul(2))
                        .max(MIN_VECTOR_CAPACITY);
                    let bytes = capacity.saturating_mul(WORD_BYTES);
                    let grown = match current {
                        Some(buffer) => rt.resize(buffer, bytes)?,
                        None => rt.allocate(bytes)?,
                    };
                    data.buffer = Some(grown);
                    data.capacity = capacity;
                    rt.store_vector(vector, data);
                    grown
                }
            };

            let nil = rt.nil().to_word();
            for slot in data.count..index {
                rt.arena.write_word(buffer, slot, nil);
            }
            rt.arena.write_word(buffer, index, value.to_word());
            data.count = data.count.max(needed);
            rt.store_vector(vector, data);
            Ok(())
        })
    }

    /// Append `value`.
    pub fn vector_push(&mut self, vector: CellRef, value: CellRef) -> Result<(), MemoryError> {
        let len = self.vector_len(vector)?;
        self.vector_set(vector, len, value)
    }

    // ── Modules, functions, primitives ──────────────────────────

    /// A new module named `name`, with a fresh environment inheriting from
    /// the top-level environment and an empty exports vector.
    pub fn module_create(&mut self, name: CellRef) -> Result<CellRef, MemoryError> {
        self.with_temporary_roots(&[name], |rt| {
            let top = rt.top_level_environment();
            let environment = rt.table_create(rt.config.environment_capacity, Some(top))?;
            rt.with_temporary_roots(&[environment], |rt| {
                let exports = rt.vector_create(0)?;
                rt.new_cell(Value::Module {
                    name,
                    environment,
                    exports,
                })
            })
        })
    }

    fn module_parts(&self, module: CellRef) -> Result<[CellRef; 3], MemoryError> {
        match self.value(module)? {
            Value::Module {
                name,
                environment,
                exports,
            } => Ok([name, environment, exports]),
            other => Err(mismatch(Tag::Module, &other)),
        }
    }

    /// Name of a module.
    pub fn module_name(&self, module: CellRef) -> Result<CellRef, MemoryError> {
        Ok(self.module_parts(module)?[0])
    }

    /// Environment table of a module.
    pub fn module_environment(&self, module: CellRef) -> Result<CellRef, MemoryError> {
        Ok(self.module_parts(module)?[1])
    }

    /// Exports vector of a module.
    pub fn module_exports(&self, module: CellRef) -> Result<CellRef, MemoryError> {
        Ok(self.module_parts(module)?[2])
    }

    /// A new closure.
    pub fn function_create(
        &mut self,
        arguments: CellRef,
        code: CellRef,
        environment: CellRef,
        flags: u64,
    ) -> Result<CellRef, MemoryError> {
        self.new_cell(Value::Function {
            arguments,
            code,
            environment,
            flags,
        })
    }

    /// A new primitive bound to the host's `function`.
    pub fn primitive_create(
        &mut self,
        name: CellRef,
        function: PrimitiveId,
        closure: CellRef,
        flags: u64,
    ) -> Result<CellRef, MemoryError> {
        self.new_cell(Value::Primitive {
            name,
            closure,
            function,
            flags,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;

    fn runtime() -> Runtime {
        Runtime::new(RuntimeConfig {
            heap_capacity: 32,
            ..RuntimeConfig::new(64 * 1024)
        })
        .unwrap()
    }

    #[test]
    fn leaves_round_trip() {
        let mut rt = runtime();
        let n = rt.integer(-3).unwrap();
        let p = rt.pointer(0xdead_beef).unwrap();
        let t = rt.text("hello").unwrap();
        let b = rt.bytes(&[1, 2, 3]).unwrap();
        assert_eq!(rt.as_integer(n).unwrap(), -3);
        assert_eq!(rt.as_pointer(p).unwrap(), 0xdead_beef);
        assert_eq!(rt.byte_contents(t).unwrap(), b"hello");
        assert_eq!(rt.byte_contents(b).unwrap(), &[1, 2, 3]);
        assert_eq!(
            rt.as_integer(t),
            Err(MemoryError::TypeMismatch {
                expected: Tag::Integer,
                found: Tag::Text,
            })
        );
    }

    #[test]
    fn empty_text_owns_no_buffer() {
        let mut rt = runtime();
        let used = rt.arena().used_bytes();
        let empty = rt.text("").unwrap();
        assert_eq!(rt.arena().used_bytes(), used);
        assert_eq!(rt.byte_contents(empty).unwrap(), b"");
    }

    #[test]
    fn intern_returns_the_same_symbol() {
        let mut rt = runtime();
        let a = rt.intern(b"lambda").unwrap();
        let b = rt.intern_str("lambda").unwrap();
        let c = rt.intern(b"lambda!").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(rt.intern(b"true").unwrap(), rt.truth());
    }

    #[test]
    fn interned_symbols_survive_collection() {
        let mut rt = runtime();
        let symbol = rt.intern(b"kept").unwrap();
        let loose = rt.symbol(b"loose").unwrap();
        rt.collect();
        assert!(rt.is_live(symbol));
        assert!(!rt.is_live(loose));
        assert_eq!(rt.intern(b"kept").unwrap(), symbol);
    }

    #[test]
    fn list_from_builds_a_proper_list() {
        let mut rt = runtime();
        let items: Vec<_> = (1..=3).map(|n| rt.integer(n).unwrap()).collect();
        let list = rt.list_from(&items).unwrap();

        let mut cursor = list;
        let mut seen = Vec::new();
        while cursor != rt.nil() {
            seen.push(rt.as_integer(rt.first(cursor).unwrap()).unwrap());
            cursor = rt.rest(cursor).unwrap();
        }
        assert_eq!(seen, vec![1, 2, 3]);
        assert!(matches!(
            rt.first(rt.nil()),
            Err(MemoryError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn set_rest_can_close_a_cycle() {
        let mut rt = runtime();
        let one = rt.integer(1).unwrap();
        let nil = rt.nil();
        let pair = rt.list(one, nil).unwrap();
        rt.set_rest(pair, pair).unwrap();
        assert_eq!(rt.rest(pair).unwrap(), pair);

        rt.push_temporary_root(pair).unwrap();
        rt.collect();
        assert!(rt.is_live(pair) && rt.is_live(one));
        rt.pop_temporary_roots(1);
        rt.collect();
        assert!(!rt.is_live(pair) && !rt.is_live(one));
    }

    #[test]
    fn constructors_reject_dead_inputs() {
        let mut rt = runtime();
        let gone = rt.integer(1).unwrap();
        rt.collect();
        let nil = rt.nil();
        assert_eq!(
            rt.list(gone, nil),
            Err(MemoryError::DeadCell { cell: gone })
        );
        assert_eq!(
            rt.vector_from(&[nil, gone]),
            Err(MemoryError::DeadCell { cell: gone })
        );
    }

    #[test]
    fn vector_grows_with_nil_fill() {
        let mut rt = runtime();
        let v = rt.vector_create(0).unwrap();
        let x = rt.integer(9).unwrap();
        rt.vector_set(v, 5, x).unwrap();
        assert_eq!(rt.vector_len(v).unwrap(), 6);
        for index in 0..5 {
            assert_eq!(rt.vector_get(v, index).unwrap(), rt.nil());
        }
        assert_eq!(rt.vector_get(v, 5).unwrap(), x);
        assert_eq!(
            rt.vector_get(v, 6),
            Err(MemoryError::IndexOutOfBounds { index: 6, len: 6 })
        );
    }

    #[test]
    fn vector_set_at_the_last_index_is_out_of_bounds() {
        let mut rt = runtime();
        let v = rt.vector_create(0).unwrap();
        let x = rt.integer(1).unwrap();
        assert_eq!(
            rt.vector_set(v, usize::MAX, x),
            Err(MemoryError::IndexOutOfBounds {
                index: usize::MAX,
                len: 0,
            })
        );
        assert_eq!(rt.vector_len(v).unwrap(), 0);
    }

    #[test]
    fn adopted_buffer_is_freed_with_its_cell() {
        let mut rt = runtime();
        let baseline = rt.arena().live_allocations();
        let buffer = rt.allocate(16).unwrap();
        rt.arena.bytes_mut(buffer, 5).copy_from_slice(b"hello");

        let text = rt.text_from_buffer(buffer, 5).unwrap();
        assert_eq!(rt.byte_contents(text).unwrap(), b"hello");
        assert_eq!(rt.arena().live_allocations(), baseline + 1);

        let stats = rt.collect();
        assert!(!rt.is_live(text));
        assert_eq!(stats.freed_buffers, 1);
        assert_eq!(rt.arena().live_allocations(), baseline);
    }

    #[test]
    fn borrowed_buffer_outlives_its_cell() {
        let mut rt = runtime();
        let buffer = rt.allocate(8).unwrap();
        rt.arena.bytes_mut(buffer, 3).copy_from_slice(&[7, 8, 9]);

        let first = rt.bytes_borrowing(buffer, 3).unwrap();
        let second = rt.text_borrowing(buffer, 2).unwrap();
        assert_eq!(rt.byte_contents(first).unwrap(), &[7, 8, 9]);
        assert_eq!(rt.byte_contents(second).unwrap(), &[7, 8]);

        let stats = rt.collect();
        assert!(!rt.is_live(first) && !rt.is_live(second));
        assert_eq!(stats.freed_buffers, 0);
        assert_eq!(rt.arena.bytes(buffer, 3), &[7, 8, 9]);
        rt.deallocate(buffer).unwrap();
        rt.arena().verify().unwrap();
    }

    #[test]
    fn adopting_checks_the_buffer() {
        let mut rt = runtime();
        let buffer = rt.allocate(16).unwrap();
        let usable = rt.arena().usable_size(buffer).unwrap();
        assert_eq!(
            rt.bytes_from_buffer(buffer, usable + 1),
            Err(MemoryError::SpanTooLong {
                len: usable + 1,
                usable,
            })
        );

        let owner = rt.bytes_from_buffer(buffer, usable).unwrap();
        assert_eq!(
            rt.text_from_buffer(buffer, 4),
            Err(MemoryError::BufferOwned {
                buffer,
                cell: owner,
            })
        );
        assert_eq!(
            rt.bytes_borrowing(buffer, 4),
            Err(MemoryError::BufferOwned {
                buffer,
                cell: owner,
            })
        );
    }

    #[test]
    fn vector_push_preserves_elements_across_growth() {
        let mut rt = runtime();
        let v = rt.vector_create(1).unwrap();
        rt.push_temporary_root(v).unwrap();
        for n in 0..20 {
            let cell = rt.integer(n).unwrap();
            rt.vector_push(v, cell).unwrap();
        }
        rt.collect();
        assert_eq!(rt.vector_len(v).unwrap(), 20);
        for n in 0..20 {
            let cell = rt.vector_get(v, n as usize).unwrap();
            assert_eq!(rt.as_integer(cell).unwrap(), n);
        }
        rt.arena().verify().unwrap();
    }

    #[test]
    fn module_environment_inherits_top_level() {
        let mut rt = runtime();
        let name = rt.intern(b"math").unwrap();
        let module = rt.module_create(name).unwrap();
        let environment = rt.module_environment(module).unwrap();
        assert_eq!(rt.module_name(module).unwrap(), name);
        assert_eq!(
            rt.table_prototype(environment).unwrap(),
            Some(rt.top_level_environment())
        );
        assert_eq!(rt.vector_len(rt.module_exports(module).unwrap()).unwrap(), 0);
    }

    #[test]
    fn closures_keep_their_parts_alive() {
        let mut rt = runtime();
        let nil = rt.nil();
        let args = rt.list(nil, nil).unwrap();
        let code = rt.text("(+ a b)").unwrap();
        let environment = rt.table_create(4, None).unwrap();
        let function = rt.function_create(args, code, environment, 1).unwrap();
        let name = rt.intern(b"car").unwrap();
        let closure = rt.integer(0).unwrap();
        let primitive = rt
            .primitive_create(name, PrimitiveId(3), closure, 0)
            .unwrap();

        rt.push_temporary_root(function).unwrap();
        rt.push_temporary_root(primitive).unwrap();
        rt.collect();
        for cell in [args, code, environment, function, closure, primitive] {
            assert!(rt.is_live(cell), "{cell}");
        }
        match rt.value(primitive).unwrap() {
            Value::Primitive { function, .. } => assert_eq!(function, PrimitiveId(3)),
            other => panic!("unexpected {other:?}"),
        }
    }
}
