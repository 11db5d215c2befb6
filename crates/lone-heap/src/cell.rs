//! Cell records and their decoded form.
//!
//! A cell is five little-endian words inside a heap's arena allocation:
//!
//! ```text
//! word 0   header: tag (bits 0-7) | live (bit 8) | marked (bit 9)
//! word 1-4 payload, interpreted per tag
//! ```
//!
//! | tag       | payload words                               |
//! |-----------|---------------------------------------------|
//! | integer   | value                                       |
//! | pointer   | address                                     |
//! | symbol, text, bytes | buffer, length, borrowed flag     |
//! | list      | first, rest                                 |
//! | vector    | buffer, count, capacity                     |
//! | table     | entries, capacity, count, prototype         |
//! | module    | name, environment, exports                  |
//! | function  | arguments, code, environment, flags         |
//! | primitive | name, closure, primitive id, flags          |
//!
//! References are stored as [`CellRef`] words and buffers as [`ArenaPtr`]
//! words; 0 means "none" for both. A dead cell has an all-zero record.

use lone_arena::ArenaPtr;
use lone_core::{CellRef, PrimitiveId, Tag};

/// Words per cell record.
pub const CELL_WORDS: usize = 5;

/// Bytes per cell record.
pub const CELL_BYTES: usize = CELL_WORDS * 8;

/// Words of payload following the header.
pub(crate) const PAYLOAD_WORDS: usize = CELL_WORDS - 1;

const TAG_MASK: u64 = 0xff;
const LIVE: u64 = 1 << 8;
const MARKED: u64 = 1 << 9;

/// Third payload word of a span cell whose buffer it does not own.
const BORROWED: u64 = 1;

/// Decoded cell header word.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CellHeader {
    /// Variant of the payload.
    pub tag: Tag,
    /// Whether the cell holds a value.
    pub live: bool,
    /// Reachability flag, set only during a collection.
    pub marked: bool,
}

impl CellHeader {
    /// Header of a dead cell.
    pub const DEAD: CellHeader = CellHeader {
        tag: Tag::Nil,
        live: false,
        marked: false,
    };

    /// Header of a freshly acquired cell.
    pub const FRESH: CellHeader = CellHeader {
        tag: Tag::Nil,
        live: true,
        marked: false,
    };

    pub(crate) fn encode(self) -> u64 {
        let mut word = u64::from(self.tag.to_byte());
        if self.live {
            word |= LIVE;
        }
        if self.marked {
            word |= MARKED;
        }
        word
    }

    /// Decode a header word. Returns `None` for an unknown tag byte.
    pub(crate) fn decode(word: u64) -> Option<CellHeader> {
        Some(CellHeader {
            tag: Tag::from_byte((word & TAG_MASK) as u8)?,
            live: word & LIVE != 0,
            marked: word & MARKED != 0,
        })
    }
}

/// The contents of a symbol, text or bytes cell.
///
/// Empty contents have no buffer. An owned buffer is freed when the cell
/// is swept; a borrowed one stays with whoever allocated it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ByteSpan {
    /// Backing allocation, if the contents are non-empty.
    pub buffer: Option<ArenaPtr>,
    /// Length of the contents in bytes.
    pub len: usize,
    /// Whether the cell frees `buffer` when it dies.
    pub owned: bool,
}

/// Storage of a vector cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VectorData {
    /// Array of `capacity` reference words, if any capacity was reserved.
    pub buffer: Option<ArenaPtr>,
    /// Number of elements in use.
    pub count: usize,
    /// Number of reference words the buffer holds.
    pub capacity: usize,
}

/// Storage of a table cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TableData {
    /// Array of `capacity` key/value word pairs.
    pub entries: ArenaPtr,
    /// Number of slots, a power of two.
    pub capacity: usize,
    /// Number of occupied slots.
    pub count: usize,
    /// Table consulted on a local miss.
    pub prototype: Option<CellRef>,
}

/// The decoded payload of a live cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Value {
    /// The empty value.
    Nil,
    /// A signed integer.
    Integer(i64),
    /// An opaque native address.
    Pointer(u64),
    /// A symbol name.
    Symbol(ByteSpan),
    /// UTF-8 text.
    Text(ByteSpan),
    /// Raw bytes.
    Bytes(ByteSpan),
    /// A pair.
    List {
        /// Head element.
        first: CellRef,
        /// Tail, usually another list or nil.
        rest: CellRef,
    },
    /// A growable array of references.
    Vector(VectorData),
    /// A hash table.
    Table(TableData),
    /// A module.
    Module {
        /// Module name.
        name: CellRef,
        /// Table of the module's bindings.
        environment: CellRef,
        /// Vector of exported symbols.
        exports: CellRef,
    },
    /// A closure.
    Function {
        /// Parameter list.
        arguments: CellRef,
        /// Body.
        code: CellRef,
        /// Defining environment.
        environment: CellRef,
        /// Evaluator flags, opaque to the memory core.
        flags: u64,
    },
    /// A native primitive.
    Primitive {
        /// Name for diagnostics.
        name: CellRef,
        /// Value passed back to the primitive on every call.
        closure: CellRef,
        /// Entry in the host's primitive table.
        function: PrimitiveId,
        /// Evaluator flags, opaque to the memory core.
        flags: u64,
    },
}

fn reference(word: u64) -> CellRef {
    CellRef::from_word(word).unwrap_or_else(|| panic!("cell payload holds non-reference {word:#x}"))
}

fn span(payload: &[u64; PAYLOAD_WORDS]) -> ByteSpan {
    ByteSpan {
        buffer: ArenaPtr::from_word(payload[0]),
        len: payload[1] as usize,
        owned: payload[2] != BORROWED,
    }
}

fn span_words(span: &ByteSpan) -> [u64; PAYLOAD_WORDS] {
    let borrowed = if span.owned { 0 } else { BORROWED };
    [
        span.buffer.map_or(0, ArenaPtr::to_word),
        span.len as u64,
        borrowed,
        0,
    ]
}

impl Value {
    /// The tag this value is stored under.
    pub fn tag(&self) -> Tag {
        match self {
            Value::Nil => Tag::Nil,
            Value::Integer(_) => Tag::Integer,
            Value::Pointer(_) => Tag::Pointer,
            Value::Symbol(_) => Tag::Symbol,
            Value::Text(_) => Tag::Text,
            Value::Bytes(_) => Tag::Bytes,
            Value::List { .. } => Tag::List,
            Value::Vector(_) => Tag::Vector,
            Value::Table(_) => Tag::Table,
            Value::Module { .. } => Tag::Module,
            Value::Function { .. } => Tag::Function,
            Value::Primitive { .. } => Tag::Primitive,
        }
    }

    /// The arena buffer this value owns exclusively, if any.
    pub fn owned_buffer(&self) -> Option<ArenaPtr> {
        match self {
            Value::Symbol(s) | Value::Text(s) | Value::Bytes(s) => {
                s.buffer.filter(|_| s.owned)
            }
            Value::Vector(v) => v.buffer,
            Value::Table(t) => Some(t.entries),
            _ => None,
        }
    }

    /// References held directly in the cell record. Vector elements and
    /// table entries live in the owned buffer and are not included.
    pub fn record_references(&self) -> impl Iterator<Item = CellRef> {
        let refs: [Option<CellRef>; 3] = match *self {
            Value::List { first, rest } => [Some(first), Some(rest), None],
            Value::Table(t) => [t.prototype, None, None],
            Value::Module {
                name,
                environment,
                exports,
            } => [Some(name), Some(environment), Some(exports)],
            Value::Function {
                arguments,
                code,
                environment,
                ..
            } => [Some(arguments), Some(code), Some(environment)],
            Value::Primitive { name, closure, .. } => [Some(name), Some(closure), None],
            _ => [None, None, None],
        };
        refs.into_iter().flatten()
    }

    pub(crate) fn encode(&self) -> [u64; PAYLOAD_WORDS] {
        match self {
            Value::Nil => [0; PAYLOAD_WORDS],
            Value::Integer(i) => [*i as u64, 0, 0, 0],
            Value::Pointer(p) => [*p, 0, 0, 0],
            Value::Symbol(s) | Value::Text(s) | Value::Bytes(s) => span_words(s),
            Value::List { first, rest } => [first.to_word(), rest.to_word(), 0, 0],
            Value::Vector(v) => [
                v.buffer.map_or(0, ArenaPtr::to_word),
                v.count as u64,
                v.capacity as u64,
                0,
            ],
            Value::Table(t) => [
                t.entries.to_word(),
                t.capacity as u64,
                t.count as u64,
                t.prototype.map_or(0, CellRef::to_word),
            ],
            Value::Module {
                name,
                environment,
                exports,
            } => [name.to_word(), environment.to_word(), exports.to_word(), 0],
            Value::Function {
                arguments,
                code,
                environment,
                flags,
            } => [
                arguments.to_word(),
                code.to_word(),
                environment.to_word(),
                *flags,
            ],
            Value::Primitive {
                name,
                closure,
                function,
                flags,
            } => [
                name.to_word(),
                closure.to_word(),
                u64::from(function.0),
                *flags,
            ],
        }
    }

    /// Decode a live cell's payload.
    ///
    /// # Panics
    ///
    /// Panics if a reference or buffer word required by `tag` is zero,
    /// which means the record was corrupted.
    pub(crate) fn decode(tag: Tag, payload: &[u64; PAYLOAD_WORDS]) -> Value {
        match tag {
            Tag::Nil => Value::Nil,
            Tag::Integer => Value::Integer(payload[0] as i64),
            Tag::Pointer => Value::Pointer(payload[0]),
            Tag::Symbol => Value::Symbol(span(payload)),
            Tag::Text => Value::Text(span(payload)),
            Tag::Bytes => Value::Bytes(span(payload)),
            Tag::List => Value::List {
                first: reference(payload[0]),
                rest: reference(payload[1]),
            },
            Tag::Vector => Value::Vector(VectorData {
                buffer: ArenaPtr::from_word(payload[0]),
                count: payload[1] as usize,
                capacity: payload[2] as usize,
            }),
            Tag::Table => Value::Table(TableData {
                entries: ArenaPtr::from_word(payload[0])
                    .unwrap_or_else(|| panic!("table cell without an entry array")),
                capacity: payload[1] as usize,
                count: payload[2] as usize,
                prototype: CellRef::from_word(payload[3]),
            }),
            Tag::Module => Value::Module {
                name: reference(payload[0]),
                environment: reference(payload[1]),
                exports: reference(payload[2]),
            },
            Tag::Function => Value::Function {
                arguments: reference(payload[0]),
                code: reference(payload[1]),
                environment: reference(payload[2]),
                flags: payload[3],
            },
            Tag::Primitive => Value::Primitive {
                name: reference(payload[0]),
                closure: reference(payload[1]),
                function: PrimitiveId(payload[2] as u32),
                flags: payload[3],
            },
        }
    }
}
