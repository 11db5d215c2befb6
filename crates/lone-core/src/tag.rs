//! Value cell variants.

use std::fmt;

/// The variant held by a value cell.
///
/// Stored in the low byte of a cell's header word. The discriminants are
/// part of the hashing scheme (the tag byte is hashed ahead of a key's
/// contents), so they must not be renumbered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Tag {
    /// The empty value. Also the state of a freshly acquired cell.
    Nil = 0,
    /// A signed 64-bit integer.
    Integer = 1,
    /// An opaque native address.
    Pointer = 2,
    /// A symbol name, usually interned.
    Symbol = 3,
    /// UTF-8 text.
    Text = 4,
    /// Raw bytes.
    Bytes = 5,
    /// A pair of `first` and `rest` references.
    List = 6,
    /// A growable array of references.
    Vector = 7,
    /// An open-addressed hash table with an optional prototype.
    Table = 8,
    /// A module: name, environment and exports.
    Module = 9,
    /// A closure: arguments, code and defining environment.
    Function = 10,
    /// A native primitive with a closure value.
    Primitive = 11,
}

impl Tag {
    /// Every tag, in discriminant order.
    pub const ALL: [Tag; 12] = [
        Tag::Nil,
        Tag::Integer,
        Tag::Pointer,
        Tag::Symbol,
        Tag::Text,
        Tag::Bytes,
        Tag::List,
        Tag::Vector,
        Tag::Table,
        Tag::Module,
        Tag::Function,
        Tag::Primitive,
    ];

    /// Decode a header byte. Returns `None` for unknown discriminants.
    pub fn from_byte(byte: u8) -> Option<Tag> {
        Self::ALL.get(usize::from(byte)).copied()
    }

    /// The header byte for this tag.
    pub fn to_byte(self) -> u8 {
        self as u8
    }

    /// Whether cells of this tag hold references to other cells.
    pub fn is_composite(self) -> bool {
        matches!(
            self,
            Tag::List | Tag::Vector | Tag::Table | Tag::Module | Tag::Function | Tag::Primitive
        )
    }

    /// Whether cells of this tag own a byte buffer in the arena.
    pub fn holds_bytes(self) -> bool {
        matches!(self, Tag::Symbol | Tag::Text | Tag::Bytes)
    }

    /// Lower-case name used in diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            Tag::Nil => "nil",
            Tag::Integer => "integer",
            Tag::Pointer => "pointer",
            Tag::Symbol => "symbol",
            Tag::Text => "text",
            Tag::Bytes => "bytes",
            Tag::List => "list",
            Tag::Vector => "vector",
            Tag::Table => "table",
            Tag::Module => "module",
            Tag::Function => "function",
            Tag::Primitive => "primitive",
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
