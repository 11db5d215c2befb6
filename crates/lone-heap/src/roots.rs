//! Named precise roots.
//!
//! The runtime keeps a fixed set of well-known cells alive across every
//! collection. [`ROOT_FIELDS`] is the immutable descriptor the collector
//! walks to enumerate them; adding a root means adding a field to [`Roots`]
//! and an entry to the descriptor.

use lone_core::CellRef;

/// Well-known cells every collection treats as live.
///
/// Fields are `None` only while the runtime is being initialized.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Roots {
    /// Table of interned symbols.
    pub symbol_table: Option<CellRef>,
    /// The nil constant.
    pub nil: Option<CellRef>,
    /// The interned `true` symbol.
    pub truth: Option<CellRef>,
    /// Registry of loaded modules.
    pub loaded_modules: Option<CellRef>,
    /// The module code runs in when no other module is active.
    pub root_module: Option<CellRef>,
    /// Environment every module environment inherits from.
    pub top_level_environment: Option<CellRef>,
    /// Vector of module search paths.
    pub module_path: Option<CellRef>,
}

/// One entry of the root descriptor.
#[derive(Clone, Copy, Debug)]
pub struct RootField {
    /// Name for diagnostics.
    pub name: &'static str,
    /// Reads the field from a [`Roots`].
    pub get: fn(&Roots) -> Option<CellRef>,
}

/// Descriptor of every named root, in marking order.
pub const ROOT_FIELDS: [RootField; 7] = [
    RootField {
        name: "symbol_table",
        get: |r| r.symbol_table,
    },
    RootField {
        name: "nil",
        get: |r| r.nil,
    },
    RootField {
        name: "truth",
        get: |r| r.truth,
    },
    RootField {
        name: "loaded_modules",
        get: |r| r.loaded_modules,
    },
    RootField {
        name: "root_module",
        get: |r| r.root_module,
    },
    RootField {
        name: "top_level_environment",
        get: |r| r.top_level_environment,
    },
    RootField {
        name: "module_path",
        get: |r| r.module_path,
    },
];

impl Roots {
    /// Every registered root, in descriptor order.
    pub fn iter(&self) -> impl Iterator<Item = CellRef> + '_ {
        ROOT_FIELDS.iter().filter_map(move |field| (field.get)(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lone_core::HeapId;

    #[test]
    fn descriptor_skips_unset_fields() {
        let nil = CellRef::new(HeapId(0), 0);
        let path = CellRef::new(HeapId(0), 6);
        let roots = Roots {
            nil: Some(nil),
            module_path: Some(path),
            ..Roots::default()
        };
        assert_eq!(roots.iter().collect::<Vec<_>>(), vec![nil, path]);
    }

    #[test]
    fn descriptor_names_are_unique() {
        let mut names: Vec<_> = ROOT_FIELDS.iter().map(|f| f.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), ROOT_FIELDS.len());
    }
}
