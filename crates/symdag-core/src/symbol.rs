//! Symbol and function interning tables.
//!
//! Symbols and function names are interned to dense 32-bit ids so node
//! content stays small and comparisons are integer comparisons.

use hashbrown::HashMap;
use smallvec::SmallVec;

/// Unique identifier for a symbol.
pub type SymbolId = u32;

/// Unique identifier for a function name.
pub type FunctionId = u32;

/// The declared kind of a symbol.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
pub enum SymbolKind {
    /// An unconstrained real quantity.
    #[default]
    Real,
    /// A strictly positive real quantity.
    Positive,
    /// An integer quantity.
    Integer,
}

/// Identity and attributes of an interned symbol.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct SymbolInfo {
    /// The symbol's name.
    pub name: String,
    /// Index arguments, e.g. `x[0, 2]`.
    pub indices: SmallVec<[u32; 2]>,
    /// The declared kind.
    pub kind: SymbolKind,
}

impl SymbolInfo {
    /// A plain real symbol with no indices.
    #[must_use]
    pub fn plain(name: &str) -> Self {
        Self {
            name: name.to_string(),
            indices: SmallVec::new(),
            kind: SymbolKind::Real,
        }
    }
}

/// Interning table for symbols.
#[derive(Debug, Default)]
pub struct SymbolTable {
    map: HashMap<SymbolInfo, SymbolId>,
    infos: Vec<SymbolInfo>,
}

impl SymbolTable {
    /// Creates a new empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns a symbol, returning its unique id.
    pub fn intern(&mut self, info: SymbolInfo) -> SymbolId {
        if let Some(&id) = self.map.get(&info) {
            return id;
        }

        let id = u32::try_from(self.infos.len()).expect("symbol table overflow");
        self.map.insert(info.clone(), id);
        self.infos.push(info);
        id
    }

    /// Gets a symbol's identity by id.
    #[must_use]
    pub fn get(&self, id: SymbolId) -> Option<&SymbolInfo> {
        self.infos.get(id as usize)
    }

    /// Number of interned symbols.
    #[must_use]
    pub fn len(&self) -> usize {
        self.infos.len()
    }

    /// Returns true if no symbols have been interned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }
}

/// Interning table for function names.
#[derive(Debug, Default)]
pub struct FunctionTable {
    map: HashMap<String, FunctionId>,
    names: Vec<String>,
}

impl FunctionTable {
    /// Creates a new empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns a function name, returning its unique id.
    pub fn intern(&mut self, name: &str) -> FunctionId {
        if let Some(&id) = self.map.get(name) {
            return id;
        }

        let id = u32::try_from(self.names.len()).expect("function table overflow");
        self.map.insert(name.to_string(), id);
        self.names.push(name.to_string());
        id
    }

    /// Gets a function's name by id.
    #[must_use]
    pub fn name(&self, id: FunctionId) -> Option<&str> {
        self.names.get(id as usize).map(String::as_str)
    }

    /// Number of interned names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Returns true if no names have been interned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Built-in function identifiers.
///
/// These names are interned by `Context::new` in this exact order, so
/// the constants below are valid in every context.
pub mod functions {
    use super::FunctionId;

    /// Sine.
    pub const SIN: FunctionId = 0;
    /// Cosine.
    pub const COS: FunctionId = 1;
    /// Tangent.
    pub const TAN: FunctionId = 2;
    /// Square root.
    pub const SQRT: FunctionId = 3;
    /// Absolute value.
    pub const ABS: FunctionId = 4;

    /// Built-in names in id order.
    pub const NAMES: [&str; 5] = ["sin", "cos", "tan", "sqrt", "abs"];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_intern() {
        let mut table = SymbolTable::new();

        let x = table.intern(SymbolInfo::plain("x"));
        let y = table.intern(SymbolInfo::plain("y"));
        let x2 = table.intern(SymbolInfo::plain("x"));

        assert_eq!(x, x2);
        assert_ne!(x, y);
        assert_eq!(table.get(x).map(|i| i.name.as_str()), Some("x"));
    }

    #[test]
    fn test_indexed_symbols_distinct() {
        let mut table = SymbolTable::new();

        let plain = table.intern(SymbolInfo::plain("x"));
        let indexed = table.intern(SymbolInfo {
            name: "x".to_string(),
            indices: smallvec::smallvec![0],
            kind: SymbolKind::Real,
        });

        assert_ne!(plain, indexed);
    }

    #[test]
    fn test_function_intern() {
        let mut table = FunctionTable::new();

        for name in functions::NAMES {
            table.intern(name);
        }

        assert_eq!(table.name(functions::SIN), Some("sin"));
        assert_eq!(table.name(functions::ABS), Some("abs"));
        assert_eq!(table.intern("sin"), functions::SIN);
    }
}
