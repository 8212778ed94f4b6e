//! The expression context.
//!
//! A `Context` owns the term store and the symbol/function tables.
//! Everything the engine once would have kept in global singletons
//! lives here, so lifetimes and test isolation are explicit: two
//! contexts share nothing.

use smallvec::SmallVec;

use crate::handle::{TermId, WeakTerm};
use crate::node::Term;
use crate::store::Store;
use crate::symbol::{functions, FunctionId, FunctionTable, SymbolId, SymbolInfo, SymbolKind, SymbolTable};
use crate::value::Value;

/// Owns the term store and all interning tables.
#[derive(Debug)]
pub struct Context {
    store: Store,
    symbols: SymbolTable,
    functions: FunctionTable,
    zero: TermId,
    one: TermId,
    neg_one: TermId,
    nan: TermId,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    /// Creates a context with the canonical scalars pre-interned and
    /// the built-in function names registered.
    #[must_use]
    pub fn new() -> Self {
        let mut store = Store::new();
        let zero = store.intern(Term::Scalar(Value::ZERO));
        let one = store.intern(Term::Scalar(Value::ONE));
        let neg_one = store.intern(Term::Scalar(Value::NEG_ONE));
        let nan = store.intern(Term::Scalar(Value::NAN));

        let mut function_table = FunctionTable::new();
        for (expect, name) in functions::NAMES.iter().enumerate() {
            let id = function_table.intern(name);
            debug_assert_eq!(id as usize, expect);
        }

        Self {
            store,
            symbols: SymbolTable::new(),
            functions: function_table,
            zero,
            one,
            neg_one,
            nan,
        }
    }

    // === Constructors (each returns an owned reference) ===

    /// Interns a scalar term.
    pub fn scalar(&mut self, v: Value) -> TermId {
        self.store.intern(Term::Scalar(v))
    }

    /// Interns a plain real symbol by name.
    pub fn symbol(&mut self, name: &str) -> TermId {
        let id = self.symbols.intern(SymbolInfo::plain(name));
        self.store.intern(Term::Symbol(id))
    }

    /// Interns a symbol with indices and a kind.
    pub fn symbol_with(&mut self, name: &str, indices: &[u32], kind: SymbolKind) -> TermId {
        let id = self.symbols.intern(SymbolInfo {
            name: name.to_string(),
            indices: indices.iter().copied().collect(),
            kind,
        });
        self.store.intern(Term::Symbol(id))
    }

    /// Interns a function application over canonical arguments.
    ///
    /// Takes ownership of the argument references.
    pub fn function(&mut self, name: &str, args: SmallVec<[TermId; 2]>) -> TermId {
        let id = self.functions.intern(name);
        self.store.intern(Term::Function { id, args })
    }

    /// The canonical zero scalar (owned reference).
    pub fn zero(&mut self) -> TermId {
        self.store.retain(self.zero);
        self.zero
    }

    /// The canonical one scalar (owned reference).
    pub fn one(&mut self) -> TermId {
        self.store.retain(self.one);
        self.one
    }

    /// The canonical negative-one scalar (owned reference).
    pub fn neg_one(&mut self) -> TermId {
        self.store.retain(self.neg_one);
        self.neg_one
    }

    /// The canonical NaN scalar (owned reference).
    pub fn nan(&mut self) -> TermId {
        self.store.retain(self.nan);
        self.nan
    }

    // === Access ===

    /// Returns the node behind a handle.
    ///
    /// # Panics
    ///
    /// Panics if the handle is stale.
    #[must_use]
    pub fn term(&self, id: TermId) -> &Term {
        self.store.get(id)
    }

    /// Interns a prepared node descriptor directly.
    ///
    /// The descriptor transfers ownership of the child references it
    /// holds; see [`Store::intern`].
    pub fn intern(&mut self, node: Term) -> TermId {
        self.store.intern(node)
    }

    /// Acquires an additional reference.
    pub fn retain(&mut self, id: TermId) {
        self.store.retain(id);
    }

    /// Releases one reference. Returns destroyed tracked handles for
    /// cache purging.
    pub fn release(&mut self, id: TermId) -> SmallVec<[TermId; 2]> {
        self.store.release(id)
    }

    /// Current reference count of a term.
    #[must_use]
    pub fn refcount(&self, id: TermId) -> u32 {
        self.store.refcount(id)
    }

    /// Marks a node as tracked by an auxiliary cache.
    pub fn mark_tracked(&mut self, id: TermId) {
        self.store.mark_tracked(id);
    }

    /// Creates a weak handle.
    #[must_use]
    pub fn downgrade(&self, id: TermId) -> WeakTerm {
        self.store.downgrade(id)
    }

    /// Returns true if the weak handle's referent is still live.
    #[must_use]
    pub fn is_alive(&self, weak: WeakTerm) -> bool {
        self.store.is_alive(weak)
    }

    /// Upgrades a weak handle to an owned strong handle, if live.
    pub fn upgrade(&mut self, weak: WeakTerm) -> Option<TermId> {
        self.store.upgrade(weak)
    }

    /// Number of live nodes.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.store.live_count()
    }

    /// Looks up a symbol's identity.
    #[must_use]
    pub fn symbol_info(&self, id: SymbolId) -> Option<&SymbolInfo> {
        self.symbols.get(id)
    }

    /// Number of interned symbols (bitset width for symbol sets).
    #[must_use]
    pub fn symbol_count(&self) -> usize {
        self.symbols.len()
    }

    /// Looks up a function's name.
    #[must_use]
    pub fn function_name(&self, id: FunctionId) -> Option<&str> {
        self.functions.name(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cached_scalars() {
        let mut ctx = Context::new();

        let z1 = ctx.zero();
        let z2 = ctx.scalar(Value::ZERO);
        assert_eq!(z1, z2);

        let n1 = ctx.nan();
        let n2 = ctx.scalar(Value::new(f64::NAN));
        assert_eq!(n1, n2);
    }

    #[test]
    fn test_symbols_hash_cons() {
        let mut ctx = Context::new();

        let x1 = ctx.symbol("x");
        let x2 = ctx.symbol("x");
        let y = ctx.symbol("y");

        assert_eq!(x1, x2);
        assert_ne!(x1, y);
    }

    #[test]
    fn test_function_application() {
        let mut ctx = Context::new();

        let x = ctx.symbol("x");
        ctx.retain(x);
        let f1 = ctx.function("sin", smallvec::smallvec![x]);
        let x2 = ctx.symbol("x");
        let f2 = ctx.function("sin", smallvec::smallvec![x2]);

        assert_eq!(f1, f2);
    }
}
