//! Canonical term node types.
//!
//! Every node stored in the arena is already in canonical form: Add and
//! Mult nodes are produced exclusively by the canonicalizer with sorted,
//! merged, reduced item lists. The mutable build variants live outside
//! the store entirely (see the canon crate).

use smallvec::SmallVec;

use crate::handle::TermId;
use crate::symbol::{FunctionId, SymbolId};
use crate::value::Value;

/// One weighted summand of a canonical Add: `coeff * term`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct AddItem {
    /// The scalar coefficient. Never zero.
    pub coeff: Value,
    /// The summand term. Never a Scalar or an Add.
    pub term: TermId,
}

/// One integer-power factor of a canonical Mult: `base ^ exp`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct IntPow {
    /// The integer exponent. Never zero.
    pub exp: i32,
    /// The base term. Never a Scalar or a Mult.
    pub base: TermId,
}

/// One real-power factor of a canonical Mult: `base ^ exp`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct RealPow {
    /// The non-integral exponent. Never zero, never an integer.
    pub exp: Value,
    /// The base term. Never a Scalar or a Mult.
    pub base: TermId,
}

/// A canonical weighted sum: `v0 + sum(coeff_i * term_i) + log(L)`.
///
/// Items are sorted ascending by term handle with unique terms and no
/// zero coefficients. The degenerate form `0 + 1*x` with no log is
/// forbidden; it collapses to `x` at construction.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct AddNode {
    /// The free scalar constant.
    pub v0: Value,
    /// The weighted items, sorted by term handle.
    pub items: SmallVec<[AddItem; 4]>,
    /// At most one logarithmic subterm: `+ log(L)`.
    pub log: Option<TermId>,
}

impl AddNode {
    /// Number of weighted items.
    #[must_use]
    pub fn size(&self) -> usize {
        self.items.len()
    }

    /// Coefficient of item `i`.
    ///
    /// # Panics
    ///
    /// Panics if `i` is out of range.
    #[must_use]
    pub fn coeff(&self, i: usize) -> Value {
        self.items[i].coeff
    }

    /// Term of item `i`.
    ///
    /// # Panics
    ///
    /// Panics if `i` is out of range.
    #[must_use]
    pub fn term(&self, i: usize) -> TermId {
        self.items[i].term
    }

    /// Returns true if a log subterm is present.
    #[must_use]
    pub fn has_log(&self) -> bool {
        self.log.is_some()
    }

    /// The log subterm's argument, if present.
    #[must_use]
    pub fn log_term(&self) -> Option<TermId> {
        self.log
    }
}

/// A canonical product of powers: `prod(b_i^e_i) * prod(c_j^r_j) * exp(A)`.
///
/// Both power tracks are sorted ascending by base handle with unique
/// bases and no zero exponents; real-track exponents are never integral
/// (those normalize into the integer track). Canonical products carry
/// no scalar multiplier — a scaled product is an Add item. The form
/// `x^1` alone is forbidden; it collapses to `x` at construction.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct MultNode {
    /// Integer-power factors, sorted by base handle.
    pub int_pows: SmallVec<[IntPow; 4]>,
    /// Real-power factors, sorted by base handle.
    pub real_pows: SmallVec<[RealPow; 2]>,
    /// At most one exponential factor: `* exp(A)`. If the argument is
    /// an Add, it has zero constant and no log.
    pub exp: Option<TermId>,
}

impl MultNode {
    /// Number of integer-power factors.
    #[must_use]
    pub fn isize(&self) -> usize {
        self.int_pows.len()
    }

    /// Number of real-power factors.
    #[must_use]
    pub fn rsize(&self) -> usize {
        self.real_pows.len()
    }

    /// Integer-power factor `i`.
    ///
    /// # Panics
    ///
    /// Panics if `i` is out of range.
    #[must_use]
    pub fn ipow(&self, i: usize) -> IntPow {
        self.int_pows[i]
    }

    /// Real-power factor `i`.
    ///
    /// # Panics
    ///
    /// Panics if `i` is out of range.
    #[must_use]
    pub fn rpow(&self, i: usize) -> RealPow {
        self.real_pows[i]
    }

    /// Returns true if an exponential factor is present.
    #[must_use]
    pub fn has_exp(&self) -> bool {
        self.exp.is_some()
    }

    /// The exponential factor's argument, if present.
    #[must_use]
    pub fn exp_arg(&self) -> Option<TermId> {
        self.exp
    }

    /// Total number of factors including the exponential one.
    #[must_use]
    pub fn factor_count(&self) -> usize {
        self.int_pows.len() + self.real_pows.len() + usize::from(self.exp.is_some())
    }
}

/// A term node stored in the arena.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum Term {
    /// An opaque scalar value.
    Scalar(Value),

    /// A named symbolic atom.
    Symbol(SymbolId),

    /// An opaque function application: `f(arg1, arg2, ...)`.
    Function {
        /// The interned function identity.
        id: FunctionId,
        /// The ordered canonical arguments.
        args: SmallVec<[TermId; 2]>,
    },

    /// A canonical weighted sum.
    Add(AddNode),

    /// A canonical product of powers.
    Mult(MultNode),
}

impl Term {
    /// Returns true if this node is an atom (no children).
    #[must_use]
    pub fn is_atom(&self) -> bool {
        matches!(self, Term::Scalar(_) | Term::Symbol(_))
    }

    /// Returns the scalar value if this is a Scalar node.
    #[must_use]
    pub fn as_scalar(&self) -> Option<Value> {
        match self {
            Term::Scalar(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the Add payload if this is an Add node.
    #[must_use]
    pub fn as_add(&self) -> Option<&AddNode> {
        match self {
            Term::Add(a) => Some(a),
            _ => None,
        }
    }

    /// Returns the Mult payload if this is a Mult node.
    #[must_use]
    pub fn as_mult(&self) -> Option<&MultNode> {
        match self {
            Term::Mult(m) => Some(m),
            _ => None,
        }
    }

    /// Returns every child handle this node owns a reference to.
    ///
    /// Used by the deferred-release drain loop: when a node dies, its
    /// children are pushed onto the drain stack instead of being
    /// released recursively.
    #[must_use]
    pub fn children(&self) -> SmallVec<[TermId; 8]> {
        let mut out = SmallVec::new();
        match self {
            Term::Scalar(_) | Term::Symbol(_) => {}
            Term::Function { args, .. } => out.extend(args.iter().copied()),
            Term::Add(a) => {
                out.extend(a.items.iter().map(|it| it.term));
                if let Some(l) = a.log {
                    out.push(l);
                }
            }
            Term::Mult(m) => {
                out.extend(m.int_pows.iter().map(|p| p.base));
                out.extend(m.real_pows.iter().map(|p| p.base));
                if let Some(e) = m.exp {
                    out.push(e);
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_atom() {
        assert!(Term::Scalar(Value::ONE).is_atom());
        assert!(Term::Symbol(0).is_atom());
        assert!(!Term::Function {
            id: 0,
            args: SmallVec::new()
        }
        .is_atom());
    }

    #[test]
    fn test_children_add() {
        let a = Term::Add(AddNode {
            v0: Value::ZERO,
            items: smallvec::smallvec![
                AddItem {
                    coeff: Value::ONE,
                    term: TermId::new(3)
                },
                AddItem {
                    coeff: Value::NEG_ONE,
                    term: TermId::new(5)
                },
            ],
            log: Some(TermId::new(9)),
        });
        let kids = a.children();
        assert_eq!(kids.as_slice(), &[TermId::new(3), TermId::new(5), TermId::new(9)]);
    }

    #[test]
    fn test_structural_equality() {
        let a = Term::Scalar(Value::NAN);
        let b = Term::Scalar(Value::new(f64::NAN));
        // All NaN scalars are structurally equal so they hash-cons to one node
        assert_eq!(a, b);
    }
}
