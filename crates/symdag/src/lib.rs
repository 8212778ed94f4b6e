//! # symdag
//!
//! A symbolic-expression engine over a maximally shared DAG.
//!
//! Expressions are hash-consed: structurally equal subexpressions are
//! always the same reference-counted node, so structural equality is a
//! handle comparison. The canonicalization engine reduces cheaply
//! built sums and products to a unique sorted normal form, extracting
//! common factors and fusing log/exp terms along the way.
//!
//! ## Quick Start
//!
//! ```
//! use symdag::prelude::*;
//!
//! let mut eng = Engine::new();
//! let x = eng.symbol("x");
//! let y = eng.symbol("y");
//!
//! // x + y builds lazily; cannonize reduces and interns it
//! let s = eng.add(x, y);
//! let canonical = eng.cannonize(s);
//!
//! // The same expression built again is the same node
//! let x = eng.symbol("x");
//! let y = eng.symbol("y");
//! let s = eng.add(y, x);
//! assert_eq!(eng.cannonize(s), canonical);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub use symdag_canon as canon;
pub use symdag_core as core;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use symdag_canon::{AddBuild, Engine, Ex, MultBuild};
    pub use symdag_core::{Context, EvalError, Evaluator, Term, TermId, Value};
}
