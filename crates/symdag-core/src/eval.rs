//! Numeric evaluation of canonical terms.
//!
//! Evaluation substitutes bound values for symbols and folds the DAG
//! bottom-up with a per-call memo, so shared subterms are computed
//! once. Numeric edge cases follow the value type: out-of-domain
//! operations yield NaN rather than errors.

use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::context::Context;
use crate::handle::TermId;
use crate::node::Term;
use crate::symbol::{functions, SymbolId};
use crate::value::Value;

/// Errors that can occur during numeric evaluation.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum EvalError {
    /// A symbol in the expression has no bound value.
    #[error("symbol `{0}` has no binding")]
    UnboundSymbol(String),

    /// A function application is not a known builtin.
    #[error("unknown function `{0}`")]
    UnknownFunction(String),
}

/// A set of symbol bindings for numeric evaluation.
#[derive(Debug, Default)]
pub struct Evaluator {
    bindings: FxHashMap<SymbolId, Value>,
}

impl Evaluator {
    /// Creates an evaluator with no bindings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a symbol id to a value.
    pub fn bind(&mut self, symbol: SymbolId, value: Value) {
        self.bindings.insert(symbol, value);
    }

    /// Binds the plain symbol `name` to a value, interning it if needed.
    pub fn bind_name(&mut self, ctx: &mut Context, name: &str, value: Value) {
        let id = ctx.symbol(name);
        if let Term::Symbol(sym) = ctx.term(id) {
            let sym = *sym;
            self.bind(sym, value);
        }
        ctx.release(id);
    }

    /// Evaluates a canonical term numerically.
    ///
    /// # Errors
    ///
    /// Returns an error if an unbound symbol or unknown function is
    /// encountered.
    pub fn eval(&self, ctx: &Context, id: TermId) -> Result<Value, EvalError> {
        let mut memo = FxHashMap::default();
        self.eval_memo(ctx, id, &mut memo)
    }

    fn eval_memo(
        &self,
        ctx: &Context,
        id: TermId,
        memo: &mut FxHashMap<TermId, Value>,
    ) -> Result<Value, EvalError> {
        if let Some(&v) = memo.get(&id) {
            return Ok(v);
        }

        let v = match ctx.term(id) {
            Term::Scalar(v) => *v,
            Term::Symbol(sym) => match self.bindings.get(sym) {
                Some(&v) => v,
                None => {
                    let name = ctx
                        .symbol_info(*sym)
                        .map_or_else(|| format!("#{sym}"), |i| i.name.clone());
                    return Err(EvalError::UnboundSymbol(name));
                }
            },
            Term::Function { id: fid, args } => {
                let fid = *fid;
                let args = args.clone();
                let mut vals = Vec::with_capacity(args.len());
                for arg in args {
                    vals.push(self.eval_memo(ctx, arg, memo)?);
                }
                self.eval_function(ctx, fid, &vals)?
            }
            Term::Add(add) => {
                let add = add.clone();
                let mut acc = add.v0;
                for item in &add.items {
                    acc = acc + item.coeff * self.eval_memo(ctx, item.term, memo)?;
                }
                if let Some(l) = add.log {
                    acc = acc + self.eval_memo(ctx, l, memo)?.log();
                }
                acc
            }
            Term::Mult(mult) => {
                let mult = mult.clone();
                let mut acc = Value::ONE;
                for p in &mult.int_pows {
                    acc = acc * self.eval_memo(ctx, p.base, memo)?.pow_i(p.exp);
                }
                for p in &mult.real_pows {
                    acc = acc * self.eval_memo(ctx, p.base, memo)?.pow(p.exp);
                }
                if let Some(e) = mult.exp {
                    acc = acc * self.eval_memo(ctx, e, memo)?.exp();
                }
                acc
            }
        };

        memo.insert(id, v);
        Ok(v)
    }

    fn eval_function(
        &self,
        ctx: &Context,
        fid: u32,
        args: &[Value],
    ) -> Result<Value, EvalError> {
        let v = match (fid, args) {
            (functions::SIN, [a]) => Value::new(a.get().sin()),
            (functions::COS, [a]) => Value::new(a.get().cos()),
            (functions::TAN, [a]) => Value::new(a.get().tan()),
            (functions::SQRT, [a]) => Value::new(a.get().sqrt()),
            (functions::ABS, [a]) => a.abs(),
            _ => {
                let name = ctx
                    .function_name(fid)
                    .map_or_else(|| format!("#{fid}"), ToString::to_string);
                return Err(EvalError::UnknownFunction(name));
            }
        };
        Ok(v)
    }
}
