//! Plain-text rendering of canonical terms.
//!
//! This is a diagnostic formatter, not a pretty-printer: it prints the
//! canonical structure directly (sorted items, explicit exponents) so
//! test output and traces are unambiguous.

use std::fmt;

use crate::context::Context;
use crate::handle::TermId;
use crate::node::Term;
use crate::value::Value;

/// Borrowing adapter implementing `Display` for a term.
pub struct TermDisplay<'a> {
    ctx: &'a Context,
    id: TermId,
}

impl Context {
    /// Returns a `Display` adapter for a term.
    #[must_use]
    pub fn display(&self, id: TermId) -> TermDisplay<'_> {
        TermDisplay { ctx: self, id }
    }
}

/// Renders a term to a fresh string.
#[must_use]
pub fn term_to_string(ctx: &Context, id: TermId) -> String {
    ctx.display(id).to_string()
}

impl fmt::Display for TermDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_term(f, self.ctx, self.id)
    }
}

fn write_term(f: &mut fmt::Formatter<'_>, ctx: &Context, id: TermId) -> fmt::Result {
    match ctx.term(id) {
        Term::Scalar(v) => write!(f, "{v}"),
        Term::Symbol(sym) => {
            let info = ctx.symbol_info(*sym).expect("unregistered symbol");
            write!(f, "{}", info.name)?;
            if !info.indices.is_empty() {
                write!(f, "[")?;
                for (i, idx) in info.indices.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{idx}")?;
                }
                write!(f, "]")?;
            }
            Ok(())
        }
        Term::Function { id: fid, args } => {
            let name = ctx.function_name(*fid).expect("unregistered function");
            write!(f, "{name}(")?;
            for (i, arg) in args.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write_term(f, ctx, *arg)?;
            }
            write!(f, ")")
        }
        Term::Add(add) => {
            write!(f, "(")?;
            let mut first = true;
            if !add.v0.is_zero() || (add.items.is_empty() && add.log.is_none()) {
                write!(f, "{}", add.v0)?;
                first = false;
            }
            for item in &add.items {
                if !first {
                    write!(f, " + ")?;
                }
                first = false;
                if !item.coeff.is_one() {
                    write!(f, "{}*", item.coeff)?;
                }
                write_term(f, ctx, item.term)?;
            }
            if let Some(l) = add.log {
                if !first {
                    write!(f, " + ")?;
                }
                write!(f, "log(")?;
                write_term(f, ctx, l)?;
                write!(f, ")")?;
            }
            write!(f, ")")
        }
        Term::Mult(mult) => {
            let mut first = true;
            for p in &mult.int_pows {
                if !first {
                    write!(f, "*")?;
                }
                first = false;
                write_factor(f, ctx, p.base, Value::from(p.exp))?;
            }
            for p in &mult.real_pows {
                if !first {
                    write!(f, "*")?;
                }
                first = false;
                write_factor(f, ctx, p.base, p.exp)?;
            }
            if let Some(e) = mult.exp {
                if !first {
                    write!(f, "*")?;
                }
                write!(f, "exp(")?;
                write_term(f, ctx, e)?;
                write!(f, ")")?;
            }
            Ok(())
        }
    }
}

fn write_factor(f: &mut fmt::Formatter<'_>, ctx: &Context, base: TermId, exp: Value) -> fmt::Result {
    write_term(f, ctx, base)?;
    if !exp.is_one() {
        write!(f, "^{exp}")?;
    }
    Ok(())
}
