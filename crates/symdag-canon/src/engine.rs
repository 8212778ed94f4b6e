//! The engine: context plus caches plus the arithmetic builder API.
//!
//! An `Engine` owns everything canonicalization touches — the term
//! store, the CSE hash and its branch-predictor gate. Builder methods
//! combine expressions into cheap build nodes; nothing is reduced
//! until [`cannonize`](Engine::cannonize) is called.

use symdag_core::{Context, Term, TermId, Value};

use crate::build::{AddBuild, Ex, MultBuild};
use crate::cse::CseHash;
use crate::predictor::BranchPredictor;

/// The canonicalization engine.
#[derive(Debug)]
pub struct Engine {
    /// The owned term store and interning tables.
    pub ctx: Context,
    pub(crate) cse: CseHash,
    pub(crate) predictor: BranchPredictor,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    /// Creates an engine with a fresh context and empty caches.
    #[must_use]
    pub fn new() -> Self {
        Self {
            ctx: Context::new(),
            cse: CseHash::new(),
            predictor: BranchPredictor::new(),
        }
    }

    /// Releases one reference to a term, purging CSE entries for any
    /// tracked nodes that die with it.
    pub fn release(&mut self, id: TermId) {
        let dead = self.ctx.release(id);
        if !dead.is_empty() {
            self.cse.forget(&dead);
        }
    }

    /// A scalar expression.
    pub fn scalar(&mut self, v: Value) -> Ex {
        Ex::Term(self.ctx.scalar(v))
    }

    /// A plain symbol expression.
    pub fn symbol(&mut self, name: &str) -> Ex {
        Ex::Term(self.ctx.symbol(name))
    }

    // === Arithmetic builders ===

    /// `a + b`.
    pub fn add(&mut self, a: Ex, b: Ex) -> Ex {
        let mut build = match a {
            Ex::Add(build) => build,
            other => {
                let mut build = AddBuild::new();
                self.push_into_add(&mut build, other);
                build
            }
        };
        self.push_into_add(&mut build, b);
        Ex::Add(build)
    }

    fn push_into_add(&mut self, build: &mut AddBuild, ex: Ex) {
        match ex {
            Ex::Term(t) => build.push(&mut self.ctx, Value::ONE, t),
            Ex::Add(other) => build.merge(other),
            Ex::Mult(mb) => {
                let t = self.make_mult(mb, true);
                build.push(&mut self.ctx, Value::ONE, t);
            }
        }
    }

    /// `a * b`.
    pub fn mul(&mut self, a: Ex, b: Ex) -> Ex {
        let mut build = match a {
            Ex::Mult(build) => build,
            other => {
                let mut build = MultBuild::new();
                self.push_into_mult(&mut build, other);
                build
            }
        };
        self.push_into_mult(&mut build, b);
        Ex::Mult(build)
    }

    fn push_into_mult(&mut self, build: &mut MultBuild, ex: Ex) {
        match ex {
            Ex::Term(t) => build.push_int(&mut self.ctx, 1, t),
            Ex::Mult(other) => build.merge(&mut self.ctx, other),
            Ex::Add(ab) => match ab.into_simple() {
                Ok(t) => build.push_int(&mut self.ctx, 1, t),
                Err(ab) => {
                    let t = self.make_add(ab, true);
                    build.push_int(&mut self.ctx, 1, t);
                }
            },
        }
    }

    /// `-a`.
    pub fn neg(&mut self, a: Ex) -> Ex {
        match a {
            Ex::Term(t) => {
                let mut build = AddBuild::new();
                build.push(&mut self.ctx, Value::NEG_ONE, t);
                Ex::Add(build)
            }
            Ex::Add(mut build) => {
                build.mul_scalar(Value::NEG_ONE);
                Ex::Add(build)
            }
            Ex::Mult(mut build) => {
                build.mul_scalar(Value::NEG_ONE);
                Ex::Mult(build)
            }
        }
    }

    /// `a - b`.
    pub fn sub(&mut self, a: Ex, b: Ex) -> Ex {
        let nb = self.neg(b);
        self.add(a, nb)
    }

    /// `a / b`.
    pub fn div(&mut self, a: Ex, b: Ex) -> Ex {
        let inv = self.pow_i(b, -1);
        self.mul(a, inv)
    }

    /// `a ^ n` with an integer exponent.
    pub fn pow_i(&mut self, a: Ex, n: i32) -> Ex {
        if n == 0 {
            // Zero exponents drop: x^0 = 1
            a.release(&mut self.ctx);
            return Ex::Term(self.ctx.one());
        }
        if n == 1 {
            return a;
        }
        match a {
            Ex::Term(t) => {
                if let Term::Scalar(v) = self.ctx.term(t) {
                    let v = *v;
                    self.release(t);
                    return Ex::Term(self.ctx.scalar(v.pow_i(n)));
                }
                let mut build = MultBuild::new();
                build.push_int(&mut self.ctx, n, t);
                Ex::Mult(build)
            }
            Ex::Mult(mut build) => {
                build.pow_i(n);
                Ex::Mult(build)
            }
            Ex::Add(ab) => match ab.into_simple() {
                Ok(t) => self.pow_i(Ex::Term(t), n),
                Err(ab) => {
                    let t = self.make_add(ab, true);
                    self.pow_i(Ex::Term(t), n)
                }
            },
        }
    }

    /// `a ^ v` with a scalar exponent. Integral exponents reduce to
    /// [`pow_i`](Self::pow_i); a NaN exponent yields the NaN scalar.
    pub fn pow_v(&mut self, a: Ex, v: Value) -> Ex {
        if let Some(n) = v.as_int() {
            return self.pow_i(a, n);
        }
        if v.is_nan() {
            a.release(&mut self.ctx);
            return Ex::Term(self.ctx.nan());
        }
        match a {
            Ex::Term(t) => {
                if let Term::Scalar(b) = self.ctx.term(t) {
                    let b = *b;
                    self.release(t);
                    return Ex::Term(self.ctx.scalar(b.pow(v)));
                }
                let mut build = MultBuild::new();
                build.push_real(&mut self.ctx, v, t);
                Ex::Mult(build)
            }
            Ex::Mult(mut build) => {
                build.pow_v(&mut self.ctx, v);
                Ex::Mult(build)
            }
            Ex::Add(ab) => match ab.into_simple() {
                Ok(t) => self.pow_v(Ex::Term(t), v),
                Err(ab) => {
                    let t = self.make_add(ab, true);
                    self.pow_v(Ex::Term(t), v)
                }
            },
        }
    }

    /// `a ^ b` with an arbitrary exponent: a scalar exponent uses the
    /// power tracks, anything else lowers to `exp(b * log(a))`.
    pub fn pow(&mut self, a: Ex, b: Ex) -> Ex {
        let b = self.cannonize(b);
        if let Term::Scalar(v) = self.ctx.term(b) {
            let v = *v;
            self.release(b);
            return self.pow_v(a, v);
        }
        let la = self.log(a);
        let arg = self.mul(Ex::Term(b), la);
        self.exp(arg)
    }

    /// `exp(a)`.
    pub fn exp(&mut self, a: Ex) -> Ex {
        let arg = self.to_add_build(a);
        let mut build = MultBuild::new();
        build.push_exp(arg);
        Ex::Mult(build)
    }

    /// `log(a)`.
    pub fn log(&mut self, a: Ex) -> Ex {
        let t = self.cannonize(a);
        let mut build = AddBuild::new();
        build.push_log(Value::ONE, t);
        Ex::Add(build)
    }

    fn to_add_build(&mut self, ex: Ex) -> AddBuild {
        match ex {
            Ex::Add(build) => build,
            Ex::Term(t) => {
                let mut build = AddBuild::new();
                build.push(&mut self.ctx, Value::ONE, t);
                build
            }
            Ex::Mult(mb) => {
                let t = self.make_mult(mb, true);
                let mut build = AddBuild::new();
                build.push(&mut self.ctx, Value::ONE, t);
                build
            }
        }
    }

    // === Cache introspection ===

    /// Number of live CSE entries.
    #[must_use]
    pub fn cse_len(&self) -> usize {
        self.cse.len()
    }

    /// The branch predictor's running accuracy.
    #[must_use]
    pub fn predictor_accuracy(&self) -> f64 {
        self.predictor.accuracy()
    }
}
