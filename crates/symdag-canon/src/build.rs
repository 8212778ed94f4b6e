//! Mutable build nodes.
//!
//! Build nodes are the cheap accumulators behind the arithmetic
//! builder API: they are not hash-consed, not canonical, and owned by
//! exactly one builder until the canonicalizer consumes them. Each
//! holds one counted reference per term it stores; canonicalization
//! transfers those references out instead of releasing them.
//!
//! A sum that outgrows its inline block spills into a singly-linked
//! overflow chain of previous blocks; the canonicalizer walks the
//! chain to size its scratch buffers up front.

use smallvec::SmallVec;

use symdag_core::{Context, Term, TermId, Value};

/// Items per block before an add build spills into its overflow chain.
const ADD_SPILL: usize = 16;

/// A mutable, uncanonicalized weighted sum.
///
/// A chain of blocks, each contributing
/// `scal * (add + sum(coeff * term) + sum(s * log(arg)))`.
#[derive(Debug)]
pub struct AddBuild {
    pub(crate) add: Value,
    pub(crate) scal: Value,
    pub(crate) items: SmallVec<[(Value, TermId); ADD_SPILL]>,
    pub(crate) logs: SmallVec<[(Value, TermId); 1]>,
    pub(crate) prev: Option<Box<AddBuild>>,
}

impl Default for AddBuild {
    fn default() -> Self {
        Self::new()
    }
}

impl AddBuild {
    /// Creates an empty sum.
    #[must_use]
    pub fn new() -> Self {
        Self {
            add: Value::ZERO,
            scal: Value::ONE,
            items: SmallVec::new(),
            logs: SmallVec::new(),
            prev: None,
        }
    }

    /// Moves the head block into the overflow chain, leaving an empty
    /// head with unit scale.
    fn spill(&mut self) {
        let block = AddBuild {
            add: std::mem::replace(&mut self.add, Value::ZERO),
            scal: std::mem::replace(&mut self.scal, Value::ONE),
            items: std::mem::take(&mut self.items),
            logs: std::mem::take(&mut self.logs),
            prev: self.prev.take(),
        };
        self.prev = Some(Box::new(block));
    }

    /// Ensures the head block has unit scale so a pushed item
    /// contributes exactly `coeff * term`.
    fn flatten_scale(&mut self) {
        if !self.scal.is_one() {
            self.spill();
        }
    }

    /// Appends `coeff * term`, taking ownership of the term reference.
    ///
    /// A scalar term folds into the free constant; a duplicate term in
    /// the head block merges by adding coefficients.
    pub fn push(&mut self, ctx: &mut Context, coeff: Value, term: TermId) {
        if let Term::Scalar(v) = ctx.term(term) {
            let v = *v;
            self.add_scalar(coeff * v);
            ctx.release(term);
            return;
        }

        self.flatten_scale();
        for (c, t) in &mut self.items {
            if *t == term {
                *c = *c + coeff;
                ctx.release(term);
                return;
            }
        }
        if self.items.len() >= ADD_SPILL {
            self.spill();
        }
        self.items.push((coeff, term));
    }

    /// Appends `coeff * log(arg)`, taking ownership of the argument
    /// reference.
    pub fn push_log(&mut self, coeff: Value, arg: TermId) {
        self.flatten_scale();
        self.logs.push((coeff, arg));
    }

    /// Adds a free scalar to the sum.
    pub fn add_scalar(&mut self, v: Value) {
        self.flatten_scale();
        self.add = self.add + v;
    }

    /// Multiplies the whole sum by a scalar.
    pub fn mul_scalar(&mut self, v: Value) {
        let mut block = Some(self);
        while let Some(b) = block {
            b.scal = b.scal * v;
            block = b.prev.as_deref_mut();
        }
    }

    /// Merges another sum into this one.
    ///
    /// The other build's blocks are spliced into the overflow chain
    /// with their own scales intact.
    pub fn merge(&mut self, other: AddBuild) {
        let mut boxed = Box::new(other);
        let mut tail: &mut AddBuild = &mut boxed;
        while tail.prev.is_some() {
            tail = tail.prev.as_deref_mut().expect("prev checked above");
        }
        tail.prev = self.prev.take();
        self.prev = Some(boxed);
    }

    /// Upper bound on the number of collected items, walking the
    /// overflow chain.
    #[must_use]
    pub fn count_upper_bound(&self) -> usize {
        let mut n = 0;
        let mut block = Some(self);
        while let Some(b) = block {
            n += b.items.len() + b.logs.len();
            block = b.prev.as_deref();
        }
        n
    }

    /// Returns true if this build is the trivial wrapper `0 + 1*x`:
    /// one item with unit net coefficient, nothing else.
    ///
    /// Callers unwrap such builds directly instead of canonicalizing,
    /// avoiding wrap/unwrap churn on power bases.
    #[must_use]
    pub fn is_simple(&self) -> bool {
        self.prev.is_none()
            && self.add.is_zero()
            && self.logs.is_empty()
            && self.items.len() == 1
            && (self.scal * self.items[0].0).is_one()
    }

    /// Extracts the wrapped term if [`is_simple`](Self::is_simple),
    /// transferring its reference; otherwise returns the build intact.
    pub fn into_simple(self) -> Result<TermId, AddBuild> {
        if self.is_simple() {
            Ok(self.items[0].1)
        } else {
            Err(self)
        }
    }

    /// Releases every reference held by the chain.
    pub fn release(self, ctx: &mut Context) {
        let mut block = Some(Box::new(self));
        while let Some(b) = block {
            let b = *b;
            for (_, t) in b.items {
                ctx.release(t);
            }
            for (_, t) in b.logs {
                ctx.release(t);
            }
            block = b.prev;
        }
    }
}

/// A mutable, uncanonicalized product of powers.
#[derive(Debug)]
pub struct MultBuild {
    pub(crate) scal: Value,
    pub(crate) int_pows: SmallVec<[(i32, TermId); 8]>,
    pub(crate) real_pows: SmallVec<[(Value, TermId); 2]>,
    pub(crate) exp: Option<Box<AddBuild>>,
}

impl Default for MultBuild {
    fn default() -> Self {
        Self::new()
    }
}

impl MultBuild {
    /// Creates an empty product (value one).
    #[must_use]
    pub fn new() -> Self {
        Self {
            scal: Value::ONE,
            int_pows: SmallVec::new(),
            real_pows: SmallVec::new(),
            exp: None,
        }
    }

    /// Appends the factor `base ^ exp` with an integer exponent,
    /// taking ownership of the base reference.
    ///
    /// A scalar base folds into the multiplier; a duplicate base
    /// merges by adding exponents, dropping the slot if they cancel.
    pub fn push_int(&mut self, ctx: &mut Context, exp: i32, base: TermId) {
        if exp == 0 {
            ctx.release(base);
            return;
        }
        if let Term::Scalar(v) = ctx.term(base) {
            let v = *v;
            self.scal = self.scal * v.pow_i(exp);
            ctx.release(base);
            return;
        }

        for i in 0..self.int_pows.len() {
            if self.int_pows[i].1 == base {
                self.int_pows[i].0 += exp;
                ctx.release(base);
                if self.int_pows[i].0 == 0 {
                    let (_, t) = self.int_pows.swap_remove(i);
                    ctx.release(t);
                }
                return;
            }
        }
        self.int_pows.push((exp, base));
    }

    /// Appends the factor `base ^ exp` with a real exponent, taking
    /// ownership of the base reference. Integral exponents normalize
    /// into the integer track.
    pub fn push_real(&mut self, ctx: &mut Context, exp: Value, base: TermId) {
        if let Some(i) = exp.as_int() {
            self.push_int(ctx, i, base);
            return;
        }
        if let Term::Scalar(v) = ctx.term(base) {
            let v = *v;
            self.scal = self.scal * v.pow(exp);
            ctx.release(base);
            return;
        }

        for i in 0..self.real_pows.len() {
            if self.real_pows[i].1 == base {
                self.real_pows[i].0 = self.real_pows[i].0 + exp;
                ctx.release(base);
                if self.real_pows[i].0.is_zero() {
                    let (_, t) = self.real_pows.swap_remove(i);
                    ctx.release(t);
                }
                return;
            }
        }
        self.real_pows.push((exp, base));
    }

    /// Multiplies in `exp(arg)`; multiple exponential factors merge
    /// additively since `exp(a) * exp(b) = exp(a + b)`.
    pub fn push_exp(&mut self, arg: AddBuild) {
        match self.exp.as_deref_mut() {
            Some(acc) => acc.merge(arg),
            None => self.exp = Some(Box::new(arg)),
        }
    }

    /// Multiplies the product by a scalar.
    pub fn mul_scalar(&mut self, v: Value) {
        self.scal = self.scal * v;
    }

    /// Merges another product into this one.
    pub fn merge(&mut self, ctx: &mut Context, other: MultBuild) {
        self.scal = self.scal * other.scal;
        for (e, b) in other.int_pows {
            self.push_int(ctx, e, b);
        }
        for (e, b) in other.real_pows {
            self.push_real(ctx, e, b);
        }
        if let Some(acc) = other.exp {
            self.push_exp(*acc);
        }
    }

    /// Raises the whole product to an integer power.
    pub fn pow_i(&mut self, n: i32) {
        self.scal = self.scal.pow_i(n);
        for (e, _) in &mut self.int_pows {
            *e = e.checked_mul(n).expect("integer exponent overflow");
        }
        for (e, _) in &mut self.real_pows {
            *e = *e * Value::from(n);
        }
        if let Some(acc) = self.exp.as_deref_mut() {
            acc.mul_scalar(Value::from(n));
        }
    }

    /// Raises the whole product to a real power. Integer exponents
    /// promote to the real track; the canonicalizer demotes any that
    /// come out integral again.
    pub fn pow_v(&mut self, ctx: &mut Context, v: Value) {
        self.scal = self.scal.pow(v);
        let ints = std::mem::take(&mut self.int_pows);
        for (e, b) in ints {
            self.push_real(ctx, Value::from(e) * v, b);
        }
        let reals = std::mem::take(&mut self.real_pows);
        for (e, b) in reals {
            self.push_real(ctx, e * v, b);
        }
        if let Some(acc) = self.exp.as_deref_mut() {
            acc.mul_scalar(v);
        }
    }

    /// Releases every reference held by the product.
    pub fn release(self, ctx: &mut Context) {
        for (_, t) in self.int_pows {
            ctx.release(t);
        }
        for (_, t) in self.real_pows {
            ctx.release(t);
        }
        if let Some(acc) = self.exp {
            acc.release(ctx);
        }
    }
}

/// An expression in flight: either an already-canonical term or a
/// mutable build owned by the builder.
///
/// This is the Owned/Shared split of the mutability model: a build is
/// mutated freely while owned, and becomes an immutable shared term
/// the moment it is canonicalized.
#[derive(Debug)]
pub enum Ex {
    /// A canonical, hash-consed term (one owned reference).
    Term(TermId),
    /// A sum under construction.
    Add(AddBuild),
    /// A product under construction.
    Mult(MultBuild),
}

impl Ex {
    /// Returns true if this expression is already canonical.
    #[must_use]
    pub fn is_cannonized(&self) -> bool {
        matches!(self, Ex::Term(_))
    }

    /// Releases every reference held by the expression.
    pub fn release(self, ctx: &mut Context) {
        match self {
            Ex::Term(t) => {
                ctx.release(t);
            }
            Ex::Add(ab) => ab.release(ctx),
            Ex::Mult(mb) => mb.release(ctx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_merges_duplicates() {
        let mut ctx = Context::new();
        let mut ab = AddBuild::new();

        let x = ctx.symbol("x");
        ctx.retain(x);

        ab.push(&mut ctx, Value::new(3.0), x);
        ab.push(&mut ctx, Value::new(-1.0), x);

        assert_eq!(ab.items.len(), 1);
        assert_eq!(ab.items[0].0, Value::new(2.0));
        ab.release(&mut ctx);
    }

    #[test]
    fn test_scalar_folds_into_free() {
        let mut ctx = Context::new();
        let mut ab = AddBuild::new();

        let two = ctx.scalar(Value::new(2.0));
        ab.push(&mut ctx, Value::new(3.0), two);

        assert!(ab.items.is_empty());
        assert_eq!(ab.add, Value::new(6.0));
    }

    #[test]
    fn test_spill_chains_blocks() {
        let mut ctx = Context::new();
        let mut ab = AddBuild::new();

        let n = ADD_SPILL + 3;
        for i in 0..n {
            let s = ctx.symbol(&format!("s{i}"));
            ab.push(&mut ctx, Value::ONE, s);
        }

        assert!(ab.prev.is_some());
        assert_eq!(ab.count_upper_bound(), n);
        ab.release(&mut ctx);
    }

    #[test]
    fn test_mul_scalar_scales_all_blocks() {
        let mut ctx = Context::new();
        let mut ab = AddBuild::new();

        for i in 0..(ADD_SPILL + 1) {
            let s = ctx.symbol(&format!("s{i}"));
            ab.push(&mut ctx, Value::ONE, s);
        }
        ab.mul_scalar(Value::new(2.0));

        let mut block = Some(&ab);
        while let Some(b) = block {
            assert_eq!(b.scal, Value::new(2.0));
            block = b.prev.as_deref();
        }
        ab.release(&mut ctx);
    }

    #[test]
    fn test_is_simple_wrapper() {
        let mut ctx = Context::new();
        let mut ab = AddBuild::new();

        let x = ctx.symbol("x");
        ab.push(&mut ctx, Value::ONE, x);
        assert!(ab.is_simple());

        ab.add_scalar(Value::ONE);
        assert!(!ab.is_simple());
        ab.release(&mut ctx);
    }

    #[test]
    fn test_mult_exponent_cancellation() {
        let mut ctx = Context::new();
        let mut mb = MultBuild::new();

        let baseline = ctx.live_count();
        let x = ctx.symbol("x");
        ctx.retain(x);
        mb.push_int(&mut ctx, 2, x);
        mb.push_int(&mut ctx, -2, x);

        // x^2 * x^-2 = 1: the slot is gone and both references dropped
        assert!(mb.int_pows.is_empty());
        assert_eq!(ctx.live_count(), baseline);
    }

    #[test]
    fn test_real_integral_normalizes_to_int() {
        let mut ctx = Context::new();
        let mut mb = MultBuild::new();

        let x = ctx.symbol("x");
        mb.push_real(&mut ctx, Value::new(2.0), x);

        assert!(mb.real_pows.is_empty());
        assert_eq!(mb.int_pows.as_slice(), &[(2, x)]);
        mb.release(&mut ctx);
    }
}
