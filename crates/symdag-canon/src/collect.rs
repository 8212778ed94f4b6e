//! Item collectors.
//!
//! Collectors flatten build chains and nested canonical nodes into
//! flat item buffers, merging duplicate bases and folding scalars as
//! they go. They also own the log/exp fusion rules:
//!
//! - `c * log(x)` accumulates as `log(x^c)`, and
//!   `log(a) + log(b)` as `log(a * b)`, so a sum ends with at most one
//!   log term whose argument is a single product.
//! - `exp(a) * exp(b)` accumulates as `exp(a + b)`, so a product ends
//!   with at most one exponential factor.
//! - `log(R * exp(A)) = A + log(R)` and the scalar case
//!   `log(c) -> free` are applied on insertion, which is what makes
//!   the `exp(log(x))` round-trip collapse.

use rustc_hash::FxHashMap;

use symdag_core::{Context, Term, TermId, Value};

use crate::build::{AddBuild, MultBuild};
use crate::engine::Engine;

/// Scratch collector for a sum's items.
#[derive(Debug)]
pub(crate) struct AddCollector {
    /// Free scalar accumulator.
    pub free: Value,
    /// Weighted items; unsorted until [`finalize`](Self::finalize).
    pub slots: Vec<(Value, TermId)>,
    /// Product accumulator for the single fused log argument.
    pub log: Option<MultBuild>,
}

impl AddCollector {
    pub fn with_capacity(n: usize) -> Self {
        Self {
            free: Value::ZERO,
            slots: Vec::with_capacity(n),
            log: None,
        }
    }

    /// Drains a build chain into the collector.
    pub fn collect_build(&mut self, ctx: &mut Context, build: AddBuild) {
        let mut block = Some(Box::new(build));
        while let Some(b) = block {
            let b = *b;
            let scal = b.scal;
            self.free = self.free + scal * b.add;
            for (c, t) in b.items {
                self.add(ctx, scal * c, t);
            }
            for (s, l) in b.logs {
                self.add_log(ctx, scal * s, l);
            }
            block = b.prev;
        }
    }

    /// Adds `coeff * term`, flattening nested sums and folding
    /// scalars. Takes ownership of the term reference.
    pub fn add(&mut self, ctx: &mut Context, coeff: Value, term: TermId) {
        if coeff.is_zero() {
            ctx.release(term);
            return;
        }

        match ctx.term(term) {
            Term::Scalar(v) => {
                self.free = self.free + coeff * *v;
                ctx.release(term);
            }
            Term::Add(add) => {
                // Canonical sums never nest sums, so this recursion is
                // one level deep.
                let add = add.clone();
                self.free = self.free + coeff * add.v0;
                for item in &add.items {
                    ctx.retain(item.term);
                    self.add(ctx, coeff * item.coeff, item.term);
                }
                if let Some(l) = add.log {
                    ctx.retain(l);
                    self.add_log(ctx, coeff, l);
                }
                ctx.release(term);
            }
            _ => {
                for (c, t) in &mut self.slots {
                    if *t == term {
                        *c = *c + coeff;
                        ctx.release(term);
                        return;
                    }
                }
                self.slots.push((coeff, term));
            }
        }
    }

    /// Adds `coeff * log(arg)`, fusing into the product accumulator.
    /// Takes ownership of the argument reference.
    pub fn add_log(&mut self, ctx: &mut Context, coeff: Value, arg: TermId) {
        if coeff.is_zero() {
            ctx.release(arg);
            return;
        }

        match ctx.term(arg) {
            Term::Scalar(v) => {
                self.free = self.free + coeff * v.log();
                ctx.release(arg);
            }
            Term::Mult(mult) if mult.has_exp() => {
                // log(R * exp(A)) = A + log(R)
                let mult = mult.clone();
                let a = mult.exp.expect("checked has_exp");
                ctx.retain(a);
                self.add(ctx, coeff, a);

                let acc = self.log.get_or_insert_with(MultBuild::new);
                for p in &mult.int_pows {
                    ctx.retain(p.base);
                    acc.push_real(ctx, Value::from(p.exp) * coeff, p.base);
                }
                for p in &mult.real_pows {
                    ctx.retain(p.base);
                    acc.push_real(ctx, p.exp * coeff, p.base);
                }
                ctx.release(arg);
            }
            _ => {
                let acc = self.log.get_or_insert_with(MultBuild::new);
                acc.push_real(ctx, coeff, arg);
            }
        }
    }

    /// Drops zero-coefficient slots (swap-with-last compaction) and
    /// sorts the survivors by term handle for canonical order.
    pub fn finalize(&mut self, ctx: &mut Context) {
        self.remove_empty(ctx);
        self.slots.sort_unstable_by_key(|&(_, t)| t);
    }

    /// Compacts out slots whose coefficients cancelled to zero.
    pub fn remove_empty(&mut self, ctx: &mut Context) {
        let mut i = 0;
        while i < self.slots.len() {
            if self.slots[i].0.is_zero() {
                let (_, t) = self.slots.swap_remove(i);
                ctx.release(t);
            } else {
                i += 1;
            }
        }
    }
}

/// Scratch collector for a product's factors.
#[derive(Debug)]
pub(crate) struct MultCollector {
    /// Scalar multiplier accumulator.
    pub scal: Value,
    /// Integer-power factors; unsorted until
    /// [`collect_base`](Self::collect_base).
    pub int_pows: Vec<(i32, TermId)>,
    /// Real-power factors; may transiently hold integral exponents.
    pub real_pows: Vec<(Value, TermId)>,
    /// Sum accumulator for the single fused exponential argument.
    pub exp: Option<AddBuild>,
    /// Whether CSE probing is enabled for nested normalizations.
    do_cse: bool,
}

impl MultCollector {
    pub fn new(do_cse: bool) -> Self {
        Self {
            scal: Value::ONE,
            int_pows: Vec::new(),
            real_pows: Vec::new(),
            exp: None,
            do_cse,
        }
    }

    /// Drains a product build into the collector.
    pub fn collect_build(&mut self, eng: &mut Engine, build: MultBuild) {
        self.scal = self.scal * build.scal;
        for (e, b) in build.int_pows {
            self.mul_int(eng, e, b);
        }
        for (e, b) in build.real_pows {
            self.mul_real(eng, e, b);
        }
        if let Some(acc) = build.exp {
            self.mul_exp(*acc);
        }
    }

    /// Multiplies in `term ^ exp` with an integer exponent, flattening
    /// nested products and normalizing sum bases. Takes ownership of
    /// the term reference.
    pub fn mul_int(&mut self, eng: &mut Engine, exp: i32, term: TermId) {
        if exp == 0 {
            eng.ctx.release(term);
            return;
        }

        match eng.ctx.term(term) {
            Term::Scalar(v) => {
                self.scal = self.scal * v.pow_i(exp);
                eng.ctx.release(term);
            }
            Term::Mult(mult) => {
                // (prod b_i^e_i * exp(A))^n flattens with scaled
                // exponents; exp(A)^n = exp(n*A)
                let mult = mult.clone();
                for p in &mult.int_pows {
                    eng.ctx.retain(p.base);
                    self.mul_int(eng, p.exp * exp, p.base);
                }
                for p in &mult.real_pows {
                    eng.ctx.retain(p.base);
                    self.mul_real(eng, p.exp * Value::from(exp), p.base);
                }
                if let Some(a) = mult.exp {
                    eng.ctx.retain(a);
                    let mut arg = AddBuild::new();
                    arg.push(&mut eng.ctx, Value::from(exp), a);
                    self.mul_exp(arg);
                }
                eng.ctx.release(term);
            }
            Term::Add(_) => {
                // (c * x)^n = c^n * x^n: divide the common scale out of
                // the sum so scaled copies share one base node
                let (base, c) = eng.normalize_add(term, self.do_cse);
                self.scal = self.scal * c.pow_i(exp);
                eng.ctx.release(term);
                if eng.ctx.term(base).as_add().is_some() {
                    self.push_int_slot(&mut eng.ctx, exp, base);
                } else {
                    self.mul_int(eng, exp, base);
                }
            }
            _ => self.push_int_slot(&mut eng.ctx, exp, term),
        }
    }

    /// Multiplies in `term ^ exp` with a real exponent. Integral
    /// exponents route back to the integer track.
    pub fn mul_real(&mut self, eng: &mut Engine, exp: Value, term: TermId) {
        if let Some(i) = exp.as_int() {
            self.mul_int(eng, i, term);
            return;
        }

        match eng.ctx.term(term) {
            Term::Scalar(v) => {
                self.scal = self.scal * v.pow(exp);
                eng.ctx.release(term);
            }
            Term::Mult(mult) => {
                let mult = mult.clone();
                for p in &mult.int_pows {
                    eng.ctx.retain(p.base);
                    self.mul_real(eng, Value::from(p.exp) * exp, p.base);
                }
                for p in &mult.real_pows {
                    eng.ctx.retain(p.base);
                    self.mul_real(eng, p.exp * exp, p.base);
                }
                if let Some(a) = mult.exp {
                    eng.ctx.retain(a);
                    let mut arg = AddBuild::new();
                    arg.push(&mut eng.ctx, exp, a);
                    self.mul_exp(arg);
                }
                eng.ctx.release(term);
            }
            Term::Add(_) => {
                let (base, c) = eng.normalize_add(term, self.do_cse);
                self.scal = self.scal * c.pow(exp);
                eng.ctx.release(term);
                if eng.ctx.term(base).as_add().is_some() {
                    self.push_real_slot(&mut eng.ctx, exp, base);
                } else {
                    self.mul_real(eng, exp, base);
                }
            }
            _ => self.push_real_slot(&mut eng.ctx, exp, term),
        }
    }

    /// Merges a sum into the exponential-argument accumulator.
    pub fn mul_exp(&mut self, arg: AddBuild) {
        match self.exp.as_mut() {
            Some(acc) => acc.merge(arg),
            None => self.exp = Some(arg),
        }
    }

    fn push_int_slot(&mut self, ctx: &mut Context, exp: i32, base: TermId) {
        for (e, b) in &mut self.int_pows {
            if *b == base {
                *e += exp;
                ctx.release(base);
                return;
            }
        }
        self.int_pows.push((exp, base));
    }

    fn push_real_slot(&mut self, ctx: &mut Context, exp: Value, base: TermId) {
        for (e, b) in &mut self.real_pows {
            if *b == base {
                *e = *e + exp;
                ctx.release(base);
                return;
            }
        }
        self.real_pows.push((exp, base));
    }

    /// Post-pass over the two power tracks.
    ///
    /// The tracks are collected independently, but a canonical product
    /// has each base in at most one of them: integral real exponents
    /// demote to the integer track, a base present in both tracks nets
    /// its exponents into one slot, and slots that cancelled to zero
    /// are dropped. Finally both tracks sort by base handle.
    pub fn collect_base(&mut self, ctx: &mut Context) {
        // Demote integral real exponents
        let mut i = 0;
        while i < self.real_pows.len() {
            if let Some(n) = self.real_pows[i].0.as_int() {
                let (_, b) = self.real_pows.swap_remove(i);
                if n == 0 {
                    ctx.release(b);
                } else {
                    self.push_int_slot(ctx, n, b);
                }
            } else {
                i += 1;
            }
        }

        // Net bases that landed in both tracks
        if !self.int_pows.is_empty() && !self.real_pows.is_empty() {
            let by_base: FxHashMap<TermId, usize> = self
                .int_pows
                .iter()
                .enumerate()
                .map(|(i, &(_, b))| (b, i))
                .collect();
            let mut dead_int = Vec::new();
            for (e, b) in &mut self.real_pows {
                if let Some(&ii) = by_base.get(b) {
                    *e = *e + Value::from(self.int_pows[ii].0);
                    dead_int.push(ii);
                }
            }
            dead_int.sort_unstable_by(|a, b| b.cmp(a));
            for ii in dead_int {
                let (_, b) = self.int_pows.swap_remove(ii);
                ctx.release(b);
            }
        }

        // Drop cancelled slots
        let mut i = 0;
        while i < self.int_pows.len() {
            if self.int_pows[i].0 == 0 {
                let (_, b) = self.int_pows.swap_remove(i);
                ctx.release(b);
            } else {
                i += 1;
            }
        }
        i = 0;
        while i < self.real_pows.len() {
            if self.real_pows[i].0.is_zero() {
                let (_, b) = self.real_pows.swap_remove(i);
                ctx.release(b);
            } else {
                i += 1;
            }
        }

        self.int_pows.sort_unstable_by_key(|&(_, b)| b);
        self.real_pows.sort_unstable_by_key(|&(_, b)| b);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_merges_and_folds_scalars() {
        let mut ctx = Context::new();
        let mut col = AddCollector::with_capacity(4);

        let x = ctx.symbol("x");
        ctx.retain(x);
        let two = ctx.scalar(Value::new(2.0));

        col.add(&mut ctx, Value::new(3.0), x);
        col.add(&mut ctx, Value::new(4.0), x);
        col.add(&mut ctx, Value::new(5.0), two);

        assert_eq!(col.slots.len(), 1);
        assert_eq!(col.slots[0].0, Value::new(7.0));
        assert_eq!(col.free, Value::new(10.0));
    }

    #[test]
    fn test_add_flattens_nested_sum() {
        let mut eng = Engine::new();

        // Canonicalize 1 + 2x first, then insert it scaled by 3
        let s = {
            let one = eng.scalar(Value::ONE);
            let two = eng.scalar(Value::new(2.0));
            let x = eng.symbol("x");
            let tx = eng.mul(two, x);
            let sum = eng.add(one, tx);
            eng.cannonize(sum)
        };

        let mut col = AddCollector::with_capacity(4);
        col.add(&mut eng.ctx, Value::new(3.0), s);

        assert_eq!(col.free, Value::new(3.0));
        assert_eq!(col.slots.len(), 1);
        assert_eq!(col.slots[0].0, Value::new(6.0));
    }

    #[test]
    fn test_add_log_folds_scalar_argument() {
        let mut ctx = Context::new();
        let mut col = AddCollector::with_capacity(2);

        let one = ctx.scalar(Value::ONE);
        col.add_log(&mut ctx, Value::new(5.0), one);

        // log(1) = 0: nothing accumulates
        assert!(col.log.is_none());
        assert_eq!(col.free, Value::ZERO);
    }

    #[test]
    fn test_remove_empty_compacts_cancelled_slots() {
        let mut ctx = Context::new();
        let mut col = AddCollector::with_capacity(4);

        let x = ctx.symbol("x");
        ctx.retain(x);
        let y = ctx.symbol("y");

        col.add(&mut ctx, Value::ONE, y);
        col.add(&mut ctx, Value::new(2.0), x);
        col.add(&mut ctx, Value::new(-2.0), x);
        col.finalize(&mut ctx);

        assert_eq!(col.slots.len(), 1);
        assert_eq!(col.slots[0].1, y);
    }

    #[test]
    fn test_mult_collector_flattens_nested_product() {
        let mut eng = Engine::new();

        // Canonicalize x^2 * y, then raise it by an outer exponent 3
        let m = {
            let x = eng.symbol("x");
            let y = eng.symbol("y");
            let p = eng.pow_i(x, 2);
            let p = eng.mul(p, y);
            eng.cannonize(p)
        };

        let mut col = MultCollector::new(true);
        col.mul_int(&mut eng, 3, m);
        col.collect_base(&mut eng.ctx);

        assert_eq!(col.int_pows.len(), 2);
        let exps: Vec<i32> = col.int_pows.iter().map(|&(e, _)| e).collect();
        assert!(exps.contains(&6));
        assert!(exps.contains(&3));
    }

    #[test]
    fn test_collect_base_fuses_tracks() {
        let mut eng = Engine::new();
        let x = eng.ctx.symbol("x");
        eng.ctx.retain(x);

        // x^2 from the integer track, x^0.5 from the real track:
        // one slot with exponent 2.5
        let mut col = MultCollector::new(true);
        col.mul_int(&mut eng, 2, x);
        col.mul_real(&mut eng, Value::new(0.5), x);
        col.collect_base(&mut eng.ctx);

        assert!(col.int_pows.is_empty());
        assert_eq!(col.real_pows.len(), 1);
        assert_eq!(col.real_pows[0].0, Value::new(2.5));
    }

    #[test]
    fn test_collect_base_demotes_integral_reals() {
        let mut eng = Engine::new();
        let x = eng.ctx.symbol("x");
        eng.ctx.retain(x);

        // x^0.5 * x^1.5 = x^2, an integer-track slot
        let mut col = MultCollector::new(true);
        col.mul_real(&mut eng, Value::new(0.5), x);
        col.mul_real(&mut eng, Value::new(1.5), x);
        col.collect_base(&mut eng.ctx);

        assert!(col.real_pows.is_empty());
        assert_eq!(col.int_pows.as_slice(), &[(2, x)]);
    }
}
