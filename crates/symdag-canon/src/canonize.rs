//! The canonicalizer.
//!
//! Converts build nodes into canonical, hash-consed Add/Mult nodes:
//! items are collected and flattened, duplicates merged, zeros
//! dropped, items sorted by term handle, common factors extracted,
//! log/exp specials fused, and degenerate shapes collapsed to their
//! atoms. Canonicalizing an already-canonical term is the identity.

use symdag_core::{AddItem, AddNode, IntPow, MultNode, RealPow, Term, TermId, Value};

use crate::build::{AddBuild, Ex, MultBuild};
use crate::collect::{AddCollector, MultCollector};
use crate::engine::Engine;
use crate::factor::{self, FactorKind, FactorPlan};

impl Engine {
    /// Canonicalizes an expression with CSE probing enabled.
    pub fn cannonize(&mut self, ex: Ex) -> TermId {
        self.cannonize_with(ex, true)
    }

    /// Canonicalizes an expression.
    ///
    /// Already-canonical terms return unchanged (the `is_cannonized`
    /// fast path); build nodes are consumed and reduced.
    pub fn cannonize_with(&mut self, ex: Ex, do_cse: bool) -> TermId {
        match ex {
            Ex::Term(t) => t,
            Ex::Add(build) => self.make_add(build, do_cse),
            Ex::Mult(build) => self.make_mult(build, do_cse),
        }
    }

    /// Reduces a sum build to canonical form.
    pub(crate) fn make_add(&mut self, build: AddBuild, do_cse: bool) -> TermId {
        let cap = build.count_upper_bound();
        let mut col = AddCollector::with_capacity(cap);
        col.collect_build(&mut self.ctx, build);
        self.finish_add(col, do_cse, true)
    }

    /// Finishes a collected sum: log fusion, merge, sort, factor
    /// extraction, degenerate collapse, interning.
    fn finish_add(&mut self, mut col: AddCollector, do_cse: bool, try_factor: bool) -> TermId {
        // Reduce the fused log product to a single canonical argument.
        let log_term = match col.log.take() {
            None => None,
            Some(acc) => {
                let arg = self.make_mult(acc, do_cse);
                self.finish_log_arg(&mut col, arg)
            }
        };

        // A NaN constant absorbs the whole sum.
        if col.free.is_nan() {
            for (_, t) in col.slots.drain(..) {
                self.release(t);
            }
            if let Some(l) = log_term {
                self.release(l);
            }
            return self.ctx.nan();
        }

        col.finalize(&mut self.ctx);

        if try_factor && col.slots.len() > 1 {
            if let Some(plan) = factor::search(&self.ctx, &col.slots) {
                return self.apply_factor(col, log_term, plan, do_cse);
            }
        }

        self.reduce_add(col.free, col.slots, log_term)
    }

    /// Post-processes a canonicalized log argument: a scalar argument
    /// folds into the free term, and a scalar-wrapped product unwraps
    /// as `log(c * M) = log(c) + log(M)`.
    fn finish_log_arg(&mut self, col: &mut AddCollector, arg: TermId) -> Option<TermId> {
        match self.ctx.term(arg) {
            Term::Scalar(v) => {
                col.free = col.free + v.log();
                self.release(arg);
                None
            }
            Term::Add(add) if add.v0.is_zero() && add.size() == 1 && !add.has_log() => {
                let coeff = add.coeff(0);
                let inner = add.term(0);
                self.ctx.retain(inner);
                col.free = col.free + coeff.log();
                self.release(arg);
                Some(inner)
            }
            _ => Some(arg),
        }
    }

    /// Interns a reduced sum, applying the degenerate collapses:
    /// an empty sum is its constant, and `0 + 1*x` is `x` itself.
    fn reduce_add(
        &mut self,
        free: Value,
        slots: Vec<(Value, TermId)>,
        log: Option<TermId>,
    ) -> TermId {
        if slots.is_empty() && log.is_none() {
            return self.ctx.scalar(free);
        }
        if slots.len() == 1 && log.is_none() && free.is_zero() && slots[0].0.is_one() {
            return slots[0].1;
        }

        let items = slots
            .into_iter()
            .map(|(coeff, term)| AddItem { coeff, term })
            .collect();
        self.ctx.intern(Term::Add(AddNode {
            v0: free,
            items,
            log,
        }))
    }

    /// Executes a factorization plan: extracts the winning factors
    /// from each member summand, rebuilds the residual sum and the
    /// remainder, and assembles `factor * residuals + remainder`.
    ///
    /// The two sub-sums re-canonicalize fully (and may factor again);
    /// the final assembly is structural — re-searching the assembled
    /// level could pull the same base back out of the factor product
    /// and loop.
    fn apply_factor(
        &mut self,
        mut col: AddCollector,
        log_term: Option<TermId>,
        plan: FactorPlan,
        do_cse: bool,
    ) -> TermId {
        // Pin the factor bases before the member slots are torn down.
        for f in &plan.factors {
            self.ctx.retain(f.base);
        }

        let mut residual_sum = AddBuild::new();
        for &si in &plan.members {
            let (coeff, term) = col.slots[si];
            col.slots[si].0 = Value::ZERO; // claimed; compacted below

            let residual = self.strip_factors(term, &plan);
            self.release(term);
            let rt = self.make_mult(residual, do_cse);
            residual_sum.push(&mut self.ctx, coeff, rt);
        }
        let inner = self.make_add(residual_sum, do_cse);

        let mut factor_build = MultBuild::new();
        for f in &plan.factors {
            match f.kind {
                FactorKind::Int(e) => factor_build.push_int(&mut self.ctx, e, f.base),
                FactorKind::Real(e) => factor_build.push_real(&mut self.ctx, e, f.base),
                FactorKind::Exp => {
                    let mut arg = AddBuild::new();
                    arg.push(&mut self.ctx, Value::ONE, f.base);
                    factor_build.push_exp(arg);
                }
            }
        }
        factor_build.push_int(&mut self.ctx, 1, inner);
        let factored = self.make_mult(factor_build, do_cse);

        // Remainder: everything the group did not claim, including the
        // free scalar and the log term. It canonicalizes on its own
        // and may factor internally.
        let mut remaining = std::mem::take(&mut col.slots);
        remaining.retain(|(c, _)| !c.is_zero());
        let remainder = self.reduce_with_factor(col.free, remaining, log_term, do_cse);

        let mut fin = AddCollector::with_capacity(2);
        fin.add(&mut self.ctx, Value::ONE, factored);
        fin.add(&mut self.ctx, Value::ONE, remainder);
        self.finish_add(fin, do_cse, false)
    }

    /// Canonicalizes already-collected sum parts, factor search
    /// included.
    fn reduce_with_factor(
        &mut self,
        free: Value,
        slots: Vec<(Value, TermId)>,
        log: Option<TermId>,
        do_cse: bool,
    ) -> TermId {
        let mut col = AddCollector::with_capacity(slots.len());
        col.free = free;
        col.slots = slots;
        if let Some(l) = log {
            let mut acc = MultBuild::new();
            acc.push_int(&mut self.ctx, 1, l);
            col.log = Some(acc);
        }
        self.finish_add(col, do_cse, true)
    }

    /// Rebuilds a member summand's product minus the extracted
    /// factors. A bare atom summand whose atom was extracted leaves
    /// the empty product (one).
    fn strip_factors(&mut self, term: TermId, plan: &FactorPlan) -> MultBuild {
        let mut residual = MultBuild::new();
        match self.ctx.term(term) {
            Term::Mult(m) => {
                let m = m.clone();
                for p in &m.int_pows {
                    let extracted = plan
                        .factors
                        .iter()
                        .any(|f| f.base == p.base && matches!(f.kind, FactorKind::Int(e) if e == p.exp));
                    if !extracted {
                        self.ctx.retain(p.base);
                        residual.push_int(&mut self.ctx, p.exp, p.base);
                    }
                }
                for p in &m.real_pows {
                    let extracted = plan
                        .factors
                        .iter()
                        .any(|f| f.base == p.base && matches!(f.kind, FactorKind::Real(e) if e == p.exp));
                    if !extracted {
                        self.ctx.retain(p.base);
                        residual.push_real(&mut self.ctx, p.exp, p.base);
                    }
                }
                if let Some(a) = m.exp {
                    let extracted = plan
                        .factors
                        .iter()
                        .any(|f| f.base == a && matches!(f.kind, FactorKind::Exp));
                    if !extracted {
                        self.ctx.retain(a);
                        let mut arg = AddBuild::new();
                        arg.push(&mut self.ctx, Value::ONE, a);
                        residual.push_exp(arg);
                    }
                }
            }
            _ => {
                // A bare atom summand: its only factor is itself.
                debug_assert!(plan
                    .factors
                    .iter()
                    .any(|f| f.base == term && matches!(f.kind, FactorKind::Int(1))));
            }
        }
        residual
    }

    /// Reduces a product build to canonical form.
    pub(crate) fn make_mult(&mut self, build: MultBuild, do_cse: bool) -> TermId {
        let mut col = MultCollector::new(do_cse);
        col.collect_build(self, build);
        self.finish_mult(col, do_cse)
    }

    /// Finishes a collected product: exp fusion and unwrapping, base
    /// fusion across tracks, degenerate collapse, interning.
    fn finish_mult(&mut self, mut col: MultCollector, do_cse: bool) -> TermId {
        // Canonicalize the fused exponential argument, then peel off
        // what does not belong inside it: exp(c + R + log(L)) =
        // exp(c) * L * exp(R).
        let mut exp_term = None;
        if let Some(acc) = col.exp.take() {
            let mut t = self.make_add(acc, do_cse);
            loop {
                match self.ctx.term(t) {
                    Term::Scalar(v) => {
                        col.scal = col.scal * v.exp();
                        self.release(t);
                        break;
                    }
                    Term::Add(add) if !add.v0.is_zero() || add.has_log() => {
                        let add = add.clone();
                        col.scal = col.scal * add.v0.exp();
                        if let Some(l) = add.log {
                            self.ctx.retain(l);
                            col.mul_int(self, 1, l);
                        }
                        let mut rest = AddBuild::new();
                        for item in &add.items {
                            self.ctx.retain(item.term);
                            rest.push(&mut self.ctx, item.coeff, item.term);
                        }
                        self.release(t);
                        t = self.make_add(rest, do_cse);
                    }
                    _ => {
                        exp_term = Some(t);
                        break;
                    }
                }
            }
        }

        col.collect_base(&mut self.ctx);

        // An absorbed scalar decides degenerate products.
        if col.scal.is_nan() || col.scal.is_zero() {
            for (_, b) in col.int_pows.drain(..) {
                self.release(b);
            }
            for (_, b) in col.real_pows.drain(..) {
                self.release(b);
            }
            if let Some(e) = exp_term {
                self.release(e);
            }
            return if col.scal.is_nan() {
                self.ctx.nan()
            } else {
                self.ctx.zero()
            };
        }

        if col.int_pows.is_empty() && col.real_pows.is_empty() && exp_term.is_none() {
            return self.ctx.scalar(col.scal);
        }

        let core = if col.int_pows.len() == 1
            && col.int_pows[0].0 == 1
            && col.real_pows.is_empty()
            && exp_term.is_none()
        {
            col.int_pows[0].1
        } else {
            let int_pows = col
                .int_pows
                .drain(..)
                .map(|(exp, base)| IntPow { exp, base })
                .collect();
            let real_pows = col
                .real_pows
                .drain(..)
                .map(|(exp, base)| RealPow { exp, base })
                .collect();
            self.ctx.intern(Term::Mult(MultNode {
                int_pows,
                real_pows,
                exp: exp_term,
            }))
        };

        if col.scal.is_one() {
            core
        } else if self.ctx.term(core).as_add().is_some() {
            // A scaled sum distributes the scalar into its items.
            let mut ab = AddBuild::new();
            ab.push(&mut self.ctx, col.scal, core);
            self.make_add(ab, do_cse)
        } else {
            // Canonical products carry no scalar: a scaled product is
            // a one-item sum.
            self.ctx.intern(Term::Add(AddNode {
                v0: Value::ZERO,
                items: smallvec::smallvec![AddItem {
                    coeff: col.scal,
                    term: core,
                }],
                log: None,
            }))
        }
    }

    /// Divides a common scalar out of a canonical sum so that scaled
    /// copies share one base node: `(c*x + c*y)` normalizes to
    /// `(x + y)` with scale `c`, and `(c*x)^p` can reduce to
    /// `c^p * x^p`.
    ///
    /// The pivot is the constant when present, else the first item's
    /// coefficient, so the normalized sum leads with one and sign
    /// normalization falls out. A sum carrying a log term does not
    /// normalize (scaling would rewrite the log base). Results are
    /// memoized in the CSE hash, gated by the branch predictor.
    ///
    /// Borrows the caller's reference to `id`; returns an owned
    /// reference to the normalized base and the extracted scale.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not an Add node.
    pub fn normalize_add(&mut self, id: TermId, do_cse: bool) -> (TermId, Value) {
        let add = self
            .ctx
            .term(id)
            .as_add()
            .expect("normalize_add requires an Add node")
            .clone();

        if add.has_log() {
            self.ctx.retain(id);
            return (id, Value::ONE);
        }
        let pivot = if add.v0.is_zero() {
            add.coeff(0)
        } else {
            add.v0
        };
        if pivot.is_one() {
            self.ctx.retain(id);
            return (id, Value::ONE);
        }

        if do_cse {
            let predicted = self.predictor.prediction();
            if predicted {
                let hit = self.cse.get(&mut self.ctx, id);
                self.predictor.observe(hit.is_some(), predicted);
                if let Some((scal, result)) = hit {
                    log::trace!("cse: normalize hit for {id}");
                    return (result, scal);
                }
            }
        }

        let inv = pivot.recip();
        let mut ab = AddBuild::new();
        ab.add_scalar(add.v0 * inv);
        for item in &add.items {
            self.ctx.retain(item.term);
            ab.push(&mut self.ctx, item.coeff * inv, item.term);
        }
        let base = self.make_add(ab, do_cse);

        if do_cse {
            let weak = self.ctx.downgrade(base);
            self.cse.insert(id, pivot, weak);
            self.ctx.mark_tracked(id);
        }
        (base, pivot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use symdag_core::Evaluator;

    fn sym(eng: &mut Engine, name: &str) -> Ex {
        let t = eng.ctx.symbol(name);
        Ex::Term(t)
    }

    fn val(eng: &mut Engine, v: f64) -> Ex {
        let t = eng.ctx.scalar(Value::new(v));
        Ex::Term(t)
    }

    #[test]
    fn test_zero_one_absorption() {
        let mut eng = Engine::new();
        let x = eng.ctx.symbol("x");

        // 0 + 1*x collapses to the atom itself
        let mut ab = AddBuild::new();
        eng.ctx.retain(x);
        ab.push(&mut eng.ctx, Value::ONE, x);
        let r = eng.make_add(ab, true);

        assert_eq!(r, x);
        assert!(eng.ctx.term(r).as_add().is_none());
    }

    #[test]
    fn test_insertion_order_independence() {
        let mut eng = Engine::new();

        let build = |eng: &mut Engine, order: [&str; 3]| {
            let a = sym(eng, order[0]);
            let b = sym(eng, order[1]);
            let c = sym(eng, order[2]);
            let ab = eng.add(a, b);
            let abc = eng.add(ab, c);
            eng.cannonize(abc)
        };

        let r1 = build(&mut eng, ["a", "b", "c"]);
        let r2 = build(&mut eng, ["c", "b", "a"]);
        let r3 = build(&mut eng, ["b", "a", "c"]);

        assert_eq!(r1, r2);
        assert_eq!(r1, r3);
    }

    #[test]
    fn test_cancelling_coefficients() {
        let mut eng = Engine::new();

        // 2 + 3*x + (-3)*x = 2
        let x1 = sym(&mut eng, "x");
        let x2 = sym(&mut eng, "x");
        let two = val(&mut eng, 2.0);
        let three = val(&mut eng, 3.0);
        let neg_three = val(&mut eng, -3.0);

        let t1 = eng.mul(three, x1);
        let t2 = eng.mul(neg_three, x2);
        let s = eng.add(two, t1);
        let s = eng.add(s, t2);
        let r = eng.cannonize(s);

        assert_eq!(eng.ctx.term(r).as_scalar(), Some(Value::new(2.0)));
    }

    #[test]
    fn test_repeated_multiplication_fuses() {
        let mut eng = Engine::new();
        let x = eng.ctx.symbol("x");

        // x*x*x = x^3
        let a = Ex::Term({
            eng.ctx.retain(x);
            x
        });
        let b = Ex::Term({
            eng.ctx.retain(x);
            x
        });
        let c = Ex::Term(x);
        let p = eng.mul(a, b);
        let p = eng.mul(p, c);
        let r = eng.cannonize(p);

        let m = eng.ctx.term(r).as_mult().expect("a product");
        assert_eq!(m.isize(), 1);
        assert_eq!(m.ipow(0).exp, 3);
        assert_eq!(m.rsize(), 0);
        assert!(!m.has_exp());
    }

    #[test]
    fn test_power_fusion() {
        let mut eng = Engine::new();
        let x = eng.ctx.symbol("x");

        // (x^2)^3 = x^6, a single integer item
        let p = eng.pow_i(Ex::Term(x), 2);
        let p = eng.pow_i(p, 3);
        let r = eng.cannonize(p);

        let m = eng.ctx.term(r).as_mult().expect("a product");
        assert_eq!(m.isize(), 1);
        assert_eq!(m.ipow(0).exp, 6);
    }

    #[test]
    fn test_pow_one_collapses() {
        let mut eng = Engine::new();
        let x = eng.ctx.symbol("x");

        let p = eng.pow_i(Ex::Term(x), 1);
        let r = eng.cannonize(p);
        assert_eq!(r, x);
    }

    #[test]
    fn test_idempotence() {
        let mut eng = Engine::new();

        let x = sym(&mut eng, "x");
        let y = sym(&mut eng, "y");
        let s = eng.add(x, y);
        let r1 = eng.cannonize(s);
        eng.ctx.retain(r1);
        let r2 = eng.cannonize(Ex::Term(r1));

        assert_eq!(r1, r2);
    }

    #[test]
    fn test_exp_log_round_trip() {
        let mut eng = Engine::new();
        let x = eng.ctx.symbol("x");

        // exp(log(x)) resolves back to x
        let l = eng.log(Ex::Term(x));
        let e = eng.exp(l);
        let r = eng.cannonize(e);

        let x2 = eng.ctx.symbol("x");
        assert_eq!(r, x2);
    }

    #[test]
    fn test_log_sum_fuses_to_product() {
        let mut eng = Engine::new();

        // log(x) + log(y) = log(x*y): one log of one product
        let x = sym(&mut eng, "x");
        let y = sym(&mut eng, "y");
        let lx = eng.log(x);
        let ly = eng.log(y);
        let s = eng.add(lx, ly);
        let r = eng.cannonize(s);

        let add = eng.ctx.term(r).as_add().expect("a sum");
        assert_eq!(add.size(), 0);
        assert!(add.v0.is_zero());
        let l = add.log_term().expect("a fused log");
        let m = eng.ctx.term(l).as_mult().expect("a product argument");
        assert_eq!(m.isize(), 2);
    }

    #[test]
    fn test_log_of_scalar_folds() {
        let mut eng = Engine::new();

        let one = val(&mut eng, 1.0);
        let l = eng.log(one);
        let r = eng.cannonize(l);
        assert_eq!(eng.ctx.term(r).as_scalar(), Some(Value::ZERO));
    }

    #[test]
    fn test_exp_of_constant_folds() {
        let mut eng = Engine::new();

        let zero = val(&mut eng, 0.0);
        let e = eng.exp(zero);
        let r = eng.cannonize(e);
        assert_eq!(eng.ctx.term(r).as_scalar(), Some(Value::ONE));
    }

    #[test]
    fn test_exp_products_fuse() {
        let mut eng = Engine::new();

        // exp(x) * exp(y) = exp(x + y)
        let x = sym(&mut eng, "x");
        let y = sym(&mut eng, "y");
        let ex = eng.exp(x);
        let ey = eng.exp(y);
        let p = eng.mul(ex, ey);
        let r = eng.cannonize(p);

        let m = eng.ctx.term(r).as_mult().expect("a product");
        assert_eq!(m.isize(), 0);
        assert_eq!(m.rsize(), 0);
        let arg = m.exp_arg().expect("one exponential factor");
        let add = eng.ctx.term(arg).as_add().expect("a sum argument");
        assert_eq!(add.size(), 2);
        assert!(add.v0.is_zero());
    }

    #[test]
    fn test_nan_absorbs_sum() {
        let mut eng = Engine::new();

        let x = sym(&mut eng, "x");
        let nan = Ex::Term(eng.ctx.nan());
        let s = eng.add(x, nan);
        let r = eng.cannonize(s);

        let expect = eng.ctx.nan();
        assert_eq!(r, expect);
    }

    #[test]
    fn test_nan_hash_conses() {
        let mut eng = Engine::new();

        let a = eng.ctx.scalar(Value::NAN);
        let b = eng.ctx.scalar(Value::new(f64::NAN));
        assert_eq!(a, b);
    }

    #[test]
    fn test_scaled_product_wraps_in_sum() {
        let mut eng = Engine::new();

        // 2*x*y is a one-item sum over the product x*y
        let x = sym(&mut eng, "x");
        let y = sym(&mut eng, "y");
        let two = val(&mut eng, 2.0);
        let p = eng.mul(two, x);
        let p = eng.mul(p, y);
        let r = eng.cannonize(p);

        let add = eng.ctx.term(r).as_add().expect("a scaled product wraps");
        assert_eq!(add.size(), 1);
        assert_eq!(add.coeff(0), Value::new(2.0));
        assert!(add.v0.is_zero());
        assert!(eng.ctx.term(add.term(0)).as_mult().is_some());
    }

    #[test]
    fn test_normalize_extracts_common_scale() {
        let mut eng = Engine::new();
        let x = eng.ctx.symbol("x");
        let y = eng.ctx.symbol("y");

        // (2x + 2y)^3 = 8 * (x + y)^3
        let two_x = {
            let two = val(&mut eng, 2.0);
            eng.mul(two, Ex::Term(x))
        };
        let two_y = {
            let two = val(&mut eng, 2.0);
            eng.mul(two, Ex::Term(y))
        };
        let s = eng.add(two_x, two_y);
        let s = eng.cannonize(s);
        let p = eng.pow_i(Ex::Term(s), 3);
        let r = eng.cannonize(p);

        let add = eng.ctx.term(r).as_add().expect("scaled power wraps");
        assert_eq!(add.size(), 1);
        assert_eq!(add.coeff(0), Value::new(8.0));
        let m = eng.ctx.term(add.term(0)).as_mult().expect("a power");
        assert_eq!(m.isize(), 1);
        assert_eq!(m.ipow(0).exp, 3);
        let base = eng.ctx.term(m.ipow(0).base).as_add().expect("x + y");
        assert_eq!(base.size(), 2);
        assert!(base.items.iter().all(|it| it.coeff.is_one()));
    }

    #[test]
    fn test_factorization_extracts_shared_base() {
        let mut eng = Engine::new();
        let x = eng.ctx.symbol("x");
        eng.ctx.retain(x);

        // a*x*y + b*x*z = x*(a*y + b*z)
        let p1 = {
            let a = sym(&mut eng, "a");
            let y = sym(&mut eng, "y");
            let m = eng.mul(a, Ex::Term(x));
            eng.mul(m, y)
        };
        let p2 = {
            let b = sym(&mut eng, "b");
            let z = sym(&mut eng, "z");
            let xx = Ex::Term({
                eng.ctx.retain(x);
                x
            });
            let m = eng.mul(b, xx);
            eng.mul(m, z)
        };
        let s = eng.add(p1, p2);
        let r = eng.cannonize(s);

        let m = eng.ctx.term(r).as_mult().expect("a factored product");
        assert_eq!(m.isize(), 2);
        assert!(m.int_pows.iter().any(|p| p.base == x && p.exp == 1));
        let inner = m
            .int_pows
            .iter()
            .find(|p| p.base != x)
            .expect("the residual sum");
        let add = eng.ctx.term(inner.base).as_add().expect("a*y + b*z");
        assert_eq!(add.size(), 2);
    }

    #[test]
    fn test_factored_and_expanded_agree_numerically() {
        let mut eng = Engine::new();

        // Factored canonical form of a*x*y + b*x*z must evaluate like
        // the expanded original.
        let p1 = {
            let a = sym(&mut eng, "a");
            let x = sym(&mut eng, "x");
            let y = sym(&mut eng, "y");
            let m = eng.mul(a, x);
            eng.mul(m, y)
        };
        let p2 = {
            let b = sym(&mut eng, "b");
            let x = sym(&mut eng, "x");
            let z = sym(&mut eng, "z");
            let m = eng.mul(b, x);
            eng.mul(m, z)
        };
        let s = eng.add(p1, p2);
        let r = eng.cannonize(s);

        let mut ev = Evaluator::new();
        ev.bind_name(&mut eng.ctx, "a", Value::new(2.0));
        ev.bind_name(&mut eng.ctx, "b", Value::new(-3.0));
        ev.bind_name(&mut eng.ctx, "x", Value::new(5.0));
        ev.bind_name(&mut eng.ctx, "y", Value::new(7.0));
        ev.bind_name(&mut eng.ctx, "z", Value::new(11.0));

        let got = ev.eval(&eng.ctx, r).expect("fully bound");
        // 2*5*7 + (-3)*5*11 = 70 - 165 = -95
        assert_eq!(got, Value::new(-95.0));
    }

    #[test]
    fn test_division_cancels() {
        let mut eng = Engine::new();
        let x = eng.ctx.symbol("x");
        eng.ctx.retain(x);

        // x / x = 1
        let q = eng.div(Ex::Term(x), Ex::Term(x));
        let r = eng.cannonize(q);
        assert_eq!(eng.ctx.term(r).as_scalar(), Some(Value::ONE));
    }

    #[test]
    fn test_symbolic_exponent_lowers_to_exp_log() {
        let mut eng = Engine::new();

        // x^y = exp(y * log(x))
        let x = sym(&mut eng, "x");
        let y = sym(&mut eng, "y");
        let p = eng.pow(x, y);
        let r = eng.cannonize(p);

        let m = eng.ctx.term(r).as_mult().expect("a product");
        assert!(m.has_exp());
    }
}
