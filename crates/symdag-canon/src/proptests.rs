//! Property-based tests for the canonicalizer.

use proptest::prelude::*;

use symdag_core::{Evaluator, Value};

use crate::build::Ex;
use crate::engine::Engine;

/// The symbol pool used by generated expressions.
const SYMBOLS: [&str; 4] = ["a", "b", "x", "y"];

/// A recipe for one expression, replayable against any engine.
#[derive(Clone, Debug)]
enum Recipe {
    Sym(usize),
    Const(i32),
    Add(Box<Recipe>, Box<Recipe>),
    Mul(Box<Recipe>, Box<Recipe>),
    Neg(Box<Recipe>),
    PowI(Box<Recipe>, i32),
}

fn recipe() -> impl Strategy<Value = Recipe> {
    let leaf = prop_oneof![
        (0..SYMBOLS.len()).prop_map(Recipe::Sym),
        (-4i32..5i32).prop_map(Recipe::Const),
    ];
    leaf.prop_recursive(4, 24, 3, |inner| {
        prop_oneof![
            (inner.clone(), inner.clone()).prop_map(|(a, b)| Recipe::Add(Box::new(a), Box::new(b))),
            (inner.clone(), inner.clone()).prop_map(|(a, b)| Recipe::Mul(Box::new(a), Box::new(b))),
            inner.clone().prop_map(|a| Recipe::Neg(Box::new(a))),
            (inner, 1i32..4i32).prop_map(|(a, n)| Recipe::PowI(Box::new(a), n)),
        ]
    })
}

fn build(eng: &mut Engine, r: &Recipe) -> Ex {
    match r {
        Recipe::Sym(i) => eng.symbol(SYMBOLS[*i]),
        Recipe::Const(n) => eng.scalar(Value::from(*n)),
        Recipe::Add(a, b) => {
            let a = build(eng, a);
            let b = build(eng, b);
            eng.add(a, b)
        }
        Recipe::Mul(a, b) => {
            let a = build(eng, a);
            let b = build(eng, b);
            eng.mul(a, b)
        }
        Recipe::Neg(a) => {
            let a = build(eng, a);
            eng.neg(a)
        }
        Recipe::PowI(a, n) => {
            let a = build(eng, a);
            eng.pow_i(a, *n)
        }
    }
}

fn eval_recipe(r: &Recipe, vals: &[f64]) -> f64 {
    match r {
        Recipe::Sym(i) => vals[*i],
        Recipe::Const(n) => f64::from(*n),
        Recipe::Add(a, b) => eval_recipe(a, vals) + eval_recipe(b, vals),
        Recipe::Mul(a, b) => eval_recipe(a, vals) * eval_recipe(b, vals),
        Recipe::Neg(a) => -eval_recipe(a, vals),
        Recipe::PowI(a, n) => eval_recipe(a, vals).powi(*n),
    }
}

fn bindings() -> impl Strategy<Value = [f64; 4]> {
    // Small integral values keep f64 arithmetic exact under the
    // exponents generated above
    prop::array::uniform4(-3i8..4i8).prop_map(|a| a.map(f64::from))
}

proptest! {
    #[test]
    fn cannonize_is_idempotent(r in recipe()) {
        let mut eng = Engine::new();
        let ex = build(&mut eng, &r);
        let once = eng.cannonize(ex);
        eng.ctx.retain(once);
        let twice = eng.cannonize(Ex::Term(once));
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn equal_builds_share_one_node(r in recipe()) {
        let mut eng = Engine::new();
        let ex1 = build(&mut eng, &r);
        let ex2 = build(&mut eng, &r);
        let c1 = eng.cannonize(ex1);
        let c2 = eng.cannonize(ex2);
        prop_assert_eq!(c1, c2);
    }

    #[test]
    fn addition_is_order_independent(r1 in recipe(), r2 in recipe()) {
        let mut eng = Engine::new();

        let (a, b) = (build(&mut eng, &r1), build(&mut eng, &r2));
        let ab = eng.add(a, b);
        let ab = eng.cannonize(ab);

        let (a, b) = (build(&mut eng, &r1), build(&mut eng, &r2));
        let ba = eng.add(b, a);
        let ba = eng.cannonize(ba);

        prop_assert_eq!(ab, ba);
    }

    #[test]
    fn multiplication_is_order_independent(r1 in recipe(), r2 in recipe()) {
        let mut eng = Engine::new();

        let (a, b) = (build(&mut eng, &r1), build(&mut eng, &r2));
        let ab = eng.mul(a, b);
        let ab = eng.cannonize(ab);

        let (a, b) = (build(&mut eng, &r1), build(&mut eng, &r2));
        let ba = eng.mul(b, a);
        let ba = eng.cannonize(ba);

        prop_assert_eq!(ab, ba);
    }

    #[test]
    fn canonical_form_preserves_value(r in recipe(), vals in bindings()) {
        let mut eng = Engine::new();
        let ex = build(&mut eng, &r);
        let c = eng.cannonize(ex);

        let mut ev = Evaluator::new();
        for (name, v) in SYMBOLS.iter().zip(vals.iter()) {
            ev.bind_name(&mut eng.ctx, name, Value::new(*v));
        }

        let got = ev.eval(&eng.ctx, c).expect("all symbols bound").get();
        let expect = eval_recipe(&r, &vals);

        // Scale normalization divides coefficients and multiplies the
        // scale back, so a few ulps of drift are expected
        if expect.is_nan() {
            prop_assert!(got.is_nan());
        } else {
            let tol = 1e-9 * expect.abs().max(1.0);
            prop_assert!(
                (got - expect).abs() <= tol,
                "canonical {got} != expanded {expect}"
            );
        }
    }

    #[test]
    fn cse_toggle_does_not_change_forms(r in recipe()) {
        // The CSE cache and its predictor gate are pure optimizations
        let mut eng = Engine::new();
        let ex1 = build(&mut eng, &r);
        let with_cse = eng.cannonize_with(ex1, true);
        let ex2 = build(&mut eng, &r);
        let without = eng.cannonize_with(ex2, false);
        prop_assert_eq!(with_cse, without);
    }
}
