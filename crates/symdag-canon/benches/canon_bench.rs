//! Benchmarks for canonicalization and factor extraction.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use symdag_canon::{Engine, Ex};
use symdag_core::Value;

/// Builds `sum_i c_i * s_i` over `n` distinct symbols.
fn wide_sum(eng: &mut Engine, n: usize) -> Ex {
    let mut acc = eng.scalar(Value::ZERO);
    for i in 0..n {
        let c = eng.scalar(Value::from((i % 7) as i64 + 1));
        let s = eng.symbol(&format!("s{i}"));
        let term = eng.mul(c, s);
        acc = eng.add(acc, term);
    }
    acc
}

/// Builds `sum_i x * y_i`, which factors as `x * sum_i y_i`.
fn factorable_sum(eng: &mut Engine, n: usize) -> Ex {
    let mut acc = eng.scalar(Value::ZERO);
    for i in 0..n {
        let x = eng.symbol("x");
        let y = eng.symbol(&format!("y{i}"));
        let term = eng.mul(x, y);
        acc = eng.add(acc, term);
    }
    acc
}

fn bench_wide_sums(c: &mut Criterion) {
    let mut group = c.benchmark_group("cannonize_sum");

    for size in [8, 64, 512] {
        group.bench_with_input(BenchmarkId::new("wide", size), &size, |b, &n| {
            b.iter(|| {
                let mut eng = Engine::new();
                let ex = wide_sum(&mut eng, n);
                black_box(eng.cannonize(ex))
            });
        });
    }

    group.finish();
}

fn bench_factor_extraction(c: &mut Criterion) {
    let mut group = c.benchmark_group("factor");

    for size in [4, 16, 64] {
        group.bench_with_input(BenchmarkId::new("shared_base", size), &size, |b, &n| {
            b.iter(|| {
                let mut eng = Engine::new();
                let ex = factorable_sum(&mut eng, n);
                black_box(eng.cannonize(ex))
            });
        });
    }

    group.finish();
}

fn bench_repeated_powers(c: &mut Criterion) {
    let mut group = c.benchmark_group("pow_fusion");

    group.bench_function("nested_pow", |b| {
        b.iter(|| {
            let mut eng = Engine::new();
            let mut ex = eng.symbol("x");
            for _ in 0..16 {
                ex = eng.pow_i(ex, 2);
            }
            black_box(eng.cannonize(ex))
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_wide_sums,
    bench_factor_extraction,
    bench_repeated_powers
);
criterion_main!(benches);
