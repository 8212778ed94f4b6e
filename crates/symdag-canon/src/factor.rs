//! Common-factor search over a sum's items.
//!
//! Given the flattened, sorted items of a sum, finds the best group of
//! summands sharing a multiplicative sub-factor, e.g.
//! `a*x*y + b*x*z = x*(a*y + b*z)`. Factoring shrinks storage and
//! downstream work, and — because the selection order below is total —
//! it is what makes the canonical form independent of how the sum was
//! assembled.
//!
//! The search is greedy and single-pass: sub-factors are bucketed by
//! kind, bucketed entries are sorted by (base, exponent), candidate
//! runs are ranked by length, and length ties are broken by a
//! deterministic ambiguity order. The factored sub-sums are then
//! re-canonicalized by the caller, which may factor again.

use rustc_hash::FxHashMap;
use std::cmp::Reverse;

use symdag_core::{Context, Term, TermId, Value};

/// What a single extracted factor is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FactorKind {
    /// An integer power `base ^ exp`.
    Int(i32),
    /// A real power `base ^ exp`.
    Real(Value),
    /// An exponential factor `exp(base)`.
    Exp,
}

/// One extracted factor. The base handle is borrowed from the slot
/// terms; the caller retains it before rebuilding.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Factor {
    pub kind: FactorKind,
    pub base: TermId,
}

/// The winning factorization: which summands participate and which
/// factors come out of each of them simultaneously.
#[derive(Debug)]
pub(crate) struct FactorPlan {
    /// Indices into the sum's slot array, ascending.
    pub members: Vec<usize>,
    pub factors: Vec<Factor>,
}

#[derive(Debug, Clone, Copy)]
struct IntEntry {
    base: TermId,
    exp: i32,
    summand: u32,
}

#[derive(Debug, Clone, Copy)]
struct RealEntry {
    base: TermId,
    exp: Value,
    summand: u32,
}

#[derive(Debug, Clone, Copy)]
struct ExpEntry {
    base: TermId,
    summand: u32,
}

/// A candidate factorization: one factor shared by a set of summands.
#[derive(Debug, Clone)]
struct Candidate {
    kind: FactorKind,
    base: TermId,
    /// Participating summand indices, ascending.
    members: Vec<u32>,
}

/// Keeps the best-or-tied candidates seen so far, compared by factor
/// length (the number of summands the factor comes out of).
#[derive(Debug, Default)]
struct Factorizations {
    candidates: Vec<Candidate>,
}

impl Factorizations {
    fn offer(&mut self, c: Candidate) {
        let best = self.candidates.first().map_or(0, |b| b.members.len());
        match c.members.len().cmp(&best) {
            std::cmp::Ordering::Greater => {
                self.candidates.clear();
                self.candidates.push(c);
            }
            std::cmp::Ordering::Equal => self.candidates.push(c),
            std::cmp::Ordering::Less => {}
        }
    }
}

/// Searches the sorted slot array for the best common factor.
///
/// Returns `None` when no factor is shared by at least two summands.
pub(crate) fn search(ctx: &Context, slots: &[(Value, TermId)]) -> Option<FactorPlan> {
    if slots.len() < 2 {
        return None;
    }

    let (ints, reals, exps) = classify(ctx, slots);
    let mut best = Factorizations::default();

    scan_int_runs(&ints, &mut best);
    scan_real_runs(&reals, &mut best);
    scan_exp_groups(&exps, &mut best);

    if best.candidates.is_empty() || best.candidates[0].members.len() < 2 {
        return None;
    }

    select_group(ctx, best.candidates)
}

/// Classifies every summand's multiplicative sub-items into the three
/// factor buckets, tagged with their summand of origin. A bare atom
/// summand participates as the trivial product `atom ^ 1`.
fn classify(
    ctx: &Context,
    slots: &[(Value, TermId)],
) -> (Vec<IntEntry>, Vec<RealEntry>, Vec<ExpEntry>) {
    let mut ints = Vec::new();
    let mut reals = Vec::new();
    let mut exps = Vec::new();

    for (si, &(_, term)) in slots.iter().enumerate() {
        let si = u32::try_from(si).expect("summand index overflow");
        match ctx.term(term) {
            Term::Mult(m) => {
                for p in &m.int_pows {
                    ints.push(IntEntry {
                        base: p.base,
                        exp: p.exp,
                        summand: si,
                    });
                }
                for p in &m.real_pows {
                    reals.push(RealEntry {
                        base: p.base,
                        exp: p.exp,
                        summand: si,
                    });
                }
                if let Some(a) = m.exp_arg() {
                    exps.push(ExpEntry {
                        base: a,
                        summand: si,
                    });
                }
            }
            Term::Symbol(_) | Term::Function { .. } => ints.push(IntEntry {
                base: term,
                exp: 1,
                summand: si,
            }),
            Term::Scalar(_) | Term::Add(_) => {
                debug_assert!(false, "scalars fold and sums flatten before factoring");
            }
        }
    }

    ints.sort_unstable_by_key(|e| (e.base, e.exp));
    reals.sort_unstable_by(|a, b| (a.base, a.exp).cmp(&(b.base, b.exp)));
    exps.sort_unstable_by_key(|e| e.base);
    (ints, reals, exps)
}

fn scan_int_runs(ints: &[IntEntry], best: &mut Factorizations) {
    let mut i = 0;
    while i < ints.len() {
        let mut j = i;
        while j < ints.len() && ints[j].base == ints[i].base {
            j += 1;
        }
        let group = &ints[i..j];

        // Negative and non-negative exponents factor separately:
        // x^-2 shares no clean factor with x^3.
        let split = group.partition_point(|e| e.exp < 0);
        for part in [&group[..split], &group[split..]] {
            if let Some(c) = best_equal_run(part) {
                best.offer(c);
            }
            if let Some(c) = horner_candidate(part) {
                best.offer(c);
            }
        }
        i = j;
    }
}

/// The longest run of exactly-equal exponents within one same-sign,
/// same-base partition. Length ties prefer the larger magnitude.
fn best_equal_run(part: &[IntEntry]) -> Option<Candidate> {
    let mut best: Option<(usize, usize)> = None; // (start, len)
    let mut i = 0;
    while i < part.len() {
        let mut j = i;
        while j < part.len() && part[j].exp == part[i].exp {
            j += 1;
        }
        let len = j - i;
        if len >= 2 {
            let better = match best {
                None => true,
                Some((bs, bl)) => {
                    len > bl
                        || (len == bl && part[i].exp.unsigned_abs() > part[bs].exp.unsigned_abs())
                }
            };
            if better {
                best = Some((i, len));
            }
        }
        i = j;
    }

    best.map(|(start, len)| {
        let run = &part[start..start + len];
        let mut members: Vec<u32> = run.iter().map(|e| e.summand).collect();
        members.sort_unstable();
        Candidate {
            kind: FactorKind::Int(run[0].exp),
            base: run[0].base,
            members,
        }
    })
}

/// Horner-style candidate: factor the minimum exponent out of every
/// same-sign entry, not just the equal run. Disabled — the partial
/// extraction forces a rebuild of every touched summand, and the
/// equal-run candidate is used instead.
fn horner_candidate(_part: &[IntEntry]) -> Option<Candidate> {
    None
}

fn scan_real_runs(reals: &[RealEntry], best: &mut Factorizations) {
    let mut i = 0;
    while i < reals.len() {
        let mut j = i;
        while j < reals.len() && reals[j].base == reals[i].base && reals[j].exp == reals[i].exp {
            j += 1;
        }
        if j - i >= 2 {
            let run = &reals[i..j];
            let mut members: Vec<u32> = run.iter().map(|e| e.summand).collect();
            members.sort_unstable();
            best.offer(Candidate {
                kind: FactorKind::Real(run[0].exp),
                base: run[0].base,
                members,
            });
        }
        i = j;
    }
}

fn scan_exp_groups(exps: &[ExpEntry], best: &mut Factorizations) {
    let mut i = 0;
    while i < exps.len() {
        let mut j = i;
        while j < exps.len() && exps[j].base == exps[i].base {
            j += 1;
        }
        if j - i >= 2 {
            let run = &exps[i..j];
            let mut members: Vec<u32> = run.iter().map(|e| e.summand).collect();
            members.sort_unstable();
            best.offer(Candidate {
                kind: FactorKind::Exp,
                base: run[0].base,
                members,
            });
        }
        i = j;
    }
}

/// Merges tied candidates with identical summand sets into groups
/// (those factors come out simultaneously) and picks the winner by a
/// total order, so canonicalization never depends on traversal order.
fn select_group(ctx: &Context, candidates: Vec<Candidate>) -> Option<FactorPlan> {
    let mut groups: FxHashMap<Vec<u32>, Vec<Candidate>> = FxHashMap::default();
    for c in candidates {
        groups.entry(c.members.clone()).or_default().push(c);
    }

    let mut sets = SymbolSets::new(ctx);
    let mut ranked: Vec<(GroupKey, Vec<u32>, Vec<Candidate>)> = groups
        .into_iter()
        .map(|(members, group)| {
            let key = group_key(ctx, &mut sets, &group, &members);
            (key, members, group)
        })
        .collect();
    ranked.sort_unstable_by(|a, b| a.0.cmp(&b.0));

    let (_, members, group) = ranked.into_iter().next()?;
    log::debug!(
        "factor: extracting {} factor(s) from {} summand(s)",
        group.len(),
        members.len()
    );
    Some(FactorPlan {
        members: members.into_iter().map(|m| m as usize).collect(),
        factors: group
            .into_iter()
            .map(|c| Factor {
                kind: c.kind,
                base: c.base,
            })
            .collect(),
    })
}

/// Group ranking key, ascending order selects the winner:
/// larger groups first, then fewer symbols in the cheapest shared
/// base, fewer symbols in the union across the group's bases, the
/// smaller minimal base handle (creation order, stable across runs),
/// the less-referenced minimal base, and finally the member set.
type GroupKey = (Reverse<usize>, usize, usize, TermId, u32, Vec<u32>);

fn group_key(
    ctx: &Context,
    sets: &mut SymbolSets,
    group: &[Candidate],
    members: &[u32],
) -> GroupKey {
    let mut union = vec![0u64; sets.words];
    let mut base_syms = usize::MAX;
    let mut min_base = group[0].base;

    for c in group {
        let bits = sets.of(ctx, c.base);
        base_syms = base_syms.min(popcount(&bits));
        for (u, b) in union.iter_mut().zip(bits.iter()) {
            *u |= b;
        }
        min_base = min_base.min(c.base);
    }

    (
        Reverse(group.len()),
        base_syms,
        popcount(&union),
        min_base,
        ctx.refcount(min_base),
        members.to_vec(),
    )
}

/// Memoized per-term symbol bitsets over the context's symbol ids.
struct SymbolSets {
    words: usize,
    memo: FxHashMap<TermId, Vec<u64>>,
}

impl SymbolSets {
    fn new(ctx: &Context) -> Self {
        Self {
            words: (ctx.symbol_count() + 63) / 64,
            memo: FxHashMap::default(),
        }
    }

    fn of(&mut self, ctx: &Context, term: TermId) -> Vec<u64> {
        if let Some(bits) = self.memo.get(&term) {
            return bits.clone();
        }

        let mut bits = vec![0u64; self.words];
        match ctx.term(term) {
            Term::Scalar(_) => {}
            Term::Symbol(s) => {
                let s = *s as usize;
                bits[s / 64] |= 1 << (s % 64);
            }
            Term::Function { args, .. } => {
                for a in args.clone() {
                    or_into(&mut bits, &self.of(ctx, a));
                }
            }
            Term::Add(add) => {
                let add = add.clone();
                for item in &add.items {
                    or_into(&mut bits, &self.of(ctx, item.term));
                }
                if let Some(l) = add.log {
                    or_into(&mut bits, &self.of(ctx, l));
                }
            }
            Term::Mult(m) => {
                let m = m.clone();
                for p in &m.int_pows {
                    or_into(&mut bits, &self.of(ctx, p.base));
                }
                for p in &m.real_pows {
                    or_into(&mut bits, &self.of(ctx, p.base));
                }
                if let Some(e) = m.exp {
                    or_into(&mut bits, &self.of(ctx, e));
                }
            }
        }

        self.memo.insert(term, bits.clone());
        bits
    }
}

fn or_into(dst: &mut [u64], src: &[u64]) {
    for (d, s) in dst.iter_mut().zip(src.iter()) {
        *d |= s;
    }
}

fn popcount(bits: &[u64]) -> usize {
    bits.iter().map(|w| w.count_ones() as usize).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use symdag_core::{IntPow, MultNode, Term};

    fn mult(ctx: &mut Context, factors: &[(i32, TermId)]) -> TermId {
        let mut pows: Vec<IntPow> = factors
            .iter()
            .map(|&(exp, base)| {
                ctx.retain(base);
                IntPow { exp, base }
            })
            .collect();
        pows.sort_unstable_by_key(|p| p.base);
        ctx.intern(Term::Mult(MultNode {
            int_pows: pows.into_iter().collect(),
            real_pows: smallvec::smallvec![],
            exp: None,
        }))
    }

    #[test]
    fn test_finds_shared_base() {
        let mut ctx = Context::new();
        let x = ctx.symbol("x");
        let y = ctx.symbol("y");
        let z = ctx.symbol("z");

        // x*y + x*z share x^1
        let m1 = mult(&mut ctx, &[(1, x), (1, y)]);
        let m2 = mult(&mut ctx, &[(1, x), (1, z)]);
        let slots = vec![(Value::ONE, m1), (Value::ONE, m2)];

        let plan = search(&ctx, &slots).expect("x is shared");
        assert_eq!(plan.members, vec![0, 1]);
        assert_eq!(plan.factors.len(), 1);
        assert_eq!(plan.factors[0].base, x);
        assert!(matches!(plan.factors[0].kind, FactorKind::Int(1)));
    }

    #[test]
    fn test_prefers_longer_run() {
        let mut ctx = Context::new();
        let x = ctx.symbol("x");
        let y = ctx.symbol("y");
        let a = ctx.symbol("a");
        let b = ctx.symbol("b");
        let c = ctx.symbol("c");

        // y shared by two summands, x by three
        let m1 = mult(&mut ctx, &[(1, x), (1, a)]);
        let m2 = mult(&mut ctx, &[(1, x), (1, b), (1, y)]);
        let m3 = mult(&mut ctx, &[(1, x), (1, c), (1, y)]);
        let slots = vec![(Value::ONE, m1), (Value::ONE, m2), (Value::ONE, m3)];

        let plan = search(&ctx, &slots).expect("x is shared three ways");
        assert_eq!(plan.members, vec![0, 1, 2]);
        assert_eq!(plan.factors[0].base, x);
    }

    #[test]
    fn test_equal_runs_merge_into_one_group() {
        let mut ctx = Context::new();
        let x = ctx.symbol("x");
        let y = ctx.symbol("y");
        let a = ctx.symbol("a");
        let b = ctx.symbol("b");

        // Both x and y are shared by exactly the same two summands:
        // they factor out together
        let m1 = mult(&mut ctx, &[(1, x), (1, y), (1, a)]);
        let m2 = mult(&mut ctx, &[(1, x), (1, y), (1, b)]);
        let slots = vec![(Value::ONE, m1), (Value::ONE, m2)];

        let plan = search(&ctx, &slots).expect("x*y is shared");
        assert_eq!(plan.factors.len(), 2);
        let mut bases: Vec<TermId> = plan.factors.iter().map(|f| f.base).collect();
        bases.sort_unstable();
        let mut expect = vec![x, y];
        expect.sort_unstable();
        assert_eq!(bases, expect);
    }

    #[test]
    fn test_sign_partitions_do_not_mix() {
        let mut ctx = Context::new();
        let x = ctx.symbol("x");
        let a = ctx.symbol("a");
        let b = ctx.symbol("b");

        // x^2 and x^-2 do not share a clean factor
        let m1 = mult(&mut ctx, &[(2, x), (1, a)]);
        let m2 = mult(&mut ctx, &[(-2, x), (1, b)]);
        let slots = vec![(Value::ONE, m1), (Value::ONE, m2)];

        assert!(search(&ctx, &slots).is_none());
    }

    #[test]
    fn test_tie_prefers_larger_magnitude() {
        let mut ctx = Context::new();
        let x = ctx.symbol("x");
        let a = ctx.symbol("a");
        let b = ctx.symbol("b");
        let c = ctx.symbol("c");
        let d = ctx.symbol("d");

        // x^3 shared twice and x^1 shared twice: prefer x^3
        let m1 = mult(&mut ctx, &[(3, x), (1, a)]);
        let m2 = mult(&mut ctx, &[(3, x), (1, b)]);
        let m3 = mult(&mut ctx, &[(1, x), (1, c)]);
        let m4 = mult(&mut ctx, &[(1, x), (1, d)]);
        let slots = vec![
            (Value::ONE, m1),
            (Value::ONE, m2),
            (Value::ONE, m3),
            (Value::ONE, m4),
        ];

        let plan = search(&ctx, &slots).expect("two tied runs");
        assert!(matches!(plan.factors[0].kind, FactorKind::Int(3)));
        assert_eq!(plan.members, vec![0, 1]);
    }

    #[test]
    fn test_exp_factors_group() {
        let mut ctx = Context::new();
        let x = ctx.symbol("x");
        let a = ctx.symbol("a");
        let b = ctx.symbol("b");

        let e1 = {
            ctx.retain(x);
            ctx.retain(a);
            ctx.intern(Term::Mult(MultNode {
                int_pows: smallvec::smallvec![IntPow { exp: 1, base: a }],
                real_pows: smallvec::smallvec![],
                exp: Some(x),
            }))
        };
        let e2 = {
            ctx.retain(x);
            ctx.retain(b);
            ctx.intern(Term::Mult(MultNode {
                int_pows: smallvec::smallvec![IntPow { exp: 1, base: b }],
                real_pows: smallvec::smallvec![],
                exp: Some(x),
            }))
        };
        let slots = vec![(Value::ONE, e1), (Value::ONE, e2)];

        let plan = search(&ctx, &slots).expect("exp(x) is shared");
        assert!(matches!(plan.factors[0].kind, FactorKind::Exp));
        assert_eq!(plan.factors[0].base, x);
    }
}
