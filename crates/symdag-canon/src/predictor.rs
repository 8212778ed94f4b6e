//! Adaptive gate for the CSE cache probe.
//!
//! A tiny Bayesian predictor over the last five probe outcomes decides
//! whether consulting the CSE cache is likely to pay off at the current
//! point. Each 5-bit outcome history indexes a Dirichlet prior row of
//! two pseudo-counts; observations decay old counts before being added,
//! so the gate tracks shifting workloads. The gate affects performance
//! only — a wrong prediction skips or wastes a cache probe, never
//! changes a canonical form.

/// Number of remembered outcomes.
const LAGS: usize = 5;

/// Variance-scaling factor applied to a prior row before each update.
const DECAY: f64 = 0.995;

/// An adaptive success/failure predictor over a short outcome history.
#[derive(Debug, Clone)]
pub struct BranchPredictor {
    /// The last `LAGS` outcomes, oldest first.
    lags: [bool; LAGS],
    /// Per-pattern pseudo-counts: `[failures, successes]`.
    prior: [[f64; 2]; 1 << LAGS],
    hits: u64,
    total: u64,
}

impl Default for BranchPredictor {
    fn default() -> Self {
        Self::new()
    }
}

impl BranchPredictor {
    /// Creates a predictor with a uniform prior and an optimistic
    /// history, so the first predictions attempt the probe.
    #[must_use]
    pub fn new() -> Self {
        Self {
            lags: [true; LAGS],
            prior: [[1.0, 1.0]; 1 << LAGS],
            hits: 0,
            total: 0,
        }
    }

    /// The current lag pattern as a table index.
    fn pattern(&self) -> usize {
        self.lags
            .iter()
            .fold(0, |acc, &bit| (acc << 1) | usize::from(bit))
    }

    /// Predicts whether the next attempt will succeed.
    ///
    /// Ties predict success, so a fresh predictor always tries.
    #[must_use]
    pub fn prediction(&self) -> bool {
        let row = &self.prior[self.pattern()];
        row[1] >= row[0]
    }

    /// Records an observed outcome and the prediction that was made
    /// for it, then shifts the lag window.
    pub fn observe(&mut self, outcome: bool, predicted: bool) {
        self.total += 1;
        if outcome == predicted {
            self.hits += 1;
        }

        let row = &mut self.prior[self.pattern()];
        row[0] *= DECAY;
        row[1] *= DECAY;
        row[usize::from(outcome)] += 1.0;

        self.lags.rotate_left(1);
        self.lags[LAGS - 1] = outcome;
    }

    /// Fraction of predictions that matched their outcome.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn accuracy(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.hits as f64 / self.total as f64
    }

    /// Number of recorded observations.
    #[must_use]
    pub fn observations(&self) -> u64 {
        self.total
    }
}
