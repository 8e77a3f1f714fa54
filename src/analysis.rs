//! Outcome statistics, goal probabilities and what-if estimates
//!
//! Conventions, used everywhere in this module:
//!
//! - standard deviation is the population form (divide by `n`);
//! - percentiles interpolate linearly between order statistics at rank
//!   `h = (n - 1) * p / 100`, and the median is `percentile(50)`;
//! - the percentile rank of a value is the share of outcomes strictly below
//!   it, so rank and exceedance probability always add up to 100%.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

use crate::formula::Formula;
use crate::registry::VariableRegistry;
use crate::sim::{run_with_fixed, CancelToken, RunConfig};
use crate::SimError;

/// Streaming mean, variance and range (Welford).
#[derive(Debug, Clone)]
pub struct StatsAccumulator {
    count: usize,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl StatsAccumulator {
    pub fn new() -> Self {
        Self {
            count: 0,
            mean: 0.0,
            m2: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }

    pub fn observe(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Population variance; zero before the first observation.
    pub fn variance(&self) -> f64 {
        if self.count > 0 {
            self.m2 / self.count as f64
        } else {
            0.0
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}

impl Default for StatsAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

/// Summary of one outcome set. Built by [`analyze`], read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Results {
    count: usize,
    mean: f64,
    median: f64,
    std_dev: f64,
    min: f64,
    max: f64,
    p2_5: f64,
    p25: f64,
    p75: f64,
    p97_5: f64,
    #[serde(skip)]
    sorted: Vec<f64>,
}

/// Where a target sits in an outcome distribution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GoalProbability {
    /// Percent of outcomes strictly below the target, in `[0, 100]`.
    pub percentile_of_target: f64,
    /// Fraction of outcomes at or above the target, in `[0, 1]`.
    pub probability: f64,
}

/// Summarise an outcome set.
///
/// Fails with [`SimError::EmptyResult`] for an empty slice and with
/// [`SimError::InvalidArgument`] if any value is not finite.
pub fn analyze(outcomes: &[f64]) -> Result<Results, SimError> {
    if outcomes.is_empty() {
        return Err(SimError::EmptyResult);
    }
    if let Some(position) = outcomes.iter().position(|value| !value.is_finite()) {
        return Err(SimError::InvalidArgument(format!(
            "outcome {position} is not finite ({})",
            outcomes[position]
        )));
    }

    let mut stats = StatsAccumulator::new();
    for &value in outcomes {
        stats.observe(value);
    }

    let mut sorted = outcomes.to_vec();
    sorted.sort_by(f64::total_cmp);
    let at = |p: f64| interpolate(&sorted, p);

    let results = Results {
        count: stats.count(),
        mean: stats.mean(),
        median: at(50.0),
        std_dev: stats.std_dev(),
        min: stats.min(),
        max: stats.max(),
        p2_5: at(2.5),
        p25: at(25.0),
        p75: at(75.0),
        p97_5: at(97.5),
        sorted,
    };
    debug!(
        count = results.count,
        mean = results.mean,
        std_dev = results.std_dev,
        "analyzed outcomes"
    );
    Ok(results)
}

/// Linearly interpolated percentile of ascending `sorted` data.
pub fn percentile(sorted: &[f64], p: f64) -> Result<f64, SimError> {
    if sorted.is_empty() {
        return Err(SimError::EmptyResult);
    }
    if !(0.0..=100.0).contains(&p) {
        return Err(SimError::InvalidArgument(format!(
            "percentile must be within [0, 100], got {p}"
        )));
    }
    Ok(interpolate(sorted, p))
}

// Caller guarantees non-empty data and p in [0, 100].
fn interpolate(sorted: &[f64], p: f64) -> f64 {
    let last = sorted.len() - 1;
    let rank = last as f64 * p / 100.0;
    let lower = (rank.floor() as usize).min(last);
    let upper = (lower + 1).min(last);
    let weight = rank - lower as f64;
    sorted[lower] + weight * (sorted[upper] - sorted[lower])
}

impl Results {
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn median(&self) -> f64 {
        self.median
    }

    /// Population standard deviation.
    pub fn std_dev(&self) -> f64 {
        self.std_dev
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn p2_5(&self) -> f64 {
        self.p2_5
    }

    pub fn p25(&self) -> f64 {
        self.p25
    }

    pub fn p75(&self) -> f64 {
        self.p75
    }

    pub fn p97_5(&self) -> f64 {
        self.p97_5
    }

    /// The 95% interval `[p2.5, p97.5]`.
    pub fn confidence_interval(&self) -> (f64, f64) {
        (self.p2_5, self.p97_5)
    }

    /// Outcomes in ascending order.
    pub fn sorted(&self) -> &[f64] {
        &self.sorted
    }

    pub fn percentile(&self, p: f64) -> Result<f64, SimError> {
        percentile(&self.sorted, p)
    }

    /// Percent of outcomes strictly below `value`.
    pub fn percentile_rank(&self, value: f64) -> f64 {
        let below = self.sorted.partition_point(|&x| x < value);
        100.0 * below as f64 / self.sorted.len() as f64
    }

    /// Probability of meeting or exceeding `target`.
    pub fn goal_probability(&self, target: f64) -> Result<GoalProbability, SimError> {
        if target.is_nan() {
            return Err(SimError::InvalidArgument(
                "goal target must be a number".to_string(),
            ));
        }
        let total = self.sorted.len();
        let below = self.sorted.partition_point(|&x| x < target);
        Ok(GoalProbability {
            percentile_of_target: 100.0 * below as f64 / total as f64,
            probability: (total - below) as f64 / total as f64,
        })
    }
}

/// What-if query: which variables to pin, and how to run the conditional
/// trials.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EstimateRequest {
    pub overrides: BTreeMap<String, f64>,
    /// Defaults to the baseline's trial count.
    pub n_trials: Option<usize>,
    pub seed: Option<u64>,
    pub parallel: bool,
}

impl EstimateRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin `name` to `value`.
    pub fn fix(mut self, name: impl Into<String>, value: f64) -> Self {
        self.overrides.insert(name.into(), value);
        self
    }

    pub fn trials(mut self, n_trials: usize) -> Self {
        self.n_trials = Some(n_trials);
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Estimate {
    /// Mean outcome with the overrides in place.
    pub expected_value: f64,
    /// Rank of `expected_value` within the baseline outcomes.
    pub percentile_of_expected_value: f64,
    pub trials: usize,
    pub seed: u64,
    /// Statistics of the conditional run itself.
    pub conditional: Results,
}

/// Re-run `formula` with the request's variables pinned and place the
/// resulting expected value in the `baseline` distribution.
///
/// Pinned variables draw no randomness; the others are re-sampled. Naming an
/// unknown variable fails with [`SimError::UnboundVariable`], a non-finite
/// value with [`SimError::InvalidArgument`].
pub fn estimate(
    registry: &VariableRegistry,
    formula: &Formula,
    baseline: &Results,
    request: &EstimateRequest,
) -> Result<Estimate, SimError> {
    let mut fixed = vec![None; registry.len()];
    for (name, &value) in &request.overrides {
        let index = registry
            .index_of(name)
            .ok_or_else(|| SimError::UnboundVariable { name: name.clone() })?;
        if !value.is_finite() {
            return Err(SimError::InvalidArgument(format!(
                "override for '{name}' must be finite, got {value}"
            )));
        }
        fixed[index] = Some(value);
    }

    let config = RunConfig {
        n_trials: request.n_trials.unwrap_or(baseline.count()),
        seed: request.seed,
        parallel: request.parallel,
    };
    let outcomes = run_with_fixed(registry, formula, &config, &fixed, &CancelToken::new())?;
    let conditional = analyze(outcomes.values())?;
    let expected_value = conditional.mean();

    debug!(
        overrides = ?request.overrides,
        expected_value,
        "estimated conditional outcome"
    );
    Ok(Estimate {
        expected_value,
        percentile_of_expected_value: baseline.percentile_rank(expected_value),
        trials: outcomes.len(),
        seed: outcomes.seed(),
        conditional,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distribution::DistributionSpec;
    use crate::formula::compile;
    use crate::sim::run_simulation;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    #[test]
    fn accumulator_matches_two_pass() {
        let data = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let mut acc = StatsAccumulator::new();
        for &x in &data {
            acc.observe(x);
        }
        assert_eq!(acc.count(), 8);
        assert_relative_eq!(acc.mean(), 5.0);
        assert_relative_eq!(acc.std_dev(), 2.0);
        assert_eq!(acc.min(), 2.0);
        assert_eq!(acc.max(), 9.0);
    }

    #[test]
    fn summary_of_small_set() {
        let results = analyze(&[3.0, 1.0, 4.0, 1.0, 5.0]).unwrap();
        assert_eq!(results.count(), 5);
        assert_relative_eq!(results.mean(), 2.8);
        assert_relative_eq!(results.median(), 3.0);
        assert_relative_eq!(results.std_dev(), 1.6, epsilon = 1e-12);
        assert_eq!(results.min(), 1.0);
        assert_eq!(results.max(), 5.0);
        // rank for p25 is 1.0 -> second smallest
        assert_relative_eq!(results.p25(), 1.0);
        assert_relative_eq!(results.p75(), 4.0);
        assert_eq!(results.sorted(), &[1.0, 1.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn percentiles_interpolate_linearly() {
        let sorted = [10.0, 20.0, 30.0, 40.0];
        assert_relative_eq!(percentile(&sorted, 0.0).unwrap(), 10.0);
        assert_relative_eq!(percentile(&sorted, 100.0).unwrap(), 40.0);
        assert_relative_eq!(percentile(&sorted, 50.0).unwrap(), 25.0);
        assert_relative_eq!(percentile(&sorted, 2.5).unwrap(), 10.75);
        assert_relative_eq!(percentile(&sorted, 97.5).unwrap(), 39.25);
        assert!(matches!(percentile(&sorted, 101.0), Err(SimError::InvalidArgument(_))));
        assert!(matches!(percentile(&[], 50.0), Err(SimError::EmptyResult)));
    }

    #[test]
    fn median_agrees_with_percentile_50() {
        let data: Vec<f64> = (0..1001).map(|i| ((i * 7919) % 1001) as f64 * 0.37).collect();
        let results = analyze(&data).unwrap();
        assert_eq!(results.percentile(50.0).unwrap(), results.median());
        let (lo, hi) = results.confidence_interval();
        assert_eq!(lo, results.p2_5());
        assert_eq!(hi, results.p97_5());
        assert!(lo <= results.median() && results.median() <= hi);
    }

    #[test]
    fn empty_and_non_finite_are_rejected() {
        assert!(matches!(analyze(&[]), Err(SimError::EmptyResult)));
        assert!(matches!(
            analyze(&[1.0, f64::NAN]),
            Err(SimError::InvalidArgument(_))
        ));
    }

    #[test]
    fn single_outcome_is_its_own_summary() {
        let results = analyze(&[42.0]).unwrap();
        assert_eq!(results.median(), 42.0);
        assert_eq!(results.std_dev(), 0.0);
        assert_eq!(results.confidence_interval(), (42.0, 42.0));
    }

    #[test]
    fn goal_at_median_is_about_even() {
        let data: Vec<f64> = (1..=999).map(f64::from).collect();
        let results = analyze(&data).unwrap();
        let goal = results.goal_probability(results.median()).unwrap();
        assert_abs_diff_eq!(goal.probability, 0.5, epsilon = 1.0 / 999.0);
        assert_abs_diff_eq!(goal.percentile_of_target + 100.0 * goal.probability, 100.0);
    }

    #[test]
    fn goal_outside_range() {
        let results = analyze(&[1.0, 2.0, 3.0, 4.0]).unwrap();
        let low = results.goal_probability(0.0).unwrap();
        assert_eq!(low.probability, 1.0);
        assert_eq!(low.percentile_of_target, 0.0);
        let high = results.goal_probability(10.0).unwrap();
        assert_eq!(high.probability, 0.0);
        assert_eq!(high.percentile_of_target, 100.0);
        // Ties count as meeting the goal.
        assert_eq!(results.goal_probability(4.0).unwrap().probability, 0.25);
        assert!(results.goal_probability(f64::NAN).is_err());
    }

    #[test]
    fn summary_is_derived_from_the_outcomes() {
        let results = analyze(&[4.0, 1.0, 3.0, 2.0]).unwrap();
        assert_eq!(results.count(), results.sorted().len());
        assert_eq!(results.sorted(), [1.0, 2.0, 3.0, 4.0]);

        let copy = results.clone();
        let goal = copy.goal_probability(3.0).unwrap();
        assert_eq!(goal.probability, 0.5);
        assert_eq!(goal.percentile_of_target, 50.0);
        assert_eq!(copy.percentile_rank(5.0), 100.0);
        assert_eq!(copy, results);
    }

    fn price_quantity() -> (VariableRegistry, Formula, Results) {
        let registry = VariableRegistry::new()
            .with("price", DistributionSpec::Normal { mean: 100.0, std: 10.0 })
            .and_then(|r| r.with("quantity", DistributionSpec::Uniform { min: 50.0, max: 150.0 }))
            .unwrap();
        let formula = compile("price * quantity").unwrap();
        let outcomes = run_simulation(&registry, &formula, &RunConfig::seeded(10_000, 9)).unwrap();
        let baseline = analyze(outcomes.values()).unwrap();
        (registry, formula, baseline)
    }

    #[test]
    fn estimate_pins_requested_variables() {
        let (registry, formula, baseline) = price_quantity();
        let request = EstimateRequest::new().fix("price", 120.0).seed(1);
        let estimate = estimate(&registry, &formula, &baseline, &request).unwrap();

        // E[120 * quantity] = 12000; standard error is about 35 at 10k trials.
        assert_abs_diff_eq!(estimate.expected_value, 12_000.0, epsilon = 175.0);
        assert_eq!(estimate.trials, baseline.count());
        assert_eq!(
            estimate.percentile_of_expected_value,
            baseline.percentile_rank(estimate.expected_value)
        );
        assert!(estimate.percentile_of_expected_value > 50.0);
        assert!(estimate.conditional.min() >= 120.0 * 50.0);
        assert!(estimate.conditional.max() <= 120.0 * 150.0);
    }

    #[test]
    fn pinning_everything_is_deterministic() {
        let (registry, formula, baseline) = price_quantity();
        let request = EstimateRequest::new()
            .fix("price", 100.0)
            .fix("quantity", 100.0)
            .trials(10);
        let estimate = estimate(&registry, &formula, &baseline, &request).unwrap();
        assert_eq!(estimate.expected_value, 10_000.0);
        assert_eq!(estimate.conditional.std_dev(), 0.0);
        assert_eq!(estimate.trials, 10);
    }

    #[test]
    fn estimate_rejects_bad_overrides() {
        let (registry, formula, baseline) = price_quantity();
        let unknown = EstimateRequest::new().fix("cost", 1.0);
        assert!(matches!(
            estimate(&registry, &formula, &baseline, &unknown),
            Err(SimError::UnboundVariable { name }) if name == "cost"
        ));
        let infinite = EstimateRequest::new().fix("price", f64::INFINITY);
        assert!(matches!(
            estimate(&registry, &formula, &baseline, &infinite),
            Err(SimError::InvalidArgument(_))
        ));
    }
}
