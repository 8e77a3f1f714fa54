//! A registry and a formula, validated together

use tracing::info;

use crate::analysis::{analyze, estimate, Estimate, EstimateRequest, GoalProbability, Results};
use crate::formula::{compile, Formula};
use crate::registry::VariableRegistry;
use crate::sim::{run_simulation_with_cancel, CancelToken, RunConfig, TrialOutcomes};
use crate::SimError;

/// Variables plus the formula that combines them.
///
/// Construction fails unless every name in the formula is a registered
/// variable, so a `Model` can always be run.
#[derive(Debug, Clone)]
pub struct Model {
    registry: VariableRegistry,
    formula: Formula,
}

/// Raw outcomes of a run and their summary.
#[derive(Debug, Clone)]
pub struct SimulationReport {
    pub outcomes: TrialOutcomes,
    pub results: Results,
}

impl SimulationReport {
    /// Probability of meeting or exceeding `target`.
    pub fn goal(&self, target: f64) -> Result<GoalProbability, SimError> {
        self.results.goal_probability(target)
    }
}

impl Model {
    pub fn new(registry: VariableRegistry, formula: &str) -> Result<Self, SimError> {
        Self::from_parts(registry, compile(formula)?)
    }

    pub fn from_parts(registry: VariableRegistry, formula: Formula) -> Result<Self, SimError> {
        formula.bind(&registry)?;
        Ok(Self { registry, formula })
    }

    pub fn registry(&self) -> &VariableRegistry {
        &self.registry
    }

    pub fn formula(&self) -> &Formula {
        &self.formula
    }

    pub fn run(&self, config: &RunConfig) -> Result<SimulationReport, SimError> {
        self.run_with_cancel(config, &CancelToken::new())
    }

    /// Run and analyze. A run cancelled before its first trial fails with
    /// [`SimError::EmptyResult`].
    pub fn run_with_cancel(
        &self,
        config: &RunConfig,
        cancel: &CancelToken,
    ) -> Result<SimulationReport, SimError> {
        let outcomes = run_simulation_with_cancel(&self.registry, &self.formula, config, cancel)?;
        let results = analyze(outcomes.values())?;
        info!(
            count = results.count(),
            mean = results.mean(),
            median = results.median(),
            "run analyzed"
        );
        Ok(SimulationReport { outcomes, results })
    }

    /// What-if estimate against a previous run.
    pub fn estimate(
        &self,
        report: &SimulationReport,
        request: &EstimateRequest,
    ) -> Result<Estimate, SimError> {
        estimate(&self.registry, &self.formula, &report.results, request)
    }

    /// Pin the first registered variable to `value`, re-sample the rest with
    /// the report's seed and trial count.
    pub fn estimate_first(
        &self,
        report: &SimulationReport,
        value: f64,
    ) -> Result<Estimate, SimError> {
        let Some(first) = self.registry.names().next() else {
            return Err(SimError::InvalidArgument(
                "model has no variables to pin".to_string(),
            ));
        };
        let request = EstimateRequest::new()
            .fix(first, value)
            .trials(report.results.count())
            .seed(report.outcomes.seed());
        self.estimate(report, &request)
    }
}
