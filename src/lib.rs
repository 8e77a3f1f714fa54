//! mcsim - Monte Carlo formula simulator
//!
//! Samples a set of named stochastic variables, combines each sample set
//! through a user-supplied arithmetic formula, and summarises the resulting
//! outcome distribution (descriptive statistics, percentiles, a 95% interval,
//! goal probabilities and what-if estimates).
//!
//! The formula language is closed: numbers, variable names, `+ - * / **`,
//! parentheses and the functions `sqrt exp log sin cos tan abs min max pow`.
//! Formula text is compiled once and evaluated once per trial.

pub mod analysis;
pub mod config;
pub mod distribution;
pub mod formula;
pub mod model;
pub mod registry;
pub mod report;
pub mod sim;

use thiserror::Error;

// Re-export main types
pub use analysis::{analyze, estimate, Estimate, EstimateRequest, GoalProbability, Results};
pub use config::{ModelConfig, VariableConfig};
pub use distribution::{DistributionKind, DistributionSpec, Sampler};
pub use formula::{compile, Bindings, Formula};
pub use model::{Model, SimulationReport};
pub use registry::{Variable, VariableRegistry};
pub use sim::{
    run_simulation, run_simulation_with_cancel, run_trials, CancelToken, RunConfig, RunStatus,
    TrialOutcomes,
};

/// Every failure the simulator can report.
///
/// Errors are raised at the earliest point they can be detected: distribution
/// parameters when a variable is configured, formula text when it is
/// compiled, unresolved names before the first trial, and math-domain
/// violations in the trial that produced them.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("invalid {kind} parameters{}: {reason}", variable_suffix(.variable))]
    InvalidParameter {
        variable: Option<String>,
        kind: DistributionKind,
        reason: String,
    },
    #[error("invalid variable name '{name}': {reason}")]
    InvalidVariable { name: String, reason: String },
    #[error("syntax error at offset {position}: {message}")]
    Syntax { position: usize, message: String },
    #[error("unknown function '{name}' at offset {position}")]
    UnknownFunction { name: String, position: usize },
    #[error("variable '{name}' is not defined")]
    UnboundVariable { name: String },
    #[error("domain error in {operation}: {detail}{}", trial_suffix(.trial, .inputs))]
    Domain {
        operation: &'static str,
        detail: String,
        trial: Option<usize>,
        inputs: Vec<(String, f64)>,
    },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("no outcomes to analyze")]
    EmptyResult,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SimError {
    /// Attach the failing trial and its sampled inputs to a domain error.
    ///
    /// Other variants are returned unchanged.
    pub fn in_trial(self, trial: usize, inputs: Vec<(String, f64)>) -> Self {
        match self {
            SimError::Domain {
                operation, detail, ..
            } => SimError::Domain {
                operation,
                detail,
                trial: Some(trial),
                inputs,
            },
            other => other,
        }
    }

    pub(crate) fn domain(operation: &'static str, detail: impl Into<String>) -> Self {
        SimError::Domain {
            operation,
            detail: detail.into(),
            trial: None,
            inputs: Vec::new(),
        }
    }
}

fn variable_suffix(variable: &Option<String>) -> String {
    variable
        .as_ref()
        .map(|name| format!(" for variable '{name}'"))
        .unwrap_or_default()
}

fn trial_suffix(trial: &Option<usize>, inputs: &[(String, f64)]) -> String {
    let Some(trial) = trial else {
        return String::new();
    };
    if inputs.is_empty() {
        return format!(" (trial {trial})");
    }
    let rendered: Vec<String> = inputs
        .iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect();
    format!(" (trial {trial}, inputs: {})", rendered.join(", "))
}
