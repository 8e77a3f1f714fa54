use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DefaultOnNull};

use crate::distribution::DistributionSpec;
use crate::model::Model;
use crate::registry::VariableRegistry;
use crate::sim::{RunConfig, DEFAULT_TRIALS};
use crate::SimError;

/// Declarative model description, usually read from JSON.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelConfig {
    pub formula: String,
    pub n_trials: usize,
    pub seed: Option<u64>,
    #[serde_as(as = "DefaultOnNull")]
    pub parallel: bool,
    pub variables: Vec<VariableConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VariableConfig {
    pub name: String,
    pub distribution: DistributionSpec,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            formula: String::new(),
            n_trials: DEFAULT_TRIALS,
            seed: None,
            parallel: false,
            variables: Vec::new(),
        }
    }
}

impl ModelConfig {
    pub fn from_json_str(json: &str) -> Result<Self, SimError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, SimError> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Structural checks. Variable names, distribution parameters and the
    /// formula itself are checked by [`ModelConfig::build`].
    pub fn validate(&self) -> Result<(), SimError> {
        if self.n_trials == 0 {
            return Err(SimError::InvalidArgument(
                "n_trials must be greater than zero".to_string(),
            ));
        }

        if self.formula.trim().is_empty() {
            return Err(SimError::InvalidArgument(
                "formula must not be empty".to_string(),
            ));
        }

        if self.variables.is_empty() {
            return Err(SimError::InvalidArgument(
                "at least one variable must be defined".to_string(),
            ));
        }

        Ok(())
    }

    pub fn registry(&self) -> Result<VariableRegistry, SimError> {
        let mut registry = VariableRegistry::new();
        for variable in &self.variables {
            registry.add(variable.name.clone(), variable.distribution)?;
        }
        Ok(registry)
    }

    pub fn run_config(&self) -> RunConfig {
        RunConfig {
            n_trials: self.n_trials,
            seed: self.seed,
            parallel: self.parallel,
        }
    }

    /// Validate everything and produce a runnable model.
    pub fn build(&self) -> Result<(Model, RunConfig), SimError> {
        self.validate()?;
        let model = Model::new(self.registry()?, &self.formula)?;
        Ok((model, self.run_config()))
    }
}
