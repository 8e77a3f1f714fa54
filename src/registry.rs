//! Named variables and the registry that samples them
//!
//! Registry order is sampling order: one trial draws every variable once, in
//! the order the variables were added.

use std::collections::{BTreeMap, HashMap};

use rand::Rng;

use crate::distribution::{DistributionSpec, Sampler};
use crate::formula::Function;
use crate::SimError;

/// A named stochastic input.
#[derive(Debug, Clone)]
pub struct Variable {
    name: String,
    sampler: Sampler,
}

impl Variable {
    /// Create a variable, validating both its name and its distribution.
    pub fn new(name: impl Into<String>, spec: DistributionSpec) -> Result<Self, SimError> {
        let name = name.into();
        validate_name(&name)?;
        let sampler = Sampler::new(spec).map_err(|err| match err {
            SimError::InvalidParameter { kind, reason, .. } => SimError::InvalidParameter {
                variable: Some(name.clone()),
                kind,
                reason,
            },
            other => other,
        })?;
        Ok(Self { name, sampler })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn spec(&self) -> &DistributionSpec {
        self.sampler.spec()
    }

    pub fn sampler(&self) -> &Sampler {
        &self.sampler
    }
}

/// Check that `name` can appear in a formula as a variable reference.
pub fn validate_name(name: &str) -> Result<(), SimError> {
    let invalid = |reason: &str| SimError::InvalidVariable {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return Err(invalid("name must not be empty"));
    };
    if !(first.is_ascii_alphabetic() || first == '_') {
        return Err(invalid("name must start with a letter or underscore"));
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(invalid("name may only contain letters, digits and underscores"));
    }
    if Function::from_name(name).is_some() {
        return Err(invalid("name is reserved for a built-in function"));
    }
    Ok(())
}

/// Ordered collection of uniquely named variables.
#[derive(Debug, Clone, Default)]
pub struct VariableRegistry {
    variables: Vec<Variable>,
    index: HashMap<String, usize>,
}

impl VariableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure and add a variable.
    pub fn add(&mut self, name: impl Into<String>, spec: DistributionSpec) -> Result<(), SimError> {
        self.insert(Variable::new(name, spec)?)
    }

    /// Add an already configured variable. Names must be unique.
    pub fn insert(&mut self, variable: Variable) -> Result<(), SimError> {
        if self.index.contains_key(variable.name()) {
            return Err(SimError::InvalidVariable {
                name: variable.name,
                reason: "a variable with this name already exists".to_string(),
            });
        }
        self.index.insert(variable.name.clone(), self.variables.len());
        self.variables.push(variable);
        Ok(())
    }

    /// Builder-style [`VariableRegistry::add`].
    pub fn with(
        mut self,
        name: impl Into<String>,
        spec: DistributionSpec,
    ) -> Result<Self, SimError> {
        self.add(name, spec)?;
        Ok(self)
    }

    /// Remove a variable, keeping the order of the rest.
    pub fn remove(&mut self, name: &str) -> Option<Variable> {
        let position = self.index.remove(name)?;
        let removed = self.variables.remove(position);
        for slot in self.index.values_mut() {
            if *slot > position {
                *slot -= 1;
            }
        }
        Some(removed)
    }

    pub fn get(&self, name: &str) -> Option<&Variable> {
        self.index.get(name).map(|&i| &self.variables[i])
    }

    /// Position of `name` in sampling order.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Variable> {
        self.variables.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.variables.iter().map(Variable::name)
    }

    /// Draw one value per variable into `out`, in registry order.
    ///
    /// `fixed[i] = Some(v)` pins variable `i` to `v` without consuming
    /// randomness; an empty `fixed` samples everything.
    pub fn draw_into<R: Rng + ?Sized>(&self, rng: &mut R, fixed: &[Option<f64>], out: &mut [f64]) {
        debug_assert_eq!(out.len(), self.variables.len());
        for (i, (variable, slot)) in self.variables.iter().zip(out.iter_mut()).enumerate() {
            *slot = match fixed.get(i).copied().flatten() {
                Some(value) => value,
                None => variable.sampler.sample(rng),
            };
        }
    }

    /// Draw one sample set keyed by variable name.
    pub fn sample_set<R: Rng + ?Sized>(&self, rng: &mut R) -> BTreeMap<String, f64> {
        self.variables
            .iter()
            .map(|variable| (variable.name.clone(), variable.sampler.sample(rng)))
            .collect()
    }

    /// Pair each value in `values` (registry order) with its variable name.
    pub fn label(&self, values: &[f64]) -> Vec<(String, f64)> {
        self.names()
            .zip(values.iter().copied())
            .map(|(name, value)| (name.to_string(), value))
            .collect()
    }
}
