//! Restricted arithmetic formulas
//!
//! [`compile`] turns formula text into a [`Formula`]: a postfix program plus
//! the free identifiers it references. Evaluation goes through
//! [`Formula::evaluate`] with any name-to-value map, or through a
//! pre-resolved [`Binding`] against a [`VariableRegistry`] when the same
//! formula runs once per trial.

mod eval;
mod lexer;
mod parser;
mod program;

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::BuildHasher;
use std::str::FromStr;

use tracing::debug;

use crate::registry::VariableRegistry;
use crate::SimError;

pub use program::{Arity, BinaryOp, Function, Op};

/// A compiled formula. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Formula {
    source: String,
    program: Vec<Op>,
    identifiers: Vec<String>,
    max_stack: usize,
}

/// Compile formula text.
///
/// Fails with [`SimError::Syntax`] for malformed text and
/// [`SimError::UnknownFunction`] for a call to anything outside the built-in
/// set. Variable names are recorded, not resolved.
pub fn compile(source: &str) -> Result<Formula, SimError> {
    let parsed = parser::parse(source)?;
    debug!(
        formula = source,
        identifiers = ?parsed.identifiers,
        ops = parsed.program.len(),
        "compiled formula"
    );
    Ok(Formula {
        source: source.to_string(),
        program: parsed.program,
        identifiers: parsed.identifiers,
        max_stack: parsed.max_stack,
    })
}

impl Formula {
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Free identifiers in order of first appearance.
    pub fn identifiers(&self) -> &[String] {
        &self.identifiers
    }

    pub fn references(&self, name: &str) -> bool {
        self.identifiers.iter().any(|known| known == name)
    }

    pub fn program(&self) -> &[Op] {
        &self.program
    }

    /// Evaluate against a name-to-value map.
    ///
    /// Every free identifier must be bound, otherwise this fails with
    /// [`SimError::UnboundVariable`] before any arithmetic runs. Extra
    /// bindings are ignored.
    pub fn evaluate<B: Bindings + ?Sized>(&self, bindings: &B) -> Result<f64, SimError> {
        let values = self
            .identifiers
            .iter()
            .map(|name| {
                bindings
                    .value(name)
                    .ok_or_else(|| SimError::UnboundVariable { name: name.clone() })
            })
            .collect::<Result<Vec<f64>, SimError>>()?;

        let mut stack = Vec::with_capacity(self.max_stack);
        eval::execute(&self.program, &self.identifiers, |slot| values[slot], &mut stack)
    }

    /// Resolve every free identifier to its position in `registry`.
    pub fn bind(&self, registry: &VariableRegistry) -> Result<Binding, SimError> {
        let slots = self
            .identifiers
            .iter()
            .map(|name| {
                registry
                    .index_of(name)
                    .ok_or_else(|| SimError::UnboundVariable { name: name.clone() })
            })
            .collect::<Result<Vec<usize>, SimError>>()?;
        Ok(Binding {
            slots,
            width: registry.len(),
        })
    }

    /// Evaluate against one sample set in registry order.
    ///
    /// `stack` is reused between calls to avoid an allocation per trial.
    pub fn evaluate_bound(
        &self,
        binding: &Binding,
        samples: &[f64],
        stack: &mut Vec<f64>,
    ) -> Result<f64, SimError> {
        if binding.slots.len() != self.identifiers.len() {
            return Err(SimError::InvalidArgument(
                "binding was resolved for a different formula".to_string(),
            ));
        }
        if samples.len() != binding.width {
            return Err(SimError::InvalidArgument(format!(
                "expected {} sampled values, got {}",
                binding.width,
                samples.len()
            )));
        }
        eval::execute(
            &self.program,
            &self.identifiers,
            |slot| samples.get(binding.slots[slot]).copied().unwrap_or(f64::NAN),
            stack,
        )
    }
}

impl FromStr for Formula {
    type Err = SimError;

    fn from_str(source: &str) -> Result<Self, Self::Err> {
        compile(source)
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Formula slots resolved against a particular registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    slots: Vec<usize>,
    width: usize,
}

impl Binding {
    /// Number of values each sample set must carry.
    pub fn width(&self) -> usize {
        self.width
    }
}

/// Anything that can look up a variable value by name.
pub trait Bindings {
    fn value(&self, name: &str) -> Option<f64>;
}

impl<S: BuildHasher> Bindings for HashMap<String, f64, S> {
    fn value(&self, name: &str) -> Option<f64> {
        self.get(name).copied()
    }
}

impl<S: BuildHasher> Bindings for HashMap<&str, f64, S> {
    fn value(&self, name: &str) -> Option<f64> {
        self.get(name).copied()
    }
}

impl Bindings for BTreeMap<String, f64> {
    fn value(&self, name: &str) -> Option<f64> {
        self.get(name).copied()
    }
}

impl Bindings for [(&str, f64)] {
    fn value(&self, name: &str) -> Option<f64> {
        self.iter()
            .find(|(known, _)| *known == name)
            .map(|&(_, value)| value)
    }
}

impl<const N: usize> Bindings for [(&str, f64); N] {
    fn value(&self, name: &str) -> Option<f64> {
        self.as_slice().value(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distribution::DistributionSpec;
    use proptest::prelude::*;

    fn eval_const(source: &str) -> Result<f64, SimError> {
        let unbound: [(&str, f64); 0] = [];
        compile(source)?.evaluate(&unbound)
    }

    #[test]
    fn precedence() {
        assert_eq!(eval_const("2 + 3 * 4").unwrap(), 14.0);
        assert_eq!(eval_const("(2 + 3) * 4").unwrap(), 20.0);
        assert_eq!(eval_const("10 - 4 - 3").unwrap(), 3.0);
        assert_eq!(eval_const("2 ** 3 ** 2").unwrap(), 512.0);
        assert_eq!(eval_const("-2 ** 2").unwrap(), -4.0);
        assert_eq!(eval_const("2 ** -1").unwrap(), 0.5);
        assert_eq!(eval_const("-(-3)").unwrap(), 3.0);
    }

    #[test]
    fn binds_by_name() {
        let formula = compile("x + y").unwrap();
        assert_eq!(formula.evaluate(&[("x", 2.0), ("y", 3.0)]).unwrap(), 5.0);

        let mut map = HashMap::new();
        map.insert("x".to_string(), 2.0);
        map.insert("y".to_string(), 3.0);
        map.insert("unused".to_string(), 100.0);
        assert_eq!(formula.evaluate(&map).unwrap(), 5.0);
    }

    #[test]
    fn missing_binding_is_unbound_variable() {
        let formula = compile("x + y").unwrap();
        let err = formula.evaluate(&[("x", 2.0)]).unwrap_err();
        assert!(matches!(err, SimError::UnboundVariable { name } if name == "y"));
    }

    #[test]
    fn math_domain_violations_surface() {
        for source in ["log(-1)", "log(0)", "sqrt(-1)", "1 / 0", "exp(1000)", "0 ** -1"] {
            assert!(
                matches!(eval_const(source), Err(SimError::Domain { .. })),
                "{source} did not fail with a domain error"
            );
        }
    }

    #[test]
    fn builtin_functions() {
        assert_eq!(eval_const("min(3, 1, 2)").unwrap(), 1.0);
        assert_eq!(eval_const("max(3, 1, 2)").unwrap(), 3.0);
        assert_eq!(eval_const("pow(2, 10)").unwrap(), 1024.0);
        assert_eq!(eval_const("abs(-7.5)").unwrap(), 7.5);
        assert_eq!(eval_const("sqrt(16)").unwrap(), 4.0);
        assert!((eval_const("log(exp(2))").unwrap() - 2.0).abs() < 1e-12);
        assert!(eval_const("sin(0) + cos(0) - 1").unwrap().abs() < 1e-12);
        assert!(eval_const("tan(0)").unwrap().abs() < 1e-12);
    }

    #[test]
    fn unknown_functions_never_run() {
        assert!(matches!(
            compile("__import__(1)"),
            Err(SimError::UnknownFunction { .. })
        ));
        assert!(matches!(compile("eval(x)"), Err(SimError::UnknownFunction { .. })));
    }

    #[test]
    fn records_free_identifiers() {
        let formula = compile("revenue - cost * max(units, 1)").unwrap();
        assert_eq!(formula.identifiers(), ["revenue", "cost", "units"]);
        assert!(formula.references("cost"));
        assert!(!formula.references("max"));
        assert!(compile("1 + 2").unwrap().identifiers().is_empty());
    }

    #[test]
    fn parses_via_from_str_and_displays_source() {
        let formula: Formula = "a * b".parse().unwrap();
        assert_eq!(formula.to_string(), "a * b");
        assert!("a *".parse::<Formula>().is_err());
    }

    #[test]
    fn bound_evaluation_follows_registry_order() {
        let registry = VariableRegistry::new()
            .with("a", DistributionSpec::Uniform { min: 0.0, max: 1.0 })
            .and_then(|r| r.with("b", DistributionSpec::Uniform { min: 0.0, max: 1.0 }))
            .unwrap();
        // Formula order differs from registry order.
        let formula = compile("b - a").unwrap();
        let binding = formula.bind(&registry).unwrap();
        let mut stack = Vec::new();
        assert_eq!(formula.evaluate_bound(&binding, &[1.0, 5.0], &mut stack).unwrap(), 4.0);
        assert!(formula.evaluate_bound(&binding, &[1.0], &mut stack).is_err());
    }

    #[test]
    fn bind_rejects_names_missing_from_registry() {
        let registry = VariableRegistry::new()
            .with("a", DistributionSpec::Poisson { lambda: 1.0 })
            .unwrap();
        let err = compile("a + ghost").unwrap().bind(&registry).unwrap_err();
        assert!(matches!(err, SimError::UnboundVariable { name } if name == "ghost"));
    }

    proptest! {
        #[test]
        fn addition_commutes(x in -1e6f64..1e6, y in -1e6f64..1e6) {
            let lhs = compile("x + y").unwrap().evaluate(&[("x", x), ("y", y)]).unwrap();
            let rhs = compile("y + x").unwrap().evaluate(&[("x", x), ("y", y)]).unwrap();
            prop_assert_eq!(lhs, rhs);
        }

        #[test]
        fn unary_minus_matches_multiplication(x in -1e6f64..1e6) {
            let negated = compile("-x").unwrap().evaluate(&[("x", x)]).unwrap();
            let scaled = compile("-1 * x").unwrap().evaluate(&[("x", x)]).unwrap();
            prop_assert_eq!(negated, scaled);
        }
    }
}
