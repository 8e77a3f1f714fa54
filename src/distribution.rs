//! Distribution specs and their validated samplers
//!
//! A [`DistributionSpec`] is plain configuration; [`Sampler::new`] checks the
//! parameter domain once and builds the matching `rand_distr` distribution, so
//! an invalid spec is rejected before any trial runs.

use std::fmt;

use rand::Rng;
use rand_distr::{Binomial, Distribution, LogNormal, Normal, Poisson, Triangular, Uniform};
use serde::{Deserialize, Serialize};

use crate::SimError;

/// Largest trial count accepted for a binomial variable.
///
/// Integers above 2^53 are not exactly representable as `f64`.
const MAX_BINOMIAL_N: f64 = 9_007_199_254_740_992.0;

/// The six supported distribution families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistributionKind {
    Normal,
    Uniform,
    Triangular,
    LogNormal,
    Binomial,
    Poisson,
}

impl DistributionKind {
    pub const ALL: [DistributionKind; 6] = [
        DistributionKind::Normal,
        DistributionKind::Uniform,
        DistributionKind::Triangular,
        DistributionKind::LogNormal,
        DistributionKind::Binomial,
        DistributionKind::Poisson,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            DistributionKind::Normal => "normal",
            DistributionKind::Uniform => "uniform",
            DistributionKind::Triangular => "triangular",
            DistributionKind::LogNormal => "log_normal",
            DistributionKind::Binomial => "binomial",
            DistributionKind::Poisson => "poisson",
        }
    }

    /// Parameter names in the order [`DistributionSpec::from_params`] expects.
    pub fn param_names(&self) -> &'static [&'static str] {
        match self {
            DistributionKind::Normal => &["mean", "std"],
            DistributionKind::Uniform => &["min", "max"],
            DistributionKind::Triangular => &["min", "mode", "max"],
            DistributionKind::LogNormal => &["mean_log", "std_log"],
            DistributionKind::Binomial => &["n", "p"],
            DistributionKind::Poisson => &["lambda"],
        }
    }
}

impl fmt::Display for DistributionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A distribution family together with its parameters.
///
/// Binomial `n` is carried as `f64` so that every parameter list is numeric;
/// it must hold a non-negative integer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DistributionSpec {
    Normal { mean: f64, std: f64 },
    Uniform { min: f64, max: f64 },
    Triangular { min: f64, mode: f64, max: f64 },
    LogNormal { mean_log: f64, std_log: f64 },
    Binomial { n: f64, p: f64 },
    Poisson { lambda: f64 },
}

impl DistributionSpec {
    /// Build a spec from an ordered parameter list.
    ///
    /// The order follows [`DistributionKind::param_names`].
    pub fn from_params(kind: DistributionKind, params: &[f64]) -> Result<Self, SimError> {
        let expected = kind.param_names().len();
        if params.len() != expected {
            return Err(SimError::InvalidParameter {
                variable: None,
                kind,
                reason: format!(
                    "expected {expected} parameters ({}), got {}",
                    kind.param_names().join(", "),
                    params.len()
                ),
            });
        }

        let spec = match kind {
            DistributionKind::Normal => DistributionSpec::Normal {
                mean: params[0],
                std: params[1],
            },
            DistributionKind::Uniform => DistributionSpec::Uniform {
                min: params[0],
                max: params[1],
            },
            DistributionKind::Triangular => DistributionSpec::Triangular {
                min: params[0],
                mode: params[1],
                max: params[2],
            },
            DistributionKind::LogNormal => DistributionSpec::LogNormal {
                mean_log: params[0],
                std_log: params[1],
            },
            DistributionKind::Binomial => DistributionSpec::Binomial {
                n: params[0],
                p: params[1],
            },
            DistributionKind::Poisson => DistributionSpec::Poisson { lambda: params[0] },
        };
        Ok(spec)
    }

    pub fn kind(&self) -> DistributionKind {
        match self {
            DistributionSpec::Normal { .. } => DistributionKind::Normal,
            DistributionSpec::Uniform { .. } => DistributionKind::Uniform,
            DistributionSpec::Triangular { .. } => DistributionKind::Triangular,
            DistributionSpec::LogNormal { .. } => DistributionKind::LogNormal,
            DistributionSpec::Binomial { .. } => DistributionKind::Binomial,
            DistributionSpec::Poisson { .. } => DistributionKind::Poisson,
        }
    }

    /// Parameters in declaration order.
    pub fn params(&self) -> Vec<f64> {
        match *self {
            DistributionSpec::Normal { mean, std } => vec![mean, std],
            DistributionSpec::Uniform { min, max } => vec![min, max],
            DistributionSpec::Triangular { min, mode, max } => vec![min, mode, max],
            DistributionSpec::LogNormal { mean_log, std_log } => vec![mean_log, std_log],
            DistributionSpec::Binomial { n, p } => vec![n, p],
            DistributionSpec::Poisson { lambda } => vec![lambda],
        }
    }

    /// Check the parameter domain for this kind.
    pub fn validate(&self) -> Result<(), SimError> {
        let kind = self.kind();
        let invalid = |reason: String| SimError::InvalidParameter {
            variable: None,
            kind,
            reason,
        };

        for (name, value) in kind.param_names().iter().zip(self.params()) {
            if !value.is_finite() {
                return Err(invalid(format!("{name} must be finite, got {value}")));
            }
        }

        match *self {
            DistributionSpec::Normal { std, .. } if std <= 0.0 => {
                Err(invalid(format!("std must be > 0, got {std}")))
            }
            DistributionSpec::Uniform { min, max } if min > max => Err(invalid(format!(
                "min must be <= max, got min={min} max={max}"
            ))),
            // The inclusive sampler rescales the width by 1 / (1 - EPSILON).
            DistributionSpec::Uniform { min, max }
                if !((max - min) / (1.0 - f64::EPSILON)).is_finite() =>
            {
                Err(invalid(format!(
                    "range is too wide to sample, got min={min} max={max}"
                )))
            }
            DistributionSpec::Triangular { min, mode, max } if !(min <= mode && mode <= max) => {
                Err(invalid(format!(
                    "expected min <= mode <= max, got min={min} mode={mode} max={max}"
                )))
            }
            DistributionSpec::Triangular { min, max, .. } if !(max - min).is_finite() => {
                Err(invalid(format!(
                    "range is too wide to sample, got min={min} max={max}"
                )))
            }
            DistributionSpec::LogNormal { std_log, .. } if std_log <= 0.0 => {
                Err(invalid(format!("std_log must be > 0, got {std_log}")))
            }
            DistributionSpec::Binomial { n, .. }
                if n < 0.0 || n.fract() != 0.0 || n > MAX_BINOMIAL_N =>
            {
                Err(invalid(format!("n must be a non-negative integer, got {n}")))
            }
            DistributionSpec::Binomial { p, .. } if !(0.0..=1.0).contains(&p) => {
                Err(invalid(format!("p must be in [0, 1], got {p}")))
            }
            DistributionSpec::Poisson { lambda } if lambda < 0.0 => {
                Err(invalid(format!("lambda must be >= 0, got {lambda}")))
            }
            _ => Ok(()),
        }
    }

    /// Analytic mean of the distribution.
    pub fn mean(&self) -> f64 {
        match *self {
            DistributionSpec::Normal { mean, .. } => mean,
            DistributionSpec::Uniform { min, max } => 0.5 * (min + max),
            DistributionSpec::Triangular { min, mode, max } => (min + mode + max) / 3.0,
            DistributionSpec::LogNormal { mean_log, std_log } => {
                (mean_log + 0.5 * std_log * std_log).exp()
            }
            DistributionSpec::Binomial { n, p } => n * p,
            DistributionSpec::Poisson { lambda } => lambda,
        }
    }
}

impl fmt::Display for DistributionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = self.kind();
        write!(f, "{kind}(")?;
        for (i, (name, value)) in kind.param_names().iter().zip(self.params()).enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{name}={value}")?;
        }
        f.write_str(")")
    }
}

#[derive(Debug, Clone)]
enum Draw {
    /// Degenerate specs (zero-width ranges, `lambda = 0`, `n = 0`).
    Constant(f64),
    Normal(Normal<f64>),
    Uniform(Uniform<f64>),
    Triangular(Triangular<f64>),
    LogNormal(LogNormal<f64>),
    Binomial(Binomial),
    Poisson(Poisson<f64>),
}

/// A validated distribution ready to draw from.
#[derive(Debug, Clone)]
pub struct Sampler {
    spec: DistributionSpec,
    draw: Draw,
}

impl Sampler {
    /// Validate `spec` and build its sampler.
    pub fn new(spec: DistributionSpec) -> Result<Self, SimError> {
        spec.validate()?;
        let kind = spec.kind();
        let rejected = |reason: String| SimError::InvalidParameter {
            variable: None,
            kind,
            reason,
        };

        let draw = match spec {
            DistributionSpec::Normal { mean, std } => Draw::Normal(
                Normal::new(mean, std).map_err(|e| rejected(e.to_string()))?,
            ),
            DistributionSpec::Uniform { min, max } if min == max => Draw::Constant(min),
            DistributionSpec::Uniform { min, max } => {
                Draw::Uniform(Uniform::new_inclusive(min, max))
            }
            DistributionSpec::Triangular { min, max, .. } if min == max => Draw::Constant(min),
            DistributionSpec::Triangular { min, mode, max } => Draw::Triangular(
                Triangular::new(min, max, mode).map_err(|e| rejected(e.to_string()))?,
            ),
            DistributionSpec::LogNormal { mean_log, std_log } => Draw::LogNormal(
                LogNormal::new(mean_log, std_log).map_err(|e| rejected(e.to_string()))?,
            ),
            DistributionSpec::Binomial { n, .. } if n == 0.0 => Draw::Constant(0.0),
            DistributionSpec::Binomial { n, p } => Draw::Binomial(
                Binomial::new(n as u64, p).map_err(|e| rejected(e.to_string()))?,
            ),
            DistributionSpec::Poisson { lambda } if lambda == 0.0 => Draw::Constant(0.0),
            DistributionSpec::Poisson { lambda } => Draw::Poisson(
                Poisson::new(lambda).map_err(|e| rejected(e.to_string()))?,
            ),
        };

        Ok(Self { spec, draw })
    }

    /// Draw one value.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        match &self.draw {
            Draw::Constant(value) => *value,
            Draw::Normal(d) => d.sample(rng),
            Draw::Uniform(d) => d.sample(rng),
            Draw::Triangular(d) => d.sample(rng),
            Draw::LogNormal(d) => d.sample(rng),
            Draw::Binomial(d) => d.sample(rng) as f64,
            Draw::Poisson(d) => d.sample(rng),
        }
    }

    pub fn spec(&self) -> &DistributionSpec {
        &self.spec
    }

    pub fn kind(&self) -> DistributionKind {
        self.spec.kind()
    }

    /// Analytic mean of the underlying distribution.
    pub fn mean(&self) -> f64 {
        self.spec.mean()
    }
}
