//! Trial runner
//!
//! A run draws one sample set per trial from the registry, evaluates the
//! formula against it and collects the outcome. Trials are grouped into
//! chunks of [`TRIALS_PER_STREAM`]; chunk `k` draws from its own ChaCha8
//! stream of the run seed, so the sequential and the rayon executor produce
//! the same outcomes in the same order for a given seed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::formula::{Binding, Formula};
use crate::registry::VariableRegistry;
use crate::SimError;

pub const DEFAULT_TRIALS: usize = 10_000;

/// Trials per independent random stream.
pub const TRIALS_PER_STREAM: usize = 1024;

/// Run configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunConfig {
    pub n_trials: usize,
    /// `None` draws a fresh seed from OS entropy; the seed used is recorded in
    /// the outcomes either way.
    pub seed: Option<u64>,
    pub parallel: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            n_trials: DEFAULT_TRIALS,
            seed: None,
            parallel: false,
        }
    }
}

impl RunConfig {
    pub fn seeded(n_trials: usize, seed: u64) -> Self {
        Self {
            n_trials,
            seed: Some(seed),
            parallel: false,
        }
    }

    pub fn validate(&self) -> Result<(), SimError> {
        if self.n_trials == 0 {
            return Err(SimError::InvalidArgument(
                "n_trials must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Cooperative stop request, checked between trials.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Cancelled,
}

/// Outcomes of one run, in trial order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrialOutcomes {
    values: Vec<f64>,
    seed: u64,
    requested: usize,
    status: RunStatus,
}

impl TrialOutcomes {
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn into_values(self) -> Vec<f64> {
        self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Seed the run actually used. Replaying it reproduces the run.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn requested(&self) -> usize {
        self.requested
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn is_complete(&self) -> bool {
        self.status == RunStatus::Completed
    }
}

/// Run `config.n_trials` trials of `formula` over `registry`.
///
/// Fails with [`SimError::InvalidArgument`] for a zero trial count and with
/// [`SimError::UnboundVariable`] when the formula names a variable the
/// registry lacks; both are checked before anything is sampled. A domain
/// error in any trial aborts the run and reports that trial and its inputs.
pub fn run_simulation(
    registry: &VariableRegistry,
    formula: &Formula,
    config: &RunConfig,
) -> Result<TrialOutcomes, SimError> {
    run_simulation_with_cancel(registry, formula, config, &CancelToken::new())
}

/// [`run_simulation`] with a cancellation token.
///
/// A cancelled run returns the trials finished before the stop was observed,
/// with [`RunStatus::Cancelled`].
pub fn run_simulation_with_cancel(
    registry: &VariableRegistry,
    formula: &Formula,
    config: &RunConfig,
    cancel: &CancelToken,
) -> Result<TrialOutcomes, SimError> {
    run_with_fixed(registry, formula, config, &[], cancel)
}

/// Run `n_trials` trials drawing from a caller-owned generator.
///
/// Same validation and error policy as [`run_simulation`], without stream
/// partitioning or cancellation.
pub fn run_trials<R: Rng + ?Sized>(
    registry: &VariableRegistry,
    formula: &Formula,
    n_trials: usize,
    rng: &mut R,
) -> Result<Vec<f64>, SimError> {
    RunConfig {
        n_trials,
        ..RunConfig::default()
    }
    .validate()?;
    let trials = Trials::new(registry, formula, &[])?;

    let mut samples = vec![0.0; registry.len()];
    let mut stack = Vec::new();
    (0..n_trials)
        .map(|trial| trials.run_one(rng, trial, &mut samples, &mut stack))
        .collect()
}

/// Run with some variables pinned. `fixed` is indexed in registry order; an
/// empty slice pins nothing.
pub(crate) fn run_with_fixed(
    registry: &VariableRegistry,
    formula: &Formula,
    config: &RunConfig,
    fixed: &[Option<f64>],
    cancel: &CancelToken,
) -> Result<TrialOutcomes, SimError> {
    run_until(registry, formula, config, fixed, &|_| cancel.is_cancelled())
}

/// Shared runner. `stop` is asked with the trial index before every trial;
/// once it answers `true` the chunk ends early.
fn run_until<S>(
    registry: &VariableRegistry,
    formula: &Formula,
    config: &RunConfig,
    fixed: &[Option<f64>],
    stop: &S,
) -> Result<TrialOutcomes, SimError>
where
    S: Fn(usize) -> bool + Sync,
{
    config.validate()?;
    let trials = Trials::new(registry, formula, fixed)?;

    let seed = config.seed.unwrap_or_else(rand::random);
    let n_trials = config.n_trials;
    let n_chunks = n_trials.div_ceil(TRIALS_PER_STREAM);
    info!(
        n_trials,
        seed,
        parallel = config.parallel,
        variables = registry.len(),
        formula = formula.source(),
        "starting simulation"
    );

    let run_chunk = |chunk: usize| trials.run_chunk(seed, chunk, n_trials, stop);
    let chunks: Vec<Result<Vec<f64>, SimError>> = if config.parallel {
        (0..n_chunks).into_par_iter().map(run_chunk).collect()
    } else {
        let mut chunks = Vec::with_capacity(n_chunks);
        for chunk in 0..n_chunks {
            let result = run_chunk(chunk);
            let stop = result
                .as_ref()
                .map_or(true, |values| values.len() < chunk_len(chunk, n_trials));
            chunks.push(result);
            if stop {
                break;
            }
        }
        chunks
    };

    // Scan in trial order so both executors report the same error or the
    // same completed prefix.
    let mut values = Vec::with_capacity(n_trials);
    let mut status = RunStatus::Completed;
    for (chunk, result) in chunks.into_iter().enumerate() {
        let chunk_values = result?;
        let finished = chunk_values.len() == chunk_len(chunk, n_trials);
        values.extend(chunk_values);
        if !finished {
            status = RunStatus::Cancelled;
            break;
        }
    }
    if values.len() < n_trials {
        status = RunStatus::Cancelled;
    }

    match status {
        RunStatus::Completed => info!(n_trials, seed, "simulation completed"),
        RunStatus::Cancelled => warn!(
            completed = values.len(),
            requested = n_trials,
            seed,
            "simulation cancelled"
        ),
    }

    Ok(TrialOutcomes {
        values,
        seed,
        requested: n_trials,
        status,
    })
}

fn chunk_len(chunk: usize, n_trials: usize) -> usize {
    let start = chunk * TRIALS_PER_STREAM;
    (start + TRIALS_PER_STREAM).min(n_trials) - start
}

/// Everything one trial needs, validated up front.
struct Trials<'a> {
    registry: &'a VariableRegistry,
    formula: &'a Formula,
    binding: Binding,
    fixed: &'a [Option<f64>],
}

impl<'a> Trials<'a> {
    fn new(
        registry: &'a VariableRegistry,
        formula: &'a Formula,
        fixed: &'a [Option<f64>],
    ) -> Result<Self, SimError> {
        let binding = formula.bind(registry)?;
        Ok(Self {
            registry,
            formula,
            binding,
            fixed,
        })
    }

    fn run_one<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        trial: usize,
        samples: &mut [f64],
        stack: &mut Vec<f64>,
    ) -> Result<f64, SimError> {
        self.registry.draw_into(rng, self.fixed, samples);
        self.formula
            .evaluate_bound(&self.binding, samples, stack)
            .map_err(|err| err.in_trial(trial, self.registry.label(samples)))
    }

    fn run_chunk<S: Fn(usize) -> bool>(
        &self,
        seed: u64,
        chunk: usize,
        n_trials: usize,
        stop: &S,
    ) -> Result<Vec<f64>, SimError> {
        let start = chunk * TRIALS_PER_STREAM;
        let end = start + chunk_len(chunk, n_trials);

        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        rng.set_stream(chunk as u64);

        let mut values = Vec::with_capacity(end - start);
        let mut samples = vec![0.0; self.registry.len()];
        let mut stack = Vec::new();
        for trial in start..end {
            if stop(trial) {
                break;
            }
            values.push(self.run_one(&mut rng, trial, &mut samples, &mut stack)?);
        }

        debug!(chunk, start, completed = values.len(), "chunk finished");
        Ok(values)
    }
}
