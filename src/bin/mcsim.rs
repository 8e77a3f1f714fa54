use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use mcsim::report::{estimate_line, goal_line, StatisticsBlock};
use mcsim::{EstimateRequest, ModelConfig};
use tracing_subscriber::EnvFilter;

/// Monte Carlo simulation of a formula over stochastic variables
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Model configuration (JSON)
    #[arg(short, long)]
    config: PathBuf,

    /// Override the configured number of trials
    #[arg(short = 'n', long)]
    trials: Option<usize>,

    /// Override the configured random seed
    #[arg(short, long)]
    seed: Option<u64>,

    /// Run trials on all cores
    #[arg(long)]
    parallel: bool,

    /// Report the probability of reaching this outcome (repeatable)
    #[arg(short, long, allow_negative_numbers = true)]
    goal: Vec<f64>,

    /// Pin a variable for the estimator, as name=value (repeatable)
    #[arg(long = "fix", value_parser = parse_override)]
    fix: Vec<(String, f64)>,

    /// Estimate the outcome with the first variable pinned to this value
    #[arg(long, allow_negative_numbers = true)]
    estimate_x: Option<f64>,
}

fn parse_override(text: &str) -> Result<(String, f64), String> {
    let (name, value) = text
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got '{text}'"))?;
    let value = value
        .trim()
        .parse::<f64>()
        .map_err(|err| format!("invalid value for '{name}': {err}"))?;
    Ok((name.trim().to_string(), value))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = ModelConfig::load(&args.config)
        .with_context(|| format!("failed to load {}", args.config.display()))?;
    if let Some(trials) = args.trials {
        config.n_trials = trials;
    }
    if args.seed.is_some() {
        config.seed = args.seed;
    }
    config.parallel |= args.parallel;

    let (model, run) = config.build().context("invalid model configuration")?;

    println!("Formula: {}", model.formula());
    for variable in model.registry().iter() {
        println!("  {} ~ {}", variable.name(), variable.spec());
    }
    println!();

    let report = model.run(&run).context("simulation failed")?;
    println!("{}", StatisticsBlock(&report.results));
    println!("  seed: {}", report.outcomes.seed());
    println!();

    for &target in &args.goal {
        let goal = report.goal(target)?;
        println!("{}", goal_line(target, &goal));
    }

    if !args.fix.is_empty() {
        let mut request = EstimateRequest::new().seed(report.outcomes.seed());
        for (name, value) in &args.fix {
            request = request.fix(name.clone(), *value);
        }
        let estimate = model
            .estimate(&report, &request)
            .context("estimate failed")?;
        let pinned: Vec<String> = args
            .fix
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect();
        println!("with {}: {}", pinned.join(", "), estimate_line(&estimate));
    }

    if let Some(value) = args.estimate_x {
        let Some(first) = model.registry().names().next() else {
            bail!("model has no variables");
        };
        let estimate = model
            .estimate_first(&report, value)
            .context("estimate failed")?;
        println!("with {first}={value}: {}", estimate_line(&estimate));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_targets_parse_as_values() {
        let args = Args::try_parse_from([
            "mcsim",
            "--config",
            "model.json",
            "--goal",
            "-5000",
            "-g",
            "250.5",
            "--estimate-x",
            "-1.5",
            "--fix",
            "cost=-20",
        ])
        .unwrap();
        assert_eq!(args.goal, [-5000.0, 250.5]);
        assert_eq!(args.estimate_x, Some(-1.5));
        assert_eq!(args.fix, [("cost".to_string(), -20.0)]);
    }

    #[test]
    fn malformed_override_is_rejected() {
        assert!(parse_override("price").is_err());
        assert!(parse_override("price=abc").is_err());
        assert_eq!(parse_override(" price = 12 ").unwrap(), ("price".to_string(), 12.0));
    }
}
