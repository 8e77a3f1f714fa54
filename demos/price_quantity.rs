//! Price x quantity revenue model
//!
//! Runs the model, asks how likely revenue is to reach a few targets, and
//! estimates revenue with the price pinned.

use mcsim::report::{estimate_line, goal_line, StatisticsBlock};
use mcsim::{DistributionSpec, EstimateRequest, Model, RunConfig, SimError, VariableRegistry};

fn main() -> Result<(), SimError> {
    let registry = VariableRegistry::new()
        .with("price", DistributionSpec::Normal { mean: 100.0, std: 10.0 })?
        .with("quantity", DistributionSpec::Uniform { min: 50.0, max: 150.0 })?;
    let model = Model::new(registry, "price * quantity")?;

    let run = RunConfig {
        parallel: true,
        ..RunConfig::seeded(100_000, 42)
    };
    let report = model.run(&run)?;
    println!("{}", StatisticsBlock(&report.results));
    println!();

    for target in [8_000.0, 10_000.0, 13_000.0] {
        let goal = report.goal(target)?;
        println!("{}", goal_line(target, &goal));
    }
    println!();

    for price in [90.0, 110.0] {
        let request = EstimateRequest::new()
            .fix("price", price)
            .seed(report.outcomes.seed());
        let estimate = model.estimate(&report, &request)?;
        println!("price={price}: {}", estimate_line(&estimate));
    }

    Ok(())
}
