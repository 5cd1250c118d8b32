//! Simulated group analysis.
//!
//! Run with: cargo run --example group_analysis

use composable_spm::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn simulate_subject(seed: u64) -> Result<(Metadata, NdVar)> {
    let mut rng = StdRng::seed_from_u64(seed);
    let n_cases = 40;
    let n_times = 50;
    let condition: Vec<&str> = (0..n_cases)
        .map(|i| if i % 2 == 0 { "control" } else { "target" })
        .collect();
    let metadata = Metadata::new().with_categorical("condition", &condition)?;

    let mut values = Vec::with_capacity(n_cases * n_times);
    for c in &condition {
        for t in 0..n_times {
            let effect = if *c == "control" && (20..30).contains(&t) { 0.5 } else { 0.0 };
            values.push(effect + rng.gen_range(-1.0..1.0));
        }
    }
    let topology = Topology::new(vec![Dimension::Time {
        tmin: -0.1,
        tstep: 0.01,
        n: n_times,
    }]);
    let data = NdVar::new("erp", CaseAxis::numbered("trial", n_cases), topology, values)?;
    Ok((metadata, data))
}

fn main() -> Result<()> {
    env_logger::init();

    let formula = Formula::parse("condition")?;
    let mut models = Vec::new();
    for seed in 0..12 {
        let (metadata, data) = simulate_subject(seed)?;
        models.push(LinearModel::fit(&data, &formula, &metadata, Coding::Effect, None)?);
    }
    let rlm = RandomLm::new(models)?;
    println!("Subjects: {}", rlm.subjects().join(", "));

    let config = TTestConfig {
        samples: Some(1000),
        pmin: Some(0.05),
        mintime: 0.02,
        ..Default::default()
    };
    let caffeinator = Caffeinator::new();
    let result = {
        let _guard = caffeinator.acquire();
        rlm.column_ttest("condition", &config, &ClusterPermutationTest::default())?
    };

    println!("Clusters for 'condition' (t threshold {:.2}):", result.threshold.unwrap_or(0.0));
    for cluster in &result.clusters {
        println!(
            "  {:>6.3} - {:>6.3} s  mass {:>7.2}  p = {:.3}",
            cluster.tstart.unwrap_or(0.0),
            cluster.tstop.unwrap_or(0.0),
            cluster.mass,
            cluster.p.unwrap_or(1.0)
        );
    }
    Ok(())
}
