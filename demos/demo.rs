//! Demo: cluster-aware bootstrap comparison
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use stambo::{
    compare_models, demo_dataset, two_sample_test, ComparisonConfig, ComparisonReport,
    GroupedSample, Mae, MetricRegistry, PairSelection,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== stambo Demo ===\n");

    // 1. Clustered regression data: 20 subjects, 200 measurements
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let models = demo_dataset(20, 200, &mut rng)?.into_samples()?;
    println!(
        "1. Dataset: {} models, {} observations, {} subjects",
        models.len(),
        models[0].sample.len(),
        models[0].sample.group_index().n_groups()
    );

    // 2. One metric, one pair
    let config = ComparisonConfig::default();
    let result = two_sample_test(&models[0].sample, &models[1].sample, &Mae, &config)?;
    println!("\n2. Two-sample test (MAE, model_a - model_b):");
    println!(
        "   difference {:.4} [{:.4}, {:.4}], p = {:.4}, {}",
        result.observed, result.ci.lower, result.ci.upper, result.p_value, result.direction
    );

    // 3. The same data without groups: every measurement treated as independent
    let naive: Vec<GroupedSample> = models
        .iter()
        .map(|m| GroupedSample::new(m.sample.predictions().to_vec(), m.sample.targets().to_vec()))
        .collect::<Result<_, _>>()?;
    let naive_result = two_sample_test(&naive[0], &naive[1], &Mae, &config)?;
    println!("\n3. Ignoring subjects:");
    println!(
        "   CI width grouped {:.4} vs naive {:.4}",
        result.ci.width(),
        naive_result.ci.width()
    );

    // 4. All regression metrics with Holm correction
    let comparison = compare_models(
        &models,
        &MetricRegistry::regression(),
        &PairSelection::AllPairs,
        &config,
    )?;
    let report = ComparisonReport::new("Demo comparison", comparison);
    println!("\n4. Report:\n{}", report.to_text());
    println!("5. LaTeX:\n{}", report.to_latex());

    println!("=== Demo Complete ===");
    Ok(())
}
