//! Integration tests for the stambo CLI and library.
//!
//! These tests verify end-to-end functionality including:
//! - CLI commands work correctly
//! - Dataset and configuration files are read as documented
//! - The comparator, engine and reports integrate properly

#![allow(clippy::unwrap_used)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::float_cmp)]

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use stambo::{
    compare_models, demo_dataset, two_sample_test, Accuracy, ComparisonConfig, ComparisonInput,
    ComparisonReport, CorrectionMethod, Direction, GroupedSample, Mae, MetricRegistry,
    NamedSample, PairSelection, Pairing, StamboError,
};
use std::process::Command;

fn stambo() -> Command {
    Command::new(env!("CARGO_BIN_EXE_stambo"))
}

fn write_demo_dataset(dir: &std::path::Path) -> std::path::PathBuf {
    let path = dir.join("data.json");
    let output = stambo()
        .args([
            "synthetic",
            "--subjects",
            "12",
            "--measurements",
            "90",
            "--seed",
            "7",
            "--output",
            path.to_str().unwrap(),
        ])
        .output()
        .expect("Failed to execute CLI");
    assert!(
        output.status.success(),
        "synthetic failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    path
}

// ============================================================================
// CLI Integration Tests
// ============================================================================

#[test]
fn test_cli_help_command() {
    let output = stambo().arg("--help").output().expect("Failed to execute CLI");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("stambo"), "Help should mention the binary");
    assert!(stdout.contains("compare"), "Help should list compare");
    assert!(stdout.contains("synthetic"), "Help should list synthetic");
}

#[test]
fn test_cli_synthetic_writes_dataset() {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = write_demo_dataset(temp_dir.path());

    let input = ComparisonInput::load(&path).unwrap();
    assert_eq!(input.models.len(), 2);
    assert_eq!(input.targets.as_ref().unwrap().len(), 90);
    assert_eq!(input.groups.as_ref().unwrap().len(), 90);
}

#[test]
fn test_cli_compare_json_output() {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let data = write_demo_dataset(temp_dir.path());

    let output = stambo()
        .args([
            "compare",
            "--input",
            data.to_str().unwrap(),
            "--metrics",
            "mae,mse",
            "--n-bootstrap",
            "200",
            "--format",
            "json",
        ])
        .output()
        .expect("Failed to execute CLI");
    assert!(
        output.status.success(),
        "compare failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let report: ComparisonReport = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report.result.models, vec!["model_a", "model_b"]);
    assert_eq!(report.result.metrics, vec!["mae", "mse"]);
    assert_eq!(report.summary.total_units, 2);
    assert_eq!(report.metadata.config.n_bootstrap, 200);
}

#[test]
fn test_cli_compare_with_config_file_and_latex() {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let data = write_demo_dataset(temp_dir.path());
    let config = temp_dir.path().join("config.yaml");
    std::fs::write(
        &config,
        "n_bootstrap: 100\nseed: 3\ncorrection: bonferroni\nalternative: two-sided\n",
    )
    .unwrap();
    let out = temp_dir.path().join("table.tex");

    let output = stambo()
        .args([
            "compare",
            "--input",
            data.to_str().unwrap(),
            "--config",
            config.to_str().unwrap(),
            "--format",
            "latex",
            "--output",
            out.to_str().unwrap(),
        ])
        .output()
        .expect("Failed to execute CLI");
    assert!(
        output.status.success(),
        "compare failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let latex = std::fs::read_to_string(&out).unwrap();
    assert!(latex.contains("\\begin{tabular}"));
    assert!(latex.contains("model\\_a"));
    // Regression preset picked from non-integral targets
    assert!(latex.contains("mse & mae & pearson\\_r"));
}

#[test]
fn test_cli_unknown_metric_fails() {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let data = write_demo_dataset(temp_dir.path());

    let output = stambo()
        .args([
            "compare",
            "--input",
            data.to_str().unwrap(),
            "--metrics",
            "bogus",
        ])
        .output()
        .expect("Failed to execute CLI");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unknown metric: bogus"), "stderr: {}", stderr);
}

#[test]
fn test_cli_invalid_options_fail() {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let data = write_demo_dataset(temp_dir.path());
    let data = data.to_str().unwrap();

    for args in [
        vec!["compare", "--input", data, "--alternative", "sideways"],
        vec!["compare", "--input", data, "--confidence", "1.5"],
        vec!["compare", "--input", data, "--pairs", "model_a"],
        vec!["compare", "--input", data, "--pairs", "model_a:nobody"],
        vec!["compare", "--input", "/nonexistent/data.json"],
    ] {
        let output = stambo().args(&args).output().expect("Failed to execute CLI");
        assert!(!output.status.success(), "expected failure for {:?}", args);
    }
}

// ============================================================================
// Library Integration Tests
// ============================================================================

#[test]
fn test_demo_dataset_model_a_wins_on_mae() {
    let mut rng = ChaCha8Rng::seed_from_u64(11);
    let models = demo_dataset(20, 200, &mut rng)
        .unwrap()
        .into_samples()
        .unwrap();
    let config = ComparisonConfig::default().with_n_bootstrap(1000);

    let result = two_sample_test(&models[0].sample, &models[1].sample, &Mae, &config).unwrap();

    assert!(result.observed < 0.0);
    assert_eq!(result.direction, Direction::FavorsA);
    assert!(result.p_value < 0.05, "p = {}", result.p_value);
    assert!(result.ci.upper < 0.0);
    assert!(!result.observation_fallback);
}

#[test]
fn test_compare_models_end_to_end() {
    let mut rng = ChaCha8Rng::seed_from_u64(12);
    let models = demo_dataset(15, 120, &mut rng)
        .unwrap()
        .into_samples()
        .unwrap();
    let config = ComparisonConfig::default().with_n_bootstrap(300);

    let result = compare_models(
        &models,
        &MetricRegistry::regression(),
        &PairSelection::AllPairs,
        &config,
    )
    .unwrap();

    assert!(result.is_complete());
    assert_eq!(result.entries.len(), 3);
    for entry in &result.entries {
        let test = entry.result().unwrap();
        assert!(entry.corrected_p_value().unwrap() >= test.p_value);
        assert!(test.ci.lower <= test.ci.upper);
    }

    let again = compare_models(
        &models,
        &MetricRegistry::regression(),
        &PairSelection::AllPairs,
        &config,
    )
    .unwrap();
    assert_eq!(result, again);
}

#[test]
fn test_unpaired_design_across_datasets() {
    let targets_a: Vec<f64> = (0..80).map(|i| f64::from(i % 2)).collect();
    let targets_b: Vec<f64> = (0..50).map(|i| f64::from(i % 2)).collect();
    let preds_a: Vec<f64> = targets_a
        .iter()
        .enumerate()
        .map(|(i, &t)| if i % 8 == 0 { 1.0 - t } else { t })
        .collect();
    let preds_b: Vec<f64> = targets_b
        .iter()
        .enumerate()
        .map(|(i, &t)| if i % 3 == 0 { 1.0 - t } else { t })
        .collect();
    let models = vec![
        NamedSample::new("a", GroupedSample::new(preds_a, targets_a).unwrap()),
        NamedSample::new("b", GroupedSample::new(preds_b, targets_b).unwrap()),
    ];
    let registry = MetricRegistry::new().with(Accuracy).unwrap();

    let paired = compare_models(
        &models,
        &registry,
        &PairSelection::AllPairs,
        &ComparisonConfig::default().with_n_bootstrap(200),
    )
    .unwrap();
    assert!(matches!(
        paired.entries[0].error(),
        Some(StamboError::ShapeMismatch(_))
    ));

    let unpaired = compare_models(
        &models,
        &registry,
        &PairSelection::AllPairs,
        &ComparisonConfig::default()
            .with_n_bootstrap(200)
            .with_pairing(Pairing::Unpaired)
            .with_correction(CorrectionMethod::None),
    )
    .unwrap();
    let test = unpaired.entries[0].result().unwrap();
    assert!((test.observed - (0.875 - 0.66)).abs() < 1e-9);
    assert_eq!(test.direction, Direction::FavorsA);
}

#[test]
fn test_report_renders_all_formats() {
    let mut rng = ChaCha8Rng::seed_from_u64(13);
    let models = demo_dataset(10, 60, &mut rng)
        .unwrap()
        .into_samples()
        .unwrap();
    let result = compare_models(
        &models,
        &MetricRegistry::new().with(Mae).unwrap(),
        &PairSelection::AllPairs,
        &ComparisonConfig::default().with_n_bootstrap(100),
    )
    .unwrap();
    let report = ComparisonReport::new("demo", result);

    assert!(report.to_text().contains("model_a vs model_b"));
    assert!(report.to_markdown().contains("| mae"));
    assert!(report.to_latex().contains("model\\_b"));
    assert!(report.to_json().unwrap().contains("\"p_value\""));
}
