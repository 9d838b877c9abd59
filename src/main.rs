//! stambo CLI
//!
//! Bootstrap significance testing for model comparisons

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use stambo::{
    compare_models, demo_dataset, Alternative, ComparisonConfig, ComparisonInput,
    ComparisonReport, CorrectionMethod, MetricRegistry, NamedSample, PairSelection, Pairing,
};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "stambo")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Markdown,
    Latex,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Compare models on a dataset file
    Compare {
        /// Dataset file (JSON)
        #[arg(long)]
        input: PathBuf,

        /// Comparison configuration (YAML)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Metrics to compute (default: classification or regression built-ins)
        #[arg(long, value_delimiter = ',')]
        metrics: Vec<String>,

        /// Number of bootstrap replicates
        #[arg(long)]
        n_bootstrap: Option<usize>,

        /// Root random seed
        #[arg(long)]
        seed: Option<u64>,

        /// Confidence level of the intervals
        #[arg(long)]
        confidence: Option<f64>,

        /// two-sided, greater or less
        #[arg(long)]
        alternative: Option<Alternative>,

        /// paired or unpaired
        #[arg(long)]
        pairing: Option<Pairing>,

        /// none, bonferroni or holm
        #[arg(long)]
        correction: Option<CorrectionMethod>,

        /// Model pairs as A:B (default: all pairs)
        #[arg(long, value_delimiter = ',')]
        pairs: Vec<String>,

        /// Evaluate replicates on one thread
        #[arg(long)]
        sequential: bool,

        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Output file (default: stdout)
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Write a synthetic clustered dataset with two models
    Synthetic {
        /// Number of subjects
        #[arg(long, default_value = "20")]
        subjects: usize,

        /// Total number of measurements
        #[arg(long, default_value = "200")]
        measurements: usize,

        /// Random seed
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Output file (default: stdout)
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let outcome = match cli.command {
        Commands::Compare {
            input,
            config,
            metrics,
            n_bootstrap,
            seed,
            confidence,
            alternative,
            pairing,
            correction,
            pairs,
            sequential,
            format,
            output,
        } => load_config(config.as_deref()).and_then(|mut cfg| {
            if let Some(n) = n_bootstrap {
                cfg.n_bootstrap = n;
            }
            if let Some(s) = seed {
                cfg.seed = s;
            }
            if let Some(c) = confidence {
                cfg.confidence = c;
            }
            if let Some(a) = alternative {
                cfg.alternative = a;
            }
            if let Some(p) = pairing {
                cfg.pairing = p;
            }
            if let Some(c) = correction {
                cfg.correction = c;
            }
            if sequential {
                cfg.parallel = false;
            }
            cfg.validate().context("invalid comparison settings")?;
            run_compare(&input, &cfg, &metrics, &pairs, format, output.as_deref())
        }),
        Commands::Synthetic {
            subjects,
            measurements,
            seed,
            output,
        } => run_synthetic(subjects, measurements, seed, output.as_deref()),
    };

    if let Err(e) = outcome {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn load_config(path: Option<&Path>) -> Result<ComparisonConfig> {
    match path {
        Some(path) => ComparisonConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display())),
        None => Ok(ComparisonConfig::default()),
    }
}

/// Metrics named on the command line, or a preset matching the targets
fn select_metrics(names: &[String], models: &[NamedSample]) -> Result<MetricRegistry> {
    if names.is_empty() {
        let integral = models
            .iter()
            .flat_map(|m| m.sample.targets())
            .all(|t| t.fract() == 0.0);
        return Ok(if integral {
            MetricRegistry::classification()
        } else {
            MetricRegistry::regression()
        });
    }
    MetricRegistry::builtin().select(names).map_err(|err| {
        anyhow::anyhow!(
            "{err} (available: {})",
            MetricRegistry::builtin().names().join(", ")
        )
    })
}

fn parse_pairs(pairs: &[String]) -> Result<PairSelection> {
    if pairs.is_empty() {
        return Ok(PairSelection::AllPairs);
    }
    let mut parsed = Vec::with_capacity(pairs.len());
    for pair in pairs {
        let Some((a, b)) = pair.split_once(':') else {
            bail!("pair '{pair}' is not of the form A:B");
        };
        parsed.push((a.trim().to_string(), b.trim().to_string()));
    }
    Ok(PairSelection::Pairs(parsed))
}

fn run_compare(
    input: &Path,
    config: &ComparisonConfig,
    metric_names: &[String],
    pairs: &[String],
    format: OutputFormat,
    output: Option<&Path>,
) -> Result<()> {
    let models = ComparisonInput::load(input)
        .and_then(ComparisonInput::into_samples)
        .with_context(|| format!("failed to read dataset {}", input.display()))?;
    let metrics = select_metrics(metric_names, &models)?;
    let selection = parse_pairs(pairs)?;

    tracing::info!(
        input = %input.display(),
        models = models.len(),
        metrics = ?metrics.names(),
        "Starting comparison"
    );

    let result = compare_models(&models, &metrics, &selection, config)?;
    let failed = result.failures().count();
    let title = format!(
        "Model comparison: {}",
        input.file_stem().map_or_else(
            || input.display().to_string(),
            |s| s.to_string_lossy().into_owned()
        )
    );
    let report = ComparisonReport::new(title, result);

    let rendered = match format {
        OutputFormat::Text => report.to_text(),
        OutputFormat::Markdown => report.to_markdown(),
        OutputFormat::Latex => report.to_latex(),
        OutputFormat::Json => report.to_json().context("failed to serialize report")?,
    };
    write_output(&rendered, output)?;

    if failed > 0 {
        tracing::warn!(failed, "some comparisons failed, see report");
    }
    Ok(())
}

fn run_synthetic(
    subjects: usize,
    measurements: usize,
    seed: u64,
    output: Option<&Path>,
) -> Result<()> {
    tracing::info!(subjects, measurements, seed, "Generating synthetic dataset");
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let dataset = demo_dataset(subjects, measurements, &mut rng)?;
    let json = serde_json::to_string_pretty(&dataset)?;
    write_output(&json, output)
}

fn write_output(content: &str, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, content)
                .with_context(|| format!("failed to write {}", path.display()))?;
            tracing::info!(path = %path.display(), "Wrote output");
        }
        None => println!("{content}"),
    }
    Ok(())
}
