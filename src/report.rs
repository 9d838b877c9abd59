//! Report rendering for comparison results.
//!
//! Renders a [`ComparisonResult`] as:
//! - a LaTeX `tabular` (models as rows, metrics as columns, one p-value row per pair)
//! - Markdown and plain-text tables
//! - pretty-printed JSON
//!
//! Statistics are never re-derived here. Failed units are shown as
//! `failed: <reason>` rather than dropped.

use crate::compare::{ComparisonEntry, ComparisonResult, UnitOutcome};
use crate::config::{Alternative, ComparisonConfig, CorrectionMethod, Pairing};
use crate::engine::MetricEstimate;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as FmtWrite;
use tabled::settings::Style;
use tabled::{Table, Tabled};

/// Comparison result with report metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonReport {
    /// Report metadata
    pub metadata: ReportMetadata,
    /// Unit counts
    pub summary: ReportSummary,
    /// The comparison being reported
    pub result: ComparisonResult,
}

/// Report metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    /// Report title
    pub title: String,
    /// Report generation timestamp
    pub generated_at: DateTime<Utc>,
    /// Crate version
    pub framework_version: String,
    /// Settings the comparison ran with
    pub config: ConfigSummary,
}

/// Settings shown in report headers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSummary {
    pub n_bootstrap: usize,
    pub confidence: f64,
    pub alternative: Alternative,
    pub pairing: Pairing,
    pub correction: CorrectionMethod,
    pub alpha: f64,
    pub seed: u64,
}

impl From<&ComparisonConfig> for ConfigSummary {
    fn from(config: &ComparisonConfig) -> Self {
        Self {
            n_bootstrap: config.n_bootstrap,
            confidence: config.confidence,
            alternative: config.alternative,
            pairing: config.pairing,
            correction: config.correction,
            alpha: config.alpha,
            seed: config.seed,
        }
    }
}

/// Unit counts of a comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total_units: usize,
    pub completed: usize,
    pub failed: usize,
    /// Units whose corrected p-value is below alpha
    pub significant: usize,
}

impl From<&ComparisonResult> for ReportSummary {
    fn from(result: &ComparisonResult) -> Self {
        Self {
            total_units: result.entries.len(),
            completed: result.completed().count(),
            failed: result.failures().count(),
            significant: result
                .entries
                .iter()
                .filter(|e| e.is_significant())
                .count(),
        }
    }
}

/// Per-unit table row
#[derive(Tabled)]
struct UnitTableRow {
    #[tabled(rename = "Metric")]
    metric: String,
    #[tabled(rename = "Comparison")]
    comparison: String,
    #[tabled(rename = "Difference [CI]")]
    difference: String,
    #[tabled(rename = "p-value")]
    p_value: String,
    #[tabled(rename = "Corrected p")]
    corrected: String,
    #[tabled(rename = "Direction")]
    direction: String,
    #[tabled(rename = "Significant")]
    significant: String,
}

impl UnitTableRow {
    fn from_entry(entry: &ComparisonEntry) -> Self {
        let comparison = format!("{} vs {}", entry.model_a, entry.model_b);
        match &entry.outcome {
            UnitOutcome::Completed {
                result,
                corrected_p_value,
                significant,
            } => Self {
                metric: entry.metric.clone(),
                comparison,
                difference: format!(
                    "{:.4} [{:.4}, {:.4}]",
                    result.observed, result.ci.lower, result.ci.upper
                ),
                p_value: format!("{:.4}", result.p_value),
                corrected: format!("{corrected_p_value:.4}"),
                direction: result.direction.to_string(),
                significant: if *significant { "yes" } else { "no" }.to_string(),
            },
            UnitOutcome::Failed { error } => Self {
                metric: entry.metric.clone(),
                comparison,
                difference: format!("failed: {error}"),
                p_value: "-".to_string(),
                corrected: "-".to_string(),
                direction: "-".to_string(),
                significant: "-".to_string(),
            },
        }
    }
}

/// Per-model table row
#[derive(Tabled)]
struct ModelTableRow {
    #[tabled(rename = "Model")]
    model: String,
    #[tabled(rename = "Metric")]
    metric: String,
    #[tabled(rename = "Value [CI]")]
    value: String,
}

fn format_estimate(estimate: Option<MetricEstimate>) -> String {
    estimate.map_or_else(
        || "n/a".to_string(),
        |e| format!("{:.4} [{:.4}, {:.4}]", e.observed, e.ci.lower, e.ci.upper),
    )
}

/// Escape LaTeX special characters in names and messages
fn latex_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '_' | '%' | '&' | '#' | '$' | '{' | '}' => {
                out.push('\\');
                out.push(c);
            }
            '\\' => out.push_str("\\textbackslash{}"),
            '~' => out.push_str("\\textasciitilde{}"),
            '^' => out.push_str("\\textasciicircum{}"),
            _ => out.push(c),
        }
    }
    out
}

impl ComparisonReport {
    /// Wrap a comparison result
    #[must_use]
    pub fn new(title: impl Into<String>, result: ComparisonResult) -> Self {
        Self {
            metadata: ReportMetadata {
                title: title.into(),
                generated_at: Utc::now(),
                framework_version: env!("CARGO_PKG_VERSION").to_string(),
                config: ConfigSummary::from(&result.config),
            },
            summary: ReportSummary::from(&result),
            result,
        }
    }

    /// Render report as JSON
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Render as a LaTeX `tabular`
    ///
    /// One row per model with `value [lower-upper]` cells, followed by one
    /// row of raw (corrected) p-values per model pair.
    #[must_use]
    pub fn to_latex(&self) -> String {
        let result = &self.result;
        let mut output = String::new();

        writeln!(
            output,
            "\\begin{{tabular}}{{l{}}}",
            "c".repeat(result.metrics.len())
        )
        .ok();
        writeln!(output, "\\toprule").ok();
        let header: Vec<String> = result.metrics.iter().map(|m| latex_escape(m)).collect();
        writeln!(output, "Model & {} \\\\", header.join(" & ")).ok();
        writeln!(output, "\\midrule").ok();

        for model in &result.models {
            let cells: Vec<String> = result
                .metrics
                .iter()
                .map(|metric| {
                    result.model_estimate(metric, model).map_or_else(
                        || "--".to_string(),
                        |e| format!("{:.3} [{:.3}-{:.3}]", e.observed, e.ci.lower, e.ci.upper),
                    )
                })
                .collect();
            writeln!(output, "{} & {} \\\\", latex_escape(model), cells.join(" & ")).ok();
        }

        if !result.pairs.is_empty() {
            writeln!(output, "\\midrule").ok();
        }
        for (a, b) in &result.pairs {
            let cells: Vec<String> = result
                .metrics
                .iter()
                .map(|metric| match result.get(metric, a, b).map(|e| &e.outcome) {
                    Some(UnitOutcome::Completed {
                        result,
                        corrected_p_value,
                        ..
                    }) => format!("{:.3} ({corrected_p_value:.3})", result.p_value),
                    Some(UnitOutcome::Failed { error }) => {
                        latex_escape(&format!("failed: {error}"))
                    }
                    None => "--".to_string(),
                })
                .collect();
            writeln!(
                output,
                "$p$ {} vs {} & {} \\\\",
                latex_escape(a),
                latex_escape(b),
                cells.join(" & ")
            )
            .ok();
        }

        writeln!(output, "\\bottomrule").ok();
        writeln!(output, "\\end{{tabular}}").ok();
        output
    }

    /// Render report as markdown
    #[must_use]
    pub fn to_markdown(&self) -> String {
        let mut output = String::new();
        let config = &self.metadata.config;

        writeln!(output, "# {}", self.metadata.title).ok();
        writeln!(output).ok();
        writeln!(
            output,
            "**Generated:** {}",
            self.metadata.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
        )
        .ok();
        writeln!(
            output,
            "**Framework Version:** {}",
            self.metadata.framework_version
        )
        .ok();
        writeln!(output).ok();

        writeln!(output, "## Comparisons").ok();
        writeln!(output).ok();
        let rows: Vec<UnitTableRow> = self
            .result
            .entries
            .iter()
            .map(UnitTableRow::from_entry)
            .collect();
        writeln!(output, "{}", Table::new(rows).with(Style::markdown())).ok();
        writeln!(output).ok();

        writeln!(output, "## Models").ok();
        writeln!(output).ok();
        writeln!(
            output,
            "{}",
            Table::new(self.model_rows()).with(Style::markdown())
        )
        .ok();
        writeln!(output).ok();

        writeln!(output, "## Configuration").ok();
        writeln!(output).ok();
        writeln!(output, "- Bootstrap replicates: {}", config.n_bootstrap).ok();
        writeln!(output, "- Confidence level: {}%", config.confidence * 100.0).ok();
        writeln!(output, "- Alternative: {}", config.alternative).ok();
        writeln!(output, "- Pairing: {}", config.pairing).ok();
        writeln!(output, "- Correction: {}", config.correction).ok();
        writeln!(output, "- Significance threshold (α): {}", config.alpha).ok();
        writeln!(output, "- Seed: {}", config.seed).ok();

        output
    }

    /// Render report as plain text table
    #[must_use]
    pub fn to_text(&self) -> String {
        let mut output = String::new();
        let rule = "───────────────────────────────────────────────────────────────";

        writeln!(
            output,
            "═══════════════════════════════════════════════════════════════"
        )
        .ok();
        writeln!(output, "  {}", self.metadata.title).ok();
        writeln!(
            output,
            "═══════════════════════════════════════════════════════════════"
        )
        .ok();
        writeln!(output).ok();

        writeln!(output, "SUMMARY").ok();
        writeln!(output, "{rule}").ok();
        writeln!(output, "  Units:        {}", self.summary.total_units).ok();
        writeln!(output, "  Completed:    {}", self.summary.completed).ok();
        writeln!(output, "  Failed:       {}", self.summary.failed).ok();
        writeln!(
            output,
            "  Significant:  {} (α = {}, {})",
            self.summary.significant, self.metadata.config.alpha, self.metadata.config.correction
        )
        .ok();
        writeln!(
            output,
            "  Replicates:   {} ({}, {})",
            self.metadata.config.n_bootstrap,
            self.metadata.config.pairing,
            self.metadata.config.alternative
        )
        .ok();
        writeln!(output).ok();

        writeln!(output, "COMPARISONS").ok();
        writeln!(output, "{rule}").ok();
        let rows: Vec<UnitTableRow> = self
            .result
            .entries
            .iter()
            .map(UnitTableRow::from_entry)
            .collect();
        writeln!(output, "{}", Table::new(rows)).ok();
        writeln!(output).ok();

        writeln!(output, "MODELS").ok();
        writeln!(output, "{rule}").ok();
        writeln!(output, "{}", Table::new(self.model_rows())).ok();

        output
    }

    fn model_rows(&self) -> Vec<ModelTableRow> {
        let result = &self.result;
        result
            .models
            .iter()
            .flat_map(|model| {
                result.metrics.iter().map(move |metric| ModelTableRow {
                    model: model.clone(),
                    metric: metric.clone(),
                    value: format_estimate(result.model_estimate(metric, model)),
                })
            })
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::compare::{compare_models, NamedSample, PairSelection};
    use crate::metrics::{Accuracy, FnMetric, MetricRegistry};
    use crate::sample::GroupedSample;

    fn create_test_result() -> ComparisonResult {
        let targets: Vec<f64> = (0..60).map(|i| f64::from(i % 2)).collect();
        let good: Vec<f64> = targets
            .iter()
            .enumerate()
            .map(|(i, &t)| if i % 10 == 0 { 1.0 - t } else { t })
            .collect();
        let weak: Vec<f64> = targets
            .iter()
            .enumerate()
            .map(|(i, &t)| if i % 3 == 0 { 1.0 - t } else { t })
            .collect();
        let models = vec![
            NamedSample::new("good_model", GroupedSample::new(good, targets.clone()).unwrap()),
            NamedSample::new("weak", GroupedSample::new(weak, targets).unwrap()),
        ];
        let registry = MetricRegistry::new()
            .with(Accuracy)
            .unwrap()
            .with(FnMetric::new("broken", |_: &[f64], _: &[f64]| f64::NAN))
            .unwrap();
        let config = ComparisonConfig::default().with_n_bootstrap(100);
        compare_models(&models, &registry, &PairSelection::AllPairs, &config).unwrap()
    }

    #[test]
    fn test_summary_counts() {
        let report = ComparisonReport::new("test", create_test_result());
        assert_eq!(report.summary.total_units, 2);
        assert_eq!(report.summary.completed, 1);
        assert_eq!(report.summary.failed, 1);
        assert_eq!(report.metadata.framework_version, env!("CARGO_PKG_VERSION"));
        assert_eq!(report.metadata.config.n_bootstrap, 100);
    }

    #[test]
    fn test_to_latex() {
        let latex = ComparisonReport::new("test", create_test_result()).to_latex();

        assert!(latex.starts_with("\\begin{tabular}{lcc}"));
        assert!(latex.trim_end().ends_with("\\end{tabular}"));
        assert!(latex.contains("Model & accuracy & broken \\\\"));
        assert!(latex.contains("good\\_model & 0.9"));
        assert!(latex.contains("$p$ good\\_model vs weak"));
        assert!(latex.contains("failed: Metric 'broken'"));
    }

    #[test]
    fn test_to_markdown() {
        let md = ComparisonReport::new("Model comparison", create_test_result()).to_markdown();

        assert!(md.contains("# Model comparison"));
        assert!(md.contains("## Comparisons"));
        assert!(md.contains("good_model vs weak"));
        assert!(md.contains("failed: Metric 'broken'"));
        assert!(md.contains("- Correction: holm"));
    }

    #[test]
    fn test_to_text() {
        let text = ComparisonReport::new("Model comparison", create_test_result()).to_text();

        assert!(text.contains("Model comparison"));
        assert!(text.contains("SUMMARY"));
        assert!(text.contains("Failed:       1"));
        assert!(text.contains("good_model"));
        assert!(text.contains("n/a"));
    }

    #[test]
    fn test_to_json() {
        let report = ComparisonReport::new("test", create_test_result());
        let json = report.to_json().unwrap();

        assert!(json.contains("\"good_model\""));
        assert!(json.contains("\"status\": \"failed\""));
        assert!(json.contains("\"corrected_p_value\""));
        let parsed: ComparisonReport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.result.entries, report.result.entries);
    }

    #[test]
    fn test_latex_escape() {
        assert_eq!(latex_escape("a_b & 50%"), "a\\_b \\& 50\\%");
        assert_eq!(latex_escape("plain"), "plain");
    }
}
