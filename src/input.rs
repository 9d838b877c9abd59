//! Dataset files consumed by `stambo compare`.
//!
//! ```json
//! {
//!   "targets": [0, 1, 1, 0],
//!   "groups": [1, 1, 2, 2],
//!   "models": [
//!     { "name": "baseline", "predictions": [0, 1, 0, 0] },
//!     { "name": "candidate", "predictions": [0, 1, 1, 0] }
//!   ]
//! }
//! ```
//!
//! A model may carry its own `targets` and `groups`, which take precedence
//! over the shared ones (needed for unpaired designs). Without any groups
//! every observation is its own group.

use crate::compare::NamedSample;
use crate::error::StamboError;
use crate::sample::{GroupId, GroupedSample};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Dataset loading errors
#[derive(Error, Debug)]
pub enum InputError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("model '{0}' has no targets and the file has no shared targets")]
    MissingTargets(String),

    #[error("model '{model}': {source}")]
    InvalidSample {
        model: String,
        #[source]
        source: StamboError,
    },
}

/// One model's predictions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInput {
    pub name: String,
    pub predictions: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub targets: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub groups: Option<Vec<GroupId>>,
}

/// Contents of a dataset file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub targets: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub groups: Option<Vec<GroupId>>,
    pub models: Vec<ModelInput>,
}

impl ComparisonInput {
    /// Load a dataset from a JSON file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, InputError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Build one sample per model, in file order
    ///
    /// # Errors
    ///
    /// Returns `MissingTargets` or the sample construction error of the
    /// first invalid model.
    pub fn into_samples(self) -> Result<Vec<NamedSample>, InputError> {
        let Self {
            targets,
            groups,
            models,
        } = self;
        models
            .into_iter()
            .map(|model| {
                let model_targets = model
                    .targets
                    .or_else(|| targets.clone())
                    .ok_or_else(|| InputError::MissingTargets(model.name.clone()))?;
                let model_groups = model.groups.or_else(|| groups.clone());
                let sample =
                    GroupedSample::from_parts(model.predictions, model_targets, model_groups)
                        .map_err(|source| InputError::InvalidSample {
                            model: model.name.clone(),
                            source,
                        })?;
                Ok(NamedSample::new(model.name, sample))
            })
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const DATASET: &str = r#"{
        "targets": [0, 1, 1, 0],
        "groups": [1, 1, 2, 2],
        "models": [
            { "name": "baseline", "predictions": [0, 1, 0, 0] },
            { "name": "candidate", "predictions": [0, 1, 1, 0], "groups": [5, 6, 7, 8] }
        ]
    }"#;

    #[test]
    fn test_shared_and_overridden_fields() {
        let input: ComparisonInput = serde_json::from_str(DATASET).unwrap();
        let samples = input.into_samples().unwrap();

        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].name, "baseline");
        assert_eq!(samples[0].sample.group_ids(), &[1, 1, 2, 2]);
        assert_eq!(samples[1].sample.group_ids(), &[5, 6, 7, 8]);
        assert_eq!(samples[1].sample.targets(), &[0.0, 1.0, 1.0, 0.0]);
    }

    #[test]
    fn test_missing_targets() {
        let input: ComparisonInput =
            serde_json::from_str(r#"{"models": [{"name": "m", "predictions": [1.0]}]}"#).unwrap();
        assert!(matches!(
            input.into_samples(),
            Err(InputError::MissingTargets(name)) if name == "m"
        ));
    }

    #[test]
    fn test_invalid_sample_names_model() {
        let input: ComparisonInput = serde_json::from_str(
            r#"{"targets": [0, 1], "models": [{"name": "short", "predictions": [1]}]}"#,
        )
        .unwrap();
        let err = input.into_samples().unwrap_err();
        assert!(err.to_string().starts_with("model 'short'"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(DATASET.as_bytes()).unwrap();
        let input = ComparisonInput::load(file.path()).unwrap();
        assert_eq!(input.models.len(), 2);
        assert!(ComparisonInput::load("/nonexistent/data.json").is_err());
    }
}
