//! YAML configuration of a group analysis.

use crate::data::{Coding, Formula};
use crate::error::{Result, SpmError};
use crate::test::TTestConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Input files of one subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectInput {
    /// Subject label; generated when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    /// Measurement TSV (see [`crate::data::NdVar::from_tsv`]).
    pub data: PathBuf,
    /// Case table TSV (see [`crate::data::Metadata::from_tsv`]).
    pub metadata: PathBuf,
}

/// Group analysis configuration for serialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Name of the analysis.
    pub name: String,
    /// Description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Model formula, e.g. `A*B*Y`.
    pub formula: String,
    #[serde(default)]
    pub coding: Coding,
    pub subjects: Vec<SubjectInput>,
    /// Terms to test; every single-column term when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terms: Option<Vec<String>>,
    #[serde(default)]
    pub test: TTestConfig,
}

impl AnalysisConfig {
    /// Load from YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(SpmError::from)
    }

    /// Save to YAML string.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(SpmError::from)
    }

    /// Load from a YAML file, resolving relative input paths against the
    /// file's directory.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)?;
        let mut config = Self::from_yaml(&yaml)?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        Ok(config)
    }

    /// Make relative subject paths relative to `base`.
    pub fn resolve_paths(&mut self, base: &Path) {
        for input in &mut self.subjects {
            if input.data.is_relative() {
                input.data = base.join(&input.data);
            }
            if input.metadata.is_relative() {
                input.metadata = base.join(&input.metadata);
            }
        }
    }

    /// Parse the formula and check the test parameters.
    pub fn validate(&self) -> Result<Formula> {
        if self.subjects.is_empty() {
            return Err(SpmError::Configuration(format!(
                "Analysis '{}' lists no subjects",
                self.name
            )));
        }
        if let Some(terms) = &self.terms {
            if terms.is_empty() {
                return Err(SpmError::Configuration(
                    "terms must not be an empty list".to_string(),
                ));
            }
        }
        self.test.validate()?;
        Formula::parse(&self.formula)
    }
}
