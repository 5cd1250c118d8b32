//! Running a configured group analysis.

use crate::analysis::config::{AnalysisConfig, SubjectInput};
use crate::data::{Formula, Metadata, NdVar};
use crate::error::{Result, SpmError};
use crate::model::{LinearModel, RandomLm};
use crate::test::{Cluster, OneSampleTest, TTestResult, Tail};
use log::{info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Summary of one cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterSummary {
    pub id: usize,
    pub sign: f64,
    pub mass: f64,
    pub n_locations: usize,
    pub tstart: Option<f64>,
    pub tstop: Option<f64>,
    pub p: Option<f64>,
}

impl From<&Cluster> for ClusterSummary {
    fn from(cluster: &Cluster) -> Self {
        Self {
            id: cluster.id,
            sign: cluster.sign,
            mass: cluster.mass,
            n_locations: cluster.n_locations(),
            tstart: cluster.tstart,
            tstop: cluster.tstop,
            p: cluster.p,
        }
    }
}

/// Test outcome for one term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermReport {
    pub term: String,
    pub df: usize,
    pub tail: Tail,
    pub threshold: Option<f64>,
    pub max_abs_t: f64,
    pub clusters: Vec<ClusterSummary>,
}

impl TermReport {
    fn new(term: &str, result: &TTestResult) -> Self {
        Self {
            term: term.to_string(),
            df: result.df,
            tail: result.tail,
            threshold: result.threshold,
            max_abs_t: result.max_abs_t(),
            clusters: result.clusters.iter().map(ClusterSummary::from).collect(),
        }
    }
}

/// Outcome of a group analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub name: String,
    pub formula: String,
    pub subjects: Vec<String>,
    pub terms: Vec<TermReport>,
}

impl AnalysisReport {
    pub fn term(&self, name: &str) -> Option<&TermReport> {
        self.terms.iter().find(|t| t.term == name)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(SpmError::from)
    }

    /// Write the report as JSON.
    pub fn write_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

/// Fit one model per subject listed in `config`.
///
/// Subjects are fitted in parallel; the returned models keep the order of
/// `config.subjects`.
pub fn load_models(config: &AnalysisConfig) -> Result<Vec<LinearModel>> {
    let formula = config.validate()?;
    info!(
        "Fitting '{}' for {} subjects",
        formula.formula_str,
        config.subjects.len()
    );
    config
        .subjects
        .par_iter()
        .map(|input| fit_subject(input, &formula, config))
        .collect()
}

fn fit_subject(input: &SubjectInput, formula: &Formula, config: &AnalysisConfig) -> Result<LinearModel> {
    let metadata = Metadata::from_tsv(&input.metadata)?;
    let data = NdVar::from_tsv(&input.data)?;
    if data.case_axis().labels.as_slice() != metadata.case_ids() {
        return Err(SpmError::StructuralMismatch(format!(
            "Cases in {} do not match the case table {}",
            input.data.display(),
            input.metadata.display()
        )));
    }
    LinearModel::fit(
        &data,
        formula,
        &metadata,
        config.coding,
        input.subject.as_deref(),
    )
}

/// Run the analysis described by `config` with the given test procedure.
pub fn run_analysis<T>(config: &AnalysisConfig, test: &T) -> Result<AnalysisReport>
where
    T: OneSampleTest<Output = TTestResult>,
{
    let rlm = RandomLm::new(load_models(config)?)?;

    let terms = match &config.terms {
        Some(terms) => terms.clone(),
        None => {
            let (single, multi): (Vec<_>, Vec<_>) =
                rlm.column_counts().iter().partition(|(_, n)| *n == 1);
            for (term, n) in multi {
                warn!("Skipping '{}' ({} columns)", term, n);
            }
            single.into_iter().map(|(term, _)| term.clone()).collect()
        }
    };

    let (results, _) = rlm.column_ttests_for(&terms, &config.test, test)?;
    let reports = terms
        .iter()
        .filter_map(|term| results.get(term).map(|result| TermReport::new(term, result)))
        .collect();

    Ok(AnalysisReport {
        name: config.name.clone(),
        formula: config.formula.clone(),
        subjects: rlm.subjects().to_vec(),
        terms: reports,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::{ClusterPermutationTest, TTestConfig};
    use std::io::Write;
    use tempfile::NamedTempFile;

    /// Eight cases of a 2 x 2 design over four time points with an A effect
    /// in the last two samples; noise pattern and effect size vary by subject.
    fn write_subject(s: usize) -> (NamedTempFile, NamedTempFile) {
        let offset = 0.003 * s as f64;
        let mut metadata = NamedTempFile::new().unwrap();
        let mut data = NamedTempFile::new().unwrap();
        writeln!(metadata, "case\tA\tB").unwrap();
        writeln!(data, "case\t0.0\t0.01\t0.02\t0.03").unwrap();
        for i in 0..8 {
            let a = if i % 2 == 0 { "a0" } else { "a1" };
            let b = if (i / 2) % 2 == 0 { "b0" } else { "b1" };
            writeln!(metadata, "c{}\t{}\t{}", i, a, b).unwrap();
            let size = 1.0 + 0.05 * s as f64;
            let effect = if i % 2 == 0 { size } else { -size };
            let noise = 0.01 * (((i * 7 + s * 3) % 5) as f64 - 2.0) + offset;
            writeln!(
                data,
                "c{}\t{}\t{}\t{}\t{}",
                i,
                noise,
                -noise,
                effect + noise,
                effect - noise
            )
            .unwrap();
        }
        (data, metadata)
    }

    fn config_for(files: &[(NamedTempFile, NamedTempFile)]) -> AnalysisConfig {
        AnalysisConfig {
            name: "test".to_string(),
            description: None,
            formula: "A*B".to_string(),
            coding: Default::default(),
            subjects: files
                .iter()
                .map(|(data, metadata)| SubjectInput {
                    subject: None,
                    data: data.path().to_path_buf(),
                    metadata: metadata.path().to_path_buf(),
                })
                .collect(),
            terms: None,
            test: TTestConfig {
                samples: Some(0),
                tmin: Some(4.0),
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_load_models() {
        let files: Vec<_> = (0..3).map(write_subject).collect();
        let models = load_models(&config_for(&files)).unwrap();
        assert_eq!(models.len(), 3);
        assert_eq!(models[0].column_counts().len(), 4);
    }

    #[test]
    fn test_run_analysis() {
        let files: Vec<_> = (0..4).map(write_subject).collect();
        let report = run_analysis(&config_for(&files), &ClusterPermutationTest::default()).unwrap();
        assert_eq!(report.subjects, vec!["S000", "S001", "S002", "S003"]);
        assert_eq!(report.terms.len(), 4);

        let a = report.term("A").unwrap();
        assert_eq!(a.df, 3);
        assert_eq!(a.clusters.len(), 1);
        assert_eq!(a.clusters[0].n_locations, 2);
        assert!(a.clusters[0].p.is_none());

        let json = report.to_json().unwrap();
        let parsed: AnalysisReport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.subjects, report.subjects);
        assert_eq!(parsed.term("A").unwrap().clusters.len(), 1);
    }

    #[test]
    fn test_case_mismatch() {
        let (data, _) = write_subject(0);
        let mut metadata = NamedTempFile::new().unwrap();
        writeln!(metadata, "case\tA\tB").unwrap();
        for i in 0..8 {
            writeln!(metadata, "x{}\ta{}\tb{}", i, i % 2, (i / 2) % 2).unwrap();
        }
        let files = [(data, metadata)];
        let config = config_for(&files);
        assert!(matches!(load_models(&config), Err(SpmError::StructuralMismatch(_))));
    }
}
