//! Random-effects aggregation of per-subject fixed-effects models.
//!
//! Per-subject coefficient maps are treated as a sample from the
//! population and tested with a one-sample procedure.

use crate::data::{CaseAxis, NdVar, Topology};
use crate::error::{Result, SpmError};
use crate::model::lm::LinearModel;
use crate::test::{OneSampleTest, TTestConfig};
use log::info;
use std::collections::{BTreeMap, HashSet};

/// Results and per-subject data of [`RandomLm::column_ttests`], keyed by term.
pub type ColumnTests<R> = (BTreeMap<String, R>, BTreeMap<String, NdVar>);

/// Random-effects model over a group of subjects.
#[derive(Debug, Clone)]
pub struct RandomLm {
    models: Vec<LinearModel>,
    topology: Topology,
    column_counts: Vec<(String, usize)>,
    subjects: Vec<String>,
}

impl RandomLm {
    /// Aggregate per-subject fits.
    ///
    /// All models must share the measurement topology and the term
    /// structure. Subjects without a label are named `S000`, `S001`, ...,
    /// skipping labels already in use; explicit labels must be unique.
    pub fn new(models: Vec<LinearModel>) -> Result<Self> {
        let first = models
            .first()
            .ok_or_else(|| SpmError::EmptyData("RandomLm needs at least one model".to_string()))?;

        let topology = first.topology().clone();
        for (i, lm) in models.iter().enumerate().skip(1) {
            if *lm.topology() != topology {
                return Err(SpmError::StructuralMismatch(format!(
                    "Not all models have the same dimensions: {} has shape {:?}, {} has {:?}",
                    describe(first, 0),
                    topology.shape(),
                    describe(lm, i),
                    lm.topology().shape()
                )));
            }
        }

        let column_counts = first.column_counts();
        for (i, lm) in models.iter().enumerate().skip(1) {
            if lm.column_counts() != column_counts {
                return Err(SpmError::TermMismatch {
                    first: describe(first, 0),
                    second: describe(lm, i),
                });
            }
        }

        let subjects = resolve_subjects(&models)?;
        info!(
            "Aggregated {} subjects over {} locations, terms {:?}",
            subjects.len(),
            topology.n_locations(),
            column_counts.iter().map(|(t, _)| t.as_str()).collect::<Vec<_>>()
        );

        Ok(Self {
            models,
            topology,
            column_counts,
            subjects,
        })
    }

    /// Resolved subject labels, in model order.
    pub fn subjects(&self) -> &[String] {
        &self.subjects
    }

    /// Number of subjects.
    pub fn n_subjects(&self) -> usize {
        self.models.len()
    }

    /// Shared measurement topology.
    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Shared `(term, number of columns)` structure.
    pub fn column_counts(&self) -> &[(String, usize)] {
        &self.column_counts
    }

    /// Term names in model order.
    pub fn term_names(&self) -> Vec<String> {
        self.column_counts.iter().map(|(t, _)| t.clone()).collect()
    }

    /// The per-subject models.
    pub fn models(&self) -> &[LinearModel] {
        &self.models
    }

    fn check_single_column(&self, term: &str) -> Result<()> {
        match self.column_counts.iter().find(|(t, _)| t == term) {
            None => Err(SpmError::UnknownTerm {
                term: term.to_string(),
                available: self.term_names(),
            }),
            Some((_, 1)) => Ok(()),
            Some((_, n)) => Err(SpmError::ColumnArity {
                term: term.to_string(),
                n_columns: *n,
            }),
        }
    }

    /// Coefficients of a single-column term for every subject, stacked along
    /// a leading `subject` axis.
    pub fn single_column_coefficient(&self, term: &str) -> Result<NdVar> {
        self.check_single_column(term)?;
        let parts = self
            .models
            .iter()
            .map(|lm| lm.coefficient(term))
            .collect::<Result<Vec<_>>>()?;
        NdVar::stack(
            "coeff",
            CaseAxis::new("subject", self.subjects.clone()),
            &parts,
        )
    }

    /// One-sample test of a single model column against `config.popmean`.
    pub fn column_ttest<T: OneSampleTest>(
        &self,
        term: &str,
        config: &TTestConfig,
        test: &T,
    ) -> Result<T::Output> {
        self.column_ttest_with_data(term, config, test)
            .map(|(result, _)| result)
    }

    /// Like [`RandomLm::column_ttest`], also returning the per-subject
    /// coefficients that were tested.
    pub fn column_ttest_with_data<T: OneSampleTest>(
        &self,
        term: &str,
        config: &TTestConfig,
        test: &T,
    ) -> Result<(T::Output, NdVar)> {
        config.validate()?;
        let data = self.single_column_coefficient(term)?;
        info!(
            "Testing '{}' over {} subjects (samples: {:?})",
            term,
            self.n_subjects(),
            config.samples
        );
        let result = test.ttest_1samp(&data, config)?;
        Ok((result, data))
    }

    /// Test every term of the model.
    ///
    /// All terms must occupy exactly one column; this is checked for every
    /// term before any test runs.
    pub fn column_ttests<T: OneSampleTest>(
        &self,
        config: &TTestConfig,
        test: &T,
    ) -> Result<ColumnTests<T::Output>> {
        self.column_ttests_for(&self.term_names(), config, test)
    }

    /// Test a selection of terms.
    pub fn column_ttests_for<T: OneSampleTest>(
        &self,
        terms: &[String],
        config: &TTestConfig,
        test: &T,
    ) -> Result<ColumnTests<T::Output>> {
        for term in terms {
            self.check_single_column(term)?;
        }
        let mut results = BTreeMap::new();
        let mut data = BTreeMap::new();
        for term in terms {
            let (res, ds) = self.column_ttest_with_data(term, config, test)?;
            results.insert(term.clone(), res);
            data.insert(term.clone(), ds);
        }
        Ok((results, data))
    }
}

fn describe(lm: &LinearModel, index: usize) -> String {
    match lm.subject() {
        Some(s) => s.to_string(),
        None => format!("model #{}", index),
    }
}

fn resolve_subjects(models: &[LinearModel]) -> Result<Vec<String>> {
    let explicit: Vec<String> = models
        .iter()
        .filter_map(|lm| lm.subject().map(String::from))
        .collect();
    let mut used: HashSet<String> = HashSet::new();
    for name in &explicit {
        if !used.insert(name.clone()) {
            return Err(SpmError::DuplicateSubject(explicit));
        }
    }

    let mut next_index = 0usize;
    let mut subjects = Vec::with_capacity(models.len());
    for lm in models {
        match lm.subject() {
            Some(s) => subjects.push(s.to_string()),
            None => loop {
                let candidate = format!("S{:03}", next_index);
                next_index += 1;
                if used.insert(candidate.clone()) {
                    subjects.push(candidate);
                    break;
                }
            },
        }
    }
    Ok(subjects)
}
