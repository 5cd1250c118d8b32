//! Composable Statistical Parametric Mapping (SPM) Library
//!
//! Mass-univariate linear models over multi-dimensional measurements
//! (time series, sensor or source space) with group-level inference.
//!
//! # Overview
//!
//! - **data**: Core data structures (Metadata, Formula, DesignMatrix, NdVar)
//! - **model**: Per-subject fixed-effects model (LinearModel) and the
//!   random-effects aggregate (RandomLm)
//! - **test**: One-sample group tests (cluster permutation, TFCE)
//! - **analysis**: YAML-configured group analyses and the idle-sleep guard
//!
//! # Example
//!
//! ```no_run
//! use composable_spm::prelude::*;
//!
//! let formula = Formula::parse("A*B*Y").unwrap();
//! let mut models = Vec::new();
//! for subject in ["s1", "s2", "s3"] {
//!     let metadata = Metadata::from_tsv(format!("{}_metadata.tsv", subject)).unwrap();
//!     let data = NdVar::from_tsv(format!("{}_data.tsv", subject)).unwrap();
//!     let lm = LinearModel::fit(&data, &formula, &metadata, Coding::Effect, Some(subject)).unwrap();
//!     models.push(lm);
//! }
//!
//! let rlm = RandomLm::new(models).unwrap();
//! let config = TTestConfig { samples: Some(1000), pmin: Some(0.05), ..Default::default() };
//! let result = rlm
//!     .column_ttest("A x B", &config, &ClusterPermutationTest::default())
//!     .unwrap();
//! println!("{} clusters", result.n_clusters());
//! ```

pub mod analysis;
pub mod data;
pub mod error;
pub mod model;
pub mod test;

/// Convenient re-exports for common usage.
pub mod prelude {
    pub use crate::analysis::{
        load_models, run_analysis, AnalysisConfig, AnalysisReport, Caffeinator, ClusterSummary,
        IdleSleepGuard, SubjectInput, TermReport,
    };
    pub use crate::data::{
        CaseAxis, Coding, DesignMatrix, Dimension, Formula, Metadata, NdVar, Parametrization,
        Term, TermKind, TermMap, TermSpan, Topology, Variable, VariableType,
    };
    pub use crate::error::{Result, SpmError};
    pub use crate::model::{ColumnTests, LinearModel, RandomLm};
    pub use crate::test::{
        Cluster, ClusterPermutationTest, OneSampleTest, TTestConfig, TTestResult, Tail,
    };
}
