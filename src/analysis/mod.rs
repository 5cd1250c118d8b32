//! Configured group analyses.
//!
//! An [`AnalysisConfig`] names the model, the per-subject inputs and the
//! test parameters; [`run_analysis`] fits every subject, aggregates the fits
//! and tests the requested terms.

mod caffeine;
mod config;
mod runner;

pub use caffeine::{Caffeinator, IdleSleepGuard};
pub use config::{AnalysisConfig, SubjectInput};
pub use runner::{load_models, run_analysis, AnalysisReport, ClusterSummary, TermReport};
