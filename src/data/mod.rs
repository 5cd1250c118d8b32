//! Data structures for mass-univariate analysis.

mod design_matrix;
mod formula;
mod metadata;
mod ndvar;

pub use design_matrix::{Coding, DesignMatrix, Parametrization, TermKind, TermMap, TermSpan};
pub use formula::{Formula, Term};
pub use metadata::{Metadata, Variable, VariableType};
pub use ndvar::{CaseAxis, Dimension, NdVar, Topology};
