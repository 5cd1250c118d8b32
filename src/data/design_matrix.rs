//! Design matrix construction from a case table and formula.

use crate::data::{Formula, Metadata, Term, Variable, VariableType};
use crate::error::{Result, SpmError};
use log::debug;
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

/// Parametrization policy for categorical variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Coding {
    /// Sum-to-zero coding; the last level is coded -1 in every column.
    #[default]
    Effect,
    /// Treatment coding; the first level is the all-zero reference.
    Dummy,
}

impl std::str::FromStr for Coding {
    type Err = SpmError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "effect" => Ok(Coding::Effect),
            "dummy" => Ok(Coding::Dummy),
            other => Err(SpmError::InvalidParameter(format!(
                "Unknown coding '{}', expected 'effect' or 'dummy'",
                other
            ))),
        }
    }
}

/// How a term was encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TermKind {
    Intercept,
    /// Categorical main effect with its sorted levels.
    Factor { levels: Vec<String> },
    /// Continuous predictor entered as raw values.
    Covariate,
    /// Product of the columns of two or more main effects.
    Interaction,
}

/// A term together with the design columns it owns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermSpan {
    pub term: Term,
    pub kind: TermKind,
    pub columns: Vec<usize>,
}

impl TermSpan {
    /// Term name, e.g. `"A x B"`.
    pub fn name(&self) -> String {
        self.term.name()
    }

    /// Number of design columns.
    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }
}

/// Ordered mapping from term to column indices.
///
/// Column sets are disjoint and together cover every design column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermMap {
    spans: Vec<TermSpan>,
}

impl TermMap {
    /// Build and validate a term map for a design with `n_columns` columns.
    pub fn new(spans: Vec<TermSpan>, n_columns: usize) -> Result<Self> {
        let mut owner: Vec<Option<usize>> = vec![None; n_columns];
        for (i, span) in spans.iter().enumerate() {
            if span.columns.is_empty() {
                return Err(SpmError::Configuration(format!(
                    "Term '{}' has no design columns",
                    span.name()
                )));
            }
            for &col in &span.columns {
                match owner.get(col) {
                    None => {
                        return Err(SpmError::Configuration(format!(
                            "Term '{}' refers to column {} of a {}-column design",
                            span.name(),
                            col,
                            n_columns
                        )))
                    }
                    Some(Some(other)) => {
                        return Err(SpmError::Configuration(format!(
                            "Terms '{}' and '{}' share column {}",
                            spans[*other].name(),
                            span.name(),
                            col
                        )))
                    }
                    Some(None) => owner[col] = Some(i),
                }
            }
        }
        if let Some(col) = owner.iter().position(|o| o.is_none()) {
            return Err(SpmError::Configuration(format!(
                "Design column {} is not owned by any term",
                col
            )));
        }
        Ok(Self { spans })
    }

    /// Iterate over the spans in model order.
    pub fn iter(&self) -> impl Iterator<Item = &TermSpan> {
        self.spans.iter()
    }

    /// Number of terms.
    pub fn len(&self) -> usize {
        self.spans.len()
    }

    /// Whether the map holds no terms.
    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// Term names in model order.
    pub fn names(&self) -> Vec<String> {
        self.spans.iter().map(|s| s.name()).collect()
    }

    /// Look up a term by name.
    pub fn get(&self, name: &str) -> Result<&TermSpan> {
        self.spans
            .iter()
            .find(|s| s.name() == name)
            .ok_or_else(|| SpmError::UnknownTerm {
                term: name.to_string(),
                available: self.names(),
            })
    }

    /// `(term name, number of columns)` in model order.
    pub fn column_counts(&self) -> Vec<(String, usize)> {
        self.spans.iter().map(|s| (s.name(), s.n_columns())).collect()
    }

    /// Columns of the reduced model used to test `name`.
    ///
    /// Drops the term itself and every higher-order term containing it
    /// (Type II hierarchy). The intercept only drops itself.
    pub fn reduced_model_columns(&self, name: &str) -> Result<Vec<usize>> {
        let target = &self.get(name)?.term;
        let mut columns: Vec<usize> = self
            .spans
            .iter()
            .filter(|s| !s.term.contains(target))
            .flat_map(|s| s.columns.iter().copied())
            .collect();
        columns.sort_unstable();
        Ok(columns)
    }
}

/// A design matrix for linear modeling.
#[derive(Debug, Clone)]
pub struct DesignMatrix {
    /// The design matrix (cases x columns).
    matrix: DMatrix<f64>,
    /// Names of the columns.
    column_names: Vec<String>,
    /// Case IDs (rows).
    case_ids: Vec<String>,
    /// Term to column mapping.
    terms: TermMap,
    coding: Coding,
}

impl DesignMatrix {
    /// Create a design matrix directly from components.
    pub fn from_matrix(
        matrix: DMatrix<f64>,
        column_names: Vec<String>,
        case_ids: Vec<String>,
        terms: TermMap,
        coding: Coding,
    ) -> Result<Self> {
        if column_names.len() != matrix.ncols() {
            return Err(SpmError::DimensionMismatch {
                expected: matrix.ncols(),
                actual: column_names.len(),
            });
        }
        if case_ids.len() != matrix.nrows() {
            return Err(SpmError::DimensionMismatch {
                expected: matrix.nrows(),
                actual: case_ids.len(),
            });
        }
        // re-validate against this matrix
        let terms = TermMap::new(terms.spans, matrix.ncols())?;
        Ok(Self {
            matrix,
            column_names,
            case_ids,
            terms,
            coding,
        })
    }

    /// Build a design matrix from a case table and formula.
    pub fn from_formula(metadata: &Metadata, formula: &Formula, coding: Coding) -> Result<Self> {
        let n_cases = metadata.n_cases();
        if n_cases == 0 {
            return Err(SpmError::EmptyData("Case table has no cases".to_string()));
        }
        for var in formula.variables() {
            if !metadata.has_column(var) {
                return Err(SpmError::MissingColumn(var.to_string()));
            }
        }

        let mut column_names = Vec::new();
        let mut columns: Vec<Vec<f64>> = Vec::new();
        let mut spans = Vec::new();

        for term in &formula.terms {
            let (kind, term_columns) = match term {
                Term::Intercept => (
                    TermKind::Intercept,
                    vec![("intercept".to_string(), vec![1.0; n_cases])],
                ),
                Term::Main(var) => {
                    let kind = match metadata.column_type(var) {
                        Some(VariableType::Continuous) => TermKind::Covariate,
                        _ => TermKind::Factor {
                            levels: metadata.levels(var)?,
                        },
                    };
                    (kind, variable_columns(metadata, var, coding)?)
                }
                Term::Interaction(vars) => {
                    let mut acc: Vec<(String, Vec<f64>)> = vec![(String::new(), vec![1.0; n_cases])];
                    for var in vars {
                        let cols = variable_columns(metadata, var, coding)?;
                        let mut next = Vec::with_capacity(acc.len() * cols.len());
                        for (name1, col1) in &acc {
                            for (name2, col2) in &cols {
                                let name = if name1.is_empty() {
                                    name2.clone()
                                } else {
                                    format!("{}:{}", name1, name2)
                                };
                                let col = col1.iter().zip(col2).map(|(a, b)| a * b).collect();
                                next.push((name, col));
                            }
                        }
                        acc = next;
                    }
                    (TermKind::Interaction, acc)
                }
            };

            let start = columns.len();
            for (name, col) in term_columns {
                column_names.push(name);
                columns.push(col);
            }
            spans.push(TermSpan {
                term: term.clone(),
                kind,
                columns: (start..columns.len()).collect(),
            });
        }

        let n_columns = columns.len();
        let mut matrix = DMatrix::zeros(n_cases, n_columns);
        for (col_idx, col) in columns.iter().enumerate() {
            for (row_idx, &val) in col.iter().enumerate() {
                matrix[(row_idx, col_idx)] = val;
            }
        }

        let terms = TermMap::new(spans, n_columns)?;
        debug!(
            "Encoded '{}' with {:?} coding: {} cases x {} columns, {} terms",
            formula.formula_str,
            coding,
            n_cases,
            n_columns,
            terms.len()
        );

        Ok(Self {
            matrix,
            column_names,
            case_ids: metadata.case_ids().to_vec(),
            terms,
            coding,
        })
    }

    /// Get the design matrix.
    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.matrix
    }

    /// Get column names.
    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    /// Get case IDs.
    pub fn case_ids(&self) -> &[String] {
        &self.case_ids
    }

    /// Term to column mapping.
    pub fn terms(&self) -> &TermMap {
        &self.terms
    }

    /// Coding used for categorical variables.
    pub fn coding(&self) -> Coding {
        self.coding
    }

    /// Number of cases (rows).
    pub fn n_cases(&self) -> usize {
        self.matrix.nrows()
    }

    /// Number of columns.
    pub fn n_columns(&self) -> usize {
        self.matrix.ncols()
    }

    /// Numerical rank of the matrix.
    pub fn rank(&self) -> usize {
        let sv = self.matrix.singular_values();
        let max_sv = sv.iter().cloned().fold(0.0_f64, f64::max);
        let tol = max_sv * self.n_cases().max(self.n_columns()) as f64 * f64::EPSILON;
        sv.iter().filter(|&&s| s > tol).count()
    }

    /// Precompute the matrices shared by every fit with this design.
    ///
    /// Fails with a configuration error when the design is rank deficient.
    pub fn parametrize(&self) -> Result<Parametrization> {
        let n_columns = self.n_columns();
        if self.n_cases() < n_columns {
            return Err(SpmError::Configuration(format!(
                "{} cases are not enough for {} design columns",
                self.n_cases(),
                n_columns
            )));
        }
        let rank = self.rank();
        if rank < n_columns {
            return Err(SpmError::Configuration(format!(
                "Design matrix is rank deficient (rank {} < {} columns) under {:?} coding",
                rank, n_columns, self.coding
            )));
        }

        let x_t = self.matrix.transpose();
        let xtx_inv = (&x_t * &self.matrix).try_inverse().ok_or_else(|| {
            SpmError::Numerical("Design matrix is singular (X'X not invertible)".to_string())
        })?;
        let projector = xtx_inv * &x_t;

        Ok(Parametrization {
            x: self.matrix.clone(),
            x_t,
            projector,
            column_names: self.column_names.clone(),
            terms: self.terms.clone(),
        })
    }
}

/// Design matrix with its transpose and projector `(X'X)^-1 X'`.
#[derive(Debug, Clone)]
pub struct Parametrization {
    pub x: DMatrix<f64>,
    pub x_t: DMatrix<f64>,
    pub projector: DMatrix<f64>,
    pub column_names: Vec<String>,
    pub terms: TermMap,
}

impl Parametrization {
    /// Number of cases (rows).
    pub fn n_cases(&self) -> usize {
        self.x.nrows()
    }

    /// Number of design columns.
    pub fn n_columns(&self) -> usize {
        self.x.ncols()
    }
}

/// Columns for a single variable under the given coding.
fn variable_columns(
    metadata: &Metadata,
    var_name: &str,
    coding: Coding,
) -> Result<Vec<(String, Vec<f64>)>> {
    let values = metadata.column(var_name)?;
    if let Some(i) = values.iter().position(|v| v.is_missing()) {
        return Err(SpmError::Configuration(format!(
            "Variable '{}' is missing for case {}",
            var_name,
            metadata.case_ids()[i]
        )));
    }

    match metadata.column_type(var_name) {
        Some(VariableType::Continuous) => {
            let col = values
                .iter()
                .map(|v| match v {
                    Variable::Continuous(x) => Ok(*x),
                    other => Err(SpmError::Configuration(format!(
                        "Non-numeric value {:?} in covariate '{}'",
                        other, var_name
                    ))),
                })
                .collect::<Result<Vec<f64>>>()?;
            Ok(vec![(var_name.to_string(), col)])
        }
        Some(VariableType::Categorical) | None => {
            let levels = metadata.levels(var_name)?;
            if levels.len() < 2 {
                return Err(SpmError::Configuration(format!(
                    "Factor '{}' needs at least two levels, found {:?}",
                    var_name, levels
                )));
            }
            let (reference, coded) = match coding {
                Coding::Effect => (&levels[levels.len() - 1], &levels[..levels.len() - 1]),
                Coding::Dummy => (&levels[0], &levels[1..]),
            };
            let ref_value = match coding {
                Coding::Effect => -1.0,
                Coding::Dummy => 0.0,
            };

            Ok(coded
                .iter()
                .map(|level| {
                    let col = values
                        .iter()
                        .map(|v| match v.as_categorical() {
                            Some(s) if s == level => 1.0,
                            Some(s) if s == reference => ref_value,
                            _ => 0.0,
                        })
                        .collect();
                    (format!("{}{}", var_name, level), col)
                })
                .collect())
        }
    }
}
