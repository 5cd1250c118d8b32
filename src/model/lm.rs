//! Fixed-effects mass-univariate linear model.
//!
//! One OLS regression is fitted at every test location of a measurement,
//! all sharing one design. The shared projector `(X'X)^-1 X'` turns the fit
//! into a single matrix product over the flattened measurement.

use crate::data::{CaseAxis, Coding, DesignMatrix, Formula, Metadata, NdVar, Parametrization, TermMap, Topology};
use crate::error::{Result, SpmError};
use log::{debug, warn};
use nalgebra::DMatrix;
use std::sync::Arc;

/// A fitted fixed-effects model for one subject.
#[derive(Debug, Clone)]
pub struct LinearModel {
    /// Coefficients (design columns x test locations).
    coefficients: DMatrix<f64>,
    parametrization: Arc<Parametrization>,
    /// Name of the dependent measurement.
    y_name: String,
    topology: Topology,
    subject: Option<String>,
}

impl LinearModel {
    /// Fit `y ~ formula` with predictors taken from `metadata`.
    ///
    /// # Arguments
    /// * `y` - Measurement with one case per row of `metadata`
    /// * `formula` - Model formula, e.g. `A*B*Y`
    /// * `metadata` - Case table holding the predictors
    /// * `coding` - Parametrization of categorical predictors
    /// * `subject` - Optional subject label, must be non-empty text
    pub fn fit(
        y: &NdVar,
        formula: &Formula,
        metadata: &Metadata,
        coding: Coding,
        subject: Option<&str>,
    ) -> Result<Self> {
        let design = DesignMatrix::from_formula(metadata, formula, coding)?;
        let parametrization = Arc::new(design.parametrize()?);
        Self::from_parametrization(y, parametrization, subject)
    }

    /// Fit with a precomputed parametrization, which may be shared between
    /// subjects with identical designs.
    pub fn from_parametrization(
        y: &NdVar,
        parametrization: Arc<Parametrization>,
        subject: Option<&str>,
    ) -> Result<Self> {
        let subject = match subject {
            Some(s) if s.trim().is_empty() => {
                return Err(SpmError::InvalidSubject(s.to_string()));
            }
            Some(s) => Some(s.to_string()),
            None => None,
        };

        let n_cases = parametrization.n_cases();
        if y.n_cases() != n_cases {
            return Err(SpmError::DimensionMismatch {
                expected: n_cases,
                actual: y.n_cases(),
            });
        }
        if n_cases == parametrization.n_columns() {
            warn!(
                "Model for {} is saturated ({} cases, {} columns)",
                subject.as_deref().unwrap_or("unnamed subject"),
                n_cases,
                parametrization.n_columns()
            );
        }

        let y_flat = y.flatten();
        let coefficients = &parametrization.projector * &y_flat;
        debug!(
            "Fitted {} columns at {} locations for {}",
            coefficients.nrows(),
            coefficients.ncols(),
            subject.as_deref().unwrap_or("unnamed subject")
        );

        Ok(Self {
            coefficients,
            parametrization,
            y_name: y.name.clone(),
            topology: y.topology().clone(),
            subject,
        })
    }

    /// Subject label, if one was given.
    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    /// Topology of the dependent measurement.
    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Term to column mapping of the design.
    pub fn terms(&self) -> &TermMap {
        &self.parametrization.terms
    }

    /// `(term, number of columns)` in model order.
    pub fn column_counts(&self) -> Vec<(String, usize)> {
        self.parametrization.terms.column_counts()
    }

    /// The shared design parametrization.
    pub fn parametrization(&self) -> &Arc<Parametrization> {
        &self.parametrization
    }

    /// All full-model coefficients (design columns x test locations).
    pub fn coefficients(&self) -> &DMatrix<f64> {
        &self.coefficients
    }

    /// Fitted values (cases x test locations).
    pub fn fitted(&self) -> DMatrix<f64> {
        &self.parametrization.x * &self.coefficients
    }

    /// Coefficient estimate for one term, flattened over test locations.
    ///
    /// Compares the full model with the reduced model lacking the term:
    /// `M1 = H - H0` and `b = (X1'X1)^-1 X1' M1 X beta`, where `H` and `H0`
    /// are the hat matrices of the full and reduced design and `X1` holds the
    /// term's own columns.
    ///
    /// Returns an array of shape (term columns, test locations).
    pub fn flat_coefficient(&self, term: &str) -> Result<DMatrix<f64>> {
        let p = &self.parametrization;
        let span = p.terms.get(term)?;
        let reduced = p.terms.reduced_model_columns(term)?;

        let x = &p.x;
        let h = x * &p.projector;
        let h0 = hat_matrix(&x.select_columns(&reduced), term)?;

        let x1 = x.select_columns(&span.columns);
        let x1_t = x1.transpose();
        let x1tx1_inv = (&x1_t * &x1).try_inverse().ok_or_else(|| {
            SpmError::Numerical(format!("Columns of term '{}' are singular", term))
        })?;

        let m1 = h - h0;
        let fitted = x * &self.coefficients;
        Ok(x1tx1_inv * (x1_t * (m1 * fitted)))
    }

    /// Coefficient estimate for one term with the measurement's topology
    /// restored. The leading axis enumerates the term's design columns.
    pub fn coefficient(&self, term: &str) -> Result<NdVar> {
        let flat = self.flat_coefficient(term)?;
        let span = self.parametrization.terms.get(term)?;
        let labels = span
            .columns
            .iter()
            .map(|&c| self.parametrization.column_names[c].clone())
            .collect();
        NdVar::from_flat(
            &format!("{}[{}]", self.y_name, term),
            CaseAxis::new("column", labels),
            self.topology.clone(),
            &flat,
        )
    }
}

/// `X (X'X)^-1 X'`; a design without columns projects onto nothing.
fn hat_matrix(x: &DMatrix<f64>, term: &str) -> Result<DMatrix<f64>> {
    let n = x.nrows();
    if x.ncols() == 0 {
        return Ok(DMatrix::zeros(n, n));
    }
    let x_t = x.transpose();
    let xtx_inv = (&x_t * x).try_inverse().ok_or_else(|| {
        SpmError::Numerical(format!("Reduced model for term '{}' is singular", term))
    })?;
    Ok(x * xtx_inv * x_t)
}
