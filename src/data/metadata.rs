//! Case table holding the predictor variables for each observation.

use crate::error::{Result, SpmError};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// A variable value that can be categorical or continuous.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Variable {
    /// Categorical variable with string levels.
    Categorical(String),
    /// Continuous numeric variable.
    Continuous(f64),
    /// Missing value.
    Missing,
}

impl Variable {
    /// Check if this is a missing value.
    pub fn is_missing(&self) -> bool {
        matches!(self, Variable::Missing)
    }

    /// Try to get as categorical string.
    pub fn as_categorical(&self) -> Option<&str> {
        match self {
            Variable::Categorical(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get as continuous f64.
    pub fn as_continuous(&self) -> Option<f64> {
        match self {
            Variable::Continuous(v) => Some(*v),
            _ => None,
        }
    }
}

/// Type hint for columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VariableType {
    Categorical,
    Continuous,
}

/// Case table: one row per observation, one column per predictor.
///
/// Values are stored column-wise in case order, so building a design matrix
/// never has to look cases up by id.
#[derive(Debug, Clone, Default)]
pub struct Metadata {
    case_ids: Vec<String>,
    column_names: Vec<String>,
    columns: HashMap<String, Vec<Variable>>,
    column_types: HashMap<String, VariableType>,
}

impl Metadata {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a case table from a TSV file.
    ///
    /// The first row is a header (first column holds the case id). Columns in
    /// which every non-missing value parses as a number are continuous, all
    /// others categorical. `NA` and empty cells are missing.
    pub fn from_tsv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let mut lines = reader.lines();

        let header_line = lines
            .next()
            .ok_or_else(|| SpmError::EmptyData("Empty metadata file".to_string()))??;
        let header: Vec<&str> = header_line.split('\t').collect();
        if header.len() < 2 {
            return Err(SpmError::EmptyData(
                "Metadata must have at least one variable column".to_string(),
            ));
        }
        let column_names: Vec<String> = header[1..].iter().map(|s| s.trim().to_string()).collect();

        let mut case_ids = Vec::new();
        let mut raw: Vec<Vec<String>> = vec![Vec::new(); column_names.len()];
        for line_result in lines {
            let line = line_result?;
            if line.trim().is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() != column_names.len() + 1 {
                return Err(SpmError::DimensionMismatch {
                    expected: column_names.len() + 1,
                    actual: fields.len(),
                });
            }
            case_ids.push(fields[0].trim().to_string());
            for (col_idx, values) in raw.iter_mut().enumerate() {
                values.push(fields[col_idx + 1].trim().to_string());
            }
        }

        if case_ids.is_empty() {
            return Err(SpmError::EmptyData("No cases in metadata".to_string()));
        }

        let mut columns = HashMap::new();
        let mut column_types = HashMap::new();
        for (name, values) in column_names.iter().zip(raw) {
            let all_numeric = values
                .iter()
                .all(|v| is_missing_token(v) || v.parse::<f64>().is_ok());
            let var_type = if all_numeric {
                VariableType::Continuous
            } else {
                VariableType::Categorical
            };
            let parsed = values
                .into_iter()
                .map(|v| {
                    if is_missing_token(&v) {
                        Variable::Missing
                    } else {
                        match var_type {
                            VariableType::Continuous => v
                                .parse::<f64>()
                                .map(Variable::Continuous)
                                .unwrap_or(Variable::Missing),
                            VariableType::Categorical => Variable::Categorical(v),
                        }
                    }
                })
                .collect();
            columns.insert(name.clone(), parsed);
            column_types.insert(name.clone(), var_type);
        }

        Ok(Self {
            case_ids,
            column_names,
            columns,
            column_types,
        })
    }

    /// Add a categorical column.
    ///
    /// The first column added fixes the number of cases; case ids default to
    /// `0..n` unless set with [`Metadata::with_case_ids`].
    pub fn with_categorical<S: AsRef<str>>(self, name: &str, values: &[S]) -> Result<Self> {
        let values = values
            .iter()
            .map(|v| Variable::Categorical(v.as_ref().to_string()))
            .collect();
        self.with_column(name, values, VariableType::Categorical)
    }

    /// Add a continuous column.
    pub fn with_continuous(self, name: &str, values: &[f64]) -> Result<Self> {
        let values = values.iter().map(|&v| Variable::Continuous(v)).collect();
        self.with_column(name, values, VariableType::Continuous)
    }

    /// Replace the case ids.
    pub fn with_case_ids(mut self, case_ids: Vec<String>) -> Result<Self> {
        if !self.column_names.is_empty() && case_ids.len() != self.case_ids.len() {
            return Err(SpmError::DimensionMismatch {
                expected: self.case_ids.len(),
                actual: case_ids.len(),
            });
        }
        self.case_ids = case_ids;
        Ok(self)
    }

    fn with_column(
        mut self,
        name: &str,
        values: Vec<Variable>,
        var_type: VariableType,
    ) -> Result<Self> {
        if self.column_names.is_empty() && self.case_ids.is_empty() {
            self.case_ids = (0..values.len()).map(|i| i.to_string()).collect();
        }
        if values.len() != self.case_ids.len() {
            return Err(SpmError::DimensionMismatch {
                expected: self.case_ids.len(),
                actual: values.len(),
            });
        }
        if !self.has_column(name) {
            self.column_names.push(name.to_string());
        }
        self.columns.insert(name.to_string(), values);
        self.column_types.insert(name.to_string(), var_type);
        Ok(self)
    }

    /// Case ids in order.
    pub fn case_ids(&self) -> &[String] {
        &self.case_ids
    }

    /// Column names.
    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    /// Number of cases.
    pub fn n_cases(&self) -> usize {
        self.case_ids.len()
    }

    /// Get all values for a column.
    pub fn column(&self, column: &str) -> Result<&[Variable]> {
        self.columns
            .get(column)
            .map(|v| v.as_slice())
            .ok_or_else(|| SpmError::MissingColumn(column.to_string()))
    }

    /// Get the type of a column.
    pub fn column_type(&self, column: &str) -> Option<VariableType> {
        self.column_types.get(column).copied()
    }

    /// Sorted unique levels of a categorical column.
    pub fn levels(&self, column: &str) -> Result<Vec<String>> {
        let mut levels: Vec<String> = self
            .column(column)?
            .iter()
            .filter_map(|v| v.as_categorical().map(String::from))
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        levels.sort();
        Ok(levels)
    }

    /// Check if a column exists.
    pub fn has_column(&self, column: &str) -> bool {
        self.columns.contains_key(column)
    }
}

fn is_missing_token(value: &str) -> bool {
    value.is_empty() || value == "NA" || value == "na"
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_test_tsv() -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "case\tA\tB\tY").unwrap();
        writeln!(file, "c1\ta0\tb0\t0.5").unwrap();
        writeln!(file, "c2\ta1\tb0\t1.5").unwrap();
        writeln!(file, "c3\ta0\tb1\t-0.2").unwrap();
        writeln!(file, "c4\ta1\tb1\t2.0").unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_metadata() {
        let file = create_test_tsv();
        let meta = Metadata::from_tsv(file.path()).unwrap();

        assert_eq!(meta.n_cases(), 4);
        assert_eq!(meta.case_ids(), &["c1", "c2", "c3", "c4"]);
        assert_eq!(meta.column_names(), &["A", "B", "Y"]);
        assert_eq!(meta.column("Y").unwrap()[1].as_continuous(), Some(1.5));
    }

    #[test]
    fn test_column_type_inference() {
        let file = create_test_tsv();
        let meta = Metadata::from_tsv(file.path()).unwrap();

        assert_eq!(meta.column_type("A"), Some(VariableType::Categorical));
        assert_eq!(meta.column_type("Y"), Some(VariableType::Continuous));
        assert_eq!(meta.levels("B").unwrap(), vec!["b0", "b1"]);
    }

    #[test]
    fn test_missing_values() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "case\tA\tY").unwrap();
        writeln!(file, "c1\ta0\t25").unwrap();
        writeln!(file, "c2\ta1\tNA").unwrap();
        writeln!(file, "c3\t\t30").unwrap();
        file.flush().unwrap();

        let meta = Metadata::from_tsv(file.path()).unwrap();
        assert!(meta.column("Y").unwrap()[1].is_missing());
        assert!(meta.column("A").unwrap()[2].is_missing());
    }

    #[test]
    fn test_ragged_row() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "case\tA\tY").unwrap();
        writeln!(file, "c1\ta0\t25").unwrap();
        writeln!(file, "c2\ta1").unwrap();
        file.flush().unwrap();
        assert!(matches!(
            Metadata::from_tsv(file.path()),
            Err(SpmError::DimensionMismatch { expected: 3, actual: 2 })
        ));

        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "case\tA").unwrap();
        writeln!(file, "c1\ta0\textra").unwrap();
        file.flush().unwrap();
        assert!(matches!(
            Metadata::from_tsv(file.path()),
            Err(SpmError::DimensionMismatch { expected: 2, actual: 3 })
        ));
    }

    #[test]
    fn test_builder() {
        let meta = Metadata::new()
            .with_categorical("A", &["x", "y", "x"])
            .unwrap()
            .with_continuous("Y", &[0.1, 0.2, 0.3])
            .unwrap();
        assert_eq!(meta.n_cases(), 3);
        assert_eq!(meta.case_ids(), &["0", "1", "2"]);
        assert_eq!(meta.levels("A").unwrap(), vec!["x", "y"]);

        let err = meta.with_continuous("Z", &[1.0]).unwrap_err();
        assert!(matches!(err, SpmError::DimensionMismatch { expected: 3, actual: 1 }));
    }

    #[test]
    fn test_missing_column() {
        let meta = Metadata::new().with_continuous("Y", &[1.0]).unwrap();
        assert!(matches!(meta.column("Q"), Err(SpmError::MissingColumn(_))));
    }
}
