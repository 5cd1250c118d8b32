//! Error types for the composable-spm library.

use thiserror::Error;

/// Main error type for the library.
#[derive(Error, Debug)]
pub enum SpmError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid value '{value}' at line {line}, column {col}")]
    InvalidValue {
        value: String,
        line: usize,
        col: usize,
    },

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Structural mismatch: {0}")]
    StructuralMismatch(String),

    #[error("Models for {first} and {second} don't match")]
    TermMismatch { first: String, second: String },

    #[error("Duplicate subject names in {0:?}")]
    DuplicateSubject(Vec<String>),

    #[error("Subject needs to be absent or non-empty text, got {0:?}")]
    InvalidSubject(String),

    #[error("Term '{term}' encompasses {n_columns} model columns, expected exactly one")]
    ColumnArity { term: String, n_columns: usize },

    #[error("Missing column '{0}' in metadata")]
    MissingColumn(String),

    #[error("Unknown term '{term}'. Available: {available:?}")]
    UnknownTerm {
        term: String,
        available: Vec<String>,
    },

    #[error("Formula parse error: {0}")]
    FormulaParse(String),

    #[error("Model cannot be parametrized: {0}")]
    Configuration(String),

    #[error("Empty data: {0}")]
    EmptyData(String),

    #[error("Numerical error: {0}")]
    Numerical(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, SpmError>;
