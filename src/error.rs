//! Ошибки преобразований

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeatureError {
    #[error("Column '{column}' is not present in the table")]
    ColumnNotFound { column: String },

    #[error("Column '{column}' already exists in the table")]
    DuplicateColumn { column: String },

    #[error("Column '{column}' has {actual} rows, expected {expected}")]
    LengthMismatch {
        column: String,
        expected: usize,
        actual: usize,
    },

    #[error("Column '{column}' is {actual}, {expected} column required")]
    TypeMismatch {
        column: String,
        expected: String,
        actual: String,
    },

    #[error("Column '{column}' contains missing values, {operation} requires complete data")]
    MissingValues { column: String, operation: String },

    #[error("Column '{column}' cannot be parsed as datetime: '{value}'")]
    DateTimeParse { column: String, value: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unknown {kind} '{name}'")]
    UnknownMethod { kind: &'static str, name: String },

    #[error("{0}")]
    Degenerate(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Класс ошибки: по нему HTTP слой выбирает статус
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Schema,
    Type,
    Config,
    Degenerate,
    Io,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Schema => "schema",
            ErrorCategory::Type => "type",
            ErrorCategory::Config => "config",
            ErrorCategory::Degenerate => "degenerate",
            ErrorCategory::Io => "io",
        }
    }
}

impl FeatureError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            FeatureError::ColumnNotFound { .. }
            | FeatureError::DuplicateColumn { .. }
            | FeatureError::LengthMismatch { .. } => ErrorCategory::Schema,
            FeatureError::TypeMismatch { .. }
            | FeatureError::MissingValues { .. }
            | FeatureError::DateTimeParse { .. } => ErrorCategory::Type,
            FeatureError::InvalidConfig(_) | FeatureError::UnknownMethod { .. } => {
                ErrorCategory::Config
            }
            FeatureError::Degenerate(_) => ErrorCategory::Degenerate,
            FeatureError::Csv(_) | FeatureError::Io(_) => ErrorCategory::Io,
        }
    }

    pub(crate) fn not_found(column: &str) -> Self {
        FeatureError::ColumnNotFound {
            column: column.to_string(),
        }
    }

    pub(crate) fn type_mismatch(column: &str, expected: &str, actual: impl ToString) -> Self {
        FeatureError::TypeMismatch {
            column: column.to_string(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, FeatureError>;
