use thiserror::Error;

/// Main error type for the SheetSink engine.
/// Aggregates errors from the standard library, dependencies, and
/// internal modules.
#[derive(Error, Debug)]
pub enum SheetSinkError {
    #[error("{0}")]
    WithContextError(String),

    #[error("{0}")]
    AnyhowError(#[from] anyhow::Error),

    // Standard library errors
    #[error("{0}")]
    IoError(#[from] std::io::Error),

    #[error("{0}")]
    ParseDateTimeError(#[from] chrono::ParseError),

    // Third-party library errors
    #[error("{0}")]
    DuckDBError(#[from] duckdb::Error),

    #[error("{0}")]
    TomlError(#[from] toml::de::Error),

    // Configuration errors (fatal, never retried)
    #[error("{0}")]
    SpecError(#[from] crate::spec::SpecError),

    #[error("{0}")]
    ColumnError(#[from] crate::database::column::ColumnError),

    #[error("{0}")]
    ExpressionError(#[from] crate::calculate::expr::ExprError),

    // Scoped errors (fail one table or key-value)
    #[error("{0}")]
    ExtractionError(#[from] crate::extract::ExtractionError),

    #[error("{0}")]
    StorageError(#[from] crate::database::writer::StorageError),
}

pub trait ResultMessage {
    fn with_prefix(self, message: &str) -> Self;
}

impl<T> ResultMessage for Result<T, SheetSinkError> {
    fn with_prefix(self, message: &str) -> Self {
        self.map_err(|e| SheetSinkError::WithContextError(format!("{}: {}", message, e)))
    }
}
