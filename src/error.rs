//! Error types for the ETL run.

use thiserror::Error;

/// The main error type for ETL operations.
///
/// Every variant is fatal to the current run: nothing in the pipeline
/// retries or distinguishes transient failures from permanent ones.
#[derive(Debug, Error)]
pub enum EtlError {
    /// Could not open or use the source (SQL Server) connection.
    #[error("Source connection error: {0}")]
    SourceConnection(String),

    /// Could not open or use the destination (PostgreSQL) connection.
    #[error("Destination connection error: {0}")]
    DestinationConnection(String),

    /// An extraction query failed.
    #[error("Query error: {0}")]
    Query(String),

    /// A column the transform expects is absent from the result set.
    #[error("Missing column: '{0}'")]
    MissingColumn(String),

    /// A column holds a value of the wrong type.
    #[error("Type mismatch in column '{column}': expected {expected}, found {found}")]
    TypeMismatch {
        column: String,
        expected: &'static str,
        found: &'static str,
    },

    /// A row does not line up with the frame's columns.
    #[error("Row has {found} values but the frame has {expected} columns")]
    RowArity { expected: usize, found: usize },

    /// Writing a destination table failed.
    #[error("Load error for table '{table}': {message}")]
    Load { table: String, message: String },

    /// Failed to parse an ODBC-style connection string.
    #[error("Connection string error at position {position}: {message}")]
    ConnectionString { position: usize, message: String },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EtlError {
    /// Create a type mismatch error for `column`.
    pub fn mismatch(column: impl Into<String>, expected: &'static str, found: &'static str) -> Self {
        Self::TypeMismatch {
            column: column.into(),
            expected,
            found,
        }
    }

    /// Create a load error for `table`.
    pub fn load(table: impl Into<String>, message: impl ToString) -> Self {
        Self::Load {
            table: table.into(),
            message: message.to_string(),
        }
    }
}

/// Result type alias for ETL operations.
pub type EtlResult<T> = Result<T, EtlError>;
