//! Error types for relq-sql.

use miette::Diagnostic;
use relq_core::QueryError;
use thiserror::Error;

/// Error type covering engine failures, schema loading, SQL assembly and
/// execution.
#[derive(Error, Diagnostic, Debug)]
pub enum SqlError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Engine(#[from] QueryError),

    #[error("Schema definition failed to parse: {0}")]
    #[diagnostic(
        code(relq_sql::schema),
        help("Check the schema JSON against the class/field/join shape")
    )]
    Schema(#[from] serde_json::Error),

    #[error("query cannot build with {0} delimiter group(s) still open")]
    #[diagnostic(
        code(relq_sql::build),
        help("Close every ds() group with de() before building")
    )]
    OpenDelimiters(u32),

    #[error("Database query failed: {0}")]
    #[diagnostic(code(relq_sql::query))]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type alias for relq-sql operations.
pub type Result<T> = std::result::Result<T, SqlError>;
