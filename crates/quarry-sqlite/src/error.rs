//! Error types for quarry-sqlite.

use miette::Diagnostic;
use quarry::QueryError;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum SqliteError {
    #[error("SQLite error: {0}")]
    #[diagnostic(
        code(quarry_sqlite::driver),
        help("Check the generated SQL and the database file")
    )]
    Driver(#[from] rusqlite::Error),

    #[error("TOML deserialization error: {0}")]
    #[diagnostic(
        code(quarry_sqlite::toml_deserialize),
        help("Check your database configuration syntax and structure")
    )]
    TomlDeError(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    #[diagnostic(code(quarry_sqlite::io))]
    Io(#[from] std::io::Error),

    #[error("Invalid journal mode: {0}")]
    #[diagnostic(
        code(quarry_sqlite::journal_mode),
        help("Use one of: delete, truncate, persist, memory, wal, off")
    )]
    InvalidJournalMode(String),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Query(#[from] QueryError),

    #[error("Connection lock poisoned")]
    #[diagnostic(code(quarry_sqlite::poisoned))]
    PoisonError,

    #[error("Bound {found} values for {expected} placeholders")]
    #[diagnostic(code(quarry_sqlite::binding_count))]
    BindingCount { expected: usize, found: usize },
}

impl From<SqliteError> for QueryError {
    fn from(err: SqliteError) -> Self {
        match err {
            SqliteError::Query(err) => err,
            other => QueryError::Connection(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, SqliteError>;
