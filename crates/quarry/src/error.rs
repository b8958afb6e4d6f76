//! Error types for quarry.

use miette::Diagnostic;
use thiserror::Error;

/// Error raised while building, rendering or executing a query.
///
/// [`QueryError::Connection`], [`QueryError::Conversion`] and
/// [`QueryError::Incomplete`] surface when a query runs. Everything else is
/// raised by the builder call that caused it.
#[derive(Error, Diagnostic, Debug, Clone, PartialEq)]
pub enum QueryError {
    #[error("Invalid column reference: {0}")]
    #[diagnostic(
        code(quarry::invalid_reference),
        help("References must look like `table.column` or `table.*`; wildcards cannot be aliased")
    )]
    InvalidReference(String),

    #[error("Missing type for raw expression: {0}")]
    #[diagnostic(
        code(quarry::missing_type),
        help("Raw SQL bypasses the schema, pass an explicit type alongside it")
    )]
    MissingType(String),

    #[error("Unknown clause: {0}")]
    #[diagnostic(
        code(quarry::unknown_clause),
        help("Check the clause name against the slots this query type supports")
    )]
    UnknownClause(String),

    #[error("Not found in schema: {0}")]
    #[diagnostic(
        code(quarry::not_found),
        help("Check the table and column names against the schema definition")
    )]
    NotFound(String),

    #[error("Unknown type: {0}")]
    #[diagnostic(
        code(quarry::unknown_type),
        help("Use a built-in type name or register the type in the schema")
    )]
    UnknownType(String),

    #[error("Cannot convert value for type `{ty}`: {reason}")]
    #[diagnostic(code(quarry::conversion))]
    Conversion { ty: String, reason: String },

    #[error("Expression has {found} parameters but {expected} placeholders")]
    #[diagnostic(code(quarry::placeholder_mismatch))]
    PlaceholderMismatch { expected: usize, found: usize },

    #[error("Incomplete statement: {0}")]
    #[diagnostic(
        code(quarry::incomplete),
        help("Assign at least one column with `set` or `values` before executing")
    )]
    Incomplete(String),

    #[error("Invalid schema definition: {0}")]
    #[diagnostic(
        code(quarry::schema),
        help("Check your schema file syntax and structure")
    )]
    Schema(String),

    #[error("Database error: {0}")]
    #[diagnostic(code(quarry::connection))]
    Connection(String),
}

impl QueryError {
    pub(crate) fn conversion(ty: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Conversion {
            ty: ty.into(),
            reason: reason.into(),
        }
    }
}

impl From<toml::de::Error> for QueryError {
    fn from(err: toml::de::Error) -> Self {
        QueryError::Schema(err.to_string())
    }
}

impl From<std::io::Error> for QueryError {
    fn from(err: std::io::Error) -> Self {
        QueryError::Schema(err.to_string())
    }
}

/// Result type alias for quarry operations.
pub type Result<T> = std::result::Result<T, QueryError>;
