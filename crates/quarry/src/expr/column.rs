//! Column references.
//!
//! A [`ColumnPath`] ties a `table.column` string to the column's declared
//! type, looked up in the schema when the reference is parsed. Wildcards
//! (`table.*`) and raw SQL (see [`raw`]) carry no type of their own.

use std::{fmt, sync::LazyLock};

use regex::Regex;

use crate::{
    error::{QueryError, Result},
    expr::Param,
    schema::SchemaLookup,
    traits::Expression,
    types::Type,
};

static REFERENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)\.(\*|[A-Za-z_][A-Za-z0-9_]*)$")
        .expect("unable to compile column reference regex")
});

/// Quotes an identifier with backticks, doubling embedded backticks.
pub fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Opaque SQL that bypasses schema validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Raw(String);

impl Raw {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Marks `sql` as raw, to be rendered verbatim.
///
/// Raw expressions have no schema type, so wherever a type is needed it must
/// be passed explicitly.
pub fn raw(sql: impl Into<String>) -> Raw {
    Raw(sql.into())
}

/// Anything accepted where a column is expected: a `table.column` string or
/// a [`Raw`] expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnRef {
    Path(String),
    Raw(Raw),
}

impl ColumnRef {
    /// Parses the reference against `schema`.
    pub fn resolve(&self, schema: &dyn SchemaLookup) -> Result<ColumnPath> {
        match self {
            ColumnRef::Path(reference) => ColumnPath::parse(schema, reference),
            ColumnRef::Raw(raw) => Ok(ColumnPath::raw(raw.as_str())),
        }
    }
}

impl From<&str> for ColumnRef {
    fn from(reference: &str) -> Self {
        ColumnRef::Path(reference.to_string())
    }
}

impl From<String> for ColumnRef {
    fn from(reference: String) -> Self {
        ColumnRef::Path(reference)
    }
}

impl From<&String> for ColumnRef {
    fn from(reference: &String) -> Self {
        ColumnRef::Path(reference.clone())
    }
}

impl From<Raw> for ColumnRef {
    fn from(raw: Raw) -> Self {
        ColumnRef::Raw(raw)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Target {
    Column { table: String, column: String },
    Wildcard { table: String },
    Raw(String),
}

/// A schema-validated reference to a column, a wildcard or raw SQL.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnPath {
    target: Target,
    ty: Option<Type>,
}

impl ColumnPath {
    /// Parses `table.column` or `table.*`.
    ///
    /// # Errors
    ///
    /// - [`QueryError::InvalidReference`] when the string is malformed
    /// - [`QueryError::NotFound`] when the table or column is not in the schema
    pub fn parse(schema: &dyn SchemaLookup, reference: &str) -> Result<Self> {
        let caps = REFERENCE_RE
            .captures(reference.trim())
            .ok_or_else(|| QueryError::InvalidReference(reference.to_string()))?;
        let table = caps[1].to_string();
        let column = &caps[2];

        if column == "*" {
            if !schema.table_exists(&table) {
                return Err(QueryError::NotFound(format!("table `{table}`")));
            }
            return Ok(Self {
                target: Target::Wildcard { table },
                ty: None,
            });
        }

        let ty = schema.resolve_column(&table, column)?;
        Ok(Self {
            target: Target::Column {
                table,
                column: column.to_string(),
            },
            ty: Some(ty),
        })
    }

    /// Parses a reference that is about to be aliased.
    ///
    /// Wildcards expand to several output columns, so they cannot take an
    /// alias.
    pub fn parse_aliased(schema: &dyn SchemaLookup, reference: &str, alias: &str) -> Result<Self> {
        let path = Self::parse(schema, reference)?;
        if path.is_wildcard() {
            return Err(QueryError::InvalidReference(format!(
                "wildcard `{reference}` cannot be aliased as `{alias}`"
            )));
        }
        Ok(path)
    }

    pub fn raw(sql: &str) -> Self {
        Self {
            target: Target::Raw(sql.to_string()),
            ty: None,
        }
    }

    pub fn table(&self) -> Option<&str> {
        match &self.target {
            Target::Column { table, .. } | Target::Wildcard { table } => Some(table),
            Target::Raw(_) => None,
        }
    }

    pub fn column(&self) -> Option<&str> {
        match &self.target {
            Target::Column { column, .. } => Some(column),
            _ => None,
        }
    }

    /// The declared schema type; `None` for wildcards and raw SQL.
    pub fn ty(&self) -> Option<&Type> {
        self.ty.as_ref()
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self.target, Target::Wildcard { .. })
    }

    pub fn is_raw(&self) -> bool {
        matches!(self.target, Target::Raw(_))
    }

    /// Returns the declared type, or `explicit` when given.
    ///
    /// Raw references and wildcards without an explicit type fail with
    /// [`QueryError::MissingType`].
    pub fn require_type(&self, explicit: Option<Type>) -> Result<Type> {
        explicit
            .or_else(|| self.ty.clone())
            .ok_or_else(|| QueryError::MissingType(self.to_string()))
    }
}

impl Expression for ColumnPath {
    fn to_sql(&self, _params: &mut Vec<Param>) -> String {
        self.to_string()
    }
}

impl fmt::Display for ColumnPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.target {
            Target::Column { table, column } => {
                write!(f, "{}.{}", quote_identifier(table), quote_identifier(column))
            }
            Target::Wildcard { table } => write!(f, "{}.*", quote_identifier(table)),
            Target::Raw(sql) => f.write_str(sql),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::tests::blog_schema;

    #[test]
    fn test_parse_column() {
        let schema = blog_schema();

        for (reference, rendered, ty) in [
            ("posts.id", "`posts`.`id`", Type::Integer),
            ("posts.posted_at", "`posts`.`posted_at`", Type::DateTime),
            ("comments.author", "`comments`.`author`", Type::String),
        ] {
            let path = ColumnPath::parse(&schema, reference).unwrap();
            assert_eq!(path.to_string(), rendered);
            assert_eq!(path.ty(), Some(&ty));
        }
    }

    #[test]
    fn test_parse_wildcard() {
        let schema = blog_schema();
        let path = ColumnPath::parse(&schema, "posts.*").unwrap();

        assert!(path.is_wildcard());
        assert_eq!(path.to_string(), "`posts`.*");
        assert_eq!(path.ty(), None);
        assert!(matches!(
            ColumnPath::parse(&schema, "users.*"),
            Err(QueryError::NotFound(_))
        ));
    }

    #[test]
    fn test_malformed_references() {
        let schema = blog_schema();

        for reference in ["id", "posts.", ".id", "posts.id.extra", "posts id", "1posts.id"] {
            assert!(
                matches!(
                    ColumnPath::parse(&schema, reference),
                    Err(QueryError::InvalidReference(_))
                ),
                "{reference} should be rejected"
            );
        }
        assert!(matches!(
            ColumnPath::parse(&schema, "posts.author"),
            Err(QueryError::NotFound(_))
        ));
    }

    #[test]
    fn test_wildcard_cannot_be_aliased() {
        let schema = blog_schema();

        for reference in ["posts.*", "comments.*"] {
            assert!(matches!(
                ColumnPath::parse_aliased(&schema, reference, "everything"),
                Err(QueryError::InvalidReference(_))
            ));
        }
        assert!(ColumnPath::parse_aliased(&schema, "posts.id", "post_id").is_ok());
    }

    #[test]
    fn test_raw_bypasses_schema() {
        let schema = blog_schema();
        let path = ColumnRef::from(raw("LOWER(`posts`.`title`)"))
            .resolve(&schema)
            .unwrap();

        assert!(path.is_raw());
        assert_eq!(path.to_string(), "LOWER(`posts`.`title`)");
        assert!(matches!(
            path.require_type(None),
            Err(QueryError::MissingType(_))
        ));
        assert_eq!(path.require_type(Some(Type::String)).unwrap(), Type::String);
    }

    #[test]
    fn test_quote_identifier_escapes_backticks() {
        assert_eq!(quote_identifier("we`ird"), "`we``ird`");
    }
}
