//! Schema lookup.
//!
//! The builders never talk to the database to learn about tables; they ask a
//! [`SchemaLookup`]. [`StaticSchema`] is an in-memory implementation that can
//! be built in code or loaded from a TOML definition:
//!
//! ```toml
//! [enums]
//! post_status = ["draft", "published"]
//!
//! [[tables]]
//! name = "posts"
//! columns = [
//!     { name = "id", type = "integer" },
//!     { name = "title", type = "string" },
//!     { name = "status", type = "post_status" },
//! ]
//! ```

use std::{
    collections::{BTreeMap, HashMap},
    fs,
    path::Path,
};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    error::{QueryError, Result},
    types::{Type, TypeRef, TypeRegistry},
};

/// Read-only view of the tables, columns and types the builders validate against.
pub trait SchemaLookup {
    /// Returns the declared type of `table.column`, or [`QueryError::NotFound`].
    fn resolve_column(&self, table: &str, column: &str) -> Result<Type>;

    fn table_exists(&self, table: &str) -> bool;

    /// All columns of `table` in declaration order, used to expand `table.*`.
    fn table_columns(&self, table: &str) -> Result<Vec<(String, Type)>>;

    fn type_by_name(&self, name: &str) -> Result<Type>;
}

/// Schema definition as stored in configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SchemaConfig {
    /// Enum types by name, each with its allowed values.
    #[serde(default)]
    pub enums: BTreeMap<String, Vec<String>>,

    /// Tables with their columns in declaration order.
    #[serde(default)]
    pub tables: Vec<TableConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TableConfig {
    pub name: String,
    pub columns: Vec<ColumnConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ColumnConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
}

/// An in-memory [`SchemaLookup`].
#[derive(Debug, Clone, Default)]
pub struct StaticSchema {
    tables: HashMap<String, Vec<(String, Type)>>,
    types: TypeRegistry,
}

impl StaticSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &SchemaConfig) -> Result<Self> {
        let mut schema = Self::new();

        for (name, values) in &config.enums {
            schema.types.register_enum(name, values.iter().cloned())?;
        }

        for table in &config.tables {
            schema.add_table(
                &table.name,
                table.columns.iter().map(|c| (c.name.clone(), c.ty.clone())),
            )?;
        }

        debug!(
            "loaded schema with {} tables and {} enum types",
            config.tables.len(),
            config.enums.len()
        );
        Ok(schema)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: SchemaConfig = toml::from_str(content)?;
        Self::from_config(&config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!("reading schema from {}", path.display());
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Registers an enum type usable in column definitions and explicit types.
    pub fn add_enum<I, S>(&mut self, name: &str, values: I) -> Result<&mut Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.types.register_enum(name, values)?;
        Ok(self)
    }

    /// Adds a table. Column types may be given as names or as [`Type`]s.
    pub fn add_table<I, C, T>(&mut self, name: &str, columns: I) -> Result<&mut Self>
    where
        I: IntoIterator<Item = (C, T)>,
        C: Into<String>,
        T: Into<TypeRef>,
    {
        if self.tables.contains_key(name) {
            return Err(QueryError::Schema(format!("table `{name}` is defined twice")));
        }

        let mut resolved: Vec<(String, Type)> = Vec::new();
        for (column, ty) in columns {
            let column: String = column.into();
            if resolved.iter().any(|(c, _)| *c == column) {
                return Err(QueryError::Schema(format!(
                    "column `{name}.{column}` is defined twice"
                )));
            }
            let ty: TypeRef = ty.into();
            let ty = ty.resolve(&*self)?;
            resolved.push((column, ty));
        }

        self.tables.insert(name.to_string(), resolved);
        Ok(self)
    }

    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }
}

impl SchemaLookup for StaticSchema {
    fn resolve_column(&self, table: &str, column: &str) -> Result<Type> {
        let columns = self
            .tables
            .get(table)
            .ok_or_else(|| QueryError::NotFound(format!("table `{table}`")))?;

        columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, ty)| ty.clone())
            .ok_or_else(|| QueryError::NotFound(format!("column `{table}.{column}`")))
    }

    fn table_exists(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }

    fn table_columns(&self, table: &str) -> Result<Vec<(String, Type)>> {
        self.tables
            .get(table)
            .cloned()
            .ok_or_else(|| QueryError::NotFound(format!("table `{table}`")))
    }

    fn type_by_name(&self, name: &str) -> Result<Type> {
        self.types.type_by_name(name)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::io::Write;

    use super::*;

    pub(crate) const BLOG_SCHEMA: &str = r#"
[enums]
post_status = ["draft", "published"]

[[tables]]
name = "posts"
columns = [
    { name = "id", type = "integer" },
    { name = "title", type = "string" },
    { name = "body", type = "text" },
    { name = "status", type = "post_status" },
    { name = "posted_at", type = "datetime" },
]

[[tables]]
name = "comments"
columns = [
    { name = "id", type = "integer" },
    { name = "post_id", type = "integer" },
    { name = "author", type = "string" },
    { name = "score", type = "float" },
]
"#;

    pub(crate) fn blog_schema() -> StaticSchema {
        StaticSchema::from_toml_str(BLOG_SCHEMA).unwrap()
    }

    #[test]
    fn test_load_from_toml() {
        let schema = blog_schema();

        assert!(schema.table_exists("posts"));
        assert!(!schema.table_exists("users"));
        assert_eq!(schema.resolve_column("posts", "id").unwrap(), Type::Integer);
        assert_eq!(
            schema.resolve_column("posts", "posted_at").unwrap(),
            Type::DateTime
        );
        assert_eq!(
            schema.resolve_column("posts", "status").unwrap().name(),
            "post_status"
        );
    }

    #[test]
    fn test_table_columns_keep_declaration_order() {
        let schema = blog_schema();
        let names: Vec<String> = schema
            .table_columns("comments")
            .unwrap()
            .into_iter()
            .map(|(name, _)| name)
            .collect();

        assert_eq!(names, ["id", "post_id", "author", "score"]);
    }

    #[test]
    fn test_missing_lookups() {
        let schema = blog_schema();

        assert!(matches!(
            schema.resolve_column("users", "id"),
            Err(QueryError::NotFound(_))
        ));
        assert!(matches!(
            schema.resolve_column("posts", "author"),
            Err(QueryError::NotFound(_))
        ));
    }

    #[test]
    fn test_invalid_definitions() {
        let unknown_type = r#"
[[tables]]
name = "posts"
columns = [{ name = "id", type = "uuid" }]
"#;
        assert!(matches!(
            StaticSchema::from_toml_str(unknown_type),
            Err(QueryError::UnknownType(_))
        ));

        let mut schema = StaticSchema::new();
        schema.add_table("posts", [("id", "integer")]).unwrap();
        assert!(matches!(
            schema.add_table("posts", [("id", "integer")]),
            Err(QueryError::Schema(_))
        ));
        assert!(matches!(
            schema.add_table("tags", [("id", "integer"), ("id", "string")]),
            Err(QueryError::Schema(_))
        ));

        assert!(matches!(
            StaticSchema::from_toml_str("[[tables]\nname ="),
            Err(QueryError::Schema(_))
        ));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(BLOG_SCHEMA.as_bytes()).unwrap();

        let schema = StaticSchema::from_file(file.path()).unwrap();
        assert_eq!(
            schema.resolve_column("comments", "score").unwrap(),
            Type::Float
        );
    }
}
