//! Schema introspection through `PRAGMA table_info`.

use quarry::{quote_identifier, StaticSchema, Type};
use tracing::debug;

use crate::{connection::SqliteConnection, error::Result};

/// Maps a declared SQLite column type to a quarry type, following SQLite's
/// affinity rules with a few extra names for dates, booleans and JSON.
pub fn declared_type(declared: &str) -> Type {
    let declared = declared.to_ascii_uppercase();

    if declared.contains("BOOL") {
        Type::Boolean
    } else if declared.contains("INT") {
        Type::Integer
    } else if declared.contains("DATETIME") || declared.contains("TIMESTAMP") {
        Type::DateTime
    } else if declared.contains("DATE") {
        Type::Date
    } else if declared.contains("JSON") {
        Type::Json
    } else if declared.contains("CHAR") || declared.contains("CLOB") {
        Type::String
    } else if declared.contains("TEXT") {
        Type::Text
    } else if ["REAL", "FLOA", "DOUB", "NUM", "DEC"]
        .iter()
        .any(|marker| declared.contains(marker))
    {
        Type::Float
    } else {
        Type::String
    }
}

impl SqliteConnection {
    /// Builds a [`StaticSchema`] from the tables of the open database.
    pub fn introspect_schema(&self) -> Result<StaticSchema> {
        let tables = self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT name FROM sqlite_master \
                 WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
            )?;
            let names = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            let mut tables = Vec::with_capacity(names.len());
            for name in names {
                let mut info = conn.prepare(&format!("PRAGMA table_info({})", quote_identifier(&name)))?;
                let columns = info
                    .query_map([], |row| {
                        Ok((row.get::<_, String>(1)?, row.get::<_, String>(2)?))
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                tables.push((name, columns));
            }
            Ok(tables)
        })?;

        let mut schema = StaticSchema::new();
        for (name, columns) in &tables {
            schema.add_table(
                name,
                columns
                    .iter()
                    .map(|(column, declared)| (column.clone(), declared_type(declared))),
            )?;
        }

        debug!("introspected {} tables", tables.len());
        Ok(schema)
    }
}

#[cfg(test)]
mod tests {
    use quarry::SchemaLookup;

    use super::*;

    #[test]
    fn test_declared_type_affinity() {
        for (declared, ty) in [
            ("INTEGER", Type::Integer),
            ("bigint", Type::Integer),
            ("VARCHAR(255)", Type::String),
            ("TEXT", Type::Text),
            ("REAL", Type::Float),
            ("DOUBLE PRECISION", Type::Float),
            ("DECIMAL(10,2)", Type::Float),
            ("BOOLEAN", Type::Boolean),
            ("DATE", Type::Date),
            ("DATETIME", Type::DateTime),
            ("JSON", Type::Json),
            ("", Type::String),
        ] {
            assert_eq!(declared_type(declared), ty, "{declared}");
        }
    }

    #[test]
    fn test_introspect_schema() {
        let conn = SqliteConnection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE posts (id INTEGER PRIMARY KEY, title VARCHAR(200), posted_at DATETIME);
             CREATE TABLE comments (id INTEGER PRIMARY KEY, post_id INTEGER, score REAL);",
        )
        .unwrap();

        let schema = conn.introspect_schema().unwrap();

        assert!(schema.table_exists("posts"));
        assert_eq!(schema.resolve_column("posts", "posted_at").unwrap(), Type::DateTime);
        assert_eq!(schema.resolve_column("comments", "score").unwrap(), Type::Float);
        let names: Vec<String> = schema
            .table_columns("posts")
            .unwrap()
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names, ["id", "title", "posted_at"]);
    }
}
