//! A [`quarry::Connection`] backed by rusqlite.

use std::sync::Mutex;

use quarry::{placeholder_offsets, Binding, DriverValue, RawRow};
use rusqlite::{
    params_from_iter,
    types::{Value, ValueRef},
};
use tracing::{debug, trace, warn};

use crate::{
    config::SqliteConfig,
    error::{Result, SqliteError},
};

/// A single SQLite connection, serialised behind a mutex.
pub struct SqliteConnection {
    conn: Mutex<rusqlite::Connection>,
}

impl SqliteConnection {
    /// Opens the database described by `config` and applies its pragmas.
    pub fn open(config: &SqliteConfig) -> Result<Self> {
        config.validate()?;

        let conn = if config.is_memory() {
            rusqlite::Connection::open_in_memory()?
        } else {
            rusqlite::Connection::open(&config.path)?
        };

        conn.busy_timeout(config.busy_timeout())?;
        conn.pragma_update(None, "foreign_keys", config.foreign_keys)?;
        if !config.is_memory() {
            let mode = config.journal_mode.to_ascii_uppercase();
            let applied: String =
                conn.query_row(&format!("PRAGMA journal_mode = {mode}"), [], |row| row.get(0))?;
            if !applied.eq_ignore_ascii_case(&mode) {
                warn!("requested journal mode {mode}, database uses {applied}");
            }
        }

        debug!("opened sqlite database at {}", config.path);
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::open(&SqliteConfig::default())
    }

    /// Runs `f` with the locked connection.
    pub fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&rusqlite::Connection) -> Result<T>,
    {
        let conn = self.conn.lock().map_err(|_| SqliteError::PoisonError)?;
        f(&conn)
    }

    /// Runs several semicolon-separated statements without parameters.
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        self.with_conn(|conn| Ok(conn.execute_batch(sql)?))
    }

    fn run_execute(&self, sql: &str, bindings: &[Binding]) -> Result<u64> {
        let (sql, values) = expand_bindings(sql, bindings)?;
        self.with_conn(|conn| {
            let affected = conn.execute(&sql, params_from_iter(values.iter()))?;
            Ok(affected as u64)
        })
    }

    fn run_query(&self, sql: &str, bindings: &[Binding]) -> Result<Vec<RawRow>> {
        let (sql, values) = expand_bindings(sql, bindings)?;
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

            let mut rows = stmt.query(params_from_iter(values.iter()))?;
            let mut result = Vec::new();
            while let Some(row) = rows.next()? {
                let columns = names
                    .iter()
                    .enumerate()
                    .map(|(idx, name)| Ok((name.clone(), from_value_ref(row.get_ref(idx)?))))
                    .collect::<Result<Vec<_>>>()?;
                result.push(RawRow { columns });
            }

            trace!("{} rows", result.len());
            Ok(result)
        })
    }
}

impl quarry::Connection for SqliteConnection {
    fn execute(&self, sql: &str, bindings: &[Binding]) -> quarry::Result<u64> {
        Ok(self.run_execute(sql, bindings)?)
    }

    fn query(&self, sql: &str, bindings: &[Binding]) -> quarry::Result<Vec<RawRow>> {
        Ok(self.run_query(sql, bindings)?)
    }
}

/// Rewrites array bindings into one placeholder per element.
///
/// The n-th `?` of `sql` belongs to the n-th binding. A list binding turns
/// its `?` into `?, ?, ...`, or into `NULL` when the list is empty, so that
/// `IN (?)` stays valid SQL and matches nothing.
pub fn expand_bindings(sql: &str, bindings: &[Binding]) -> Result<(String, Vec<Value>)> {
    let offsets = placeholder_offsets(sql);
    if offsets.len() != bindings.len() {
        return Err(SqliteError::BindingCount {
            expected: offsets.len(),
            found: bindings.len(),
        });
    }

    let mut expanded = String::with_capacity(sql.len());
    let mut values = Vec::with_capacity(bindings.len());
    let mut last = 0;

    for (offset, binding) in offsets.into_iter().zip(bindings) {
        expanded.push_str(&sql[last..offset]);
        last = offset + 1;

        match &binding.value {
            DriverValue::List(items) if items.is_empty() => expanded.push_str("NULL"),
            DriverValue::List(items) => {
                let mut flat = Vec::with_capacity(items.len());
                flatten(items, &mut flat);
                trace!("expanding {} list binding to {} values", binding.ty, flat.len());
                expanded.push_str(&vec!["?"; flat.len()].join(", "));
                values.extend(flat);
            }
            scalar => {
                expanded.push('?');
                values.push(to_value(scalar));
            }
        }
    }
    expanded.push_str(&sql[last..]);

    Ok((expanded, values))
}

fn flatten(items: &[DriverValue], out: &mut Vec<Value>) {
    for item in items {
        match item {
            DriverValue::List(nested) => flatten(nested, out),
            scalar => out.push(to_value(scalar)),
        }
    }
}

fn to_value(value: &DriverValue) -> Value {
    match value {
        DriverValue::Null | DriverValue::List(_) => Value::Null,
        DriverValue::Integer(i) => Value::Integer(*i),
        DriverValue::Real(f) => Value::Real(*f),
        DriverValue::Text(s) => Value::Text(s.clone()),
        DriverValue::Blob(b) => Value::Blob(b.clone()),
    }
}

fn from_value_ref(value: ValueRef<'_>) -> DriverValue {
    match value {
        ValueRef::Null => DriverValue::Null,
        ValueRef::Integer(i) => DriverValue::Integer(i),
        ValueRef::Real(f) => DriverValue::Real(f),
        ValueRef::Text(t) => DriverValue::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => DriverValue::Blob(b.to_vec()),
    }
}

#[cfg(test)]
mod tests {
    use quarry::{Connection as _, Type};

    use super::*;

    fn binding(value: DriverValue, ty: Type) -> Binding {
        Binding { value, ty }
    }

    #[test]
    fn test_expand_list_bindings() {
        let bindings = vec![
            binding(DriverValue::Text("a".into()), Type::String),
            binding(
                DriverValue::List(vec![DriverValue::Integer(1), DriverValue::Integer(2)]),
                Type::IntArray,
            ),
            binding(DriverValue::List(vec![]), Type::StringArray),
        ];

        let (sql, values) =
            expand_bindings("a = ? AND b IN (?) AND c IN (?)", &bindings).unwrap();

        assert_eq!(sql, "a = ? AND b IN (?, ?) AND c IN (NULL)");
        assert_eq!(
            values,
            vec![Value::Text("a".into()), Value::Integer(1), Value::Integer(2)]
        );
    }

    #[test]
    fn test_expand_skips_quoted_question_marks() {
        let bindings = vec![binding(
            DriverValue::List(vec![DriverValue::Text("x".into())]),
            Type::StringArray,
        )];

        let (sql, _) = expand_bindings("SELECT '?' WHERE `a?` IN (?)", &bindings).unwrap();
        assert_eq!(sql, "SELECT '?' WHERE `a?` IN (?)");
    }

    #[test]
    fn test_expand_rejects_count_mismatch() {
        assert!(matches!(
            expand_bindings("a = ?", &[]),
            Err(SqliteError::BindingCount {
                expected: 1,
                found: 0
            })
        ));
    }

    #[test]
    fn test_execute_and_query_in_memory() {
        let conn = SqliteConnection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT, score REAL, data BLOB)")
            .unwrap();

        let affected = conn
            .execute(
                "INSERT INTO t (id, name, score, data) VALUES (?, ?, ?, ?)",
                &[
                    binding(DriverValue::Integer(1), Type::Integer),
                    binding(DriverValue::Text("one".into()), Type::String),
                    binding(DriverValue::Real(0.5), Type::Float),
                    binding(DriverValue::Null, Type::String),
                ],
            )
            .unwrap();
        assert_eq!(affected, 1);

        let rows = conn
            .query(
                "SELECT id, name, score, data FROM t WHERE id IN (?)",
                &[binding(
                    DriverValue::List(vec![DriverValue::Integer(1), DriverValue::Integer(9)]),
                    Type::IntArray,
                )],
            )
            .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(
            rows[0].columns,
            vec![
                ("id".to_string(), DriverValue::Integer(1)),
                ("name".to_string(), DriverValue::Text("one".into())),
                ("score".to_string(), DriverValue::Real(0.5)),
                ("data".to_string(), DriverValue::Null),
            ]
        );
    }

    #[test]
    fn test_driver_errors_become_connection_errors() {
        let conn = SqliteConnection::open_in_memory().unwrap();

        assert!(matches!(
            conn.query("SELECT * FROM missing", &[]),
            Err(quarry::QueryError::Connection(_))
        ));
    }
}
