use std::{ops::Deref, sync::Arc};

use crate::{
    connection::Connection,
    error::{QueryError, Result},
    expr::Param,
    query::{known_table, target_column, Clause, ClauseKind, Query},
    schema::SchemaLookup,
    types::{TypeRef, Value},
};

const SLOTS: &[ClauseKind] = &[ClauseKind::Insert, ClauseKind::Values];

/// `INSERT INTO table (columns) VALUES (...)`.
pub struct InsertQuery {
    query: Query,
}

impl Deref for InsertQuery {
    type Target = Query;

    fn deref(&self) -> &Query {
        &self.query
    }
}

impl InsertQuery {
    pub fn into(
        schema: Arc<dyn SchemaLookup>,
        connection: Arc<dyn Connection>,
        table: &str,
    ) -> Result<Self> {
        let table = known_table(schema.as_ref(), table)?;
        let mut query = Query::new(schema, connection, SLOTS);
        if let Clause::Insert(c) = query.slot_mut(ClauseKind::Insert)? {
            c.table = Some(table);
        }
        Ok(Self { query })
    }

    fn table(&self) -> Result<String> {
        match self.query.clause(ClauseKind::Insert.name())? {
            Clause::Insert(c) => c
                .table()
                .map(str::to_string)
                .ok_or_else(|| QueryError::UnknownClause(ClauseKind::Insert.name().to_string())),
            _ => Err(QueryError::UnknownClause(ClauseKind::Insert.name().to_string())),
        }
    }

    fn assign(&mut self, column: &str, value: Value, ty: Option<TypeRef>) -> Result<&mut Self> {
        let table = self.table()?;
        let (column, column_ty) = target_column(self.query.schema(), &table, column)?;
        let ty = match ty {
            Some(ty) => ty.resolve(self.query.schema())?,
            None => column_ty,
        };

        let columns = match self.query.slot_mut(ClauseKind::Values)? {
            Clause::Values(c) => {
                c.assign(column, Param::new(value, ty));
                c.assignments().iter().map(|a| a.column.clone()).collect()
            }
            _ => return Err(QueryError::UnknownClause(ClauseKind::Values.name().to_string())),
        };
        if let Clause::Insert(c) = self.query.slot_mut(ClauseKind::Insert)? {
            c.columns = columns;
        }
        Ok(self)
    }

    /// Sets `column` to `value`, typed by the schema.
    pub fn set(&mut self, column: &str, value: impl Into<Value>) -> Result<&mut Self> {
        self.assign(column, value.into(), None)
    }

    pub fn set_typed(
        &mut self,
        column: &str,
        value: impl Into<Value>,
        ty: impl Into<TypeRef>,
    ) -> Result<&mut Self> {
        self.assign(column, value.into(), Some(ty.into()))
    }

    /// Sets several columns at once.
    pub fn values<I, K, V>(&mut self, values: I) -> Result<&mut Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        for (column, value) in values {
            self.set(column.as_ref(), value)?;
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::{
        query::tests::{handles, RecordingConnection},
        schema::tests::blog_schema,
        types::{DriverValue, Type},
    };

    #[test]
    fn test_insert_sql() {
        let (schema, connection) = handles();
        let posted_at = NaiveDate::from_ymd_opt(2024, 5, 6)
            .unwrap()
            .and_hms_opt(7, 8, 9)
            .unwrap();

        let mut query = InsertQuery::into(schema, connection, "posts").unwrap();
        query
            .set("title", "Hello")
            .unwrap()
            .set("posts.posted_at", posted_at)
            .unwrap()
            .set("status", "draft")
            .unwrap();

        assert_eq!(
            query.to_sql(),
            "INSERT INTO `posts` (`title`, `posted_at`, `status`)\nVALUES (?, ?, ?)"
        );
        assert_eq!(query.param_types()[..2], [Type::String, Type::DateTime]);
        assert_eq!(query.param_values()[1], Value::DateTime(posted_at));
    }

    #[test]
    fn test_insert_replaces_repeated_column() {
        let (schema, connection) = handles();
        let mut query = InsertQuery::into(schema, connection, "comments").unwrap();
        query
            .values([("author", "ann"), ("author", "bob")])
            .unwrap()
            .set_typed("score", "4.5", "float")
            .unwrap();

        assert_eq!(
            query.to_sql(),
            "INSERT INTO `comments` (`author`, `score`)\nVALUES (?, ?)"
        );
        assert_eq!(
            query.param_values(),
            vec![Value::from("bob"), Value::from("4.5")]
        );
        assert_eq!(
            query.bindings().unwrap()[1].value,
            DriverValue::Real(4.5)
        );
    }

    #[test]
    fn test_insert_validates_targets() {
        let (schema, connection) = handles();

        assert!(matches!(
            InsertQuery::into(schema.clone(), connection.clone(), "users"),
            Err(QueryError::NotFound(_))
        ));

        let mut query = InsertQuery::into(schema, connection, "posts").unwrap();
        assert!(matches!(query.set("author", "x"), Err(QueryError::NotFound(_))));
        assert!(matches!(
            query.set("comments.author", "x"),
            Err(QueryError::InvalidReference(_))
        ));
        assert!(query.set_typed("id", 1, "uuid").is_err());
        assert!(query.param_values().is_empty());
    }

    #[test]
    fn test_insert_without_values_is_not_executed() {
        let connection = Arc::new(RecordingConnection::default());
        let mut query =
            InsertQuery::into(Arc::new(blog_schema()), connection.clone(), "posts").unwrap();

        assert!(matches!(query.execute(), Err(QueryError::Incomplete(_))));
        assert!(connection.statements.lock().unwrap().is_empty());

        query.set("title", "t").unwrap();
        assert_eq!(query.execute().unwrap(), 1);
        assert_eq!(connection.last().0, "INSERT INTO `posts` (`title`)\nVALUES (?)");
    }

    #[test]
    fn test_insert_execute_encodes_bindings() {
        let connection = Arc::new(RecordingConnection::default());
        let mut query = InsertQuery::into(Arc::new(blog_schema()), connection.clone(), "posts").unwrap();
        query.set("id", "12").unwrap().set("title", "t").unwrap();

        assert_eq!(query.execute().unwrap(), 1);

        let (sql, bindings) = connection.last();
        assert_eq!(sql, query.to_sql());
        assert_eq!(bindings[0].value, DriverValue::Integer(12));
        assert_eq!(bindings[1].value, DriverValue::Text("t".into()));
    }
}
