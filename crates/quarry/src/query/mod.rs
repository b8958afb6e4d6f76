//! The query builders.
//!
//! Every statement is a [`Query`]: a fixed, ordered list of clause slots plus
//! shared handles to the schema and the connection. Builder methods mutate
//! the slots and validate their input against the schema on the spot, so a
//! finished query always renders.
//!
//! - [`SelectQuery`]: SELECT, FROM (+ joins), WHERE, GROUP BY, HAVING,
//!   ORDER BY, LIMIT
//! - [`InsertQuery`]: INSERT INTO, VALUES
//! - [`UpdateQuery`]: UPDATE, SET, WHERE
//! - [`DeleteQuery`]: DELETE FROM, WHERE
//!
//! ```ignore
//! let mut query = SelectQuery::new(schema, connection);
//! query
//!     .select(["posts.id", "posts.posted_at"])?
//!     .from("posts")?
//!     .where_(|w| {
//!         w.in_("posts.id", [1, 2, 3])?;
//!         Ok(())
//!     })?;
//!
//! let rows = query.fetch_all()?;
//! ```

pub mod clause;
pub mod delete;
pub mod insert;
pub mod select;
pub mod update;

use std::sync::Arc;

use tracing::{debug, trace};

pub use clause::{Clause, ClauseKind, Direction, JoinKind, SelectItem};
pub use delete::DeleteQuery;
pub use insert::InsertQuery;
pub use select::SelectQuery;
pub use update::UpdateQuery;

use crate::{
    condition::{ConditionGroup, ConditionNode, ConditionsBuilder},
    connection::{Binding, Connection},
    error::{QueryError, Result},
    expr::{Combinator, Param},
    schema::SchemaLookup,
    traits::Expression,
    types::{Type, Value},
};

/// Clause slots plus the schema and connection they are validated and run
/// against.
///
/// Not meant to be shared between threads while it is being built.
pub struct Query {
    schema: Arc<dyn SchemaLookup>,
    connection: Arc<dyn Connection>,
    clauses: Vec<Clause>,
}

impl Query {
    pub(crate) fn new(
        schema: Arc<dyn SchemaLookup>,
        connection: Arc<dyn Connection>,
        kinds: &[ClauseKind],
    ) -> Self {
        Self {
            schema,
            connection,
            clauses: kinds.iter().map(|kind| Clause::empty(*kind)).collect(),
        }
    }

    pub fn schema(&self) -> &dyn SchemaLookup {
        self.schema.as_ref()
    }

    /// Looks up a clause slot by name (`"where"`, `"order_by"`, ...).
    ///
    /// Fails with [`QueryError::UnknownClause`] if the name is not a clause
    /// or this query has no such slot.
    pub fn clause(&self, name: &str) -> Result<&Clause> {
        let kind: ClauseKind = name.parse()?;
        self.clauses
            .iter()
            .find(|clause| clause.kind() == kind)
            .ok_or_else(|| QueryError::UnknownClause(name.to_string()))
    }

    pub(crate) fn slot_mut(&mut self, kind: ClauseKind) -> Result<&mut Clause> {
        self.clauses
            .iter_mut()
            .find(|clause| clause.kind() == kind)
            .ok_or_else(|| QueryError::UnknownClause(kind.name().to_string()))
    }

    /// Runs `f` on a fresh condition builder and merges the result into the
    /// root group of the WHERE or HAVING slot.
    pub(crate) fn add_conditions<F>(
        &mut self,
        kind: ClauseKind,
        combinator: Combinator,
        f: F,
    ) -> Result<()>
    where
        F: FnOnce(&mut ConditionsBuilder) -> Result<()>,
    {
        let group = build_conditions(self.schema.as_ref(), f)?;
        let root = match self.slot_mut(kind)? {
            Clause::Where(c) | Clause::Having(c) => &mut c.root,
            _ => return Err(QueryError::UnknownClause(kind.name().to_string())),
        };
        if !group.is_empty() {
            root.push(combinator, ConditionNode::Group(group));
        }
        Ok(())
    }

    /// Renders the SQL text and collects its parameters in placeholder order.
    pub fn build(&self) -> (String, Vec<Param>) {
        let mut params = Vec::new();
        let sql = self
            .clauses
            .iter()
            .map(|clause| clause.to_sql(&mut params))
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        (sql, params)
    }

    pub fn to_sql(&self) -> String {
        self.build().0
    }

    pub fn params(&self) -> Vec<Param> {
        self.build().1
    }

    pub fn param_values(&self) -> Vec<Value> {
        self.params().into_iter().map(|param| param.value).collect()
    }

    pub fn param_types(&self) -> Vec<Type> {
        self.params().into_iter().map(|param| param.ty).collect()
    }

    /// Encodes every parameter with its type.
    pub fn bindings(&self) -> Result<Vec<Binding>> {
        self.params()
            .into_iter()
            .map(|param| {
                Ok(Binding {
                    value: param.ty.to_database(&param.value)?,
                    ty: param.ty,
                })
            })
            .collect()
    }

    /// Fails with [`QueryError::Incomplete`] when a VALUES or SET slot has no
    /// assignments, since the statement would not be valid SQL.
    pub fn check_complete(&self) -> Result<()> {
        match self
            .clauses
            .iter()
            .find(|clause| matches!(clause, Clause::Values(_) | Clause::Set(_)) && clause.is_empty())
        {
            Some(clause) => Err(QueryError::Incomplete(format!(
                "`{}` clause has no assignments",
                clause.kind()
            ))),
            None => Ok(()),
        }
    }

    pub(crate) fn prepare(&self) -> Result<(String, Vec<Binding>)> {
        self.check_complete()?;
        let sql = self.to_sql();
        let bindings = self.bindings()?;
        debug!("{}", sql);
        trace!("{} bindings", bindings.len());
        Ok((sql, bindings))
    }

    /// Runs the statement, returning the number of affected rows.
    pub fn execute(&self) -> Result<u64> {
        let (sql, bindings) = self.prepare()?;
        self.connection.execute(&sql, &bindings)
    }

    pub(crate) fn connection(&self) -> &dyn Connection {
        self.connection.as_ref()
    }
}

pub(crate) fn build_conditions<F>(schema: &dyn SchemaLookup, f: F) -> Result<ConditionGroup>
where
    F: FnOnce(&mut ConditionsBuilder) -> Result<()>,
{
    let mut builder = ConditionsBuilder::new(schema);
    f(&mut builder)?;
    Ok(builder.into_group())
}

/// Validates a table name; `table.column` references name their table.
pub(crate) fn known_table(schema: &dyn SchemaLookup, reference: &str) -> Result<String> {
    let reference = reference.trim();
    let table = reference
        .split_once('.')
        .map_or(reference, |(table, _)| table);
    clause::check_identifier(table)?;
    if !schema.table_exists(table) {
        return Err(QueryError::NotFound(format!("table `{table}`")));
    }
    Ok(table.to_string())
}

/// Resolves a manipulation column for `table`: either bare (`title`) or
/// qualified with the query's own table (`posts.title`).
pub(crate) fn target_column(
    schema: &dyn SchemaLookup,
    table: &str,
    column: &str,
) -> Result<(String, Type)> {
    let column = column.trim();
    let bare = match column.split_once('.') {
        Some((owner, name)) if owner == table => name,
        Some(_) => {
            return Err(QueryError::InvalidReference(format!(
                "`{column}` does not belong to table `{table}`"
            )))
        }
        None => column,
    };
    clause::check_identifier(bare)?;
    let ty = schema.resolve_column(table, bare)?;
    Ok((bare.to_string(), ty))
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::{connection::RawRow, schema::tests::blog_schema};

    /// Records every statement and replays canned rows.
    #[derive(Default)]
    pub struct RecordingConnection {
        pub statements: Mutex<Vec<(String, Vec<Binding>)>>,
        pub rows: Mutex<Vec<RawRow>>,
    }

    impl RecordingConnection {
        pub fn with_rows(rows: Vec<RawRow>) -> Self {
            Self {
                statements: Mutex::default(),
                rows: Mutex::new(rows),
            }
        }

        pub fn last(&self) -> (String, Vec<Binding>) {
            self.statements.lock().unwrap().last().cloned().unwrap()
        }
    }

    impl Connection for RecordingConnection {
        fn execute(&self, sql: &str, bindings: &[Binding]) -> Result<u64> {
            self.statements
                .lock()
                .unwrap()
                .push((sql.to_string(), bindings.to_vec()));
            Ok(1)
        }

        fn query(&self, sql: &str, bindings: &[Binding]) -> Result<Vec<RawRow>> {
            self.statements
                .lock()
                .unwrap()
                .push((sql.to_string(), bindings.to_vec()));
            Ok(self.rows.lock().unwrap().clone())
        }
    }

    pub fn handles() -> (Arc<dyn SchemaLookup>, Arc<RecordingConnection>) {
        (Arc::new(blog_schema()), Arc::new(RecordingConnection::default()))
    }

    #[test]
    fn test_clause_lookup_by_name() {
        let (schema, connection) = handles();
        let query = SelectQuery::new(schema, connection);

        assert_eq!(query.clause("where").unwrap().kind(), ClauseKind::Where);
        assert_eq!(query.clause("group_by").unwrap().kind(), ClauseKind::GroupBy);
        assert!(matches!(
            query.clause("set"),
            Err(QueryError::UnknownClause(_))
        ));
        assert!(matches!(
            query.clause("window"),
            Err(QueryError::UnknownClause(_))
        ));
    }

    #[test]
    fn test_target_column() {
        let schema = blog_schema();

        assert_eq!(
            target_column(&schema, "posts", "title").unwrap(),
            ("title".to_string(), Type::String)
        );
        assert_eq!(
            target_column(&schema, "posts", "posts.id").unwrap(),
            ("id".to_string(), Type::Integer)
        );
        assert!(matches!(
            target_column(&schema, "posts", "comments.id"),
            Err(QueryError::InvalidReference(_))
        ));
        assert!(matches!(
            target_column(&schema, "posts", "author"),
            Err(QueryError::NotFound(_))
        ));
    }
}
