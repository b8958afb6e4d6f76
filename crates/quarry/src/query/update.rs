use std::{ops::Deref, sync::Arc};

use crate::{
    condition::ConditionsBuilder,
    connection::Connection,
    error::{QueryError, Result},
    expr::{Combinator, Param},
    query::{known_table, target_column, Clause, ClauseKind, Query},
    schema::SchemaLookup,
    types::{TypeRef, Value},
};

const SLOTS: &[ClauseKind] = &[ClauseKind::Update, ClauseKind::Set, ClauseKind::Where];

/// `UPDATE table SET ... WHERE ...`.
///
/// SET parameters bind before WHERE parameters.
pub struct UpdateQuery {
    query: Query,
    table: String,
}

impl Deref for UpdateQuery {
    type Target = Query;

    fn deref(&self) -> &Query {
        &self.query
    }
}

impl UpdateQuery {
    pub fn table(
        schema: Arc<dyn SchemaLookup>,
        connection: Arc<dyn Connection>,
        table: &str,
    ) -> Result<Self> {
        let table = known_table(schema.as_ref(), table)?;
        let mut query = Query::new(schema, connection, SLOTS);
        if let Clause::Update(c) = query.slot_mut(ClauseKind::Update)? {
            c.table = Some(table.clone());
        }
        Ok(Self { query, table })
    }

    fn assign(&mut self, column: &str, value: Value, ty: Option<TypeRef>) -> Result<&mut Self> {
        let (column, column_ty) = target_column(self.query.schema(), &self.table, column)?;
        let ty = match ty {
            Some(ty) => ty.resolve(self.query.schema())?,
            None => column_ty,
        };

        match self.query.slot_mut(ClauseKind::Set)? {
            Clause::Set(c) => c.assign(column, Param::new(value, ty)),
            _ => return Err(QueryError::UnknownClause(ClauseKind::Set.name().to_string())),
        }
        Ok(self)
    }

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

    pub fn where_<F>(&mut self, f: F) -> Result<&mut Self>
    where
        F: FnOnce(&mut ConditionsBuilder) -> Result<()>,
    {
        self.query.add_conditions(ClauseKind::Where, Combinator::And, f)?;
        Ok(self)
    }

    pub fn or_where<F>(&mut self, f: F) -> Result<&mut Self>
    where
        F: FnOnce(&mut ConditionsBuilder) -> Result<()>,
    {
        self.query.add_conditions(ClauseKind::Where, Combinator::Or, f)?;
        Ok(self)
    }
}
