use std::{ops::Deref, sync::Arc};

use crate::{
    condition::ConditionsBuilder,
    connection::Connection,
    error::Result,
    expr::Combinator,
    query::{known_table, Clause, ClauseKind, Query},
    schema::SchemaLookup,
};

const SLOTS: &[ClauseKind] = &[ClauseKind::Delete, ClauseKind::Where];

/// `DELETE FROM table WHERE ...`.
pub struct DeleteQuery {
    query: Query,
}

impl Deref for DeleteQuery {
    type Target = Query;

    fn deref(&self) -> &Query {
        &self.query
    }
}

impl DeleteQuery {
    pub fn from(
        schema: Arc<dyn SchemaLookup>,
        connection: Arc<dyn Connection>,
        table: &str,
    ) -> Result<Self> {
        let table = known_table(schema.as_ref(), table)?;
        let mut query = Query::new(schema, connection, SLOTS);
        if let Clause::Delete(c) = query.slot_mut(ClauseKind::Delete)? {
            c.table = Some(table);
        }
        Ok(Self { query })
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
