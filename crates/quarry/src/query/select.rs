//! SELECT queries.

use std::{ops::Deref, sync::Arc};

use tracing::trace;

use crate::{
    condition::{ConditionGroup, ConditionsBuilder},
    connection::{decode_row, Connection, Row},
    error::{QueryError, Result},
    expr::{ColumnPath, ColumnRef, Combinator},
    query::{
        build_conditions,
        clause::{
            sort_column, Clause, ClauseKind, Direction, Join, JoinKind, SelectEntry, SelectItem,
        },
        known_table, Query,
    },
    schema::SchemaLookup,
    types::{Type, TypeRef, Value},
};

const SLOTS: &[ClauseKind] = &[
    ClauseKind::Select,
    ClauseKind::From,
    ClauseKind::Where,
    ClauseKind::GroupBy,
    ClauseKind::Having,
    ClauseKind::OrderBy,
    ClauseKind::Limit,
];

/// Builds and runs a SELECT statement.
///
/// # Example
///
/// ```ignore
/// let mut query = SelectQuery::new(schema, connection);
/// query
///     .select([("posts.id", "post_id")])?
///     .select_count(None, "comments")?
///     .from("posts")?
///     .left_join("posts.id", "comments.post_id")?
///     .group_by("posts.id")?
///     .order_by("-comments")?
///     .limit(10)?;
///
/// assert_eq!(query.conversion_types()[0], ("post_id".into(), Type::Integer));
/// ```
pub struct SelectQuery {
    query: Query,
}

impl Deref for SelectQuery {
    type Target = Query;

    fn deref(&self) -> &Query {
        &self.query
    }
}

impl SelectQuery {
    pub fn new(schema: Arc<dyn SchemaLookup>, connection: Arc<dyn Connection>) -> Self {
        Self {
            query: Query::new(schema, connection, SLOTS),
        }
    }

    fn entries_mut(&mut self) -> Result<&mut Vec<SelectEntry>> {
        match self.query.slot_mut(ClauseKind::Select)? {
            Clause::Select(c) => Ok(&mut c.entries),
            _ => Err(QueryError::UnknownClause(ClauseKind::Select.name().to_string())),
        }
    }

    fn resolve_items<I, S>(&self, items: I) -> Result<Vec<SelectEntry>>
    where
        I: IntoIterator<Item = S>,
        S: Into<SelectItem>,
    {
        items
            .into_iter()
            .map(|item| SelectEntry::resolve(self.query.schema(), item.into()))
            .collect()
    }

    /// Replaces the select list.
    pub fn select<I, S>(&mut self, items: I) -> Result<&mut Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<SelectItem>,
    {
        let entries = self.resolve_items(items)?;
        *self.entries_mut()? = entries;
        Ok(self)
    }

    /// Appends to the select list.
    pub fn add_select<I, S>(&mut self, items: I) -> Result<&mut Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<SelectItem>,
    {
        let entries = self.resolve_items(items)?;
        self.entries_mut()?.extend(entries);
        Ok(self)
    }

    /// Appends `FUNCTION(column) AS alias`, typed by the column.
    pub fn select_aggr(
        &mut self,
        function: &str,
        column: impl Into<ColumnRef>,
        alias: &str,
    ) -> Result<&mut Self> {
        self.push_aggregate(function, Some(column.into()), alias, None)
    }

    pub fn select_aggr_typed(
        &mut self,
        function: &str,
        column: impl Into<ColumnRef>,
        alias: &str,
        ty: impl Into<TypeRef>,
    ) -> Result<&mut Self> {
        let ty = ty.into().resolve(self.query.schema())?;
        self.push_aggregate(function, Some(column.into()), alias, Some(ty))
    }

    /// Appends `COUNT(column) AS alias`, or `COUNT(*)` without a column.
    pub fn select_count(&mut self, column: Option<ColumnRef>, alias: &str) -> Result<&mut Self> {
        self.push_aggregate("COUNT", column, alias, Some(Type::Integer))
    }

    fn push_aggregate(
        &mut self,
        function: &str,
        column: Option<ColumnRef>,
        alias: &str,
        ty: Option<Type>,
    ) -> Result<&mut Self> {
        let entry = SelectEntry::aggregate(self.query.schema(), function, column, alias, ty)?;
        self.entries_mut()?.push(entry);
        Ok(self)
    }

    /// Sets the base table.
    pub fn from(&mut self, table: &str) -> Result<&mut Self> {
        let table = known_table(self.query.schema(), table)?;
        match self.query.slot_mut(ClauseKind::From)? {
            Clause::From(c) => c.table = Some(table),
            _ => return Err(QueryError::UnknownClause(ClauseKind::From.name().to_string())),
        }
        Ok(self)
    }

    fn push_join(&mut self, kind: JoinKind, table: String, on: ConditionGroup) -> Result<&mut Self> {
        match self.query.slot_mut(ClauseKind::From)? {
            Clause::From(c) if c.table.is_none() => {
                return Err(QueryError::InvalidReference(format!(
                    "cannot join `{table}` before the base table is set with `from`"
                )))
            }
            Clause::From(c) => c.joins.push(Join { kind, table, on }),
            _ => return Err(QueryError::UnknownClause(ClauseKind::From.name().to_string())),
        }
        Ok(self)
    }

    fn join_columns(
        &mut self,
        kind: JoinKind,
        origin: ColumnRef,
        target: ColumnRef,
    ) -> Result<&mut Self> {
        let target_path = target.resolve(self.query.schema())?;
        let table = join_table(&target_path)?;
        let on = build_conditions(self.query.schema(), |on| {
            on.equals_column(origin, target)?;
            Ok(())
        })?;
        self.push_join(kind, table, on)
    }

    fn join_on<F>(&mut self, kind: JoinKind, table: &str, f: F) -> Result<&mut Self>
    where
        F: FnOnce(&mut ConditionsBuilder) -> Result<()>,
    {
        let table = known_table(self.query.schema(), table)?;
        let on = build_conditions(self.query.schema(), f)?;
        if on.is_empty() {
            return Err(QueryError::InvalidReference(format!(
                "join on `{table}` has no ON condition"
            )));
        }
        self.push_join(kind, table, on)
    }

    /// `INNER JOIN target_table ON origin = target`.
    ///
    /// Joins attach to the base table, so [`SelectQuery::from`] must come
    /// first; otherwise this fails with [`QueryError::InvalidReference`].
    pub fn inner_join(
        &mut self,
        origin: impl Into<ColumnRef>,
        target: impl Into<ColumnRef>,
    ) -> Result<&mut Self> {
        self.join_columns(JoinKind::Inner, origin.into(), target.into())
    }

    /// `LEFT JOIN target_table ON origin = target`.
    pub fn left_join(
        &mut self,
        origin: impl Into<ColumnRef>,
        target: impl Into<ColumnRef>,
    ) -> Result<&mut Self> {
        self.join_columns(JoinKind::Left, origin.into(), target.into())
    }

    /// `INNER JOIN table ON ...` with conditions built by `f`.
    ///
    /// `table` may be a bare table name or any `table.column` of it.
    pub fn inner_join_on<F>(&mut self, table: &str, f: F) -> Result<&mut Self>
    where
        F: FnOnce(&mut ConditionsBuilder) -> Result<()>,
    {
        self.join_on(JoinKind::Inner, table, f)
    }

    pub fn left_join_on<F>(&mut self, table: &str, f: F) -> Result<&mut Self>
    where
        F: FnOnce(&mut ConditionsBuilder) -> Result<()>,
    {
        self.join_on(JoinKind::Left, table, f)
    }

    /// Adds a group of conditions to WHERE, joined with AND.
    pub fn where_<F>(&mut self, f: F) -> Result<&mut Self>
    where
        F: FnOnce(&mut ConditionsBuilder) -> Result<()>,
    {
        self.query.add_conditions(ClauseKind::Where, Combinator::And, f)?;
        Ok(self)
    }

    pub fn and_where<F>(&mut self, f: F) -> Result<&mut Self>
    where
        F: FnOnce(&mut ConditionsBuilder) -> Result<()>,
    {
        self.where_(f)
    }

    /// Adds a group of conditions to WHERE, joined with OR.
    pub fn or_where<F>(&mut self, f: F) -> Result<&mut Self>
    where
        F: FnOnce(&mut ConditionsBuilder) -> Result<()>,
    {
        self.query.add_conditions(ClauseKind::Where, Combinator::Or, f)?;
        Ok(self)
    }

    pub fn having<F>(&mut self, f: F) -> Result<&mut Self>
    where
        F: FnOnce(&mut ConditionsBuilder) -> Result<()>,
    {
        self.query.add_conditions(ClauseKind::Having, Combinator::And, f)?;
        Ok(self)
    }

    pub fn or_having<F>(&mut self, f: F) -> Result<&mut Self>
    where
        F: FnOnce(&mut ConditionsBuilder) -> Result<()>,
    {
        self.query.add_conditions(ClauseKind::Having, Combinator::Or, f)?;
        Ok(self)
    }

    pub fn group_by(&mut self, column: &str) -> Result<&mut Self> {
        let column = sort_column(self.query.schema(), column)?;
        match self.query.slot_mut(ClauseKind::GroupBy)? {
            Clause::GroupBy(c) => c.columns.push(column),
            _ => return Err(QueryError::UnknownClause(ClauseKind::GroupBy.name().to_string())),
        }
        Ok(self)
    }

    /// Appends a sort column; a leading `-` sorts descending.
    pub fn order_by(&mut self, column: &str) -> Result<&mut Self> {
        let column = column.trim();
        let (column, direction) = match column.strip_prefix('-') {
            Some(rest) => (rest, Direction::Desc),
            None => (column, Direction::Asc),
        };
        let column = sort_column(self.query.schema(), column)?;
        match self.query.slot_mut(ClauseKind::OrderBy)? {
            Clause::OrderBy(c) => c.items.push((column, direction)),
            _ => return Err(QueryError::UnknownClause(ClauseKind::OrderBy.name().to_string())),
        }
        Ok(self)
    }

    pub fn limit(&mut self, count: u64) -> Result<&mut Self> {
        match self.query.slot_mut(ClauseKind::Limit)? {
            Clause::Limit(c) => c.limit = Some(count),
            _ => return Err(QueryError::UnknownClause(ClauseKind::Limit.name().to_string())),
        }
        Ok(self)
    }

    /// Sets the offset; it is only rendered together with a limit.
    pub fn offset(&mut self, offset: u64) -> Result<&mut Self> {
        match self.query.slot_mut(ClauseKind::Limit)? {
            Clause::Limit(c) => c.offset = offset,
            _ => return Err(QueryError::UnknownClause(ClauseKind::Limit.name().to_string())),
        }
        Ok(self)
    }

    /// 1-based pagination; page 0 is treated as page 1.
    pub fn page(&mut self, page: u64, per_page: u64) -> Result<&mut Self> {
        let page = page.max(1);
        self.limit(per_page)?.offset((page - 1).saturating_mul(per_page))
    }

    /// Output column names and the types used to decode them, in select
    /// order.
    ///
    /// Duplicate names keep their first position and the last type.
    pub fn conversion_types(&self) -> Vec<(String, Type)> {
        let mut types: Vec<(String, Type)> = Vec::new();
        let Ok(Clause::Select(select)) = self.query.clause(ClauseKind::Select.name()) else {
            return types;
        };

        for (name, ty) in select.entries().iter().flat_map(|e| e.outputs()) {
            match types.iter_mut().find(|(existing, _)| existing == name) {
                Some(slot) => {
                    trace!("output `{}` selected more than once", name);
                    slot.1 = ty.clone();
                }
                None => types.push((name.clone(), ty.clone())),
            }
        }
        types
    }

    pub fn fetch_all(&self) -> Result<Vec<Row>> {
        let (sql, bindings) = self.query.prepare()?;
        let raw = self.query.connection().query(&sql, &bindings)?;
        let types = self.conversion_types();
        raw.into_iter().map(|row| decode_row(row, &types)).collect()
    }

    pub fn fetch_one(&self) -> Result<Option<Row>> {
        Ok(self.fetch_all()?.into_iter().next())
    }

    /// Values of the output column `column` across all rows.
    pub fn fetch_list(&self, column: &str) -> Result<Vec<Value>> {
        self.fetch_all()?
            .into_iter()
            .map(|row| {
                row.get(column)
                    .cloned()
                    .ok_or_else(|| QueryError::NotFound(format!("result column `{column}`")))
            })
            .collect()
    }

    /// A single value from the first row; the first column unless one is
    /// named.
    pub fn fetch_value(&self, column: Option<&str>) -> Result<Option<Value>> {
        let Some(row) = self.fetch_one()? else {
            return Ok(None);
        };
        let value = match column {
            Some(name) => row
                .get(name)
                .ok_or_else(|| QueryError::NotFound(format!("result column `{name}`")))?,
            None => match row.get_index(0) {
                Some(value) => value,
                None => return Ok(None),
            },
        };
        Ok(Some(value.clone()))
    }
}

fn join_table(target: &ColumnPath) -> Result<String> {
    match (target.table(), target.column()) {
        (Some(table), Some(_)) => Ok(table.to_string()),
        _ => Err(QueryError::InvalidReference(format!(
            "join target `{target}` must be a `table.column` reference"
        ))),
    }
}
