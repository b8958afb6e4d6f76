//! Clause slots.
//!
//! Each query owns a fixed, ordered set of [`Clause`]s. A clause renders to
//! one SQL line (FROM renders one extra line per join) and contributes the
//! parameters for its own placeholders. An empty clause renders nothing.

use std::{fmt, str::FromStr, sync::LazyLock};

use regex::Regex;

use crate::{
    condition::ConditionGroup,
    error::{QueryError, Result},
    expr::{quote_identifier, ColumnPath, ColumnRef, Param, Raw},
    schema::SchemaLookup,
    traits::Expression,
    types::{Type, TypeRef},
};

static IDENTIFIER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("unable to compile identifier regex")
});

/// Names of the clause slots a query can own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClauseKind {
    Select,
    From,
    Where,
    GroupBy,
    Having,
    OrderBy,
    Limit,
    Insert,
    Values,
    Update,
    Set,
    Delete,
}

impl ClauseKind {
    pub fn name(&self) -> &'static str {
        match self {
            ClauseKind::Select => "select",
            ClauseKind::From => "from",
            ClauseKind::Where => "where",
            ClauseKind::GroupBy => "group_by",
            ClauseKind::Having => "having",
            ClauseKind::OrderBy => "order_by",
            ClauseKind::Limit => "limit",
            ClauseKind::Insert => "insert",
            ClauseKind::Values => "values",
            ClauseKind::Update => "update",
            ClauseKind::Set => "set",
            ClauseKind::Delete => "delete",
        }
    }
}

impl FromStr for ClauseKind {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self> {
        let kind = match s.trim().to_ascii_lowercase().replace(' ', "_").as_str() {
            "select" => ClauseKind::Select,
            "from" => ClauseKind::From,
            "where" => ClauseKind::Where,
            "group_by" => ClauseKind::GroupBy,
            "having" => ClauseKind::Having,
            "order_by" => ClauseKind::OrderBy,
            "limit" => ClauseKind::Limit,
            "insert" => ClauseKind::Insert,
            "values" => ClauseKind::Values,
            "update" => ClauseKind::Update,
            "set" => ClauseKind::Set,
            "delete" => ClauseKind::Delete,
            _ => return Err(QueryError::UnknownClause(s.to_string())),
        };
        Ok(kind)
    }
}

impl fmt::Display for ClauseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One clause slot of a query.
#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    Select(SelectClause),
    From(FromClause),
    Where(ConditionClause),
    GroupBy(ColumnListClause),
    Having(ConditionClause),
    OrderBy(OrderByClause),
    Limit(LimitClause),
    Insert(InsertClause),
    Values(AssignmentsClause),
    Update(TableClause),
    Set(AssignmentsClause),
    Delete(TableClause),
}

impl Clause {
    /// The canonical empty clause for a slot.
    pub fn empty(kind: ClauseKind) -> Self {
        match kind {
            ClauseKind::Select => Clause::Select(SelectClause::default()),
            ClauseKind::From => Clause::From(FromClause::default()),
            ClauseKind::Where => Clause::Where(ConditionClause::default()),
            ClauseKind::GroupBy => Clause::GroupBy(ColumnListClause::default()),
            ClauseKind::Having => Clause::Having(ConditionClause::default()),
            ClauseKind::OrderBy => Clause::OrderBy(OrderByClause::default()),
            ClauseKind::Limit => Clause::Limit(LimitClause::default()),
            ClauseKind::Insert => Clause::Insert(InsertClause::default()),
            ClauseKind::Values => Clause::Values(AssignmentsClause::default()),
            ClauseKind::Update => Clause::Update(TableClause::default()),
            ClauseKind::Set => Clause::Set(AssignmentsClause::default()),
            ClauseKind::Delete => Clause::Delete(TableClause::default()),
        }
    }

    pub fn kind(&self) -> ClauseKind {
        match self {
            Clause::Select(_) => ClauseKind::Select,
            Clause::From(_) => ClauseKind::From,
            Clause::Where(_) => ClauseKind::Where,
            Clause::GroupBy(_) => ClauseKind::GroupBy,
            Clause::Having(_) => ClauseKind::Having,
            Clause::OrderBy(_) => ClauseKind::OrderBy,
            Clause::Limit(_) => ClauseKind::Limit,
            Clause::Insert(_) => ClauseKind::Insert,
            Clause::Values(_) => ClauseKind::Values,
            Clause::Update(_) => ClauseKind::Update,
            Clause::Set(_) => ClauseKind::Set,
            Clause::Delete(_) => ClauseKind::Delete,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Clause::Select(c) => c.entries.is_empty(),
            Clause::From(c) => c.table.is_none(),
            Clause::Where(c) | Clause::Having(c) => c.root.is_empty(),
            Clause::GroupBy(c) => c.columns.is_empty(),
            Clause::OrderBy(c) => c.items.is_empty(),
            Clause::Limit(c) => c.limit.is_none(),
            Clause::Insert(c) => c.table.is_none(),
            Clause::Update(c) | Clause::Delete(c) => c.table.is_none(),
            Clause::Values(c) | Clause::Set(c) => c.assignments.is_empty(),
        }
    }
}

impl Expression for Clause {
    fn to_sql(&self, params: &mut Vec<Param>) -> String {
        if self.is_empty() {
            return String::new();
        }

        match self {
            Clause::Select(c) => {
                let columns: Vec<String> = c.entries.iter().map(SelectEntry::render).collect();
                format!("SELECT {}", columns.join(", "))
            }
            Clause::From(c) => c.render(params),
            Clause::Where(c) => format!("WHERE {}", c.root.to_sql_unwrapped(params)),
            Clause::Having(c) => format!("HAVING {}", c.root.to_sql_unwrapped(params)),
            Clause::GroupBy(c) => format!("GROUP BY {}", c.columns.join(", ")),
            Clause::OrderBy(c) => {
                let items: Vec<String> = c
                    .items
                    .iter()
                    .map(|(column, direction)| format!("{} {}", column, direction.as_sql()))
                    .collect();
                format!("ORDER BY {}", items.join(", "))
            }
            Clause::Limit(c) => match c.limit {
                Some(limit) => format!("LIMIT {},{}", c.offset, limit),
                None => String::new(),
            },
            Clause::Insert(c) => {
                let columns: Vec<String> = c.columns.iter().map(|col| quote_identifier(col)).collect();
                format!(
                    "INSERT INTO {} ({})",
                    quote_identifier(c.table.as_deref().unwrap_or_default()),
                    columns.join(", ")
                )
            }
            Clause::Update(c) => format!("UPDATE {}", c.quoted_table()),
            Clause::Delete(c) => format!("DELETE FROM {}", c.quoted_table()),
            Clause::Values(c) => {
                params.extend(c.assignments.iter().map(|a| a.param.clone()));
                format!("VALUES ({})", vec!["?"; c.assignments.len()].join(", "))
            }
            Clause::Set(c) => {
                let sets: Vec<String> = c
                    .assignments
                    .iter()
                    .map(|a| {
                        params.push(a.param.clone());
                        format!("{} = ?", quote_identifier(&a.column))
                    })
                    .collect();
                format!("SET {}", sets.join(", "))
            }
        }
    }
}

/// What to put in a SELECT list: a column or raw reference, with an optional
/// alias and an optional explicit type.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectItem {
    column: ColumnRef,
    alias: Option<String>,
    ty: Option<TypeRef>,
}

impl SelectItem {
    pub fn new(column: impl Into<ColumnRef>) -> Self {
        Self {
            column: column.into(),
            alias: None,
            ty: None,
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn typed(mut self, ty: impl Into<TypeRef>) -> Self {
        self.ty = Some(ty.into());
        self
    }
}

impl From<&str> for SelectItem {
    fn from(column: &str) -> Self {
        SelectItem::new(column)
    }
}

impl From<String> for SelectItem {
    fn from(column: String) -> Self {
        SelectItem::new(column)
    }
}

impl From<(&str, &str)> for SelectItem {
    fn from((column, alias): (&str, &str)) -> Self {
        SelectItem::new(column).alias(alias)
    }
}

impl From<Raw> for SelectItem {
    fn from(raw: Raw) -> Self {
        SelectItem::new(raw)
    }
}

/// A resolved SELECT list entry.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectEntry {
    expr: ColumnPath,
    alias: Option<String>,
    outputs: Vec<(String, Type)>,
}

impl SelectEntry {
    pub(crate) fn resolve(schema: &dyn SchemaLookup, item: SelectItem) -> Result<Self> {
        let expr = match (&item.column, &item.alias) {
            (ColumnRef::Path(reference), Some(alias)) => {
                ColumnPath::parse_aliased(schema, reference, alias)?
            }
            (column, _) => column.resolve(schema)?,
        };
        let explicit = item.ty.map(|ty| ty.resolve(schema)).transpose()?;

        let outputs = if expr.is_wildcard() {
            let table = expr.table().unwrap_or_default();
            schema.table_columns(table)?
        } else {
            let ty = expr.require_type(explicit)?;
            let name = item
                .alias
                .clone()
                .or_else(|| expr.column().map(str::to_string))
                .unwrap_or_else(|| expr.to_string());
            vec![(name, ty)]
        };

        Ok(Self {
            expr,
            alias: item.alias,
            outputs,
        })
    }

    /// `FN(column) AS alias`, typed explicitly or by the wrapped column.
    pub(crate) fn aggregate(
        schema: &dyn SchemaLookup,
        function: &str,
        column: Option<ColumnRef>,
        alias: &str,
        ty: Option<Type>,
    ) -> Result<Self> {
        if !IDENTIFIER_RE.is_match(function) {
            return Err(QueryError::InvalidReference(format!(
                "`{function}` is not a valid aggregate function name"
            )));
        }
        let function = function.to_ascii_uppercase();

        let (argument, column_ty) = match column {
            Some(column) => {
                let path = column.resolve(schema)?;
                if path.is_wildcard() {
                    return Err(QueryError::InvalidReference(format!(
                        "wildcard `{path}` cannot be aggregated"
                    )));
                }
                let ty = path.ty().cloned();
                (path.to_string(), ty)
            }
            None => ("*".to_string(), None),
        };

        let expr = ColumnPath::raw(&format!("{function}({argument})"));
        let ty = match ty {
            Some(ty) => ty,
            None if function == "COUNT" => Type::Integer,
            None => column_ty.ok_or_else(|| QueryError::MissingType(expr.to_string()))?,
        };

        Ok(Self {
            expr,
            alias: Some(alias.to_string()),
            outputs: vec![(alias.to_string(), ty)],
        })
    }

    pub fn outputs(&self) -> &[(String, Type)] {
        &self.outputs
    }

    fn render(&self) -> String {
        match &self.alias {
            Some(alias) => format!("{} AS {}", self.expr, quote_identifier(alias)),
            None => self.expr.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SelectClause {
    pub(crate) entries: Vec<SelectEntry>,
}

impl SelectClause {
    pub fn entries(&self) -> &[SelectEntry] {
        &self.entries
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
}

impl JoinKind {
    pub fn as_sql(&self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::Left => "LEFT JOIN",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub kind: JoinKind,
    pub table: String,
    pub on: ConditionGroup,
}

/// The base table and its joins.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FromClause {
    pub(crate) table: Option<String>,
    pub(crate) joins: Vec<Join>,
}

impl FromClause {
    pub fn table(&self) -> Option<&str> {
        self.table.as_deref()
    }

    pub fn joins(&self) -> &[Join] {
        &self.joins
    }

    fn render(&self, params: &mut Vec<Param>) -> String {
        let mut lines = vec![format!(
            "FROM {}",
            quote_identifier(self.table.as_deref().unwrap_or_default())
        )];
        for join in &self.joins {
            lines.push(format!(
                "{} {} ON {}",
                join.kind.as_sql(),
                quote_identifier(&join.table),
                join.on.to_sql_unwrapped(params)
            ));
        }
        lines.join("\n")
    }
}

/// WHERE or HAVING: a root condition group, AND-combined by default.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConditionClause {
    pub(crate) root: ConditionGroup,
}

impl ConditionClause {
    pub fn root(&self) -> &ConditionGroup {
        &self.root
    }
}

/// GROUP BY columns, already quoted.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ColumnListClause {
    pub(crate) columns: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct OrderByClause {
    pub(crate) items: Vec<(String, Direction)>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct LimitClause {
    pub(crate) limit: Option<u64>,
    pub(crate) offset: u64,
}

impl LimitClause {
    pub fn limit(&self) -> Option<u64> {
        self.limit
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }
}

/// `INSERT INTO` target with its column list, kept in step with VALUES.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct InsertClause {
    pub(crate) table: Option<String>,
    pub(crate) columns: Vec<String>,
}

impl InsertClause {
    pub fn table(&self) -> Option<&str> {
        self.table.as_deref()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }
}

/// Target table of UPDATE and DELETE.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TableClause {
    pub(crate) table: Option<String>,
}

impl TableClause {
    pub fn table(&self) -> Option<&str> {
        self.table.as_deref()
    }

    fn quoted_table(&self) -> String {
        quote_identifier(self.table.as_deref().unwrap_or_default())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub column: String,
    pub param: Param,
}

/// Column/value pairs of INSERT ... VALUES and UPDATE ... SET.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AssignmentsClause {
    pub(crate) assignments: Vec<Assignment>,
}

impl AssignmentsClause {
    pub fn assignments(&self) -> &[Assignment] {
        &self.assignments
    }

    /// Sets `column`, replacing an earlier value in place.
    pub(crate) fn assign(&mut self, column: String, param: Param) {
        match self.assignments.iter_mut().find(|a| a.column == column) {
            Some(existing) => existing.param = param,
            None => self.assignments.push(Assignment { column, param }),
        }
    }
}

/// Resolves a column for ORDER BY / GROUP BY.
///
/// Qualified references are validated against the schema; bare names (such
/// as select aliases) are only checked to be identifiers.
pub(crate) fn sort_column(schema: &dyn SchemaLookup, reference: &str) -> Result<String> {
    let reference = reference.trim();
    if reference.contains('.') {
        let path = ColumnPath::parse(schema, reference)?;
        if path.is_wildcard() {
            return Err(QueryError::InvalidReference(format!(
                "wildcard `{reference}` cannot be used for sorting or grouping"
            )));
        }
        return Ok(path.to_string());
    }
    if !IDENTIFIER_RE.is_match(reference) {
        return Err(QueryError::InvalidReference(reference.to_string()));
    }
    Ok(quote_identifier(reference))
}

/// Validates a bare identifier, as used for table names.
pub(crate) fn check_identifier(name: &str) -> Result<()> {
    if IDENTIFIER_RE.is_match(name) {
        Ok(())
    } else {
        Err(QueryError::InvalidReference(name.to_string()))
    }
}
