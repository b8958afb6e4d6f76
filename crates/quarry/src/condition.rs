//! Condition trees for WHERE, HAVING and JOIN ... ON.
//!
//! A [`ConditionsBuilder`] accumulates predicates into a [`ConditionGroup`].
//! Nested groups are opened with closures that receive a fresh builder
//! scoped to the child group:
//!
//! ```ignore
//! query.where_(|w| {
//!     w.like("posts.title", "Foo%")?
//!         .or_where(|w| {
//!             w.equals("posts.id", 2)?;
//!             Ok(())
//!         })?;
//!     Ok(())
//! })?;
//! ```
//!
//! Rendering rules: a group with a single child renders the child bare, a
//! group with two or more children is parenthesised, and siblings are joined
//! with the group's combinator.

use std::mem;

use crate::{
    error::{QueryError, Result},
    expr::{ColumnPath, ColumnRef, Combinator, ComparisonOp, Param},
    schema::SchemaLookup,
    traits::Expression,
    types::{Type, TypeRef, Value},
};

/// Right-hand side of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Param(Param),
    Column(ColumnPath),
}

/// A node of a condition tree.
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionNode {
    Comparison {
        left: ColumnPath,
        op: ComparisonOp,
        right: Operand,
    },
    /// `column IN (?)`, with the whole list bound as one array-typed parameter.
    Membership {
        column: ColumnPath,
        values: Value,
        ty: Type,
    },
    Group(ConditionGroup),
}

impl Expression for ConditionNode {
    fn to_sql(&self, params: &mut Vec<Param>) -> String {
        match self {
            ConditionNode::Comparison { left, op, right } => {
                let left_sql = left.to_sql(params);
                match right {
                    Operand::Param(param) => {
                        params.push(param.clone());
                        format!("{} {} ?", left_sql, op)
                    }
                    Operand::Column(column) => format!("{} {} {}", left_sql, op, column.to_sql(params)),
                }
            }
            ConditionNode::Membership { column, values, ty } => {
                let column_sql = column.to_sql(params);
                params.push(Param::new(values.clone(), ty.clone()));
                format!("{} IN (?)", column_sql)
            }
            ConditionNode::Group(group) => group.to_sql(params),
        }
    }
}

/// Children joined by a single combinator.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConditionGroup {
    combinator: Combinator,
    children: Vec<ConditionNode>,
}

impl ConditionGroup {
    pub fn new(combinator: Combinator) -> Self {
        Self {
            combinator,
            children: Vec::new(),
        }
    }

    pub fn combinator(&self) -> Combinator {
        self.combinator
    }

    pub fn children(&self) -> &[ConditionNode] {
        &self.children
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Appends `node`, joined to what is already there with `combinator`.
    ///
    /// Conditions read left to right: when the combinator changes while two
    /// or more children exist, those children are folded into one group
    /// first, so `a AND b` followed by `OR c` becomes `(a AND b) OR c`.
    pub fn push(&mut self, combinator: Combinator, node: ConditionNode) {
        if self.children.len() >= 2 && combinator != self.combinator {
            let folded = ConditionGroup {
                combinator: self.combinator,
                children: mem::take(&mut self.children),
            };
            self.children.push(ConditionNode::Group(folded));
        }
        if self.children.len() <= 1 {
            self.combinator = combinator;
        }
        self.children.push(node);
    }

    /// Renders without outer parentheses, as used directly after `WHERE`.
    pub fn to_sql_unwrapped(&self, params: &mut Vec<Param>) -> String {
        let separator = format!(" {} ", self.combinator);
        self.children
            .iter()
            .map(|child| child.to_sql(params))
            .collect::<Vec<_>>()
            .join(&separator)
    }
}

impl Expression for ConditionGroup {
    fn to_sql(&self, params: &mut Vec<Param>) -> String {
        let sql = self.to_sql_unwrapped(params);
        if self.children.len() > 1 {
            format!("({})", sql)
        } else {
            sql
        }
    }
}

/// Builds a [`ConditionGroup`], validating columns and resolving parameter
/// types against the schema as it goes.
pub struct ConditionsBuilder<'a> {
    schema: &'a dyn SchemaLookup,
    group: ConditionGroup,
}

impl<'a> ConditionsBuilder<'a> {
    pub fn new(schema: &'a dyn SchemaLookup) -> Self {
        Self {
            schema,
            group: ConditionGroup::default(),
        }
    }

    pub fn into_group(self) -> ConditionGroup {
        self.group
    }

    pub fn is_empty(&self) -> bool {
        self.group.is_empty()
    }

    fn operand(&self, column: ColumnRef) -> Result<ColumnPath> {
        let path = column.resolve(self.schema)?;
        if path.is_wildcard() {
            return Err(QueryError::InvalidReference(format!(
                "wildcard `{path}` cannot be used in a condition"
            )));
        }
        Ok(path)
    }

    fn resolve_type(&self, ty: Option<TypeRef>) -> Result<Option<Type>> {
        ty.map(|ty| ty.resolve(self.schema)).transpose()
    }

    /// Appends `column op ?`, typed explicitly or by the column's schema type.
    pub fn compare(
        &mut self,
        column: impl Into<ColumnRef>,
        op: ComparisonOp,
        value: impl Into<Value>,
        ty: Option<TypeRef>,
    ) -> Result<&mut Self> {
        let left = self.operand(column.into())?;
        let ty = left.require_type(self.resolve_type(ty)?)?;
        self.group.push(
            Combinator::And,
            ConditionNode::Comparison {
                left,
                op,
                right: Operand::Param(Param::new(value, ty)),
            },
        );
        Ok(self)
    }

    pub fn equals(&mut self, column: impl Into<ColumnRef>, value: impl Into<Value>) -> Result<&mut Self> {
        self.compare(column, ComparisonOp::Equals, value, None)
    }

    pub fn equals_typed(
        &mut self,
        column: impl Into<ColumnRef>,
        value: impl Into<Value>,
        ty: impl Into<TypeRef>,
    ) -> Result<&mut Self> {
        self.compare(column, ComparisonOp::Equals, value, Some(ty.into()))
    }

    pub fn not_equals(&mut self, column: impl Into<ColumnRef>, value: impl Into<Value>) -> Result<&mut Self> {
        self.compare(column, ComparisonOp::NotEquals, value, None)
    }

    pub fn not_equals_typed(
        &mut self,
        column: impl Into<ColumnRef>,
        value: impl Into<Value>,
        ty: impl Into<TypeRef>,
    ) -> Result<&mut Self> {
        self.compare(column, ComparisonOp::NotEquals, value, Some(ty.into()))
    }

    pub fn greater_than(&mut self, column: impl Into<ColumnRef>, value: impl Into<Value>) -> Result<&mut Self> {
        self.compare(column, ComparisonOp::GreaterThan, value, None)
    }

    pub fn greater_than_typed(
        &mut self,
        column: impl Into<ColumnRef>,
        value: impl Into<Value>,
        ty: impl Into<TypeRef>,
    ) -> Result<&mut Self> {
        self.compare(column, ComparisonOp::GreaterThan, value, Some(ty.into()))
    }

    pub fn smaller_than(&mut self, column: impl Into<ColumnRef>, value: impl Into<Value>) -> Result<&mut Self> {
        self.compare(column, ComparisonOp::SmallerThan, value, None)
    }

    pub fn smaller_than_typed(
        &mut self,
        column: impl Into<ColumnRef>,
        value: impl Into<Value>,
        ty: impl Into<TypeRef>,
    ) -> Result<&mut Self> {
        self.compare(column, ComparisonOp::SmallerThan, value, Some(ty.into()))
    }

    pub fn greater_than_or_equals(
        &mut self,
        column: impl Into<ColumnRef>,
        value: impl Into<Value>,
    ) -> Result<&mut Self> {
        self.compare(column, ComparisonOp::GreaterThanOrEquals, value, None)
    }

    pub fn greater_than_or_equals_typed(
        &mut self,
        column: impl Into<ColumnRef>,
        value: impl Into<Value>,
        ty: impl Into<TypeRef>,
    ) -> Result<&mut Self> {
        self.compare(column, ComparisonOp::GreaterThanOrEquals, value, Some(ty.into()))
    }

    pub fn smaller_than_or_equals(
        &mut self,
        column: impl Into<ColumnRef>,
        value: impl Into<Value>,
    ) -> Result<&mut Self> {
        self.compare(column, ComparisonOp::SmallerThanOrEquals, value, None)
    }

    pub fn smaller_than_or_equals_typed(
        &mut self,
        column: impl Into<ColumnRef>,
        value: impl Into<Value>,
        ty: impl Into<TypeRef>,
    ) -> Result<&mut Self> {
        self.compare(column, ComparisonOp::SmallerThanOrEquals, value, Some(ty.into()))
    }

    pub fn like(&mut self, column: impl Into<ColumnRef>, pattern: impl Into<Value>) -> Result<&mut Self> {
        self.compare(column, ComparisonOp::Like, pattern, None)
    }

    pub fn like_typed(
        &mut self,
        column: impl Into<ColumnRef>,
        pattern: impl Into<Value>,
        ty: impl Into<TypeRef>,
    ) -> Result<&mut Self> {
        self.compare(column, ComparisonOp::Like, pattern, Some(ty.into()))
    }

    /// Appends `left = right` between two columns, binding nothing.
    pub fn equals_column(
        &mut self,
        left: impl Into<ColumnRef>,
        right: impl Into<ColumnRef>,
    ) -> Result<&mut Self> {
        let left = self.operand(left.into())?;
        let right = self.operand(right.into())?;
        self.group.push(
            Combinator::And,
            ConditionNode::Comparison {
                left,
                op: ComparisonOp::Equals,
                right: Operand::Column(right),
            },
        );
        Ok(self)
    }

    /// Appends `column IN (?)`, binding `values` as one array parameter.
    pub fn in_(&mut self, column: impl Into<ColumnRef>, values: impl Into<Value>) -> Result<&mut Self> {
        self.membership(column.into(), values.into(), None)
    }

    pub fn in_typed(
        &mut self,
        column: impl Into<ColumnRef>,
        values: impl Into<Value>,
        ty: impl Into<TypeRef>,
    ) -> Result<&mut Self> {
        self.membership(column.into(), values.into(), Some(ty.into()))
    }

    fn membership(&mut self, column: ColumnRef, values: Value, ty: Option<TypeRef>) -> Result<&mut Self> {
        let column = self.operand(column)?;
        let values = match values {
            Value::List(items) => Value::List(items),
            scalar => Value::List(vec![scalar]),
        };

        let ty = match self.resolve_type(ty)? {
            Some(ty) if ty.is_array() => ty,
            Some(ty) => ty.array_variant(),
            None => match column.ty() {
                // Array markers drop the allowed values.
                Some(enum_ty @ Type::Enum(_)) => {
                    for item in values.as_list().unwrap_or_default() {
                        enum_ty.to_database(item)?;
                    }
                    enum_ty.array_variant()
                }
                _ => match infer_array_type(&values) {
                    Some(ty) => ty,
                    None => column.require_type(None)?.array_variant(),
                },
            },
        };

        self.group
            .push(Combinator::And, ConditionNode::Membership { column, values, ty });
        Ok(self)
    }

    /// Opens a nested group joined to its siblings with `combinator`.
    ///
    /// The closure's conditions always form exactly one group; a closure that
    /// adds nothing leaves the tree untouched.
    pub fn group<F>(&mut self, combinator: Combinator, f: F) -> Result<&mut Self>
    where
        F: FnOnce(&mut ConditionsBuilder<'a>) -> Result<()>,
    {
        let mut child = ConditionsBuilder::new(self.schema);
        f(&mut child)?;
        if !child.is_empty() {
            self.group
                .push(combinator, ConditionNode::Group(child.into_group()));
        }
        Ok(self)
    }

    pub fn and_where<F>(&mut self, f: F) -> Result<&mut Self>
    where
        F: FnOnce(&mut ConditionsBuilder<'a>) -> Result<()>,
    {
        self.group(Combinator::And, f)
    }

    pub fn or_where<F>(&mut self, f: F) -> Result<&mut Self>
    where
        F: FnOnce(&mut ConditionsBuilder<'a>) -> Result<()>,
    {
        self.group(Combinator::Or, f)
    }

    pub fn and_group<F>(&mut self, f: F) -> Result<&mut Self>
    where
        F: FnOnce(&mut ConditionsBuilder<'a>) -> Result<()>,
    {
        self.group(Combinator::And, f)
    }

    pub fn or_group<F>(&mut self, f: F) -> Result<&mut Self>
    where
        F: FnOnce(&mut ConditionsBuilder<'a>) -> Result<()>,
    {
        self.group(Combinator::Or, f)
    }
}

/// Array marker matching the elements of `values`, when they agree.
fn infer_array_type(values: &Value) -> Option<Type> {
    let items = values.as_list()?;
    if items.is_empty() {
        return None;
    }
    if items.iter().all(|v| matches!(v, Value::Int(_))) {
        Some(Type::IntArray)
    } else if items.iter().all(|v| matches!(v, Value::String(_))) {
        Some(Type::StringArray)
    } else {
        None
    }
}
