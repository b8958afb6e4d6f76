//! Core traits that power the query builder.

use crate::expr::Param;

/// A unit that renders to a SQL fragment with `?` placeholders.
///
/// Implementors include:
/// - [`crate::expr::ColumnPath`]: a column, wildcard or raw reference
/// - [`crate::expr::Fragment`]: literal SQL with its bound parameters
/// - [`crate::condition::ConditionNode`]: a condition tree
///
/// When `to_sql` is called it appends bound parameters to `params` in the
/// order their placeholders appear in the returned text, so that composing
/// expressions keeps placeholders and parameters aligned.
pub trait Expression {
    /// Renders this expression and appends its bound parameters.
    fn to_sql(&self, params: &mut Vec<Param>) -> String;

    /// Renders this expression, discarding parameters.
    fn sql(&self) -> String {
        let mut params = Vec::new();
        self.to_sql(&mut params)
    }

    /// Collects only the bound parameters.
    fn params(&self) -> Vec<Param> {
        let mut params = Vec::new();
        self.to_sql(&mut params);
        params
    }
}
