//! Expression types for building SQL.
//!
//! This module contains the building blocks every clause is made of: column
//! references, literal fragments and the comparison operators used by the
//! condition tree.

pub mod column;
pub mod ops;

pub use column::{quote_identifier, raw, ColumnPath, ColumnRef, Raw};
pub use ops::{Combinator, ComparisonOp};

use crate::{
    error::{QueryError, Result},
    traits::Expression,
    types::{Type, Value},
};

/// A bound parameter: the host value and the type it is encoded with.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub value: Value,
    pub ty: Type,
}

impl Param {
    pub fn new(value: impl Into<Value>, ty: Type) -> Self {
        Self {
            value: value.into(),
            ty,
        }
    }
}

/// Literal SQL text together with the parameters its placeholders bind.
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    sql: String,
    params: Vec<Param>,
}

impl Fragment {
    /// Creates a fragment, checking that every `?` has exactly one parameter.
    pub fn new(sql: impl Into<String>, params: Vec<Param>) -> Result<Self> {
        let sql = sql.into();
        let expected = placeholder_offsets(&sql).len();
        if expected != params.len() {
            return Err(QueryError::PlaceholderMismatch {
                expected,
                found: params.len(),
            });
        }
        Ok(Self { sql, params })
    }

    /// A fragment without placeholders.
    pub fn sql_only(sql: impl Into<String>) -> Result<Self> {
        Self::new(sql, Vec::new())
    }
}

impl Expression for Fragment {
    fn to_sql(&self, params: &mut Vec<Param>) -> String {
        params.extend(self.params.iter().cloned());
        self.sql.clone()
    }
}

/// Byte offsets of the `?` placeholders in `sql`.
///
/// Question marks inside quoted strings or quoted identifiers are not
/// placeholders.
pub fn placeholder_offsets(sql: &str) -> Vec<usize> {
    let mut offsets = Vec::new();
    let mut quote: Option<char> = None;

    for (i, c) in sql.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '\'' | '"' | '`' => quote = Some(c),
                '?' => offsets.push(i),
                _ => {}
            },
        }
    }

    offsets
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_offsets_skip_quotes() {
        assert_eq!(placeholder_offsets("a = ? AND b = ?"), vec![4, 14]);
        assert_eq!(placeholder_offsets("a = '?' AND `b?` = ?"), vec![19]);
        assert!(placeholder_offsets("SELECT 1").is_empty());
    }

    #[test]
    fn test_fragment_checks_parameter_count() {
        let ok = Fragment::new("LENGTH(?) > 3", vec![Param::new("abc", Type::String)]).unwrap();
        let mut params = Vec::new();
        assert_eq!(ok.to_sql(&mut params), "LENGTH(?) > 3");
        assert_eq!(params, vec![Param::new("abc", Type::String)]);

        assert_eq!(
            Fragment::new("a = ? OR b = ?", vec![Param::new(1, Type::Integer)]),
            Err(QueryError::PlaceholderMismatch {
                expected: 2,
                found: 1
            })
        );
    }
}
