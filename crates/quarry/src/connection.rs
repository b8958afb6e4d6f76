//! The execution boundary.
//!
//! Queries never talk to a driver directly. They encode their parameters
//! into [`Binding`]s and hand SQL text plus bindings to a [`Connection`];
//! result rows come back as driver values and are decoded into [`Row`]s
//! using the query's conversion types.

use crate::{
    error::Result,
    types::{DriverValue, Type, Value},
};

/// An encoded parameter handed to the connection.
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub value: DriverValue,
    pub ty: Type,
}

/// A result row as returned by the driver, columns in result order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawRow {
    pub columns: Vec<(String, DriverValue)>,
}

/// A database session able to run parameterised statements.
///
/// Array-typed bindings carry a [`DriverValue::List`]; implementations must
/// expand them to match the single `?` they were rendered as.
pub trait Connection {
    /// Runs a statement and returns the number of affected rows.
    fn execute(&self, sql: &str, bindings: &[Binding]) -> Result<u64>;

    /// Runs a query and returns every result row.
    fn query(&self, sql: &str, bindings: &[Binding]) -> Result<Vec<RawRow>>;
}

/// A decoded result row.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    columns: Vec<(String, Value)>,
}

impl Row {
    pub fn new(columns: Vec<(String, Value)>) -> Self {
        Self { columns }
    }

    /// Value of the first column named `name`.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.columns
            .iter()
            .find(|(column, _)| column == name)
            .map(|(_, value)| value)
    }

    pub fn get_index(&self, index: usize) -> Option<&Value> {
        self.columns.get(index).map(|(_, value)| value)
    }

    pub fn columns(&self) -> &[(String, Value)] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn into_values(self) -> Vec<Value> {
        self.columns.into_iter().map(|(_, value)| value).collect()
    }
}

/// Decodes `raw` with the given output types.
///
/// Columns without a conversion type keep the driver's natural shape.
pub fn decode_row(raw: RawRow, types: &[(String, Type)]) -> Result<Row> {
    let columns = raw
        .columns
        .into_iter()
        .map(|(name, value)| {
            let decoded = match types.iter().find(|(output, _)| *output == name) {
                Some((_, ty)) => ty.from_database(value)?,
                None => value.into_natural(),
            };
            Ok((name, decoded))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Row { columns })
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::error::QueryError;

    #[test]
    fn test_decode_row_uses_conversion_types() {
        let raw = RawRow {
            columns: vec![
                ("id".into(), DriverValue::Integer(7)),
                ("posted_at".into(), DriverValue::Text("2024-03-01 10:30:00".into())),
                ("extra".into(), DriverValue::Real(1.5)),
            ],
        };
        let types = vec![
            ("id".to_string(), Type::Integer),
            ("posted_at".to_string(), Type::DateTime),
        ];

        let row = decode_row(raw, &types).unwrap();
        let posted_at = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(10, 30, 0)
            .unwrap();

        assert_eq!(row.get("id"), Some(&Value::Int(7)));
        assert_eq!(row.get("posted_at"), Some(&Value::DateTime(posted_at)));
        assert_eq!(row.get("extra"), Some(&Value::Float(1.5)));
        assert_eq!(row.get_index(0), Some(&Value::Int(7)));
        assert_eq!(row.get("missing"), None);
        assert_eq!(row.len(), 3);
    }

    #[test]
    fn test_decode_row_reports_conversion_errors() {
        let raw = RawRow {
            columns: vec![("posted_at".into(), DriverValue::Text("yesterday".into()))],
        };
        let types = vec![("posted_at".to_string(), Type::DateTime)];

        assert!(matches!(
            decode_row(raw, &types),
            Err(QueryError::Conversion { .. })
        ));
    }
}
