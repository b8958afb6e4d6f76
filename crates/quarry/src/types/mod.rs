//! The type system shared by the schema, the builders and the connection.
//!
//! A [`Type`] decides how a host [`Value`] is encoded into a [`DriverValue`]
//! for binding, and how a driver value read from a result column is decoded
//! back. Array markers (`int[]`, `string[]`) exist only for membership
//! parameters, where a whole list is bound to a single placeholder.

pub mod registry;
pub mod value;

use std::{fmt, sync::Arc};

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

pub use registry::TypeRegistry;
pub use value::{DriverValue, Value};

use crate::{
    error::{QueryError, Result},
    schema::SchemaLookup,
};

pub(crate) const DATE_FORMAT: &str = "%Y-%m-%d";
pub(crate) const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const DATETIME_INPUT_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

/// An enumeration type: a string restricted to a fixed set of values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumType {
    pub name: String,
    pub values: Vec<String>,
}

impl EnumType {
    pub fn new<I, S>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    fn check(&self, value: &str) -> Result<()> {
        if self.values.iter().any(|v| v == value) {
            Ok(())
        } else {
            Err(QueryError::conversion(
                &self.name,
                format!("`{value}` is not one of [{}]", self.values.join(", ")),
            ))
        }
    }
}

/// A tag governing how values cross the host/database boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    Integer,
    Boolean,
    Float,
    String,
    Text,
    Date,
    DateTime,
    Json,
    Enum(Arc<EnumType>),
    IntArray,
    StringArray,
}

impl Type {
    /// Canonical type name, as accepted by [`TypeRegistry::type_by_name`].
    pub fn name(&self) -> &str {
        match self {
            Type::Integer => "integer",
            Type::Boolean => "boolean",
            Type::Float => "float",
            Type::String => "string",
            Type::Text => "text",
            Type::Date => "date",
            Type::DateTime => "datetime",
            Type::Json => "json",
            Type::Enum(e) => &e.name,
            Type::IntArray => "int[]",
            Type::StringArray => "string[]",
        }
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Type::IntArray | Type::StringArray)
    }

    /// Whether values of this type are stored as integers.
    pub fn is_integer_family(&self) -> bool {
        matches!(self, Type::Integer | Type::Boolean | Type::IntArray)
    }

    /// The array marker binding a list of values of this type.
    pub fn array_variant(&self) -> Type {
        if self.is_integer_family() {
            Type::IntArray
        } else {
            Type::StringArray
        }
    }

    /// Scalar type of the elements of an array marker.
    pub fn element_type(&self) -> Option<Type> {
        match self {
            Type::IntArray => Some(Type::Integer),
            Type::StringArray => Some(Type::String),
            _ => None,
        }
    }

    /// Encodes a host value for binding.
    pub fn to_database(&self, value: &Value) -> Result<DriverValue> {
        if value.is_null() {
            return Ok(DriverValue::Null);
        }

        match self {
            Type::Integer => match value {
                Value::Int(i) => Ok(DriverValue::Integer(*i)),
                Value::Bool(b) => Ok(DriverValue::Integer(*b as i64)),
                Value::Float(f) if f.fract() == 0.0 => Ok(DriverValue::Integer(*f as i64)),
                Value::String(s) => s
                    .trim()
                    .parse()
                    .map(DriverValue::Integer)
                    .map_err(|_| QueryError::conversion(self.name(), format!("`{s}` is not an integer"))),
                other => Err(self.unsupported(other)),
            },
            Type::Boolean => match value {
                Value::Bool(b) => Ok(DriverValue::Integer(*b as i64)),
                Value::Int(i) => Ok(DriverValue::Integer((*i != 0) as i64)),
                Value::String(s) => parse_bool(s)
                    .map(|b| DriverValue::Integer(b as i64))
                    .ok_or_else(|| QueryError::conversion(self.name(), format!("`{s}` is not a boolean"))),
                other => Err(self.unsupported(other)),
            },
            Type::Float => match value {
                Value::Float(f) => Ok(DriverValue::Real(*f)),
                Value::Int(i) => Ok(DriverValue::Real(*i as f64)),
                Value::String(s) => s
                    .trim()
                    .parse()
                    .map(DriverValue::Real)
                    .map_err(|_| QueryError::conversion(self.name(), format!("`{s}` is not a number"))),
                other => Err(self.unsupported(other)),
            },
            Type::String | Type::Text => match value {
                Value::String(s) => Ok(DriverValue::Text(s.clone())),
                Value::Int(i) => Ok(DriverValue::Text(i.to_string())),
                Value::Float(f) => Ok(DriverValue::Text(f.to_string())),
                Value::Bytes(b) => Ok(DriverValue::Blob(b.clone())),
                Value::Date(d) => Ok(DriverValue::Text(d.format(DATE_FORMAT).to_string())),
                Value::DateTime(dt) => Ok(DriverValue::Text(dt.format(DATETIME_FORMAT).to_string())),
                other => Err(self.unsupported(other)),
            },
            Type::Date => {
                let date = match value {
                    Value::Date(d) => *d,
                    Value::DateTime(dt) => dt.date(),
                    Value::String(s) => parse_date(s)
                        .ok_or_else(|| QueryError::conversion(self.name(), format!("`{s}` is not a date")))?,
                    other => return Err(self.unsupported(other)),
                };
                Ok(DriverValue::Text(date.format(DATE_FORMAT).to_string()))
            }
            Type::DateTime => {
                let datetime = match value {
                    Value::DateTime(dt) => *dt,
                    Value::Date(d) => d.and_time(NaiveTime::MIN),
                    Value::String(s) => parse_datetime(s).ok_or_else(|| {
                        QueryError::conversion(self.name(), format!("`{s}` is not a datetime"))
                    })?,
                    other => return Err(self.unsupported(other)),
                };
                Ok(DriverValue::Text(datetime.format(DATETIME_FORMAT).to_string()))
            }
            Type::Json => serde_json::to_string(&value.to_json())
                .map(DriverValue::Text)
                .map_err(|e| QueryError::conversion(self.name(), e.to_string())),
            Type::Enum(e) => match value {
                Value::String(s) => {
                    e.check(s)?;
                    Ok(DriverValue::Text(s.clone()))
                }
                other => Err(self.unsupported(other)),
            },
            Type::IntArray | Type::StringArray => {
                let items = value.as_list().ok_or_else(|| self.unsupported(value))?;
                let element = self.element_type().unwrap_or(Type::String);
                items
                    .iter()
                    .map(|item| element.to_database(item))
                    .collect::<Result<Vec<_>>>()
                    .map(DriverValue::List)
            }
        }
    }

    /// Decodes a driver value read from a result column.
    pub fn from_database(&self, value: DriverValue) -> Result<Value> {
        if value == DriverValue::Null {
            return Ok(Value::Null);
        }

        match (self, value) {
            (Type::Integer, DriverValue::Integer(i)) => Ok(Value::Int(i)),
            (Type::Integer, DriverValue::Real(f)) if f.fract() == 0.0 => Ok(Value::Int(f as i64)),
            (Type::Integer, DriverValue::Text(s)) => s
                .trim()
                .parse()
                .map(Value::Int)
                .map_err(|_| QueryError::conversion(self.name(), format!("`{s}` is not an integer"))),

            (Type::Boolean, DriverValue::Integer(i)) => Ok(Value::Bool(i != 0)),
            (Type::Boolean, DriverValue::Text(s)) => parse_bool(&s)
                .map(Value::Bool)
                .ok_or_else(|| QueryError::conversion(self.name(), format!("`{s}` is not a boolean"))),

            (Type::Float, DriverValue::Real(f)) => Ok(Value::Float(f)),
            (Type::Float, DriverValue::Integer(i)) => Ok(Value::Float(i as f64)),
            (Type::Float, DriverValue::Text(s)) => s
                .trim()
                .parse()
                .map(Value::Float)
                .map_err(|_| QueryError::conversion(self.name(), format!("`{s}` is not a number"))),

            (Type::String | Type::Text, DriverValue::Text(s)) => Ok(Value::String(s)),
            (Type::String | Type::Text, DriverValue::Integer(i)) => Ok(Value::String(i.to_string())),
            (Type::String | Type::Text, DriverValue::Real(f)) => Ok(Value::String(f.to_string())),
            (Type::String | Type::Text, DriverValue::Blob(b)) => String::from_utf8(b)
                .map(Value::String)
                .map_err(|e| QueryError::conversion(self.name(), e.to_string())),

            (Type::Date, DriverValue::Text(s)) => parse_date(&s)
                .map(Value::Date)
                .ok_or_else(|| QueryError::conversion(self.name(), format!("`{s}` is not a date"))),

            (Type::DateTime, DriverValue::Text(s)) => parse_datetime(&s)
                .map(Value::DateTime)
                .ok_or_else(|| QueryError::conversion(self.name(), format!("`{s}` is not a datetime"))),
            (Type::DateTime, DriverValue::Integer(ts)) => chrono::DateTime::from_timestamp(ts, 0)
                .map(|dt| Value::DateTime(dt.naive_utc()))
                .ok_or_else(|| QueryError::conversion(self.name(), format!("timestamp {ts} out of range"))),

            (Type::Json, DriverValue::Text(s)) => serde_json::from_str(&s)
                .map(Value::Json)
                .map_err(|e| QueryError::conversion(self.name(), e.to_string())),

            (Type::Enum(e), DriverValue::Text(s)) => {
                e.check(&s)?;
                Ok(Value::String(s))
            }

            (Type::IntArray | Type::StringArray, DriverValue::List(items)) => {
                let element = self.element_type().unwrap_or(Type::String);
                items
                    .into_iter()
                    .map(|item| element.from_database(item))
                    .collect::<Result<Vec<_>>>()
                    .map(Value::List)
            }

            (_, other) => Err(QueryError::conversion(
                self.name(),
                format!("cannot decode a {} column", other.kind()),
            )),
        }
    }

    fn unsupported(&self, value: &Value) -> QueryError {
        QueryError::conversion(self.name(), format!("cannot encode a {} value", value.kind()))
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "t" | "yes" => Some(true),
        "0" | "false" | "f" | "no" => Some(false),
        _ => None,
    }
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, DATE_FORMAT)
        .ok()
        .or_else(|| parse_datetime(s).map(|dt| dt.date()))
}

fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    DATETIME_INPUT_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(s, DATE_FORMAT)
                .ok()
                .map(|d| d.and_time(NaiveTime::MIN))
        })
}

/// Either a type name or an already resolved [`Type`].
///
/// Builder methods accept both; names are resolved once, against the
/// schema's type registry, when the builder call is made.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeRef {
    Named(String),
    Resolved(Type),
}

impl TypeRef {
    pub fn resolve(&self, schema: &dyn SchemaLookup) -> Result<Type> {
        match self {
            TypeRef::Named(name) => schema.type_by_name(name),
            TypeRef::Resolved(ty) => Ok(ty.clone()),
        }
    }
}

impl From<&str> for TypeRef {
    fn from(name: &str) -> Self {
        TypeRef::Named(name.to_string())
    }
}

impl From<String> for TypeRef {
    fn from(name: String) -> Self {
        TypeRef::Named(name)
    }
}

impl From<Type> for TypeRef {
    fn from(ty: Type) -> Self {
        TypeRef::Resolved(ty)
    }
}

impl From<&Type> for TypeRef {
    fn from(ty: &Type) -> Self {
        TypeRef::Resolved(ty.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_round_trip_through_text() {
        assert_eq!(
            Type::Integer.to_database(&Value::from("42")).unwrap(),
            DriverValue::Integer(42)
        );
        assert_eq!(
            Type::Integer.from_database(DriverValue::Text("7".into())).unwrap(),
            Value::Int(7)
        );
        assert!(Type::Integer.to_database(&Value::from("abc")).is_err());
    }

    #[test]
    fn test_datetime_encoding() {
        let dt = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(12, 30, 0)
            .unwrap();

        assert_eq!(
            Type::DateTime.to_database(&Value::from(dt)).unwrap(),
            DriverValue::Text("2024-03-01 12:30:00".into())
        );
        assert_eq!(
            Type::DateTime
                .from_database(DriverValue::Text("2024-03-01T12:30:00".into()))
                .unwrap(),
            Value::DateTime(dt)
        );
        assert_eq!(
            Type::Date.from_database(DriverValue::Text("2024-03-01 12:30:00".into())).unwrap(),
            Value::Date(dt.date())
        );
    }

    #[test]
    fn test_boolean_stored_as_integer() {
        assert_eq!(
            Type::Boolean.to_database(&Value::from(true)).unwrap(),
            DriverValue::Integer(1)
        );
        assert_eq!(
            Type::Boolean.from_database(DriverValue::Integer(0)).unwrap(),
            Value::Bool(false)
        );
    }

    #[test]
    fn test_enum_rejects_unknown_values() {
        let status = Type::Enum(Arc::new(EnumType::new("post_status", ["draft", "published"])));

        assert_eq!(
            status.to_database(&Value::from("draft")).unwrap(),
            DriverValue::Text("draft".into())
        );
        assert!(matches!(
            status.to_database(&Value::from("archived")),
            Err(QueryError::Conversion { .. })
        ));
        assert!(status.from_database(DriverValue::Text("deleted".into())).is_err());
    }

    #[test]
    fn test_arrays_encode_elementwise() {
        assert_eq!(
            Type::IntArray.to_database(&Value::from(vec![2, 3, 4])).unwrap(),
            DriverValue::List(vec![
                DriverValue::Integer(2),
                DriverValue::Integer(3),
                DriverValue::Integer(4)
            ])
        );
        assert!(Type::IntArray.to_database(&Value::from(2)).is_err());
        assert_eq!(Type::Integer.array_variant(), Type::IntArray);
        assert_eq!(Type::DateTime.array_variant(), Type::StringArray);
    }

    #[test]
    fn test_json_encoding() {
        let doc = serde_json::json!({ "tags": ["a", "b"] });
        let encoded = Type::Json.to_database(&Value::from(doc.clone())).unwrap();
        assert_eq!(encoded, DriverValue::Text(r#"{"tags":["a","b"]}"#.into()));
        assert_eq!(Type::Json.from_database(encoded).unwrap(), Value::Json(doc));
    }

    #[test]
    fn test_null_passes_through() {
        assert_eq!(Type::DateTime.to_database(&Value::Null).unwrap(), DriverValue::Null);
        assert_eq!(Type::Json.from_database(DriverValue::Null).unwrap(), Value::Null);
    }
}
