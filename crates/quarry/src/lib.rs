pub mod condition;
pub mod connection;
pub mod error;
pub mod expr;
pub mod query;
pub mod schema;
pub mod traits;
pub mod types;

pub use condition::{ConditionGroup, ConditionNode, ConditionsBuilder};
pub use connection::{decode_row, Binding, Connection, RawRow, Row};
pub use error::{QueryError, Result};
pub use expr::{placeholder_offsets, quote_identifier, raw, ColumnPath, ColumnRef, Fragment, Param, Raw};
pub use query::*;
pub use schema::{SchemaConfig, SchemaLookup, StaticSchema};
pub use traits::Expression;
pub use types::{DriverValue, EnumType, Type, TypeRef, TypeRegistry, Value};
