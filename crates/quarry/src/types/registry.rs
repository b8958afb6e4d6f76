//! Name-to-type resolution.

use std::{collections::HashMap, sync::Arc};

use super::{EnumType, Type};
use crate::error::{QueryError, Result};

/// Resolves type names to [`Type`]s.
///
/// Built-in names are matched case-insensitively. Enum types are registered
/// per schema and matched exactly.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    custom: HashMap<String, Type>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn builtin(name: &str) -> Option<Type> {
        let ty = match name.trim().to_ascii_lowercase().as_str() {
            "integer" | "int" | "bigint" | "smallint" => Type::Integer,
            "boolean" | "bool" => Type::Boolean,
            "float" | "double" | "real" | "decimal" => Type::Float,
            "string" | "varchar" => Type::String,
            "text" => Type::Text,
            "date" => Type::Date,
            "datetime" | "timestamp" => Type::DateTime,
            "json" => Type::Json,
            "int[]" => Type::IntArray,
            "string[]" => Type::StringArray,
            _ => return None,
        };
        Some(ty)
    }

    /// Registers an enum type under `name`.
    ///
    /// Fails when the name shadows a built-in or an already registered type.
    pub fn register_enum<I, S>(&mut self, name: &str, values: I) -> Result<Type>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if Self::builtin(name).is_some() || self.custom.contains_key(name) {
            return Err(QueryError::Schema(format!("type `{name}` is already defined")));
        }

        let ty = Type::Enum(Arc::new(EnumType::new(name, values)));
        self.custom.insert(name.to_string(), ty.clone());
        Ok(ty)
    }

    pub fn type_by_name(&self, name: &str) -> Result<Type> {
        self.custom
            .get(name)
            .cloned()
            .or_else(|| Self::builtin(name))
            .ok_or_else(|| QueryError::UnknownType(name.to_string()))
    }
}
