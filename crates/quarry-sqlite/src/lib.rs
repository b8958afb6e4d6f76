//! SQLite adapter for quarry.
//!
//! [`SqliteConnection`] implements [`quarry::Connection`] on top of rusqlite,
//! expanding array-typed bindings into one placeholder per element, and can
//! build a [`quarry::StaticSchema`] from an existing database.

pub mod config;
pub mod connection;
pub mod error;
pub mod schema;

pub use config::SqliteConfig;
pub use connection::{expand_bindings, SqliteConnection};
pub use error::{Result, SqliteError};
pub use schema::declared_type;
