//! Local mock store for shoestore.
//!
//! Emulates the remote relational backend entirely client-side:
//! - [`TableStore`]: durable per-table persistence in a SQLite key-value table,
//!   seeded from fixtures on first access
//! - [`QueryBuilder`]: chainable filter / order / limit / single queries and
//!   insert / update / upsert / delete mutations, evaluated when awaited
//! - [`join`]: embedding of related rows requested through a select spec

mod db;
mod error;
pub mod fixtures;
pub mod join;
pub mod query;
pub mod select;
mod table;
pub mod value;

#[cfg(test)]
mod tests;

pub use db::StoreDatabase;
pub use error::StoreError;
pub use fixtures::Fixtures;
pub use query::{MockDatabase, QueryBuilder, QueryData, QueryResult};
pub use select::SelectSpec;
pub use table::{SESSION_KEY, TableStore, display_name_from_email};

/// A table row: column name to JSON value.
pub type Row = serde_json::Map<String, serde_json::Value>;
