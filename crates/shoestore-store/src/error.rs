//! Error types for the mock store.

use shoestore_core::db::DatabaseError;

/// PostgREST code for a single-row request that did not match exactly one row.
pub const SINGLE_ROW_CODE: &str = "PGRST116";

/// Errors returned by table reads/writes and query evaluation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A `single()` query matched zero rows. Expected and recoverable.
    #[error("No rows found in {table}")]
    NotFound { table: String },

    #[error("Expected a single row from {table}, found {count}")]
    MultipleRows { table: String, count: usize },

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid select specification: {0}")]
    InvalidSelect(String),

    #[error("Invalid row: {0}")]
    InvalidRow(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        Self::Database(DatabaseError::from(e))
    }
}

impl StoreError {
    /// Whether this is the "no rows" marker of a single-row query.
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// PostgREST-style error code.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } | Self::MultipleRows { .. } => SINGLE_ROW_CODE,
            Self::Database(_) => "DB000",
            Self::Json(_) => "JSON00",
            Self::InvalidSelect(_) => "PGRST100",
            Self::InvalidRow(_) => "PGRST102",
        }
    }
}
