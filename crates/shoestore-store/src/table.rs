//! Durable per-table persistence.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::Row;
use crate::db::StoreDatabase;
use crate::error::StoreError;
use crate::fixtures::Fixtures;

/// Key prefix of table records.
pub const TABLE_KEY_PREFIX: &str = "mock_db_";

/// Key of the persisted auth session record.
pub const SESSION_KEY: &str = "mock_session";

const PROFILES_TABLE: &str = "profiles";

/// Table-addressed persistence over the key-value database.
///
/// Reads always deserialize from storage, so callers get fresh copies and
/// can only change stored state through [`TableStore::write`]. Mutating
/// callers serialize through [`TableStore::lock`].
#[derive(Clone)]
pub struct TableStore {
    db: StoreDatabase,
    fixtures: Arc<Fixtures>,
    locks: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

impl TableStore {
    pub fn new(db: StoreDatabase, fixtures: Fixtures) -> Self {
        Self {
            db,
            fixtures: Arc::new(fixtures),
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// In-memory store seeded with `fixtures` (for tests and demos).
    pub async fn in_memory(fixtures: Fixtures) -> Result<Self, StoreError> {
        let db = StoreDatabase::open_in_memory().await?;
        Ok(Self::new(db, fixtures))
    }

    /// Underlying key-value database (shared with the session record).
    pub const fn database(&self) -> &StoreDatabase {
        &self.db
    }

    /// Read every row of `table`, seeding it on first access.
    ///
    /// Seeding and profile repair write back under the table lock, so they
    /// cannot overwrite a concurrent mutation.
    pub async fn read(&self, table: &str) -> Result<Vec<Row>, StoreError> {
        if let Some(rows) = self.db.get_json::<Vec<Row>>(&table_key(table)).await?
            && (table != PROFILES_TABLE || !rows.iter().any(lacks_full_name))
        {
            return Ok(rows);
        }
        let guard = self.lock(table).await;
        self.read_locked(table, &guard).await
    }

    /// [`TableStore::read`] for a caller already holding the table lock.
    pub async fn read_locked(
        &self,
        table: &str,
        _guard: &OwnedMutexGuard<()>,
    ) -> Result<Vec<Row>, StoreError> {
        let key = table_key(table);
        match self.db.get_json::<Vec<Row>>(&key).await? {
            Some(rows) if table == PROFILES_TABLE => {
                let (rows, repaired) = repair_profiles(rows);
                if repaired > 0 {
                    warn!(repaired, "Patched legacy profiles without full_name");
                    self.db.set_json(&key, &rows).await?;
                }
                Ok(rows)
            }
            Some(rows) => Ok(rows),
            None => {
                let mut rows = self.fixtures.rows(table);
                if table == PROFILES_TABLE {
                    rows = repair_profiles(rows).0;
                }
                self.db.set_json(&key, &rows).await?;
                info!(table, rows = rows.len(), "Seeded table");
                Ok(rows)
            }
        }
    }

    /// Replace every row of `table`.
    pub async fn write(&self, table: &str, rows: &[Row]) -> Result<(), StoreError> {
        self.db.set_json(&table_key(table), rows).await?;
        debug!(table, rows = rows.len(), "Table written");
        Ok(())
    }

    /// Drop the persisted record so the next read re-seeds from fixtures.
    pub async fn reset(&self, table: &str) -> Result<bool, StoreError> {
        let _guard = self.lock(table).await;
        self.db.remove(&table_key(table)).await
    }

    /// Names of every table that has been persisted.
    pub async fn tables(&self) -> Result<Vec<String>, StoreError> {
        let keys = self.db.keys_with_prefix(TABLE_KEY_PREFIX).await?;
        Ok(keys
            .into_iter()
            .filter_map(|k| k.strip_prefix(TABLE_KEY_PREFIX).map(str::to_string))
            .collect())
    }

    /// Exclusive access to `table` for a read-modify-write cycle.
    pub async fn lock(&self, table: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(table.to_string()).or_default())
        };
        lock.lock_owned().await
    }
}

fn table_key(table: &str) -> String {
    format!("{TABLE_KEY_PREFIX}{table}")
}

/// Fill a missing or empty `full_name` from the email. Returns the rows and
/// how many were patched.
fn repair_profiles(mut rows: Vec<Row>) -> (Vec<Row>, usize) {
    let mut repaired = 0;
    for row in &mut rows {
        if !lacks_full_name(row) {
            continue;
        }
        let email = row.get("email").and_then(Value::as_str).unwrap_or_default();
        row.insert(
            "full_name".to_string(),
            Value::String(display_name_from_email(email)),
        );
        repaired += 1;
    }
    (rows, repaired)
}

fn lacks_full_name(row: &Row) -> bool {
    !row.get("full_name")
        .and_then(Value::as_str)
        .is_some_and(|name| !name.trim().is_empty())
}

/// `"juan.perez@x.com"` becomes `"Juan Perez"`; no usable email gives `"Usuario"`.
pub fn display_name_from_email(email: &str) -> String {
    let local = email.split('@').next().unwrap_or_default();
    let words: Vec<String> = local
        .split(['.', '_', '-', '+'])
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect()
            })
        })
        .collect();
    if words.is_empty() {
        "Usuario".to_string()
    } else {
        words.join(" ")
    }
}
