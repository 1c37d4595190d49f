//! Shared handles for one CLI invocation.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use shoestore_auth::{
    AuthError, ControllerConfig, MockAuthConfig, MockAuthService, SessionController,
    StoreProfileSource,
};
use shoestore_core::Config;
use shoestore_store::{Fixtures, MockDatabase, StoreDatabase, TableStore};

/// Store and auth service over one database file.
pub struct AppContext {
    pub config: Config,
    pub tables: TableStore,
    pub auth: MockAuthService,
}

impl AppContext {
    /// Open the database at `db_override`, or the configured path.
    pub async fn open(config: Config, db_override: Option<PathBuf>) -> anyhow::Result<Self> {
        let path = db_override
            .or_else(|| config.database_path())
            .ok_or_else(|| anyhow::anyhow!("Cannot determine database path. Use --db <path>"))?;
        let db = StoreDatabase::open(&path)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to open {}: {}", path.display(), e))?;
        info!(path = %path.display(), "Opened mock store");
        Ok(Self::with_database(config, db))
    }

    pub fn with_database(config: Config, db: StoreDatabase) -> Self {
        let tables = TableStore::new(db, Fixtures::shoe_store());
        let auth = MockAuthService::new(tables.clone(), MockAuthConfig::from(&config.auth));
        Self {
            config,
            tables,
            auth,
        }
    }

    pub fn database(&self) -> MockDatabase {
        MockDatabase::new(self.tables.clone())
    }

    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig::from(&self.config.auth)
    }

    /// Start a session controller over the mock auth service.
    pub async fn controller(&self) -> Result<SessionController, AuthError> {
        SessionController::open(
            Arc::new(self.auth.clone()),
            Arc::new(StoreProfileSource::new(self.database())),
            self.controller_config(),
        )
        .await
    }
}
