//! Offline auth service backed by the mock store.
//!
//! Any non-empty email/password pair signs in. The session is persisted
//! under [`SESSION_KEY`] next to the table records, and a matching row in
//! `profiles` is created or updated by email.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tokio::sync::{Mutex as AsyncMutex, mpsc};
use tracing::{debug, info, warn};

use shoestore_core::config::AuthConfig;
use shoestore_core::db::unix_timestamp;
use shoestore_store::{MockDatabase, QueryData, SESSION_KEY, TableStore, display_name_from_email};

use crate::error::AuthError;
use crate::provider::{AuthProvider, AuthSubscription};
use crate::types::{AuthEvent, AuthEventKind, Role, Session, User};

/// Timing of the simulated backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockAuthConfig {
    pub sign_in_latency: Duration,
    pub session_ttl: Duration,
}

impl Default for MockAuthConfig {
    fn default() -> Self {
        Self::from(&AuthConfig::default())
    }
}

impl From<&AuthConfig> for MockAuthConfig {
    fn from(config: &AuthConfig) -> Self {
        Self {
            sign_in_latency: Duration::from_millis(config.sign_in_latency_ms),
            session_ttl: Duration::from_secs(config.session_ttl_secs),
        }
    }
}

/// Mock auth backend. Cheap to clone; clones share subscribers.
#[derive(Clone)]
pub struct MockAuthService {
    inner: Arc<Inner>,
}

struct Inner {
    tables: TableStore,
    db: MockDatabase,
    config: MockAuthConfig,
    /// Serializes session changes with their publication and with new
    /// subscriptions, so a subscriber never misses or reorders an event.
    gate: AsyncMutex<()>,
    subscribers: Mutex<HashMap<u64, mpsc::UnboundedSender<AuthEvent>>>,
    next_subscriber: AtomicU64,
}

impl MockAuthService {
    pub fn new(tables: TableStore, config: MockAuthConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                db: MockDatabase::new(tables.clone()),
                tables,
                config,
                gate: AsyncMutex::new(()),
                subscribers: Mutex::new(HashMap::new()),
                next_subscriber: AtomicU64::new(1),
            }),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers().len()
    }

    /// Re-issue tokens for the persisted session and publish
    /// `TOKEN_REFRESHED`.
    pub async fn refresh_session(&self) -> Result<Session, AuthError> {
        let _gate = self.inner.gate.lock().await;
        let current = self
            .inner
            .load_session()
            .await?
            .ok_or(AuthError::SessionMissing)?;
        let session = self.inner.issue(current.user);
        self.inner.save_session(&session).await?;
        info!(user_id = %session.user.id, "Session refreshed");
        self.inner
            .publish(&AuthEvent::new(AuthEventKind::TokenRefreshed, Some(session.clone())));
        Ok(session)
    }

    async fn upsert_profile(&self, email: &str, role: Role) -> Result<String, AuthError> {
        let existing = self
            .inner
            .db
            .from("profiles")
            .eq("email", email)
            .limit(1)
            .maybe_single()
            .await?;

        let mut payload = json!({ "email": email, "role": role.as_str() });
        match existing {
            QueryData::Row(row) => {
                if let Some(id) = row.get("id") {
                    payload["id"] = id.clone();
                }
            }
            QueryData::Rows(_) | QueryData::Empty => {
                payload["id"] = Value::String(uuid::Uuid::new_v4().to_string());
                payload["full_name"] = Value::String(display_name_from_email(email));
            }
        }

        let row = self
            .inner
            .db
            .from("profiles")
            .upsert(payload, "email")
            .await?
            .into_row()
            .unwrap_or_default();
        row.get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| AuthError::profile_unavailable(email))
    }
}

#[async_trait]
impl AuthProvider for MockAuthService {
    async fn get_session(&self) -> Result<Option<Session>, AuthError> {
        self.inner.load_session().await
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, AuthError> {
        tokio::time::sleep(self.inner.config.sign_in_latency).await;

        let email = email.trim();
        if email.is_empty() || password.is_empty() {
            warn!("Rejected sign-in with empty credentials");
            return Err(AuthError::InvalidCredentials);
        }
        let role = Role::for_email(email);

        let _gate = self.inner.gate.lock().await;
        let user_id = self.upsert_profile(email, role).await?;

        let mut metadata = Map::new();
        metadata.insert("role".to_string(), Value::String(role.as_str().to_string()));
        let user = User {
            id: user_id,
            email: email.to_string(),
            user_metadata: metadata,
        };
        let session = self.inner.issue(user);
        self.inner.save_session(&session).await?;

        info!(user_id = %session.user.id, %role, "Signed in");
        self.inner
            .publish(&AuthEvent::new(AuthEventKind::SignedIn, Some(session.clone())));
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        let _gate = self.inner.gate.lock().await;
        let removed = self.inner.tables.database().remove(SESSION_KEY).await?;
        info!(had_session = removed, "Signed out");
        self.inner.publish(&AuthEvent::signed_out());
        Ok(())
    }

    async fn on_auth_state_change(&self) -> Result<AuthSubscription, AuthError> {
        let _gate = self.inner.gate.lock().await;
        let current = AuthEvent::current(self.inner.load_session().await?);

        let (tx, rx) = mpsc::unbounded_channel();
        // The receiver is alive, so the first send cannot fail.
        let _ = tx.send(current);

        let id = self.inner.next_subscriber.fetch_add(1, Ordering::Relaxed);
        self.inner.subscribers().insert(id, tx);
        debug!(subscriber = id, "Auth subscriber added");

        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        Ok(AuthSubscription::new(rx, move || {
            if let Some(inner) = weak.upgrade() {
                inner.subscribers().remove(&id);
                debug!(subscriber = id, "Auth subscriber removed");
            }
        }))
    }
}

impl Inner {
    fn subscribers(
        &self,
    ) -> std::sync::MutexGuard<'_, HashMap<u64, mpsc::UnboundedSender<AuthEvent>>> {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Deliver `event` to every live subscriber, pruning closed ones.
    fn publish(&self, event: &AuthEvent) {
        let mut subscribers = self.subscribers();
        subscribers.retain(|_, tx| tx.send(event.clone()).is_ok());
        debug!(kind = ?event.kind, subscribers = subscribers.len(), "Auth event published");
    }

    fn issue(&self, user: User) -> Session {
        let ttl = self.config.session_ttl.as_secs();
        Session {
            access_token: uuid::Uuid::new_v4().to_string(),
            refresh_token: uuid::Uuid::new_v4().to_string(),
            expires_in: ttl,
            expires_at: unix_timestamp().saturating_add(i64::try_from(ttl).unwrap_or(i64::MAX)),
            user,
        }
    }

    async fn load_session(&self) -> Result<Option<Session>, AuthError> {
        Ok(self.tables.database().get_json(SESSION_KEY).await?)
    }

    async fn save_session(&self, session: &Session) -> Result<(), AuthError> {
        self.tables.database().set_json(SESSION_KEY, session).await?;
        Ok(())
    }
}
