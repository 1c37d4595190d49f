//! Profile lookup with caching, per-attempt timeouts and retries.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use shoestore_store::MockDatabase;

use crate::error::AuthError;
use crate::timeout::{Timed, with_timeout};
use crate::types::Profile;

const PROFILES_TABLE: &str = "profiles";

/// Where profiles are loaded from.
#[async_trait]
pub trait ProfileSource: Send + Sync + 'static {
    /// Load the profile of `user_id`. A missing profile is an error.
    async fn load(&self, user_id: &str) -> Result<Profile, AuthError>;
}

/// Reads the `profiles` table of the mock store.
#[derive(Clone)]
pub struct StoreProfileSource {
    db: MockDatabase,
}

impl StoreProfileSource {
    pub const fn new(db: MockDatabase) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ProfileSource for StoreProfileSource {
    async fn load(&self, user_id: &str) -> Result<Profile, AuthError> {
        self.db
            .from(PROFILES_TABLE)
            .select("*")
            .eq("id", user_id)
            .single()
            .await?
            .parse_row::<Profile>()?
            .ok_or_else(|| AuthError::profile_unavailable(user_id))
    }
}

/// Timeout and retry allowance for one [`ProfileFetcher::fetch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchBudget {
    /// Limit for each attempt.
    pub timeout: Duration,
    /// Attempts after the first.
    pub retries: u32,
}

impl FetchBudget {
    pub const fn new(timeout: Duration, retries: u32) -> Self {
        Self { timeout, retries }
    }
}

/// Fetches and caches the signed-in user's profile.
///
/// A cache hit for the same user id returns immediately without touching the
/// source; that short-circuit is what de-duplicates repeated fetches.
pub struct ProfileFetcher {
    source: Arc<dyn ProfileSource>,
    retry_backoff: Duration,
    cache: Mutex<Option<Profile>>,
}

impl ProfileFetcher {
    pub fn new(source: Arc<dyn ProfileSource>, retry_backoff: Duration) -> Self {
        Self {
            source,
            retry_backoff,
            cache: Mutex::new(None),
        }
    }

    /// Profile of `user_id`, or `None` once every attempt has failed.
    pub async fn fetch(&self, user_id: &str, budget: FetchBudget) -> Option<Profile> {
        if let Some(profile) = self.cached()
            && profile.id == user_id
        {
            debug!(user_id, "Profile cache hit");
            return Some(profile);
        }

        let mut retries_left = budget.retries;
        let mut attempt = 1u32;
        loop {
            match with_timeout(budget.timeout, self.source.load(user_id)).await {
                Timed::Ok(profile) if profile.id == user_id => {
                    info!(user_id, role = %profile.role, attempt, "Profile loaded");
                    self.store(profile.clone());
                    return Some(profile);
                }
                Timed::Ok(profile) => {
                    warn!(user_id, got = %profile.id, attempt, "Profile belongs to another user");
                }
                Timed::TimedOut => {
                    warn!(user_id, attempt, timeout_ms = budget.timeout.as_millis(), "Profile fetch timed out");
                }
                Timed::Err(e) => {
                    warn!(user_id, attempt, error = %e, "Profile fetch failed");
                }
            }

            if retries_left == 0 {
                warn!(user_id, attempts = attempt, "Profile fetch exhausted retries");
                return None;
            }
            retries_left -= 1;
            attempt += 1;
            tokio::time::sleep(self.retry_backoff).await;
        }
    }

    pub fn cached(&self) -> Option<Profile> {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn clear(&self) {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner).take();
    }

    fn store(&self, profile: Profile) {
        *self.cache.lock().unwrap_or_else(PoisonError::into_inner) = Some(profile);
    }
}
