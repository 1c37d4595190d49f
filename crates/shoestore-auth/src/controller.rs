//! Session lifecycle controller.
//!
//! Consumes the provider's auth events one at a time, in order, on a single
//! task and publishes a [`SessionSnapshot`] through a watch channel.
//!
//! Per event:
//! 1. Take the one-shot manual-login marker installed by [`SessionController::sign_in`].
//!    Only a `SIGNED_IN` event that is not the subscription's first takes
//!    it; the first event always reports the state found at startup.
//! 2. Raise `loading` only for a manual login or the first event, when a
//!    user is present and no profile is cached yet.
//! 3. No user: clear session and profile, `Unauthenticated`.
//! 4. User: mirror the session and fetch the profile, patiently for a manual
//!    login and impatiently for anything else. Unless the cached profile
//!    belongs to this user, status is `Loading` while the fetch runs.
//! 5. Profile found: `AuthenticatedWithProfile`.
//! 6. Not found after a manual login: forced sign-out, `Unauthenticated`.
//! 7. Not found otherwise: `AuthenticatedNoProfile`, session kept.
//! 8. `loading` is cleared once the event is done.
//!
//! A safety timer clears `loading` after `loading_ceiling` regardless.
//! Every event and every [`SessionController::sign_out`] bumps a generation
//! counter; a profile fetch that finishes under an older generation is
//! discarded.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use shoestore_core::config::AuthConfig;

use crate::error::AuthError;
use crate::profile::{FetchBudget, ProfileFetcher, ProfileSource};
use crate::provider::{AuthProvider, AuthSubscription};
use crate::types::{AuthEvent, AuthEventKind, Profile, Session, User};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStatus {
    /// No auth event processed yet.
    Loading,
    Unauthenticated,
    /// Signed in, but the profile could not be loaded.
    AuthenticatedNoProfile,
    AuthenticatedWithProfile,
}

/// Observable session state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub status: AuthStatus,
    pub session: Option<Session>,
    pub profile: Option<Profile>,
    /// Whether the UI should block on a pending profile.
    pub loading: bool,
}

impl SessionSnapshot {
    const fn initial() -> Self {
        Self {
            status: AuthStatus::Loading,
            session: None,
            profile: None,
            loading: true,
        }
    }

    pub fn user(&self) -> Option<&User> {
        self.session.as_ref().map(|s| &s.user)
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(
            self.status,
            AuthStatus::AuthenticatedNoProfile | AuthStatus::AuthenticatedWithProfile
        )
    }
}

/// Fetch budgets and the loading ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Used right after an interactive login.
    pub manual_budget: FetchBudget,
    /// Used for restored sessions and background events.
    pub auto_budget: FetchBudget,
    pub retry_backoff: Duration,
    pub loading_ceiling: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self::from(&AuthConfig::default())
    }
}

impl From<&AuthConfig> for ControllerConfig {
    fn from(config: &AuthConfig) -> Self {
        Self {
            manual_budget: FetchBudget::new(
                Duration::from_millis(config.manual_fetch_timeout_ms),
                config.manual_fetch_retries,
            ),
            auto_budget: FetchBudget::new(
                Duration::from_millis(config.auto_fetch_timeout_ms),
                config.auto_fetch_retries,
            ),
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
            loading_ceiling: Duration::from_millis(config.loading_ceiling_ms),
        }
    }
}

type Outcome = Result<SessionSnapshot, AuthError>;

struct ControlState {
    /// Set by `sign_in` before the credential exchange; taken by the next
    /// `SIGNED_IN` event after the first.
    manual: Option<oneshot::Sender<Outcome>>,
    first_event: bool,
    safety_timer: Option<JoinHandle<()>>,
}

struct Shared {
    auth: Arc<dyn AuthProvider>,
    fetcher: ProfileFetcher,
    config: ControllerConfig,
    snapshot: watch::Sender<SessionSnapshot>,
    state: Mutex<ControlState>,
    generation: AtomicU64,
}

/// Owns the event-processing task; dropping the controller stops it.
pub struct SessionController {
    shared: Arc<Shared>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl SessionController {
    /// Subscribe to `auth` and start processing its events.
    pub async fn open(
        auth: Arc<dyn AuthProvider>,
        profiles: Arc<dyn ProfileSource>,
        config: ControllerConfig,
    ) -> Result<Self, AuthError> {
        let events = auth.on_auth_state_change().await?;
        let (snapshot, _) = watch::channel(SessionSnapshot::initial());
        let shared = Arc::new(Shared {
            auth,
            fetcher: ProfileFetcher::new(profiles, config.retry_backoff),
            config,
            snapshot,
            state: Mutex::new(ControlState {
                manual: None,
                first_event: true,
                safety_timer: None,
            }),
            generation: AtomicU64::new(0),
        });
        shared.arm_safety_timer().await;

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(run(Arc::clone(&shared), events, shutdown_rx));
        info!("Session controller started");

        Ok(Self {
            shared,
            shutdown: Some(shutdown_tx),
            task: Some(task),
        })
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.shared.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.shared.snapshot.subscribe()
    }

    /// Interactive login. Resolves once the resulting `SIGNED_IN` event has
    /// been processed, or fails if the profile cannot be loaded.
    ///
    /// Fails with `Timeout` only if the event does not reach the pipeline
    /// within `loading_ceiling`. Once it has, the outcome is awaited; the
    /// profile fetch is bounded by the manual budget.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<SessionSnapshot, AuthError> {
        let (reply, mut outcome) = oneshot::channel();
        self.shared.state.lock().await.manual = Some(reply);

        if let Err(e) = self.shared.auth.sign_in_with_password(email, password).await {
            self.shared.state.lock().await.manual = None;
            warn!(error = %e, "Sign-in rejected");
            return Err(e);
        }

        let delivered =
            tokio::time::timeout(self.shared.config.loading_ceiling, &mut outcome).await;
        let result = match delivered {
            Ok(result) => result,
            Err(_) => {
                if self.shared.state.lock().await.manual.take().is_some() {
                    warn!("Sign-in event never arrived");
                    return Err(AuthError::Timeout {
                        operation: "sign-in",
                    });
                }
                debug!("Sign-in still resolving its profile");
                outcome.await
            }
        };
        result.unwrap_or(Err(AuthError::Closed))
    }

    /// Clear local state immediately, then sign out with the provider.
    /// A provider failure is logged and does not restore the session.
    pub async fn sign_out(&self) {
        self.shared.generation.fetch_add(1, Ordering::SeqCst);
        self.shared.clear_local();
        self.shared.snapshot.send_modify(|s| s.loading = false);
        info!("Signed out locally");

        if let Err(e) = self.shared.auth.sign_out().await {
            warn!(error = %e, "Provider sign-out failed; local session stays cleared");
        }
    }

    /// Wait for a snapshot satisfying `predicate`.
    pub async fn wait_until(
        &self,
        mut predicate: impl FnMut(&SessionSnapshot) -> bool,
        limit: Duration,
    ) -> Result<SessionSnapshot, AuthError> {
        let mut rx = self.subscribe();
        let waited = tokio::time::timeout(limit, rx.wait_for(|s| predicate(s))).await;
        match waited {
            Ok(Ok(snapshot)) => Ok(snapshot.clone()),
            Ok(Err(_)) => Err(AuthError::Closed),
            Err(_) => Err(AuthError::Timeout {
                operation: "wait_until",
            }),
        }
    }

    /// Stop processing events and unsubscribe from the provider.
    pub async fn shutdown(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            warn!(error = %e, "Session controller task failed");
        }
        if let Some(timer) = self.shared.state.lock().await.safety_timer.take() {
            timer.abort();
        }
        debug!("Session controller stopped");
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn run(
    shared: Arc<Shared>,
    mut events: AuthSubscription,
    mut shutdown: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => break,
            event = events.recv() => match event {
                Some(event) => shared.handle(event).await,
                None => {
                    warn!("Auth event stream ended");
                    break;
                }
            },
        }
    }
}

impl Shared {
    async fn handle(self: &Arc<Self>, event: AuthEvent) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let (manual, first) = {
            let mut state = self.state.lock().await;
            let first = std::mem::replace(&mut state.first_event, false);
            let manual = if event.kind == AuthEventKind::SignedIn && !first {
                state.manual.take()
            } else {
                None
            };
            (manual, first)
        };
        let is_manual = manual.is_some();
        let user = event.user().cloned();
        debug!(
            kind = ?event.kind,
            manual = is_manual,
            first,
            user_id = ?user.as_ref().map(|u| u.id.as_str()),
            generation,
            "Processing auth event"
        );

        let block = (is_manual || first) && user.is_some() && self.fetcher.cached().is_none();
        if block {
            self.snapshot.send_modify(|s| s.loading = true);
            self.arm_safety_timer().await;
        }

        let result = match user {
            None => {
                self.clear_local();
                Ok(())
            }
            Some(user) => {
                self.resolve_profile(event.session, &user, is_manual, generation)
                    .await
            }
        };

        self.snapshot.send_modify(|s| s.loading = false);
        if let Some(reply) = manual {
            let _ = reply.send(result.map(|()| self.current()));
        }
    }

    async fn resolve_profile(
        &self,
        session: Option<Session>,
        user: &User,
        manual: bool,
        generation: u64,
    ) -> Result<(), AuthError> {
        if self.fetcher.cached().is_some_and(|p| p.id != user.id) {
            self.fetcher.clear();
        }
        self.snapshot.send_modify(|s| {
            let same_user = s.user().is_some_and(|u| u.id == user.id);
            let known_without_profile =
                same_user && s.status == AuthStatus::AuthenticatedNoProfile;
            s.session = session;
            if s.profile.as_ref().is_some_and(|p| p.id != user.id) {
                s.profile = None;
            }
            if s.profile.is_none() && !known_without_profile {
                s.status = AuthStatus::Loading;
            }
        });

        let budget = if manual {
            self.config.manual_budget
        } else {
            self.config.auto_budget
        };
        let profile = self.fetcher.fetch(&user.id, budget).await;

        if self.generation.load(Ordering::SeqCst) != generation {
            debug!(user_id = %user.id, generation, "Discarding superseded profile fetch");
            if self.snapshot.borrow().profile.is_none() {
                self.fetcher.clear();
            }
            return Err(AuthError::SessionMissing);
        }

        match profile {
            Some(profile) => {
                info!(user_id = %user.id, role = %profile.role, "Session ready");
                self.snapshot.send_modify(|s| {
                    s.status = AuthStatus::AuthenticatedWithProfile;
                    s.profile = Some(profile);
                });
                Ok(())
            }
            None if manual => {
                warn!(user_id = %user.id, "No profile after interactive login, forcing sign-out");
                self.clear_local();
                if let Err(e) = self.auth.sign_out().await {
                    warn!(error = %e, "Forced sign-out failed");
                }
                Err(AuthError::profile_unavailable(&user.id))
            }
            None => {
                warn!(user_id = %user.id, "Profile unavailable, keeping restored session");
                self.snapshot.send_modify(|s| {
                    s.status = AuthStatus::AuthenticatedNoProfile;
                    s.profile = None;
                });
                Ok(())
            }
        }
    }

    fn clear_local(&self) {
        self.fetcher.clear();
        self.snapshot.send_modify(|s| {
            s.status = AuthStatus::Unauthenticated;
            s.session = None;
            s.profile = None;
        });
    }

    fn current(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    async fn arm_safety_timer(self: &Arc<Self>) {
        let shared = Arc::downgrade(self);
        let ceiling = self.config.loading_ceiling;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(ceiling).await;
            if let Some(shared) = shared.upgrade() {
                shared.snapshot.send_if_modified(|s| {
                    if !s.loading {
                        return false;
                    }
                    warn!(ceiling_ms = ceiling.as_millis(), "Loading ceiling reached");
                    s.loading = false;
                    true
                });
            }
        });
        if let Some(previous) = self.state.lock().await.safety_timer.replace(timer) {
            previous.abort();
        }
    }
}
