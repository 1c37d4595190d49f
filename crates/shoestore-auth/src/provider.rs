//! The auth provider seam consumed by the session controller.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::AuthError;
use crate::types::{AuthEvent, Session};

/// Credential exchange and auth state broadcast.
#[async_trait]
pub trait AuthProvider: Send + Sync + 'static {
    /// The persisted session, if any. No side effects.
    async fn get_session(&self) -> Result<Option<Session>, AuthError>;

    /// Exchange credentials for a session. `SIGNED_IN` is published to every
    /// subscriber before this returns.
    async fn sign_in_with_password(&self, email: &str, password: &str)
    -> Result<Session, AuthError>;

    async fn sign_out(&self) -> Result<(), AuthError>;

    /// Subscribe to auth events. The first event is the current state.
    async fn on_auth_state_change(&self) -> Result<AuthSubscription, AuthError>;
}

/// Ordered stream of auth events for one subscriber.
///
/// Dropping the subscription unsubscribes it.
pub struct AuthSubscription {
    receiver: mpsc::UnboundedReceiver<AuthEvent>,
    on_unsubscribe: Option<Box<dyn FnOnce() + Send>>,
}

impl AuthSubscription {
    pub fn new(
        receiver: mpsc::UnboundedReceiver<AuthEvent>,
        on_unsubscribe: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            receiver,
            on_unsubscribe: Some(Box::new(on_unsubscribe)),
        }
    }

    /// Next event; `None` once the provider is gone.
    pub async fn recv(&mut self) -> Option<AuthEvent> {
        self.receiver.recv().await
    }

    /// Next event if one is already queued.
    pub fn try_recv(&mut self) -> Option<AuthEvent> {
        self.receiver.try_recv().ok()
    }

    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for AuthSubscription {
    fn drop(&mut self) {
        if let Some(on_unsubscribe) = self.on_unsubscribe.take() {
            on_unsubscribe();
        }
    }
}

impl std::fmt::Debug for AuthSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSubscription").finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;

    #[tokio::test]
    async fn drop_runs_unsubscribe_once() {
        let (tx, rx) = mpsc::unbounded_channel();
        let unsubscribed = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&unsubscribed);
        let mut sub = AuthSubscription::new(rx, move || flag.store(true, Ordering::SeqCst));

        tx.send(AuthEvent::signed_out()).unwrap();
        assert_eq!(sub.recv().await.unwrap(), AuthEvent::signed_out());
        assert!(sub.try_recv().is_none());

        sub.unsubscribe();
        assert!(unsubscribed.load(Ordering::SeqCst));
    }
}
