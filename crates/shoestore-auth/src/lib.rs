//! Session lifecycle for shoestore.
//!
//! - [`MockAuthService`]: offline credential exchange and auth event broadcast
//! - [`ProfileFetcher`]: cached, timeout-bounded profile lookup with retries
//! - [`SessionController`]: reconciles auth events into an observable
//!   session/profile snapshot

pub mod controller;
mod error;
pub mod mock;
pub mod profile;
pub mod provider;
pub mod timeout;
pub mod types;

pub use controller::{AuthStatus, ControllerConfig, SessionController, SessionSnapshot};
pub use error::AuthError;
pub use mock::{MockAuthConfig, MockAuthService};
pub use profile::{FetchBudget, ProfileFetcher, ProfileSource, StoreProfileSource};
pub use provider::{AuthProvider, AuthSubscription};
pub use timeout::{Timed, with_timeout};
pub use types::{AuthEvent, AuthEventKind, Profile, Role, Session, User};
