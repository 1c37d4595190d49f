//! Shared tracing/logging initialization.
//!
//! The CLI and any embedding front-end install the same subscriber:
//! an env-filter plus either human-readable or JSON lines on stderr, so
//! command output on stdout stays machine-readable.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialise the global tracing subscriber.
///
/// * `default_filter` -- used when `RUST_LOG` is not set
///   (e.g. `"shoestore=info"`).
/// * `log_json` -- emit structured JSON log lines instead of the
///   human-readable format.
///
/// Calling this twice is harmless: the second installation is ignored.
pub fn init_tracing(default_filter: &str, log_json: bool) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));
    let registry = tracing_subscriber::registry().with(env_filter);
    let installed = if log_json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
    };
    if installed.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}

/// Build the default filter directive for the shoestore crates at `level`.
pub fn default_filter(level: &str) -> String {
    ["shoestore", "shoestore_core", "shoestore_store", "shoestore_auth"]
        .iter()
        .map(|target| format!("{target}={level}"))
        .collect::<Vec<_>>()
        .join(",")
}
