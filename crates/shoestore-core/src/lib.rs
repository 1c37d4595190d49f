//! `shoestore` Core Library
//!
//! Shared functionality for `shoestore` components:
//! - Configuration resolution and hierarchy
//! - SQLite pool helpers and timestamps for the local mock store
//! - Tracing initialisation
//! - Common error types

pub mod config;
pub mod db;
pub mod error;
pub mod tracing_init;

pub use config::Config;
pub use error::{Error, Result};
