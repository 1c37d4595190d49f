//! shoestore CLI library
//!
//! Command implementations for the `shoestore` binary. Everything runs
//! against the local mock backend.

pub mod auth_cmd;
pub mod context;
pub mod data_cmd;
