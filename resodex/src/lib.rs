//! resodex library interface
//!
//! Exposes the session, client, traversal, normalization, and catalog
//! layers for the binary and for integration testing.

pub mod auth;
pub mod services;

pub use resodex_common::{Error, Result};
