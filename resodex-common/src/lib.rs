//! Shared library for resodex
//!
//! Holds the pieces every resodex component needs: the error taxonomy,
//! configuration loading, and the inventory record model (including the
//! structured `resrec:///` reference parser).

pub mod config;
pub mod error;
pub mod records;

pub use error::{Error, Result};
