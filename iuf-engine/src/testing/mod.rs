//! Testing utilities.
//!
//! This module provides:
//! - An in-memory execution engine that records submitted graphs
//! - A static token issuer
//! - Catalog, product and activity fixtures

mod engine;
pub mod fixtures;

pub use engine::{InMemoryExecutionEngine, StaticTokenIssuer};
