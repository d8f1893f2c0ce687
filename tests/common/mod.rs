//! Shared helpers for integration tests.

pub mod processors;

pub use processors::*;
