//! Configuration model for turnstile.
//!
//! This module defines the Config struct that represents `turnstile.yaml`.
//! It supports forward-compatible YAML parsing (unknown fields are ignored),
//! sensible defaults for optional fields, and validation of config values.

mod model;
mod operations;

#[cfg(test)]
mod tests;

// Re-export public API
pub use model::{Backend, Config};
