//! Core types and constants shared across hoptun crates.
//!
//! This crate provides:
//! - Default configuration values
//! - Error category constants for logging
//! - The bidirectional stream bridge used by forwarding

pub mod defaults;
pub mod errors;
pub mod io;

// Re-export commonly used items at crate root
pub use defaults::*;
pub use errors::*;

/// Project name.
pub const PROJECT_NAME: &str = "hoptun";
/// Project version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
