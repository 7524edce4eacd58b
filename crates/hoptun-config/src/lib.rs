//! Configuration loading, validation and CLI overrides.
//!
//! A configuration file describes the hop chain, the credentials used at
//! every hop, host-key trust, tunnel tuning and the forwards the CLI runs.

mod cli;
mod defaults;
mod loader;
mod types;
mod validate;

pub use cli::{CliOverrides, apply_overrides, parse_forward_pair};
pub use loader::{ConfigError, load_config};
pub use types::*;
pub use validate::validate_config;
