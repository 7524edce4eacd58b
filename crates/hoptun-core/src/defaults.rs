//! Default configuration values.
//!
//! Centralized default constants for use across all crates.

// ============================================================================
// Chain Defaults
// ============================================================================

/// Default SSH port used when a hop spec omits `:port`.
pub const DEFAULT_SSH_PORT: u16 = 22;
/// Default timeout for dialing and handshaking a single hop, in seconds.
pub const DEFAULT_PER_HOP_TIMEOUT_SECS: u64 = 10;
/// Default keepalive interval per hop session, in seconds (0 = disabled).
pub const DEFAULT_KEEPALIVE_SECS: u64 = 30;
/// Connection tracking is enabled unless explicitly turned off.
pub const DEFAULT_TRACK_CONNECTIONS: bool = true;
/// Agent authentication is opt-in.
pub const DEFAULT_USE_AGENT: bool = false;

// ============================================================================
// Forwarding Defaults
// ============================================================================

/// Default bridge buffer size per direction (32 KiB).
pub const DEFAULT_RELAY_BUFFER_SIZE: usize = 32768;
/// Smallest accepted bridge buffer size.
pub const MIN_RELAY_BUFFER_SIZE: usize = 1024;
/// Largest accepted bridge buffer size.
pub const MAX_RELAY_BUFFER_SIZE: usize = 1024 * 1024;
/// Default idle timeout for forwarded connections in seconds (0 = none).
pub const DEFAULT_FORWARD_IDLE_TIMEOUT_SECS: u64 = 0;

// ============================================================================
// Environment
// ============================================================================

/// Environment variable naming the SSH agent socket.
pub const AGENT_SOCK_ENV: &str = "SSH_AUTH_SOCK";
/// Environment variable consulted when the home directory cannot be resolved.
pub const HOME_ENV: &str = "HOME";
/// Environment variables consulted, in order, for the current user name.
pub const USER_ENVS: &[&str] = &["USER", "LOGNAME", "USERNAME"];
/// Known-hosts location relative to the home directory.
pub const KNOWN_HOSTS_RELATIVE: &str = ".ssh/known_hosts";

// ============================================================================
// Logging Defaults
// ============================================================================

/// Default log level for the CLI.
pub const DEFAULT_LOG_LEVEL: &str = "info";
