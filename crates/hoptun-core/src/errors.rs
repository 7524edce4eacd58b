//! Error category constants for logging.
//!
//! These constants provide consistent error classification across all crates.

/// Configuration error (no hops, no auth, invalid hop spec, bad options).
pub const ERROR_CONFIG: &str = "config";
/// Dialing a hop or a channel through a hop failed.
pub const ERROR_DIAL: &str = "dial";
/// Secure handshake with a hop failed.
pub const ERROR_HANDSHAKE: &str = "handshake";
/// Host key could not be resolved or was rejected.
pub const ERROR_HOST_KEY: &str = "host_key";
/// Authentication error.
pub const ERROR_AUTH: &str = "auth";
/// Remote or local listener error.
pub const ERROR_LISTEN: &str = "listen";
/// Timeout error.
pub const ERROR_TIMEOUT: &str = "timeout";
/// Operation on a closed tunnel or listener.
pub const ERROR_CLOSED: &str = "closed";
/// Operation cancelled by the caller.
pub const ERROR_CANCELLED: &str = "cancelled";
/// Teardown failure.
pub const ERROR_TEARDOWN: &str = "teardown";
/// I/O error.
pub const ERROR_IO: &str = "io";
