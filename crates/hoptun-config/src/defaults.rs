//! Default value functions for serde deserialization.
//!
//! These functions forward to constants defined in `hoptun_core::defaults`.

use hoptun_core::defaults;

/// Generate default value functions that forward to hoptun_core::defaults constants.
macro_rules! default_fns {
    // For Copy types (integers, bool, etc.)
    ($($fn_name:ident => $const_name:ident : $ty:ty),* $(,)?) => {
        $(
            pub(crate) fn $fn_name() -> $ty {
                defaults::$const_name
            }
        )*
    };
}

default_fns! {
    default_per_hop_timeout_secs      => DEFAULT_PER_HOP_TIMEOUT_SECS: u64,
    default_keepalive_secs            => DEFAULT_KEEPALIVE_SECS: u64,
    default_track_connections         => DEFAULT_TRACK_CONNECTIONS: bool,
    default_use_agent                 => DEFAULT_USE_AGENT: bool,
    default_relay_buffer_size         => DEFAULT_RELAY_BUFFER_SIZE: usize,
    default_forward_idle_timeout_secs => DEFAULT_FORWARD_IDLE_TIMEOUT_SECS: u64,
    min_relay_buffer_size             => MIN_RELAY_BUFFER_SIZE: usize,
    max_relay_buffer_size             => MAX_RELAY_BUFFER_SIZE: usize,
}
