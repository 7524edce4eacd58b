//! I/O utilities for bridging two byte streams.
//!
//! The bridge is shared by local forwards and remote forwards.

mod relay;

pub use relay::relay_bidirectional;
