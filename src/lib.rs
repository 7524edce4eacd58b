//! # hoptun
//!
//! Multi-hop SSH tunnels for Rust.
//!
//! Chain authenticated SSH sessions through any number of jump hosts, then
//! dial out from the last hop, listen on it, or forward local ports through
//! the chain.
//!
//! ## Crates
//!
//! - [`hoptun_core`] - Default values, error categories and the stream bridge
//! - [`hoptun_config`] - Configuration loading, validation and CLI overrides
//! - [`hoptun_tunnel`] - The tunnel: chain building, tracking and teardown
//! - [`hoptun_ssh`] - SSH backend on top of russh, plus the CLI runner

pub use hoptun_config as config;
pub use hoptun_core as core;
pub use hoptun_ssh as ssh;
pub use hoptun_tunnel as tunnel;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use hoptun_config::{Config, load_config, validate_config};
    pub use hoptun_ssh::{KeySigner, SshHandshaker, tunnel_from_config};
    pub use hoptun_tunnel::{
        CancellationToken, Hop, Tunnel, TunnelBuilder, TunnelConn, TunnelError,
        insecure_ignore_host_key,
    };
}
