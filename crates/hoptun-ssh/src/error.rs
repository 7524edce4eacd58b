//! Error types for the SSH backend and CLI runner.

use std::path::PathBuf;

use hoptun_config::ConfigError;
use hoptun_tunnel::TunnelError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SshError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Tunnel(#[from] TunnelError),

    #[error("load key {path}: {source}")]
    Key {
        path: PathBuf,
        #[source]
        source: russh::keys::Error,
    },

    #[error("decode key: {0}")]
    DecodeKey(#[source] russh::keys::Error),

    #[error("passphrase variable {0} is not set")]
    PassphraseEnv(String),

    #[error("cannot resolve home directory")]
    HomeDir,

    #[error("invalid hop: {0}")]
    InvalidHop(String),
}
