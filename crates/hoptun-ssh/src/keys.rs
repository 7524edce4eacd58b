//! Private key loading.
//!
//! Key material reaches the handshake either as raw PEM text carried by a
//! [`Credential::Pem`] or as a pre-parsed [`KeySigner`].

use std::any::Any;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use hoptun_tunnel::{Credential, Signer};
use russh::keys::PrivateKey;

use crate::error::SshError;

/// A parsed private key usable as a tunnel credential.
#[derive(Clone)]
pub struct KeySigner {
    key: Arc<PrivateKey>,
}

impl KeySigner {
    pub fn new(key: PrivateKey) -> Self {
        Self { key: Arc::new(key) }
    }

    /// Load a key file; a leading `~/` is expanded.
    pub fn from_file(path: impl AsRef<Path>, passphrase: Option<&str>) -> Result<Self, SshError> {
        let path = expand_tilde(path.as_ref())?;
        let key = russh::keys::load_secret_key(&path, passphrase)
            .map_err(|source| SshError::Key { path, source })?;
        Ok(Self::new(key))
    }

    pub fn from_pem(pem: &str, passphrase: Option<&str>) -> Result<Self, SshError> {
        let key = russh::keys::decode_secret_key(pem, passphrase).map_err(SshError::DecodeKey)?;
        Ok(Self::new(key))
    }

    pub fn key(&self) -> &Arc<PrivateKey> {
        &self.key
    }

    pub fn into_credential(self) -> Credential {
        Credential::Signer(Arc::new(self))
    }
}

impl Signer for KeySigner {
    fn algorithm(&self) -> String {
        self.key.algorithm().as_str().to_string()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl fmt::Debug for KeySigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeySigner")
            .field("algorithm", &self.algorithm())
            .finish_non_exhaustive()
    }
}

/// Turn a credential into a usable private key.
///
/// Signers from other backends yield `Ok(None)`.
pub(crate) fn private_key(credential: &Credential) -> Result<Option<Arc<PrivateKey>>, SshError> {
    match credential {
        Credential::Pem { pem, passphrase, .. } => {
            let key = russh::keys::decode_secret_key(pem, passphrase.as_ref().map(|p| p.as_str()))
                .map_err(SshError::DecodeKey)?;
            Ok(Some(Arc::new(key)))
        }
        Credential::Signer(signer) => Ok(signer
            .as_any()
            .downcast_ref::<KeySigner>()
            .map(|s| s.key.clone())),
    }
}

/// Expand a leading `~` or `~/` to the home directory.
pub fn expand_tilde(path: &Path) -> Result<PathBuf, SshError> {
    let Some(s) = path.to_str() else {
        return Ok(path.to_path_buf());
    };
    if s == "~" {
        return dirs::home_dir().ok_or(SshError::HomeDir);
    }
    match s.strip_prefix("~/") {
        Some(rest) => Ok(dirs::home_dir().ok_or(SshError::HomeDir)?.join(rest)),
        None => Ok(path.to_path_buf()),
    }
}
