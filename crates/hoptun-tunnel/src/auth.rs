//! Credentials and authenticator resolution.

use std::any::Any;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;
use zeroize::Zeroizing;

use crate::error::TunnelError;

/// A parsed signing key owned by the secure-channel backend.
///
/// Backends downcast through [`Signer::as_any`] to recover their own key type.
pub trait Signer: Send + Sync + fmt::Debug + 'static {
    /// Public key algorithm, e.g. `ssh-ed25519`.
    fn algorithm(&self) -> String;

    fn as_any(&self) -> &dyn Any;
}

/// An explicitly supplied signing credential.
#[derive(Clone)]
pub enum Credential {
    /// Raw private key material, parsed by the backend during the handshake.
    Pem {
        pem: Zeroizing<String>,
        passphrase: Option<Zeroizing<String>>,
        /// Where the key came from, for diagnostics.
        origin: String,
    },
    Signer(Arc<dyn Signer>),
}

impl Credential {
    pub fn pem(pem: impl Into<String>, passphrase: Option<String>) -> Self {
        Credential::Pem {
            pem: Zeroizing::new(pem.into()),
            passphrase: passphrase.map(Zeroizing::new),
            origin: "inline".to_string(),
        }
    }

    /// Read a key file. The key is parsed later, during the handshake.
    pub fn from_file(path: &Path, passphrase: Option<String>) -> Result<Self, TunnelError> {
        let pem = std::fs::read_to_string(path).map_err(|e| {
            TunnelError::Config(format!("read key file {}: {e}", path.display()))
        })?;
        Ok(Credential::Pem {
            pem: Zeroizing::new(pem),
            passphrase: passphrase.map(Zeroizing::new),
            origin: path.display().to_string(),
        })
    }

    pub fn origin(&self) -> String {
        match self {
            Credential::Pem { origin, .. } => origin.clone(),
            Credential::Signer(signer) => format!("signer ({})", signer.algorithm()),
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::Pem {
                origin, passphrase, ..
            } => f
                .debug_struct("Pem")
                .field("origin", origin)
                .field("encrypted", &passphrase.is_some())
                .finish_non_exhaustive(),
            Credential::Signer(signer) => f.debug_tuple("Signer").field(signer).finish(),
        }
    }
}

/// One way of proving identity to a hop, tried in order.
#[derive(Clone, Debug)]
pub enum Authenticator {
    Key(Credential),
    /// SSH agent reachable at this socket path.
    Agent(PathBuf),
}

/// Explicit credentials first, then the agent if enabled and its socket exists.
pub(crate) fn resolve_authenticators(
    credentials: &[Credential],
    use_agent: bool,
    agent_socket: Option<PathBuf>,
) -> Result<Vec<Authenticator>, TunnelError> {
    let mut authenticators: Vec<Authenticator> = credentials
        .iter()
        .cloned()
        .map(Authenticator::Key)
        .collect();

    if use_agent {
        match agent_socket.filter(|p| !p.as_os_str().is_empty()) {
            Some(path) if path.exists() => authenticators.push(Authenticator::Agent(path)),
            Some(path) => debug!(path = %path.display(), "agent socket not found, skipping agent"),
            None => debug!("agent enabled but no agent socket configured"),
        }
    }

    if authenticators.is_empty() {
        return Err(TunnelError::NoAuth);
    }
    Ok(authenticators)
}
