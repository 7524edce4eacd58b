//! russh client handler: host-key verification and routing of forwarded
//! connections to their remote listeners.

use std::collections::HashMap;
use std::sync::Arc;

use hoptun_tunnel::{HostKey, HostKeyPolicy};
use parking_lot::Mutex;
use russh::Channel;
use russh::client::{self, Msg};
use russh::keys::ssh_key::{HashAlg, PublicKey};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// A forwarded channel together with its originator `host:port`.
pub(crate) type Forwarded = (Channel<Msg>, String);

/// Remote listeners of one session, keyed by bound address and port.
#[derive(Default)]
pub(crate) struct ForwardRoutes {
    routes: Mutex<HashMap<(String, u32), mpsc::Sender<Forwarded>>>,
}

impl ForwardRoutes {
    pub(crate) fn insert(&self, address: String, port: u32, tx: mpsc::Sender<Forwarded>) {
        self.routes.lock().insert((address, port), tx);
    }

    pub(crate) fn remove(&self, address: &str, port: u32) {
        self.routes.lock().remove(&(address.to_string(), port));
    }

    /// Exact match first; servers may report the bound address differently
    /// than requested, so fall back to the port alone.
    fn lookup(&self, address: &str, port: u32) -> Option<mpsc::Sender<Forwarded>> {
        let routes = self.routes.lock();
        if let Some(tx) = routes.get(&(address.to_string(), port)) {
            return Some(tx.clone());
        }
        routes
            .iter()
            .find(|((_, p), _)| *p == port)
            .map(|(_, tx)| tx.clone())
    }
}

pub(crate) struct ClientHandler {
    host: String,
    port: u16,
    policy: HostKeyPolicy,
    /// Why the host key was rejected, read back after a failed connect.
    rejection: Arc<Mutex<Option<String>>>,
    routes: Arc<ForwardRoutes>,
}

impl ClientHandler {
    pub(crate) fn new(
        host: String,
        port: u16,
        policy: HostKeyPolicy,
        rejection: Arc<Mutex<Option<String>>>,
        routes: Arc<ForwardRoutes>,
    ) -> Self {
        Self {
            host,
            port,
            policy,
            rejection,
            routes,
        }
    }

    fn verify(&self, key: &PublicKey) -> Result<(), String> {
        match &self.policy {
            HostKeyPolicy::Callback(callback) => {
                let key = host_key(key)?;
                callback
                    .verify(&self.host, self.port, &key)
                    .map_err(|e| e.to_string())
            }
            HostKeyPolicy::KnownHosts(path) => {
                match russh::keys::check_known_hosts_path(&self.host, self.port, key, path) {
                    Ok(true) => Ok(()),
                    Ok(false) => Err(format!(
                        "{} not found in {}",
                        self.host,
                        path.display()
                    )),
                    Err(e) => Err(e.to_string()),
                }
            }
        }
    }
}

impl client::Handler for ClientHandler {
    type Error = russh::Error;

    async fn check_server_key(&mut self, server_public_key: &PublicKey) -> Result<bool, Self::Error> {
        match self.verify(server_public_key) {
            Ok(()) => {
                debug!(host = %self.host, port = self.port, "host key accepted");
                Ok(true)
            }
            Err(reason) => {
                warn!(host = %self.host, port = self.port, %reason, "host key rejected");
                *self.rejection.lock() = Some(reason);
                Ok(false)
            }
        }
    }

    fn server_channel_open_forwarded_tcpip(
        &mut self,
        channel: Channel<Msg>,
        connected_address: &str,
        connected_port: u32,
        originator_address: &str,
        originator_port: u32,
        _session: &mut client::Session,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send {
        let route = self.routes.lookup(connected_address, connected_port);
        let origin = format!("{originator_address}:{originator_port}");
        let bound = format!("{connected_address}:{connected_port}");
        async move {
            let Some(tx) = route else {
                debug!(%bound, "forwarded connection for unknown listener");
                tokio::spawn(async move {
                    let _ = channel.close().await;
                });
                return Ok(());
            };
            // Never wait on the listener here: the session loop must keep running.
            if let Err(e) = tx.try_send((channel, origin)) {
                debug!(%bound, "remote listener not accepting, dropping connection");
                let (channel, _) = e.into_inner();
                tokio::spawn(async move {
                    let _ = channel.close().await;
                });
            }
            Ok(())
        }
    }
}

/// Backend-neutral view of a server key.
pub(crate) fn host_key(key: &PublicKey) -> Result<HostKey, String> {
    let openssh = key.to_openssh().map_err(|e| e.to_string())?;
    let mut parts = openssh.split_whitespace();
    let algorithm = parts.next().unwrap_or_default().to_string();
    let base64 = parts.next().unwrap_or_default().to_string();
    let fingerprint = key.fingerprint(HashAlg::Sha256).to_string();
    Ok(HostKey::new(algorithm, base64, fingerprint))
}
