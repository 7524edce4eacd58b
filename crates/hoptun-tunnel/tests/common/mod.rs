//! In-process secure-channel collaborator for integration tests.
//!
//! Each hop is a real TCP server speaking a tiny line protocol:
//!
//! ```text
//! server: HOSTKEY <algorithm> <base64>\n
//! client: <user>\n
//! server: ok\n | denied\n
//! ```
//!
//! Channels opened on a mock session are plain TCP connections made from
//! the test process, and remote listeners are local TCP listeners.

#![allow(dead_code)]

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use hoptun_tunnel::{
    BoxStream, HandshakeError, HandshakeRequest, Handshaker, HostKey, HostKeyPolicy,
    RemoteListener, Session,
};
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

pub const HOST_KEY_ALG: &str = "ssh-ed25519";
pub const HOST_KEY_B64: &str = "AAAAC3NzaC1lZDI1NTE5AAAAIMockHostKey";
/// Users the mock hop servers refuse.
pub const DENIED_USER: &str = "mallory";

pub fn host_key() -> HostKey {
    HostKey::new(HOST_KEY_ALG, HOST_KEY_B64, format!("SHA256:{HOST_KEY_B64}"))
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("hoptun_tunnel=debug")
        .with_test_writer()
        .try_init();
}

/// Start a hop server. Returns its address.
pub async fn start_hop_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(serve_hop(stream));
        }
    });
    addr
}

async fn serve_hop(stream: TcpStream) {
    let mut stream = BufReader::new(stream);
    let greeting = format!("HOSTKEY {HOST_KEY_ALG} {HOST_KEY_B64}\n");
    if stream.get_mut().write_all(greeting.as_bytes()).await.is_err() {
        return;
    }
    let mut user = String::new();
    if stream.read_line(&mut user).await.is_err() {
        return;
    }
    let reply: &[u8] = if user.trim() == DENIED_USER { b"denied\n" } else { b"ok\n" };
    if stream.get_mut().write_all(reply).await.is_err() {
        return;
    }
    // Hold the session open until the client goes away.
    let mut sink = Vec::new();
    let _ = stream.read_to_end(&mut sink).await;
}

/// A server that accepts connections and never speaks.
pub async fn start_silent_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });
    addr
}

pub async fn start_echo_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (mut r, mut w) = stream.split();
                let _ = tokio::io::copy(&mut r, &mut w).await;
            });
        }
    });
    addr
}

#[derive(Default)]
pub struct Stats {
    /// Handshakes per hop index.
    pub handshakes: Mutex<Vec<usize>>,
    /// Hop indexes in the order their sessions were closed.
    pub closes: Mutex<Vec<usize>>,
    pub keepalives: AtomicUsize,
    pub remote_listener_closes: AtomicUsize,
}

impl Stats {
    pub fn handshakes(&self) -> Vec<usize> {
        self.handshakes.lock().clone()
    }

    pub fn closes(&self) -> Vec<usize> {
        self.closes.lock().clone()
    }
}

pub struct MockHandshaker {
    pub stats: Arc<Stats>,
    pub keepalive_ack: bool,
    /// Sessions report an error from `close`.
    pub close_fails: bool,
}

impl MockHandshaker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            stats: Arc::new(Stats::default()),
            keepalive_ack: true,
            close_fails: false,
        })
    }

    pub fn refusing_keepalives() -> Arc<Self> {
        Arc::new(Self {
            stats: Arc::new(Stats::default()),
            keepalive_ack: false,
            close_fails: false,
        })
    }

    pub fn failing_close() -> Arc<Self> {
        Arc::new(Self {
            stats: Arc::new(Stats::default()),
            keepalive_ack: true,
            close_fails: true,
        })
    }
}

fn verify(policy: &HostKeyPolicy, host: &str, port: u16, key: &HostKey) -> Result<(), String> {
    match policy {
        HostKeyPolicy::Callback(cb) => cb.verify(host, port, key).map_err(|e| e.to_string()),
        HostKeyPolicy::KnownHosts(path) => {
            let contents = std::fs::read_to_string(path)
                .map_err(|e| format!("read {}: {e}", path.display()))?;
            let wanted = format!("{host} {} {}", key.algorithm, key.base64);
            if contents.lines().any(|line| line.trim() == wanted) {
                Ok(())
            } else {
                Err(format!("{host} not in {}", path.display()))
            }
        }
    }
}

#[async_trait]
impl Handshaker for MockHandshaker {
    async fn handshake(
        &self,
        stream: BoxStream,
        request: HandshakeRequest,
    ) -> Result<Arc<dyn Session>, HandshakeError> {
        {
            let mut counts = self.stats.handshakes.lock();
            if counts.len() <= request.hop {
                counts.resize(request.hop + 1, 0);
            }
            counts[request.hop] += 1;
        }

        let mut stream = BufReader::new(stream);
        let mut line = String::new();
        stream.read_line(&mut line).await?;
        let mut parts = line.split_whitespace();
        let (Some("HOSTKEY"), Some(alg), Some(b64)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(HandshakeError::Protocol(format!("bad greeting {line:?}")));
        };
        let key = HostKey::new(alg, b64, format!("SHA256:{b64}"));
        verify(&request.host_key, &request.host, request.port, &key).map_err(|reason| {
            HandshakeError::HostKeyRejected {
                host: request.host.clone(),
                reason,
            }
        })?;

        if request.authenticators.is_empty() {
            return Err(HandshakeError::AuthRejected { user: request.user });
        }
        stream
            .get_mut()
            .write_all(format!("{}\n", request.user).as_bytes())
            .await?;
        line.clear();
        stream.read_line(&mut line).await?;
        if line.trim() != "ok" {
            return Err(HandshakeError::AuthRejected { user: request.user });
        }

        Ok(Arc::new(MockSession {
            hop: request.hop,
            control: tokio::sync::Mutex::new(Some(stream.into_inner())),
            closed: AtomicBool::new(false),
            keepalive_ack: self.keepalive_ack,
            close_fails: self.close_fails,
            stats: self.stats.clone(),
        }))
    }
}

pub struct MockSession {
    hop: usize,
    control: tokio::sync::Mutex<Option<BoxStream>>,
    closed: AtomicBool,
    keepalive_ack: bool,
    close_fails: bool,
    stats: Arc<Stats>,
}

impl MockSession {
    fn check_open(&self) -> io::Result<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(io::Error::new(io::ErrorKind::NotConnected, "session closed"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Session for MockSession {
    async fn open_channel(&self, host: &str, port: u16) -> io::Result<BoxStream> {
        self.check_open()?;
        let stream = TcpStream::connect((host, port)).await?;
        Ok(Box::new(stream))
    }

    async fn listen(&self, host: &str, port: u16) -> io::Result<Arc<dyn RemoteListener>> {
        self.check_open()?;
        let listener = TcpListener::bind((host, port)).await?;
        let addr = listener.local_addr()?.to_string();
        Ok(Arc::new(MockRemoteListener {
            listener,
            addr,
            stats: self.stats.clone(),
        }))
    }

    async fn keepalive(&self) -> io::Result<bool> {
        self.check_open()?;
        self.stats.keepalives.fetch_add(1, Ordering::SeqCst);
        Ok(self.keepalive_ack)
    }

    async fn close(&self) -> io::Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "already closed"));
        }
        self.stats.closes.lock().push(self.hop);
        if let Some(mut control) = self.control.lock().await.take() {
            let _ = control.shutdown().await;
        }
        if self.close_fails {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "disconnect failed"));
        }
        Ok(())
    }
}

pub struct MockRemoteListener {
    listener: TcpListener,
    addr: String,
    stats: Arc<Stats>,
}

#[async_trait]
impl RemoteListener for MockRemoteListener {
    async fn accept(&self) -> io::Result<(BoxStream, String)> {
        let (stream, peer) = self.listener.accept().await?;
        Ok((Box::new(stream), peer.to_string()))
    }

    fn local_addr(&self) -> String {
        self.addr.clone()
    }

    async fn close(&self) -> io::Result<()> {
        self.stats.remote_listener_closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
