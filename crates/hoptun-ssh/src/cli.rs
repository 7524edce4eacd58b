//! CLI module for running and checking a tunnel configuration.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use hoptun_config::{CliOverrides, Config, ConfigError, apply_overrides, load_config, validate_config};
use hoptun_core::io::relay_bidirectional;
use hoptun_tunnel::{ForwardListener, Listener, Tunnel, TunnelError};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::session::SshHandshaker;
use crate::setup::{resolve_hops, tunnel_from_config};

/// CLI arguments for `hoptun run`.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "hoptun-run",
    about = "Build the hop chain and serve the configured forwards until interrupted"
)]
pub struct RunArgs {
    /// Config file path (toml, json, jsonc, yaml).
    #[arg(short, long, default_value = "hoptun.toml")]
    pub config: PathBuf,

    #[command(flatten)]
    pub overrides: CliOverrides,
}

/// CLI arguments for `hoptun check`.
#[derive(Parser, Debug, Clone)]
#[command(name = "hoptun-check", about = "Validate a config and print the resolved hop chain")]
pub struct CheckArgs {
    /// Config file path (toml, json, jsonc, yaml).
    #[arg(short, long, default_value = "hoptun.toml")]
    pub config: PathBuf,

    #[command(flatten)]
    pub overrides: CliOverrides,
}

/// Load, override and validate a configuration file.
pub fn load(path: &Path, overrides: &CliOverrides) -> Result<Config, ConfigError> {
    let mut config = load_config(path)?;
    apply_overrides(&mut config, overrides).map_err(ConfigError::Validation)?;
    validate_config(&config)?;
    Ok(config)
}

/// Run the tunnel with the given CLI arguments.
pub async fn run(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = load(&args.config, &args.overrides)?;

    init_tracing(config.logging.level.as_deref());

    let shutdown = CancellationToken::new();
    let shutdown_signal = shutdown.clone();

    tokio::spawn(async move {
        shutdown_signal_handler().await;
        info!("shutdown signal received");
        shutdown_signal.cancel();
    });

    let tunnel = tunnel_from_config(&config, Arc::new(SshHandshaker::new()))?;
    let served = serve(&tunnel, &config, &shutdown).await;
    let closed = tunnel.close().await;
    served?;
    closed?;
    Ok(())
}

async fn serve(
    tunnel: &Tunnel,
    config: &Config,
    shutdown: &CancellationToken,
) -> Result<(), TunnelError> {
    tokio::select! {
        _ = shutdown.cancelled() => return Ok(()),
        result = tunnel.connect() => result?,
    }
    info!(hops = tunnel.hop_count(), "tunnel established");

    let mut forwards: Vec<ForwardListener> = Vec::new();
    for forward in &config.forwards {
        let listener = tunnel.forward(&forward.local, &forward.remote).await?;
        info!(
            name = forward.name.as_deref().unwrap_or("-"),
            listen = %listener.local_addr(),
            remote = %forward.remote,
            "forward ready"
        );
        forwards.push(listener);
    }

    let idle = Some(Duration::from_secs(config.tunnel.forward_idle_timeout_secs))
        .filter(|d| !d.is_zero());
    let buffer = config.tunnel.relay_buffer_size;
    for remote in &config.remote_forwards {
        let listener = tunnel.listen("tcp", &remote.remote).await?;
        info!(
            name = remote.name.as_deref().unwrap_or("-"),
            listen = %listener.local_addr(),
            local = %remote.local,
            "remote forward ready"
        );
        let span = info_span!("remote_forward", listen = %listener.local_addr(), local = %remote.local);
        tokio::spawn(
            serve_remote_forward(listener, remote.local.clone(), idle, buffer, shutdown.clone())
                .instrument(span),
        );
    }

    shutdown.cancelled().await;
    for forward in forwards {
        let _ = forward.close().await;
    }
    Ok(())
}

/// Bridge every connection accepted on the last hop to a local target.
async fn serve_remote_forward(
    listener: Listener,
    local: String,
    idle: Option<Duration>,
    buffer: usize,
    shutdown: CancellationToken,
) {
    loop {
        let conn = tokio::select! {
            _ = shutdown.cancelled() => break,
            result = listener.accept() => match result {
                Ok(conn) => conn,
                Err(TunnelError::ListenerClosed) => break,
                Err(e) => {
                    warn!(error = %e, "remote accept failed");
                    break;
                }
            },
        };
        let local = local.clone();
        let span = info_span!("bridge", peer = %conn.remote_addr());
        tokio::spawn(
            async move {
                let target = match TcpStream::connect(&local).await {
                    Ok(stream) => stream,
                    Err(e) => {
                        debug!(error = %e, "local dial failed");
                        return;
                    }
                };
                let _ = target.set_nodelay(true);
                match relay_bidirectional(conn, target, idle, buffer).await {
                    Ok((up, down)) => debug!(up, down, "remote forward finished"),
                    Err(e) => debug!(error = %e, "remote forward relay ended with error"),
                }
            }
            .instrument(span),
        );
    }
    let _ = listener.close().await;
}

/// Validate the configuration and print the resolved chain.
pub async fn check(args: CheckArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = load(&args.config, &args.overrides)?;
    let hops = resolve_hops(&config)?;

    println!("config ok: {}", args.config.display());
    for (i, hop) in hops.iter().enumerate() {
        println!("  hop {i}: {hop}");
    }
    for forward in &config.forwards {
        println!("  forward {} -> {}", forward.local, forward.remote);
    }
    for remote in &config.remote_forwards {
        println!("  remote forward {} -> {}", remote.remote, remote.local);
    }
    Ok(())
}

async fn shutdown_signal_handler() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

fn init_tracing(level: Option<&str>) {
    let level = level.unwrap_or(hoptun_core::DEFAULT_LOG_LEVEL);
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stderr))
        .init();
}
