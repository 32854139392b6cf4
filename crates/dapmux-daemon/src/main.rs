//! dapmux
//!
//! Serves many debug sessions over one duplex transport: a single accepted
//! TCP connection when a port is given, otherwise stdin/stdout.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

use dapmux_core::SessionConfig;
use dapmux_core::config::{Config, load_config};
use dapmux_core::tracing_init::init_tracing;
use dapmux_daemon::mux::RootConnection;
use dapmux_daemon::session::{AttachedChildLauncher, SessionRegistry};
use dapmux_daemon::transport::{SharedTransport, accept_one};

#[derive(Parser, Debug)]
#[command(name = "dapmux")]
#[command(version, about = "dapmux - debug session multiplexer")]
struct Args {
    /// Port to accept one TCP connection on. Serves on stdin/stdout when omitted.
    #[arg(env = "DAPMUX_PORT")]
    port: Option<u16>,

    /// Host to listen on (overrides the configured listen host).
    #[arg(long, env = "DAPMUX_HOST")]
    host: Option<String>,

    /// Settings file layered over the global settings.
    #[arg(long, env = "DAPMUX_CONFIG")]
    config: Option<PathBuf>,

    /// Log level filter (e.g. "info", "debug", "warn").
    #[arg(long, env = "DAPMUX_LOG_LEVEL")]
    log_level: Option<String>,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long, env = "DAPMUX_LOG_JSON")]
    log_json: bool,
}

impl Args {
    /// Command-line flags win over every other configuration layer.
    fn apply_to(&self, config: &mut Config) {
        if let Some(host) = &self.host {
            config.transport.listen_host.clone_from(host);
        }
        if let Some(level) = &self.log_level {
            config.logging.level.clone_from(level);
        }
        if self.log_json {
            config.logging.json = true;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = load_config(args.config.as_deref())?;
    args.apply_to(&mut config);

    // stdout may be the protocol stream, so logs always go to stderr.
    let level = &config.logging.level;
    init_tracing(
        &format!("dapmux_daemon={level},dapmux_core={level}"),
        config.logging.json,
    );

    info!(
        version = env!("CARGO_PKG_VERSION"),
        port = ?args.port,
        max_frame_bytes = config.transport.max_frame_bytes,
        "Starting dapmux"
    );

    let max_frame_bytes = config.transport.max_frame_bytes;
    match args.port {
        Some(port) => {
            let stream = accept_one(&config.transport.listen_host, port).await?;
            serve(SharedTransport::tcp(stream, max_frame_bytes), &config).await
        }
        None => {
            info!("Serving on stdin/stdout");
            serve(SharedTransport::stdio(max_frame_bytes), &config).await
        }
    }
}

async fn serve<R, W>(transport: SharedTransport<R, W>, config: &Config) -> anyhow::Result<()>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (root, mut tasks) = RootConnection::init(transport, &config.mux);
    let registry = SessionRegistry::new(Arc::clone(&root), Arc::new(AttachedChildLauncher));

    let root_session = registry.create_root_session(SessionConfig::default()).await?;
    root_session
        .on_message(|message| {
            debug!(
                seq = message.seq,
                kind = ?message.kind,
                command = ?message.command(),
                event = ?message.event_name(),
                "Root session message"
            );
        })
        .await?;

    #[cfg(unix)]
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    #[cfg(unix)]
    let sigterm_future = sigterm.recv();
    #[cfg(not(unix))]
    let sigterm_future = std::future::pending::<Option<()>>();

    info!("Session multiplexer ready");

    tokio::select! {
        clean = tasks.closed() => {
            if clean {
                info!("Transport closed by peer");
            } else {
                warn!("Transport reader stopped unexpectedly");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C shutdown signal");
        }
        _ = sigterm_future => {
            info!("Received SIGTERM shutdown signal");
        }
    }

    registry.shutdown().await;
    tasks.abort();

    let stats = root.stats().await;
    info!(
        frames_routed = stats.frames_routed,
        frames_dropped = stats.frames_dropped,
        "dapmux stopped"
    );
    Ok(())
}
