//! tape-proxy: HTTP record/replay proxy.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ net::Listener ──▶ http::server ──┬──▶ control (prefix)
//!                                                       │
//!                                                       └──▶ proxy::ProxyCore
//!                                                              │
//!                                     record: upstream::Forwarder ──▶ Upstream
//!                                             └─ tape::TapeStore (append + save)
//!                                     replay: matching::RecordMatcher
//!                                             └─ session (find + remove)
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

use tape_proxy::config::{read_config, validate_config, Mode, ProxyConfig, UpstreamConfig};
use tape_proxy::lifecycle::{shutdown_signal, Shutdown};
use tape_proxy::net::Listener;
use tape_proxy::observability::{init_logging, init_metrics};
use tape_proxy::HttpServer;

#[derive(Parser, Debug)]
#[command(name = "tape-proxy")]
#[command(about = "HTTP proxy that records exchanges to tapes and replays them", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// `record` or `replay`
    #[arg(short, long)]
    mode: Option<Mode>,

    /// Tape root directory
    #[arg(short, long)]
    tapes: Option<PathBuf>,

    #[arg(short, long)]
    port: Option<u16>,

    /// Listen host or IP
    #[arg(short, long)]
    bind: Option<String>,

    /// Upstream base URL (`scheme://host[:port]`), record mode only
    #[arg(short, long)]
    upstream: Option<String>,

    #[arg(long)]
    default_tape: Option<String>,

    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    fn apply(self, config: &mut ProxyConfig) {
        if let Some(mode) = self.mode {
            config.mode = mode;
        }
        if let Some(root) = self.tapes {
            config.tapes.root = root;
        }
        if self.bind.is_some() || self.port.is_some() {
            let (host, port) = split_bind_address(&config.listener.bind_address);
            let host = self.bind.unwrap_or(host);
            let port = self.port.map(|p| p.to_string()).unwrap_or(port);
            config.listener.bind_address = join_bind_address(&host, &port);
        }
        if let Some(url) = self.upstream {
            config.upstream = Some(UpstreamConfig { url });
        }
        if let Some(name) = self.default_tape {
            config.tapes.default_tape = name;
        }
        if let Some(level) = self.log_level {
            config.observability.log_level = level;
        }
    }
}

fn split_bind_address(address: &str) -> (String, String) {
    match address.rsplit_once(':') {
        Some((host, port)) => (
            host.trim_start_matches('[').trim_end_matches(']').to_string(),
            port.to_string(),
        ),
        None => (address.to_string(), "8080".to_string()),
    }
}

fn join_bind_address(host: &str, port: &str) -> String {
    if host.contains(':') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => read_config(path)?,
        None => ProxyConfig::default(),
    };
    cli.apply(&mut config);

    init_logging(&config.observability.log_level);
    tracing::info!("tape-proxy v{} starting", env!("CARGO_PKG_VERSION"));

    if let Err(errors) = validate_config(&config) {
        for error in &errors {
            tracing::error!(field = error.field, message = %error.message, "Invalid configuration");
        }
        return Err(format!("{} configuration error(s)", errors.len()).into());
    }

    tracing::info!(
        mode = %config.mode,
        bind_address = %config.listener.bind_address,
        tape_root = ?config.tapes.root,
        upstream = config.upstream.as_ref().map(|u| u.url.as_str()).unwrap_or("-"),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = Listener::bind(&config.listener).await?;
    let server = HttpServer::new(config)?;

    let shutdown = Shutdown::new();
    let receiver = shutdown.subscribe();
    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown.trigger();
    });

    server.run(listener, receiver).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
