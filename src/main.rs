//! portal-helper - Captive portal login helper
//!
//! Serves a network management daemon over line-delimited JSON on
//! stdin/stdout: the caller submits authentication requests for connections
//! stuck behind a captive portal, the embedding shell hosts the browser
//! surface and streams its navigation events back in, and the helper
//! reports how each login flow ended.

mod config;
mod decision;
mod models;
mod queue;
mod security;
mod service;
mod session;
mod surface;
mod utils;

use anyhow::{Context, Result};
use clap::Parser;
use service::{PortalService, ServiceRequest};
use surface::ChannelSurfaceFactory;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "portal-helper")]
#[command(about = "Captive Portal Login Helper", long_about = None)]
struct Args {
    /// Force a login session for a dummy connection at startup (for testing)
    #[arg(short, long)]
    demo: bool,

    /// Config file path (default: portal-helper.toml)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let cfg = config::Config::load(args.config.as_deref())?;

    // Initialize logging on stderr; stdout carries the wire protocol
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&cfg.logging.level)),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("portal-helper v0.1.0 - Captive Portal Login Helper");
    tracing::info!(
        check_url = %cfg.connectivity.check_url(),
        "connectivity probe configured"
    );

    let (request_tx, request_rx) = mpsc::unbounded_channel();
    let (signal_tx, mut signal_rx) = mpsc::unbounded_channel();

    let factory = ChannelSurfaceFactory::new(signal_tx.clone());
    let service = PortalService::new(&cfg, Box::new(factory), signal_tx);

    // Launched by hand there is no caller yet, so queue a session for a
    // dummy connection on the default URL.
    if args.demo {
        request_tx
            .send(ServiceRequest::Authenticate {
                connection: "/connection/demo".to_string(),
                url: String::new(),
                timestamp: 0,
            })
            .context("failed to queue demo session")?;
    }

    // Outbound signals, one JSON object per line.
    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(signal) = signal_rx.recv().await {
            let mut line = match serde_json::to_vec(&signal) {
                Ok(line) => line,
                Err(e) => {
                    tracing::error!("failed to encode signal: {}", e);
                    continue;
                }
            };
            line.push(b'\n');
            if stdout.write_all(&line).await.is_err() {
                break;
            }
            let _ = stdout.flush().await;
        }
    });

    // Inbound requests from the caller and the embedding shell.
    let reader = tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<ServiceRequest>(line) {
                Ok(request) => {
                    if request_tx.send(request).is_err() {
                        break;
                    }
                }
                Err(e) => tracing::warn!("ignoring malformed request: {}", e),
            }
        }
    });

    service.run(request_rx).await;

    reader.abort();
    let _ = writer.await;

    Ok(())
}
