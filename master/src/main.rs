//! Master - distributed engine coordinator
//!
//! A long-running process that:
//! 1. Accepts slave connections on `slave_port` and keeps each in sync
//!    through an authoritative command history
//! 2. Speaks GTP on stdin/stdout to the upstream controller
//! 3. Aggregates concurrent search results from the whole fleet into a
//!    single move choice
//! 4. Optionally fans slave log streams into stderr via `proxy_port`

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

mod collector;
mod config;
mod engine;
mod genmoves;
mod gtp;
mod protocol;
mod proxy;
mod session;
mod stats;
mod time_control;

use crate::config::Config;
use crate::engine::DistributedEngine;
use crate::protocol::Protocol;

/// Initialize tracing on stderr; stdout belongs to GTP.
///
/// Supports a MASTER_LOG_FORMAT environment variable override:
/// - "text" (default): human-readable format
/// - "json": structured JSON for log collectors
fn init_tracing(level: &str) -> Result<()> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let json_format = std::env::var("MASTER_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json_format {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry.with(fmt::layer().with_writer(std::io::stderr)).init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Configuration errors are the only fatal startup surface besides
    // socket binds; both exit nonzero before any GTP traffic.
    let config = Config::parse().resolve()?;
    init_tracing(&config.log_level)?;

    let slave_port = config.slave_port.expect("validated");
    info!(
        slave_port,
        proxy_port = config.proxy_port,
        max_slaves = config.max_slaves,
        slaves_quit = config.slaves_quit,
        "master starting"
    );

    let protocol = Arc::new(Protocol::new(config.max_slaves));

    let listener = TcpListener::bind(("0.0.0.0", slave_port))
        .await
        .with_context(|| format!("failed to bind slave port {slave_port}"))?;
    info!(port = slave_port, "listening for slaves");
    tokio::spawn(session::run_listener(Arc::clone(&protocol), listener));

    if let Some(port) = config.proxy_port {
        let proxy_listener = TcpListener::bind(("0.0.0.0", port))
            .await
            .with_context(|| format!("failed to bind proxy port {port}"))?;
        info!(port, "listening for slave logs");
        tokio::spawn(proxy::run_listener(proxy_listener));
    }

    let mut engine = DistributedEngine::new(config, protocol);
    gtp::run(&mut engine).await?;

    info!("master stopped");
    Ok(())
}
