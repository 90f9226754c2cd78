//! devkit-broker entry point.
//!
//! Initialises tracing, loads configuration from environment variables
//! (prefixed with `BROKER_`), prepares the listen socket, and serves the
//! policy-enforcing reverse proxy over the container-runtime socket.

mod policy;
mod proxy;
mod registry;
mod server;

use std::os::unix::fs::PermissionsExt;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

use crate::policy::AllowPolicy;
use crate::proxy::{ensure_socket_absent, parse_listen_addr, UpstreamAddr, UpstreamClient};
use crate::registry::ContainerRegistry;
use crate::server::BrokerState;

/// Broker configuration loaded from environment variables via `envy`.
///
/// Each field maps to `BROKER_<FIELD>`:
///   - `BROKER_LISTEN`          (default `unix:///var/run/devkit-broker.sock`)
///   - `BROKER_UPSTREAM`        (default `unix:///var/run/docker.sock`)
///   - `BROKER_ALLOWED_IMAGES`  (comma list, optional per-image `:tag`)
///   - `BROKER_ALLOWED_IMAGE` + `BROKER_ALLOWED_TAG` (legacy single-image)
///   - `BROKER_ALLOW_PULLS`     (default false)
///   - `BROKER_ATTACH_NETWORKS` / `BROKER_ATTACH_NETWORK`
///   - `BROKER_LOG_LEVEL`       (default `info`)
#[derive(Debug, Deserialize)]
struct Config {
    #[serde(default = "default_listen")]
    listen: String,
    #[serde(default = "default_upstream")]
    upstream: String,
    allowed_images: Option<String>,
    allowed_image: Option<String>,
    allowed_tag: Option<String>,
    #[serde(default)]
    allow_pulls: bool,
    attach_networks: Option<String>,
    attach_network: Option<String>,
    log_level: Option<String>,
}

fn default_listen() -> String {
    "unix:///var/run/devkit-broker.sock".to_string()
}

fn default_upstream() -> String {
    "unix:///var/run/docker.sock".to_string()
}

impl Config {
    fn attach_network_list(&self) -> Vec<String> {
        let mut out = Vec::new();
        if let Some(csv) = &self.attach_networks {
            for part in csv.split(',') {
                let part = part.trim();
                if !part.is_empty() {
                    out.push(part.to_string());
                }
            }
        }
        if let Some(single) = &self.attach_network {
            let single = single.trim();
            if !single.is_empty() {
                out.push(single.to_string());
            }
        }
        out
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config: Config = envy::prefixed("BROKER_")
        .from_env()
        .context("failed to load config from BROKER_* env vars")?;

    let filter = config
        .log_level
        .as_deref()
        .map(EnvFilter::new)
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let listen_path = parse_listen_addr(&config.listen)?;
    ensure_socket_absent(&listen_path).context("unable to prepare listen socket")?;

    let policy = AllowPolicy::from_parts(
        config.allowed_images.as_deref(),
        config.allowed_image.as_deref(),
        config.allowed_tag.as_deref(),
        config.allow_pulls,
    );
    let upstream = UpstreamAddr::parse(&config.upstream).context("invalid upstream address")?;
    let state = Arc::new(BrokerState {
        policy,
        registry: ContainerRegistry::new(),
        client: UpstreamClient::new(upstream),
        attach_networks: config.attach_network_list(),
    });

    let listener = tokio::net::UnixListener::bind(&listen_path)
        .with_context(|| format!("failed to listen on {}", listen_path.display()))?;
    // Agents inside containers connect as unprivileged users.
    if let Err(e) = std::fs::set_permissions(&listen_path, std::fs::Permissions::from_mode(0o666))
    {
        tracing::warn!(error = %e, "failed to adjust socket permissions");
    }

    tracing::info!(
        listen = %config.listen,
        upstream = %config.upstream,
        "broker listening"
    );

    let app = axum::Router::new()
        .fallback(server::handle)
        .with_state(state);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("broker shut down");
    Ok(())
}

/// Wait for SIGINT for graceful shutdown.
async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        tracing::error!("failed to install Ctrl-C handler");
    }
    tracing::info!("received shutdown signal");
}
