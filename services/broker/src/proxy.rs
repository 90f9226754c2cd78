//! Upstream plumbing: address forms and the per-request HTTP/1.1 client
//! over unix or tcp streams.

use anyhow::{bail, Context, Result};
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DIAL_TIMEOUT: Duration = Duration::from_secs(10);

/// Where the broker forwards to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamAddr {
    Unix(PathBuf),
    Tcp(String),
}

impl UpstreamAddr {
    /// Accepts `unix://<path>`, `unix:<path>`, a bare path, or
    /// `tcp://host:port`.
    pub fn parse(addr: &str) -> Result<Self> {
        let addr = addr.trim();
        if let Some(path) = addr.strip_prefix("unix://") {
            return Ok(Self::Unix(PathBuf::from(path)));
        }
        if let Some(path) = addr.strip_prefix("unix:") {
            return Ok(Self::Unix(PathBuf::from(path)));
        }
        if let Some(host) = addr.strip_prefix("tcp://") {
            return Ok(Self::Tcp(host.to_string()));
        }
        if addr.starts_with('/') {
            return Ok(Self::Unix(PathBuf::from(addr)));
        }
        bail!("unsupported upstream address {addr:?}")
    }
}

/// Listen socket forms; only unix is supported for serving.
pub fn parse_listen_addr(addr: &str) -> Result<PathBuf> {
    let addr = addr.trim();
    if let Some(path) = addr.strip_prefix("unix://") {
        return Ok(PathBuf::from(path));
    }
    if let Some(path) = addr.strip_prefix("unix:") {
        return Ok(PathBuf::from(path));
    }
    if addr.starts_with('/') {
        return Ok(PathBuf::from(addr));
    }
    bail!("unsupported listen protocol in {addr:?} (unix sockets only)")
}

/// Remove a stale socket file and make sure the parent directory exists.
pub fn ensure_socket_absent(path: &Path) -> Result<()> {
    if path.exists() {
        std::fs::remove_file(path)
            .with_context(|| format!("removing stale socket {}", path.display()))?;
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    Ok(())
}

/// One-connection-per-request HTTP/1.1 client. The runtime API is local and
/// low-volume; a fresh handshake per request keeps streaming semantics
/// simple (the connection task drives the response body to completion).
pub struct UpstreamClient {
    target: UpstreamAddr,
}

impl UpstreamClient {
    #[must_use]
    pub fn new(target: UpstreamAddr) -> Self {
        Self { target }
    }

    /// Send a request upstream and return the streaming response.
    pub async fn send(&self, req: Request<Full<Bytes>>) -> Result<Response<Incoming>> {
        match &self.target {
            UpstreamAddr::Unix(path) => {
                let stream = tokio::time::timeout(
                    DIAL_TIMEOUT,
                    tokio::net::UnixStream::connect(path),
                )
                .await
                .with_context(|| format!("dial timeout for {}", path.display()))?
                .with_context(|| format!("connecting to {}", path.display()))?;
                self.send_on(stream, req).await
            }
            UpstreamAddr::Tcp(host) => {
                let stream =
                    tokio::time::timeout(DIAL_TIMEOUT, tokio::net::TcpStream::connect(host))
                        .await
                        .with_context(|| format!("dial timeout for {host}"))?
                        .with_context(|| format!("connecting to {host}"))?;
                self.send_on(stream, req).await
            }
        }
    }

    async fn send_on<S>(&self, stream: S, req: Request<Full<Bytes>>) -> Result<Response<Incoming>>
    where
        S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + 'static,
    {
        let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
            .await
            .context("upstream handshake")?;
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                tracing::debug!(error = %e, "upstream connection closed");
            }
        });
        sender.send_request(req).await.context("upstream request")
    }
}
