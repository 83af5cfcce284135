//! Port and HTTP reachability probes

use async_trait::async_trait;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, instrument};

/// Per-attempt connect timeout used by [`TcpProber`]
pub const CONNECT_TIMEOUT: Duration = Duration::from_millis(500);

/// Network capability consumed by steps that manage servers
#[async_trait]
pub trait NetworkProber: Send + Sync {
    /// Something accepts TCP connections on `host:port`
    async fn is_port_open(&self, port: u16, host: &str) -> bool;

    /// Nothing is listening on `port` locally, so a server could bind it
    async fn is_port_available(&self, port: u16) -> bool;

    /// An HTTP request to `url` got any response
    async fn is_http_reachable(&self, url: &str) -> bool;

    /// Poll [`is_port_open`](Self::is_port_open) every `interval` until it
    /// succeeds or `timeout` elapses
    async fn wait_for_port(
        &self,
        port: u16,
        host: &str,
        timeout: Duration,
        interval: Duration,
    ) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.is_port_open(port, host).await {
                return true;
            }
            if tokio::time::Instant::now() + interval > deadline {
                return false;
            }
            tokio::time::sleep(interval).await;
        }
    }
}

/// Probes with real sockets and `reqwest`
#[derive(Debug, Clone)]
pub struct TcpProber {
    client: reqwest::Client,
    connect_timeout: Duration,
}

impl Default for TcpProber {
    fn default() -> Self {
        Self::new()
    }
}

impl TcpProber {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(3))
            .build()
            .unwrap_or_default();
        Self {
            client,
            connect_timeout: CONNECT_TIMEOUT,
        }
    }
}

#[async_trait]
impl NetworkProber for TcpProber {
    #[instrument(level = "trace", skip(self))]
    async fn is_port_open(&self, port: u16, host: &str) -> bool {
        matches!(
            tokio::time::timeout(self.connect_timeout, TcpStream::connect((host, port))).await,
            Ok(Ok(_))
        )
    }

    #[instrument(level = "trace", skip(self))]
    async fn is_port_available(&self, port: u16) -> bool {
        match TcpListener::bind(("127.0.0.1", port)).await {
            Ok(listener) => {
                drop(listener);
                true
            }
            Err(e) => {
                debug!("Port {} unavailable: {}", port, e);
                false
            }
        }
    }

    #[instrument(level = "debug", skip(self))]
    async fn is_http_reachable(&self, url: &str) -> bool {
        match self.client.get(url).send().await {
            Ok(response) => {
                debug!(status = %response.status(), "HTTP probe answered");
                true
            }
            Err(e) => {
                debug!("HTTP probe failed: {}", e);
                false
            }
        }
    }
}

/// First available port among `preferred` then `fallbacks`, in order.
/// Probing stops at the first hit.
#[instrument(level = "debug", skip(prober))]
pub async fn find_free_port(
    prober: &dyn NetworkProber,
    preferred: u16,
    fallbacks: &[u16],
) -> Option<u16> {
    for port in std::iter::once(preferred).chain(fallbacks.iter().copied()) {
        if prober.is_port_available(port).await {
            debug!(port, "Selected free port");
            return Some(port);
        }
        debug!(port, "Port in use, trying next");
    }
    None
}
