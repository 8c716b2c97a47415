//! The I/O seam every strategy talks through.
//!
//! Strategies never open sockets themselves; they call a [`Network`]. The
//! production implementation is [`crate::speedtest::http::HttpNetwork`];
//! tests substitute a scripted one.

use crate::config::HttpTimeouts;
use crate::errors::ProbeError;
use crate::measurements::ThroughputObservation;
use async_trait::async_trait;
use std::time::Duration;
use url::Url;

/// Time budgets for one HTTP transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferLimits {
    pub connect: Duration,
    pub tls_handshake: Duration,
    pub response_header: Duration,
    /// Budget for the whole request, body included.
    pub overall: Duration,
    /// Stop reading a download body after this long, keeping what arrived.
    pub read_cap: Option<Duration>,
}

impl TransferLimits {
    pub fn new(timeouts: &HttpTimeouts, overall: Duration) -> Self {
        Self {
            connect: Duration::from_millis(timeouts.connect_ms),
            tls_handshake: Duration::from_millis(timeouts.tls_handshake_ms),
            response_header: Duration::from_millis(timeouts.response_header_ms),
            overall,
            read_cap: None,
        }
    }

    /// Limits with only an overall budget; the phase budgets equal it.
    pub fn overall_only(overall: Duration) -> Self {
        Self {
            connect: overall,
            tls_handshake: overall,
            response_header: overall,
            overall,
            read_cap: None,
        }
    }

    /// Stop reading a body after `cap` and report what arrived.
    pub fn with_read_cap(mut self, cap: Duration) -> Self {
        self.read_cap = Some(cap);
        self
    }

    /// Everything that may pass before response headers arrive.
    pub fn until_headers(&self) -> Duration {
        self.connect + self.tls_handshake + self.response_header
    }
}

/// Receives byte counts as a download body streams in.
pub type ByteSink<'a> = &'a (dyn Fn(u64) + Send + Sync);

/// Everything the strategies need from the network.
///
/// Implemented over reqwest and tokio sockets by
/// [`crate::speedtest::http::HttpNetwork`].
#[async_trait]
pub trait Network: Send + Sync {
    /// Time a TCP connect to `host:port`.
    async fn tcp_connect(
        &self,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> Result<Duration, ProbeError>;

    /// Time a HEAD request to `url`, from send to response.
    async fn head(
        &self,
        url: &Url,
        timeout: Duration,
    ) -> Result<Duration, ProbeError>;

    /// GET `url` and read the body, reporting each chunk to `on_bytes`.
    ///
    /// The returned observation covers the time from sending the request
    /// to the end of the body (or the read cap).
    async fn download(
        &self,
        url: &Url,
        limits: &TransferLimits,
        on_bytes: ByteSink<'_>,
    ) -> Result<ThroughputObservation, ProbeError>;

    /// POST `payload` to `url` as a raw octet stream.
    async fn upload(
        &self,
        url: &Url,
        payload: Vec<u8>,
        limits: &TransferLimits,
    ) -> Result<ThroughputObservation, ProbeError>;
}

/// Parse one of the configured endpoint strings.
pub fn parse_url(raw: &str) -> Result<Url, ProbeError> {
    Url::parse(raw).map_err(|e| {
        ProbeError::config(format!("invalid endpoint {}", raw)).with_source(e)
    })
}
