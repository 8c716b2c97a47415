//! reqwest-backed [`Network`].
//!
//! A fresh client is built for every attempt so connections never
//! outlive the attempt that opened them.

use crate::errors::{ErrorKind, ProbeError};
use crate::measurements::ThroughputObservation;
use crate::speedtest::connection::{measure_tcp_connect, resolve_host};
use crate::speedtest::network::{ByteSink, Network, TransferLimits};
use async_trait::async_trait;
use http::header::{CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE};
use log::debug;
use reqwest::Client;
use std::time::Duration;
use tokio::time::{timeout, timeout_at, Instant};
use url::Url;

pub(crate) const UA: &str =
    concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Default)]
pub struct HttpNetwork;

impl HttpNetwork {
    pub fn new() -> Self {
        Self
    }

    fn client(limits: &TransferLimits) -> Result<Client, ProbeError> {
        // reqwest's connect timeout spans both the TCP connect and the
        // TLS handshake.
        Client::builder()
            .connect_timeout(limits.connect + limits.tls_handshake)
            .timeout(limits.overall)
            .user_agent(UA)
            .build()
            .map_err(|e| {
                ProbeError::new(ErrorKind::Config, "cannot build HTTP client")
                    .with_source(e)
            })
    }
}

#[async_trait]
impl Network for HttpNetwork {
    async fn tcp_connect(
        &self,
        host: &str,
        port: u16,
        connect_timeout: Duration,
    ) -> Result<Duration, ProbeError> {
        let address = timeout(connect_timeout, resolve_host(host))
            .await
            .map_err(|_| {
                ProbeError::new(
                    ErrorKind::Timeout,
                    format!("resolving {} took longer than {:?}", host, connect_timeout),
                )
            })??;

        measure_tcp_connect(address, port, connect_timeout).await
    }

    async fn head(
        &self,
        url: &Url,
        request_timeout: Duration,
    ) -> Result<Duration, ProbeError> {
        let client = Self::client(&TransferLimits::overall_only(request_timeout))?;

        let start = Instant::now();
        let response = client.head(url.clone()).send().await?;
        let elapsed = start.elapsed();

        debug!("HEAD {} -> {} in {:?}", url, response.status(), elapsed);

        Ok(elapsed)
    }

    async fn download(
        &self,
        url: &Url,
        limits: &TransferLimits,
        on_bytes: ByteSink<'_>,
    ) -> Result<ThroughputObservation, ProbeError> {
        let client = Self::client(limits)?;
        let start = Instant::now();

        let request = client.get(url.clone()).header(CACHE_CONTROL, "no-cache");
        let mut response = timeout(limits.until_headers(), request.send())
            .await
            .map_err(|_| {
                ProbeError::new(
                    ErrorKind::Timeout,
                    format!(
                        "no response headers from {} within {:?}",
                        url,
                        limits.until_headers()
                    ),
                )
            })??;

        let status = response.status();
        if !status.is_success() {
            return Err(ProbeError::server_rejected(status.as_u16(), url.as_str()));
        }

        let deadline = limits.read_cap.map(|cap| start + cap);
        let mut bytes: u64 = 0;

        loop {
            let next = match deadline {
                Some(deadline) => {
                    match timeout_at(deadline, response.chunk()).await {
                        Ok(next) => next,
                        Err(_) => {
                            debug!("Read cap reached for {} after {} bytes", url, bytes);
                            break;
                        }
                    }
                }
                None => response.chunk().await,
            };

            match next? {
                Some(chunk) => {
                    let read = chunk.len() as u64;
                    bytes += read;
                    on_bytes(read);
                }
                None => break,
            }
        }

        Ok(ThroughputObservation::new(bytes, start.elapsed()))
    }

    async fn upload(
        &self,
        url: &Url,
        payload: Vec<u8>,
        limits: &TransferLimits,
    ) -> Result<ThroughputObservation, ProbeError> {
        let client = Self::client(limits)?;
        let length = payload.len() as u64;

        // The header budget would start once the body is written, which
        // reqwest does not expose; the overall budget bounds the upload.
        let start = Instant::now();
        let response = client
            .post(url.clone())
            .header(CONTENT_TYPE, "application/octet-stream")
            .header(CONTENT_LENGTH, length)
            .body(payload)
            .send()
            .await?;
        let elapsed = start.elapsed();

        let status = response.status();
        if !status.is_success() {
            return Err(ProbeError::server_rejected(status.as_u16(), url.as_str()));
        }

        if let Err(e) = response.bytes().await {
            debug!("Discarding unreadable response body from {}: {}", url, e);
        }

        Ok(ThroughputObservation::new(length, elapsed))
    }
}
