//! Aggregate throughput over several concurrent connections.
//!
//! Each connection is its own task. Connection `i` uses server
//! `i % servers.len()`. The tasks share one lock-guarded accumulator and
//! the batch is timed from the first spawn until the last task has
//! finished, successfully or not.

use crate::config::MultiConnectionConfig;
use crate::errors::{ErrorKind, ProbeError};
use crate::measurements::calculate_speed_mbps;
use crate::speedtest::network::{parse_url, Network, TransferLimits};
use crate::speedtest::sampler::random_payload;
use crate::speedtest::Direction;
use futures::future::join_all;
use log::{debug, info, warn};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use url::Url;

#[derive(Debug, Default)]
struct Accumulator {
    total_bytes: u64,
    errors: Vec<ProbeError>,
}

#[derive(Clone, Default)]
struct Shared(Arc<Mutex<Accumulator>>);

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Accumulator> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn add_bytes(&self, bytes: u64) {
        self.lock().total_bytes += bytes;
    }

    fn add_error(&self, error: ProbeError) {
        self.lock().errors.push(error);
    }
}

/// Fixed number of concurrent transfers spread over the configured servers.
#[derive(Clone)]
pub struct MultiConnection {
    config: MultiConnectionConfig,
    network: Arc<dyn Network>,
}

impl MultiConnection {
    pub fn new(config: MultiConnectionConfig, network: Arc<dyn Network>) -> Self {
        Self { config, network }
    }

    /// `{base}/__down?bytes=N` for every connection.
    pub fn download_urls(&self) -> Result<Vec<Url>, ProbeError> {
        let bytes = self.config.download_bytes_per_connection;
        self.urls("__down", Some(bytes))
    }

    /// `{base}/__up` for every connection.
    /// `{base}/__up` for every connection.
    pub fn upload_urls(&self) -> Result<Vec<Url>, ProbeError> {
        self.urls("__up", None)
    }

    fn urls(&self, path: &str, bytes: Option<u64>) -> Result<Vec<Url>, ProbeError> {
        if self.config.servers.is_empty() {
            return Err(ProbeError::config("no multi-connection servers configured"));
        }

        (0..self.config.connections)
            .map(|index| {
                let server = &self.config.servers[index % self.config.servers.len()];
                let base = server.base_url.trim_end_matches('/');
                let mut url = parse_url(&format!("{}/{}", base, path))?;
                if let Some(bytes) = bytes {
                    url.set_query(Some(&format!("bytes={}", bytes)));
                }
                debug!("Connection {} -> {} ({})", index, server.name, url);
                Ok(url)
            })
            .collect()
    }

    /// Aggregate download speed in Mbps across all connections.
    pub async fn download(&self) -> Result<f64, ProbeError> {
        let urls = self.download_urls()?;
        self.batch(Direction::Download, urls).await.speed_mbps()
    }

    /// Aggregate upload speed in Mbps across all connections.
    pub async fn upload(&self) -> Result<f64, ProbeError> {
        let urls = self.upload_urls()?;
        self.batch(Direction::Upload, urls).await.speed_mbps()
    }

    /// Run one transfer per URL concurrently and wait for all of them.
    pub async fn batch(&self, direction: Direction, urls: Vec<Url>) -> Batch {
        let shared = Shared::default();
        let limits =
            TransferLimits::overall_only(Duration::from_millis(self.config.timeout_ms));
        let upload_size = self.config.upload_bytes_per_connection;

        let start = Instant::now();
        let tasks: Vec<_> = urls
            .into_iter()
            .map(|url| {
                let network = self.network.clone();
                let shared = shared.clone();

                tokio::spawn(async move {
                    let outcome = match direction {
                        Direction::Download => {
                            let sink = |bytes: u64| shared.add_bytes(bytes);
                            network.download(&url, &limits, &sink).await.map(|_| ())
                        }
                        Direction::Upload => network
                            .upload(&url, random_payload(upload_size), &limits)
                            .await
                            .map(|observation| {
                                shared.add_bytes(observation.bytes_transferred)
                            }),
                    };

                    if let Err(e) = outcome {
                        warn!("{} connection to {} failed: {}", direction, url, e);
                        shared.add_error(e);
                    }
                })
            })
            .collect();

        let connections = tasks.len();
        for joined in join_all(tasks).await {
            if let Err(e) = joined {
                let error = ProbeError::new(
                    ErrorKind::Unknown,
                    format!("{} connection task died", direction),
                );
                shared.add_error(error.with_source(e));
            }
        }
        let elapsed_secs = start.elapsed().as_secs_f64();

        let Accumulator { total_bytes, errors } = std::mem::take(&mut *shared.lock());

        Batch { direction, connections, total_bytes, errors, elapsed_secs }
    }
}

/// Totals of one batch of concurrent transfers.
#[derive(Debug)]
pub struct Batch {
    pub direction: Direction,
    pub connections: usize,
    /// Bytes moved by every connection, failed ones included.
    pub total_bytes: u64,
    pub errors: Vec<ProbeError>,
    /// From the first spawn until the last task finished.
    pub elapsed_secs: f64,
}

impl Batch {
    /// Aggregate bytes over the batch's wall-clock span.
    ///
    /// Fails only when every connection failed or nothing was moved.
    pub fn speed_mbps(&self) -> Result<f64, ProbeError> {
        let failed = self.errors.len();

        if failed >= self.connections {
            return Err(ProbeError::exhausted(format!(
                "{} multi-connection: all {} connections failed",
                self.direction, self.connections
            )));
        }

        if self.total_bytes == 0 {
            return Err(ProbeError::insufficient_sample(format!(
                "{} multi-connection moved no data",
                self.direction
            )));
        }

        let speed = calculate_speed_mbps(self.total_bytes, self.elapsed_secs);
        info!(
            "{} multi-connection: {} bytes over {} connection(s) ({} failed) in {:.3}s = {:.2} Mbps",
            self.direction,
            self.total_bytes,
            self.connections,
            failed,
            self.elapsed_secs,
            speed
        );

        Ok(speed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TestServer;
    use crate::speedtest::scripted::{Scripted, ScriptedNetwork};

    fn config(servers: &[(&str, &str)]) -> MultiConnectionConfig {
        MultiConnectionConfig {
            connections: 4,
            download_bytes_per_connection: 1_000,
            upload_bytes_per_connection: 500,
            timeout_ms: 1_000,
            servers: servers
                .iter()
                .map(|(name, base)| TestServer::new(name, base, "Test"))
                .collect(),
        }
    }

    fn multi(
        servers: &[(&str, &str)],
        network: ScriptedNetwork,
    ) -> (MultiConnection, Arc<ScriptedNetwork>) {
        let network = Arc::new(network.with_delay(Duration::from_millis(20)));
        (MultiConnection::new(config(servers), network.clone()), network)
    }

    #[test]
    fn test_urls_round_robin_over_servers() {
        let (multi, _) = multi(
            &[("A", "https://a.test/"), ("B", "http://b.test"), ("C", "https://c.test")],
            ScriptedNetwork::new(),
        );

        let urls: Vec<String> =
            multi.download_urls().unwrap().iter().map(|u| u.to_string()).collect();
        assert_eq!(urls, vec![
            "https://a.test/__down?bytes=1000",
            "http://b.test/__down?bytes=1000",
            "https://c.test/__down?bytes=1000",
            "https://a.test/__down?bytes=1000",
        ]);

        let urls: Vec<String> =
            multi.upload_urls().unwrap().iter().map(|u| u.to_string()).collect();
        assert_eq!(urls[1], "http://b.test/__up");
    }

    #[test]
    fn test_no_servers_is_config_error() {
        let (multi, _) = multi(&[], ScriptedNetwork::new());
        assert_eq!(multi.download_urls().unwrap_err().kind, ErrorKind::Config);
    }

    #[tokio::test]
    async fn test_download_sums_all_connections() {
        let network = ScriptedNetwork::new()
            .get("https://a.test/__down?bytes=1000", &[Scripted::Transfer { bytes: 1_000, secs: 1.0 }])
            .get("https://b.test/__down?bytes=1000", &[Scripted::Transfer { bytes: 1_000, secs: 1.0 }]);
        let (multi, network) =
            multi(&[("A", "https://a.test"), ("B", "https://b.test")], network);

        let speed = multi.download().await.unwrap();

        assert_eq!(network.count("GET"), 4);
        // 4000 bytes in at least the 20ms scripted delay.
        assert!(speed > 0.0 && speed <= calculate_speed_mbps(4_000, 0.02));

        let batch = multi.batch(Direction::Download, multi.download_urls().unwrap()).await;
        assert_eq!(batch.total_bytes, 4_000);
        assert!(batch.errors.is_empty());
    }

    #[tokio::test]
    async fn test_one_failed_connection_still_yields_speed() {
        let network = ScriptedNetwork::new()
            .get("https://a.test/__down?bytes=1000", &[
                Scripted::Transfer { bytes: 1_000, secs: 1.0 },
                Scripted::Fail(ErrorKind::Timeout),
            ])
            .get("https://b.test/__down?bytes=1000", &[Scripted::Transfer { bytes: 1_000, secs: 1.0 }]);
        let (multi, _) = multi(&[("A", "https://a.test"), ("B", "https://b.test")], network);
        let urls = multi.download_urls().unwrap();

        let batch = multi.batch(Direction::Download, urls).await;

        assert_eq!(batch.connections, 4);
        assert_eq!(batch.total_bytes, 3_000);
        assert_eq!(batch.errors.len(), 1);
        assert_eq!(batch.errors[0].kind, ErrorKind::Timeout);
        assert_eq!(
            batch.speed_mbps().unwrap(),
            calculate_speed_mbps(3_000, batch.elapsed_secs)
        );
    }

    #[tokio::test]
    async fn test_partial_bytes_are_counted() {
        let network = ScriptedNetwork::new().get(
            "https://a.test/__down?bytes=1000",
            &[Scripted::Partial { bytes: 400, kind: ErrorKind::Timeout }],
        );
        let network = network.get(
            "https://b.test/__down?bytes=1000",
            &[Scripted::Transfer { bytes: 1_000, secs: 1.0 }],
        );
        let (multi, _) = multi(&[("A", "https://a.test"), ("B", "https://b.test")], network);
        let urls = multi.download_urls().unwrap();

        let batch = multi.batch(Direction::Download, urls).await;

        // Two partial reads of 400 plus two full reads of 1000.
        assert_eq!(batch.total_bytes, 2_800);
        assert_eq!(batch.errors.len(), 2);
        assert!(batch.speed_mbps().is_ok());
    }

    #[tokio::test]
    async fn test_all_connections_failing_is_exhausted() {
        let network = ScriptedNetwork::new()
            .get("https://a.test/__down?bytes=1000", &[Scripted::Fail(ErrorKind::Network)]);
        let (multi, network) = multi(&[("A", "https://a.test")], network);

        let error = multi.download().await.unwrap_err();

        assert_eq!(error.kind, ErrorKind::Exhausted);
        assert!(error.message.contains("all 4 connections failed"));
        assert_eq!(network.count("GET"), 4);
    }

    #[tokio::test]
    async fn test_upload_counts_payload_bytes() {
        let network = ScriptedNetwork::new()
            .post("https://a.test/__up", &[Scripted::Transfer { bytes: 0, secs: 1.0 }]);
        let (multi, network) = multi(&[("A", "https://a.test")], network);

        let speed = multi.upload().await.unwrap();

        assert!(speed > 0.0 && speed <= calculate_speed_mbps(2_000, 0.02));
        assert_eq!(network.count("POST https://a.test/__up 500"), 4);

        let batch = multi.batch(Direction::Upload, multi.upload_urls().unwrap()).await;
        assert_eq!(batch.total_bytes, 2_000);
    }
}
