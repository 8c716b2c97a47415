//! Round-trip latency and jitter.
//!
//! Strategies run in order until one collects enough samples:
//!
//! 1. TCP connects to each configured host.
//! 2. HTTP HEAD requests to a smaller host set.
//! 3. A synthetic pair, which cannot fail.

use crate::config::LatencyConfig;
use crate::errors::ProbeError;
use crate::measurements::{latency_stats, LatencySample, LatencyStats};
use crate::results::Source;
use crate::speedtest::network::{parse_url, Network};
use crate::speedtest::Resolved;
use crate::synthetic;
use log::{debug, info, warn};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

/// TCP connect, then HTTP HEAD, then a synthetic figure.
pub struct LatencyProber {
    config: LatencyConfig,
    network: Arc<dyn Network>,
}

impl LatencyProber {
    pub fn new(config: LatencyConfig, network: Arc<dyn Network>) -> Self {
        Self { config, network }
    }

    /// Ping and jitter from the first strategy that succeeds.
    pub async fn measure<R>(&self, rng: &mut R) -> Resolved<LatencyStats>
    where
        R: Rng + Send + ?Sized,
    {
        match self.tcp_connect().await {
            Ok(stats) => {
                info!(
                    "TCP connect latency: {:.2} ms, jitter: {:.2} ms",
                    stats.ping_ms, stats.jitter_ms
                );
                return Resolved::new(stats, Source::TcpConnect);
            }
            Err(e) => warn!("TCP connect latency failed: {}", e),
        }

        match self.http_head().await {
            Ok(stats) => {
                info!(
                    "HTTP HEAD latency: {:.2} ms, jitter: {:.2} ms",
                    stats.ping_ms, stats.jitter_ms
                );
                return Resolved::new(stats, Source::HttpHead);
            }
            Err(e) => warn!("HTTP HEAD latency failed: {}", e),
        }

        let stats = synthetic::latency(rng);
        warn!(
            "Using synthetic latency: {:.2} ms, jitter: {:.2} ms",
            stats.ping_ms, stats.jitter_ms
        );
        Resolved::new(stats, Source::Synthetic)
    }

    /// Time sequential TCP connects to every configured host.
    pub async fn tcp_connect(&self) -> Result<LatencyStats, ProbeError> {
        let timeout = Duration::from_millis(self.config.connect_timeout_ms);
        let mut samples = Vec::new();

        for host in &self.config.tcp_hosts {
            for attempt in 0..self.config.attempts_per_host {
                if attempt > 0 {
                    self.pause().await;
                }

                match self
                    .network
                    .tcp_connect(host, self.config.tcp_port, timeout)
                    .await
                {
                    Ok(elapsed) => samples.push(LatencySample::new(host, elapsed)),
                    Err(e) => debug!("Connect to {} skipped: {}", host, e),
                }
            }
        }

        self.summarize("tcp connect", &samples)
    }

    /// Time sequential HEAD requests to `https://{host}`.
    pub async fn http_head(&self) -> Result<LatencyStats, ProbeError> {
        let timeout = Duration::from_millis(self.config.head_timeout_ms);
        let mut samples = Vec::new();

        for host in &self.config.head_hosts {
            let url = parse_url(&format!("https://{}", host))?;

            for attempt in 0..self.config.attempts_per_host {
                if attempt > 0 {
                    self.pause().await;
                }

                match self.network.head(&url, timeout).await {
                    Ok(elapsed) => samples.push(LatencySample::new(host, elapsed)),
                    Err(e) => debug!("HEAD {} skipped: {}", url, e),
                }
            }
        }

        self.summarize("http head", &samples)
    }

    async fn pause(&self) {
        tokio::time::sleep(Duration::from_millis(self.config.spacing_ms)).await;
    }

    fn summarize(
        &self,
        strategy: &str,
        samples: &[LatencySample],
    ) -> Result<LatencyStats, ProbeError> {
        debug!("{}: collected {} sample(s)", strategy, samples.len());

        if samples.len() < self.config.min_samples {
            return Err(ProbeError::insufficient_sample(format!(
                "{} collected {} sample(s), need {}",
                strategy,
                samples.len(),
                self.config.min_samples
            )));
        }

        latency_stats(samples).ok_or_else(|| {
            ProbeError::insufficient_sample(format!("{} has no samples", strategy))
        })
    }
}
