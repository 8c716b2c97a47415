//! Single-connection throughput samples.
//!
//! A sample is one timed transfer against one endpoint. The sampler also
//! knows the two ways the chains combine samples: first accepted sample
//! wins, or the scaled median of every URL's best attempt.

use crate::config::{Acceptance, HttpTimeouts, StrategyConfig};
use crate::errors::ProbeError;
use crate::measurements::ThroughputObservation;
use crate::retry::retry_async;
use crate::speedtest::network::{parse_url, Network, TransferLimits};
use crate::speedtest::Direction;
use crate::stats::median_f64;
use log::{debug, info, warn};
use rand::RngCore;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Random bytes for upload bodies. Content does not matter, only size.
pub(crate) fn random_payload(size: u64) -> Vec<u8> {
    let mut payload = vec![0u8; size as usize];
    rand::thread_rng().fill_bytes(&mut payload);
    payload
}

/// Times single transfers and applies the strategy rules on top.
#[derive(Clone)]
pub struct ThroughputSampler {
    network: Arc<dyn Network>,
    http: HttpTimeouts,
    read_cap: Duration,
}

impl ThroughputSampler {
    /// `http` bounds each request phase. `read_cap` stops reading a
    /// download body early, so huge objects are timed on a prefix.
    pub fn new(
        network: Arc<dyn Network>,
        http: HttpTimeouts,
        read_cap: Duration,
    ) -> Self {
        Self { network, http, read_cap }
    }

    /// Time one transfer and return its speed in Mbps.
    ///
    /// `payload_bytes` of `None` means a download; `Some(n)` uploads `n`
    /// random bytes. The observation must pass `acceptance` or the sample
    /// fails with [`ErrorKind::InsufficientSample`].
    ///
    /// [`ErrorKind::InsufficientSample`]: crate::errors::ErrorKind::InsufficientSample
    pub async fn sample(
        &self,
        url: &Url,
        payload_bytes: Option<u64>,
        budget: Duration,
        acceptance: &Acceptance,
    ) -> Result<f64, ProbeError> {
        let observation = match payload_bytes {
            None => self.download(url, budget).await?,
            Some(size) => self.upload(url, size, budget).await?,
        };

        acceptance.check(&observation).map_err(|e| {
            ProbeError::insufficient_sample(format!("{}: {}", url, e.message))
        })?;

        let speed = observation.speed_mbps();
        debug!(
            "{}: {} bytes in {:.3}s = {:.2} Mbps",
            url, observation.bytes_transferred, observation.elapsed_secs, speed
        );

        Ok(speed)
    }

    async fn download(
        &self,
        url: &Url,
        budget: Duration,
    ) -> Result<ThroughputObservation, ProbeError> {
        let limits =
            TransferLimits::new(&self.http, budget).with_read_cap(self.read_cap);
        self.network.download(url, &limits, &|_| {}).await
    }

    async fn upload(
        &self,
        url: &Url,
        size: u64,
        budget: Duration,
    ) -> Result<ThroughputObservation, ProbeError> {
        let limits = TransferLimits::new(&self.http, budget);
        self.network.upload(url, random_payload(size), &limits).await
    }

    /// Try each URL once, in order; the first accepted sample wins.
    pub async fn first_success(
        &self,
        direction: Direction,
        strategy_name: &str,
        strategy: &StrategyConfig,
    ) -> Result<f64, ProbeError> {
        let payload = payload_for(direction, strategy);

        for raw in &strategy.urls {
            let url = match parse_url(raw) {
                Ok(url) => url,
                Err(e) => {
                    warn!("{} {}: {}", direction, strategy_name, e);
                    continue;
                }
            };

            match self
                .sample(&url, payload, strategy.timeout(), &strategy.acceptance)
                .await
            {
                Ok(speed) => {
                    info!(
                        "{} {} succeeded via {}: {:.2} Mbps",
                        direction, strategy_name, url, speed
                    );
                    return Ok(speed);
                }
                Err(e) => warn!("{} {} failed for {}: {}", direction, strategy_name, url, e),
            }
        }

        Err(ProbeError::exhausted(format!(
            "{} {}: no endpoint produced an accepted sample",
            direction, strategy_name
        )))
    }

    /// Sample every URL (retrying per the strategy's policy), then scale
    /// the median of the successful samples.
    pub async fn scaled_median(
        &self,
        direction: Direction,
        strategy_name: &str,
        strategy: &StrategyConfig,
    ) -> Result<f64, ProbeError> {
        let payload = payload_for(direction, strategy);
        let mut speeds = Vec::new();

        for raw in &strategy.urls {
            let url = match parse_url(raw) {
                Ok(url) => url,
                Err(e) => {
                    warn!("{} {}: {}", direction, strategy_name, e);
                    continue;
                }
            };

            let operation = format!("{} {} {}", direction, strategy_name, url);
            let outcome = retry_async(
                &strategy.retry,
                &operation,
                |_: &ProbeError| true,
                || self.sample(&url, payload, strategy.timeout(), &strategy.acceptance),
            )
            .await;

            if let Some(speed) = outcome.ok() {
                speeds.push(speed);
            }
        }

        let median = median_f64(&mut speeds).ok_or_else(|| {
            ProbeError::exhausted(format!(
                "{} {}: every endpoint failed",
                direction, strategy_name
            ))
        })?;

        let speed = median * strategy.scale;
        info!(
            "{} {}: median {:.2} Mbps of {} sample(s), x{} = {:.2} Mbps",
            direction,
            strategy_name,
            median,
            speeds.len(),
            strategy.scale,
            speed
        );

        Ok(speed)
    }
}

fn payload_for(direction: Direction, strategy: &StrategyConfig) -> Option<u64> {
    match direction {
        Direction::Download => None,
        Direction::Upload => Some(strategy.payload_bytes),
    }
}
