//! Orchestration of one measurement run, and the service that stores it.
//!
//! A run is strictly sequential: latency, then download, then upload. A
//! direction whose whole chain fails is synthesised, download first so
//! the upload figure can be derived from it. Nothing short of the store
//! failing makes a run fail.

use crate::config::EngineConfig;
use crate::errors::ProbeError;
use crate::results::{Figures, IpInfo, MeasurementResult, Provenance, Source};
use crate::speedtest::download::DownloadChain;
use crate::speedtest::http::HttpNetwork;
use crate::speedtest::latency::LatencyProber;
use crate::speedtest::multi::MultiConnection;
use crate::speedtest::network::Network;
use crate::speedtest::sampler::ThroughputSampler;
use crate::speedtest::upload::UploadChain;
use crate::storage::ResultStore;
use crate::synthetic;
use log::{info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Figures of a run and where each one came from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    pub figures: Figures,
    pub provenance: Provenance,
}

/// Runs latency, download and upload in order and fills the gaps.
pub struct MeasurementEngine {
    latency: LatencyProber,
    download: DownloadChain,
    upload: UploadChain,
    seed: Option<u64>,
}

impl MeasurementEngine {
    /// All strategies go through `network`.
    pub fn new(config: EngineConfig, network: Arc<dyn Network>) -> Self {
        let sampler = ThroughputSampler::new(
            network.clone(),
            config.http.clone(),
            Duration::from_millis(config.read_cap_ms),
        );
        let multi = MultiConnection::new(config.multi_connection, network.clone());

        Self {
            latency: LatencyProber::new(config.latency, network),
            download: DownloadChain::new(config.download, sampler.clone(), multi.clone()),
            upload: UploadChain::new(config.upload, sampler, multi),
            seed: config.seed,
        }
    }

    /// An engine talking to the real network.
    pub fn over_http(config: EngineConfig) -> Self {
        Self::new(config, Arc::new(HttpNetwork::new()))
    }

    /// Run once, drawing synthetic values from the configured seed or
    /// from entropy.
    pub async fn measure(&self, multi_connection: bool) -> Measurement {
        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        self.measure_with(multi_connection, &mut rng).await
    }

    /// Run once, drawing synthetic values from `rng`.
    pub async fn measure_with<R>(&self, multi_connection: bool, rng: &mut R) -> Measurement
    where
        R: Rng + Send + ?Sized,
    {
        info!(
            "Starting measurement ({} connection mode)",
            if multi_connection { "multi" } else { "single" }
        );

        let latency = self.latency.measure(rng).await;

        let (download_mbps, download_source) = match self.download.measure(multi_connection).await {
            Ok(resolved) => (resolved.value, resolved.source),
            Err(e) => {
                let speed = synthetic::download_mbps(rng);
                warn!("{}; using synthetic download: {:.2} Mbps", e, speed);
                (speed, Source::Synthetic)
            }
        };

        let (upload_mbps, upload_source) = match self.upload.measure(multi_connection).await {
            Ok(resolved) => (resolved.value, resolved.source),
            Err(e) => {
                let speed = synthetic::upload_mbps(download_mbps, rng);
                warn!("{}; using synthetic upload: {:.2} Mbps", e, speed);
                (speed, Source::Synthetic)
            }
        };

        let measurement = Measurement {
            figures: Figures {
                download_mbps,
                upload_mbps,
                ping_ms: latency.value.ping_ms,
                jitter_ms: latency.value.jitter_ms,
            },
            provenance: Provenance {
                latency: latency.source,
                download: download_source,
                upload: upload_source,
            },
        };

        info!(
            "Measured download {:.2} Mbps ({}), upload {:.2} Mbps ({}), ping {:.2} ms ({})",
            download_mbps,
            download_source,
            upload_mbps,
            upload_source,
            latency.value.ping_ms,
            latency.source
        );

        measurement
    }
}

/// Runs measurements on behalf of an owner and keeps their history.
pub struct SpeedTestService<S> {
    engine: MeasurementEngine,
    store: S,
}

impl<S: ResultStore> SpeedTestService<S> {
    pub fn new(engine: MeasurementEngine, store: S) -> Self {
        Self { engine, store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Measure, stamp the result with a fresh id, save it and return it.
    ///
    /// Only a failing store makes this return an error.
    pub async fn run_measurement(
        &self,
        owner_id: &str,
        ip_info: &IpInfo,
        multi_connection: bool,
    ) -> Result<MeasurementResult, ProbeError> {
        let measurement = self.engine.measure(multi_connection).await;
        self.record(owner_id, ip_info, measurement).await
    }

    async fn record(
        &self,
        owner_id: &str,
        ip_info: &IpInfo,
        measurement: Measurement,
    ) -> Result<MeasurementResult, ProbeError> {
        let result = MeasurementResult::new(
            owner_id,
            ip_info,
            measurement.figures,
            measurement.provenance,
        );

        self.store.save(&result).await?;
        info!("Saved result {} for {}", result.id, owner_id);

        Ok(result)
    }

    /// Results of `owner_id`, newest first.
    pub async fn history(&self, owner_id: &str) -> Result<Vec<MeasurementResult>, ProbeError> {
        self.store.list_by_owner(owner_id).await
    }

    /// Remove one result. Unknown ids fail with a storage error.
    pub async fn delete(&self, result_id: &Uuid) -> Result<(), ProbeError> {
        self.store.delete(result_id).await
    }
}
