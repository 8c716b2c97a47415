//! The download strategy chain.

use crate::config::ChainConfig;
use crate::errors::ProbeError;
use crate::results::Source;
use crate::speedtest::multi::MultiConnection;
use crate::speedtest::sampler::ThroughputSampler;
use crate::speedtest::{Direction, Resolved};
use log::warn;

/// Primary, small-object, alternative; or multi-connection, alternative.
pub struct DownloadChain {
    config: ChainConfig,
    sampler: ThroughputSampler,
    multi: MultiConnection,
}

impl DownloadChain {
    /// `sampler` runs the single-connection strategies and `multi` the
    /// parallel one. Both are usually shared with the upload chain.
    pub fn new(
        config: ChainConfig,
        sampler: ThroughputSampler,
        multi: MultiConnection,
    ) -> Self {
        Self { config, sampler, multi }
    }

    /// Download speed in Mbps from the first strategy that succeeds.
    ///
    /// Single-connection mode runs primary, then small-object, then
    /// alternative. Multi-connection mode runs the parallel strategy and
    /// falls back to alternative. An [`ErrorKind::Exhausted`] error means
    /// the caller has to synthesise a figure.
    ///
    /// [`ErrorKind::Exhausted`]: crate::errors::ErrorKind::Exhausted
    pub async fn measure(&self, multi_connection: bool) -> Result<Resolved<f64>, ProbeError> {
        let direction = Direction::Download;

        if multi_connection {
            match self.multi.download().await {
                Ok(speed) => return Ok(Resolved::new(speed, Source::MultiConnection)),
                Err(e) => warn!("download multi-connection failed: {}", e),
            }
        } else {
            match self.sampler.first_success(direction, "primary", &self.config.primary).await {
                Ok(speed) => return Ok(Resolved::new(speed, Source::Primary)),
                Err(e) => warn!("{}", e),
            }

            match self
                .sampler
                .scaled_median(direction, "small-object", &self.config.small_object)
                .await
            {
                Ok(speed) => return Ok(Resolved::new(speed, Source::SmallObject)),
                Err(e) => warn!("{}", e),
            }
        }

        match self
            .sampler
            .scaled_median(direction, "alternative", &self.config.alternative)
            .await
        {
            Ok(speed) => Ok(Resolved::new(speed, Source::Alternative)),
            Err(e) => {
                warn!("{}", e);
                Err(ProbeError::exhausted("download: every strategy failed"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EngineConfig, HttpTimeouts, MultiConnectionConfig, TestServer};
    use crate::errors::ErrorKind;
    use crate::speedtest::scripted::{Scripted, ScriptedNetwork};
    use std::sync::Arc;
    use std::time::Duration;

    fn chain(network: ScriptedNetwork) -> (DownloadChain, Arc<ScriptedNetwork>) {
        let network = Arc::new(network);
        let sampler = ThroughputSampler::new(
            network.clone(),
            HttpTimeouts::default(),
            Duration::from_secs(10),
        );
        let multi = MultiConnection::new(
            MultiConnectionConfig {
                servers: vec![TestServer::new("Edge", "https://edge.test", "Test")],
                ..MultiConnectionConfig::default()
            },
            network.clone(),
        );
        let config = EngineConfig::default().download;

        (DownloadChain::new(config, sampler, multi), network)
    }

    fn small_images(network: ScriptedNetwork, outcome: Scripted) -> ScriptedNetwork {
        ChainConfig::download()
            .small_object
            .urls
            .iter()
            .fold(network, |network, url| network.get(url, &[outcome]))
    }

    fn alternative_samples(network: ScriptedNetwork) -> ScriptedNetwork {
        // 10, 20 and 30 Mbps, each too small and quick for small-object.
        let urls = ChainConfig::download().alternative.urls;
        network
            .get(&urls[0], &[Scripted::Transfer { bytes: 125_000, secs: 0.1 }])
            .get(&urls[1], &[Scripted::Transfer { bytes: 250_000, secs: 0.1 }])
            .get(&urls[2], &[Scripted::Transfer { bytes: 375_000, secs: 0.1 }])
    }

    #[tokio::test]
    async fn test_primary_first_success_wins() {
        let network = ScriptedNetwork::new()
            .get("https://proof.ovh.net/files/100Mb.dat", &[Scripted::Transfer {
                bytes: 500 * 1024,
                secs: 0.9,
            }])
            .get("https://speed.hetzner.de/100MB.bin", &[Scripted::Transfer {
                bytes: 125_000_000,
                secs: 10.0,
            }]);
        let (chain, network) = chain(network);

        let resolved = chain.measure(false).await.unwrap();

        assert_eq!(resolved.source, Source::Primary);
        assert_eq!(resolved.value, 100.0);
        assert_eq!(network.count("GET"), 2);
    }

    #[tokio::test]
    async fn test_small_object_median_scaled_by_two_and_a_half() {
        let urls = ChainConfig::download().small_object.urls;
        let network = ScriptedNetwork::new()
            .get(&urls[0], &[Scripted::Transfer { bytes: 1_250_000, secs: 1.0 }])
            .get(&urls[1], &[Scripted::Transfer { bytes: 2_500_000, secs: 1.0 }])
            .get(&urls[2], &[Scripted::Transfer { bytes: 3_750_000, secs: 1.0 }]);
        let (chain, network) = chain(network);

        let resolved = chain.measure(false).await.unwrap();

        assert_eq!(resolved.source, Source::SmallObject);
        assert!((resolved.value - 50.0).abs() < 1e-9);
        // Four primary files, one attempt each.
        assert_eq!(network.count("GET https://"), 4 + 3);
    }

    #[tokio::test]
    async fn test_alternative_median_scaled_by_one_and_a_half() {
        let (chain, _) = chain(alternative_samples(ScriptedNetwork::new()));

        let resolved = chain.measure(false).await.unwrap();

        assert_eq!(resolved.source, Source::Alternative);
        assert!((resolved.value - 30.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_tiny_favicon_falls_through_to_alternative() {
        let favicon = &ChainConfig::download().small_object.urls[2];
        let network = ScriptedNetwork::new()
            .get(favicon, &[Scripted::Transfer { bytes: 5_000, secs: 0.05 }]);
        let (chain, network) = chain(network);

        let resolved = chain.measure(false).await.unwrap();

        // 0.8 Mbps, scaled by the alternative's 1.5 rather than 2.5.
        assert_eq!(resolved.source, Source::Alternative);
        assert!((resolved.value - 1.2).abs() < 1e-9);
        let url = url::Url::parse(favicon).unwrap();
        assert_eq!(network.count(&format!("GET {}", url)), 3 + 1);
    }

    #[tokio::test]
    async fn test_small_object_tries_each_image_three_times() {
        let network = small_images(ScriptedNetwork::new(), Scripted::Fail(ErrorKind::Timeout));
        let (chain, network) = chain(network);

        let error = chain.measure(false).await.unwrap_err();

        assert_eq!(error.kind, ErrorKind::Exhausted);
        let favicon = &ChainConfig::download().small_object.urls[2];
        let url = url::Url::parse(favicon).unwrap();
        // Also hit once by the alternative strategy.
        assert_eq!(network.count(&format!("GET {}", url)), 3 + 1);
    }

    #[tokio::test]
    async fn test_multi_connection_mode_skips_single_connection_primary() {
        let network = ScriptedNetwork::new().get(
            "https://edge.test/__down?bytes=10000000",
            &[Scripted::Transfer { bytes: 10_000_000, secs: 1.0 }],
        );
        let (chain, network) = chain(network.with_delay(Duration::from_millis(5)));

        let resolved = chain.measure(true).await.unwrap();

        assert_eq!(resolved.source, Source::MultiConnection);
        assert!(resolved.value > 0.0);
        assert_eq!(network.count("GET https://edge.test"), 4);
        assert_eq!(network.count("GET https://proof.ovh.net"), 0);
    }

    #[tokio::test]
    async fn test_multi_connection_falls_back_to_alternative() {
        let (chain, network) = chain(alternative_samples(ScriptedNetwork::new()));

        let resolved = chain.measure(true).await.unwrap();

        assert_eq!(resolved.source, Source::Alternative);
        assert!((resolved.value - 30.0).abs() < 1e-9);
        assert_eq!(network.count("GET https://edge.test"), 4);
    }

    #[tokio::test]
    async fn test_everything_failing_is_exhausted() {
        let (chain, _) = chain(ScriptedNetwork::new());

        let error = chain.measure(false).await.unwrap_err();
        assert_eq!(error.kind, ErrorKind::Exhausted);

        let error = chain.measure(true).await.unwrap_err();
        assert_eq!(error.kind, ErrorKind::Exhausted);
    }
}
