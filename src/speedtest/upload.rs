//! The upload strategy chain.
//!
//! Mirrors [`crate::speedtest::download`] against echo endpoints, with
//! random payloads sized per strategy.

use crate::config::ChainConfig;
use crate::errors::ProbeError;
use crate::results::Source;
use crate::speedtest::multi::MultiConnection;
use crate::speedtest::sampler::ThroughputSampler;
use crate::speedtest::{Direction, Resolved};
use log::warn;

/// Upload counterpart of [`crate::speedtest::download::DownloadChain`].
pub struct UploadChain {
    config: ChainConfig,
    sampler: ThroughputSampler,
    multi: MultiConnection,
}

impl UploadChain {
    /// See [`crate::speedtest::download::DownloadChain::new`].
    pub fn new(
        config: ChainConfig,
        sampler: ThroughputSampler,
        multi: MultiConnection,
    ) -> Self {
        Self { config, sampler, multi }
    }

    /// Upload speed in Mbps from the first strategy that succeeds.
    ///
    /// Same order as the download chain. Each attempt sends a fresh random
    /// payload of the strategy's size, and an [`ErrorKind::Exhausted`]
    /// error leaves synthesis to the caller.
    ///
    /// [`ErrorKind::Exhausted`]: crate::errors::ErrorKind::Exhausted
    pub async fn measure(&self, multi_connection: bool) -> Result<Resolved<f64>, ProbeError> {
        let direction = Direction::Upload;

        if multi_connection {
            match self.multi.upload().await {
                Ok(speed) => return Ok(Resolved::new(speed, Source::MultiConnection)),
                Err(e) => warn!("upload multi-connection failed: {}", e),
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
                Err(ProbeError::exhausted("upload: every strategy failed"))
            }
        }
    }
}
