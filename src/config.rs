//! Engine configuration.
//!
//! Every endpoint registry and tuning constant the engine uses lives
//! here and is handed to the components when they are built. `Default`
//! gives the stock values; a JSON file may override any subset of them.

use crate::errors::ProbeError;
use crate::measurements::ThroughputObservation;
use crate::retry::RetryConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

const KIB: u64 = 1024;
const MIB: u64 = 1024 * KIB;

/// A server answering `/__down?bytes=N` and `/__up`, used by the
/// multi-connection strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestServer {
    pub name: String,
    pub base_url: String,
    pub location: String,
}

impl TestServer {
    pub fn new(name: &str, base_url: &str, location: &str) -> Self {
        Self {
            name: name.to_string(),
            base_url: base_url.to_string(),
            location: location.to_string(),
        }
    }
}

/// Minimum duration and size a transfer must reach before its speed is
/// trusted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Acceptance {
    pub min_elapsed_secs: f64,
    pub min_bytes: u64,
}

impl Acceptance {
    pub const fn new(min_elapsed_secs: f64, min_bytes: u64) -> Self {
        Self { min_elapsed_secs, min_bytes }
    }

    /// Accepts anything that moved at least one byte in measurable time.
    pub const fn lenient() -> Self {
        Self::new(0.0, 1)
    }

    pub fn check(
        &self,
        observation: &ThroughputObservation,
    ) -> Result<(), ProbeError> {
        if observation.elapsed_secs <= 0.0
            || observation.elapsed_secs < self.min_elapsed_secs
        {
            return Err(ProbeError::insufficient_sample(format!(
                "transfer took {:.3}s, need at least {:.3}s",
                observation.elapsed_secs, self.min_elapsed_secs
            )));
        }

        if observation.bytes_transferred < self.min_bytes {
            return Err(ProbeError::insufficient_sample(format!(
                "transfer moved {} bytes, need at least {}",
                observation.bytes_transferred, self.min_bytes
            )));
        }

        Ok(())
    }
}

/// Per-phase HTTP timeouts shared by every single-connection transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpTimeouts {
    pub connect_ms: u64,
    pub tls_handshake_ms: u64,
    pub response_header_ms: u64,
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self { connect_ms: 5_000, tls_handshake_ms: 5_000, response_header_ms: 5_000 }
    }
}

/// One single-connection throughput strategy: which endpoints to hit,
/// how hard, and how to turn the samples into a figure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub urls: Vec<String>,
    /// Overall request budget per attempt.
    pub timeout_ms: u64,
    /// Upload payload size. Ignored for downloads.
    pub payload_bytes: u64,
    pub acceptance: Acceptance,
    /// Multiplier applied to the median of the collected samples.
    pub scale: f64,
    /// Tries per URL.
    pub retry: RetryConfig,
}

impl StrategyConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// The single-connection chain for one direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Large transfers; the first accepted sample wins.
    pub primary: StrategyConfig,
    /// Small transfers, several attempts per URL, scaled median.
    pub small_object: StrategyConfig,
    /// Last real strategy, lenient acceptance, scaled median.
    pub alternative: StrategyConfig,
}

impl ChainConfig {
    pub fn download() -> Self {
        Self {
            primary: StrategyConfig {
                urls: strings(&[
                    "https://proof.ovh.net/files/100Mb.dat",
                    "https://speed.hetzner.de/100MB.bin",
                    "https://ash-speed.hetzner.com/100MB.bin",
                    "https://lg-fra.fdcservers.net/100MBtest.zip",
                ]),
                timeout_ms: 15_000,
                payload_bytes: 0,
                acceptance: Acceptance::new(1.0, MIB),
                scale: 1.0,
                retry: RetryConfig::once(),
            },
            small_object: StrategyConfig {
                urls: strings(&[
                    "https://www.google.com/images/branding/googlelogo/2x/googlelogo_color_272x92dp.png",
                    "https://github.com/fluidicon.png",
                    "https://www.microsoft.com/favicon.ico",
                ]),
                timeout_ms: 5_000,
                payload_bytes: 0,
                acceptance: Acceptance::new(1.0, MIB),
                scale: 2.5,
                retry: RetryConfig::attempts(3),
            },
            alternative: StrategyConfig {
                urls: strings(&[
                    "https://www.google.com/images/branding/googlelogo/1x/googlelogo_color_272x92dp.png",
                    "https://www.microsoft.com/favicon.ico",
                    "https://speed.cloudflare.com/__down?bytes=1000000",
                ]),
                timeout_ms: 15_000,
                payload_bytes: 0,
                acceptance: Acceptance::lenient(),
                scale: 1.5,
                retry: RetryConfig::once(),
            },
        }
    }

    pub fn upload() -> Self {
        let echo = strings(&[
            "https://httpbin.org/post",
            "https://postman-echo.com/post",
            "https://httpbingo.org/post",
        ]);

        Self {
            primary: StrategyConfig {
                urls: echo.clone(),
                timeout_ms: 15_000,
                payload_bytes: 3 * MIB,
                acceptance: Acceptance::new(0.5, 0),
                scale: 1.0,
                retry: RetryConfig::once(),
            },
            small_object: StrategyConfig {
                urls: echo[..2].to_vec(),
                timeout_ms: 10_000,
                payload_bytes: 512 * KIB,
                acceptance: Acceptance::new(0.5, 0),
                scale: 3.0,
                retry: RetryConfig::attempts(2),
            },
            alternative: StrategyConfig {
                urls: echo[..2].to_vec(),
                timeout_ms: 15_000,
                payload_bytes: MIB,
                acceptance: Acceptance::lenient(),
                scale: 1.5,
                retry: RetryConfig::once(),
            },
        }
    }
}

/// Parallel transfers spread round-robin over a server registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MultiConnectionConfig {
    pub connections: usize,
    pub download_bytes_per_connection: u64,
    pub upload_bytes_per_connection: u64,
    pub timeout_ms: u64,
    pub servers: Vec<TestServer>,
}

impl Default for MultiConnectionConfig {
    fn default() -> Self {
        Self {
            connections: 4,
            download_bytes_per_connection: 10_000_000,
            upload_bytes_per_connection: 2 * MIB,
            timeout_ms: 20_000,
            servers: vec![
                TestServer::new("Cloudflare", "https://speed.cloudflare.com", "Global CDN"),
                TestServer::new("Turksat", "http://speedtest.turksat.com.tr", "Ankara, Turkey"),
                TestServer::new("Turk Telekom", "http://speedtest.turktelekom.com.tr", "Istanbul, Turkey"),
                TestServer::new("Google", "https://www.google.com", "Global CDN"),
                TestServer::new("Microsoft", "https://www.microsoft.com", "Global CDN"),
            ],
        }
    }
}

/// Hosts and pacing for the latency prober.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LatencyConfig {
    /// Hosts for the TCP connect strategy.
    pub tcp_hosts: Vec<String>,
    pub tcp_port: u16,
    pub connect_timeout_ms: u64,
    /// Hosts for the HTTP HEAD strategy, requested as `https://{host}`.
    pub head_hosts: Vec<String>,
    pub head_timeout_ms: u64,
    pub attempts_per_host: usize,
    pub spacing_ms: u64,
    /// Fewer successful samples than this fails the strategy.
    pub min_samples: usize,
}

impl Default for LatencyConfig {
    fn default() -> Self {
        Self {
            tcp_hosts: strings(&["8.8.8.8", "1.1.1.1", "208.67.222.222"]),
            tcp_port: 80,
            connect_timeout_ms: 2_000,
            head_hosts: strings(&["8.8.8.8", "1.1.1.1"]),
            head_timeout_ms: 5_000,
            attempts_per_host: 5,
            spacing_ms: 100,
            min_samples: 3,
        }
    }
}

/// Everything the measurement engine needs to know.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub latency: LatencyConfig,
    pub download: ChainConfig,
    pub upload: ChainConfig,
    pub multi_connection: MultiConnectionConfig,
    pub http: HttpTimeouts,
    /// Hard wall-clock cap on reading a single download body.
    pub read_cap_ms: u64,
    /// Seed for synthetic values; entropy when unset.
    pub seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            latency: LatencyConfig::default(),
            download: ChainConfig::download(),
            upload: ChainConfig::upload(),
            multi_connection: MultiConnectionConfig::default(),
            http: HttpTimeouts::default(),
            read_cap_ms: 10_000,
            seed: None,
        }
    }
}

impl EngineConfig {
    /// Load a configuration file, filling anything it omits with defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, ProbeError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            ProbeError::config(format!("cannot read {}", path.display()))
                .with_source(e)
        })?;

        serde_json::from_str(&text).map_err(|e| {
            ProbeError::config(format!("invalid config {}", path.display()))
                .with_source(e)
        })
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}
