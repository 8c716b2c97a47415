//! Raw samples and the figures derived from them.

use crate::stats::{mean, sample_variance};
use serde::Serialize;
use std::time::Duration;

/// Bits in a decimal megabit.
const BITS_PER_MEGABIT: f64 = 1_000_000.0;

/// One successful connect-and-measure attempt against a host.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatencySample {
    pub host: String,
    pub round_trip_ms: f64,
}

impl LatencySample {
    pub fn new(host: impl Into<String>, round_trip: Duration) -> Self {
        Self {
            host: host.into(),
            round_trip_ms: round_trip.as_secs_f64() * 1000.0,
        }
    }
}

/// Bytes moved by one transfer attempt and how long it took.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ThroughputObservation {
    pub bytes_transferred: u64,
    pub elapsed_secs: f64,
}

impl ThroughputObservation {
    pub fn new(bytes_transferred: u64, elapsed: Duration) -> Self {
        Self { bytes_transferred, elapsed_secs: elapsed.as_secs_f64() }
    }

    /// Speed of this transfer in decimal megabits per second.
    pub fn speed_mbps(&self) -> f64 {
        calculate_speed_mbps(self.bytes_transferred, self.elapsed_secs)
    }
}

/// `bytes * 8 / 1_000_000 / elapsed_secs`, or 0.0 when no time elapsed.
pub fn calculate_speed_mbps(bytes: u64, elapsed_secs: f64) -> f64 {
    if elapsed_secs <= 0.0 {
        return 0.0;
    }

    (bytes as f64 * 8.0 / BITS_PER_MEGABIT) / elapsed_secs
}

/// Average round-trip time and jitter for a set of latency samples.
///
/// Jitter here is the sample variance of the round-trip times (ms²), not
/// their standard deviation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LatencyStats {
    pub ping_ms: f64,
    pub jitter_ms: f64,
}

pub fn latency_stats(samples: &[LatencySample]) -> Option<LatencyStats> {
    let round_trips: Vec<f64> =
        samples.iter().map(|sample| sample.round_trip_ms).collect();

    let ping_ms = mean(&round_trips)?;
    let jitter_ms = sample_variance(&round_trips)?;

    Some(LatencyStats { ping_ms, jitter_ms })
}
