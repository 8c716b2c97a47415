//! The measurement engine: latency probing, throughput sampling, the
//! per-direction fallback chains and the orchestrator tying them together.

use crate::results::Source;
use serde::Serialize;

pub(crate) mod connection;
pub mod download;
pub mod engine;
pub mod http;
pub mod latency;
pub mod multi;
pub mod network;
pub mod sampler;
#[cfg(test)]
pub(crate) mod scripted;
pub mod upload;

/// Which way the bytes flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Download,
    Upload,
}

serde_plain::derive_display_from_serialize!(Direction);

/// A figure together with the strategy that produced it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resolved<T> {
    pub value: T,
    pub source: Source,
}

impl<T> Resolved<T> {
    pub fn new(value: T, source: Source) -> Self {
        Self { value, source }
    }
}
