//! The record produced by one measurement run.
//!
//! A [`MeasurementResult`] is built exactly once per run and never
//! mutated afterwards. Alongside the figures it carries a [`Provenance`]
//! so a reader can tell a measured value from a synthesised one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where a figure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Source {
    /// Timed TCP connects.
    TcpConnect,
    /// Timed HTTP HEAD requests.
    HttpHead,
    /// A single large transfer.
    Primary,
    /// Scaled median of repeated small transfers.
    SmallObject,
    /// Scaled median of lenient small transfers.
    Alternative,
    /// Aggregate of parallel transfers.
    MultiConnection,
    /// Generated, not measured.
    Synthetic,
}

serde_plain::derive_display_from_serialize!(Source);

impl Source {
    pub fn is_synthetic(&self) -> bool {
        matches!(self, Source::Synthetic)
    }
}

/// The source of each figure in a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub latency: Source,
    pub download: Source,
    pub upload: Source,
}

impl Provenance {
    /// True when at least one figure was synthesised.
    pub fn is_synthetic(&self) -> bool {
        self.latency.is_synthetic()
            || self.download.is_synthetic()
            || self.upload.is_synthetic()
    }
}

/// Client network metadata supplied by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpInfo {
    pub isp: String,
    pub ip: String,
    pub country: String,
    pub region: String,
}

impl IpInfo {
    pub fn new(isp: &str, ip: &str, country: &str, region: &str) -> Self {
        Self {
            isp: isp.to_string(),
            ip: ip.to_string(),
            country: country.to_string(),
            region: region.to_string(),
        }
    }
}

/// Final output of a measurement run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementResult {
    pub id: Uuid,
    pub owner_id: String,
    pub download_mbps: f64,
    pub upload_mbps: f64,
    pub ping_ms: f64,
    pub jitter_ms: f64,
    pub isp_name: String,
    pub ip_address: String,
    pub country: String,
    pub region: String,
    pub created_at: DateTime<Utc>,
    pub provenance: Provenance,
}

/// The four figures of a run, before they are stamped with identity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Figures {
    pub download_mbps: f64,
    pub upload_mbps: f64,
    pub ping_ms: f64,
    pub jitter_ms: f64,
}

impl MeasurementResult {
    /// Stamp a fresh id and the current time onto a run's figures.
    pub fn new(
        owner_id: &str,
        ip_info: &IpInfo,
        figures: Figures,
        provenance: Provenance,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id: owner_id.to_string(),
            download_mbps: figures.download_mbps,
            upload_mbps: figures.upload_mbps,
            ping_ms: figures.ping_ms,
            jitter_ms: figures.jitter_ms,
            isp_name: ip_info.isp.clone(),
            ip_address: ip_info.ip.clone(),
            country: ip_info.country.clone(),
            region: ip_info.region.clone(),
            created_at: Utc::now(),
            provenance,
        }
    }
}
