//! Best-effort network speed measurement.
//!
//! One run produces download and upload throughput (Mbps) plus latency
//! and jitter (ms). Each figure comes from an ordered chain of
//! strategies; when every real strategy fails the figure is synthesised,
//! and [`results::Provenance`] records which path produced what.

pub mod config;
pub mod errors;
pub mod lookup;
pub mod measurements;
pub mod results;
pub mod retry;
pub mod speedtest;
pub mod stats;
pub mod storage;
pub mod synthetic;
