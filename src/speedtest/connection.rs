//! Host resolution and TCP connect timing.

use crate::errors::{ErrorKind, ProbeError};
use hickory_resolver::TokioAsyncResolver;
use std::net::{IpAddr, SocketAddr, TcpStream};
use std::time::Duration;
use tokio::time::Instant;

/// Resolve `host` to an address, preferring IPv4.
///
/// IP literals are returned as-is without touching the resolver.
pub async fn resolve_host(host: &str) -> Result<IpAddr, ProbeError> {
    if let Ok(address) = host.parse::<IpAddr>() {
        return Ok(address);
    }

    let resolver = TokioAsyncResolver::tokio_from_system_conf().map_err(|e| {
        ProbeError::new(ErrorKind::Dns, "cannot load system resolver config")
            .with_source(e)
    })?;

    let response = resolver.lookup_ip(host).await.map_err(|e| {
        ProbeError::new(ErrorKind::Dns, format!("lookup of {} failed", host))
            .with_source(e)
    })?;

    let addresses: Vec<IpAddr> = response.iter().collect();

    addresses
        .iter()
        .find(|addr| addr.is_ipv4())
        .or_else(|| addresses.first())
        .copied()
        .ok_or_else(|| {
            ProbeError::new(ErrorKind::Dns, format!("no addresses for {}", host))
        })
}

/// Time a TCP handshake with `address:port`.
///
/// Runs on a blocking thread pool via `spawn_blocking` to avoid
/// starving the tokio async runtime. The socket is closed before
/// returning.
pub async fn measure_tcp_connect(
    address: IpAddr,
    port: u16,
    timeout: Duration,
) -> Result<Duration, ProbeError> {
    let target = SocketAddr::new(address, port);

    tokio::task::spawn_blocking(move || {
        let start = Instant::now();
        let stream = TcpStream::connect_timeout(&target, timeout)?;
        let elapsed = start.elapsed();

        drop(stream);

        Ok::<_, std::io::Error>(elapsed)
    })
    .await
    .map_err(|e| ProbeError::new(ErrorKind::Unknown, "connect task panicked").with_source(e))?
    .map_err(|e| ProbeError::transport(&format!("tcp connect {}", target), e))
}
