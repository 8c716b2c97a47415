//! A [`Network`] that replays canned outcomes, for tests.

use crate::errors::{ErrorKind, ProbeError};
use crate::measurements::ThroughputObservation;
use crate::speedtest::network::{ByteSink, Network, TransferLimits};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use url::Url;

/// Canned result of one transfer.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Scripted {
    /// Move `bytes` (downloads only; uploads move their payload) in `secs`.
    Transfer { bytes: u64, secs: f64 },
    /// Stream `bytes`, then fail.
    Partial { bytes: u64, kind: ErrorKind },
    Fail(ErrorKind),
}

type Queue<T> = Mutex<HashMap<String, VecDeque<T>>>;

/// Unscripted keys fail with [`ErrorKind::Network`]. Each key replays its
/// outcomes in order and then keeps repeating the last one.
#[derive(Default)]
pub(crate) struct ScriptedNetwork {
    connects: Queue<Result<f64, ErrorKind>>,
    heads: Queue<Result<f64, ErrorKind>>,
    transfers: Queue<Scripted>,
    calls: Mutex<Vec<String>>,
    delay: Duration,
}

fn next<T: Clone>(queue: &Queue<T>, key: &str) -> Option<T> {
    let mut queues = queue.lock().unwrap();
    let outcomes = queues.get_mut(key)?;

    if outcomes.len() > 1 {
        outcomes.pop_front()
    } else {
        outcomes.front().cloned()
    }
}

// Keys are stored the way `Url` prints them, e.g. with a trailing slash.
fn normalize(url: &str) -> String {
    Url::parse(url).map(|url| url.to_string()).unwrap_or_else(|_| url.to_string())
}

fn unscripted(key: &str) -> ProbeError {
    ProbeError::new(ErrorKind::Network, format!("unscripted {}", key))
}

impl ScriptedNetwork {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Delay every transfer by `delay` of real time.
    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn connect(self, host: &str, outcomes: &[Result<f64, ErrorKind>]) -> Self {
        self.connects
            .lock()
            .unwrap()
            .insert(host.to_string(), outcomes.iter().cloned().collect());
        self
    }

    pub(crate) fn head(self, url: &str, outcomes: &[Result<f64, ErrorKind>]) -> Self {
        self.heads
            .lock()
            .unwrap()
            .insert(normalize(url), outcomes.iter().cloned().collect());
        self
    }

    pub(crate) fn get(self, url: &str, outcomes: &[Scripted]) -> Self {
        self.script("GET", url, outcomes)
    }

    pub(crate) fn post(self, url: &str, outcomes: &[Scripted]) -> Self {
        self.script("POST", url, outcomes)
    }

    fn script(self, method: &str, url: &str, outcomes: &[Scripted]) -> Self {
        self.transfers.lock().unwrap().insert(
            format!("{} {}", method, normalize(url)),
            outcomes.iter().cloned().collect(),
        );
        self
    }

    /// Every call made so far, as `"METHOD target"`.
    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of calls whose description starts with `prefix`.
    pub(crate) fn count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|call| call.starts_with(prefix)).count()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl Network for ScriptedNetwork {
    async fn tcp_connect(
        &self,
        host: &str,
        _port: u16,
        _timeout: Duration,
    ) -> Result<Duration, ProbeError> {
        self.record(format!("CONNECT {}", host));
        match next(&self.connects, host) {
            Some(Ok(ms)) => Ok(Duration::from_secs_f64(ms / 1000.0)),
            Some(Err(kind)) => Err(ProbeError::new(kind, host.to_string())),
            None => Err(unscripted(host)),
        }
    }

    async fn head(
        &self,
        url: &Url,
        _timeout: Duration,
    ) -> Result<Duration, ProbeError> {
        self.record(format!("HEAD {}", url));
        match next(&self.heads, url.as_str()) {
            Some(Ok(ms)) => Ok(Duration::from_secs_f64(ms / 1000.0)),
            Some(Err(kind)) => Err(ProbeError::new(kind, url.to_string())),
            None => Err(unscripted(url.as_str())),
        }
    }

    async fn download(
        &self,
        url: &Url,
        _limits: &TransferLimits,
        on_bytes: ByteSink<'_>,
    ) -> Result<ThroughputObservation, ProbeError> {
        let key = format!("GET {}", url);
        self.record(key.clone());
        tokio::time::sleep(self.delay).await;

        match next(&self.transfers, &key) {
            Some(Scripted::Transfer { bytes, secs }) => {
                on_bytes(bytes);
                Ok(ThroughputObservation { bytes_transferred: bytes, elapsed_secs: secs })
            }
            Some(Scripted::Partial { bytes, kind }) => {
                on_bytes(bytes);
                Err(ProbeError::new(kind, format!("{} broke off", url)))
            }
            Some(Scripted::Fail(kind)) => Err(ProbeError::new(kind, url.to_string())),
            None => Err(unscripted(&key)),
        }
    }

    async fn upload(
        &self,
        url: &Url,
        payload: Vec<u8>,
        _limits: &TransferLimits,
    ) -> Result<ThroughputObservation, ProbeError> {
        let key = format!("POST {}", url);
        self.record(format!("{} {}", key, payload.len()));
        tokio::time::sleep(self.delay).await;

        match next(&self.transfers, &key) {
            Some(Scripted::Transfer { secs, .. }) => Ok(ThroughputObservation {
                bytes_transferred: payload.len() as u64,
                elapsed_secs: secs,
            }),
            Some(Scripted::Partial { kind, .. }) | Some(Scripted::Fail(kind)) => {
                Err(ProbeError::new(kind, url.to_string()))
            }
            None => Err(unscripted(&key)),
        }
    }
}
