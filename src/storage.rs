//! Persistence of measurement results.
//!
//! The engine only ever calls the three operations on [`ResultStore`];
//! what sits behind them is up to the implementation.

use crate::errors::ProbeError;
use crate::results::MeasurementResult;
use async_trait::async_trait;
use log::debug;
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

/// Persistence for measurement results.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Append `result`.
    async fn save(&self, result: &MeasurementResult) -> Result<(), ProbeError>;

    /// Results belonging to `owner_id`, newest first.
    async fn list_by_owner(
        &self,
        owner_id: &str,
    ) -> Result<Vec<MeasurementResult>, ProbeError>;

    /// Fails with a storage error when no result has `result_id`.
    async fn delete(&self, result_id: &Uuid) -> Result<(), ProbeError>;
}

fn newest_first(
    results: impl Iterator<Item = MeasurementResult>,
    owner_id: &str,
) -> Vec<MeasurementResult> {
    let mut owned: Vec<_> =
        results.filter(|result| result.owner_id == owner_id).collect();
    owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    owned
}

fn not_found(result_id: &Uuid) -> ProbeError {
    ProbeError::storage(format!("no result with id {}", result_id))
}

/// Keeps results in memory for the lifetime of the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    results: RwLock<Vec<MeasurementResult>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ResultStore for MemoryStore {
    async fn save(&self, result: &MeasurementResult) -> Result<(), ProbeError> {
        self.results.write().await.push(result.clone());
        Ok(())
    }

    async fn list_by_owner(
        &self,
        owner_id: &str,
    ) -> Result<Vec<MeasurementResult>, ProbeError> {
        let results = self.results.read().await;
        Ok(newest_first(results.iter().cloned(), owner_id))
    }

    async fn delete(&self, result_id: &Uuid) -> Result<(), ProbeError> {
        let mut results = self.results.write().await;
        let before = results.len();
        results.retain(|result| &result.id != result_id);

        if results.len() == before {
            return Err(not_found(result_id));
        }

        Ok(())
    }
}

/// Keeps every result in one JSON document on disk.
///
/// The whole file is rewritten on each change; writes are serialised
/// through an internal lock.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    /// The file is created on first save.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), lock: Mutex::new(()) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Vec<MeasurementResult>, ProbeError> {
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || {
            let text = match std::fs::read_to_string(&path) {
                Ok(text) => text,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Ok(Vec::new());
                }
                Err(e) => {
                    return Err(ProbeError::storage(format!(
                        "cannot read {}",
                        path.display()
                    ))
                    .with_source(e));
                }
            };

            serde_json::from_str(&text).map_err(|e| {
                ProbeError::storage(format!("corrupt store {}", path.display()))
                    .with_source(e)
            })
        })
        .await
        .map_err(|e| ProbeError::storage("store reader panicked").with_source(e))?
    }

    async fn persist(
        &self,
        results: Vec<MeasurementResult>,
    ) -> Result<(), ProbeError> {
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || {
            let text = serde_json::to_string_pretty(&results).map_err(|e| {
                ProbeError::storage("cannot encode results").with_source(e)
            })?;

            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        ProbeError::storage(format!(
                            "cannot create {}",
                            parent.display()
                        ))
                        .with_source(e)
                    })?;
                }
            }

            std::fs::write(&path, text).map_err(|e| {
                ProbeError::storage(format!("cannot write {}", path.display()))
                    .with_source(e)
            })?;

            debug!("Wrote {} result(s) to {}", results.len(), path.display());
            Ok(())
        })
        .await
        .map_err(|e| ProbeError::storage("store writer panicked").with_source(e))?
    }
}

#[async_trait]
impl ResultStore for JsonFileStore {
    async fn save(&self, result: &MeasurementResult) -> Result<(), ProbeError> {
        let _guard = self.lock.lock().await;
        let mut results = self.load().await?;
        results.push(result.clone());
        self.persist(results).await
    }

    async fn list_by_owner(
        &self,
        owner_id: &str,
    ) -> Result<Vec<MeasurementResult>, ProbeError> {
        let _guard = self.lock.lock().await;
        let results = self.load().await?;
        Ok(newest_first(results.into_iter(), owner_id))
    }

    async fn delete(&self, result_id: &Uuid) -> Result<(), ProbeError> {
        let _guard = self.lock.lock().await;
        let mut results = self.load().await?;
        let before = results.len();
        results.retain(|result| &result.id != result_id);

        if results.len() == before {
            return Err(not_found(result_id));
        }

        self.persist(results).await
    }
}
