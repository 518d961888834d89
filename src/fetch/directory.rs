//! Country → dataset lookup backed by a time-bounded directory cache.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::{DirectorySource, FetchError};
use crate::models::{DatasetEntry, DatasetId, DirectoryEntry};

/// Why a country could not be located.
#[derive(Debug, Error)]
pub enum LocateError {
    #[error("Country not found: {0}")]
    NotFound(String),

    #[error("Failed to fetch dataset directory: {0}")]
    FetchFailed(#[source] FetchError),

    #[error("Unrecognised dataset URL for {country}: {url:?}")]
    ParseFailed { country: String, url: Option<String> },
}

/// Time source for cache expiry.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

struct CachedDirectory {
    entries: Arc<Vec<DirectoryEntry>>,
    loaded_at: DateTime<Utc>,
}

/// Directory contents with a freshness window measured from load time.
pub struct DirectoryCache {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    state: RwLock<Option<CachedDirectory>>,
}

impl DirectoryCache {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl,
            clock,
            state: RwLock::new(None),
        }
    }

    /// Cached entries if they are still fresh.
    pub async fn get(&self) -> Option<Arc<Vec<DirectoryEntry>>> {
        let state = self.state.read().await;
        let cached = state.as_ref()?;

        let age = self.clock.now().signed_duration_since(cached.loaded_at);
        if age.num_seconds() >= self.ttl.as_secs() as i64 {
            debug!("Directory cache expired ({}s old)", age.num_seconds());
            return None;
        }

        Some(Arc::clone(&cached.entries))
    }

    /// Replace the cached entries, stamping them with the current time.
    pub async fn store(&self, entries: Vec<DirectoryEntry>) -> Arc<Vec<DirectoryEntry>> {
        let entries = Arc::new(entries);
        *self.state.write().await = Some(CachedDirectory {
            entries: Arc::clone(&entries),
            loaded_at: self.clock.now(),
        });
        entries
    }

    pub async fn invalidate(&self) {
        *self.state.write().await = None;
    }
}

/// Resolves user-entered country names to dataset ids.
pub struct DatasetLocator {
    source: Arc<dyn DirectorySource>,
    cache: DirectoryCache,
    dataset_id_segment: usize,
}

impl DatasetLocator {
    pub fn new(
        source: Arc<dyn DirectorySource>,
        cache: DirectoryCache,
        dataset_id_segment: usize,
    ) -> Self {
        Self {
            source,
            cache,
            dataset_id_segment,
        }
    }

    pub fn cache(&self) -> &DirectoryCache {
        &self.cache
    }

    /// Directory entries, from cache when fresh.
    ///
    /// Concurrent callers that all miss will each refresh; the last write wins.
    pub async fn directory(&self) -> Result<Arc<Vec<DirectoryEntry>>, LocateError> {
        if let Some(entries) = self.cache.get().await {
            return Ok(entries);
        }

        info!("Refreshing dataset directory");
        let entries = self
            .source
            .fetch_directory()
            .await
            .map_err(LocateError::FetchFailed)?;
        Ok(self.cache.store(entries).await)
    }

    /// Find a country (case-insensitive, exact) and extract its dataset id.
    pub async fn locate(&self, country: &str) -> Result<DatasetEntry, LocateError> {
        let wanted = country.trim().to_lowercase();
        let directory = self.directory().await?;

        let entry = directory
            .iter()
            .find(|e| e.country.to_lowercase() == wanted)
            .ok_or_else(|| LocateError::NotFound(country.trim().to_string()))?;

        let dataset_id = entry
            .history_data
            .as_deref()
            .and_then(|url| extract_dataset_id(url, self.dataset_id_segment))
            .ok_or_else(|| {
                warn!(
                    "Directory entry for {} has no usable dataset URL",
                    entry.country
                );
                LocateError::ParseFailed {
                    country: entry.country.clone(),
                    url: entry.history_data.clone(),
                }
            })?;

        Ok(DatasetEntry {
            country_name: entry.country.clone(),
            dataset_id,
        })
    }
}

/// Take the `segment`-th `/`-separated piece of a dataset URL.
///
/// `https://api.apify.com/v2/datasets/<id>/items` has the id at index 5.
pub fn extract_dataset_id(url: &str, segment: usize) -> Option<DatasetId> {
    let piece = url.split('/').nth(segment)?;
    let piece = piece.split(['?', '#']).next().unwrap_or_default();
    if piece.is_empty() {
        None
    } else {
        Some(DatasetId::from(piece))
    }
}
