//! HTTP fetching of dataset items and the dataset directory.
//!
//! Items come from a templated URL (`$ID` is replaced by the dataset id);
//! the directory lists every country together with its dataset URL.

pub mod directory;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::Client;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::config::FetchConfig;
use crate::models::{DatasetId, DirectoryEntry, SnapshotRecord};

pub use directory::{Clock, DatasetLocator, DirectoryCache, LocateError, SystemClock};

/// Placeholder in the items URL template.
pub const DATASET_ID_PLACEHOLDER: &str = "$ID";

/// Errors that can occur during fetching.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("HTTP {status}: {message}")]
    HttpStatus { status: u16, message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Source of daily snapshot records for a dataset.
#[async_trait]
pub trait ItemSource: Send + Sync {
    async fn fetch_items(
        &self,
        dataset_id: &DatasetId,
        limit: Option<u32>,
        descending: bool,
    ) -> Result<Vec<SnapshotRecord>, FetchError>;
}

/// Source of the country → dataset directory.
#[async_trait]
pub trait DirectorySource: Send + Sync {
    async fn fetch_directory(&self) -> Result<Vec<DirectoryEntry>, FetchError>;
}

/// HTTP client for the dataset API.
pub struct Fetcher {
    client: Client,
    config: FetchConfig,
}

impl Fetcher {
    /// Create a new fetcher with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent)
                .unwrap_or_else(|_| HeaderValue::from_static("covid-bot/0.1.0")),
        );

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .default_headers(headers)
            .build()?;

        Ok(Self { client, config })
    }

    /// Create a fetcher with default configuration.
    pub fn with_defaults() -> Result<Self, FetchError> {
        Self::new(FetchConfig::default())
    }

    /// Build the items URL for a dataset.
    ///
    /// Query parameters, in order: `limit` (omitted when unset or zero),
    /// `desc`, `clean=1`, `format=json`.
    pub fn items_url(
        &self,
        dataset_id: &DatasetId,
        limit: Option<u32>,
        descending: bool,
    ) -> Result<Url, FetchError> {
        build_items_url(&self.config.items_url, dataset_id, limit, descending)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &Url) -> Result<T, FetchError> {
        debug!("GET {}", url);
        let response = self.client.get(url.as_str()).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
                message: status.canonical_reason().unwrap_or("Unknown").to_string(),
            });
        }

        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

fn build_items_url(
    template: &str,
    dataset_id: &DatasetId,
    limit: Option<u32>,
    descending: bool,
) -> Result<Url, FetchError> {
    let raw = template.replace(DATASET_ID_PLACEHOLDER, dataset_id.as_str());
    let mut url = Url::parse(&raw).map_err(|e| FetchError::InvalidUrl(format!("{}: {}", raw, e)))?;

    {
        let mut query = url.query_pairs_mut();
        if let Some(limit) = limit.filter(|&l| l > 0) {
            query.append_pair("limit", &limit.to_string());
        }
        query
            .append_pair("desc", if descending { "1" } else { "0" })
            .append_pair("clean", "1")
            .append_pair("format", "json");
    }

    Ok(url)
}

#[async_trait]
impl ItemSource for Fetcher {
    async fn fetch_items(
        &self,
        dataset_id: &DatasetId,
        limit: Option<u32>,
        descending: bool,
    ) -> Result<Vec<SnapshotRecord>, FetchError> {
        let url = self.items_url(dataset_id, limit, descending)?;
        let items: Vec<SnapshotRecord> = self.get_json(&url).await?;
        info!("Fetched {} items for dataset {}", items.len(), dataset_id);
        Ok(items)
    }
}

#[async_trait]
impl DirectorySource for Fetcher {
    async fn fetch_directory(&self) -> Result<Vec<DirectoryEntry>, FetchError> {
        let url = Url::parse(&self.config.directory_url)
            .map_err(|e| FetchError::InvalidUrl(format!("{}: {}", self.config.directory_url, e)))?;
        let entries: Vec<DirectoryEntry> = self.get_json(&url).await?;
        info!("Fetched dataset directory with {} entries", entries.len());
        Ok(entries)
    }
}
