//! Region catalog client
//!
//! Retrieves the list of regions with a single GET request. The endpoint
//! may append a signature after the JSON document, so only the first JSON
//! value of the body is decoded.

use crate::error::{AppError, FetchError, Result as AppResult};
use crate::models::{CatalogEnvelope, Region};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

/// Source of the region catalog
#[async_trait]
pub trait RegionSource: Send + Sync {
    /// Fetch the current list of regions
    async fn fetch(&self) -> Result<Vec<Region>, FetchError>;

    /// Human-readable location of the source, for logs
    fn describe(&self) -> String;
}

/// HTTP catalog client
pub struct CatalogClient {
    client: Client,
    url: String,
    timeout: Duration,
}

impl CatalogClient {
    /// Create a new catalog client; `timeout` bounds each whole request
    pub fn new(url: &str, timeout: Duration) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AppError::internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: url.to_string(),
            timeout,
        })
    }

    /// Request timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Fetch and decode the regions list from `url`
    pub async fn fetch_from(&self, url: &str) -> Result<Vec<Region>, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Network(format!("unexpected HTTP status {}", status)));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        decode_envelope(&body)
    }
}

#[async_trait]
impl RegionSource for CatalogClient {
    async fn fetch(&self) -> Result<Vec<Region>, FetchError> {
        self.fetch_from(&self.url).await
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}

/// Decode the first JSON document of `body` as a regions envelope
pub fn decode_envelope(body: &[u8]) -> Result<Vec<Region>, FetchError> {
    let mut documents = serde_json::Deserializer::from_slice(body).into_iter::<CatalogEnvelope>();

    match documents.next() {
        Some(Ok(envelope)) => Ok(envelope.regions),
        Some(Err(e)) => Err(FetchError::Decode(e.to_string())),
        None => Err(FetchError::Decode("empty response body".to_string())),
    }
}
