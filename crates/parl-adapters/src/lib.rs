//! Upstream source adapters: one GET per resource, decoded into typed records.

use async_trait::async_trait;
use parl_core::{decode_collection, Bill, DecodeError, Mp, NaturalKey};
use parl_storage::{FetchError, HttpFetcher, Resource};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

pub const CRATE_NAME: &str = "parl-adapters";

pub const DEFAULT_BILLS_URL: &str = "https://api.openparliament.ca/bills/?format=json";
pub const DEFAULT_MPS_URL: &str = "https://api.openparliament.ca/politicians/?format=json";

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("decoding {resource} response: {source}")]
    Decode {
        resource: Resource,
        #[source]
        source: DecodeError,
    },
}

impl AdapterError {
    pub fn resource(&self) -> Resource {
        match self {
            AdapterError::Fetch(err) => err.resource(),
            AdapterError::Decode { resource, .. } => *resource,
        }
    }

    pub fn is_decode(&self) -> bool {
        matches!(self, AdapterError::Decode { .. })
    }
}

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    type Record: NaturalKey + Send + Sync + 'static;

    fn resource(&self) -> Resource;
    fn url(&self) -> &str;

    /// Fetch and decode the whole collection. An empty `objects` array is
    /// `Ok(vec![])`.
    async fn fetch(&self, http: &HttpFetcher) -> Result<Vec<Self::Record>, AdapterError>;
}

async fn fetch_collection<T: DeserializeOwned>(
    http: &HttpFetcher,
    resource: Resource,
    url: &str,
) -> Result<Vec<T>, AdapterError> {
    let resp = http.fetch_bytes(resource, url).await?;
    let records = decode_collection(&resp.body)
        .map_err(|source| AdapterError::Decode { resource, source })?;
    debug!(resource = resource.as_str(), records = records.len(), "decoded upstream collection");
    Ok(records)
}

#[derive(Debug, Clone)]
pub struct BillsAdapter {
    url: String,
}

impl BillsAdapter {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl Default for BillsAdapter {
    fn default() -> Self {
        Self::new(DEFAULT_BILLS_URL)
    }
}

#[async_trait]
impl SourceAdapter for BillsAdapter {
    type Record = Bill;

    fn resource(&self) -> Resource {
        Resource::Bills
    }

    fn url(&self) -> &str {
        &self.url
    }

    async fn fetch(&self, http: &HttpFetcher) -> Result<Vec<Bill>, AdapterError> {
        fetch_collection(http, Resource::Bills, &self.url).await
    }
}

#[derive(Debug, Clone)]
pub struct MpsAdapter {
    url: String,
}

impl MpsAdapter {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl Default for MpsAdapter {
    fn default() -> Self {
        Self::new(DEFAULT_MPS_URL)
    }
}

#[async_trait]
impl SourceAdapter for MpsAdapter {
    type Record = Mp;

    fn resource(&self) -> Resource {
        Resource::Mps
    }

    fn url(&self) -> &str {
        &self.url
    }

    async fn fetch(&self, http: &HttpFetcher) -> Result<Vec<Mp>, AdapterError> {
        fetch_collection(http, Resource::Mps, &self.url).await
    }
}
