//! HTTP fetch utilities and the relational store handle for parlwatch.

use std::fmt;
use std::time::Duration;

use anyhow::Context;
use reqwest::StatusCode;
use thiserror::Error;
use tracing::{debug, info_span, Instrument};

mod records;

pub use records::{
    MemoryRecordStore, PgRecordStore, PoolConfig, RecordStore, StoreError, SCHEMA_SQL,
};
pub use sqlx::Error as SqlxError;

pub const CRATE_NAME: &str = "parl-storage";

/// Named upstream collection. Every fetch error carries one so logs can tell
/// the two streams apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Bills,
    Mps,
}

impl Resource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resource::Bills => "bills",
            Resource::Mps => "mps",
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Option<Duration>,
    pub user_agent: Option<String>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Some(Duration::from_secs(30)),
            user_agent: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchedResponse {
    pub status: StatusCode,
    pub final_url: String,
    pub body: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request for {resource} failed: {source}")]
    Request {
        resource: Resource,
        #[source]
        source: reqwest::Error,
    },
    #[error("http status {status} for {resource} at {url}")]
    HttpStatus {
        resource: Resource,
        status: u16,
        url: String,
    },
}

impl FetchError {
    pub fn resource(&self) -> Resource {
        match self {
            FetchError::Request { resource, .. } | FetchError::HttpStatus { resource, .. } => {
                *resource
            }
        }
    }
}

/// Single-attempt GET client. Retrying is left to the next scheduled cycle.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(config: HttpClientConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder().gzip(true).brotli(true);

        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        let client = builder.build().context("building reqwest client")?;
        Ok(Self { client })
    }

    pub async fn fetch_bytes(
        &self,
        resource: Resource,
        url: &str,
    ) -> Result<FetchedResponse, FetchError> {
        let span = info_span!("http_fetch", resource = resource.as_str(), url);
        async move {
            let resp = self
                .client
                .get(url)
                .send()
                .await
                .map_err(|source| FetchError::Request { resource, source })?;

            let status = resp.status();
            let final_url = resp.url().to_string();
            if !status.is_success() {
                return Err(FetchError::HttpStatus {
                    resource,
                    status: status.as_u16(),
                    url: final_url,
                });
            }

            let body = resp
                .bytes()
                .await
                .map_err(|source| FetchError::Request { resource, source })?
                .to_vec();
            debug!(bytes = body.len(), "fetched upstream body");
            Ok(FetchedResponse {
                status,
                final_url,
                body,
            })
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode as AxumStatus, routing::get, Router};
    use tokio::net::TcpListener;

    async fn spawn_upstream(router: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            axum::serve(listener, router).await.expect("serve");
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn successful_get_returns_full_body() {
        let base = spawn_upstream(Router::new().route("/bills", get(|| async { r#"{"objects":[]}"# }))).await;
        let fetcher = HttpFetcher::new(HttpClientConfig::default()).expect("client");
        let resp = fetcher
            .fetch_bytes(Resource::Bills, &format!("{base}/bills"))
            .await
            .expect("fetch");
        assert_eq!(resp.status, StatusCode::OK);
        assert_eq!(resp.body, br#"{"objects":[]}"#);
    }

    #[tokio::test]
    async fn non_success_status_names_the_resource() {
        let base = spawn_upstream(Router::new().route(
            "/mps",
            get(|| async { (AxumStatus::SERVICE_UNAVAILABLE, "down") }),
        ))
        .await;
        let fetcher = HttpFetcher::new(HttpClientConfig::default()).expect("client");
        let err = fetcher
            .fetch_bytes(Resource::Mps, &format!("{base}/mps"))
            .await
            .expect_err("503 must fail");
        match &err {
            FetchError::HttpStatus { resource, status, .. } => {
                assert_eq!(*resource, Resource::Mps);
                assert_eq!(*status, 503);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.to_string().contains("mps"));
    }

    #[tokio::test]
    async fn unreachable_upstream_is_a_request_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);

        let fetcher = HttpFetcher::new(HttpClientConfig {
            timeout: Some(Duration::from_secs(2)),
            user_agent: Some("parlwatch-test".into()),
        })
        .expect("client");
        let err = fetcher
            .fetch_bytes(Resource::Bills, &format!("http://{addr}/bills"))
            .await
            .expect_err("closed port must fail");
        assert!(matches!(err, FetchError::Request { .. }));
        assert_eq!(err.resource(), Resource::Bills);
    }
    #[tokio::test]
    async fn slow_upstream_hits_the_request_timeout() {
        let base = spawn_upstream(Router::new().route(
            "/bills",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                r#"{"objects":[]}"#
            }),
        ))
        .await;
        let fetcher = HttpFetcher::new(HttpClientConfig {
            timeout: Some(Duration::from_millis(100)),
            user_agent: None,
        })
        .expect("client");

        let started = std::time::Instant::now();
        let err = fetcher
            .fetch_bytes(Resource::Bills, &format!("{base}/bills"))
            .await
            .expect_err("timeout must fail");
        assert!(started.elapsed() < Duration::from_secs(2));
        match &err {
            FetchError::Request { resource, source } => {
                assert_eq!(*resource, Resource::Bills);
                assert!(source.is_timeout(), "{source:?}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
