//! HTTP client for the external store.
//!
//! # Responsibilities
//! - Build store URLs from the configured base
//! - Enforce a deadline on every call
//! - Map HTTP statuses onto `StoreError`

use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio::time::timeout;
use url::Url;

use crate::config::StoreConfig;
use crate::model::{Endpoint, EndpointId, RequestId, RequestRecord};
use crate::store::types::{ListRequestsResponse, RequestStore, StoreError, StoreResult};

/// Store client over the store's JSON HTTP API.
#[derive(Clone)]
pub struct HttpStore {
    client: Client,
    base_url: Url,
    page_limit: u32,
    timeout_secs: u64,
}

impl HttpStore {
    /// Create a new store client.
    pub fn new(config: &StoreConfig) -> StoreResult<Self> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| StoreError::InvalidUrl(format!("'{}': {}", config.base_url, e)))?;

        Ok(Self {
            client: Client::new(),
            base_url,
            page_limit: config.page_limit,
            timeout_secs: config.request_timeout_secs,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url(&self, segments: &[&str]) -> StoreResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| StoreError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send(&self, method: Method, url: Url) -> StoreResult<reqwest::Response> {
        let request = self.client.request(method, url.clone()).send();
        let response = timeout(Duration::from_secs(self.timeout_secs), request)
            .await
            .map_err(|_| StoreError::Timeout(self.timeout_secs))??;

        match response.status() {
            status if status.is_success() => Ok(response),
            StatusCode::NOT_FOUND => Err(StoreError::NotFound(url.path().to_string())),
            status => Err(StoreError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            }),
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> StoreResult<T> {
        let response = self.send(Method::GET, url).await?;
        Ok(response.json::<T>().await?)
    }
}

impl RequestStore for HttpStore {
    async fn list_requests(&self, endpoint: &EndpointId) -> StoreResult<Vec<RequestRecord>> {
        let mut url = self.url(&["api", "endpoints", endpoint.as_str(), "requests"])?;
        url.query_pairs_mut()
            .append_pair("limit", &self.page_limit.to_string());

        let body: ListRequestsResponse = self.get_json(url).await?;
        let records = body
            .into_records()
            .into_iter()
            .map(|record| record.with_endpoint(endpoint))
            .collect::<Vec<_>>();

        tracing::debug!(endpoint = %endpoint, count = records.len(), "Listed requests");
        Ok(records)
    }

    async fn get_endpoint(&self, endpoint: &EndpointId) -> StoreResult<Endpoint> {
        let url = self.url(&["api", "endpoints", endpoint.as_str()])?;
        self.get_json(url).await
    }

    async fn delete_request(&self, endpoint: &EndpointId, request: RequestId) -> StoreResult<()> {
        let url = self.url(&[
            "api",
            "endpoints",
            endpoint.as_str(),
            "requests",
            &request.to_string(),
        ])?;
        self.send(Method::DELETE, url).await?;
        tracing::info!(endpoint = %endpoint, request, "Deleted request");
        Ok(())
    }

    async fn clear_requests(&self, endpoint: &EndpointId) -> StoreResult<()> {
        let url = self.url(&["api", "endpoints", endpoint.as_str(), "requests"])?;
        self.send(Method::DELETE, url).await?;
        tracing::info!(endpoint = %endpoint, "Cleared requests");
        Ok(())
    }
}
