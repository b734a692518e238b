//! Store contract, error definitions and response shapes.

use serde::Deserialize;
use std::future::Future;
use thiserror::Error;

use crate::model::{Endpoint, EndpointId, RequestId, RequestRecord};

/// Errors that can occur while talking to the external store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Transport-level failure (connect refused, reset, TLS, body decode).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The store answered with a non-success status.
    #[error("store returned {status} for {url}")]
    Status { status: u16, url: String },

    /// The endpoint or request does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The request did not complete in time.
    #[error("store request timed out after {0} seconds")]
    Timeout(u64),

    /// A URL could not be built from the configured base.
    #[error("invalid store URL: {0}")]
    InvalidUrl(String),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// The external persistent store of endpoints and captured requests.
///
/// The feed only reads through `list_requests` and `get_endpoint`; the two
/// delete operations back the operator commands of the view binding.
pub trait RequestStore: Send + Sync + 'static {
    /// Most recent page of requests for an endpoint.
    fn list_requests(
        &self,
        endpoint: &EndpointId,
    ) -> impl Future<Output = StoreResult<Vec<RequestRecord>>> + Send;

    /// Endpoint configuration.
    fn get_endpoint(
        &self,
        endpoint: &EndpointId,
    ) -> impl Future<Output = StoreResult<Endpoint>> + Send;

    /// Delete one captured request.
    fn delete_request(
        &self,
        endpoint: &EndpointId,
        request: RequestId,
    ) -> impl Future<Output = StoreResult<()>> + Send;

    /// Delete every captured request of an endpoint.
    fn clear_requests(&self, endpoint: &EndpointId) -> impl Future<Output = StoreResult<()>> + Send;
}

/// Body of the list operation: a bare array or a page object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ListRequestsResponse {
    Page {
        requests: Vec<RequestRecord>,
        #[serde(default)]
        total: Option<u64>,
        #[serde(default)]
        page: Option<u32>,
        #[serde(default)]
        limit: Option<u32>,
    },
    Bare(Vec<RequestRecord>),
}

impl ListRequestsResponse {
    pub fn into_records(self) -> Vec<RequestRecord> {
        match self {
            ListRequestsResponse::Page { requests, .. } => requests,
            ListRequestsResponse::Bare(requests) => requests,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RECORD: &str = r#"{"id":1,"method":"GET","path":"/","headers":"{}","received_at":"2024-01-01 00:00:00"}"#;

    #[test]
    fn test_bare_list() {
        let body = format!("[{}]", RECORD);
        let parsed: ListRequestsResponse = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed.into_records().len(), 1);
    }

    #[test]
    fn test_paged_list() {
        let body = format!(
            r#"{{"requests":[{}],"total":31,"page":1,"limit":50}}"#,
            RECORD
        );
        let parsed: ListRequestsResponse = serde_json::from_str(&body).unwrap();
        match &parsed {
            ListRequestsResponse::Page { total, .. } => assert_eq!(*total, Some(31)),
            other => panic!("expected page, got {:?}", other),
        }
        assert_eq!(parsed.into_records()[0].id, 1);
    }

    #[test]
    fn test_error_display() {
        let err = StoreError::Timeout(10);
        assert_eq!(err.to_string(), "store request timed out after 10 seconds");

        let err = StoreError::Status {
            status: 502,
            url: "http://store/api".into(),
        };
        assert!(err.to_string().contains("502"));
    }
}
