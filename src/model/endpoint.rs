//! Endpoint identity and configuration.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::model::record::Headers;

/// Opaque identifier of a webhook endpoint. Scopes exactly one live feed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EndpointId(String);

impl EndpointId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EndpointId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for EndpointId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Endpoint configuration as reported by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    pub id: EndpointId,

    #[serde(default)]
    pub created_at: Option<String>,

    /// Whether the endpoint answers captured requests with the custom response below.
    #[serde(default)]
    pub custom_response_enabled: bool,

    #[serde(default = "default_response_status")]
    pub response_status: u16,

    #[serde(default)]
    pub response_headers: Option<Headers>,

    #[serde(default)]
    pub response_body: Option<String>,

    #[serde(default)]
    pub request_count: u64,
}

impl Endpoint {
    /// An endpoint with the store's defaults.
    pub fn new(id: EndpointId) -> Self {
        Self {
            id,
            created_at: None,
            custom_response_enabled: false,
            response_status: default_response_status(),
            response_headers: None,
            response_body: None,
            request_count: 0,
        }
    }
}

fn default_response_status() -> u16 {
    200
}
