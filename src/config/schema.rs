//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the feed.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for a live request feed.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct FeedConfig {
    /// External store (HTTP API) settings.
    pub store: StoreConfig,

    /// Push channel settings.
    pub channel: ChannelConfig,

    /// Reconnection backoff settings.
    pub reconnect: ReconnectConfig,

    /// Liveness fallback window.
    pub fallback: FallbackConfig,

    /// Polling source settings.
    pub polling: PollingConfig,

    /// Reconciler settings.
    pub feed: ReconcilerConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// External store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Base URL of the store API (e.g., "http://localhost:3000").
    pub base_url: String,

    /// Timeout for a single store request in seconds.
    pub request_timeout_secs: u64,

    /// Page size requested from the list operation.
    pub page_limit: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            request_timeout_secs: 10,
            page_limit: 50,
        }
    }
}

/// Push channel configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Explicit ws(s) base URL. Derived from the store base URL when unset.
    pub base_url: Option<String>,

    /// Path prefix; the endpoint id is appended as the last segment.
    pub path_prefix: String,

    /// Connect attempt timeout in seconds.
    pub connect_timeout_secs: u64,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            path_prefix: "/api/ws".to_string(),
            connect_timeout_secs: 10,
        }
    }
}

/// Reconnection policy configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
        }
    }
}

/// Liveness fallback configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FallbackConfig {
    /// How long the channel may stay unopened before polling starts.
    pub ceiling_ms: u64,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self { ceiling_ms: 10_000 }
    }
}

impl FallbackConfig {
    pub fn ceiling(&self) -> Duration {
        Duration::from_millis(self.ceiling_ms)
    }
}

/// Polling source configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Polling interval in milliseconds.
    pub interval_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self { interval_ms: 5000 }
    }
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Reconciler configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReconcilerConfig {
    /// How long a freshly arrived request stays flagged as new.
    pub highlight_ms: u64,

    /// Re-fetch the bulk list when the channel re-opens after a loss.
    pub refresh_on_reconnect: bool,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            highlight_ms: 3000,
            refresh_on_reconnect: true,
        }
    }
}

impl ReconcilerConfig {
    pub fn highlight(&self) -> Duration {
        Duration::from_millis(self.highlight_ms)
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9464".to_string(),
        }
    }
}
