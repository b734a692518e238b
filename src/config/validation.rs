//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate URLs and their schemes
//! - Validate value ranges (durations > 0, page limit bounds)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: FeedConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;
use thiserror::Error;
use url::Url;

use crate::config::schema::FeedConfig;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field}: invalid URL '{value}'")]
    InvalidUrl { field: &'static str, value: String },

    #[error("{field}: unsupported scheme '{scheme}'")]
    UnsupportedScheme { field: &'static str, scheme: String },

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("reconnect.base_delay_ms ({base}) exceeds reconnect.max_delay_ms ({max})")]
    BackoffInverted { base: u64, max: u64 },

    #[error("store.page_limit must be within 1..=100, got {0}")]
    PageLimit(u32),

    #[error("observability.metrics_address: invalid socket address '{0}'")]
    MetricsAddress(String),
}

/// Validate a configuration, collecting every violation.
pub fn validate_config(config: &FeedConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_url(
        &mut errors,
        "store.base_url",
        &config.store.base_url,
        &["http", "https"],
    );
    if let Some(channel_base) = &config.channel.base_url {
        check_url(&mut errors, "channel.base_url", channel_base, &["ws", "wss"]);
    }

    let durations = [
        ("store.request_timeout_secs", config.store.request_timeout_secs),
        ("channel.connect_timeout_secs", config.channel.connect_timeout_secs),
        ("reconnect.base_delay_ms", config.reconnect.base_delay_ms),
        ("reconnect.max_delay_ms", config.reconnect.max_delay_ms),
        ("fallback.ceiling_ms", config.fallback.ceiling_ms),
        ("polling.interval_ms", config.polling.interval_ms),
        ("feed.highlight_ms", config.feed.highlight_ms),
    ];
    for (field, value) in durations {
        if value == 0 {
            errors.push(ValidationError::Zero { field });
        }
    }

    if config.reconnect.base_delay_ms > config.reconnect.max_delay_ms {
        errors.push(ValidationError::BackoffInverted {
            base: config.reconnect.base_delay_ms,
            max: config.reconnect.max_delay_ms,
        });
    }

    if !(1..=100).contains(&config.store.page_limit) {
        errors.push(ValidationError::PageLimit(config.store.page_limit));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::MetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_url(
    errors: &mut Vec<ValidationError>,
    field: &'static str,
    value: &str,
    schemes: &[&str],
) {
    match Url::parse(value) {
        Ok(url) if schemes.contains(&url.scheme()) => {}
        Ok(url) => errors.push(ValidationError::UnsupportedScheme {
            field,
            scheme: url.scheme().to_string(),
        }),
        Err(_) => errors.push(ValidationError::InvalidUrl {
            field,
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&FeedConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = FeedConfig::default();
        config.store.base_url = "ftp://example.com".into();
        config.channel.base_url = Some("not a url".into());
        config.polling.interval_ms = 0;
        config.reconnect.base_delay_ms = 60_000;
        config.store.page_limit = 500;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 5);
        assert!(errors.contains(&ValidationError::Zero {
            field: "polling.interval_ms"
        }));
        assert!(errors.contains(&ValidationError::PageLimit(500)));
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::UnsupportedScheme { scheme, .. } if scheme == "ftp")));
    }

    #[test]
    fn test_metrics_address_checked_only_when_enabled() {
        let mut config = FeedConfig::default();
        config.observability.metrics_address = "nowhere".into();
        assert!(validate_config(&config).is_ok());

        config.observability.metrics_enabled = true;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors, vec![ValidationError::MetricsAddress("nowhere".into())]);
    }
}
