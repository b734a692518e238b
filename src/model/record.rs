//! Captured request records.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use std::cmp::{Ordering, Reverse};
use std::fmt;

use crate::model::endpoint::EndpointId;

/// Store-assigned request id. Monotonically increasing per endpoint.
pub type RequestId = u64;

/// One captured HTTP request. Never mutated after it is observed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestRecord {
    pub id: RequestId,

    /// Owning endpoint. Push frames may omit it; the channel fills it in.
    #[serde(default)]
    pub endpoint_id: Option<EndpointId>,

    pub method: String,

    pub path: String,

    #[serde(default)]
    pub query_string: Option<String>,

    #[serde(default)]
    pub headers: Headers,

    #[serde(default)]
    pub body: Option<String>,

    #[serde(default)]
    pub content_type: Option<String>,

    #[serde(with = "timestamp")]
    pub received_at: DateTime<Utc>,

    #[serde(default)]
    pub ip_address: Option<String>,
}

impl RequestRecord {
    /// Sort key placing the newest record first: `received_at` desc, then `id` desc.
    pub fn feed_order_key(&self) -> (Reverse<DateTime<Utc>>, Reverse<RequestId>) {
        (Reverse(self.received_at), Reverse(self.id))
    }

    /// Compare two records by feed order (newest first).
    pub fn feed_order(&self, other: &Self) -> Ordering {
        self.feed_order_key().cmp(&other.feed_order_key())
    }

    /// Attach the endpoint id when the source left it out.
    pub fn with_endpoint(mut self, endpoint: &EndpointId) -> Self {
        if self.endpoint_id.is_none() {
            self.endpoint_id = Some(endpoint.clone());
        }
        self
    }
}

/// Ordered request headers. Names keep their case but match case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Append a header, keeping any existing header of the same name.
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push((name.into(), value.into()));
    }

    /// First value for `name`, compared case-insensitively.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl Serialize for Headers {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, value) in &self.0 {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

// The store keeps headers as a JSON-encoded string column; the push frames
// of newer servers carry a plain object. Both are accepted.
impl<'de> Deserialize<'de> for Headers {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct HeadersVisitor;

        impl<'de> Visitor<'de> for HeadersVisitor {
            type Value = Headers;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a header object or a JSON-encoded header object")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Headers, A::Error> {
                let mut headers = Headers::new();
                while let Some((name, value)) = access.next_entry::<String, HeaderValue>()? {
                    headers.push(name, value.0);
                }
                Ok(headers)
            }

            fn visit_str<E: de::Error>(self, raw: &str) -> Result<Headers, E> {
                if raw.trim().is_empty() {
                    return Ok(Headers::new());
                }
                serde_json::from_str(raw).map_err(E::custom)
            }

            fn visit_unit<E: de::Error>(self) -> Result<Headers, E> {
                Ok(Headers::new())
            }
        }

        deserializer.deserialize_any(HeadersVisitor)
    }
}

/// Header value that tolerates non-string JSON scalars.
struct HeaderValue(String);

impl<'de> Deserialize<'de> for HeaderValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        Ok(HeaderValue(match value {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        }))
    }
}

/// RFC 3339 timestamps, with a fallback for the store's `YYYY-MM-DD HH:MM:SS` (UTC).
pub mod timestamp {
    use super::*;

    const SQL_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
            return Some(ts.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, SQL_FORMAT)
            .ok()
            .map(|naive| naive.and_utc())
    }

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&ts.to_rfc3339())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| de::Error::custom(format!("invalid timestamp '{}'", raw)))
    }
}
