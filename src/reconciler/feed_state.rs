//! Per-endpoint feed state.
//!
//! # Invariants
//! - `items` holds at most one record per id
//! - `items` is ordered by `received_at` desc, ties by `id` desc
//! - `high_water_mark` never decreases
//! - expiry of a `recently_arrived` entry never touches `items`

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use tokio::time::Instant;

use crate::liveness::ConnectionStatus;
use crate::model::{Endpoint, EndpointId, RequestId, RequestRecord};

/// Reconciled view of one endpoint's captured requests.
#[derive(Debug, Clone)]
pub struct FeedState {
    endpoint_id: EndpointId,
    endpoint: Option<Endpoint>,
    items: Vec<RequestRecord>,
    ids: HashSet<RequestId>,
    high_water_mark: RequestId,
    recently_arrived: HashMap<RequestId, Instant>,
    connection_status: ConnectionStatus,
}

impl FeedState {
    /// An empty feed for `endpoint_id`.
    pub fn empty(endpoint_id: EndpointId) -> Self {
        Self {
            endpoint_id,
            endpoint: None,
            items: Vec::new(),
            ids: HashSet::new(),
            high_water_mark: 0,
            recently_arrived: HashMap::new(),
            connection_status: ConnectionStatus::Disconnected,
        }
    }

    pub fn endpoint_id(&self) -> &EndpointId {
        &self.endpoint_id
    }

    pub fn endpoint(&self) -> Option<&Endpoint> {
        self.endpoint.as_ref()
    }

    pub fn items(&self) -> &[RequestRecord] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, id: RequestId) -> bool {
        self.ids.contains(&id)
    }

    pub fn high_water_mark(&self) -> RequestId {
        self.high_water_mark
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.connection_status
    }

    pub fn is_recently_arrived(&self, id: RequestId) -> bool {
        self.recently_arrived.contains_key(&id)
    }

    pub fn recently_arrived(&self) -> impl Iterator<Item = RequestId> + '_ {
        self.recently_arrived.keys().copied()
    }

    /// Earliest pending highlight expiry.
    pub fn next_expiry(&self) -> Option<Instant> {
        self.recently_arrived.values().min().copied()
    }

    /// Whether a record belongs to this feed. Records without an endpoint id are accepted.
    pub fn owns(&self, record: &RequestRecord) -> bool {
        record
            .endpoint_id
            .as_ref()
            .map_or(true, |id| *id == self.endpoint_id)
    }

    pub(crate) fn set_connection_status(&mut self, status: ConnectionStatus) {
        self.connection_status = status;
    }

    pub(crate) fn set_endpoint(&mut self, endpoint: Endpoint) {
        self.endpoint = Some(endpoint);
    }

    /// Insert keeping feed order. Returns `false` for a known id.
    pub(crate) fn insert(&mut self, record: RequestRecord) -> bool {
        if !self.ids.insert(record.id) {
            return false;
        }
        self.high_water_mark = self.high_water_mark.max(record.id);
        let at = self
            .items
            .partition_point(|existing| existing.feed_order(&record) == Ordering::Less);
        self.items.insert(at, record);
        true
    }

    pub(crate) fn mark_recent(&mut self, id: RequestId, expires_at: Instant) {
        self.recently_arrived.insert(id, expires_at);
    }

    /// Drop highlight entries expired at `now`. Returns how many were dropped.
    pub fn expire_recent(&mut self, now: Instant) -> usize {
        let before = self.recently_arrived.len();
        self.recently_arrived.retain(|_, expires_at| *expires_at > now);
        before - self.recently_arrived.len()
    }

    pub(crate) fn remove(&mut self, id: RequestId) -> bool {
        self.recently_arrived.remove(&id);
        if !self.ids.remove(&id) {
            return false;
        }
        self.items.retain(|record| record.id != id);
        true
    }

    pub(crate) fn clear(&mut self) -> usize {
        let removed = self.items.len();
        self.items.clear();
        self.ids.clear();
        self.recently_arrived.clear();
        removed
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::time::Duration;

    use crate::model::Headers;

    /// A record received `secs` seconds after a fixed epoch.
    pub(crate) fn record(id: RequestId, secs: i64) -> RequestRecord {
        RequestRecord {
            id,
            endpoint_id: Some(EndpointId::from("ep-1")),
            method: "POST".into(),
            path: format!("/webhook/ep-1/{}", id),
            query_string: None,
            headers: Headers::new(),
            body: Some(format!("{{\"n\":{}}}", id)),
            content_type: Some("application/json".into()),
            received_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
                + chrono::Duration::seconds(secs),
            ip_address: Some("10.0.0.1".into()),
        }
    }

    pub(crate) fn ids(state: &FeedState) -> Vec<RequestId> {
        state.items().iter().map(|r| r.id).collect()
    }

    #[test]
    fn test_insert_orders_and_dedups() {
        let mut state = FeedState::empty(EndpointId::from("ep-1"));
        assert!(state.insert(record(1, 10)));
        assert!(state.insert(record(3, 30)));
        assert!(state.insert(record(2, 20)));
        assert!(!state.insert(record(2, 20)));

        assert_eq!(ids(&state), vec![3, 2, 1]);
        assert_eq!(state.high_water_mark(), 3);
    }

    #[test]
    fn test_same_timestamp_orders_by_id() {
        let mut state = FeedState::empty(EndpointId::from("ep-1"));
        state.insert(record(5, 10));
        state.insert(record(7, 10));
        state.insert(record(6, 10));
        assert_eq!(ids(&state), vec![7, 6, 5]);
    }

    #[test]
    fn test_remove_keeps_high_water_mark() {
        let mut state = FeedState::empty(EndpointId::from("ep-1"));
        state.insert(record(4, 4));
        state.mark_recent(4, Instant::now() + Duration::from_secs(3));

        assert!(state.remove(4));
        assert!(!state.remove(4));
        assert!(state.is_empty());
        assert!(!state.is_recently_arrived(4));
        assert_eq!(state.high_water_mark(), 4);
    }

    #[test]
    fn test_expiry_only_touches_highlights() {
        let mut state = FeedState::empty(EndpointId::from("ep-1"));
        let now = Instant::now();
        state.insert(record(1, 1));
        state.insert(record(2, 2));
        state.mark_recent(1, now + Duration::from_secs(1));
        state.mark_recent(2, now + Duration::from_secs(3));

        assert_eq!(state.next_expiry(), Some(now + Duration::from_secs(1)));
        assert_eq!(state.expire_recent(now + Duration::from_secs(2)), 1);
        assert!(!state.is_recently_arrived(1));
        assert!(state.is_recently_arrived(2));
        assert_eq!(state.len(), 2);
    }

    #[test]
    fn test_owns() {
        let state = FeedState::empty(EndpointId::from("ep-1"));
        let mut foreign = record(1, 1);
        foreign.endpoint_id = Some(EndpointId::from("ep-2"));
        let mut anonymous = record(2, 2);
        anonymous.endpoint_id = None;

        assert!(state.owns(&record(3, 3)));
        assert!(!state.owns(&foreign));
        assert!(state.owns(&anonymous));
    }
}
