//! Event reconciliation: the single merge point for bulk, push and poll data.

use std::time::Duration;
use tokio::time::Instant;

use crate::config::ReconcilerConfig;
use crate::model::{EndpointId, FeedEvent, RequestId, RequestRecord};
use crate::reconciler::feed_state::FeedState;

/// Result of applying one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// A new record was inserted and flagged as recently arrived.
    Inserted(RequestId),
    /// The record was already present; nothing changed.
    Duplicate(RequestId),
    /// The record names another endpoint and was rejected.
    Foreign(RequestId),
    /// A record was removed.
    Removed(RequestId),
    /// A deletion named a record that is not in the feed.
    NotPresent(RequestId),
    /// Every record was removed.
    Cleared(usize),
    /// The endpoint configuration was replaced.
    EndpointUpdated,
    /// An endpoint update for a different endpoint was ignored.
    Ignored,
}

impl ApplyOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplyOutcome::Inserted(_) => "inserted",
            ApplyOutcome::Duplicate(_) => "duplicate",
            ApplyOutcome::Foreign(_) => "foreign",
            ApplyOutcome::Removed(_) => "removed",
            ApplyOutcome::NotPresent(_) => "not_present",
            ApplyOutcome::Cleared(_) => "cleared",
            ApplyOutcome::EndpointUpdated => "endpoint_updated",
            ApplyOutcome::Ignored => "ignored",
        }
    }

    /// Whether the feed changed.
    pub fn changed(&self) -> bool {
        matches!(
            self,
            ApplyOutcome::Inserted(_)
                | ApplyOutcome::Removed(_)
                | ApplyOutcome::Cleared(_)
                | ApplyOutcome::EndpointUpdated
        )
    }
}

/// Merges events into a `FeedState`.
#[derive(Debug, Clone)]
pub struct Reconciler {
    highlight: Duration,
}

impl Reconciler {
    pub fn new(config: &ReconcilerConfig) -> Self {
        Self {
            highlight: config.highlight(),
        }
    }

    pub fn highlight(&self) -> Duration {
        self.highlight
    }

    /// Build a feed from a bulk fetch. Order, dedup and high-water mark are
    /// derived from the records; nothing is flagged as recently arrived.
    pub fn initialize(&self, endpoint_id: EndpointId, bulk: Vec<RequestRecord>) -> FeedState {
        let mut state = FeedState::empty(endpoint_id);
        self.merge_bulk(&mut state, bulk);
        state
    }

    /// Merge a later bulk fetch: inserts unseen records without flagging
    /// them and never removes anything. Returns how many were inserted.
    pub fn merge_bulk(&self, state: &mut FeedState, bulk: Vec<RequestRecord>) -> usize {
        let mut inserted = 0;
        for record in bulk {
            let record = record.with_endpoint(&state.endpoint_id().clone());
            if !state.owns(&record) {
                tracing::debug!(endpoint = %state.endpoint_id(), id = record.id, "Skipping foreign record in bulk list");
                continue;
            }
            if state.insert(record) {
                inserted += 1;
            }
        }
        inserted
    }

    /// Apply one event at time `now`.
    pub fn apply_event(&self, state: &mut FeedState, event: FeedEvent, now: Instant) -> ApplyOutcome {
        match event {
            FeedEvent::NewRequest(record) => {
                let id = record.id;
                if !state.owns(&record) {
                    return ApplyOutcome::Foreign(id);
                }
                let record = record.with_endpoint(&state.endpoint_id().clone());
                if state.insert(record) {
                    state.mark_recent(id, now + self.highlight);
                    ApplyOutcome::Inserted(id)
                } else {
                    ApplyOutcome::Duplicate(id)
                }
            }
            FeedEvent::EndpointUpdated(endpoint) => {
                if endpoint.id != *state.endpoint_id() {
                    return ApplyOutcome::Ignored;
                }
                state.set_endpoint(endpoint);
                ApplyOutcome::EndpointUpdated
            }
            FeedEvent::RequestDeleted(id) => {
                if state.remove(id) {
                    ApplyOutcome::Removed(id)
                } else {
                    ApplyOutcome::NotPresent(id)
                }
            }
            FeedEvent::RequestsCleared => ApplyOutcome::Cleared(state.clear()),
        }
    }
}
