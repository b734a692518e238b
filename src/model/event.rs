//! Feed events and the push channel wire format.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::model::endpoint::{Endpoint, EndpointId};
use crate::model::record::{RequestId, RequestRecord};

/// A change to apply to a feed, regardless of which source observed it.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    /// A request was captured by the endpoint.
    NewRequest(RequestRecord),
    /// The endpoint's configuration changed.
    EndpointUpdated(Endpoint),
    /// The operator deleted one request.
    RequestDeleted(RequestId),
    /// The operator cleared every request of the endpoint.
    RequestsCleared,
}

impl FeedEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            FeedEvent::NewRequest(_) => "new_request",
            FeedEvent::EndpointUpdated(_) => "endpoint_update",
            FeedEvent::RequestDeleted(_) => "request_deleted",
            FeedEvent::RequestsCleared => "requests_cleared",
        }
    }
}

/// Where an event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventSource {
    Bulk,
    Channel,
    Polling,
    Operator,
}

impl EventSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventSource::Bulk => "bulk",
            EventSource::Channel => "channel",
            EventSource::Polling => "polling",
            EventSource::Operator => "operator",
        }
    }
}

/// Identity of one feed session: the endpoint plus a per-session nonce.
///
/// Every event produced for a session carries its tag; a controller drops any
/// event whose tag is not its own, so a channel or poller that outlives a
/// teardown cannot leak into the next session, even one for the same endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionTag {
    pub endpoint: EndpointId,
    pub session: Uuid,
}

impl SessionTag {
    pub fn new(endpoint: EndpointId) -> Self {
        Self {
            endpoint,
            session: Uuid::new_v4(),
        }
    }
}

impl fmt::Display for SessionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.endpoint, self.session.simple())
    }
}

/// An event stamped with the session that produced it.
#[derive(Debug, Clone)]
pub struct TaggedEvent {
    pub tag: SessionTag,
    pub source: EventSource,
    pub event: FeedEvent,
}

/// JSON frames exchanged over the push channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChannelMessage {
    NewRequest {
        data: RequestRecord,
    },
    #[serde(alias = "endpoint_updated")]
    EndpointUpdate {
        data: Endpoint,
    },
    Ping,
    Pong,
}

impl ChannelMessage {
    /// The feed event carried by this frame, if any.
    pub fn into_feed_event(self) -> Option<FeedEvent> {
        match self {
            ChannelMessage::NewRequest { data } => Some(FeedEvent::NewRequest(data)),
            ChannelMessage::EndpointUpdate { data } => Some(FeedEvent::EndpointUpdated(data)),
            ChannelMessage::Ping | ChannelMessage::Pong => None,
        }
    }
}
