//! Domain model shared by every feed component.
//!
//! # Types
//! - `EndpointId` / `Endpoint`: the endpoint a feed is scoped to
//! - `RequestRecord`: one captured request, immutable once observed
//! - `FeedEvent`: a tagged change produced by the bulk fetch, the channel, polling or the operator
//! - `ChannelMessage`: the JSON frame shape of the push channel

pub mod endpoint;
pub mod event;
pub mod record;

pub use endpoint::{Endpoint, EndpointId};
pub use event::{ChannelMessage, EventSource, FeedEvent, SessionTag, TaggedEvent};
pub use record::{Headers, RequestId, RequestRecord};
