//! Real-time request feed for webhook endpoints.
//!
//! Keeps an ordered, deduplicated view of the requests captured for one
//! endpoint, fed by a bulk fetch, a push channel and a polling fallback.

pub mod config;
pub mod lifecycle;
pub mod liveness;
pub mod model;
pub mod observability;
pub mod polling;
pub mod reconciler;
pub mod resilience;
pub mod store;
pub mod transport;
pub mod view;

pub use config::FeedConfig;
pub use liveness::{ConnectionStatus, FeedController, FeedSnapshot};
pub use model::{EndpointId, RequestRecord};
pub use view::FeedBinding;
