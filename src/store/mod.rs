//! External store subsystem.
//!
//! # Data Flow
//! ```text
//! feed controller (bulk fetch, refresh, operator deletes)
//! polling source (periodic list)
//!     → RequestStore trait
//!     → client.rs (HttpStore: reqwest + per-call timeout)
//!     → store HTTP API
//! ```
//!
//! # Design Decisions
//! - The store is a collaborator, not part of the feed: only its contract lives here
//! - Every call has a deadline; a hung store looks like a failed call
//! - List responses are accepted both paginated and bare

pub mod client;
pub mod types;

pub use client::HttpStore;
pub use types::{ListRequestsResponse, RequestStore, StoreError, StoreResult};
