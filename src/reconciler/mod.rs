//! Event reconciliation subsystem.
//!
//! # Data Flow
//! ```text
//! bulk fetch ─────┐
//! channel events ─┼─→ merge.rs (Reconciler: dedup by id, sorted insert, high-water mark)
//! poll events ────┤        → feed_state.rs (FeedState: items, highlights, status)
//! operator ───────┘        → snapshot published to the view binding
//! ```
//!
//! # Design Decisions
//! - Dedup by `id` makes every source safe to overlap with every other
//! - Insertion keeps order, so arrival order never matters
//! - Highlight expiry is time-driven by the owner; the state only stores deadlines

pub mod feed_state;
pub mod merge;

pub use feed_state::FeedState;
pub use merge::{ApplyOutcome, Reconciler};
