//! View binding.
//!
//! The surface a consumer mounts on the currently selected endpoint:
//! connection status, ordered items, highlight queries and best-effort
//! sends. Selecting another endpoint tears the previous session down before
//! the new one starts.

pub mod binding;

pub use binding::FeedBinding;
