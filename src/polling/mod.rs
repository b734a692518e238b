//! Polling fallback.
//!
//! Active only while the liveness controller is falling back. Each tick
//! lists the endpoint's requests and forwards the newest one when it is
//! above the feed's high-water mark.

pub mod source;

pub use source::PollingSource;
