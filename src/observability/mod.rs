//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! controller, channel, poller:
//!     → logging.rs (tracing events, pretty or JSON)
//!     → metrics.rs (counters and gauges, optional Prometheus scrape endpoint)
//! ```

pub mod logging;
pub mod metrics;

pub use logging::init_logging;
pub use metrics::init_metrics;
