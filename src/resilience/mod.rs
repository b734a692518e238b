//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Channel lost (close or error):
//!     → liveness state machine asks backoff.rs for a delay
//!     → at most one reconnection timer pending
//!     → timer fires → new channel attempt
//! Channel opened:
//!     → attempt counter reset
//! ```
//!
//! # Design Decisions
//! - Backoff is a pure function of the attempt count
//! - Reconnection is unlimited; the delay ceiling bounds the cost of trying

pub mod backoff;

pub use backoff::{calculate_backoff, ReconnectPolicy};
