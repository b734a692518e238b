//! Liveness fallback subsystem.
//!
//! # Data Flow
//! ```text
//! channel events ─┐
//! poll results   ─┼→ controller.rs (driver loop) ─→ state.rs (machine) ─→ actions
//! timers         ─┤                │
//! commands       ─┘                └→ reconciler ─→ FeedSnapshot (watch)
//! ```
//!
//! # Design Decisions
//! - The machine is pure; the driver executes its actions
//! - One driver task per session; inputs are serialized through its loop
//! - Every event carries a session tag; mismatches are dropped

pub mod controller;
pub mod state;

pub use controller::{FeedController, FeedError, FeedSnapshot};
pub use state::{Action, ConnectionStatus, LivenessMachine, LivenessState};
