//! Lifecycle management for the binary.
//!
//! # Data Flow
//! ```text
//! SIGTERM/SIGINT → wait_for_shutdown resolves → binding unmounted → exit
//! ```

pub mod signals;

pub use signals::wait_for_shutdown;
