//! Transport subsystem.
//!
//! # Data Flow
//! ```text
//! liveness controller
//!     → channel.rs (open: spawn worker, connect with timeout)
//!     → WebSocket frames
//!     → codec.rs (JSON ⇄ ChannelMessage)
//!     → ChannelEvent { tag, channel, Opened | Message | Error | Closed }
//!     → back to the controller's event queue
//! ```
//!
//! # Design Decisions
//! - Frame-level decoding failures never surface as channel errors
//! - Outgoing messages are telemetry: no queueing before open, no delivery guarantee
//! - TLS is not compiled in; wss addresses fail to connect and are retried like any transport failure

pub mod channel;
pub mod codec;

pub use channel::{channel_url, ChannelError, ChannelEvent, ChannelEventKind, ChannelHandle};
pub use codec::CodecError;
