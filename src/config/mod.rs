//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → FeedConfig (validated, immutable)
//!     → cloned into each feed controller at construction
//! ```
//!
//! # Design Decisions
//! - Config is immutable once a feed is built; a new endpoint selection picks up a new config
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    ChannelConfig, FallbackConfig, FeedConfig, LogFormat, ObservabilityConfig, PollingConfig,
    ReconcilerConfig, ReconnectConfig, StoreConfig,
};
pub use validation::{validate_config, ValidationError};
