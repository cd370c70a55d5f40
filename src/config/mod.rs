//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → RelayConfig (validated, immutable)
//!     → shared via Arc to both relays
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; the relays never reload it
//! - All fields have defaults to allow minimal configs
//! - A missing `[ingress]` or `[egress]` section disables that relay

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    Credentials, EgressConfig, EnvelopeConfig, IngressConfig, ObservabilityConfig, RelayConfig,
    ReverseProxyConfig, TimeoutConfig,
};
