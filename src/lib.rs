//! Envelope relay library.
//!
//! A two-hop TCP tunnel that carries arbitrary byte streams inside
//! HTTP-looking request envelopes so they can cross a forward proxy.

pub mod codec;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod relay;
pub mod resilience;
pub mod routing;

pub use config::schema::RelayConfig;
pub use error::{CodecError, ConnectError, RelayError};
pub use lifecycle::{start, RelayHandle, Shutdown};
