//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! First inbound frame (egress)
//!     → matcher.rs (allow-list over the request head)
//!     → router.rs (tunnel or reverse proxy)
//!
//! Decoded client request
//!     → destination.rs (resolve host, port, protocol)
//!     → router.rs (select transport once, record LastAttempt)
//! ```
//!
//! # Design Decisions
//! - Policy compiled at startup, immutable at runtime
//! - Deterministic: same input always takes the same route
//! - Transport chosen from a closed set

pub mod destination;
pub mod matcher;
pub mod router;

pub use destination::{build_url, parse_url, protocol_for_port, Destination};
pub use router::{LastAttempt, Route, Router, Transport};
