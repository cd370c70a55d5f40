//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Relay sessions produce:
//!     → logging.rs (structured log events, session_id / peer_addr fields)
//!     → metrics.rs (counters, gauges)
//!
//! Consumers:
//!     → stdout
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Session ID flows through every log event of a session
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;
