//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Outbound connect (next hop / destination / reverse proxy):
//!     → timeouts.rs (enforce connect timeout, classify failure)
//!     → On failure: session ends, inbound socket closed
//! ```
//!
//! # Design Decisions
//! - No retries and no fallback destination; a failed connect is final
//! - Connect timeout is opt-in

pub mod timeouts;
