//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, connection limits)
//!     → connection.rs (session id, lifecycle tracking)
//!     → relay (ingress / egress session task)
//!     → pipe.rs (one forwarding loop per direction)
//! ```
//!
//! # Design Decisions
//! - Bounded accept queue prevents resource exhaustion
//! - Each session tracked for graceful shutdown
//! - Forwarding is write-then-read so backpressure crosses both hops

pub mod connection;
pub mod listener;
pub mod pipe;
