//! Timeout enforcement for outbound connects.
//!
//! # Responsibilities
//! - Open TCP connections to next hops and destinations
//! - Enforce the optional connect timeout
//! - Classify failures into `ConnectError`
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - No timeout unless configured
//! - Timeout errors are distinct from other errors

use std::time::Duration;

use tokio::net::TcpStream;

use crate::error::ConnectError;

/// Connect to `addr` ("host:port"), bounded by `limit` when set.
pub async fn connect(addr: &str, limit: Option<Duration>) -> Result<TcpStream, ConnectError> {
    let attempt = TcpStream::connect(addr);

    let stream = match limit {
        Some(limit) => match tokio::time::timeout(limit, attempt).await {
            Ok(result) => result,
            Err(_) => {
                return Err(ConnectError::TimedOut {
                    addr: addr.to_string(),
                })
            }
        },
        None => attempt.await,
    }
    .map_err(|e| ConnectError::from_io(addr, e))?;

    let _ = stream.set_nodelay(true);
    Ok(stream)
}
