//! Relay session handlers.
//!
//! # Data Flow
//! ```text
//! client ──▶ ingress.rs ──(envelopes)──▶ [forward proxy] ──▶ egress.rs ──▶ destination
//!        ◀──            ◀──(verbatim)───                  ◀──           ◀──
//! ```
//!
//! # Design Decisions
//! - One task per session; both sockets are owned by that task
//! - The first direction to finish tears the whole session down
//! - Failures are logged once, with the session id and the last attempt

pub mod egress;
pub mod ingress;
pub mod upstream;

use std::net::SocketAddr;

use tokio::net::TcpStream;

use crate::error::{CodecError, RelayError};
use crate::net::connection::SessionId;
use crate::net::pipe;
use crate::observability::metrics;
use crate::routing::LastAttempt;

pub use egress::EgressRelay;
pub use ingress::IngressRelay;

/// Pipe two sockets opaquely until either side finishes.
pub(crate) async fn splice(
    role: &'static str,
    inbound: &mut TcpStream,
    outbound: &mut TcpStream,
) -> Result<(), RelayError> {
    let (mut in_r, mut in_w) = inbound.split();
    let (mut out_r, mut out_w) = outbound.split();

    tokio::select! {
        result = pipe::forward(&mut in_r, &mut out_w, role, "outbound") => result?,
        result = pipe::forward(&mut out_r, &mut in_w, role, "inbound") => result?,
    };
    Ok(())
}

/// Log a session-fatal error and count it.
pub(crate) fn report_failure(
    role: &'static str,
    session_id: SessionId,
    peer_addr: SocketAddr,
    attempt: Option<&LastAttempt>,
    err: &RelayError,
) {
    let kind = error_kind(err);
    metrics::session_failed(role, kind);

    match attempt {
        Some(attempt) => tracing::warn!(
            role,
            session_id = %session_id,
            peer_addr = %peer_addr,
            destination = %attempt.destination,
            transport = %attempt.transport,
            kind,
            error = %err,
            "Session failed"
        ),
        None => tracing::warn!(
            role,
            session_id = %session_id,
            peer_addr = %peer_addr,
            kind,
            error = %err,
            "Session failed"
        ),
    }
}

fn error_kind(err: &RelayError) -> &'static str {
    match err {
        RelayError::Codec(CodecError::MalformedObfuscation(_)) => "malformed_obfuscation",
        RelayError::Codec(CodecError::IncompleteFrame) => "incomplete_frame",
        RelayError::Codec(CodecError::MalformedFrame(_)) => "malformed_frame",
        RelayError::Connect(_) => "connect",
        RelayError::Io(_) => "io",
        RelayError::Upstream(_) => "upstream",
        RelayError::InsecureTlsDisabled(_) => "insecure_tls_disabled",
        RelayError::Listener(_) => "listener",
        RelayError::Setup(_) => "setup",
    }
}
