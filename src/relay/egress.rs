//! Egress relay: destination-facing side of the tunnel.
//!
//! # Responsibilities
//! - Reassemble envelopes from arbitrarily chunked inbound bytes
//! - Screen the first envelope against the allow-list
//! - Recover the client's request and reach its destination
//! - Reverse-proxy anything that does not look like our own traffic
//!
//! # Data Flow
//! ```text
//! inbound bytes
//!     → outer FrameDecoder (envelopes)          [Buffering]
//!     → Router::route (allow-list)              [Dispatching]
//!         → ReverseProxy: rewrite, connect, splice
//!         → Tunnel: unwrap → inner FrameDecoder → parse_request
//!             → Router::dispatch (transport)
//!                 → RawTunnel: connect, pipe    [Tunneling]
//!                 → Http(s): reqwest, stream    [Proxying]
//! ```
//!
//! # Design Decisions
//! - Only the first envelope of a session is screened
//! - After dispatch, inbound envelopes keep being unwrapped; destination
//!   bytes go back verbatim
//! - A failed destination connect closes the inbound socket, no fallback

use std::net::SocketAddr;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::codec::{parse_request, rewrite_request_target, Frame, FrameDecoder, Packaging};
use crate::config::{EgressConfig, EnvelopeConfig, TimeoutConfig};
use crate::error::{CodecError, RelayError};
use crate::net::connection::{SessionGuard, SessionId, SessionState};
use crate::net::pipe;
use crate::relay::upstream::{self, HttpClients};
use crate::resilience::timeouts;
use crate::routing::{LastAttempt, Route, Router, Transport};

pub(crate) const ROLE: &str = "egress";

/// Reply sent to the client once a CONNECT destination is reachable.
pub const CONNECT_ESTABLISHED: &[u8] = b"HTTP/1.1 200 Connection Established\r\n\r\n";

/// Immutable per-process egress state, shared by all sessions.
#[derive(Debug)]
pub struct EgressRelay {
    router: Router,
    clients: HttpClients,
    connect_timeout: Option<Duration>,
}

impl EgressRelay {
    pub fn new(
        egress: &EgressConfig,
        envelope: &EnvelopeConfig,
        timeouts: &TimeoutConfig,
    ) -> Result<Self, RelayError> {
        Ok(Self {
            router: Router::new(egress, envelope)?,
            clients: HttpClients::new(egress.insecure_skip_verify, timeouts.connect())?,
            connect_timeout: timeouts.connect(),
        })
    }

    /// Run one inbound session to completion.
    pub async fn serve(&self, inbound: TcpStream, peer_addr: SocketAddr, session: SessionGuard) {
        let session_id = session.id();
        let mut last_attempt = None;
        if let Err(e) = self.run(inbound, session_id, &mut last_attempt).await {
            super::report_failure(ROLE, session_id, peer_addr, last_attempt.as_ref(), &e);
        }
        drop(session);
    }

    async fn run(
        &self,
        mut inbound: TcpStream,
        session_id: SessionId,
        last_attempt: &mut Option<LastAttempt>,
    ) -> Result<(), RelayError> {
        let mut outer = FrameDecoder::new();
        let mut buf = vec![0u8; pipe::CHUNK_SIZE];

        tracing::trace!(
            session_id = %session_id,
            state = %SessionState::Buffering,
            "Awaiting envelope"
        );
        let Some(first) = read_frame(&mut inbound, &mut outer, &mut buf).await? else {
            return Ok(());
        };

        tracing::trace!(
            session_id = %session_id,
            state = %SessionState::Dispatching,
            "Envelope buffered"
        );
        if self.router.route(&first) == Route::ReverseProxy {
            return self
                .reverse_proxy(inbound, first, outer, session_id, last_attempt)
                .await;
        }

        let payload = self.router.unwrap(first)?;

        if let Some(upstream) = self.router.upstream() {
            let attempt = LastAttempt::new(upstream, Transport::RawTunnel);
            *last_attempt = Some(attempt.clone());
            let mut destination =
                timeouts::connect(&attempt.destination, self.connect_timeout).await?;
            tracing::debug!(
                session_id = %session_id,
                state = %SessionState::Tunneling,
                destination = %attempt.destination,
                "Forwarding to configured upstream"
            );
            destination.write_all(&payload).await?;
            return self.tunnel(&mut inbound, &mut destination, outer).await;
        }

        let mut inner = FrameDecoder::new();
        inner.push(&payload);
        let request = loop {
            match inner.next_frame()? {
                Some(Frame::Http(request)) => break request,
                Some(Frame::Opaque(_)) => {
                    return Err(CodecError::MalformedFrame(
                        "tunneled bytes are not an HTTP request".into(),
                    )
                    .into())
                }
                None => {
                    let Some(frame) = read_frame(&mut inbound, &mut outer, &mut buf).await? else {
                        return Ok(());
                    };
                    inner.push(&self.router.unwrap(frame)?);
                }
            }
        };

        let dest = parse_request(&request)?;
        let leftover = inner.take_remaining();
        let attempt = self.router.dispatch(&dest)?;
        *last_attempt = Some(attempt.clone());

        match attempt.transport {
            Transport::RawTunnel => {
                let mut destination =
                    timeouts::connect(&attempt.destination, self.connect_timeout).await?;
                tracing::debug!(
                    session_id = %session_id,
                    state = %SessionState::Tunneling,
                    destination = %attempt.destination,
                    method = %dest.method,
                    "Destination connected"
                );

                if dest.is_connect() {
                    inbound.write_all(CONNECT_ESTABLISHED).await?;
                    destination.write_all(&dest.raw_body).await?;
                } else {
                    destination.write_all(&request).await?;
                }
                destination.write_all(&leftover).await?;
                self.tunnel(&mut inbound, &mut destination, outer).await
            }
            Transport::Http | Transport::HttpsInsecure => {
                tracing::debug!(
                    session_id = %session_id,
                    state = %SessionState::Proxying,
                    destination = %attempt.destination,
                    method = %dest.method,
                    transport = %attempt.transport,
                    "Forwarding request"
                );
                let written =
                    upstream::forward_request(&self.clients, &dest, attempt.transport, &mut inbound)
                        .await?;
                crate::observability::metrics::bytes_forwarded(ROLE, "inbound", written);
                Ok(())
            }
        }
    }

    /// Pipe an established session. Inbound envelopes are unwrapped on the
    /// way out unless packaging is `Plain`.
    async fn tunnel(
        &self,
        inbound: &mut TcpStream,
        destination: &mut TcpStream,
        mut outer: FrameDecoder,
    ) -> Result<(), RelayError> {
        if self.router.codec().package == Packaging::Plain {
            destination.write_all(&outer.take_remaining()).await?;
            return super::splice(ROLE, inbound, destination).await;
        }

        let pending = drain_frames(&self.router, &mut outer)?;
        destination.write_all(&pending).await?;

        let (mut in_r, mut in_w) = inbound.split();
        let (mut out_r, mut out_w) = destination.split();
        let router = &self.router;

        tokio::select! {
            result = pipe::forward_with(&mut in_r, &mut out_w, ROLE, "outbound", |chunk| {
                outer.push(chunk);
                drain_frames(router, &mut outer)
            }) => result?,
            result = pipe::forward(&mut out_r, &mut in_w, ROLE, "inbound") => result?,
        };
        Ok(())
    }

    /// Forward a non-conforming session to the reverse-proxy target with
    /// its `Host`, `Origin` and `Referer` masked.
    async fn reverse_proxy(
        &self,
        mut inbound: TcpStream,
        first: Frame,
        mut outer: FrameDecoder,
        session_id: SessionId,
        last_attempt: &mut Option<LastAttempt>,
    ) -> Result<(), RelayError> {
        let target = self.router.reverse_proxy();
        let attempt = LastAttempt::new(target, Transport::RawTunnel);
        *last_attempt = Some(attempt.clone());

        tracing::info!(
            session_id = %session_id,
            destination = %attempt.destination,
            opaque = matches!(first, Frame::Opaque(_)),
            "Non-conforming traffic, reverse proxying"
        );

        let mut head = rewrite_request_target(first.bytes(), target);
        head.extend_from_slice(&outer.take_remaining());

        let mut destination = timeouts::connect(&attempt.destination, self.connect_timeout).await?;
        destination.write_all(&head).await?;
        super::splice(ROLE, &mut inbound, &mut destination).await
    }
}

/// Read until `decoder` releases a frame. `Ok(None)` on EOF.
async fn read_frame(
    inbound: &mut TcpStream,
    decoder: &mut FrameDecoder,
    buf: &mut [u8],
) -> Result<Option<Frame>, RelayError> {
    loop {
        if let Some(frame) = decoder.next_frame()? {
            return Ok(Some(frame));
        }
        let n = inbound.read(buf).await?;
        if n == 0 {
            if decoder.buffered() > 0 {
                tracing::debug!(buffered = decoder.buffered(), "Inbound closed mid-frame");
            }
            return Ok(None);
        }
        decoder.push(&buf[..n]);
    }
}

/// Unwrap every complete envelope buffered in `decoder`.
fn drain_frames(router: &Router, decoder: &mut FrameDecoder) -> Result<Bytes, RelayError> {
    let mut out = BytesMut::new();
    while let Some(frame) = decoder.next_frame()? {
        out.extend_from_slice(&router.unwrap(frame)?);
    }
    Ok(out.freeze())
}
