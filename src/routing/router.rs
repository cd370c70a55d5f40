//! Egress dispatch decisions.
//!
//! # Responsibilities
//! - Decide whether an inbound session is a tunnel or reverse-proxied
//! - Pick the transport for a decoded destination, exactly once
//! - Describe the last dispatch attempt for failure reports
//!
//! # Design Decisions
//! - Immutable after construction (shared across sessions without locks)
//! - Closed `Transport` enum instead of a string-keyed handler table
//! - Explicit reverse-proxy outcome rather than silent passthrough

use std::fmt;

use crate::codec::{Codec, Frame, Packaging};
use crate::config::{EgressConfig, EnvelopeConfig};
use crate::error::RelayError;
use crate::routing::destination::{parse_url, Destination};
use crate::routing::matcher::EnvelopePolicy;

/// How the egress relay reaches a destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// Plain HTTP request issued by the relay's HTTP client.
    Http,
    /// HTTPS request with certificate verification disabled.
    HttpsInsecure,
    /// Opaque TCP pipe (CONNECT tunnels and anything not HTTP).
    RawTunnel,
}

impl Transport {
    /// `http` → Http, `httpst` → HttpsInsecure, anything else (and every
    /// `CONNECT`) → RawTunnel.
    pub fn select(dest: &Destination) -> Self {
        if dest.is_connect() {
            return Transport::RawTunnel;
        }
        match dest.protocol.as_str() {
            "http" => Transport::Http,
            "httpst" => Transport::HttpsInsecure,
            _ => Transport::RawTunnel,
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Transport::Http => "http",
            Transport::HttpsInsecure => "https-insecure",
            Transport::RawTunnel => "raw-tunnel",
        };
        f.write_str(name)
    }
}

/// Outcome of inspecting the first inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Conforming envelope: unwrap it and resolve the real destination.
    Tunnel,
    /// Opaque or non-conforming input: forward it to the reverse-proxy target.
    ReverseProxy,
}

/// Destination and transport of the most recent dispatch, for error reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastAttempt {
    pub destination: String,
    pub transport: Transport,
}

impl LastAttempt {
    pub fn new(dest: &Destination, transport: Transport) -> Self {
        Self {
            destination: dest.authority(),
            transport,
        }
    }
}

impl fmt::Display for LastAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} via {}", self.destination, self.transport)
    }
}

/// Compiled egress routing state.
#[derive(Debug)]
pub struct Router {
    policy: EnvelopePolicy,
    codec: Codec,
    reverse_proxy: Destination,
    upstream: Option<Destination>,
    insecure_skip_verify: bool,
}

impl Router {
    /// Compile the allow-list (falling back to the envelope-derived
    /// default) and resolve the fixed targets.
    pub fn new(egress: &EgressConfig, envelope: &EnvelopeConfig) -> Result<Self, RelayError> {
        let patterns = if egress.allow_list.is_empty() {
            envelope.default_allow_list()
        } else {
            egress.allow_list.clone()
        };
        let policy = EnvelopePolicy::compile(&patterns)
            .map_err(|e| RelayError::Setup(format!("egress.allow_list: {}", e)))?;

        let upstream = egress.upstream.as_deref().map(parse_url).transpose()?;

        Ok(Self {
            policy,
            codec: envelope.codec(),
            reverse_proxy: egress.reverse_proxy.destination(),
            upstream,
            insecure_skip_verify: egress.insecure_skip_verify,
        })
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    pub fn reverse_proxy(&self) -> &Destination {
        &self.reverse_proxy
    }

    /// Explicitly configured destination, bypassing request parsing.
    pub fn upstream(&self) -> Option<&Destination> {
        self.upstream.as_ref()
    }

    /// Classify the first frame of a session.
    pub fn route(&self, frame: &Frame) -> Route {
        match frame {
            Frame::Http(bytes) if self.policy.admits(bytes) => Route::Tunnel,
            _ => Route::ReverseProxy,
        }
    }

    /// Recover the payload of one inbound frame.
    ///
    /// With `Plain` packaging every frame is payload. Otherwise an opaque
    /// frame in the middle of a tunnel is malformed.
    pub fn unwrap(&self, frame: Frame) -> Result<bytes::Bytes, RelayError> {
        match (self.codec.package, frame) {
            (Packaging::Plain, frame) => Ok(frame.into_bytes()),
            (_, Frame::Http(bytes)) => Ok(self.codec.unwrap(&bytes)?),
            (_, Frame::Opaque(_)) => Err(crate::error::CodecError::MalformedFrame(
                "expected an envelope".into(),
            )
            .into()),
        }
    }

    /// Pick the transport for `dest`, refusing insecure HTTPS unless enabled.
    pub fn dispatch(&self, dest: &Destination) -> Result<LastAttempt, RelayError> {
        let transport = Transport::select(dest);
        if transport == Transport::HttpsInsecure && !self.insecure_skip_verify {
            return Err(RelayError::InsecureTlsDisabled(dest.authority()));
        }
        Ok(LastAttempt::new(dest, transport))
    }
}
