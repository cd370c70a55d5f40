//! Ingress relay: client-facing side of the tunnel.
//!
//! # Responsibilities
//! - Open one tunnel to the next hop per client connection
//! - Wrap every client chunk in an envelope
//! - Return next-hop bytes to the client untouched
//!
//! # Design Decisions
//! - Connect failure closes the client; there is no retry
//! - Proxy credentials are baked into the envelope template once

use std::net::SocketAddr;
use std::time::Duration;

use base64::{engine::general_purpose, Engine as _};
use tokio::net::TcpStream;

use crate::codec::{Codec, TargetForm};
use crate::config::{EnvelopeConfig, IngressConfig, TimeoutConfig};
use crate::error::RelayError;
use crate::net::connection::{SessionGuard, SessionId, SessionState};
use crate::net::pipe;
use crate::resilience::timeouts;
use crate::routing::{parse_url, Destination};

pub(crate) const ROLE: &str = "ingress";

/// Immutable per-process ingress state, shared by all sessions.
#[derive(Debug)]
pub struct IngressRelay {
    next_hop: Destination,
    template: Destination,
    codec: Codec,
    form: TargetForm,
    connect_timeout: Option<Duration>,
}

impl IngressRelay {
    pub fn new(
        ingress: &IngressConfig,
        envelope: &EnvelopeConfig,
        timeouts: &TimeoutConfig,
    ) -> Result<Self, RelayError> {
        let next_hop = parse_url(&ingress.next_hop)?;
        let mut template = envelope.template(&next_hop);
        if let Some(credentials) = &ingress.credentials {
            let token = general_purpose::STANDARD
                .encode(format!("{}:{}", credentials.username, credentials.password));
            template
                .headers
                .insert("Proxy-Authorization".to_string(), format!("Basic {}", token));
        }

        Ok(Self {
            next_hop,
            template,
            codec: envelope.codec(),
            form: if ingress.absolute_form {
                TargetForm::Absolute
            } else {
                TargetForm::Origin
            },
            connect_timeout: timeouts.connect(),
        })
    }

    /// Envelope fields used for every chunk.
    pub fn template(&self) -> &Destination {
        &self.template
    }

    /// Run one client session to completion.
    pub async fn serve(&self, client: TcpStream, peer_addr: SocketAddr, session: SessionGuard) {
        let session_id = session.id();
        if let Err(e) = self.run(client, session_id).await {
            super::report_failure(ROLE, session_id, peer_addr, None, &e);
        }
        drop(session);
    }

    async fn run(&self, mut client: TcpStream, session_id: SessionId) -> Result<(), RelayError> {
        let next_hop = self.next_hop.authority();
        tracing::debug!(
            session_id = %session_id,
            state = %SessionState::Connecting,
            next_hop = %next_hop,
            "Opening tunnel"
        );
        let mut tunnel = timeouts::connect(&next_hop, self.connect_timeout).await?;

        tracing::debug!(session_id = %session_id, state = %SessionState::Tunneling, "Tunnel open");

        let (mut client_r, mut client_w) = client.split();
        let (mut tunnel_r, mut tunnel_w) = tunnel.split();
        let (codec, template, form) = (self.codec, &self.template, self.form);

        tokio::select! {
            result = pipe::forward_with(&mut client_r, &mut tunnel_w, ROLE, "outbound", |chunk| {
                Ok(codec.wrap(template, chunk, form))
            }) => result?,
            result = pipe::forward(&mut tunnel_r, &mut client_w, ROLE, "inbound") => result?,
        };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Credentials;

    #[test]
    fn credentials_become_proxy_authorization() {
        let ingress = IngressConfig {
            credentials: Some(Credentials {
                username: "user".into(),
                password: "pass".into(),
            }),
            ..IngressConfig::default()
        };
        let relay =
            IngressRelay::new(&ingress, &EnvelopeConfig::default(), &TimeoutConfig::default())
                .unwrap();
        assert_eq!(
            relay.template().header("proxy-authorization"),
            Some("Basic dXNlcjpwYXNz")
        );
    }

    #[test]
    fn template_targets_next_hop() {
        let ingress = IngressConfig {
            next_hop: "relay.example.com:8001".into(),
            ..IngressConfig::default()
        };
        let envelope = EnvelopeConfig {
            path: "/upload".into(),
            ..EnvelopeConfig::default()
        };
        let relay = IngressRelay::new(&ingress, &envelope, &TimeoutConfig::default()).unwrap();
        let template = relay.template();
        assert_eq!(template.host, "relay.example.com");
        assert_eq!(template.port, 8001);
        assert_eq!(template.method, "POST");
        assert_eq!(template.path, "upload");
    }
}
