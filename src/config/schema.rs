//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the relay.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::codec::{Cipher, Codec, Packaging, KNOWN_METHODS};
use crate::routing::destination::Destination;

/// Root configuration. A process runs the ingress relay, the egress relay,
/// or both, depending on which sections are present.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RelayConfig {
    /// Client-facing relay that wraps traffic into envelopes.
    pub ingress: Option<IngressConfig>,

    /// Relay that unwraps envelopes and reaches the real destination.
    pub egress: Option<EgressConfig>,

    /// Envelope shape shared by both relays.
    pub envelope: EnvelopeConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl RelayConfig {
    /// Both relays on loopback, ingress feeding egress directly.
    pub fn loopback() -> Self {
        Self {
            ingress: Some(IngressConfig::default()),
            egress: Some(EgressConfig::default()),
            ..Self::default()
        }
    }
}

/// Ingress relay configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IngressConfig {
    /// Bind address (e.g., "127.0.0.1:8000").
    pub bind_address: String,

    /// Next hop every tunnel connects to, `host:port` (the egress relay or a
    /// forward proxy in front of it).
    pub next_hop: String,

    /// Maximum concurrent client connections (backpressure).
    pub max_connections: usize,

    /// Write request targets in absolute form (`http://host:port/path`).
    /// Needed when the next hop is a forward proxy.
    pub absolute_form: bool,

    /// Credentials sent as `Proxy-Authorization: Basic` on every envelope.
    pub credentials: Option<Credentials>,
}

impl Default for IngressConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8000".to_string(),
            next_hop: "127.0.0.1:8001".to_string(),
            max_connections: 1024,
            absolute_form: false,
            credentials: None,
        }
    }
}

/// Basic credentials for the next hop.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Egress relay configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EgressConfig {
    /// Bind address (e.g., "0.0.0.0:8001").
    pub bind_address: String,

    /// Maximum concurrent inbound connections (backpressure).
    pub max_connections: usize,

    /// Regexes every envelope head must match. Empty means the defaults
    /// derived from `[envelope]`.
    pub allow_list: Vec<String>,

    /// Where traffic that fails the allow-list is quietly sent.
    pub reverse_proxy: ReverseProxyConfig,

    /// Fixed destination (`host:port`) for every admitted session. When unset
    /// the destination is parsed from the tunneled client request.
    pub upstream: Option<String>,

    /// Accept any certificate on `httpst://` destinations. Insecure.
    pub insecure_skip_verify: bool,
}

impl Default for EgressConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8001".to_string(),
            max_connections: 1024,
            allow_list: Vec::new(),
            reverse_proxy: ReverseProxyConfig::default(),
            upstream: None,
            insecure_skip_verify: false,
        }
    }
}

/// Reverse-proxy target for non-conforming traffic.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReverseProxyConfig {
    pub host: String,
    pub port: u16,
    /// Scheme used for `Origin`/`Referer` masking; inferred from the port when unset.
    pub protocol: Option<String>,
}

impl Default for ReverseProxyConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            protocol: None,
        }
    }
}

impl ReverseProxyConfig {
    pub fn destination(&self) -> Destination {
        let mut dest = Destination::new(self.host.clone(), self.port);
        if let Some(protocol) = &self.protocol {
            dest.protocol = protocol.clone();
        }
        dest
    }
}

/// Envelope template shared by both relays.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EnvelopeConfig {
    /// Framing mode: "plain", "req" or "file".
    pub package: Packaging,

    /// Obfuscation encoding: "utf8", "hex" or "base64".
    pub cipher: Cipher,

    /// Request method written by the ingress relay.
    pub method: String,

    /// `Host` header value; defaults to the next hop's host.
    pub host: Option<String>,

    /// Request path, with or without the leading `/`.
    pub path: String,

    /// Extra headers written on every envelope.
    pub headers: BTreeMap<String, String>,
}

impl Default for EnvelopeConfig {
    fn default() -> Self {
        let mut headers = BTreeMap::new();
        headers.insert(
            "User-Agent".to_string(),
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64)".to_string(),
        );
        headers.insert("Accept".to_string(), "*/*".to_string());
        headers.insert(
            "Content-Type".to_string(),
            "application/x-www-form-urlencoded".to_string(),
        );
        Self {
            package: Packaging::Req,
            cipher: Cipher::Base64,
            method: "POST".to_string(),
            host: None,
            path: String::new(),
            headers,
        }
    }
}

impl EnvelopeConfig {
    pub fn codec(&self) -> Codec {
        Codec::new(self.cipher, self.package)
    }

    /// `path` without its leading `/`.
    pub fn normalized_path(&self) -> &str {
        self.path.trim_start_matches('/')
    }

    /// Allow-list used when `egress.allow_list` is empty.
    ///
    /// Plain packaging admits any well-formed request line; otherwise the
    /// request line must carry the configured method and path (origin or
    /// absolute form).
    pub fn default_allow_list(&self) -> Vec<String> {
        match self.package {
            Packaging::Plain => vec![format!(
                r"^(?:{}) \S+ HTTP/1\.[01]\r\n",
                KNOWN_METHODS.join("|")
            )],
            Packaging::Req | Packaging::File => vec![format!(
                r"^{} (?:[a-zA-Z][a-zA-Z0-9+.-]*://[^/\s]+)?/{}\S* HTTP/1\.[01]\r\n",
                regex::escape(&self.method.to_ascii_uppercase()),
                regex::escape(self.normalized_path())
            )],
        }
    }

    /// Routing fields for envelopes sent to `next_hop`; the body is filled
    /// in per chunk.
    pub fn template(&self, next_hop: &Destination) -> Destination {
        let mut dest = next_hop.clone();
        if let Some(host) = &self.host {
            dest.host = host.clone();
        }
        if dest.protocol != "https" {
            dest.protocol = "http".to_string();
        }
        dest.method = self.method.to_ascii_uppercase();
        dest.path = self.normalized_path().to_string();
        dest.headers = self.headers.clone();
        dest
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connect timeout for next hops and destinations in seconds. Unset means
    /// wait for the OS.
    pub connect_secs: Option<u64>,

    /// Grace period for active sessions on shutdown, in seconds.
    pub drain_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: None,
            drain_secs: 5,
        }
    }
}

impl TimeoutConfig {
    pub fn connect(&self) -> Option<Duration> {
        self.connect_secs.map(Duration::from_secs)
    }

    pub fn drain(&self) -> Duration {
        Duration::from_secs(self.drain_secs)
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
