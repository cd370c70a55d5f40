//! Destination descriptors and the well-known-port table.
//!
//! # Responsibilities
//! - Hold the routing + header metadata extracted from an envelope
//! - Map ports to protocol names (display and URL reconstruction only)
//! - Build and tolerantly parse `scheme://host:port/path` strings
//!
//! # Design Decisions
//! - `path` is stored without its leading `/`
//! - `headers` never carries `Host` or `Content-Length`; both are derived
//! - Unknown ports resolve to `http`

use std::collections::BTreeMap;

use bytes::Bytes;
use url::Url;

use crate::error::CodecError;

/// Scheme inserted by [`parse_url`] when the input has none.
const PLACEHOLDER_SCHEME: &str = "placeholder";

/// Port used when neither the input nor the protocol implies one.
pub const DEFAULT_PORT: u16 = 80;

/// Static `{port → protocol}` mapping.
const WELL_KNOWN_PORTS: &[(u16, &str)] = &[
    (20, "ftp-data"),
    (21, "ftp"),
    (22, "ssh"),
    (23, "telnet"),
    (25, "smtp"),
    (53, "dns"),
    (80, "http"),
    (110, "pop3"),
    (143, "imap"),
    (443, "https"),
    (465, "smtps"),
    (993, "imaps"),
    (995, "pop3s"),
    (3306, "mysql"),
    (5432, "postgresql"),
    (6379, "redis"),
    (8080, "http"),
    (8443, "https"),
];

/// Look up the protocol conventionally served on `port`.
pub fn protocol_for_port(port: u16) -> &'static str {
    WELL_KNOWN_PORTS
        .iter()
        .find(|(p, _)| *p == port)
        .map(|(_, proto)| *proto)
        .unwrap_or("http")
}

/// Reverse lookup: the first well-known port for `protocol`.
///
/// `httpst` (HTTPS with certificate checks disabled) shares 443 with `https`.
pub fn default_port(protocol: &str) -> u16 {
    let protocol = protocol.trim_end_matches(':').to_ascii_lowercase();
    if protocol == "httpst" {
        return 443;
    }
    WELL_KNOWN_PORTS
        .iter()
        .find(|(_, proto)| *proto == protocol)
        .map(|(p, _)| *p)
        .unwrap_or(DEFAULT_PORT)
}

/// Routing and header metadata for one request/response cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub protocol: String,
    pub host: String,
    pub port: u16,
    /// Request path and query, without the leading `/`.
    pub path: String,
    pub method: String,
    /// HTTP version without the `HTTP/` prefix, e.g. `1.1`.
    pub version: String,
    pub headers: BTreeMap<String, String>,
    pub raw_body: Bytes,
}

impl Default for Destination {
    fn default() -> Self {
        Self {
            protocol: "http".to_string(),
            host: String::new(),
            port: DEFAULT_PORT,
            path: String::new(),
            method: "GET".to_string(),
            version: "1.1".to_string(),
            headers: BTreeMap::new(),
            raw_body: Bytes::new(),
        }
    }
}

impl Destination {
    /// A destination for `host:port` with the protocol inferred from the port.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            protocol: protocol_for_port(port).to_string(),
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// `host:port`, with IPv6 hosts bracketed. Suitable for `TcpStream::connect`.
    pub fn authority(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Value for a `Host` header: the port is left out when it is the
    /// protocol's default.
    pub fn host_header(&self) -> String {
        if self.port == default_port(&self.protocol) {
            if self.host.contains(':') {
                format!("[{}]", self.host)
            } else {
                self.host.clone()
            }
        } else {
            self.authority()
        }
    }

    /// `scheme://host[:port]`, as used in `Origin` headers.
    pub fn origin(&self) -> String {
        format!("{}://{}", self.protocol, self.host_header())
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Whether this destination asks for an opaque `CONNECT` tunnel.
    pub fn is_connect(&self) -> bool {
        self.method.eq_ignore_ascii_case("CONNECT")
    }
}

/// `"{protocol}://{host}:{port}/{path}"`.
pub fn build_url(dest: &Destination) -> String {
    format!("{}://{}/{}", dest.protocol, dest.authority(), dest.path)
}

/// Tolerant URL parser.
///
/// Inputs without a scheme (`example.com:22/x`) get a placeholder scheme
/// so the `url` crate accepts them; the protocol is then taken from the
/// well-known-port table.
pub fn parse_url(raw: &str) -> Result<Destination, CodecError> {
    let raw = raw.trim();
    let has_scheme = raw.contains("://");
    let candidate = if has_scheme {
        raw.to_string()
    } else {
        format!("{}://{}", PLACEHOLDER_SCHEME, raw)
    };

    let url = Url::parse(&candidate)
        .map_err(|e| CodecError::MalformedFrame(format!("invalid url {:?}: {}", raw, e)))?;

    let host = url
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| CodecError::MalformedFrame(format!("url {:?} has no host", raw)))?
        .trim_matches(|c| c == '[' || c == ']')
        .to_string();

    let scheme = url.scheme().to_string();
    let (protocol, port) = if scheme == PLACEHOLDER_SCHEME {
        let port = url.port().unwrap_or(DEFAULT_PORT);
        (protocol_for_port(port).to_string(), port)
    } else {
        let port = url
            .port_or_known_default()
            .unwrap_or_else(|| default_port(&scheme));
        (scheme, port)
    };

    let mut path = url.path().trim_start_matches('/').to_string();
    if let Some(query) = url.query() {
        path.push('?');
        path.push_str(query);
    }

    Ok(Destination {
        protocol,
        host,
        port,
        path,
        ..Destination::default()
    })
}
