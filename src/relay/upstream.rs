//! HTTP(S) forwarding for decoded client requests.
//!
//! # Responsibilities
//! - Rebuild the client's request and send it with `reqwest`
//! - Write the upstream status line and headers back verbatim
//! - Stream the response body, then let the session close
//!
//! # Design Decisions
//! - Clients never consult proxy environment variables and never follow
//!   redirects; the end client sees exactly what the destination said
//! - The insecure client exists only when `insecure_skip_verify` is set

use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::{CodecError, RelayError};
use crate::routing::{Destination, Transport};

/// Request headers that describe the hop, not the request.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "proxy-connection",
    "proxy-authorization",
    "keep-alive",
    "transfer-encoding",
    "te",
    "upgrade",
];

/// Response headers replaced by `Connection: close`.
const DROPPED_RESPONSE_HEADERS: &[&str] = &["transfer-encoding", "connection"];

/// Shared HTTP clients for the egress relay.
#[derive(Debug, Clone)]
pub struct HttpClients {
    plain: reqwest::Client,
    insecure: Option<reqwest::Client>,
}

impl HttpClients {
    pub fn new(
        insecure_skip_verify: bool,
        connect_timeout: Option<Duration>,
    ) -> Result<Self, RelayError> {
        let plain = builder(connect_timeout).build()?;
        let insecure = if insecure_skip_verify {
            Some(
                builder(connect_timeout)
                    .danger_accept_invalid_certs(true)
                    .build()?,
            )
        } else {
            None
        };
        Ok(Self { plain, insecure })
    }

    fn client(
        &self,
        dest: &Destination,
        transport: Transport,
    ) -> Result<&reqwest::Client, RelayError> {
        match transport {
            Transport::HttpsInsecure => self
                .insecure
                .as_ref()
                .ok_or_else(|| RelayError::InsecureTlsDisabled(dest.authority())),
            _ => Ok(&self.plain),
        }
    }
}

fn builder(connect_timeout: Option<Duration>) -> reqwest::ClientBuilder {
    let builder = reqwest::Client::builder()
        .no_proxy()
        .redirect(reqwest::redirect::Policy::none());
    match connect_timeout {
        Some(limit) => builder.connect_timeout(limit),
        None => builder,
    }
}

/// URL the relay requests for `dest` over `transport`.
pub fn request_url(dest: &Destination, transport: Transport) -> String {
    let scheme = match transport {
        Transport::HttpsInsecure => "https",
        _ => "http",
    };
    format!("{}://{}/{}", scheme, dest.authority(), dest.path)
}

/// Send `dest` upstream and stream the response into `writer`.
///
/// Returns the number of response bytes written.
pub async fn forward_request<W>(
    clients: &HttpClients,
    dest: &Destination,
    transport: Transport,
    writer: &mut W,
) -> Result<u64, RelayError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let client = clients.client(dest, transport)?;
    let method = reqwest::Method::from_bytes(dest.method.as_bytes())
        .map_err(|e| CodecError::MalformedFrame(format!("method {:?}: {}", dest.method, e)))?;
    let url = request_url(dest, transport);

    let mut request = client.request(method, &url);
    for (name, value) in &dest.headers {
        if HOP_BY_HOP.iter().any(|h| name.eq_ignore_ascii_case(h)) {
            continue;
        }
        request = request.header(name.as_str(), value.as_str());
    }
    if !dest.raw_body.is_empty() {
        request = request.body(dest.raw_body.clone());
    }

    let authority = dest.authority();
    let mut response = request
        .send()
        .await
        .map_err(|e| RelayError::from_upstream(&authority, e))?;

    tracing::debug!(
        url = %url,
        status = response.status().as_u16(),
        "Upstream responded"
    );

    let head = response_head(&response);
    writer.write_all(&head).await?;
    let mut total = head.len() as u64;

    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| RelayError::from_upstream(&authority, e))?
    {
        writer.write_all(&chunk).await?;
        total += chunk.len() as u64;
    }

    let _ = writer.shutdown().await;
    Ok(total)
}

/// Status line and headers as the destination sent them, minus the
/// framing headers, plus `Connection: close`.
///
/// The reason phrase is the canonical one for the status code; reqwest
/// does not keep the phrase the destination actually sent.
pub fn response_head(response: &reqwest::Response) -> Vec<u8> {
    let version = if response.version() <= reqwest::Version::HTTP_10 {
        "HTTP/1.0"
    } else {
        "HTTP/1.1"
    };
    let status = response.status();

    let mut head = format!(
        "{} {} {}\r\n",
        version,
        status.as_u16(),
        status.canonical_reason().unwrap_or("")
    )
    .into_bytes();

    for (name, value) in response.headers() {
        if DROPPED_RESPONSE_HEADERS.contains(&name.as_str()) {
            continue;
        }
        head.extend_from_slice(name.as_str().as_bytes());
        head.extend_from_slice(b": ");
        head.extend_from_slice(value.as_bytes());
        head.extend_from_slice(b"\r\n");
    }
    head.extend_from_slice(b"Connection: close\r\n\r\n");
    head
}
