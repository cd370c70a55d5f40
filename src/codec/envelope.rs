//! HTTP-shaped envelopes.
//!
//! An envelope is a syntactically valid HTTP/1.1 request whose body is an
//! obfuscated payload. Framing finds the first `\r\n\r\n` and trusts
//! `Content-Length` for the rest; headers are never escaped or
//! length-prefixed, so a head containing that sequence early will misparse.

use std::collections::BTreeMap;

use bytes::Bytes;

use super::package::{self, Packaging};
use super::{find_subslice, Cipher, BOUNDARY};
use crate::error::CodecError;
use crate::routing::destination::{build_url, parse_url, Destination};

/// Methods accepted in a request line.
pub const KNOWN_METHODS: &[&str] = &[
    "GET", "PUT", "POST", "DELETE", "CONNECT", "TRACE", "OPTIONS", "HEAD",
];

/// Upper bound on headers parsed per request.
const MAX_HEADERS: usize = 64;

/// How the request target is written on the request line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TargetForm {
    /// `/path` (authority-form `host:port` for `CONNECT`).
    #[default]
    Origin,
    /// `scheme://host:port/path`, for next hops that are forward proxies.
    Absolute,
}

/// True iff the first line is `<METHOD> <target> HTTP/<major>.<minor>` with
/// a known method.
pub fn is_http_request_line(data: &[u8]) -> bool {
    let line = match data.iter().position(|&b| b == b'\n') {
        Some(end) => &data[..end],
        None => data,
    };
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    let Ok(line) = std::str::from_utf8(line) else {
        return false;
    };

    let mut parts = line.split(' ');
    let (Some(method), Some(target), Some(version), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return false;
    };

    KNOWN_METHODS.contains(&method)
        && !target.is_empty()
        && version
            .strip_prefix("HTTP/")
            .map(|v| {
                let b = v.as_bytes();
                b.len() == 3 && b[0].is_ascii_digit() && b[1] == b'.' && b[2].is_ascii_digit()
            })
            .unwrap_or(false)
}

/// Declared body length; `0` when no `Content-Length` header is present.
pub fn content_length(headers: &BTreeMap<String, String>) -> Result<usize, CodecError> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
        .map(|(_, v)| parse_length(v))
        .unwrap_or(Ok(0))
}

fn parse_length(value: &str) -> Result<usize, CodecError> {
    value
        .trim()
        .parse::<usize>()
        .map_err(|_| CodecError::MalformedFrame(format!("invalid Content-Length {:?}", value)))
}

/// Offset one past the header/body boundary, if present.
pub fn head_len(data: &[u8]) -> Option<usize> {
    find_subslice(data, BOUNDARY).map(|i| i + BOUNDARY.len())
}

/// Parsed request head: everything needed before the body arrives.
#[derive(Debug)]
struct Head {
    method: String,
    target: String,
    version: String,
    host: Option<String>,
    content_length: Option<usize>,
    headers: BTreeMap<String, String>,
    len: usize,
}

fn parse_head(data: &[u8]) -> Result<Head, CodecError> {
    let len = head_len(data).ok_or(CodecError::IncompleteFrame)?;

    let mut raw_headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut req = httparse::Request::new(&mut raw_headers);
    let status = req
        .parse(&data[..len])
        .map_err(|e| CodecError::MalformedFrame(format!("unparsable request head: {}", e)))?;
    if status.is_partial() {
        return Err(CodecError::IncompleteFrame);
    }

    let method = req
        .method
        .ok_or_else(|| CodecError::MalformedFrame("missing method".into()))?;
    if !KNOWN_METHODS.contains(&method) {
        return Err(CodecError::MalformedFrame(format!("unsupported method {:?}", method)));
    }
    let target = req
        .path
        .ok_or_else(|| CodecError::MalformedFrame("missing request target".into()))?;

    let mut host = None;
    let mut content_length = None;
    let mut headers = BTreeMap::new();
    for header in req.headers.iter() {
        let value = String::from_utf8_lossy(header.value).trim().to_string();
        if header.name.eq_ignore_ascii_case("host") {
            host = Some(value);
        } else if header.name.eq_ignore_ascii_case("content-length") {
            content_length = Some(parse_length(&value)?);
        } else {
            headers
                .entry(header.name.to_string())
                .and_modify(|existing: &mut String| {
                    existing.push_str(", ");
                    existing.push_str(&value);
                })
                .or_insert(value);
        }
    }

    Ok(Head {
        method: method.to_string(),
        target: target.to_string(),
        version: format!("1.{}", req.version.unwrap_or(1)),
        host,
        content_length,
        headers,
        len,
    })
}

/// `Content-Length` declared by the head at the start of `data`.
///
/// `Ok(None)` means the head carries no `Content-Length`.
pub fn declared_content_length(data: &[u8]) -> Result<Option<usize>, CodecError> {
    parse_head(data).map(|head| head.content_length)
}

/// Parse a plain HTTP request (no deobfuscation) into a [`Destination`].
///
/// Accepts origin-form (host taken from `Host`), authority-form for
/// `CONNECT`, and absolute-form targets.
pub fn parse_request(data: &[u8]) -> Result<Destination, CodecError> {
    let head = parse_head(data)?;

    let body = &data[head.len..];
    let body = match head.content_length {
        Some(n) if body.len() < n => return Err(CodecError::IncompleteFrame),
        Some(n) => &body[..n],
        None => body,
    };

    let mut dest = if head.method == "CONNECT" {
        parse_url(&head.target)?
    } else if head.target.starts_with('/') || head.target == "*" {
        let host = head
            .host
            .as_deref()
            .ok_or_else(|| CodecError::MalformedFrame("origin-form request without Host".into()))?;
        let mut dest = parse_url(host)?;
        dest.path = head.target.trim_start_matches('/').to_string();
        dest
    } else {
        parse_url(&head.target)?
    };

    dest.method = head.method;
    dest.version = head.version;
    dest.headers = head.headers;
    dest.raw_body = Bytes::copy_from_slice(body);
    Ok(dest)
}

/// Serialize and parse envelopes with a fixed cipher and packaging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Codec {
    pub cipher: Cipher,
    pub package: Packaging,
}

impl Codec {
    pub fn new(cipher: Cipher, package: Packaging) -> Self {
        Self { cipher, package }
    }

    /// Request line, `Host`, caller headers, obfuscated body with its exact
    /// `Content-Length`, blank line.
    ///
    /// `Host` always carries the port: a port-less `Host` reads back as
    /// port 80, which would lose the protocol of any other destination.
    pub fn serialize_envelope(&self, dest: &Destination) -> Vec<u8> {
        self.serialize_envelope_with(dest, TargetForm::Origin)
    }

    pub fn serialize_envelope_with(&self, dest: &Destination, form: TargetForm) -> Vec<u8> {
        let target = if dest.is_connect() {
            dest.authority()
        } else {
            match form {
                TargetForm::Origin => format!("/{}", dest.path),
                TargetForm::Absolute => build_url(dest),
            }
        };

        let mut content_type = None;
        let body = if dest.raw_body.is_empty() {
            Vec::new()
        } else {
            let obfuscated = self.cipher.obfuscate(&dest.raw_body);
            if self.package == Packaging::File {
                let (ct, body) = package::pack_file(&obfuscated);
                content_type = Some(ct);
                body
            } else {
                obfuscated
            }
        };

        let mut head = format!("{} {} HTTP/{}\r\n", dest.method, target, dest.version);
        head.push_str(&format!("Host: {}\r\n", dest.authority()));
        for (name, value) in &dest.headers {
            if name.eq_ignore_ascii_case("host")
                || name.eq_ignore_ascii_case("content-length")
                || (content_type.is_some() && name.eq_ignore_ascii_case("content-type"))
            {
                continue;
            }
            head.push_str(&format!("{}: {}\r\n", name, value));
        }
        if let Some(ct) = content_type {
            head.push_str(&format!("Content-Type: {}\r\n", ct));
        }
        if !body.is_empty() {
            head.push_str(&format!("Content-Length: {}\r\n", body.len()));
        }
        head.push_str("\r\n");

        let mut out = head.into_bytes();
        out.extend_from_slice(&body);
        out
    }

    /// Parse an envelope and recover the original payload as `raw_body`.
    pub fn parse_envelope(&self, data: &[u8]) -> Result<Destination, CodecError> {
        let mut dest = parse_request(data)?;
        if dest.raw_body.is_empty() {
            return Ok(dest);
        }

        let boundary = dest
            .header("content-type")
            .and_then(package::multipart_boundary)
            .map(str::to_string);
        let obfuscated = match boundary {
            Some(boundary) => {
                dest.headers.retain(|k, _| !k.eq_ignore_ascii_case("content-type"));
                package::unpack_file(&boundary, &dest.raw_body)?
            }
            None => dest.raw_body.to_vec(),
        };

        dest.raw_body = Bytes::from(self.cipher.deobfuscate(&obfuscated)?);
        Ok(dest)
    }

    /// Wrap one chunk of client bytes using `template` for routing fields.
    /// `Plain` packaging returns the chunk unchanged.
    pub fn wrap(&self, template: &Destination, chunk: &[u8], form: TargetForm) -> Bytes {
        if self.package == Packaging::Plain {
            return Bytes::copy_from_slice(chunk);
        }
        let dest = Destination {
            raw_body: Bytes::copy_from_slice(chunk),
            ..template.clone()
        };
        Bytes::from(self.serialize_envelope_with(&dest, form))
    }

    /// Recover the payload carried by one complete frame.
    /// `Plain` packaging returns the frame unchanged.
    pub fn unwrap(&self, frame: &[u8]) -> Result<Bytes, CodecError> {
        if self.package == Packaging::Plain {
            return Ok(Bytes::copy_from_slice(frame));
        }
        Ok(self.parse_envelope(frame)?.raw_body)
    }
}
