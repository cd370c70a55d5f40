//! Envelope packaging modes.
//!
//! - `plain`: no envelope at all, relays forward client bytes unchanged
//! - `req`: the obfuscated payload is the request body
//! - `file`: the obfuscated payload is sent as a `multipart/form-data`
//!   file upload

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::find_subslice;
use crate::error::CodecError;

/// Multipart field name used for `file` packaging.
const FILE_FIELD: &str = "file";

/// Framing mode shared by both relays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Packaging {
    Plain,
    #[default]
    Req,
    File,
}

/// Wrap `content` as a single-file multipart upload.
///
/// Returns the `Content-Type` header value and the body.
pub fn pack_file(content: &[u8]) -> (String, Vec<u8>) {
    let token: u64 = rand::thread_rng().gen();
    let boundary = format!("----FormBoundary{:016x}", token);

    let mut body = Vec::with_capacity(content.len() + 2 * boundary.len() + 160);
    body.extend_from_slice(
        format!(
            "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{:08x}.bin\"\r\nContent-Type: application/octet-stream\r\n\r\n",
            boundary,
            FILE_FIELD,
            token as u32
        )
        .as_bytes(),
    );
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());

    (format!("multipart/form-data; boundary={}", boundary), body)
}

/// Extract the multipart boundary from a `Content-Type` value, if it is
/// `multipart/form-data`.
pub fn multipart_boundary(content_type: &str) -> Option<&str> {
    let mut parts = content_type.split(';').map(str::trim);
    let mime = parts.next()?;
    if !mime.eq_ignore_ascii_case("multipart/form-data") {
        return None;
    }
    parts
        .filter_map(|p| p.split_once('='))
        .find(|(k, _)| k.trim().eq_ignore_ascii_case("boundary"))
        .map(|(_, v)| v.trim().trim_matches('"'))
        .filter(|b| !b.is_empty())
}

/// Inverse of [`pack_file`]: return the content of the first part.
pub fn unpack_file(boundary: &str, body: &[u8]) -> Result<Vec<u8>, CodecError> {
    let opening = format!("--{}\r\n", boundary);
    let rest = body
        .strip_prefix(opening.as_bytes())
        .ok_or_else(|| {
            CodecError::MalformedFrame("multipart body missing opening boundary".into())
        })?;

    let headers_end = find_subslice(rest, b"\r\n\r\n")
        .ok_or_else(|| {
            CodecError::MalformedFrame("multipart part has no header terminator".into())
        })?;
    let content = &rest[headers_end + 4..];

    let closing = format!("\r\n--{}", boundary);
    let end = find_subslice(content, closing.as_bytes())
        .ok_or_else(|| {
            CodecError::MalformedFrame("multipart body missing closing boundary".into())
        })?;

    Ok(content[..end].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_then_unpack() {
        let (content_type, body) = pack_file(b"blob=UElORw==");
        let boundary = multipart_boundary(&content_type).unwrap();
        assert_eq!(unpack_file(boundary, &body).unwrap(), b"blob=UElORw==");
    }

    #[test]
    fn boundary_is_fresh_per_upload() {
        let (a, _) = pack_file(b"x");
        let (b, _) = pack_file(b"x");
        assert_ne!(a, b);
    }

    #[test]
    fn quoted_boundary_is_accepted() {
        assert_eq!(
            multipart_boundary("multipart/form-data; boundary=\"abc\""),
            Some("abc")
        );
        assert_eq!(multipart_boundary("application/json"), None);
    }

    #[test]
    fn truncated_multipart_is_malformed() {
        let (content_type, body) = pack_file(b"payload");
        let boundary = multipart_boundary(&content_type).unwrap();
        let err = unpack_file(boundary, &body[..body.len() - 12]).unwrap_err();
        assert!(matches!(err, CodecError::MalformedFrame(_)));
    }
}
