//! Request surgery for reverse-proxying.
//!
//! Only the request target's scheme/authority and the first `Host`,
//! `Origin` and `Referer` headers change. Every other byte, including the
//! body and line endings, is copied through.

use super::envelope::{head_len, is_http_request_line};
use crate::routing::destination::Destination;

/// Point an existing HTTP request at `new_dest`.
///
/// Input that does not start with an HTTP request line is returned as-is.
pub fn rewrite_request_target(raw: &[u8], new_dest: &Destination) -> Vec<u8> {
    if !is_http_request_line(raw) {
        return raw.to_vec();
    }

    let head_end = head_len(raw).unwrap_or(raw.len());
    let (head, body) = raw.split_at(head_end);
    let origin = new_dest.origin();

    let mut out = Vec::with_capacity(raw.len() + 64);
    let mut rewritten = Rewritten::default();
    for (i, line) in head.split_inclusive(|&b| b == b'\n').enumerate() {
        let (content, ending) = split_line_ending(line);
        let replacement = if i == 0 {
            rewrite_request_line(content, &origin)
        } else {
            rewrite_header(content, new_dest, &origin, &mut rewritten)
        };
        match replacement {
            Some(text) => out.extend_from_slice(text.as_bytes()),
            None => out.extend_from_slice(content),
        }
        out.extend_from_slice(ending);
    }
    out.extend_from_slice(body);
    out
}

#[derive(Default)]
struct Rewritten {
    host: bool,
    origin: bool,
    referer: bool,
}

fn split_line_ending(line: &[u8]) -> (&[u8], &[u8]) {
    let cut = if line.ends_with(b"\r\n") {
        2
    } else if line.ends_with(b"\n") {
        1
    } else {
        0
    };
    line.split_at(line.len() - cut)
}

fn rewrite_request_line(line: &[u8], origin: &str) -> Option<String> {
    let line = std::str::from_utf8(line).ok()?;
    let mut parts = line.splitn(3, ' ');
    let (method, target, version) = (parts.next()?, parts.next()?, parts.next()?);
    if !target.contains("://") {
        return None;
    }
    Some(format!("{} {} {}", method, replace_authority(target, origin), version))
}

fn rewrite_header(
    line: &[u8],
    new_dest: &Destination,
    origin: &str,
    done: &mut Rewritten,
) -> Option<String> {
    let line = std::str::from_utf8(line).ok()?;
    let (name, value) = line.split_once(':')?;

    let new_value = match name.trim().to_ascii_lowercase().as_str() {
        "host" if !done.host => {
            done.host = true;
            new_dest.host_header()
        }
        "origin" if !done.origin => {
            done.origin = true;
            origin.to_string()
        }
        "referer" if !done.referer => {
            done.referer = true;
            replace_authority(value.trim(), origin)
        }
        _ => return None,
    };
    Some(format!("{}: {}", name, new_value))
}

/// Swap the `scheme://authority` prefix of `url` for `origin`, keeping the path.
fn replace_authority(url: &str, origin: &str) -> String {
    match url.find("://") {
        Some(idx) => {
            let after = idx + 3;
            let path_start = url[after..].find('/').map(|p| after + p).unwrap_or(url.len());
            format!("{}{}", origin, &url[path_start..])
        }
        None => format!("{}/", origin),
    }
}
