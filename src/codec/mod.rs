//! Envelope codec subsystem.
//!
//! # Data Flow
//! ```text
//! Ingress (client → tunnel):
//!     client chunk
//!     → cipher.rs (prefix + encoding)
//!     → package.rs (plain body or multipart file)
//!     → envelope.rs (request line, Host, headers, Content-Length)
//!
//! Egress (tunnel → destination):
//!     inbound bytes
//!     → frame.rs (boundary + Content-Length reassembly)
//!     → envelope.rs (parse head, unpack, deobfuscate)
//!     → rewrite.rs (only for traffic that is reverse-proxied)
//! ```
//!
//! # Design Decisions
//! - Stateless functions; the only state is the per-session `FrameDecoder`
//! - Obfuscation is deterministic and keyless; it is not encryption
//! - Boundary-based framing is kept as-is, including its known limitation

pub mod cipher;
pub mod envelope;
pub mod frame;
pub mod package;
pub mod rewrite;

pub use cipher::Cipher;
pub use envelope::{
    content_length, is_http_request_line, parse_request, Codec, TargetForm, KNOWN_METHODS,
};
pub use frame::{Frame, FrameDecoder};
pub use package::Packaging;
pub use rewrite::rewrite_request_target;

/// Header/body separator.
pub const BOUNDARY: &[u8] = b"\r\n\r\n";

/// Position of the first occurrence of `needle` in `haystack`.
pub(crate) fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_first_boundary() {
        assert_eq!(find_subslice(b"a\r\n\r\nb\r\n\r\n", BOUNDARY), Some(1));
        assert_eq!(find_subslice(b"a\r\n\r", BOUNDARY), None);
        assert_eq!(find_subslice(b"", BOUNDARY), None);
    }
}
