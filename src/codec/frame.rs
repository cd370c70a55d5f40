//! Incremental envelope reassembly.
//!
//! Bytes arrive in arbitrary chunks. A frame is released once the head
//! boundary is buffered and, when `Content-Length = N` is declared, N more
//! bytes past it. Without `Content-Length` the frame is whatever has been
//! buffered when the boundary shows up (single-chunk framing).

use bytes::{Bytes, BytesMut};

use super::envelope::{declared_content_length, head_len, is_http_request_line, KNOWN_METHODS};
use crate::error::CodecError;

/// Largest request head accepted before the frame is declared malformed.
pub const MAX_HEAD_LEN: usize = 64 * 1024;

/// One unit released by [`FrameDecoder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A complete HTTP request: head plus declared body.
    Http(Bytes),
    /// Buffered bytes whose first line is not an HTTP request line.
    Opaque(Bytes),
}

impl Frame {
    pub fn bytes(&self) -> &Bytes {
        match self {
            Frame::Http(b) | Frame::Opaque(b) => b,
        }
    }

    pub fn into_bytes(self) -> Bytes {
        match self {
            Frame::Http(b) | Frame::Opaque(b) => b,
        }
    }
}

/// Per-session accumulator. Owned by exactly one session task.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: BytesMut,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Number of buffered bytes not yet released as a frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Release the next complete frame, if any.
    ///
    /// `Ok(None)` means more bytes are needed.
    pub fn next_frame(&mut self) -> Result<Option<Frame>, CodecError> {
        if self.buf.is_empty() {
            return Ok(None);
        }

        let Some(line_end) = self.buf.iter().position(|&b| b == b'\n') else {
            if self.buf.len() >= MAX_HEAD_LEN || !starts_like_request(&self.buf) {
                return Ok(Some(Frame::Opaque(self.buf.split().freeze())));
            }
            return Ok(None);
        };

        if !is_http_request_line(&self.buf[..=line_end]) {
            return Ok(Some(Frame::Opaque(self.buf.split().freeze())));
        }

        let head_end = match head_len(&self.buf) {
            Some(end) if end <= MAX_HEAD_LEN => end,
            Some(_) => return Err(CodecError::MalformedFrame("request head too large".into())),
            None if self.buf.len() >= MAX_HEAD_LEN => {
                return Err(CodecError::MalformedFrame("request head too large".into()))
            }
            None => return Ok(None),
        };

        match declared_content_length(&self.buf)? {
            Some(body_len) => {
                let total = head_end + body_len;
                if self.buf.len() < total {
                    return Ok(None);
                }
                Ok(Some(Frame::Http(self.buf.split_to(total).freeze())))
            }
            None => Ok(Some(Frame::Http(self.buf.split().freeze()))),
        }
    }

    /// Drain everything still buffered.
    pub fn take_remaining(&mut self) -> Bytes {
        self.buf.split().freeze()
    }
}

/// Whether `data` could still grow into `<METHOD> ...`.
fn starts_like_request(data: &[u8]) -> bool {
    match data.iter().position(|&b| b == b' ') {
        Some(space) => KNOWN_METHODS.iter().any(|m| m.as_bytes() == &data[..space]),
        None => KNOWN_METHODS.iter().any(|m| m.as_bytes().starts_with(data)),
    }
}
