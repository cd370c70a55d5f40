//! Payload obfuscation.
//!
//! This is NOT encryption. The transform is a fixed textual prefix followed
//! by a re-encoding of the payload; there is no key and anyone who knows the
//! format can reverse it. Its only job is to make tunneled bytes look like
//! an ordinary form field to a proxy that inspects request bodies.

use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};

use crate::error::CodecError;

/// Prefix carried by every obfuscated payload.
pub const OBFUSCATION_PREFIX: &[u8] = b"blob=";

/// Encoding applied after the prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Cipher {
    /// Payload bytes as-is.
    Utf8,
    /// Lowercase hex.
    Hex,
    /// Standard base64 with padding.
    #[default]
    Base64,
}

impl Cipher {
    /// Prefix + encoded payload. Deterministic.
    pub fn obfuscate(self, payload: &[u8]) -> Vec<u8> {
        let mut out =
            Vec::with_capacity(OBFUSCATION_PREFIX.len() + encoded_len(self, payload.len()));
        out.extend_from_slice(OBFUSCATION_PREFIX);
        match self {
            Cipher::Utf8 => out.extend_from_slice(payload),
            Cipher::Hex => out.extend_from_slice(hex::encode(payload).as_bytes()),
            Cipher::Base64 => {
                out.extend_from_slice(general_purpose::STANDARD.encode(payload).as_bytes())
            }
        }
        out
    }

    /// Inverse of [`Cipher::obfuscate`].
    pub fn deobfuscate(self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        let encoded = data.strip_prefix(OBFUSCATION_PREFIX).ok_or_else(|| {
            CodecError::MalformedObfuscation("missing obfuscation prefix".to_string())
        })?;

        match self {
            Cipher::Utf8 => Ok(encoded.to_vec()),
            Cipher::Hex => hex::decode(encoded)
                .map_err(|e| CodecError::MalformedObfuscation(format!("invalid hex: {}", e))),
            Cipher::Base64 => general_purpose::STANDARD
                .decode(encoded)
                .map_err(|e| CodecError::MalformedObfuscation(format!("invalid base64: {}", e))),
        }
    }
}

fn encoded_len(cipher: Cipher, len: usize) -> usize {
    match cipher {
        Cipher::Utf8 => len,
        Cipher::Hex => len * 2,
        Cipher::Base64 => len.div_ceil(3) * 4,
    }
}
