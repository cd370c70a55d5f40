//! Byte forwarding between two halves of a session.
//!
//! # Responsibilities
//! - Copy one direction of a session until EOF or error
//! - Optionally transform each chunk on the way through
//! - Count forwarded bytes per role and direction
//!
//! # Design Decisions
//! - The next read starts only after `write_all` returned, so a slow
//!   writer stalls the reader instead of growing a buffer
//! - Teardown belongs to the caller; `forward` only reports how it ended

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::RelayError;
use crate::observability::metrics;

/// Read size for one forwarded chunk.
pub const CHUNK_SIZE: usize = 16 * 1024;

/// Copy `reader` into `writer` verbatim until EOF.
///
/// Returns the number of bytes written.
pub async fn forward<R, W>(
    reader: &mut R,
    writer: &mut W,
    role: &'static str,
    direction: &'static str,
) -> Result<u64, RelayError>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    forward_with(reader, writer, role, direction, |chunk| {
        Ok(bytes::Bytes::copy_from_slice(chunk))
    })
    .await
}

/// Copy `reader` into `writer`, passing every chunk through `transform`.
///
/// A transform may return an empty buffer to hold the chunk back (for
/// example while a frame is still incomplete); nothing is written then.
pub async fn forward_with<R, W, F>(
    reader: &mut R,
    writer: &mut W,
    role: &'static str,
    direction: &'static str,
    mut transform: F,
) -> Result<u64, RelayError>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
    F: FnMut(&[u8]) -> Result<bytes::Bytes, RelayError>,
{
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut total = 0u64;

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }

        let out = transform(&buf[..n])?;
        if out.is_empty() {
            continue;
        }

        writer.write_all(&out).await?;
        total += out.len() as u64;
        metrics::bytes_forwarded(role, direction, out.len() as u64);
    }

    let _ = writer.shutdown().await;
    Ok(total)
}
