//! `Content-Length` framing codec for the client protocol stream.
//!
//! Each frame is a block of `Name: value` header lines terminated by an empty
//! line (`\r\n\r\n`), followed by exactly `Content-Length` bytes of UTF-8 JSON.
//!
//! # Usage
//!
//! Use [`DapCodec`] with [`tokio_util::codec::FramedRead`] over stdin and
//! [`tokio_util::codec::FramedWrite`] over stdout.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::{AppError, Result};

/// Largest body accepted from the client: 16 MiB.
pub const MAX_BODY_BYTES: usize = 16 * 1_048_576;

/// Largest header block accepted before the blank line.
const MAX_HEADER_BYTES: usize = 8 * 1024;

const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Codec for `Content-Length` framed protocol messages.
///
/// Decoding yields the JSON body of each frame as a `String`; encoding takes a
/// serialized JSON string and prepends the header.
#[derive(Debug, Default)]
pub struct DapCodec {
    /// Body length of the frame whose header has already been consumed.
    pending_body: Option<usize>,
}

impl DapCodec {
    /// Create a codec with no partially decoded frame.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for DapCodec {
    type Item = String;
    type Error = AppError;

    /// Decode the next complete frame from `src`.
    ///
    /// Returns `Ok(None)` while the header or body is still incomplete.
    ///
    /// # Errors
    ///
    /// - `AppError::Protocol` if the header block lacks a valid
    ///   `Content-Length`, exceeds its size limit, or the body is larger
    ///   than [`MAX_BODY_BYTES`] or not UTF-8.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        let body_len = match self.pending_body {
            Some(len) => len,
            None => {
                let Some(header_end) = find_subslice(src, HEADER_TERMINATOR) else {
                    if src.len() > MAX_HEADER_BYTES {
                        return Err(AppError::Protocol(format!(
                            "header block exceeded {MAX_HEADER_BYTES} bytes"
                        )));
                    }
                    return Ok(None);
                };

                let header = std::str::from_utf8(&src[..header_end])
                    .map_err(|e| AppError::Protocol(format!("header is not utf-8: {e}")))?;
                let len = parse_content_length(header)?;
                src.advance(header_end + HEADER_TERMINATOR.len());
                self.pending_body = Some(len);
                len
            }
        };

        if src.len() < body_len {
            src.reserve(body_len - src.len());
            return Ok(None);
        }

        self.pending_body = None;
        let body = src.split_to(body_len);
        String::from_utf8(body.to_vec())
            .map(Some)
            .map_err(|e| AppError::Protocol(format!("body is not utf-8: {e}")))
    }
}

impl Encoder<String> for DapCodec {
    type Error = AppError;

    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<()> {
        let header = format!("Content-Length: {}\r\n\r\n", item.len());
        dst.reserve(header.len() + item.len());
        dst.put_slice(header.as_bytes());
        dst.put_slice(item.as_bytes());
        Ok(())
    }
}

// ── Private helpers ───────────────────────────────────────────────────────────

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn parse_content_length(header: &str) -> Result<usize> {
    let value = header
        .split("\r\n")
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .map(|(_, value)| value.trim())
        .ok_or_else(|| AppError::Protocol("missing Content-Length header".into()))?;

    let len: usize = value
        .parse()
        .map_err(|e| AppError::Protocol(format!("invalid Content-Length '{value}': {e}")))?;

    if len > MAX_BODY_BYTES {
        return Err(AppError::Protocol(format!(
            "body too long: {len} exceeds {MAX_BODY_BYTES} bytes"
        )));
    }

    Ok(len)
}
