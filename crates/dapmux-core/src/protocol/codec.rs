//! Content-Length frame codec.
//!
//! Each frame on the wire is a header block terminated by `\r\n\r\n` followed
//! by exactly `Content-Length` bytes of JSON:
//!
//! ```text
//! Content-Length: 52\r\n
//! \r\n
//! {"seq":1,"type":"request","command":"initialize"}
//! ```
//!
//! The decoder yields raw bodies; parsing happens in
//! [`parse_frame`](super::parse_frame) so a malformed body can be skipped
//! without poisoning the stream. A malformed header is fatal.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::types::Frame;
use crate::error::Error;

/// Default upper bound for a single frame body (16 MiB).
pub const DEFAULT_MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

/// Upper bound for the header block of one frame.
const MAX_HEADER_BYTES: usize = 8 * 1024;

const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";
const CONTENT_LENGTH: &str = "content-length";

/// Codec for Content-Length framed protocol messages.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_frame_bytes: usize,
    /// Body length of the frame whose header was already consumed.
    pending_body: Option<usize>,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_BYTES)
    }
}

impl FrameCodec {
    pub const fn new(max_frame_bytes: usize) -> Self {
        Self {
            max_frame_bytes,
            pending_body: None,
        }
    }

    pub const fn max_frame_bytes(&self) -> usize {
        self.max_frame_bytes
    }

    fn parse_header(&self, header: &[u8]) -> Result<usize, Error> {
        let header = std::str::from_utf8(header)
            .map_err(|_| Error::Framing("Header is not valid UTF-8".into()))?;

        let mut length = None;
        for line in header.split("\r\n").filter(|l| !l.is_empty()) {
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| Error::Framing(format!("Malformed header line: {line}")))?;
            if name.trim().eq_ignore_ascii_case(CONTENT_LENGTH) {
                let parsed = value.trim().parse::<usize>().map_err(|_| {
                    Error::Framing(format!("Invalid Content-Length: {}", value.trim()))
                })?;
                length = Some(parsed);
            }
        }

        let length = length.ok_or_else(|| Error::Framing("Missing Content-Length".into()))?;
        if length > self.max_frame_bytes {
            return Err(Error::Framing(format!(
                "Frame of {length} bytes exceeds limit of {}",
                self.max_frame_bytes
            )));
        }
        Ok(length)
    }
}

impl Decoder for FrameCodec {
    type Item = BytesMut;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let length = if let Some(length) = self.pending_body {
            length
        } else {
            let Some(end) = src
                .windows(HEADER_TERMINATOR.len())
                .position(|w| w == HEADER_TERMINATOR)
            else {
                if src.len() > MAX_HEADER_BYTES {
                    return Err(Error::Framing("Header block too large".into()));
                }
                return Ok(None);
            };
            let length = self.parse_header(&src[..end])?;
            src.advance(end + HEADER_TERMINATOR.len());
            self.pending_body = Some(length);
            length
        };

        if src.len() < length {
            src.reserve(length - src.len());
            return Ok(None);
        }

        self.pending_body = None;
        Ok(Some(src.split_to(length)))
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = Error;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let body = serde_json::to_vec(&item)?;
        if body.len() > self.max_frame_bytes {
            return Err(Error::Framing(format!(
                "Frame of {} bytes exceeds limit of {}",
                body.len(),
                self.max_frame_bytes
            )));
        }
        let header = format!("Content-Length: {}\r\n\r\n", body.len());
        dst.reserve(header.len() + body.len());
        dst.put_slice(header.as_bytes());
        dst.put_slice(&body);
        Ok(())
    }
}
