//! Chunked transfer-encoding framing.
//!
//! # Wire Format
//! ```text
//! chunk    = <hex-length> CRLF <payload> CRLF
//! terminal = "0" CRLF CRLF
//! ```
//!
//! # Design Decisions
//! - Hex lengths: upper or lower case accepted, lower case emitted, no `0x` prefix
//! - No chunk extensions and no trailers; either one is a framing error
//! - Decoder and encoder are sans-io state machines; the session drives the actual I/O

pub mod decoder;
pub mod encoder;

use std::fmt::Write;

use bytes::{Bytes, BytesMut};

pub use decoder::{Decoded, DecoderState, InboundFrameDecoder, ReadRequest};
pub use encoder::{EncoderState, OutboundFrameEncoder};

pub const CRLF: &[u8] = b"\r\n";

/// The zero-length chunk that closes a chunked body.
pub const TERMINAL_CHUNK: &[u8] = b"0\r\n\r\n";

/// Frame `payload` as one chunk, optionally preceded by `head`.
pub fn encode_chunk(head: Option<Bytes>, payload: &[u8]) -> Bytes {
    let head_len = head.as_ref().map_or(0, |h| h.len());
    // 16 hex digits cover any usize length.
    let mut frame = BytesMut::with_capacity(head_len + payload.len() + 16 + 2 * CRLF.len());
    if let Some(head) = head {
        frame.extend_from_slice(&head);
    }
    // Writing into a BytesMut cannot fail.
    let _ = write!(frame, "{:x}", payload.len());
    frame.extend_from_slice(CRLF);
    frame.extend_from_slice(payload);
    frame.extend_from_slice(CRLF);
    frame.freeze()
}

/// The terminal chunk, optionally preceded by `head`.
pub fn encode_terminal(head: Option<Bytes>) -> Bytes {
    match head {
        Some(head) => {
            let mut frame = BytesMut::with_capacity(head.len() + TERMINAL_CHUNK.len());
            frame.extend_from_slice(&head);
            frame.extend_from_slice(TERMINAL_CHUNK);
            frame.freeze()
        }
        None => Bytes::from_static(TERMINAL_CHUNK),
    }
}

/// Why a chunk-size field was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeError {
    Empty,
    Extension,
    NotHex,
    Overflow,
}

/// Parse the hex digits of a chunk-size line (CRLF already stripped).
pub fn parse_chunk_size(field: &[u8]) -> Result<u64, SizeError> {
    if field.is_empty() {
        return Err(SizeError::Empty);
    }
    if field.contains(&b';') {
        return Err(SizeError::Extension);
    }
    field.iter().try_fold(0u64, |acc, &digit| {
        let value = match digit {
            b'0'..=b'9' => digit - b'0',
            b'a'..=b'f' => digit - b'a' + 10,
            b'A'..=b'F' => digit - b'A' + 10,
            _ => return Err(SizeError::NotHex),
        };
        acc.checked_mul(16)
            .and_then(|acc| acc.checked_add(u64::from(value)))
            .ok_or(SizeError::Overflow)
    })
}
