//! Inbound chunk decoder.
//!
//! # States
//! ```text
//! AwaitingLength ──len>0──▶ AwaitingBody ──CRLF ok──▶ AwaitingLength
//!       │
//!       └──len=0──▶ AwaitingTrailer ──CRLF──▶ Done
//!
//! any framing violation ──▶ Failed
//! ```
//!
//! Each state asks for exactly one read; the next transition happens only when
//! that read completes. `Done` and `Failed` ask for nothing.

use bytes::Bytes;

use super::{parse_chunk_size, SizeError, CRLF};
use crate::error::FramingError;

/// The read the decoder wants issued next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadRequest {
    /// A line up to and including LF, at most `limit` bytes.
    Line { limit: usize },
    /// Exactly this many bytes.
    Exactly(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    AwaitingLength,
    AwaitingBody { length: usize },
    /// The zero-length chunk was seen; waiting for the closing CRLF.
    AwaitingTrailer,
    Done,
    Failed,
}

/// Result of applying one completed read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// A size line was consumed; more reads follow.
    Continue,
    /// One chunk's payload, ready for the sink.
    Payload(Bytes),
    /// The body is complete. Reported once.
    Finished,
}

#[derive(Debug)]
pub struct InboundFrameDecoder {
    state: DecoderState,
    max_line_len: usize,
    max_chunk_len: usize,
    chunks: u64,
    payload_bytes: u64,
}

impl InboundFrameDecoder {
    pub fn new(max_line_len: usize, max_chunk_len: usize) -> Self {
        Self {
            state: DecoderState::AwaitingLength,
            max_line_len,
            max_chunk_len,
            chunks: 0,
            payload_bytes: 0,
        }
    }

    pub fn state(&self) -> DecoderState {
        self.state
    }

    pub fn is_done(&self) -> bool {
        self.state == DecoderState::Done
    }

    /// Number of non-empty chunks decoded so far.
    pub fn chunks(&self) -> u64 {
        self.chunks
    }

    pub fn payload_bytes(&self) -> u64 {
        self.payload_bytes
    }

    /// The read to issue next, if any.
    pub fn next_read(&self) -> Option<ReadRequest> {
        match self.state {
            DecoderState::AwaitingLength | DecoderState::AwaitingTrailer => Some(ReadRequest::Line {
                limit: self.max_line_len,
            }),
            DecoderState::AwaitingBody { length } => Some(ReadRequest::Exactly(length + CRLF.len())),
            DecoderState::Done | DecoderState::Failed => None,
        }
    }

    /// Apply the bytes delivered by the read returned from `next_read`.
    ///
    /// A short delivery means the stream ended early.
    pub fn on_read(&mut self, data: Bytes) -> Result<Decoded, FramingError> {
        let result = match self.state {
            DecoderState::AwaitingLength => self.on_length_line(data),
            DecoderState::AwaitingBody { length } => self.on_body(length, data),
            DecoderState::AwaitingTrailer => self.on_trailer(data),
            DecoderState::Done | DecoderState::Failed => Err(FramingError::ReadAfterClose { raw: data }),
        };
        if result.is_err() {
            self.state = DecoderState::Failed;
        }
        result
    }

    /// Stop issuing reads after a failure elsewhere in the session.
    pub fn fail(&mut self) {
        if self.state != DecoderState::Done {
            self.state = DecoderState::Failed;
        }
    }

    fn on_length_line(&mut self, line: Bytes) -> Result<Decoded, FramingError> {
        let field = self.strip_line(&line)?;
        let length = match parse_chunk_size(field) {
            Ok(length) => length,
            Err(SizeError::Extension) => return Err(FramingError::ChunkExtension { raw: line }),
            Err(SizeError::Overflow) => {
                return Err(FramingError::ChunkTooLarge {
                    length: None,
                    limit: self.max_chunk_len,
                    raw: line,
                })
            }
            Err(SizeError::Empty | SizeError::NotHex) => return Err(FramingError::InvalidLength { raw: line }),
        };

        if length == 0 {
            tracing::trace!("terminal chunk received");
            self.state = DecoderState::AwaitingTrailer;
            return Ok(Decoded::Continue);
        }

        match usize::try_from(length) {
            Ok(length) if length <= self.max_chunk_len => {
                tracing::trace!(chunk_len = length, "chunk header decoded");
                self.state = DecoderState::AwaitingBody { length };
                Ok(Decoded::Continue)
            }
            _ => Err(FramingError::ChunkTooLarge {
                length: Some(length),
                limit: self.max_chunk_len,
                raw: line,
            }),
        }
    }

    fn on_body(&mut self, length: usize, mut data: Bytes) -> Result<Decoded, FramingError> {
        let expected = length + CRLF.len();
        if data.len() < expected {
            return Err(FramingError::Truncated { expected, raw: data });
        }
        if &data[length..expected] != CRLF {
            return Err(FramingError::MissingBodyTerminator {
                raw: data.split_off(length),
            });
        }
        data.truncate(length);
        self.chunks += 1;
        self.payload_bytes += length as u64;
        self.state = DecoderState::AwaitingLength;
        Ok(Decoded::Payload(data))
    }

    fn on_trailer(&mut self, line: Bytes) -> Result<Decoded, FramingError> {
        let field = self.strip_line(&line)?;
        if !field.is_empty() {
            return Err(FramingError::UnexpectedTrailer { raw: line });
        }
        tracing::debug!(
            chunks = self.chunks,
            payload_bytes = self.payload_bytes,
            "request body complete"
        );
        self.state = DecoderState::Done;
        Ok(Decoded::Finished)
    }

    /// Validate the line terminator and return the content before CRLF.
    fn strip_line<'a>(&self, line: &'a Bytes) -> Result<&'a [u8], FramingError> {
        match line.strip_suffix(CRLF) {
            Some(field) => Ok(field),
            None if line.ends_with(b"\n") => Err(FramingError::MissingLineTerminator { raw: line.clone() }),
            None if line.len() >= self.max_line_len => Err(FramingError::LineTooLong {
                limit: self.max_line_len,
                raw: line.clone(),
            }),
            None => Err(FramingError::Truncated {
                expected: line.len() + 1,
                raw: line.clone(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Feed a wire buffer through the decoder the way a stream reader would.
    fn decode(wire: &[u8]) -> (Vec<Decoded>, Option<FramingError>, InboundFrameDecoder) {
        let mut decoder = InboundFrameDecoder::new(64, 1024);
        let mut input = Bytes::copy_from_slice(wire);
        let mut events = Vec::new();
        while let Some(request) = decoder.next_read() {
            let data = match request {
                ReadRequest::Line { limit } => {
                    let end = input
                        .iter()
                        .take(limit)
                        .position(|&b| b == b'\n')
                        .map_or(input.len().min(limit), |i| i + 1);
                    input.split_to(end)
                }
                ReadRequest::Exactly(n) => input.split_to(n.min(input.len())),
            };
            match decoder.on_read(data) {
                Ok(event) => events.push(event),
                Err(err) => return (events, Some(err), decoder),
            }
        }
        (events, None, decoder)
    }

    fn payloads(events: &[Decoded]) -> Vec<&[u8]> {
        events
            .iter()
            .filter_map(|e| match e {
                Decoded::Payload(p) => Some(&p[..]),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn decodes_single_chunk() {
        let (events, err, decoder) = decode(b"5\r\nhello\r\n0\r\n\r\n");
        assert!(err.is_none());
        assert_eq!(payloads(&events), vec![&b"hello"[..]]);
        assert_eq!(events.last(), Some(&Decoded::Finished));
        assert_eq!(events.iter().filter(|e| **e == Decoded::Finished).count(), 1);
        assert!(decoder.is_done());
        assert_eq!(decoder.next_read(), None);
    }

    #[test]
    fn decodes_prototype_request_body() {
        let (events, err, decoder) =
            decode(b"1a\r\nabcdefghijklmnopqrstuvwxyz\r\n10\r\n1234567890abcdef\r\n0\r\n\r\n");
        assert!(err.is_none());
        assert_eq!(
            payloads(&events),
            vec![&b"abcdefghijklmnopqrstuvwxyz"[..], &b"1234567890abcdef"[..]]
        );
        assert_eq!(decoder.chunks(), 2);
        assert_eq!(decoder.payload_bytes(), 42);
    }

    #[test]
    fn payload_may_contain_crlf_and_binary() {
        let (events, err, _) = decode(b"4\r\n\r\n\x00\xff\r\n0\r\n\r\n");
        assert!(err.is_none());
        assert_eq!(payloads(&events), vec![&b"\r\n\x00\xff"[..]]);
    }

    #[test]
    fn rejects_non_hex_length_and_stops_reading() {
        let (events, err, decoder) = decode(b"g\r\nhello\r\n");
        assert!(events.is_empty());
        let err = err.unwrap();
        assert!(matches!(err, FramingError::InvalidLength { .. }));
        assert_eq!(err.raw(), b"g\r\n");
        assert_eq!(decoder.state(), DecoderState::Failed);
        assert_eq!(decoder.next_read(), None);
    }

    #[test]
    fn rejects_chunk_extensions() {
        let (_, err, _) = decode(b"5;ext=1\r\nhello\r\n0\r\n\r\n");
        assert!(matches!(err, Some(FramingError::ChunkExtension { .. })));
    }

    #[test]
    fn rejects_bare_lf_line() {
        let (_, err, _) = decode(b"5\nhello\r\n0\r\n\r\n");
        assert!(matches!(err, Some(FramingError::MissingLineTerminator { .. })));
    }

    #[test]
    fn rejects_missing_body_terminator() {
        let (events, err, _) = decode(b"3\r\nhello\r\n0\r\n\r\n");
        assert!(payloads(&events).is_empty());
        let err = err.unwrap();
        assert!(matches!(err, FramingError::MissingBodyTerminator { .. }));
        assert_eq!(err.raw(), b"lo");
    }

    #[test]
    fn rejects_truncated_body() {
        let (_, err, _) = decode(b"a\r\nhello");
        match err {
            Some(FramingError::Truncated { expected, raw }) => {
                assert_eq!(expected, 12);
                assert_eq!(&raw[..], b"hello");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn rejects_truncated_length_line() {
        let (_, err, _) = decode(b"5\r\nhello\r\n0");
        assert!(matches!(err, Some(FramingError::Truncated { .. })));
    }

    #[test]
    fn rejects_overlong_length_line() {
        let mut wire = vec![b'0'; 100];
        wire.extend_from_slice(b"5\r\nhello\r\n");
        let (_, err, _) = decode(&wire);
        assert!(matches!(err, Some(FramingError::LineTooLong { limit: 64, .. })));
    }

    #[test]
    fn rejects_chunk_above_limit() {
        let (_, err, _) = decode(b"401\r\n");
        assert!(matches!(
            err,
            Some(FramingError::ChunkTooLarge {
                length: Some(0x401),
                ..
            })
        ));
        let (_, err, _) = decode(b"ffffffffffffffffff\r\n");
        assert!(matches!(err, Some(FramingError::ChunkTooLarge { length: None, .. })));
    }

    #[test]
    fn rejects_trailers_after_terminal_chunk() {
        let (events, err, _) = decode(b"5\r\nhello\r\n0\r\nX-Trailer: 1\r\n\r\n");
        assert_eq!(payloads(&events), vec![&b"hello"[..]]);
        assert!(matches!(err, Some(FramingError::UnexpectedTrailer { .. })));
    }

    #[test]
    fn read_after_done_is_an_error() {
        let (_, _, mut decoder) = decode(b"0\r\n\r\n");
        assert!(decoder.is_done());
        let err = decoder.on_read(Bytes::from_static(b"x")).unwrap_err();
        assert!(matches!(err, FramingError::ReadAfterClose { .. }));
    }
}
