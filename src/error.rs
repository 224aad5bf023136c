//! Error taxonomy for the relay pipeline.
//!
//! # Classes
//! - `FramingError`: the upstream body violates chunked framing. Fatal, never retried.
//! - `TransportError`: a read, write or connect failed or timed out, or the target's
//!   response was unreadable. Fatal, never retried.
//! - `SetupError`: invalid construction parameters. Only raised before a session starts.
//!
//! # Design Decisions
//! - Framing errors keep the offending raw bytes for diagnostics
//! - `SessionError` is what a session reports, exactly once, through its error callback

use std::fmt;
use std::io;
use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;

use crate::http::head::HeadError;

/// Malformed chunked framing on the upstream stream.
#[derive(Debug, Error)]
pub enum FramingError {
    /// The chunk-size line did not end in CRLF.
    #[error("chunk size line is not CRLF terminated: {}", Escaped(.raw))]
    MissingLineTerminator { raw: Bytes },

    /// The chunk-size line exceeded the configured limit.
    #[error("chunk size line exceeds {limit} bytes")]
    LineTooLong { limit: usize, raw: Bytes },

    /// The chunk-size line is not a hexadecimal integer.
    #[error("invalid chunk size line: {}", Escaped(.raw))]
    InvalidLength { raw: Bytes },

    /// The chunk-size line carries a `;` extension.
    #[error("chunk extensions are not supported: {}", Escaped(.raw))]
    ChunkExtension { raw: Bytes },

    /// The declared chunk length is larger than the configured maximum.
    #[error("chunk length {length:?} exceeds limit of {limit} bytes")]
    ChunkTooLarge {
        length: Option<u64>,
        limit: usize,
        raw: Bytes,
    },

    /// The chunk body was not followed by CRLF.
    #[error("chunk body is not CRLF terminated: {}", Escaped(.raw))]
    MissingBodyTerminator { raw: Bytes },

    /// The stream ended before a complete line or body arrived.
    #[error("stream ended before {expected} expected bytes arrived")]
    Truncated { expected: usize, raw: Bytes },

    /// Something other than CRLF followed the terminal zero-length chunk.
    #[error("unexpected bytes after terminal chunk: {}", Escaped(.raw))]
    UnexpectedTrailer { raw: Bytes },

    /// A read completed after the decoder had already stopped.
    #[error("read completed after decoder stopped")]
    ReadAfterClose { raw: Bytes },
}

impl FramingError {
    /// The raw bytes that caused the error.
    pub fn raw(&self) -> &[u8] {
        match self {
            FramingError::MissingLineTerminator { raw }
            | FramingError::LineTooLong { raw, .. }
            | FramingError::InvalidLength { raw }
            | FramingError::ChunkExtension { raw }
            | FramingError::ChunkTooLarge { raw, .. }
            | FramingError::MissingBodyTerminator { raw }
            | FramingError::Truncated { raw, .. }
            | FramingError::UnexpectedTrailer { raw }
            | FramingError::ReadAfterClose { raw } => &raw[..],
        }
    }
}

/// Which I/O operation an error or timeout refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Connect,
    Read,
    Write,
    Response,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Connect => "connect",
            Operation::Read => "read",
            Operation::Write => "write",
            Operation::Response => "response",
        };
        f.write_str(name)
    }
}

/// Low-level I/O failure on either stream.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("upstream read failed: {0}")]
    Read(#[source] io::Error),

    #[error("downstream write failed: {0}")]
    Write(#[source] io::Error),

    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("unreadable response from target: {0}")]
    Response(#[source] HeadError),

    /// A stream-level timeout; treated like any other I/O failure.
    #[error("{op} timed out after {after:?}")]
    TimedOut { op: Operation, after: Duration },
}

impl TransportError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::TimedOut { .. })
    }
}

/// Invalid construction parameters.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SetupError {
    #[error("block size must be greater than zero")]
    InvalidBlockSize,

    #[error("block size {block_size} is not a multiple of the cipher block size {cipher_block}")]
    MisalignedBlockSize { block_size: usize, cipher_block: usize },

    #[error("outbound chunk size must be greater than zero")]
    InvalidChunkSize,

    #[error("watermarks must satisfy chunk_size ({chunk_size}) <= low ({low}) < high ({high})")]
    InvalidWatermarks {
        chunk_size: usize,
        low: usize,
        high: usize,
    },

    #[error("{name} must be greater than zero")]
    InvalidLimit { name: &'static str },

    #[error("invalid key material: {0}")]
    InvalidKey(String),
}

/// Coarse classification handed to the error callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Framing,
    Transport,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Framing => "framing",
            ErrorKind::Transport => "transport",
            ErrorKind::Internal => "internal",
        }
    }
}

/// Fatal error that terminates a session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Framing(#[from] FramingError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Neither side has an operation in flight and the session is not complete.
    #[error("session stalled with {pending} bytes pending")]
    Stalled { pending: usize },
}

impl SessionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::Framing(_) => ErrorKind::Framing,
            SessionError::Transport(_) => ErrorKind::Transport,
            SessionError::Stalled { .. } => ErrorKind::Internal,
        }
    }
}

/// Renders raw wire bytes with non-printable characters escaped.
struct Escaped<'a>(&'a [u8]);

impl fmt::Display for Escaped<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\"", self.0.escape_ascii())
    }
}
