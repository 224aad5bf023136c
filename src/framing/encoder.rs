//! Outbound chunk encoder.
//!
//! # States
//! ```text
//! Idle ──block available──▶ Sending ──write done──▶ Idle
//!  │
//!  └──finish requested, buffer drained──▶ Finishing ──write done──▶ Closed
//!
//! any failure ──▶ Failed (nothing more is written, not even the terminal chunk)
//! ```
//!
//! # Design Decisions
//! - Demand-driven: the encoder only acts when the session prompts it, never polls
//! - A prompt that arrives while `Sending` is not queued; the next `Idle` entry
//!   re-reads the buffer, so nothing is lost
//! - One frame in flight at a time; frames strictly alternate with completions

use bytes::Bytes;

use super::{encode_chunk, encode_terminal};
use crate::buffer::StageBuffer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderState {
    Idle,
    /// A data chunk carrying `len` payload bytes is being written.
    Sending { len: usize },
    /// The terminal chunk is being written.
    Finishing,
    Closed,
    Failed,
}

#[derive(Debug)]
pub struct OutboundFrameEncoder {
    state: EncoderState,
    chunk_size: usize,
    /// Request line and headers; rides on the first frame.
    head: Option<Bytes>,
    chunks: u64,
    payload_bytes: u64,
    wire_bytes: u64,
}

impl OutboundFrameEncoder {
    pub fn new(chunk_size: usize, head: Option<Bytes>) -> Self {
        Self {
            state: EncoderState::Idle,
            chunk_size,
            head,
            chunks: 0,
            payload_bytes: 0,
            wire_bytes: 0,
        }
    }

    pub fn state(&self) -> EncoderState {
        self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == EncoderState::Idle
    }

    pub fn is_closed(&self) -> bool {
        self.state == EncoderState::Closed
    }

    /// Whether the head block has gone out with a frame.
    pub fn head_sent(&self) -> bool {
        self.head.is_none()
    }

    /// Data chunks produced so far (the terminal chunk is not counted).
    pub fn chunks(&self) -> u64 {
        self.chunks
    }

    pub fn payload_bytes(&self) -> u64 {
        self.payload_bytes
    }

    /// Bytes handed to the downstream stream, framing and head included.
    pub fn wire_bytes(&self) -> u64 {
        self.wire_bytes
    }

    /// Prompt the encoder. Returns the next frame to write, if any.
    ///
    /// Does nothing unless `Idle`.
    pub fn prompt(&mut self, buffer: &mut StageBuffer, finish_requested: bool) -> Option<Bytes> {
        if self.state != EncoderState::Idle {
            return None;
        }

        let block = match buffer.read_next(self.chunk_size) {
            Some(block) => Some(block),
            None if finish_requested => Some(buffer.read_all()).filter(|rest| !rest.is_empty()),
            None => None,
        };

        let frame = match block {
            Some(block) => {
                tracing::trace!(chunk_len = block.len(), pending = buffer.len(), "sending chunk");
                self.state = EncoderState::Sending { len: block.len() };
                self.chunks += 1;
                self.payload_bytes += block.len() as u64;
                encode_chunk(self.head.take(), &block)
            }
            None if finish_requested => {
                tracing::trace!("sending terminal chunk");
                self.state = EncoderState::Finishing;
                encode_terminal(self.head.take())
            }
            None => return None,
        };
        self.wire_bytes += frame.len() as u64;
        Some(frame)
    }

    /// The outstanding write finished.
    pub fn on_write_complete(&mut self) -> EncoderState {
        self.state = match self.state {
            EncoderState::Sending { .. } => EncoderState::Idle,
            EncoderState::Finishing => EncoderState::Closed,
            other => other,
        };
        self.state
    }

    /// Stop; no further frames, including the terminal chunk.
    pub fn fail(&mut self) {
        if self.state != EncoderState::Closed {
            self.state = EncoderState::Failed;
        }
    }
}
