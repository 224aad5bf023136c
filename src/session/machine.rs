//! I/O-free session state.
//!
//! `SessionCore` pairs the decoder with the stage buffer and the buffer with
//! the encoder. It decides which read or write to issue next and applies their
//! completions; the async driver only moves bytes.

use bytes::Bytes;

use crate::buffer::StageBuffer;
use crate::error::{SessionError, TransportError};
use crate::framing::{Decoded, EncoderState, InboundFrameDecoder, OutboundFrameEncoder, ReadRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Running,
    /// The terminal chunk has been written.
    Completed,
    /// A fatal error was reported; nothing else will be issued.
    Failed,
}

/// Milestone reached by applying a completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    Continue,
    /// The upstream body has been fully decoded.
    BodyComplete,
    /// The downstream body has been fully written.
    ProxyComplete,
}

/// Counters describing a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionSummary {
    pub chunks_in: u64,
    pub payload_in: u64,
    pub chunks_out: u64,
    pub payload_out: u64,
    pub wire_out: u64,
    pub backpressure_pauses: u64,
}

#[derive(Debug)]
pub struct SessionCore {
    decoder: InboundFrameDecoder,
    buffer: StageBuffer,
    encoder: OutboundFrameEncoder,
    state: SessionState,
    finish_requested: bool,
    reads_paused: bool,
    read_in_flight: bool,
    write_in_flight: bool,
    backpressure_pauses: u64,
}

impl SessionCore {
    pub fn new(decoder: InboundFrameDecoder, buffer: StageBuffer, encoder: OutboundFrameEncoder) -> Self {
        Self {
            decoder,
            buffer,
            encoder,
            state: SessionState::Running,
            finish_requested: false,
            reads_paused: false,
            read_in_flight: false,
            write_in_flight: false,
            backpressure_pauses: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn decoder(&self) -> &InboundFrameDecoder {
        &self.decoder
    }

    pub fn encoder(&self) -> &OutboundFrameEncoder {
        &self.encoder
    }

    /// Bytes waiting in the stage buffer.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    pub fn write_in_flight(&self) -> bool {
        self.write_in_flight
    }

    pub fn reads_paused(&self) -> bool {
        self.reads_paused
    }

    /// Request that the encoder drain and close once the buffer is empty.
    ///
    /// Takes effect on the next `next_write`; a write already in flight
    /// re-checks the flag when it completes.
    pub fn finish(&mut self) {
        self.finish_requested = true;
    }

    /// The read to issue next. Marks it in flight.
    ///
    /// Returns `None` while a read is outstanding, while backpressure holds
    /// reads, or once the decoder has stopped.
    pub fn next_read(&mut self) -> Option<ReadRequest> {
        if self.state != SessionState::Running || self.read_in_flight {
            return None;
        }
        if self.reads_paused {
            if !self.buffer.below_low_watermark() {
                return None;
            }
            tracing::debug!(pending = self.buffer.len(), "upstream reads resumed");
            self.reads_paused = false;
        }
        let request = self.decoder.next_read()?;
        self.read_in_flight = true;
        Some(request)
    }

    /// Apply the completion of the outstanding read.
    pub fn on_read(&mut self, result: Result<Bytes, TransportError>) -> Result<Progress, SessionError> {
        debug_assert!(self.read_in_flight, "read completion without a read in flight");
        self.read_in_flight = false;
        if self.state != SessionState::Running {
            return Ok(Progress::Continue);
        }

        let data = result.map_err(|err| self.fail(err.into()))?;
        match self.decoder.on_read(data) {
            Ok(Decoded::Continue) => Ok(Progress::Continue),
            Ok(Decoded::Payload(payload)) => {
                self.buffer.receive(&payload);
                if !self.reads_paused && self.buffer.above_high_watermark() {
                    self.reads_paused = true;
                    self.backpressure_pauses += 1;
                    tracing::debug!(pending = self.buffer.len(), "upstream reads paused");
                }
                Ok(Progress::Continue)
            }
            Ok(Decoded::Finished) => {
                self.finish();
                Ok(Progress::BodyComplete)
            }
            Err(err) => Err(self.fail(err.into())),
        }
    }

    /// The frame to write next. Marks it in flight.
    ///
    /// This is the encoder prompt: called after every completion, it picks up
    /// data that arrived while the previous write was outstanding.
    pub fn next_write(&mut self) -> Option<Bytes> {
        if self.state != SessionState::Running || self.write_in_flight {
            return None;
        }
        let frame = self.encoder.prompt(&mut self.buffer, self.finish_requested)?;
        self.write_in_flight = true;
        Some(frame)
    }

    /// Apply the completion of the outstanding write.
    pub fn on_write(&mut self, result: Result<(), TransportError>) -> Result<Progress, SessionError> {
        debug_assert!(self.write_in_flight, "write completion without a write in flight");
        self.write_in_flight = false;
        if self.state != SessionState::Running {
            return Ok(Progress::Continue);
        }

        result.map_err(|err| self.fail(err.into()))?;
        if self.encoder.on_write_complete() == EncoderState::Closed {
            self.state = SessionState::Completed;
            return Ok(Progress::ProxyComplete);
        }
        Ok(Progress::Continue)
    }

    /// Move to `Failed`, stopping both machines, and hand the error back.
    pub fn fail(&mut self, err: SessionError) -> SessionError {
        tracing::debug!(error = %err, kind = err.kind().as_str(), "session failed");
        self.state = SessionState::Failed;
        self.decoder.fail();
        self.encoder.fail();
        err
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            chunks_in: self.decoder.chunks(),
            payload_in: self.decoder.payload_bytes(),
            chunks_out: self.encoder.chunks(),
            payload_out: self.encoder.payload_bytes(),
            wire_out: self.encoder.wire_bytes(),
            backpressure_pauses: self.backpressure_pauses,
        }
    }
}
