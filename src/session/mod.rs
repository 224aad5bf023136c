//! One relayed chunked body.
//!
//! # Data Flow
//! ```text
//! upstream ──read──▶ InboundFrameDecoder ──payload──▶ StageBuffer (transform)
//!                                                        │
//! downstream ◀──write── OutboundFrameEncoder ◀──prompt───┘
//! ```
//!
//! # Design Decisions
//! - `SessionCore` owns every decision; `Session` only runs the I/O it asks for
//! - At most one upstream read and one downstream write are in flight
//! - Every completion is followed by a re-prompt of both sides, which is how
//!   data that landed mid-write and paused reads get picked up
//! - The first error wins: both machines stop, the other operation is dropped,
//!   and `on_error` fires once

pub mod machine;
mod io;

use std::future::{self, Future};
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncBufRead, AsyncWrite};

pub use self::machine::{Progress, SessionCore, SessionState, SessionSummary};
use self::io::{read_frame, write_frame, PendingRead, PendingWrite};
pub(crate) use self::io::with_timeout;
use crate::buffer::{StageBuffer, Watermarks};
use crate::config::RelayConfig;
use crate::error::{SessionError, SetupError};
use crate::framing::{InboundFrameDecoder, OutboundFrameEncoder};
use crate::transform::BlockTransform;

/// Sizing and timing for one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    pub outbound_chunk_size: usize,
    pub high_watermark: usize,
    pub low_watermark: usize,
    pub max_line_len: usize,
    pub max_chunk_len: usize,
    pub read_timeout: Option<Duration>,
    pub write_timeout: Option<Duration>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            outbound_chunk_size: 4096,
            high_watermark: 1024 * 1024,
            low_watermark: 256 * 1024,
            max_line_len: 256,
            max_chunk_len: 16 * 1024 * 1024,
            read_timeout: None,
            write_timeout: None,
        }
    }
}

impl From<&RelayConfig> for SessionConfig {
    fn from(config: &RelayConfig) -> Self {
        let pipeline = &config.pipeline;
        Self {
            outbound_chunk_size: pipeline.outbound_chunk_size,
            high_watermark: pipeline.high_watermark,
            low_watermark: pipeline.low_watermark,
            max_line_len: pipeline.max_line_len,
            max_chunk_len: pipeline.max_chunk_len,
            read_timeout: Some(config.timeouts.read()),
            write_timeout: Some(config.timeouts.write()),
        }
    }
}

/// Session lifecycle notifications.
///
/// Each method fires at most once per session.
pub trait SessionEvents: Send {
    /// The upstream body has been fully received.
    fn on_request_body_complete(&mut self, _summary: &SessionSummary) {}

    /// The terminal chunk has been written downstream.
    fn on_proxy_complete(&mut self, _summary: &SessionSummary) {}

    /// The session failed. No other event follows.
    ///
    /// `summary` counts what was relayed before the failure.
    fn on_error(&mut self, _error: &SessionError, _summary: &SessionSummary) {}
}

/// A session that ran to completion.
#[derive(Debug)]
pub struct Completed<W> {
    pub summary: SessionSummary,
    /// The downstream stream, positioned after the terminal chunk.
    pub downstream: W,
}

pub struct Session<R, W> {
    core: SessionCore,
    upstream: R,
    downstream: W,
    read_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
}

impl<R, W> Session<R, W>
where
    R: AsyncBufRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    /// Build a session.
    ///
    /// `head` is written immediately before the first downstream frame.
    pub fn new(
        config: &SessionConfig,
        transform: Option<BlockTransform>,
        head: Option<Bytes>,
        upstream: R,
        downstream: W,
    ) -> Result<Self, SetupError> {
        if config.max_line_len == 0 {
            return Err(SetupError::InvalidLimit { name: "max_line_len" });
        }
        if config.max_chunk_len == 0 {
            return Err(SetupError::InvalidLimit { name: "max_chunk_len" });
        }
        let watermarks = Watermarks::new(
            config.high_watermark,
            config.low_watermark,
            config.outbound_chunk_size,
        )?;

        let core = SessionCore::new(
            InboundFrameDecoder::new(config.max_line_len, config.max_chunk_len),
            StageBuffer::new(transform, watermarks),
            OutboundFrameEncoder::new(config.outbound_chunk_size, head),
        );
        Ok(Self {
            core,
            upstream,
            downstream,
            read_timeout: config.read_timeout,
            write_timeout: config.write_timeout,
        })
    }

    /// Relay the whole body.
    ///
    /// On success the downstream stream is handed back so the caller can read
    /// the peer's response. The upstream stream is consumed either way.
    pub async fn run<E>(self, events: &mut E) -> Result<Completed<W>, SessionError>
    where
        E: SessionEvents + ?Sized,
    {
        let Session {
            mut core,
            upstream,
            downstream,
            read_timeout,
            write_timeout,
        } = self;

        // A stream is parked here exactly when no operation holds it.
        let mut upstream = Some(upstream);
        let mut downstream = Some(downstream);
        let mut reading: Option<PendingRead<R>> = None;
        let mut writing: Option<PendingWrite<W>> = None;

        let outcome = loop {
            if let Some(reader) = upstream.take() {
                match core.next_read() {
                    Some(request) => reading = Some(read_frame(reader, request, read_timeout)),
                    None => upstream = Some(reader),
                }
            }
            if let Some(writer) = downstream.take() {
                match core.next_write() {
                    Some(frame) => writing = Some(write_frame(writer, frame, write_timeout)),
                    None => downstream = Some(writer),
                }
            }

            if reading.is_none() && writing.is_none() {
                let pending = core.pending();
                break Err(core.fail(SessionError::Stalled { pending }));
            }

            tokio::select! {
                (reader, result) = in_flight(&mut reading) => {
                    reading = None;
                    upstream = Some(reader);
                    match core.on_read(result) {
                        Ok(Progress::BodyComplete) => events.on_request_body_complete(&core.summary()),
                        Ok(_) => {}
                        Err(err) => break Err(err),
                    }
                }
                (writer, result) = in_flight(&mut writing) => {
                    writing = None;
                    match core.on_write(result) {
                        Ok(Progress::ProxyComplete) => {
                            events.on_proxy_complete(&core.summary());
                            break Ok(writer);
                        }
                        Ok(_) => downstream = Some(writer),
                        Err(err) => break Err(err),
                    }
                }
            }
        };

        match outcome {
            Ok(downstream) => Ok(Completed {
                summary: core.summary(),
                downstream,
            }),
            Err(err) => {
                events.on_error(&err, &core.summary());
                Err(err)
            }
        }
    }
}

/// Await the operation in `slot`, or never resolve if the slot is empty.
async fn in_flight<F>(slot: &mut Option<F>) -> F::Output
where
    F: Future + Unpin,
{
    match slot.as_mut() {
        Some(operation) => operation.await,
        None => future::pending().await,
    }
}
