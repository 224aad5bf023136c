//! Stage buffer between the inbound decoder and the outbound encoder.
//!
//! # Responsibilities
//! - Run received payload through the optional block transform
//! - Queue transformed bytes in FIFO order
//! - Hand out fixed-size reads, or everything on a final drain
//! - Report occupancy against the backpressure watermarks
//!
//! # Design Decisions
//! - `read_next` never returns a short read; outbound chunk sizes stay fixed until end of stream
//! - `read_all` is the only way to get a short tail, and it finalizes the transform
//! - Owned by exactly one session; `&mut self` on every mutation serializes producer and consumer

use bytes::{Bytes, BytesMut};

use crate::error::SetupError;
use crate::transform::BlockTransform;

/// Occupancy thresholds for inbound backpressure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Watermarks {
    /// Stop reading upstream once pending bytes reach this level.
    pub high: usize,
    /// Resume reading upstream once pending bytes drop to this level.
    pub low: usize,
}

impl Watermarks {
    /// Validate against the outbound chunk size.
    ///
    /// `low` must be at least one chunk, otherwise a paused reader could wait
    /// on an encoder that has less than a chunk to send.
    pub fn new(high: usize, low: usize, chunk_size: usize) -> Result<Self, SetupError> {
        if chunk_size == 0 {
            return Err(SetupError::InvalidChunkSize);
        }
        if low < chunk_size || low >= high {
            return Err(SetupError::InvalidWatermarks {
                chunk_size,
                low,
                high,
            });
        }
        Ok(Self { high, low })
    }
}

/// Ordered byte queue with a transform hook on the way in.
#[derive(Debug)]
pub struct StageBuffer {
    pending: BytesMut,
    transform: Option<BlockTransform>,
    watermarks: Watermarks,
    received: u64,
    drained: u64,
}

impl StageBuffer {
    pub fn new(transform: Option<BlockTransform>, watermarks: Watermarks) -> Self {
        Self {
            pending: BytesMut::new(),
            transform,
            watermarks,
            received: 0,
            drained: 0,
        }
    }

    /// Accept decoded payload, transforming it if a transform is attached.
    pub fn receive(&mut self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        self.received += data.len() as u64;
        match self.transform.as_mut() {
            Some(transform) => {
                let out = transform.process(data);
                self.pending.extend_from_slice(&out);
            }
            None => self.pending.extend_from_slice(data),
        }
    }

    /// Remove exactly `max_size` bytes from the head, or nothing if fewer are pending.
    pub fn read_next(&mut self, max_size: usize) -> Option<Bytes> {
        if max_size == 0 || self.pending.len() < max_size {
            return None;
        }
        self.drained += max_size as u64;
        Some(self.pending.split_to(max_size).freeze())
    }

    /// Finalize the transform and drain everything that is pending.
    ///
    /// Only valid once the producer side has finished.
    pub fn read_all(&mut self) -> Bytes {
        if let Some(transform) = self.transform.as_mut() {
            let tail = transform.finalize();
            self.pending.extend_from_slice(&tail);
        }
        self.drained += self.pending.len() as u64;
        self.pending.split().freeze()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn above_high_watermark(&self) -> bool {
        self.pending.len() >= self.watermarks.high
    }

    pub fn below_low_watermark(&self) -> bool {
        self.pending.len() <= self.watermarks.low
    }

    /// Payload bytes accepted through `receive`, before transformation.
    pub fn received_bytes(&self) -> u64 {
        self.received
    }

    /// Bytes handed out through `read_next` and `read_all`.
    pub fn drained_bytes(&self) -> u64 {
        self.drained
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::{AsciiCase, Identity};

    fn marks() -> Watermarks {
        Watermarks::new(64, 16, 4).unwrap()
    }

    #[test]
    fn watermarks_are_validated() {
        assert_eq!(Watermarks::new(10, 4, 0), Err(SetupError::InvalidChunkSize));
        assert!(matches!(Watermarks::new(10, 3, 4), Err(SetupError::InvalidWatermarks { .. })));
        assert!(matches!(Watermarks::new(10, 10, 4), Err(SetupError::InvalidWatermarks { .. })));
        assert_eq!(Watermarks::new(10, 4, 4), Ok(Watermarks { high: 10, low: 4 }));
    }

    #[test]
    fn read_next_never_returns_short_reads() {
        let mut buf = StageBuffer::new(None, marks());
        buf.receive(b"abc");
        assert_eq!(buf.read_next(4), None);
        assert_eq!(buf.len(), 3);

        buf.receive(b"defgh");
        assert_eq!(buf.read_next(4).as_deref(), Some(&b"abcd"[..]));
        assert_eq!(buf.read_next(4).as_deref(), Some(&b"efgh"[..]));
        assert_eq!(buf.read_next(4), None);
        assert!(buf.is_empty());
    }

    #[test]
    fn receive_ignores_empty_input() {
        let mut buf = StageBuffer::new(None, marks());
        buf.receive(b"");
        assert!(buf.is_empty());
        assert_eq!(buf.received_bytes(), 0);
    }

    #[test]
    fn read_all_flushes_transform_remainder() {
        let transform = BlockTransform::new(Box::new(AsciiCase::upper(4))).unwrap();
        let mut buf = StageBuffer::new(Some(transform), marks());
        buf.receive(b"abcdef");
        assert_eq!(buf.len(), 4);
        assert_eq!(buf.read_next(5), None);
        assert_eq!(&buf.read_all()[..], b"ABCDEF");
        assert!(buf.is_empty());
        assert!(buf.read_all().is_empty());
        assert_eq!(buf.received_bytes(), 6);
        assert_eq!(buf.drained_bytes(), 6);
    }

    #[test]
    fn fifo_order_across_receives() {
        let transform = BlockTransform::new(Box::new(Identity::new(3))).unwrap();
        let mut buf = StageBuffer::new(Some(transform), marks());
        for piece in [&b"ab"[..], b"cde", b"f", b"ghij"] {
            buf.receive(piece);
        }
        let mut out = Vec::new();
        while let Some(block) = buf.read_next(4) {
            out.extend_from_slice(&block);
        }
        out.extend_from_slice(&buf.read_all());
        assert_eq!(out, b"abcdefghij");
    }

    #[test]
    fn watermark_checks_follow_occupancy() {
        let mut buf = StageBuffer::new(None, Watermarks::new(8, 4, 2).unwrap());
        buf.receive(&[0; 8]);
        assert!(buf.above_high_watermark());
        assert!(!buf.below_low_watermark());
        buf.read_next(2);
        buf.read_next(2);
        assert!(!buf.above_high_watermark());
        assert!(buf.below_low_watermark());
    }
}
