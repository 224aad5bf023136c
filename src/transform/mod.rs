//! Block-aligned payload transform.
//!
//! # Data Flow
//! ```text
//! arbitrary byte spans
//!     → BlockTransform::process (remainder + input, split into whole blocks)
//!     → BlockCodec::transform_block (one block at a time, in order)
//!     → concatenated output (always a whole number of blocks)
//!
//! end of stream:
//!     → BlockTransform::finalize
//!     → BlockCodec::finish_block (short tail, padding is the codec's business)
//! ```
//!
//! # Design Decisions
//! - Only whole blocks are handed to the codec before finalize, so output is
//!   independent of how the input was split across calls
//! - Lengths are raw byte counts; payloads are never treated as text
//! - A transform instance belongs to exactly one stage buffer

pub mod codecs;

use bytes::{Bytes, BytesMut};

use crate::error::SetupError;

pub use codecs::{Aes128CbcEncrypt, AsciiCase, Identity, Xor};

/// Maps one fixed-size block to one fixed-size block.
///
/// Implementations may keep state across blocks (cipher chaining, stream
/// offsets); `reset` returns them to their initial state.
pub trait BlockCodec: Send {
    /// Size of a block in bytes. Must be greater than zero.
    fn block_size(&self) -> usize;

    /// Transform one full block, appending the result to `out`.
    fn transform_block(&mut self, block: &[u8], out: &mut BytesMut);

    /// Transform the final, possibly short, block.
    ///
    /// The default passes a non-empty tail through `transform_block` as-is and
    /// emits nothing for an empty tail.
    fn finish_block(&mut self, tail: &[u8], out: &mut BytesMut) {
        if !tail.is_empty() {
            self.transform_block(tail, out);
        }
    }

    /// Return to the initial state after a finalize.
    fn reset(&mut self) {}
}

/// Buffers input until whole blocks are available and runs them through a codec.
pub struct BlockTransform {
    codec: Box<dyn BlockCodec>,
    block_size: usize,
    /// Always shorter than `block_size` between calls.
    remainder: BytesMut,
    finalized: bool,
}

impl BlockTransform {
    /// Wrap a codec. Fails if the codec reports a zero block size.
    pub fn new(codec: Box<dyn BlockCodec>) -> Result<Self, SetupError> {
        let block_size = codec.block_size();
        if block_size == 0 {
            return Err(SetupError::InvalidBlockSize);
        }
        Ok(Self {
            codec,
            block_size,
            remainder: BytesMut::with_capacity(block_size),
            finalized: false,
        })
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Bytes held back waiting for a full block.
    pub fn remainder_len(&self) -> usize {
        self.remainder.len()
    }

    /// Transform every whole block available after appending `data`.
    ///
    /// Returns an empty buffer when fewer than `block_size` bytes have
    /// accumulated. Empty input leaves the remainder untouched.
    pub fn process(&mut self, data: &[u8]) -> Bytes {
        if data.is_empty() {
            return Bytes::new();
        }
        self.finalized = false;

        let available = self.remainder.len() + data.len();
        let mut out = BytesMut::with_capacity(available - available % self.block_size);
        let mut input = data;

        if !self.remainder.is_empty() {
            let take = (self.block_size - self.remainder.len()).min(input.len());
            self.remainder.extend_from_slice(&input[..take]);
            input = &input[take..];
            if self.remainder.len() < self.block_size {
                return out.freeze();
            }
            self.codec.transform_block(&self.remainder, &mut out);
            self.remainder.clear();
        }

        let mut blocks = input.chunks_exact(self.block_size);
        for block in &mut blocks {
            self.codec.transform_block(block, &mut out);
        }
        self.remainder.extend_from_slice(blocks.remainder());

        out.freeze()
    }

    /// Flush the remainder through the codec and reset.
    ///
    /// A second call without an intervening `process` returns nothing.
    pub fn finalize(&mut self) -> Bytes {
        if self.finalized {
            return Bytes::new();
        }
        let mut out = BytesMut::with_capacity(self.block_size);
        self.codec.finish_block(&self.remainder, &mut out);
        self.codec.reset();
        self.remainder.clear();
        self.finalized = true;
        out.freeze()
    }
}

impl std::fmt::Debug for BlockTransform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockTransform")
            .field("block_size", &self.block_size)
            .field("remainder", &self.remainder.len())
            .field("finalized", &self.finalized)
            .finish()
    }
}
