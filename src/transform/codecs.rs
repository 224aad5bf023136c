//! Built-in block codecs.

use aes::{Aes128, Block};
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockEncryptMut, KeyIvInit};
use bytes::{BufMut, BytesMut};

use super::BlockCodec;
use crate::error::SetupError;

/// Passes blocks through unchanged.
#[derive(Debug, Clone)]
pub struct Identity {
    block_size: usize,
}

impl Identity {
    pub fn new(block_size: usize) -> Self {
        Self { block_size }
    }
}

impl BlockCodec for Identity {
    fn block_size(&self) -> usize {
        self.block_size
    }

    fn transform_block(&mut self, block: &[u8], out: &mut BytesMut) {
        out.extend_from_slice(block);
    }
}

/// ASCII case mapping. Upper-casing stands in for "encrypt", lower-casing for "decrypt".
#[derive(Debug, Clone)]
pub struct AsciiCase {
    block_size: usize,
    upper: bool,
}

impl AsciiCase {
    pub fn upper(block_size: usize) -> Self {
        Self {
            block_size,
            upper: true,
        }
    }

    pub fn lower(block_size: usize) -> Self {
        Self {
            block_size,
            upper: false,
        }
    }
}

impl BlockCodec for AsciiCase {
    fn block_size(&self) -> usize {
        self.block_size
    }

    fn transform_block(&mut self, block: &[u8], out: &mut BytesMut) {
        let start = out.len();
        out.extend_from_slice(block);
        let mapped = &mut out[start..];
        if self.upper {
            mapped.make_ascii_uppercase();
        } else {
            mapped.make_ascii_lowercase();
        }
    }
}

/// Repeating-key XOR keyed on the absolute stream offset.
#[derive(Debug, Clone)]
pub struct Xor {
    block_size: usize,
    key: Vec<u8>,
    offset: usize,
}

impl Xor {
    pub fn new(block_size: usize, key: Vec<u8>) -> Result<Self, SetupError> {
        if key.is_empty() {
            return Err(SetupError::InvalidKey("xor key is empty".into()));
        }
        Ok(Self {
            block_size,
            key,
            offset: 0,
        })
    }
}

impl BlockCodec for Xor {
    fn block_size(&self) -> usize {
        self.block_size
    }

    fn transform_block(&mut self, block: &[u8], out: &mut BytesMut) {
        out.reserve(block.len());
        for &byte in block {
            out.put_u8(byte ^ self.key[self.offset]);
            self.offset = (self.offset + 1) % self.key.len();
        }
    }

    fn reset(&mut self) {
        self.offset = 0;
    }
}

/// AES-128 in CBC mode with PKCS#7 padding applied on the final block.
///
/// The transform block size must be a multiple of 16; each transform block
/// is encrypted as a run of chained AES blocks.
pub struct Aes128CbcEncrypt {
    block_size: usize,
    key: [u8; AES_BLOCK],
    iv: [u8; AES_BLOCK],
    encryptor: Aes128CbcEnc,
}

type Aes128CbcEnc = cbc::Encryptor<Aes128>;

const AES_BLOCK: usize = 16;

impl Aes128CbcEncrypt {
    pub fn new(block_size: usize, key: &[u8], iv: &[u8]) -> Result<Self, SetupError> {
        if block_size == 0 || block_size % AES_BLOCK != 0 {
            return Err(SetupError::MisalignedBlockSize {
                block_size,
                cipher_block: AES_BLOCK,
            });
        }
        let key: [u8; AES_BLOCK] = key.try_into().map_err(|_| {
            SetupError::InvalidKey(format!("aes key must be 16 bytes, got {}", key.len()))
        })?;
        let iv: [u8; AES_BLOCK] = iv.try_into().map_err(|_| {
            SetupError::InvalidKey(format!("aes iv must be 16 bytes, got {}", iv.len()))
        })?;
        Ok(Self {
            block_size,
            key,
            iv,
            encryptor: Aes128CbcEnc::new(&key.into(), &iv.into()),
        })
    }

    fn fresh_encryptor(&self) -> Aes128CbcEnc {
        Aes128CbcEnc::new(&self.key.into(), &self.iv.into())
    }
}

impl BlockCodec for Aes128CbcEncrypt {
    fn block_size(&self) -> usize {
        self.block_size
    }

    fn transform_block(&mut self, block: &[u8], out: &mut BytesMut) {
        for plain in block.chunks_exact(AES_BLOCK) {
            let mut cipher_block = Block::clone_from_slice(plain);
            self.encryptor.encrypt_block_mut(&mut cipher_block);
            out.extend_from_slice(&cipher_block);
        }
    }

    fn finish_block(&mut self, tail: &[u8], out: &mut BytesMut) {
        // Padding consumes the chain; `reset` follows every finish anyway.
        let fresh = self.fresh_encryptor();
        let encryptor = std::mem::replace(&mut self.encryptor, fresh);
        out.extend_from_slice(&encryptor.encrypt_padded_vec_mut::<Pkcs7>(tail));
    }

    fn reset(&mut self) {
        self.encryptor = self.fresh_encryptor();
    }
}

impl std::fmt::Debug for Aes128CbcEncrypt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Aes128CbcEncrypt")
            .field("block_size", &self.block_size)
            .finish_non_exhaustive()
    }
}
