//! Table block compression
//!
//! Every compressed block starts with a 4-byte little-endian wrapper header
//! holding `(decompressed_len << 3) | method`. The payload that follows is
//! method specific. Decoders honor the declared length and ignore trailing
//! alignment padding.

use flate2::Compression;
use flate2::read::{ZlibDecoder, ZlibEncoder};
use std::fmt;
use std::io::Read;
use thiserror::Error;

/// Size of the wrapper header in bytes
pub const WRAPPER_HEADER_SIZE: usize = 4;

/// Largest length the wrapper header can describe
pub const MAX_DECOMPRESSION_SIZE: usize = (u32::MAX >> 3) as usize;

/// Compression error type
#[derive(Debug, Error)]
pub enum CompressionError {
    /// Method tag not implemented by this crate
    #[error("unsupported compression method: {0}")]
    UnsupportedMethod(u8),

    /// Block decoded by the wrong strategy
    #[error("compression method mismatch: expected {expected:?}, got {actual:?}")]
    MethodMismatch {
        /// Method of the decoding strategy
        expected: CompressionMethod,
        /// Method recorded in the block
        actual: CompressionMethod,
    },

    /// Block shorter than its header or declared payload
    #[error("compressed block truncated: need {expected} bytes, have {actual}")]
    Truncated {
        /// Bytes required
        expected: usize,
        /// Bytes present
        actual: usize,
    },

    /// Decoded length disagrees with the header
    #[error("decompressed size mismatch: header says {expected}, got {actual}")]
    SizeMismatch {
        /// Length from the wrapper header
        expected: usize,
        /// Length actually produced
        actual: usize,
    },

    /// Input too large for the wrapper header
    #[error("block of {0} bytes exceeds the wrapper limit of {max} bytes", max = MAX_DECOMPRESSION_SIZE)]
    TooLarge(usize),

    /// Zlib stream error
    #[error("zlib error: {0}")]
    Zlib(String),
}

/// Result type for compression operations
pub type CompressionResult<T> = Result<T, CompressionError>;

/// Method tag stored in the low three bits of the wrapper header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompressionMethod {
    /// Stored as-is
    None,
    /// zlib (RFC 1950) stream
    Zlib,
}

impl CompressionMethod {
    /// Tag value for this method
    pub const fn tag(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Zlib => 5,
        }
    }

    /// Method for a tag value
    pub fn from_tag(tag: u8) -> CompressionResult<Self> {
        match tag {
            0 => Ok(Self::None),
            5 => Ok(Self::Zlib),
            other => Err(CompressionError::UnsupportedMethod(other)),
        }
    }
}

/// Encode the wrapper header for `len` decompressed bytes
pub fn wrapper_header(
    method: CompressionMethod,
    len: usize,
) -> CompressionResult<[u8; WRAPPER_HEADER_SIZE]> {
    if len > MAX_DECOMPRESSION_SIZE {
        return Err(CompressionError::TooLarge(len));
    }
    let value = ((len as u32) << 3) | u32::from(method.tag());
    Ok(value.to_le_bytes())
}

/// Decode the wrapper header at the start of `data`
pub fn read_wrapper_header(data: &[u8]) -> CompressionResult<(CompressionMethod, usize)> {
    let header: [u8; WRAPPER_HEADER_SIZE] = data
        .get(..WRAPPER_HEADER_SIZE)
        .and_then(|bytes| bytes.try_into().ok())
        .ok_or(CompressionError::Truncated {
            expected: WRAPPER_HEADER_SIZE,
            actual: data.len(),
        })?;
    let value = u32::from_le_bytes(header);
    let method = CompressionMethod::from_tag((value & 0x7) as u8)?;
    Ok((method, (value >> 3) as usize))
}

/// Pluggable block compression used by the ARC0 writer
pub trait Compressor: Send + Sync + fmt::Debug {
    /// Method tag written into the wrapper header
    fn method(&self) -> CompressionMethod;

    /// Compress `data` into a wrapped block
    fn compress(&self, data: &[u8]) -> CompressionResult<Vec<u8>>;

    /// Decompress a wrapped block produced by this strategy
    fn decompress(&self, data: &[u8]) -> CompressionResult<Vec<u8>>;
}

/// Pass-through strategy; the default for written archives
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCompression;

impl Compressor for NoCompression {
    fn method(&self) -> CompressionMethod {
        CompressionMethod::None
    }

    fn compress(&self, data: &[u8]) -> CompressionResult<Vec<u8>> {
        let mut block = Vec::with_capacity(WRAPPER_HEADER_SIZE + data.len());
        block.extend_from_slice(&wrapper_header(CompressionMethod::None, data.len())?);
        block.extend_from_slice(data);
        Ok(block)
    }

    fn decompress(&self, data: &[u8]) -> CompressionResult<Vec<u8>> {
        let len = expect_method(data, CompressionMethod::None)?;
        let body = &data[WRAPPER_HEADER_SIZE..];
        body.get(..len)
            .map(<[u8]>::to_vec)
            .ok_or(CompressionError::Truncated {
                expected: WRAPPER_HEADER_SIZE + len,
                actual: data.len(),
            })
    }
}

/// zlib strategy backed by `flate2`
#[derive(Debug, Clone, Copy)]
pub struct ZlibCompression {
    level: u32,
}

impl ZlibCompression {
    /// Create a strategy with an explicit level (0-9)
    pub fn new(level: u32) -> Self {
        Self {
            level: level.min(9),
        }
    }
}

impl Default for ZlibCompression {
    fn default() -> Self {
        Self::new(Compression::default().level())
    }
}

impl Compressor for ZlibCompression {
    fn method(&self) -> CompressionMethod {
        CompressionMethod::Zlib
    }

    fn compress(&self, data: &[u8]) -> CompressionResult<Vec<u8>> {
        let mut block = wrapper_header(CompressionMethod::Zlib, data.len())?.to_vec();
        let mut encoder = ZlibEncoder::new(data, Compression::new(self.level));
        encoder
            .read_to_end(&mut block)
            .map_err(|e| CompressionError::Zlib(format!("compression failed: {e}")))?;
        Ok(block)
    }

    fn decompress(&self, data: &[u8]) -> CompressionResult<Vec<u8>> {
        let len = expect_method(data, CompressionMethod::Zlib)?;
        let compressed = &data[WRAPPER_HEADER_SIZE..];
        let decoder = ZlibDecoder::new(compressed);

        // one extra byte to detect streams longer than declared
        let mut decompressed = Vec::with_capacity(initial_capacity(len, compressed.len()));
        decoder
            .take(len as u64 + 1)
            .read_to_end(&mut decompressed)
            .map_err(|e| CompressionError::Zlib(format!("decompression failed: {e}")))?;

        if decompressed.len() != len {
            return Err(CompressionError::SizeMismatch {
                expected: len,
                actual: decompressed.len(),
            });
        }
        Ok(decompressed)
    }
}

/// Decompress a wrapped block with whichever strategy its tag names
pub fn decompress_auto(data: &[u8]) -> CompressionResult<Vec<u8>> {
    let (method, _) = read_wrapper_header(data)?;
    match method {
        CompressionMethod::None => NoCompression.decompress(data),
        CompressionMethod::Zlib => ZlibCompression::default().decompress(data),
    }
}

/// Up-front allocation for a declared size, bounded by the input length
fn initial_capacity(declared: usize, compressed_len: usize) -> usize {
    declared.min(compressed_len.saturating_mul(8))
}

fn expect_method(data: &[u8], expected: CompressionMethod) -> CompressionResult<usize> {
    let (actual, len) = read_wrapper_header(data)?;
    if actual != expected {
        return Err(CompressionError::MethodMismatch { expected, actual });
    }
    Ok(len)
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn stored_block_layout() {
        let block = NoCompression.compress(b"hello").unwrap();
        assert_eq!(block, vec![40, 0, 0, 0, b'h', b'e', b'l', b'l', b'o']);
        assert_eq!(NoCompression.decompress(&block).unwrap(), b"hello");
    }

    #[test]
    fn stored_block_ignores_padding() {
        let mut block = NoCompression.compress(b"abc").unwrap();
        block.extend_from_slice(&[0, 0, 0]);
        assert_eq!(decompress_auto(&block).unwrap(), b"abc");
    }

    #[test]
    fn zlib_round_trip() {
        let data: Vec<u8> = (0..4096u32).map(|i| (i % 7) as u8).collect();
        let block = ZlibCompression::default().compress(&data).unwrap();
        assert_eq!(block[0] & 0x7, 5);
        assert!(block.len() < data.len());
        assert_eq!(ZlibCompression::default().decompress(&block).unwrap(), data);
        assert_eq!(decompress_auto(&block).unwrap(), data);
    }

    #[test]
    fn zlib_rejects_wrong_declared_size() {
        let mut block = ZlibCompression::new(6).compress(b"0123456789").unwrap();
        block[..4].copy_from_slice(&wrapper_header(CompressionMethod::Zlib, 4).unwrap());
        assert!(matches!(
            ZlibCompression::default().decompress(&block),
            Err(CompressionError::SizeMismatch { expected: 4, .. })
        ));
    }

    #[test]
    fn declared_size_does_not_drive_allocation() {
        assert_eq!(initial_capacity(512 << 20, 0), 0);
        assert_eq!(initial_capacity(512 << 20, 10), 80);
        assert_eq!(initial_capacity(40, 10), 40);

        // a tiny stream claiming a huge size fails on the size check
        let mut block = ZlibCompression::default().compress(b"tiny").unwrap();
        block[..4].copy_from_slice(&wrapper_header(CompressionMethod::Zlib, 256 << 20).unwrap());
        assert!(matches!(
            ZlibCompression::default().decompress(&block),
            Err(CompressionError::SizeMismatch { actual: 4, .. })
        ));
    }

    #[test]
    fn unknown_tag_is_unsupported() {
        let block = [0x0B, 0, 0, 0, 0xAA];
        assert!(matches!(
            decompress_auto(&block),
            Err(CompressionError::UnsupportedMethod(3))
        ));
    }

    #[test]
    fn truncated_blocks_are_rejected() {
        assert!(matches!(
            decompress_auto(&[1, 2]),
            Err(CompressionError::Truncated { expected: 4, actual: 2 })
        ));
        let header = wrapper_header(CompressionMethod::None, 8).unwrap();
        assert!(matches!(
            NoCompression.decompress(&header),
            Err(CompressionError::Truncated { expected: 12, actual: 4 })
        ));
    }

    #[test]
    fn strategy_checks_method() {
        let block = NoCompression.compress(b"x").unwrap();
        assert!(matches!(
            ZlibCompression::default().decompress(&block),
            Err(CompressionError::MethodMismatch { .. })
        ));
    }
}
