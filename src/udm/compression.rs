//! Compression support for UDM payloads.
//!
//! Whole binary payloads may be zlib-compressed (header flag); individual
//! arrays and blobs may be stored as LZ4 blocks with a size prefix.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use lz4_flex::{compress_prepend_size, decompress_size_prepended};

use crate::util::{Error, Result};

/// Upper bound accepted for a declared uncompressed size.
const MAX_UNCOMPRESSED_SIZE: u64 = 4 * 1024 * 1024 * 1024;

/// Initial output reservation per compressed input byte. The declared size
/// is not trusted for preallocation; the buffer grows as data inflates.
const RESERVE_RATIO: usize = 4;

/// LZ4 cannot expand a block by more than this per input byte.
const LZ4_MAX_RATIO: u64 = 255;

/// Compress data using zlib.
///
/// Format: `[uncompressed_size: u64 LE][zlib stream]`.
pub fn compress(data: &[u8], level: u32) -> Result<Vec<u8>> {
    let level = match level {
        0 => Compression::none(),
        1 => Compression::fast(),
        2..=5 => Compression::default(),
        _ => Compression::best(),
    };

    let mut out = (data.len() as u64).to_le_bytes().to_vec();
    let mut encoder = ZlibEncoder::new(&mut out, level);
    encoder.write_all(data)?;
    encoder.finish()?;
    Ok(out)
}

/// Decompress a zlib payload written by [`compress`].
pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    let (size, stream) = data
        .split_first_chunk::<8>()
        .ok_or_else(|| Error::DecompressionFailure("missing size prefix".into()))?;
    let size = u64::from_le_bytes(*size);
    if size > MAX_UNCOMPRESSED_SIZE {
        return Err(Error::DecompressionFailure(format!("declared size {size} is too large")));
    }

    let reserve = (size as usize).min(stream.len().saturating_mul(RESERVE_RATIO));
    let mut out = Vec::with_capacity(reserve);
    // One byte past the declared size is enough to detect an overrun.
    ZlibDecoder::new(stream)
        .take(size + 1)
        .read_to_end(&mut out)
        .map_err(|e| Error::DecompressionFailure(e.to_string()))?;

    if out.len() as u64 != size {
        return Err(Error::DecompressionFailure(format!(
            "expected {size} bytes, inflated {}",
            out.len()
        )));
    }
    Ok(out)
}

/// Compress an array or blob payload as a size-prefixed LZ4 block.
pub fn lz4_compress(data: &[u8]) -> Vec<u8> {
    compress_prepend_size(data)
}

/// Inflate a size-prefixed LZ4 block.
pub fn lz4_decompress(data: &[u8]) -> Result<Vec<u8>> {
    let (size, block) = data
        .split_first_chunk::<4>()
        .ok_or_else(|| Error::DecompressionFailure("missing size prefix".into()))?;
    let size = u64::from(u32::from_le_bytes(*size));
    let limit = (block.len() as u64 + 1).saturating_mul(LZ4_MAX_RATIO);
    if size > limit {
        return Err(Error::DecompressionFailure(format!(
            "declared size {size} cannot come from a {}-byte block",
            block.len()
        )));
    }
    decompress_size_prepended(data).map_err(|e| Error::DecompressionFailure(e.to_string()))
}
