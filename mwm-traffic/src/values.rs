//! # Traffic values codec
//!
//! Packs the speed groups that parallel the key list of an mwm.
//!
//! ```text
//! u8      format version
//! varint  value count
//! bits    3 bits per speed group, low bit first
//! ```
//!
//! The whole buffer is then zlib-compressed at the best compression level,
//! which collapses the long runs of identical groups typical for real traffic.

use crate::keys::MAX_TRAFFIC_KEYS;
use crate::{SPEED_GROUP_BITS, SpeedGroup};
use bit_twiddling_helpers::{BitReader, BitStreamError, BitWriter};
use flate2::write::ZlibEncoder;
use flate2::{Compression, Decompress, DecompressError, FlushDecompress, Status};
use integer_encoding::{VarInt, VarIntReader};
use std::io::Write;
use thiserror::Error;

/// The only value format version this crate reads or writes.
pub const TRAFFIC_VALUES_VERSION: u8 = 0;

#[derive(Debug, Error)]
pub enum ValuesCodecError {
    #[error("Compression failed: {0}")]
    Compression(#[source] std::io::Error),
    #[error("Decompression failed: {0}")]
    Decompression(#[from] DecompressError),
    #[error("The compressed stream ends prematurely")]
    TruncatedCompressedStream,
    #[error("{count} byte(s) follow the end of the compressed stream")]
    TrailingCompressedBytes { count: usize },
    #[error("The values inflate to more than {limit} bytes")]
    DecompressedTooLarge { limit: usize },
    #[error("The decompressed traffic values buffer is empty")]
    Empty,
    #[error("Unsupported traffic values version {found}; expected {TRAFFIC_VALUES_VERSION}")]
    UnsupportedVersion { found: u8 },
    #[error("Malformed value count: {0}")]
    ValueCount(#[source] std::io::Error),
    #[error("The header claims {count} values, but only {bits} bits of data follow")]
    ImplausibleValueCount { count: u64, bits: usize },
    #[error("The buffer holds {count} values, more than the limit of {limit}")]
    TooManyValues { count: u64, limit: usize },
    #[error("Corrupt value bit stream: {0}")]
    BitStream(#[from] BitStreamError),
    #[error("Invalid speed group code {code}")]
    InvalidSpeedGroup { code: u64 },
}

/// Encodes speed groups, compressing the packed result.
///
/// # Errors
///
/// Only fails if the compressor itself reports an error.
pub fn encode_values(values: &[SpeedGroup]) -> Result<Vec<u8>, ValuesCodecError> {
    let mut buf = vec![TRAFFIC_VALUES_VERSION];
    buf.extend_from_slice(&(values.len() as u64).encode_var_vec());

    let mut writer = BitWriter::new(&mut buf);
    for &value in values {
        writer.write(u64::from(u8::from(value)), SPEED_GROUP_BITS);
    }

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
    encoder
        .write_all(&buf)
        .map_err(ValuesCodecError::Compression)?;
    encoder.finish().map_err(ValuesCodecError::Compression)
}

/// Decodes speed groups produced by [`encode_values`].
///
/// # Errors
///
/// Fails if the compressed stream is corrupt or followed by extra bytes,
/// the version is unsupported, or the packed data is truncated or overlong.
/// Like keys, at most [`MAX_TRAFFIC_KEYS`] values are accepted.
pub fn decode_values(bytes: &[u8]) -> Result<Vec<SpeedGroup>, ValuesCodecError> {
    decode_values_with_limit(bytes, MAX_TRAFFIC_KEYS)
}

/// Decodes at most `max_values` speed groups.
///
/// Inflation stops as soon as the output outgrows what `max_values` values can occupy.
///
/// # Errors
///
/// Fails like [`decode_values`], and if the buffer holds more than `max_values` values.
pub fn decode_values_with_limit(
    bytes: &[u8],
    max_values: usize,
) -> Result<Vec<SpeedGroup>, ValuesCodecError> {
    let buf = inflate(bytes, max_packed_len(max_values))?;

    let (&version, mut rest) = buf.split_first().ok_or(ValuesCodecError::Empty)?;
    if version != TRAFFIC_VALUES_VERSION {
        return Err(ValuesCodecError::UnsupportedVersion { found: version });
    }

    let count: u64 = rest.read_varint().map_err(ValuesCodecError::ValueCount)?;
    if usize::try_from(count).ok().is_none_or(|n| n > max_values) {
        return Err(ValuesCodecError::TooManyValues {
            count,
            limit: max_values,
        });
    }
    let bits = rest.len() * 8;
    let count = usize::try_from(count)
        .ok()
        .filter(|n| n.saturating_mul(SPEED_GROUP_BITS as usize) <= bits)
        .ok_or(ValuesCodecError::ImplausibleValueCount { count, bits })?;

    let mut reader = BitReader::new(rest);
    let mut result = Vec::with_capacity(count);
    for _ in 0..count {
        let code = reader.read(SPEED_GROUP_BITS)?;
        let group = u8::try_from(code)
            .ok()
            .and_then(|code| SpeedGroup::try_from(code).ok())
            .ok_or(ValuesCodecError::InvalidSpeedGroup { code })?;
        result.push(group);
    }

    reader.finish()?;
    Ok(result)
}

/// The largest packed buffer that can hold `max_values` values.
const fn max_packed_len(max_values: usize) -> usize {
    // Version byte and the longest u64 varint, then the packed bits
    let bits = max_values.saturating_mul(SPEED_GROUP_BITS as usize);
    11usize.saturating_add(bits.div_ceil(8))
}

/// Inflates exactly one zlib stream which must span all of `bytes`
/// and inflate to at most `max_len` bytes.
fn inflate(bytes: &[u8], max_len: usize) -> Result<Vec<u8>, ValuesCodecError> {
    let mut decompress = Decompress::new(true);
    let mut buf = Vec::new();

    loop {
        // One byte past the limit is enough to tell that it was exceeded.
        let room = max_len.saturating_add(1).saturating_sub(buf.len());
        buf.reserve_exact(room.min(bytes.len().max(64) * 4));
        let (before_in, before_out) = (decompress.total_in(), decompress.total_out());
        let consumed = usize::try_from(before_in).unwrap_or(bytes.len()).min(bytes.len());

        let status =
            decompress.decompress_vec(&bytes[consumed..], &mut buf, FlushDecompress::None)?;
        if buf.len() > max_len {
            return Err(ValuesCodecError::DecompressedTooLarge { limit: max_len });
        }
        if status == Status::StreamEnd {
            break;
        }
        // With spare output room, a stalled stream has simply run out of input.
        if decompress.total_in() == before_in && decompress.total_out() == before_out {
            return Err(ValuesCodecError::TruncatedCompressedStream);
        }
    }

    let consumed = usize::try_from(decompress.total_in()).unwrap_or(bytes.len());
    if consumed < bytes.len() {
        return Err(ValuesCodecError::TrailingCompressedBytes {
            count: bytes.len() - consumed,
        });
    }

    Ok(buf)
}
