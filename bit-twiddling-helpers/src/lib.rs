//! # Bit twiddling helpers
//!
//! Bit-level writers and readers for densely packed payloads.
//! Bits are packed least-significant first: the first bit written lands in bit 0
//! of the first byte, and multi-bit values are emitted starting from their low bit.
//! The final byte is padded with zeros.
//!
//! The [`gamma`] module layers the Elias gamma universal code on top,
//! which is a good fit for small positive integers of unknown magnitude.

use thiserror::Error;

pub mod gamma;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BitStreamError {
    #[error("Unexpected end of bit stream: wanted {wanted} bits, but only {available} remain")]
    UnexpectedEnd { wanted: u32, available: usize },
    #[error("The bit stream has {count} trailing byte(s) after the last value")]
    TrailingBytes { count: usize },
    #[error("The padding bits of the final byte are not zero")]
    NonZeroPadding,
    #[error("Gamma code prefix is longer than 63 bits; the stream is corrupt")]
    GammaOverflow,
}

/// Appends bits to the end of a byte buffer.
///
/// The writer borrows the buffer, so a byte-aligned header can be written first
/// and the bit stream appended directly after it.
pub struct BitWriter<'a> {
    buf: &'a mut Vec<u8>,
    /// Bits already used in the last byte of `buf` (0 means a fresh byte is needed).
    used: u32,
}

impl<'a> BitWriter<'a> {
    pub fn new(buf: &'a mut Vec<u8>) -> Self {
        Self { buf, used: 0 }
    }

    /// Writes the low `count` bits of `value`, low bit first.
    ///
    /// # Panics
    ///
    /// Panics if `count` is greater than 64.
    pub fn write(&mut self, value: u64, count: u32) {
        assert!(count <= 64, "Cannot write {count} bits from a u64");
        let mut value = if count < 64 {
            value & ((1u64 << count) - 1)
        } else {
            value
        };
        let mut count = count;

        while count > 0 {
            if self.used == 0 {
                self.buf.push(0);
            }

            let take = (8 - self.used).min(count);
            #[allow(
                clippy::cast_possible_truncation,
                reason = "take is at most 8, so the mask fits in a byte"
            )]
            let chunk = (value & ((1u64 << take) - 1)) as u8;
            if let Some(last) = self.buf.last_mut() {
                *last |= chunk << self.used;
            }

            self.used = (self.used + take) % 8;
            value >>= take;
            count -= take;
        }
    }

    #[inline]
    pub fn write_bit(&mut self, bit: bool) {
        self.write(u64::from(bit), 1);
    }
}

/// Reads bits from a byte slice in the order [`BitWriter`] produced them.
pub struct BitReader<'a> {
    bytes: &'a [u8],
    /// Position in bits from the start of `bytes`.
    pos: usize,
}

impl<'a> BitReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    /// The number of bits left in the underlying slice, padding included.
    #[inline]
    pub fn remaining_bits(&self) -> usize {
        self.bytes.len() * 8 - self.pos
    }

    /// Reads `count` bits, returning them in the low bits of the result.
    ///
    /// # Errors
    ///
    /// Fails with [`BitStreamError::UnexpectedEnd`] if fewer than `count` bits remain.
    ///
    /// # Panics
    ///
    /// Panics if `count` is greater than 64.
    pub fn read(&mut self, count: u32) -> Result<u64, BitStreamError> {
        assert!(count <= 64, "Cannot read {count} bits into a u64");
        let available = self.remaining_bits();
        if available < count as usize {
            return Err(BitStreamError::UnexpectedEnd {
                wanted: count,
                available,
            });
        }

        let mut result = 0u64;
        let mut filled = 0;
        while filled < count {
            let byte = u64::from(self.bytes[self.pos / 8]);
            #[allow(
                clippy::cast_possible_truncation,
                reason = "a bit offset within a byte is always < 8"
            )]
            let offset = (self.pos % 8) as u32;
            let take = (8 - offset).min(count - filled);

            result |= ((byte >> offset) & ((1u64 << take) - 1)) << filled;
            filled += take;
            self.pos += take as usize;
        }

        Ok(result)
    }

    /// Reads a single bit.
    ///
    /// # Errors
    ///
    /// Fails if the stream is exhausted.
    #[inline]
    pub fn read_bit(&mut self) -> Result<bool, BitStreamError> {
        Ok(self.read(1)? == 1)
    }

    /// Checks that the stream was consumed exactly.
    ///
    /// # Errors
    ///
    /// Fails if any whole byte is left unread,
    /// or if the padding in the final partial byte is non-zero.
    pub fn finish(self) -> Result<(), BitStreamError> {
        let consumed = self.pos.div_ceil(8);
        if consumed != self.bytes.len() {
            return Err(BitStreamError::TrailingBytes {
                count: self.bytes.len() - consumed,
            });
        }

        let offset = self.pos % 8;
        if offset != 0 && self.bytes[consumed - 1] >> offset != 0 {
            return Err(BitStreamError::NonZeroPadding);
        }

        Ok(())
    }
}
