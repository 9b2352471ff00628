//! Elias gamma coding.
//!
//! A positive integer `v` with `n = floor(log2(v))` is written as `n` zero bits,
//! a one bit, and then the low `n` bits of `v`.
//! The code is self-delimiting, so no length field is needed,
//! but zero is not representable (callers usually bias their values by one).

use crate::{BitReader, BitStreamError, BitWriter};
use std::num::NonZeroU64;

/// Writes `value` using the Elias gamma code.
pub fn write_gamma(writer: &mut BitWriter<'_>, value: NonZeroU64) {
    let value = value.get();
    let n = value.ilog2();
    // n zeros followed by a one, then the bits below the leading one.
    writer.write(1u64 << n, n + 1);
    writer.write(value, n);
}

/// Reads one Elias gamma coded value (always at least 1).
///
/// # Errors
///
/// Fails if the stream ends mid-code or the zero prefix is too long for a `u64`.
pub fn read_gamma(reader: &mut BitReader<'_>) -> Result<u64, BitStreamError> {
    let mut n = 0;
    while !reader.read_bit()? {
        n += 1;
        if n > 63 {
            return Err(BitStreamError::GammaOverflow);
        }
    }

    Ok((1u64 << n) | reader.read(n)?)
}

/// The number of bits [`write_gamma`] uses for `value`.
#[inline]
pub const fn gamma_len(value: NonZeroU64) -> u32 {
    2 * value.ilog2() + 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn nz(value: u64) -> NonZeroU64 {
        NonZeroU64::new(value).unwrap()
    }

    #[test]
    fn small_codes() {
        let mut buf = Vec::new();
        let mut writer = BitWriter::new(&mut buf);
        // 1 -> "1", 2 -> "010", 6 -> "00110" (in stream order)
        write_gamma(&mut writer, nz(1));
        write_gamma(&mut writer, nz(2));
        write_gamma(&mut writer, nz(6));

        // Stream order: 1 | 0 1 0 | 0 0 1 0 1
        assert_eq!(buf, [0b0100_0101, 0b1]);

        let mut reader = BitReader::new(&buf);
        assert_eq!(read_gamma(&mut reader), Ok(1));
        assert_eq!(read_gamma(&mut reader), Ok(2));
        assert_eq!(read_gamma(&mut reader), Ok(6));
        assert_eq!(reader.finish(), Ok(()));
    }

    #[test]
    fn max_value() {
        let mut buf = Vec::new();
        write_gamma(&mut BitWriter::new(&mut buf), nz(u64::MAX));
        assert_eq!(buf.len(), 16);

        let mut reader = BitReader::new(&buf);
        assert_eq!(read_gamma(&mut reader), Ok(u64::MAX));
    }

    #[test]
    fn overlong_prefix() {
        let zeros = [0u8; 9];
        let mut reader = BitReader::new(&zeros);
        assert_eq!(read_gamma(&mut reader), Err(BitStreamError::GammaOverflow));
    }

    #[test]
    fn truncated_code() {
        // A prefix announcing 4 more bits, but only 3 follow.
        let mut reader = BitReader::new(&[0b0001_0000]);
        assert!(matches!(
            read_gamma(&mut reader),
            Err(BitStreamError::UnexpectedEnd { .. })
        ));
    }

    proptest! {
        #[test]
        fn prop_gamma_round_trip(value in 1u64..) {
            let value = nz(value);
            let mut buf = Vec::new();
            write_gamma(&mut BitWriter::new(&mut buf), value);
            prop_assert_eq!(buf.len(), gamma_len(value).div_ceil(8) as usize);

            let mut reader = BitReader::new(&buf);
            prop_assert_eq!(read_gamma(&mut reader)?, value.get());
            prop_assert_eq!(reader.finish(), Ok(()));
        }
    }
}
