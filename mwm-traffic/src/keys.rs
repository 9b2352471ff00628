//! # Traffic keys codec
//!
//! Packs the canonical list of [`RoadSegmentId`]s for an mwm.
//!
//! The list is split into runs of keys sharing a feature ID.
//! Within a run the point indices and directions are fully implied by the
//! segment count and whether the road is one-way, so only three numbers per run
//! hit the wire:
//!
//! ```text
//! u8      format version
//! varint  run count
//! bits    gamma(feature ID delta + 1) for every run
//! bits    gamma(segment count + 1)    for every run
//! bits    one-way flag                for every run
//! ```
//!
//! The three bit streams follow each other directly; only the last byte is padded.

use crate::{Direction, RoadSegmentId};
use bit_twiddling_helpers::gamma::{read_gamma, write_gamma};
use bit_twiddling_helpers::{BitReader, BitStreamError, BitWriter};
use integer_encoding::{VarInt, VarIntReader};
use std::num::NonZeroU64;
use thiserror::Error;

/// The only key format version this crate reads or writes.
pub const TRAFFIC_KEYS_VERSION: u8 = 0;

/// The most keys [`decode_keys`] will produce for one mwm (128 MiB of keys).
///
/// A few bytes of run data can describe over a hundred thousand keys,
/// so payloads from the server are checked against this before anything is allocated.
/// Use [`decode_keys_with_limit`] for a different bound.
pub const MAX_TRAFFIC_KEYS: usize = 1 << 24;

/// The fewest bits a run can occupy (two 1-bit gamma codes and the one-way flag).
const MIN_BITS_PER_RUN: usize = 3;

#[derive(Debug, Error)]
pub enum KeysCodecError {
    #[error("The traffic keys buffer is empty")]
    Empty,
    #[error("Unsupported traffic keys version {found}; expected {TRAFFIC_KEYS_VERSION}")]
    UnsupportedVersion { found: u8 },
    #[error("Malformed run count: {0}")]
    RunCount(#[source] std::io::Error),
    #[error("The header claims {runs} runs, but only {bits} bits of data follow")]
    ImplausibleRunCount { runs: u64, bits: usize },
    #[error("Corrupt key bit stream: {0}")]
    BitStream(#[from] BitStreamError),
    #[error("Feature IDs overflow a u32")]
    FeatureIdOverflow,
    #[error("Feature {feature_id} appears in more than one run")]
    RepeatedFeature { feature_id: u32 },
    #[error("Feature {feature_id} has an invalid segment count ({count})")]
    InvalidSegmentCount { feature_id: u32, count: u64 },
    #[error("The key list holds {count} keys, more than the limit of {limit}")]
    TooManyKeys { count: u64, limit: usize },
    #[error("Keys are not sorted (first out of order at index {index})")]
    Unsorted { index: usize },
    #[error("Feature {feature_id} has {len} keys, not a multiple of its {directions} direction(s)")]
    InconsistentRun {
        feature_id: u32,
        len: usize,
        directions: usize,
    },
    #[error("Keys for feature {feature_id} are not a contiguous canonical run")]
    NonCanonicalRun { feature_id: u32 },
}

/// A maximal group of keys sharing a feature ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Run {
    feature_id: u32,
    segment_count: u64,
    one_way: bool,
}

fn group_runs(keys: &[RoadSegmentId]) -> Result<Vec<Run>, KeysCodecError> {
    let mut runs: Vec<Run> = Vec::new();
    let mut start = 0;

    for chunk in keys.chunk_by(|a, b| a.feature_id() == b.feature_id()) {
        let feature_id = chunk[0].feature_id();
        if let Some(prev) = runs.last()
            && prev.feature_id >= feature_id
        {
            return Err(KeysCodecError::Unsorted { index: start });
        }

        let one_way = chunk.iter().all(|k| k.direction() == Direction::Forward);
        let directions = if one_way { 1 } else { 2 };
        if chunk.len() % directions != 0 {
            return Err(KeysCodecError::InconsistentRun {
                feature_id,
                len: chunk.len(),
                directions,
            });
        }

        // The decoder regenerates every run as 0..n with all directions,
        // so anything else would not survive the trip.
        let canonical = chunk.iter().enumerate().all(|(i, key)| {
            usize::from(key.point_index()) == i / directions
                && (key.direction() == Direction::Backward) == (i % directions == 1)
        });
        if !canonical {
            return Err(KeysCodecError::NonCanonicalRun { feature_id });
        }

        runs.push(Run {
            feature_id,
            segment_count: (chunk.len() / directions) as u64,
            one_way,
        });
        start += chunk.len();
    }

    Ok(runs)
}

/// Encodes a canonical key list.
///
/// # Errors
///
/// The keys must be sorted, and every feature must form a contiguous run
/// covering point indices `0..n` with one direction (one-way roads) or both (two-way roads).
/// Key lists produced by [`extract_traffic_keys`](crate::extract_traffic_keys) always satisfy this.
pub fn encode_keys(keys: &[RoadSegmentId]) -> Result<Vec<u8>, KeysCodecError> {
    let runs = group_runs(keys)?;

    let mut result = vec![TRAFFIC_KEYS_VERSION];
    result.extend_from_slice(&(runs.len() as u64).encode_var_vec());

    let mut writer = BitWriter::new(&mut result);
    let mut prev_feature_id = 0;
    for run in &runs {
        let delta = u64::from(run.feature_id - prev_feature_id);
        write_gamma(&mut writer, NonZeroU64::MIN.saturating_add(delta));
        prev_feature_id = run.feature_id;
    }
    for run in &runs {
        write_gamma(&mut writer, NonZeroU64::MIN.saturating_add(run.segment_count));
    }
    for run in &runs {
        writer.write_bit(run.one_way);
    }

    Ok(result)
}

/// Decodes a key list produced by [`encode_keys`].
///
/// # Errors
///
/// Fails on an unsupported version, a truncated or overlong buffer,
/// or values that cannot describe a canonical key list.
/// No partial output is ever returned.
/// Lists longer than [`MAX_TRAFFIC_KEYS`] are rejected.
pub fn decode_keys(bytes: &[u8]) -> Result<Vec<RoadSegmentId>, KeysCodecError> {
    decode_keys_with_limit(bytes, MAX_TRAFFIC_KEYS)
}

/// Decodes a key list of at most `max_keys` keys.
///
/// # Errors
///
/// Fails like [`decode_keys`], and with [`KeysCodecError::TooManyKeys`]
/// if the runs describe more than `max_keys` keys.
pub fn decode_keys_with_limit(
    bytes: &[u8],
    max_keys: usize,
) -> Result<Vec<RoadSegmentId>, KeysCodecError> {
    let (&version, mut rest) = bytes.split_first().ok_or(KeysCodecError::Empty)?;
    if version != TRAFFIC_KEYS_VERSION {
        return Err(KeysCodecError::UnsupportedVersion { found: version });
    }

    let run_count: u64 = rest.read_varint().map_err(KeysCodecError::RunCount)?;
    let bits = rest.len() * 8;
    // Guards the allocations below against absurd headers.
    let run_count = usize::try_from(run_count)
        .ok()
        .filter(|n| n.saturating_mul(MIN_BITS_PER_RUN) <= bits)
        .ok_or(KeysCodecError::ImplausibleRunCount {
            runs: run_count,
            bits,
        })?;

    let mut reader = BitReader::new(rest);

    let mut feature_ids = Vec::with_capacity(run_count);
    let mut prev_feature_id = 0u32;
    for i in 0..run_count {
        let delta = read_gamma(&mut reader)? - 1;
        let feature_id = u64::from(prev_feature_id)
            .checked_add(delta)
            .and_then(|id| u32::try_from(id).ok())
            .ok_or(KeysCodecError::FeatureIdOverflow)?;
        if i > 0 && delta == 0 {
            return Err(KeysCodecError::RepeatedFeature { feature_id });
        }
        feature_ids.push(feature_id);
        prev_feature_id = feature_id;
    }

    // Runs are stored as (feature ID, last point index).
    let mut runs = Vec::with_capacity(run_count);
    for feature_id in feature_ids {
        let count = read_gamma(&mut reader)? - 1;
        let last_point_index = count
            .checked_sub(1)
            .and_then(|last| u16::try_from(last).ok())
            .ok_or(KeysCodecError::InvalidSegmentCount { feature_id, count })?;
        runs.push((feature_id, last_point_index));
    }

    let mut one_way = Vec::with_capacity(run_count);
    for _ in 0..run_count {
        one_way.push(reader.read_bit()?);
    }

    reader.finish()?;

    // Checked before expanding, since every run can stand for up to 131072 keys.
    let key_count = runs
        .iter()
        .zip(&one_way)
        .map(|(&(_, last_point_index), &one_way)| {
            let directions = if one_way { 1 } else { 2 };
            (u64::from(last_point_index) + 1) * directions
        })
        .fold(0u64, u64::saturating_add);
    let key_count = usize::try_from(key_count)
        .ok()
        .filter(|&n| n <= max_keys)
        .ok_or(KeysCodecError::TooManyKeys {
            count: key_count,
            limit: max_keys,
        })?;

    let mut result = Vec::with_capacity(key_count);
    for ((feature_id, last_point_index), one_way) in runs.into_iter().zip(one_way) {
        let directions = if one_way {
            &[Direction::Forward][..]
        } else {
            &[Direction::Forward, Direction::Backward][..]
        };
        for point_index in 0..=last_point_index {
            for &direction in directions {
                result.push(RoadSegmentId::new(feature_id, point_index, direction));
            }
        }
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const FWD: Direction = Direction::Forward;
    const BWD: Direction = Direction::Backward;

    fn key(feature_id: u32, point_index: u16, direction: Direction) -> RoadSegmentId {
        RoadSegmentId::new(feature_id, point_index, direction)
    }

    #[test]
    fn one_way_feature() {
        let keys = vec![key(5, 0, FWD), key(5, 1, FWD), key(5, 2, FWD)];

        let runs = group_runs(&keys).unwrap();
        assert_eq!(
            runs,
            [Run {
                feature_id: 5,
                segment_count: 3,
                one_way: true
            }]
        );

        let bytes = encode_keys(&keys).unwrap();
        // Version, one run, gamma(6) gamma(4) 1, packed low bit first
        assert_eq!(bytes, [0x00, 0x01, 0x94, 0x04]);
        assert_eq!(decode_keys(&bytes).unwrap(), keys);
    }

    #[test]
    fn two_way_feature() {
        let keys = vec![key(7, 0, FWD), key(7, 0, BWD), key(7, 1, FWD), key(7, 1, BWD)];

        let runs = group_runs(&keys).unwrap();
        assert_eq!(
            runs,
            [Run {
                feature_id: 7,
                segment_count: 2,
                one_way: false
            }]
        );

        let bytes = encode_keys(&keys).unwrap();
        assert_eq!(bytes, [0x00, 0x01, 0x08, 0x03]);
        assert_eq!(decode_keys(&bytes).unwrap(), keys);
    }

    #[test]
    fn mixed_features() {
        let keys = vec![
            key(0, 0, FWD),
            key(3, 0, FWD),
            key(3, 0, BWD),
            key(4, 0, FWD),
            key(4, 1, FWD),
            key(1_000_000, 0, FWD),
            key(1_000_000, 0, BWD),
        ];

        let bytes = encode_keys(&keys).unwrap();
        assert_eq!(decode_keys(&bytes).unwrap(), keys);
    }

    #[test]
    fn empty_key_list() {
        let bytes = encode_keys(&[]).unwrap();
        assert_eq!(bytes, [TRAFFIC_KEYS_VERSION, 0]);
        assert!(decode_keys(&bytes).unwrap().is_empty());
    }

    #[test]
    fn rejects_unknown_version() {
        assert!(matches!(
            decode_keys(&[1, 1, 0x94, 0x04]),
            Err(KeysCodecError::UnsupportedVersion { found: 1 })
        ));
        assert!(matches!(decode_keys(&[]), Err(KeysCodecError::Empty)));
    }

    #[test]
    fn rejects_trailing_and_missing_bytes() {
        let bytes = encode_keys(&[key(5, 0, FWD), key(5, 1, FWD), key(5, 2, FWD)]).unwrap();

        let mut longer = bytes.clone();
        longer.push(0);
        assert!(matches!(
            decode_keys(&longer),
            Err(KeysCodecError::BitStream(BitStreamError::TrailingBytes { count: 1 }))
        ));

        let shorter = &bytes[..bytes.len() - 1];
        assert!(decode_keys(shorter).is_err());

        let mut dirty_padding = bytes.clone();
        *dirty_padding.last_mut().unwrap() |= 0x80;
        assert!(matches!(
            decode_keys(&dirty_padding),
            Err(KeysCodecError::BitStream(BitStreamError::NonZeroPadding))
        ));
    }

    #[test]
    fn rejects_implausible_run_count() {
        // 1000 runs can't fit in a single byte of bits.
        let mut bytes = vec![TRAFFIC_KEYS_VERSION];
        bytes.extend_from_slice(&1000u64.encode_var_vec());
        bytes.push(0xff);
        assert!(matches!(
            decode_keys(&bytes),
            Err(KeysCodecError::ImplausibleRunCount { runs: 1000, .. })
        ));
    }

    #[test]
    fn rejects_key_lists_over_the_limit() {
        // About 1.4 KB of runs describing 39 million keys
        let runs: u64 = 300;
        let mut bytes = vec![TRAFFIC_KEYS_VERSION];
        bytes.extend_from_slice(&runs.encode_var_vec());
        let mut writer = BitWriter::new(&mut bytes);
        for _ in 0..runs {
            write_gamma(&mut writer, NonZeroU64::new(2).unwrap());
        }
        for _ in 0..runs {
            write_gamma(&mut writer, NonZeroU64::new(65_537).unwrap());
        }
        for _ in 0..runs {
            writer.write_bit(false);
        }
        assert!(bytes.len() < 1_500);

        assert!(matches!(
            decode_keys(&bytes),
            Err(KeysCodecError::TooManyKeys {
                count: 39_321_600,
                limit: MAX_TRAFFIC_KEYS
            })
        ));
    }

    #[test]
    fn caller_supplied_key_limit() {
        let keys = [key(5, 0, FWD), key(5, 1, FWD), key(7, 0, FWD), key(7, 0, BWD)];
        let bytes = encode_keys(&keys).unwrap();

        assert_eq!(decode_keys_with_limit(&bytes, 4).unwrap(), keys);
        assert!(matches!(
            decode_keys_with_limit(&bytes, 3),
            Err(KeysCodecError::TooManyKeys { count: 4, limit: 3 })
        ));
    }

    #[test]
    fn rejects_non_canonical_streams() {
        fn stream(feature_gammas: &[u64], count_gammas: &[u64]) -> Vec<u8> {
            let mut bytes = vec![TRAFFIC_KEYS_VERSION];
            bytes.extend_from_slice(&(feature_gammas.len() as u64).encode_var_vec());
            let mut writer = BitWriter::new(&mut bytes);
            for &value in feature_gammas.iter().chain(count_gammas) {
                write_gamma(&mut writer, NonZeroU64::new(value).unwrap());
            }
            for _ in feature_gammas {
                writer.write_bit(true);
            }
            bytes
        }

        // Well formed: features 5 and 6 with one segment each.
        assert_eq!(
            decode_keys(&stream(&[6, 2], &[2, 2])).unwrap(),
            [key(5, 0, FWD), key(6, 0, FWD)]
        );
        assert!(matches!(
            decode_keys(&stream(&[6, 1], &[2, 2])),
            Err(KeysCodecError::RepeatedFeature { feature_id: 5 })
        ));
        assert!(matches!(
            decode_keys(&stream(&[6], &[1])),
            Err(KeysCodecError::InvalidSegmentCount {
                feature_id: 5,
                count: 0
            })
        ));
        assert!(matches!(
            decode_keys(&stream(&[6], &[65_538])),
            Err(KeysCodecError::InvalidSegmentCount {
                feature_id: 5,
                count: 65_537
            })
        ));
        assert!(matches!(
            decode_keys(&stream(&[u64::from(u32::MAX), 3], &[2, 2])),
            Err(KeysCodecError::FeatureIdOverflow)
        ));
    }

    #[test]
    fn rejects_inconsistent_runs() {
        assert!(matches!(
            encode_keys(&[key(7, 0, FWD), key(7, 0, BWD), key(7, 1, FWD)]),
            Err(KeysCodecError::InconsistentRun {
                feature_id: 7,
                len: 3,
                directions: 2
            })
        ));
        assert!(matches!(
            encode_keys(&[key(7, 1, FWD), key(7, 2, FWD)]),
            Err(KeysCodecError::NonCanonicalRun { feature_id: 7 })
        ));
        assert!(matches!(
            encode_keys(&[key(7, 0, FWD), key(3, 0, FWD)]),
            Err(KeysCodecError::Unsorted { index: 1 })
        ));
        assert!(matches!(
            encode_keys(&[key(7, 0, FWD), key(3, 0, FWD), key(7, 1, FWD)]),
            Err(KeysCodecError::Unsorted { index: 1 })
        ));
    }

    /// Canonical key lists: ascending feature IDs, each with 1..=40 segments and a direction mode.
    fn canonical_keys() -> impl Strategy<Value = Vec<RoadSegmentId>> {
        proptest::collection::vec((1u32..5000, 1u16..40, any::<bool>()), 0..60).prop_map(
            |features| {
                let mut feature_id = 0u32;
                let mut keys = Vec::new();
                for (i, (gap, segments, one_way)) in features.into_iter().enumerate() {
                    // Let the first feature start at zero sometimes.
                    feature_id += if i == 0 { gap - 1 } else { gap };
                    for point_index in 0..segments {
                        keys.push(RoadSegmentId::new(feature_id, point_index, FWD));
                        if !one_way {
                            keys.push(RoadSegmentId::new(feature_id, point_index, BWD));
                        }
                    }
                }
                keys
            },
        )
    }

    proptest! {
        #[test]
        fn prop_keys_round_trip(keys in canonical_keys()) {
            let bytes = encode_keys(&keys)?;
            prop_assert_eq!(decode_keys(&bytes)?, keys);
        }

        #[test]
        fn prop_appended_byte_is_detected(keys in canonical_keys(), extra: u8) {
            let mut bytes = encode_keys(&keys)?;
            bytes.push(extra);
            prop_assert!(decode_keys(&bytes).is_err());
        }
    }
}
