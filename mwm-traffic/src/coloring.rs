use crate::{RoadSegmentId, SpeedGroup};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ColoringError {
    #[error("Received {values_count} traffic values for {keys_count} keys")]
    LengthMismatch {
        keys_count: usize,
        values_count: usize,
    },
}

/// The best known speed group for every road segment of an mwm.
///
/// A coloring is immutable once built; updates replace it wholesale.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Coloring(BTreeMap<RoadSegmentId, SpeedGroup>);

impl Coloring {
    /// Zips a key list with the parallel list of values received from the server.
    ///
    /// # Errors
    ///
    /// The lists must have the same length.
    /// Anything else is a protocol violation, and no coloring is produced.
    pub fn build_from_parallel_arrays(
        keys: &[RoadSegmentId],
        values: &[SpeedGroup],
    ) -> Result<Self, ColoringError> {
        if keys.len() != values.len() {
            return Err(ColoringError::LengthMismatch {
                keys_count: keys.len(),
                values_count: values.len(),
            });
        }

        Ok(keys.iter().copied().zip(values.iter().copied()).collect())
    }

    /// Carries previously known speed groups over to a fresh key list.
    ///
    /// Keys without a known group become [`SpeedGroup::Unknown`].
    /// Every known key is expected to be present in `keys`.
    pub fn combine_with_known(keys: &[RoadSegmentId], known: &Coloring) -> Self {
        let mut known_count = 0usize;
        let mut unknown_count = 0usize;

        let result: Coloring = keys
            .iter()
            .map(|key| match known.0.get(key) {
                Some(&group) => {
                    known_count += 1;
                    (*key, group)
                }
                None => {
                    unknown_count += 1;
                    (*key, SpeedGroup::Unknown)
                }
            })
            .collect();

        info!(
            known = known_count,
            unknown = unknown_count,
            total = known_count + unknown_count,
            "Road segments: known/unknown/total"
        );
        let missing = known.len().saturating_sub(known_count);
        if missing > 0 {
            warn!(missing, "Known road segments are missing from the key list");
        }
        debug_assert_eq!(missing, 0, "{missing} known segments are missing from the key list");

        result
    }

    /// Gets the speed group for a segment, or [`SpeedGroup::Unknown`] if there is none.
    #[inline]
    pub fn speed_group(&self, id: &RoadSegmentId) -> SpeedGroup {
        self.0.get(id).copied().unwrap_or(SpeedGroup::Unknown)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over the segments in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&RoadSegmentId, &SpeedGroup)> {
        self.0.iter()
    }
}

impl FromIterator<(RoadSegmentId, SpeedGroup)> for Coloring {
    fn from_iter<T: IntoIterator<Item = (RoadSegmentId, SpeedGroup)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Direction;
    use proptest::prelude::*;

    fn key(feature_id: u32, point_index: u16) -> RoadSegmentId {
        RoadSegmentId::new(feature_id, point_index, Direction::Forward)
    }

    #[test]
    fn build_zips_index_wise() {
        let keys = [key(1, 0), key(1, 1), key(2, 0)];
        let values = [SpeedGroup::G0, SpeedGroup::G3, SpeedGroup::TempBlock];
        let coloring = Coloring::build_from_parallel_arrays(&keys, &values).unwrap();

        assert_eq!(coloring.len(), 3);
        assert_eq!(coloring.speed_group(&key(1, 1)), SpeedGroup::G3);
        assert_eq!(coloring.speed_group(&key(2, 0)), SpeedGroup::TempBlock);
    }

    #[test]
    fn build_rejects_mismatched_lengths() {
        let keys = [key(1, 0), key(1, 1), key(2, 0)];
        let values = [SpeedGroup::G0, SpeedGroup::G3];

        assert_eq!(
            Coloring::build_from_parallel_arrays(&keys, &values),
            Err(ColoringError::LengthMismatch {
                keys_count: 3,
                values_count: 2
            })
        );
    }

    #[test]
    fn lookup_of_missing_segment_is_unknown() {
        let coloring = Coloring::default();
        assert_eq!(coloring.speed_group(&key(9, 9)), SpeedGroup::Unknown);
    }

    #[test]
    fn combine_keeps_known_groups() {
        let known: Coloring = [(key(1, 0), SpeedGroup::G1), (key(3, 0), SpeedGroup::G4)]
            .into_iter()
            .collect();
        let keys = [key(1, 0), key(2, 0), key(3, 0)];

        let combined = Coloring::combine_with_known(&keys, &known);
        assert_eq!(
            combined.iter().map(|(k, g)| (*k, *g)).collect::<Vec<_>>(),
            [
                (key(1, 0), SpeedGroup::G1),
                (key(2, 0), SpeedGroup::Unknown),
                (key(3, 0), SpeedGroup::G4),
            ]
        );
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "missing from the key list")]
    fn combine_flags_known_segments_without_keys() {
        let known: Coloring = [(key(1, 0), SpeedGroup::G1), (key(9, 0), SpeedGroup::G2)]
            .into_iter()
            .collect();
        let _ = Coloring::combine_with_known(&[key(1, 0), key(2, 0)], &known);
    }

    proptest! {
        #[test]
        fn prop_combine_is_monotonic(
            keys in proptest::collection::btree_set((0u32..200, 0u16..5), 0..100),
            known_mask in proptest::collection::vec((any::<bool>(), 0u8..8), 100),
        ) {
            let keys: Vec<RoadSegmentId> = keys.into_iter().map(|(f, i)| key(f, i)).collect();
            let known: Coloring = keys
                .iter()
                .zip(&known_mask)
                .filter(|(_, (is_known, _))| *is_known)
                .map(|(k, (_, code))| (*k, SpeedGroup::try_from(*code).unwrap()))
                .collect();

            let combined = Coloring::combine_with_known(&keys, &known);
            prop_assert_eq!(combined.len(), keys.len());
            for k in &keys {
                prop_assert_eq!(combined.speed_group(k), known.speed_group(k));
            }
        }
    }
}
