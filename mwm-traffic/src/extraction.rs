//! Generating the canonical key list from the road features of an mwm.

use crate::{Direction, RoadSegmentId};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("Feature {feature_id} follows feature {previous}; features must be in ascending order")]
    Unsorted { previous: u32, feature_id: u32 },
    #[error("Road feature {feature_id} has {point_count} points, which is too many to index")]
    TooManyPoints {
        feature_id: u32,
        point_count: usize,
    },
}

/// A feature of the mwm, as seen by key extraction.
pub trait RoadFeature {
    fn feature_id(&self) -> u32;
    /// The number of points in the feature geometry (at its best level of detail).
    fn point_count(&self) -> usize;
}

/// Decides which features are roads, and how they can be traveled.
///
/// This is supplied by the caller (typically backed by a vehicle model)
/// so that extraction does not depend on any global classification tables.
pub trait RoadClassifier<F> {
    fn is_road(&self, feature: &F) -> bool;
    fn is_one_way(&self, feature: &F) -> bool;
}

/// Lists every directed sub-segment of every road, in canonical key order.
///
/// # Errors
///
/// Features must be visited in strictly ascending ID order,
/// and a road cannot have more sub-segments than a `u16` point index can address.
pub fn extract_traffic_keys<F, I, C>(
    features: I,
    classifier: &C,
) -> Result<Vec<RoadSegmentId>, ExtractionError>
where
    F: RoadFeature,
    I: IntoIterator<Item = F>,
    C: RoadClassifier<F> + ?Sized,
{
    let mut result = Vec::new();
    let mut previous: Option<u32> = None;

    for feature in features {
        let feature_id = feature.feature_id();
        if let Some(previous) = previous
            && previous >= feature_id
        {
            return Err(ExtractionError::Unsorted {
                previous,
                feature_id,
            });
        }
        previous = Some(feature_id);

        if !classifier.is_road(&feature) {
            continue;
        }

        let point_count = feature.point_count();
        let segment_count = point_count.saturating_sub(1);
        if segment_count > usize::from(u16::MAX) + 1 {
            return Err(ExtractionError::TooManyPoints {
                feature_id,
                point_count,
            });
        }

        let directions = if classifier.is_one_way(&feature) {
            &[Direction::Forward][..]
        } else {
            &[Direction::Forward, Direction::Backward][..]
        };
        for point_index in (0..=u16::MAX).take(segment_count) {
            for &direction in directions {
                result.push(RoadSegmentId::new(feature_id, point_index, direction));
            }
        }
    }

    debug_assert!(result.is_sorted());
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{decode_keys, encode_keys};

    struct Feature {
        id: u32,
        points: usize,
        road: bool,
        one_way: bool,
    }

    impl RoadFeature for Feature {
        fn feature_id(&self) -> u32 {
            self.id
        }

        fn point_count(&self) -> usize {
            self.points
        }
    }

    struct FlagClassifier;

    impl RoadClassifier<Feature> for FlagClassifier {
        fn is_road(&self, feature: &Feature) -> bool {
            feature.road
        }

        fn is_one_way(&self, feature: &Feature) -> bool {
            feature.one_way
        }
    }

    fn feature(id: u32, points: usize, road: bool, one_way: bool) -> Feature {
        Feature {
            id,
            points,
            road,
            one_way,
        }
    }

    #[test]
    fn extracts_roads_only() {
        let features = vec![
            feature(1, 4, true, true),
            // A building
            feature(2, 10, false, false),
            feature(3, 2, true, false),
            // Degenerate geometry yields no segments
            feature(4, 1, true, false),
        ];

        let keys = extract_traffic_keys(features, &FlagClassifier).unwrap();
        assert_eq!(
            keys,
            [
                RoadSegmentId::new(1, 0, Direction::Forward),
                RoadSegmentId::new(1, 1, Direction::Forward),
                RoadSegmentId::new(1, 2, Direction::Forward),
                RoadSegmentId::new(3, 0, Direction::Forward),
                RoadSegmentId::new(3, 0, Direction::Backward),
            ]
        );

        // Extracted keys are always encodable.
        assert_eq!(decode_keys(&encode_keys(&keys).unwrap()).unwrap(), keys);
    }

    #[test]
    fn rejects_unsorted_features() {
        let features = vec![feature(5, 2, true, true), feature(5, 3, true, true)];
        assert_eq!(
            extract_traffic_keys(features, &FlagClassifier),
            Err(ExtractionError::Unsorted {
                previous: 5,
                feature_id: 5
            })
        );
    }

    #[test]
    fn rejects_oversized_features() {
        let features = vec![feature(5, 70_000, true, true)];
        assert_eq!(
            extract_traffic_keys(features, &FlagClassifier),
            Err(ExtractionError::TooManyPoints {
                feature_id: 5,
                point_count: 70_000
            })
        );
    }
}
