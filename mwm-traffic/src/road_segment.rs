#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// The direction of travel along a road segment, relative to the feature geometry.
///
/// The discriminant order matters: keys sort [`Direction::Forward`] first.
#[repr(u8)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Direction {
    /// Travel in the order of the geometry points.
    #[default]
    Forward = 0,
    /// Travel against the geometry. Only two-way roads have backward segments.
    Backward = 1,
}

impl Display for Direction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Direction::Forward => "Forward",
            Direction::Backward => "Backward",
        })
    }
}

/// Identifies one directed sub-segment of a road feature.
///
/// The sub-segment spans geometry points `[point_index, point_index + 1]`.
/// Ordering is lexicographic on `(feature_id, point_index, direction)`,
/// which is the order of the canonical key list for an mwm.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RoadSegmentId {
    feature_id: u32,
    point_index: u16,
    direction: Direction,
}

impl RoadSegmentId {
    #[inline]
    pub const fn new(feature_id: u32, point_index: u16, direction: Direction) -> Self {
        Self {
            feature_id,
            point_index,
            direction,
        }
    }

    /// The ID of the road feature within the mwm.
    #[inline]
    pub const fn feature_id(&self) -> u32 {
        self.feature_id
    }

    /// The index of the first geometry point of this sub-segment.
    #[inline]
    pub const fn point_index(&self) -> u16 {
        self.point_index
    }

    #[inline]
    pub const fn direction(&self) -> Direction {
        self.direction
    }
}

impl Display for RoadSegmentId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "RoadSegmentId [ fid = {} idx = {} dir = {} ]",
            self.feature_id, self.point_index, self.direction
        )
    }
}
