//! # Speed groups
//!
//! A small closed set of traffic speed categories.
//! Each group is transmitted in exactly [`SPEED_GROUP_BITS`] bits,
//! so the enum must never grow past `1 << SPEED_GROUP_BITS` variants.

use num_enum::{IntoPrimitive, TryFromPrimitive};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// The width of a speed group on the wire.
pub const SPEED_GROUP_BITS: u32 = 3;

/// The number of speed groups (the exclusive upper bound of the wire codes).
pub const SPEED_GROUP_COUNT: u8 = 8;

const _: () = assert!(
    SPEED_GROUP_COUNT as u32 <= 1 << SPEED_GROUP_BITS,
    "A speed group's value may not fit into its wire width"
);
const _: () = assert!(SpeedGroup::ALL.len() == SPEED_GROUP_COUNT as usize);

/// Upper bounds (inclusive) of the percentage of free-flow speed for each group,
/// indexed by wire code.
const THRESHOLD_PERCENTAGE: [f64; SPEED_GROUP_COUNT as usize] =
    [8.0, 16.0, 33.0, 58.0, 83.0, 100.0, 100.0, 100.0];

/// A traffic speed category.
///
/// `G0` is the slowest moving traffic and `G5` is free flow.
#[repr(u8)]
#[derive(
    Copy,
    Clone,
    Debug,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    IntoPrimitive,
    TryFromPrimitive,
)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SpeedGroup {
    G0 = 0,
    G1 = 1,
    G2 = 2,
    G3 = 3,
    G4 = 4,
    G5 = 5,
    /// The road is temporarily blocked.
    TempBlock = 6,
    /// No speed information is known for the segment.
    #[default]
    Unknown = 7,
}

impl SpeedGroup {
    /// Every speed group, in wire code order.
    pub const ALL: [SpeedGroup; 8] = [
        SpeedGroup::G0,
        SpeedGroup::G1,
        SpeedGroup::G2,
        SpeedGroup::G3,
        SpeedGroup::G4,
        SpeedGroup::G5,
        SpeedGroup::TempBlock,
        SpeedGroup::Unknown,
    ];

    /// Classifies a speed given as a percentage of the free-flow speed.
    ///
    /// Values outside of `[0, 100]` are clamped.
    ///
    /// ```
    /// # use mwm_traffic::SpeedGroup;
    /// assert_eq!(SpeedGroup::from_percentage(5.0), SpeedGroup::G0);
    /// assert_eq!(SpeedGroup::from_percentage(50.0), SpeedGroup::G3);
    /// assert_eq!(SpeedGroup::from_percentage(250.0), SpeedGroup::G5);
    /// ```
    pub fn from_percentage(percentage: f64) -> Self {
        let percentage = percentage.clamp(0.0, 100.0);
        Self::ALL
            .into_iter()
            .zip(THRESHOLD_PERCENTAGE)
            .find(|(_, threshold)| percentage <= *threshold)
            .map_or(SpeedGroup::Unknown, |(group, _)| group)
    }
}

impl Display for SpeedGroup {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            SpeedGroup::G0 => "G0",
            SpeedGroup::G1 => "G1",
            SpeedGroup::G2 => "G2",
            SpeedGroup::G3 => "G3",
            SpeedGroup::G4 => "G4",
            SpeedGroup::G5 => "G5",
            SpeedGroup::TempBlock => "TempBlock",
            SpeedGroup::Unknown => "Unknown",
        })
    }
}
