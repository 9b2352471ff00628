//! # Mwm traffic
//!
//! Per-road-segment traffic speed annotations for a single mwm (a packaged unit of map data
//! for one region and edition), synchronized from a remote traffic service.
//!
//! The crate is organized leaf-first:
//!
//! - [`keys`] packs the canonical, sorted list of [`RoadSegmentId`]s into a compact bit stream.
//! - [`values`] packs the parallel list of [`SpeedGroup`]s (3 bits each) and deflates it.
//! - [`Coloring`] joins keys and values into the lookup structure consumers query.
//! - [`TrafficInfo`] drives the remote fetches and derives an [`Availability`] verdict.

// Private modules by default
mod availability;
mod coloring;
mod extraction;
pub mod keys;
mod remote;
mod road_segment;
pub mod section;
mod speed_group;
pub mod telemetry;
mod traffic_info;
pub mod transport;
pub mod values;

// Flatten the most commonly used types for better ergonomics.
pub use availability::Availability;
pub use coloring::{Coloring, ColoringError};
pub use extraction::{ExtractionError, RoadClassifier, RoadFeature, extract_traffic_keys};
pub use remote::{KEYS_FILE_SUFFIX, MwmId, RemoteUrlBuilder, TRAFFIC_FILE_EXTENSION};
pub use road_segment::{Direction, RoadSegmentId};
pub use speed_group::{SPEED_GROUP_BITS, SPEED_GROUP_COUNT, SpeedGroup};
pub use traffic_info::{ServerData, TrafficError, TrafficInfo, TrafficSnapshot};
