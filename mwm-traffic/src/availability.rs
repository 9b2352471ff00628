#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Whether the traffic data for an mwm can be trusted, and if not, why.
///
/// Consumers should check this before relying on a [`Coloring`](crate::Coloring).
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Availability {
    /// Nothing has been fetched yet, or the last attempt failed in transit.
    #[default]
    Unknown,
    /// The current data is valid.
    IsAvailable,
    /// The server has no traffic coverage for this region.
    NoData,
    /// The server has data for a newer edition of this mwm; the map should be updated.
    ExpiredData,
    /// The server's data needs a newer data format version; the app should be updated.
    ExpiredApp,
}

impl Availability {
    /// Derives the verdict for a "not found" response.
    ///
    /// `server_version` is the newest edition the server has data for,
    /// `mwm_version` is the edition of the local mwm,
    /// and `current_data_version` is the newest data format version this client supports.
    ///
    /// ```
    /// # use mwm_traffic::Availability;
    /// assert_eq!(Availability::for_missing_data(110, 100, 120), Availability::ExpiredData);
    /// assert_eq!(Availability::for_missing_data(130, 100, 120), Availability::ExpiredApp);
    /// assert_eq!(Availability::for_missing_data(90, 100, 120), Availability::NoData);
    /// ```
    pub const fn for_missing_data(
        server_version: i64,
        mwm_version: i64,
        current_data_version: i64,
    ) -> Self {
        if server_version > mwm_version && server_version <= current_data_version {
            Availability::ExpiredData
        } else if server_version > current_data_version {
            Availability::ExpiredApp
        } else {
            Availability::NoData
        }
    }

    #[inline]
    pub const fn is_available(self) -> bool {
        matches!(self, Availability::IsAvailable)
    }
}

impl Display for Availability {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Availability::Unknown => "Unknown",
            Availability::IsAvailable => "IsAvailable",
            Availability::NoData => "NoData",
            Availability::ExpiredData => "ExpiredData",
            Availability::ExpiredApp => "ExpiredApp",
        })
    }
}
