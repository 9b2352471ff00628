use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use std::fmt::{Display, Formatter};

/// The extension of traffic value files on the server.
pub const TRAFFIC_FILE_EXTENSION: &str = ".traffic";

/// Appended to the value URL to address the key file.
pub const KEYS_FILE_SUFFIX: &str = ".keys";

/// Characters left alone when escaping region names.
const REGION_NAME: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Identifies one mwm: a region and the edition of its map data.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MwmId {
    region: String,
    version: i64,
}

impl MwmId {
    pub fn new(region: impl Into<String>, version: i64) -> Self {
        Self {
            region: region.into(),
            version,
        }
    }

    /// The region (country) name, e.g. `Netherlands_North Holland_Amsterdam`.
    pub fn region(&self) -> &str {
        &self.region
    }

    /// The edition version of the map data.
    pub const fn version(&self) -> i64 {
        self.version
    }
}

impl Display for MwmId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (v{})", self.region, self.version)
    }
}

/// Builds traffic server URLs for an mwm.
///
/// ```
/// # use mwm_traffic::{MwmId, RemoteUrlBuilder};
/// let builder = RemoteUrlBuilder::new("https://traffic.example.com/");
/// let mwm = MwmId::new("Côte d'Ivoire", 170_101);
/// assert_eq!(
///     builder.values_url(&mwm).unwrap(),
///     "https://traffic.example.com/170101/C%C3%B4te%20d%27Ivoire.traffic"
/// );
/// assert!(RemoteUrlBuilder::default().values_url(&mwm).is_none());
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RemoteUrlBuilder {
    base_url: Option<String>,
}

impl RemoteUrlBuilder {
    /// Creates a builder for the given base URL.
    /// An empty base URL leaves the builder unconfigured.
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        if base_url.is_empty() {
            return Self::default();
        }
        if !base_url.ends_with('/') {
            base_url.push('/');
        }

        Self {
            base_url: Some(base_url),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.base_url.is_some()
    }

    /// The URL of the traffic values for `mwm`, or `None` if no server is configured.
    pub fn values_url(&self, mwm: &MwmId) -> Option<String> {
        let base_url = self.base_url.as_ref()?;
        let region = utf8_percent_encode(mwm.region(), REGION_NAME);
        // Version zero means the mwm has no known edition.
        Some(if mwm.version() == 0 {
            format!("{base_url}{region}{TRAFFIC_FILE_EXTENSION}")
        } else {
            format!("{base_url}{}/{region}{TRAFFIC_FILE_EXTENSION}", mwm.version())
        })
    }

    /// The URL of the traffic keys for `mwm`, or `None` if no server is configured.
    pub fn keys_url(&self, mwm: &MwmId) -> Option<String> {
        self.values_url(mwm).map(|url| url + KEYS_FILE_SUFFIX)
    }
}
