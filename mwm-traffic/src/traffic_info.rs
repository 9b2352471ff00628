//! # Traffic info
//!
//! The per-mwm traffic state and the protocol that keeps it in sync with the server.
//!
//! Keys are fetched (or read locally) once per mwm edition.
//! Values are polled with the revision token of the previous response,
//! so an unchanged data set costs a single `304 Not Modified`.

use crate::keys::{KeysCodecError, decode_keys};
use crate::section::KeysSection;
use crate::telemetry::{TelemetrySink, TracingTelemetry, TrafficEvent};
use crate::transport::{ETAG, HttpClient, HttpRequest, HttpResponse, IF_NONE_MATCH, TransportError};
use crate::values::{ValuesCodecError, decode_values};
use crate::{
    Availability, Coloring, ColoringError, MwmId, RemoteUrlBuilder, RoadSegmentId, SpeedGroup,
};
use http::StatusCode;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum TrafficError {
    #[error("No traffic server is configured")]
    NoRemoteConfigured,
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("Unexpected HTTP status {0}")]
    UnexpectedStatus(StatusCode),
    #[error("Could not read the local keys section: {0}")]
    Section(#[source] std::io::Error),
    #[error("Invalid traffic keys: {0}")]
    Keys(#[from] KeysCodecError),
    #[error("Invalid traffic values: {0}")]
    Values(#[from] ValuesCodecError),
    #[error(transparent)]
    Coloring(#[from] ColoringError),
}

/// The outcome of a values request.
#[derive(Debug)]
pub enum ServerData {
    /// New values, parallel to the key list.
    New(Vec<SpeedGroup>),
    /// The data matching the revision token is still current.
    NotChanged,
    /// The server has nothing for this mwm edition (see [`TrafficInfo::availability`] for why).
    NotFound,
    Error(TrafficError),
}

/// A consistent view of everything readers may look at.
///
/// The coloring and availability always belong to the same sync round,
/// and the coloring was built from these keys (unless the keys were replaced since).
#[derive(Clone, Debug, Default)]
pub struct TrafficSnapshot {
    pub keys: Arc<[RoadSegmentId]>,
    pub coloring: Arc<Coloring>,
    pub availability: Availability,
}

/// What a values request found, before any of it is applied to the state.
struct ValuesOutcome {
    data: ServerData,
    availability: Option<Availability>,
    event: Option<TrafficEvent>,
}

impl ValuesOutcome {
    fn new(data: ServerData, availability: Availability) -> Self {
        Self {
            data,
            availability: Some(availability),
            event: None,
        }
    }

    fn with_event(self, event: TrafficEvent) -> Self {
        Self {
            event: Some(event),
            ..self
        }
    }
}

/// Traffic for a single mwm.
///
/// All methods take `&self`; the state is swapped wholesale under a lock,
/// so readers always observe either the previous or the next complete snapshot,
/// even while a sync is in flight on another task.
pub struct TrafficInfo<C> {
    mwm: MwmId,
    /// The newest data format version this client understands.
    current_data_version: i64,
    remote: RemoteUrlBuilder,
    client: Arc<C>,
    telemetry: Arc<dyn TelemetrySink>,
    state: RwLock<TrafficSnapshot>,
}

impl<C: HttpClient> TrafficInfo<C> {
    /// Creates traffic info with no keys and [`Availability::Unknown`].
    ///
    /// Call [`TrafficInfo::load_keys`] before syncing values.
    pub fn new(
        mwm: MwmId,
        current_data_version: i64,
        remote: RemoteUrlBuilder,
        client: Arc<C>,
    ) -> Self {
        Self {
            mwm,
            current_data_version,
            remote,
            client,
            telemetry: Arc::new(TracingTelemetry),
            state: RwLock::new(TrafficSnapshot::default()),
        }
    }

    /// Replaces the default [`TracingTelemetry`] sink.
    #[must_use]
    pub fn with_telemetry(self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        Self { telemetry, ..self }
    }

    /// Replaces the coloring outright (e.g. with data known from elsewhere, or in tests).
    #[must_use]
    pub fn with_coloring(self, coloring: Coloring) -> Self {
        self.write_state().coloring = Arc::new(coloring);
        self
    }

    pub fn mwm(&self) -> &MwmId {
        &self.mwm
    }

    pub fn current_data_version(&self) -> i64 {
        self.current_data_version
    }

    /// Keys, coloring and availability, read together.
    pub fn snapshot(&self) -> TrafficSnapshot {
        self.read_state().clone()
    }

    pub fn availability(&self) -> Availability {
        self.read_state().availability
    }

    /// A snapshot of the current coloring.
    pub fn coloring(&self) -> Arc<Coloring> {
        self.read_state().coloring.clone()
    }

    /// A snapshot of the current key list.
    pub fn keys(&self) -> Arc<[RoadSegmentId]> {
        self.read_state().keys.clone()
    }

    /// Gets the speed group of a segment ([`SpeedGroup::Unknown`] if there is none).
    pub fn speed_group(&self, id: &RoadSegmentId) -> SpeedGroup {
        self.read_state().coloring.speed_group(id)
    }

    /// Installs a key list directly and marks the data as available.
    pub fn set_keys(&self, keys: Vec<RoadSegmentId>) {
        let mut state = self.write_state();
        state.keys = keys.into();
        state.availability = Availability::IsAvailable;
    }

    /// Loads the key list from a local section, falling back to the server.
    ///
    /// # Errors
    ///
    /// Fails if the section can't be read or decoded,
    /// or if it is absent and [`TrafficInfo::fetch_keys`] fails.
    /// The previous keys are kept in every failure case.
    pub async fn load_keys<S: KeysSection + ?Sized>(
        &self,
        section: &S,
    ) -> Result<(), TrafficError> {
        let result = match section.read_keys(&self.mwm) {
            Ok(Some(bytes)) => {
                info!(mwm = %self.mwm, "Reading traffic keys from section");
                decode_keys(&bytes)
                    .map(|keys| self.replace_keys(keys))
                    .map_err(TrafficError::from)
            }
            Ok(None) => {
                info!(mwm = %self.mwm, "Reading traffic keys from the web");
                self.fetch_keys().await
            }
            Err(e) => Err(TrafficError::Section(e)),
        };

        if let Err(e) = &result {
            warn!(mwm = %self.mwm, error = %e, "Could not initialize traffic keys");
        }
        result
    }

    /// Downloads and installs the key list for this mwm edition.
    ///
    /// Availability is not affected; key presence and data availability are tracked separately.
    ///
    /// # Errors
    ///
    /// Fails without any network activity if no server is configured.
    /// Otherwise fails on transport errors, any status other than 200,
    /// or an undecodable body. The previous keys are kept in every failure case.
    pub async fn fetch_keys(&self) -> Result<(), TrafficError> {
        let url = self
            .remote
            .keys_url(&self.mwm)
            .ok_or(TrafficError::NoRemoteConfigured)?;

        let response = self.client.get(HttpRequest::get(&url)).await.map_err(|e| {
            info!(url, error = %e, "Couldn't run traffic keys request");
            e
        })?;
        if response.status != StatusCode::OK {
            warn!(url, status = %response.status, "Network error when reading keys");
            return Err(TrafficError::UnexpectedStatus(response.status));
        }

        let keys = decode_keys(&response.body).map_err(|e| {
            info!(
                mwm = self.mwm.region(),
                version = self.mwm.version(),
                error = %e,
                "Could not read traffic keys received from server"
            );
            e
        })?;
        self.replace_keys(keys);
        Ok(())
    }

    /// Requests the latest values, conditioned on `etag`, and records the availability.
    ///
    /// On new data, `etag` is replaced with the revision token from the response (if any).
    /// Every outcome except a missing server configuration updates the availability.
    /// [`TrafficInfo::sync`] should be preferred, as it publishes new values
    /// and their availability in one step.
    pub async fn fetch_values(&self, etag: &mut String) -> ServerData {
        let ValuesOutcome {
            data,
            availability,
            event,
        } = self.request_values(etag).await;
        self.apply(availability, event);
        data
    }

    /// Rebuilds the coloring from the current keys and a parallel list of values.
    ///
    /// The new coloring is published together with [`Availability::IsAvailable`].
    ///
    /// # Errors
    ///
    /// On a length mismatch, the availability becomes [`Availability::NoData`]
    /// and the previous coloring is kept.
    pub fn update_values(&self, values: &[SpeedGroup]) -> Result<(), TrafficError> {
        loop {
            let keys = self.keys();
            let built = Coloring::build_from_parallel_arrays(&keys, values);

            let mut state = self.write_state();
            if !Arc::ptr_eq(&state.keys, &keys) {
                debug!(mwm = %self.mwm, "Traffic keys were replaced during the update; retrying");
                continue;
            }

            return match built {
                Ok(coloring) => {
                    state.coloring = Arc::new(coloring);
                    state.availability = Availability::IsAvailable;
                    Ok(())
                }
                Err(e) => {
                    state.availability = Availability::NoData;
                    drop(state);

                    warn!(
                        keys = keys.len(),
                        values = values.len(),
                        "The number of received traffic values does not match the number of keys"
                    );
                    self.telemetry.log_event(TrafficEvent::UpdateError {
                        keys_count: keys.len(),
                        values_count: values.len(),
                    });
                    Err(e.into())
                }
            };
        }
    }

    /// Runs one round of value synchronization.
    ///
    /// Returns `true` if the coloring is current afterward
    /// (freshly rebuilt, or confirmed unchanged by the server).
    /// Readers never see the availability of this round next to the coloring of another.
    pub async fn sync(&self, etag: &mut String) -> bool {
        let ValuesOutcome {
            data,
            availability,
            event,
        } = self.request_values(etag).await;

        match data {
            // Availability is published along with the coloring.
            ServerData::New(values) => self.update_values(&values).is_ok(),
            data => {
                self.apply(availability, event);
                match data {
                    ServerData::NotChanged => true,
                    ServerData::Error(e) => {
                        debug!(mwm = %self.mwm, error = %e, "Traffic sync failed");
                        false
                    }
                    ServerData::New(_) | ServerData::NotFound => false,
                }
            }
        }
    }

    /// Performs a values request without touching the state.
    async fn request_values(&self, etag: &mut String) -> ValuesOutcome {
        let Some(url) = self.remote.values_url(&self.mwm) else {
            return ValuesOutcome {
                data: ServerData::Error(TrafficError::NoRemoteConfigured),
                availability: None,
                event: None,
            };
        };

        let mut request = HttpRequest::get(&url);
        if !etag.is_empty() {
            request = request.with_header(IF_NONE_MATCH, etag.as_str());
        }
        let response = match self.client.get(request).await {
            Ok(response) if response.status == StatusCode::OK => response,
            Ok(response) => return self.classify_failure(&response),
            Err(e) => {
                info!(url, error = %e, "Couldn't run traffic request");
                return ValuesOutcome::new(ServerData::Error(e.into()), Availability::Unknown)
                    .with_event(TrafficEvent::NetworkError { status: None });
            }
        };

        match decode_values(&response.body) {
            Ok(values) => {
                if let Some(tag) = response.header(ETAG) {
                    tag.clone_into(etag);
                }
                ValuesOutcome::new(ServerData::New(values), Availability::IsAvailable)
            }
            Err(e) => {
                warn!(
                    mwm = self.mwm.region(),
                    version = self.mwm.version(),
                    error = %e,
                    "Could not read traffic values received from server"
                );
                ValuesOutcome::new(ServerData::Error(e.into()), Availability::NoData).with_event(
                    TrafficEvent::ReadError {
                        region: self.mwm.region().to_owned(),
                        version: self.mwm.version(),
                    },
                )
            }
        }
    }

    fn classify_failure(&self, response: &HttpResponse) -> ValuesOutcome {
        match response.status {
            StatusCode::NOT_FOUND => {
                let server_version = parse_server_version(&response.body);
                let availability = Availability::for_missing_data(
                    server_version,
                    self.mwm.version(),
                    self.current_data_version,
                );
                debug!(mwm = %self.mwm, server_version, %availability, "No traffic data");
                ValuesOutcome::new(ServerData::NotFound, availability)
            }
            StatusCode::NOT_MODIFIED => {
                ValuesOutcome::new(ServerData::NotChanged, Availability::IsAvailable)
            }
            status => {
                info!(mwm = %self.mwm, %status, "Traffic request failed");
                ValuesOutcome::new(
                    ServerData::Error(TrafficError::UnexpectedStatus(status)),
                    Availability::Unknown,
                )
                .with_event(TrafficEvent::NetworkError {
                    status: Some(status),
                })
            }
        }
    }

    /// Publishes the availability first, so telemetry sinks observe the outcome they report.
    fn apply(&self, availability: Option<Availability>, event: Option<TrafficEvent>) {
        if let Some(availability) = availability {
            self.set_availability(availability);
        }
        if let Some(event) = event {
            self.telemetry.log_event(event);
        }
    }

    fn replace_keys(&self, keys: Vec<RoadSegmentId>) {
        self.write_state().keys = keys.into();
    }

    fn set_availability(&self, availability: Availability) {
        self.write_state().availability = availability;
    }

    // Writes under the lock are plain field assignments that can't panic midway,
    // so a poisoned lock still holds a complete snapshot.
    fn read_state(&self) -> RwLockReadGuard<'_, TrafficSnapshot> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, TrafficSnapshot> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Parses the body of a 404 response: the latest edition the server has data for.
/// Anything unparseable counts as zero (no newer data).
fn parse_server_version(body: &[u8]) -> i64 {
    std::str::from_utf8(body)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or_else(|| {
            debug!(body = %String::from_utf8_lossy(body), "Unparseable server version");
            0
        })
}
