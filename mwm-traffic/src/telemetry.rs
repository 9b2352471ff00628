//! # Telemetry
//!
//! Fire-and-forget events for protocol-relevant failures.
//! Sinks must never block or fail the caller.

use http::StatusCode;
use std::fmt::{Display, Formatter};
use tracing::warn;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TrafficEvent {
    /// The traffic values received from the server could not be decoded.
    ReadError { region: String, version: i64 },
    /// The server sent a different number of values than there are keys.
    UpdateError {
        keys_count: usize,
        values_count: usize,
    },
    /// The values request failed with an unexpected status,
    /// or without any response at all (`None`).
    NetworkError { status: Option<StatusCode> },
}

impl TrafficEvent {
    /// The event name reported to analytics.
    pub const fn name(&self) -> &'static str {
        match self {
            TrafficEvent::ReadError { .. } => "TrafficReadError",
            TrafficEvent::UpdateError { .. } => "TrafficUpdateError",
            TrafficEvent::NetworkError { .. } => "TrafficNetworkError",
        }
    }
}

impl Display for TrafficEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            TrafficEvent::ReadError { region, version } => {
                write!(f, "{} {{mwm: {region}, version: {version}}}", self.name())
            }
            TrafficEvent::UpdateError {
                keys_count,
                values_count,
            } => write!(
                f,
                "{} {{keysCount: {keys_count}, valuesCount: {values_count}}}",
                self.name()
            ),
            TrafficEvent::NetworkError { status } => match status {
                Some(status) => write!(f, "{} {{code: {}}}", self.name(), status.as_u16()),
                None => write!(f, "{} {{code: none}}", self.name()),
            },
        }
    }
}

pub trait TelemetrySink: Send + Sync {
    fn log_event(&self, event: TrafficEvent);
}

/// Reports events through `tracing` (under the `telemetry` target).
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingTelemetry;

impl TelemetrySink for TracingTelemetry {
    fn log_event(&self, event: TrafficEvent) {
        match &event {
            TrafficEvent::ReadError { region, version } => {
                warn!(target: "telemetry", event = event.name(), region, version);
            }
            TrafficEvent::UpdateError {
                keys_count,
                values_count,
            } => {
                warn!(target: "telemetry", event = event.name(), keys_count, values_count);
            }
            TrafficEvent::NetworkError { status } => {
                warn!(
                    target: "telemetry",
                    event = event.name(),
                    code = status.map(|s| s.as_u16())
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display() {
        insta::assert_snapshot!(
            TrafficEvent::UpdateError { keys_count: 3, values_count: 2 },
            @"TrafficUpdateError {keysCount: 3, valuesCount: 2}"
        );
        insta::assert_snapshot!(
            TrafficEvent::NetworkError { status: Some(StatusCode::BAD_GATEWAY) },
            @"TrafficNetworkError {code: 502}"
        );
        insta::assert_snapshot!(
            TrafficEvent::NetworkError { status: None },
            @"TrafficNetworkError {code: none}"
        );
    }
}
