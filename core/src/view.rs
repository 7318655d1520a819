//! Interfaces the sync engine renders through.
//!
//! The engine only speaks in semantic states; how a state is shown (a
//! favicon, a dimmed table, a log line) is up to the implementor.

use serde::Serialize;

use crate::job::{JobId, JobRecord};
use crate::status::Severity;
use crate::transport::TransportError;
use crate::wire::ServiceStatus;

/// Health of the long-poll stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// The last long-poll succeeded.
    Connected,
    /// The backoff elapsed and a retry request is in flight.
    RetryScheduled,
    /// The last long-poll failed; waiting out the backoff.
    Disconnected,
}

/// Aggregate fleet indicator (the dashboard favicon).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorState {
    /// Everything is fine.
    Normal,
    /// At least one job is in a warning state.
    Warning,
    /// At least one job is failing.
    Error,
    /// A server-side service is down.
    ServiceDown,
    /// The stream to the server is broken.
    Disconnected,
}

impl IndicatorState {
    /// Select the indicator for the given fleet health and connection state.
    ///
    /// Fleet health is only shown while the stream is connected; a retry
    /// in flight still reads as disconnected.
    pub fn select(
        connection: ConnectionState,
        services: &ServiceStatus,
        num_error: u64,
        num_warning: u64,
    ) -> Self {
        if connection != ConnectionState::Connected {
            IndicatorState::Disconnected
        } else if !services.all_healthy() {
            IndicatorState::ServiceDown
        } else if num_error > 0 {
            IndicatorState::Error
        } else if num_warning > 0 {
            IndicatorState::Warning
        } else {
            IndicatorState::Normal
        }
    }

    /// Icon resource shown for this state.
    pub fn resource(self) -> &'static str {
        match self {
            IndicatorState::Normal => "/res/favicon.png",
            IndicatorState::Warning => "/res/favicon-warn.png",
            IndicatorState::Error => "/res/favicon-error.png",
            IndicatorState::ServiceDown => "/res/favicon-stopped.png",
            IndicatorState::Disconnected => "/res/favicon-disconnect.png",
        }
    }
}

/// Renders individual jobs. Never mutates sync state.
pub trait Presenter: Send + 'static {
    /// A job was seen for the first time.
    fn job_added(&mut self, job: &JobRecord);
    /// A known job received a delta (called even if nothing visible changed).
    fn job_updated(&mut self, job: &JobRecord);
    /// A known job moved between severities; fires once per transition.
    fn severity_changed(&mut self, id: &JobId, previous: Severity, current: Severity);
    /// Host/user/command details arrived for a job.
    fn job_info(&mut self, job: &JobRecord);
    /// The service health map was replaced.
    fn services_updated(&mut self, services: &ServiceStatus);
    /// A response (streamed or manual) was fully applied.
    fn refreshed(&mut self) {}
    /// A manual refresh failed.
    fn refresh_failed(&mut self, err: &TransportError);
}

/// Shows the aggregate fleet indicator and the connection state.
pub trait Indicator: Send + 'static {
    /// Swap the indicator; only called when the selected state changes.
    fn show(&mut self, state: IndicatorState);
    /// The connection moved to `state`; anything but `Connected` is degraded.
    fn connection_changed(&mut self, state: ConnectionState);
}
