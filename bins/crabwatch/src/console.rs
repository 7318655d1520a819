use crabwatch_core::{
    ConnectionState, Indicator, IndicatorState, JobId, JobRecord, Presenter, Severity,
    TransportError,
};
use crabwatch_core::wire::ServiceStatus;
use tracing::{debug, info, warn};

/// Renders the job table as log lines.
#[derive(Default)]
pub struct ConsolePresenter;

impl Presenter for ConsolePresenter {
    fn job_added(&mut self, job: &JobRecord) {
        info!(
            job = %job.id,
            status = %job.status_name(),
            severity = %job.severity(),
            reliability = %job.reliability.stars(),
            "job discovered"
        );
    }

    fn job_updated(&mut self, job: &JobRecord) {
        debug!(
            job = %job.id,
            status = %job.status_name(),
            running = job.running,
            reliability = job.reliability.percent(),
            stars = %job.reliability.stars(),
            scheduled = job.scheduled,
            "job updated"
        );
        if !job.scheduled {
            debug!(job = %job.id, "schedule for this job is unknown");
        }
    }

    fn severity_changed(&mut self, id: &JobId, previous: Severity, current: Severity) {
        match current {
            Severity::Fail | Severity::Warning => {
                warn!(job = %id, %previous, %current, "job severity changed")
            }
            Severity::Ok | Severity::Unknown => {
                info!(job = %id, %previous, %current, "job severity changed")
            }
        }
    }

    fn job_info(&mut self, job: &JobRecord) {
        info!(
            job = %job.id,
            host = job.host.as_deref().unwrap_or("-"),
            user = job.user.as_deref().unwrap_or("-"),
            command = job.command.as_deref().unwrap_or("-"),
            label = job.external_job_id.as_deref().unwrap_or("-"),
            "job details"
        );
    }

    fn services_updated(&mut self, services: &ServiceStatus) {
        for (name, up) in services.iter() {
            if up {
                debug!(service = name, "service up");
            } else {
                warn!(service = name, "service down");
            }
        }
    }

    fn refreshed(&mut self) {
        debug!("status refreshed");
    }

    fn refresh_failed(&mut self, err: &TransportError) {
        warn!(error = %err, "manual refresh failed");
    }
}

/// Logs indicator swaps and connection transitions.
#[derive(Default)]
pub struct ConsoleIndicator;

impl Indicator for ConsoleIndicator {
    fn show(&mut self, state: IndicatorState) {
        match state {
            IndicatorState::Normal => info!(icon = state.resource(), "fleet ok"),
            _ => warn!(?state, icon = state.resource(), "fleet indicator changed"),
        }
    }

    fn connection_changed(&mut self, state: ConnectionState) {
        match state {
            ConnectionState::Connected => info!("connected to status stream"),
            ConnectionState::RetryScheduled => info!("reconnecting to status stream"),
            ConnectionState::Disconnected => warn!("disconnected from status stream"),
        }
    }
}
