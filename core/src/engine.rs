//! The status synchronization state machine.
//!
//! [`SyncLoop`] never performs I/O. Each entry point consumes the outcome
//! of a request and returns the [`Effect`]s the driver must carry out
//! next, which keeps the single-writer merge step free of locks and lets
//! every transition be exercised synchronously.

use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::job::{JobId, JobInfo, JobRecord};
use crate::reconnect::ReconnectPolicy;
use crate::registry::JobRegistry;
use crate::transport::TransportError;
use crate::view::{ConnectionState, Indicator, IndicatorState, Presenter};
use crate::wire::{adopt_cursors, Cursors, ServiceStatus, StatusResponse};

/// Work the driver must perform on behalf of the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Issue the next long-poll with these cursors.
    Poll(Cursors),
    /// Call [`SyncLoop::retry_fired`] once this delay has elapsed.
    ScheduleRetry(Duration),
    /// Fetch job info for a newly discovered job.
    FetchInfo(JobId),
}

/// Where the long-poll stream currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Not started.
    Idle,
    /// A long-poll is in flight.
    Polling,
    /// The last long-poll failed; a retry is pending.
    Backoff,
}

/// Serializable view of the whole dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    /// Stream phase.
    pub phase: Phase,
    /// Connection state.
    pub connection: ConnectionState,
    /// Indicator currently shown, if any response has been applied.
    pub indicator: Option<IndicatorState>,
    /// Cursors the next long-poll will use.
    pub cursors: Cursors,
    /// Consecutive long-poll failures.
    pub failures: u64,
    /// Service health from the last applied response.
    pub services: ServiceStatus,
    /// Server-reported number of failing jobs.
    pub num_error: u64,
    /// Server-reported number of jobs in a warning state.
    pub num_warning: u64,
    /// All known jobs in first-sighting order.
    pub jobs: Vec<JobRecord>,
}

/// Long-poll client state: cursors, registry and connection health.
pub struct SyncLoop<P, I> {
    registry: JobRegistry,
    cursors: Cursors,
    policy: ReconnectPolicy,
    phase: Phase,
    services: ServiceStatus,
    num_error: u64,
    num_warning: u64,
    shown: Option<IndicatorState>,
    presenter: P,
    indicator: I,
}

impl<P: Presenter, I: Indicator> SyncLoop<P, I> {
    /// Idle engine rendering through `presenter` and `indicator`.
    pub fn new(policy: ReconnectPolicy, presenter: P, indicator: I) -> Self {
        Self {
            registry: JobRegistry::new(),
            cursors: Cursors::ZERO,
            policy,
            phase: Phase::Idle,
            services: ServiceStatus::default(),
            num_error: 0,
            num_warning: 0,
            shown: None,
            presenter,
            indicator,
        }
    }

    /// Cursors of the last applied long-poll response.
    pub fn cursors(&self) -> Cursors {
        self.cursors
    }

    /// Current stream phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Current connection state.
    pub fn connection(&self) -> ConnectionState {
        self.policy.state()
    }

    /// Known jobs.
    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    /// The presenter the engine renders through.
    pub fn presenter(&self) -> &P {
        &self.presenter
    }

    /// The indicator the engine renders through.
    pub fn indicator(&self) -> &I {
        &self.indicator
    }

    /// Begin streaming from the origin. No-op once started.
    pub fn start(&mut self) -> Vec<Effect> {
        if self.phase != Phase::Idle {
            return Vec::new();
        }
        info!("starting status stream");
        self.phase = Phase::Polling;
        vec![Effect::Poll(self.cursors)]
    }

    /// Apply a long-poll response and request the next one.
    pub fn poll_succeeded(&mut self, resp: StatusResponse) -> Vec<Effect> {
        if self.phase != Phase::Polling {
            warn!(phase = ?self.phase, "ignoring long-poll response outside polling phase");
            return Vec::new();
        }
        if self.policy.on_success() {
            info!("status stream reconnected");
            self.indicator.connection_changed(ConnectionState::Connected);
        }

        let mut effects = Vec::new();
        self.merge(&resp, &mut effects);
        adopt_cursors(&mut self.cursors, &resp);
        debug!(cursors = ?self.cursors, jobs = resp.status.len(), "applied stream delta");

        self.update_indicator();
        effects.push(Effect::Poll(self.cursors));
        effects
    }

    /// The long-poll failed: keep cursors and registry, schedule one retry.
    pub fn poll_failed(&mut self, err: &TransportError) -> Vec<Effect> {
        if self.phase != Phase::Polling {
            warn!(phase = ?self.phase, error = %err, "ignoring long-poll failure outside polling phase");
            return Vec::new();
        }
        let delay = self.policy.on_failure();
        warn!(
            error = %err,
            retry_in_ms = delay.as_millis() as u64,
            failures = self.policy.failures(),
            "status stream lost"
        );
        self.phase = Phase::Backoff;
        self.indicator.connection_changed(ConnectionState::Disconnected);
        self.update_indicator();
        vec![Effect::ScheduleRetry(delay)]
    }

    /// The backoff elapsed: resume from the last applied cursors.
    pub fn retry_fired(&mut self) -> Vec<Effect> {
        if self.phase != Phase::Backoff {
            return Vec::new();
        }
        self.policy.on_retry();
        self.phase = Phase::Polling;
        info!(cursors = ?self.cursors, "retrying status stream");
        self.indicator.connection_changed(ConnectionState::RetryScheduled);
        vec![Effect::Poll(self.cursors)]
    }

    /// Merge a manual full snapshot. Cursors, phase and connection are untouched.
    pub fn refresh_succeeded(&mut self, resp: StatusResponse) -> Vec<Effect> {
        let mut effects = Vec::new();
        self.merge(&resp, &mut effects);
        debug!(jobs = resp.status.len(), "applied manual refresh");
        self.update_indicator();
        effects
    }

    /// A manual refresh failed; only the presenter hears about it.
    pub fn refresh_failed(&mut self, err: &TransportError) {
        warn!(error = %err, "failed to fetch status from server");
        self.presenter.refresh_failed(err);
    }

    /// Store job info fetched for a newly discovered job.
    pub fn info_received(&mut self, info: JobInfo) {
        let id = info.id.clone();
        if !self.registry.apply_info(info) {
            debug!(job = %id, "job info for unknown job");
            return;
        }
        if let Some(record) = self.registry.get(&id) {
            self.presenter.job_info(record);
        }
    }

    /// Job info could not be fetched; it is not retried.
    pub fn info_failed(&mut self, id: &JobId, err: &TransportError) {
        warn!(job = %id, error = %err, "job info fetch failed");
    }

    /// Snapshot of everything a status view needs.
    pub fn dashboard(&self) -> Dashboard {
        Dashboard {
            phase: self.phase,
            connection: self.policy.state(),
            indicator: self.shown,
            cursors: self.cursors,
            failures: self.policy.failures(),
            services: self.services.clone(),
            num_error: self.num_error,
            num_warning: self.num_warning,
            jobs: self.registry.snapshot().cloned().collect(),
        }
    }

    fn merge(&mut self, resp: &StatusResponse, effects: &mut Vec<Effect>) {
        for (id, delta) in &resp.status {
            let applied = self.registry.apply_delta(id, delta);
            let Some(record) = self.registry.get(id) else { continue };
            if applied.created {
                self.presenter.job_added(record);
                effects.push(Effect::FetchInfo(id.clone()));
            } else {
                self.presenter.job_updated(record);
            }
            if applied.severity_changed() {
                self.presenter.severity_changed(id, applied.previous, applied.current);
            }
        }

        self.services = resp.service.clone();
        self.presenter.services_updated(&self.services);
        self.num_error = resp.numerror;
        self.num_warning = resp.numwarning;
        self.presenter.refreshed();
    }

    fn update_indicator(&mut self) {
        let next = IndicatorState::select(
            self.policy.state(),
            &self.services,
            self.num_error,
            self.num_warning,
        );
        if self.shown != Some(next) {
            self.shown = Some(next);
            self.indicator.show(next);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::Severity;
    use serde_json::json;

    #[derive(Default)]
    struct Recorder {
        added: Vec<JobId>,
        updated: usize,
        severity: Vec<(JobId, Severity, Severity)>,
        info: Vec<JobId>,
        refreshes: usize,
        refresh_failures: usize,
    }

    impl Presenter for Recorder {
        fn job_added(&mut self, job: &JobRecord) {
            self.added.push(job.id.clone());
        }
        fn job_updated(&mut self, _job: &JobRecord) {
            self.updated += 1;
        }
        fn severity_changed(&mut self, id: &JobId, previous: Severity, current: Severity) {
            self.severity.push((id.clone(), previous, current));
        }
        fn job_info(&mut self, job: &JobRecord) {
            self.info.push(job.id.clone());
        }
        fn services_updated(&mut self, _services: &ServiceStatus) {}
        fn refreshed(&mut self) {
            self.refreshes += 1;
        }
        fn refresh_failed(&mut self, _err: &TransportError) {
            self.refresh_failures += 1;
        }
    }

    #[derive(Default)]
    struct Lamp {
        shown: Vec<IndicatorState>,
        connection: Vec<ConnectionState>,
    }

    impl Indicator for Lamp {
        fn show(&mut self, state: IndicatorState) {
            self.shown.push(state);
        }
        fn connection_changed(&mut self, state: ConnectionState) {
            self.connection.push(state);
        }
    }

    fn engine() -> SyncLoop<Recorder, Lamp> {
        SyncLoop::new(ReconnectPolicy::default(), Recorder::default(), Lamp::default())
    }

    fn response(value: serde_json::Value) -> StatusResponse {
        serde_json::from_value(value).unwrap()
    }

    fn job7_failed() -> StatusResponse {
        response(json!({
            "status": {"7": {"status": 1, "running": false, "reliability": 80, "scheduled": true}},
            "service": {"cron": true},
            "numerror": 1, "numwarning": 0,
            "startid": 5, "warnid": 2, "finishid": 9
        }))
    }

    fn job9(status: i64, startid: u64) -> StatusResponse {
        response(json!({
            "status": {"9": {"status": status, "running": false, "reliability": 100, "scheduled": true}},
            "service": {"cron": true},
            "numerror": 0, "numwarning": 0,
            "startid": startid, "warnid": 0, "finishid": startid
        }))
    }

    #[test]
    fn start_polls_from_origin_once() {
        let mut e = engine();
        assert_eq!(e.start(), vec![Effect::Poll(Cursors::ZERO)]);
        assert!(e.start().is_empty());
        assert_eq!(e.phase(), Phase::Polling);
    }

    #[test]
    fn applies_delta_and_follows_server_cursors() {
        let mut e = engine();
        e.start();
        let effects = e.poll_succeeded(job7_failed());

        assert_eq!(
            effects,
            vec![Effect::FetchInfo(JobId::from("7")), Effect::Poll(Cursors::new(5, 2, 9))]
        );
        let job = e.registry().get(&JobId::from("7")).unwrap();
        assert_eq!(job.severity(), Severity::Fail);
        assert_eq!(job.reliability.percent(), 80);
        assert_eq!(e.indicator().shown, vec![IndicatorState::Error]);
        assert_eq!(e.presenter().added, vec![JobId::from("7")]);
        assert_eq!(e.cursors(), Cursors::new(5, 2, 9));
    }

    #[test]
    fn timeout_disconnects_and_schedules_one_retry() {
        let mut e = engine();
        e.start();
        e.poll_succeeded(job7_failed());

        let effects = e.poll_failed(&TransportError::Timeout);
        assert_eq!(effects, vec![Effect::ScheduleRetry(Duration::from_secs(600))]);
        assert_eq!(e.connection(), ConnectionState::Disconnected);
        assert_eq!(e.indicator().shown.last(), Some(&IndicatorState::Disconnected));
        assert_eq!(e.indicator().connection, vec![ConnectionState::Disconnected]);
        assert_eq!(e.cursors(), Cursors::new(5, 2, 9));
        assert!(e.registry().has(&JobId::from("7")));

        // Nothing else is issued until the retry fires.
        assert!(e.poll_failed(&TransportError::Status(502)).is_empty());
        assert!(e.poll_succeeded(job7_failed()).is_empty());

        assert_eq!(e.retry_fired(), vec![Effect::Poll(Cursors::new(5, 2, 9))]);
        assert_eq!(e.connection(), ConnectionState::RetryScheduled);
        assert!(e.retry_fired().is_empty());
    }

    #[test]
    fn successful_retry_reconnects() {
        let mut e = engine();
        e.start();
        e.poll_failed(&TransportError::Network("refused".into()));
        e.retry_fired();
        e.poll_succeeded(job9(0, 3));

        assert_eq!(e.connection(), ConnectionState::Connected);
        assert_eq!(
            e.indicator().connection,
            vec![
                ConnectionState::Disconnected,
                ConnectionState::RetryScheduled,
                ConnectionState::Connected
            ]
        );
        assert_eq!(
            e.indicator().shown,
            vec![IndicatorState::Disconnected, IndicatorState::Normal]
        );
        assert_eq!(e.dashboard().failures, 0);
    }

    #[test]
    fn severity_notifications_fire_per_transition() {
        let mut e = engine();
        e.start();
        e.poll_succeeded(job9(0, 1));
        e.poll_succeeded(job9(5, 2));
        e.poll_succeeded(job9(0, 3));
        e.poll_succeeded(job9(0, 4));

        let id = JobId::from("9");
        assert_eq!(
            e.presenter().severity,
            vec![
                (id.clone(), Severity::Ok, Severity::Warning),
                (id, Severity::Warning, Severity::Ok)
            ]
        );
    }

    #[test]
    fn replaying_a_response_is_harmless() {
        let mut e = engine();
        e.start();
        e.poll_succeeded(job7_failed());
        let before = e.registry().get(&JobId::from("7")).cloned();

        let effects = e.poll_succeeded(job7_failed());
        assert_eq!(effects, vec![Effect::Poll(Cursors::new(5, 2, 9))]);
        assert!(e.presenter().severity.is_empty());
        assert_eq!(e.presenter().updated, 1);
        assert_eq!(e.registry().get(&JobId::from("7")).cloned(), before);
        assert_eq!(e.indicator().shown, vec![IndicatorState::Error]);
    }

    #[test]
    fn cursors_are_monotonic_across_polls() {
        let mut e = engine();
        e.start();
        let mut last = e.cursors();
        for startid in [3, 8, 2, 8, 11] {
            e.poll_succeeded(job9(0, startid));
            let now = e.cursors();
            assert!(now.start >= last.start && now.warn >= last.warn && now.finish >= last.finish);
            last = now;
        }
        assert_eq!(last, Cursors::new(11, 0, 11));
    }

    #[test]
    fn manual_refresh_leaves_stream_state_alone() {
        let mut e = engine();
        e.start();
        e.poll_succeeded(job9(0, 4));

        let snapshot = response(json!({
            "status": {"9": {"status": 0}, "12": {"status": 5, "running": true}},
            "service": {"cron": true},
            "numerror": 0, "numwarning": 1,
            "startid": 40, "warnid": 40, "finishid": 40
        }));
        let effects = e.refresh_succeeded(snapshot);

        assert_eq!(effects, vec![Effect::FetchInfo(JobId::from("12"))]);
        assert_eq!(e.cursors(), Cursors::new(4, 0, 4));
        assert_eq!(e.phase(), Phase::Polling);
        assert_eq!(e.registry().len(), 2);
        assert_eq!(e.presenter().refreshes, 2);
        assert_eq!(e.indicator().shown.last(), Some(&IndicatorState::Warning));
    }

    #[test]
    fn refresh_while_disconnected_keeps_disconnected_indicator() {
        let mut e = engine();
        e.start();
        e.poll_failed(&TransportError::Timeout);
        e.refresh_succeeded(job7_failed());

        assert_eq!(e.connection(), ConnectionState::Disconnected);
        assert_eq!(e.phase(), Phase::Backoff);
        assert_eq!(e.indicator().shown, vec![IndicatorState::Disconnected]);
        assert!(e.registry().has(&JobId::from("7")));
    }

    #[test]
    fn refresh_during_retry_keeps_disconnected_indicator() {
        let mut e = engine();
        e.start();
        e.poll_failed(&TransportError::Timeout);
        e.retry_fired();
        e.refresh_succeeded(job9(0, 3));

        assert_eq!(e.connection(), ConnectionState::RetryScheduled);
        assert_eq!(e.indicator().shown, vec![IndicatorState::Disconnected]);

        e.poll_succeeded(job9(0, 3));
        assert_eq!(
            e.indicator().shown,
            vec![IndicatorState::Disconnected, IndicatorState::Normal]
        );
    }

    #[test]
    fn refresh_failure_goes_to_presenter_only() {
        let mut e = engine();
        e.start();
        e.refresh_failed(&TransportError::Status(500));
        assert_eq!(e.presenter().refresh_failures, 1);
        assert_eq!(e.connection(), ConnectionState::Connected);
        assert_eq!(e.phase(), Phase::Polling);
    }

    #[test]
    fn info_fills_in_known_jobs() {
        let mut e = engine();
        e.start();
        e.poll_succeeded(job7_failed());
        e.info_received(JobInfo {
            id: JobId::from("7"),
            host: Some("batch01".into()),
            user: Some("ops".into()),
            command: Some("rsync -a /src /dst".into()),
            external_job_id: Some("sync".into()),
        });
        e.info_received(JobInfo {
            id: JobId::from("99"),
            host: None,
            user: None,
            command: None,
            external_job_id: None,
        });

        assert_eq!(e.presenter().info, vec![JobId::from("7")]);
        let dash = e.dashboard();
        assert_eq!(dash.jobs.len(), 1);
        assert_eq!(dash.jobs[0].host.as_deref(), Some("batch01"));
    }
}
