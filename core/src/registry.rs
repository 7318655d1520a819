use indexmap::IndexMap;

use crate::job::{JobId, JobInfo, JobRecord, Reliability};
use crate::status::Severity;
use crate::wire::JobDelta;

/// Outcome of merging one delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Applied {
    /// The job was not known before this delta.
    pub created: bool,
    /// Severity before the merge (`Unknown` for a new job).
    pub previous: Severity,
    /// Severity after the merge.
    pub current: Severity,
}

impl Applied {
    /// True if an already-known job changed severity.
    pub fn severity_changed(&self) -> bool {
        !self.created && self.previous != self.current
    }
}

/// In-memory set of known jobs, in first-sighting order.
///
/// Records are only ever created or updated; removal is left to a full
/// reload of whatever renders them.
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: IndexMap<JobId, JobRecord>,
}

impl JobRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// True if `id` has been seen.
    pub fn has(&self, id: &JobId) -> bool {
        self.jobs.contains_key(id)
    }

    /// Record for `id`, if known.
    pub fn get(&self, id: &JobId) -> Option<&JobRecord> {
        self.jobs.get(id)
    }

    /// Field-wise last-write-wins merge of `delta` into the record for `id`.
    ///
    /// Applying the same delta twice leaves the record as after the first.
    pub fn apply_delta(&mut self, id: &JobId, delta: &JobDelta) -> Applied {
        let created = !self.jobs.contains_key(id);
        let record = self
            .jobs
            .entry(id.clone())
            .or_insert_with(|| JobRecord::new(id.clone()));
        let previous = record.severity();

        if let Some(status) = delta.status {
            record.status = status;
        }
        if let Some(running) = delta.running {
            record.running = running;
        }
        if let Some(raw) = delta.reliability {
            record.reliability = Reliability::clamped(raw);
        }
        if let Some(scheduled) = delta.scheduled {
            record.scheduled = scheduled;
        }

        Applied { created, previous, current: record.severity() }
    }

    /// Fill in descriptive details. Returns false if the job is unknown.
    pub fn apply_info(&mut self, info: JobInfo) -> bool {
        let Some(record) = self.jobs.get_mut(&info.id) else {
            return false;
        };
        record.host = info.host;
        record.user = info.user;
        record.command = info.command;
        record.external_job_id = info.external_job_id;
        true
    }

    /// Read-only view of all records in first-sighting order.
    pub fn snapshot(&self) -> impl Iterator<Item = &JobRecord> {
        self.jobs.values()
    }

    /// Number of known jobs.
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// True if no job has been seen yet.
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::StatusCode;

    fn delta(status: i64) -> JobDelta {
        JobDelta {
            status: Some(Some(StatusCode(status))),
            running: Some(false),
            reliability: Some(80),
            scheduled: Some(true),
        }
    }

    #[test]
    fn first_sighting_creates_record() {
        let mut reg = JobRegistry::new();
        let id = JobId::from("7");
        assert!(!reg.has(&id));

        let applied = reg.apply_delta(&id, &delta(1));
        assert!(applied.created);
        assert!(!applied.severity_changed());
        assert_eq!(applied.current, Severity::Fail);
        assert!(reg.has(&id));

        let again = reg.apply_delta(&id, &delta(1));
        assert!(!again.created);
    }

    #[test]
    fn apply_is_idempotent() {
        let id = JobId::from("3");
        let d = delta(5);

        let mut once = JobRegistry::new();
        once.apply_delta(&id, &d);

        let mut twice = JobRegistry::new();
        twice.apply_delta(&id, &d);
        let second = twice.apply_delta(&id, &d);

        assert_eq!(once.get(&id), twice.get(&id));
        assert!(!second.severity_changed());
    }

    #[test]
    fn omitted_fields_are_untouched() {
        let mut reg = JobRegistry::new();
        let id = JobId::from("1");
        reg.apply_delta(&id, &delta(0));

        reg.apply_delta(&id, &JobDelta { running: Some(true), ..JobDelta::default() });
        let rec = reg.get(&id).unwrap();
        assert!(rec.running);
        assert_eq!(rec.status, Some(StatusCode::SUCCESS));
        assert_eq!(rec.reliability.percent(), 80);
    }

    #[test]
    fn explicit_null_resets_status() {
        let mut reg = JobRegistry::new();
        let id = JobId::from("1");
        reg.apply_delta(&id, &delta(1));

        let applied = reg.apply_delta(&id, &JobDelta { status: Some(None), ..JobDelta::default() });
        assert_eq!(applied.previous, Severity::Fail);
        assert_eq!(applied.current, Severity::Unknown);
        assert!(applied.severity_changed());
    }

    #[test]
    fn reliability_is_clamped_on_merge() {
        let mut reg = JobRegistry::new();
        let id = JobId::from("1");
        reg.apply_delta(&id, &JobDelta { reliability: Some(135), ..JobDelta::default() });
        assert_eq!(reg.get(&id).unwrap().reliability.percent(), 100);
        reg.apply_delta(&id, &JobDelta { reliability: Some(-5), ..JobDelta::default() });
        assert_eq!(reg.get(&id).unwrap().reliability.percent(), 0);
    }

    #[test]
    fn info_only_applies_to_known_jobs() {
        let mut reg = JobRegistry::new();
        let info = JobInfo {
            id: JobId::from("4"),
            host: Some("h".into()),
            user: Some("u".into()),
            command: Some("run".into()),
            external_job_id: None,
        };
        assert!(!reg.apply_info(info.clone()));
        assert!(reg.is_empty());

        reg.apply_delta(&info.id, &delta(0));
        assert!(reg.apply_info(info.clone()));
        assert_eq!(reg.get(&info.id).unwrap().host.as_deref(), Some("h"));
    }

    #[test]
    fn snapshot_keeps_first_sighting_order() {
        let mut reg = JobRegistry::new();
        for id in ["10", "2", "7"] {
            reg.apply_delta(&JobId::from(id), &delta(0));
        }
        reg.apply_delta(&JobId::from("2"), &delta(1));
        let ids: Vec<_> = reg.snapshot().map(|r| r.id.as_str().to_string()).collect();
        assert_eq!(ids, ["10", "2", "7"]);
        assert_eq!(reg.len(), 3);
    }
}
