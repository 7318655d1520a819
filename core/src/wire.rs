//! Wire format of the crab status stream.
//!
//! The server is authoritative for cursor advancement: every response
//! carries `startid`, `warnid` and `finishid`, and the client requests the
//! next batch with exactly those values instead of counting events itself.

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::warn;

use crate::job::JobId;
use crate::status::StatusCode;

/// Position of the client in the server's three event streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Cursors {
    /// Last job-start event seen.
    pub start: u64,
    /// Last warning/alarm event seen.
    pub warn: u64,
    /// Last job-finish event seen.
    pub finish: u64,
}

impl Cursors {
    /// The origin; a request with these cursors returns a full snapshot.
    pub const ZERO: Self = Self { start: 0, warn: 0, finish: 0 };

    /// Build a cursor set.
    pub fn new(start: u64, warn: u64, finish: u64) -> Self {
        Self { start, warn, finish }
    }

    /// Adopt server-reported positions without ever moving backwards.
    ///
    /// Returns false if the server reported a lower value for any stream
    /// (that stream keeps its current position).
    pub fn advance(&mut self, reported: Cursors) -> bool {
        let regressed = reported.start < self.start
            || reported.warn < self.warn
            || reported.finish < self.finish;
        self.start = self.start.max(reported.start);
        self.warn = self.warn.max(reported.warn);
        self.finish = self.finish.max(reported.finish);
        !regressed
    }
}

/// Health of the server-side services, in the order the server lists them.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceStatus(IndexMap<String, bool>);

impl ServiceStatus {
    /// True if every service is up (vacuously true when none are reported).
    pub fn all_healthy(&self) -> bool {
        self.0.values().all(|up| *up)
    }

    /// Iterate `(service, healthy)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, bool)> {
        self.0.iter().map(|(name, up)| (name.as_str(), *up))
    }

    /// Number of services reported.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if no services were reported.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, bool)> for ServiceStatus {
    fn from_iter<I: IntoIterator<Item = (String, bool)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Changed fields of one job. Absent fields are left untouched on merge.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct JobDelta {
    /// `None`: not reported. `Some(None)`: explicitly unknown.
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub status: Option<Option<StatusCode>>,
    /// Whether a run is in progress.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub running: Option<bool>,
    /// Raw success percentage; clamped on merge.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reliability: Option<i64>,
    /// Whether the server knows the job's schedule.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled: Option<bool>,
}

// Distinguishes an explicit `null` from a missing key.
fn present<'de, D, T>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(de).map(Some)
}

/// Body of a `jobstatus` response.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Jobs changed since the requested cursors (all jobs for a snapshot).
    #[serde(default)]
    pub status: IndexMap<JobId, JobDelta>,
    /// Service health map.
    #[serde(default)]
    pub service: ServiceStatus,
    /// Number of jobs currently in a failure state.
    #[serde(default)]
    pub numerror: u64,
    /// Number of jobs currently in a warning state.
    #[serde(default)]
    pub numwarning: u64,
    /// Server's latest start event id.
    pub startid: u64,
    /// Server's latest warning event id.
    pub warnid: u64,
    /// Server's latest finish event id.
    pub finishid: u64,
}

impl StatusResponse {
    /// Cursor positions the next request should use.
    pub fn cursors(&self) -> Cursors {
        Cursors::new(self.startid, self.warnid, self.finishid)
    }
}

/// Advance `current` to the server-reported cursors of `resp`, logging regressions.
pub fn adopt_cursors(current: &mut Cursors, resp: &StatusResponse) {
    let reported = resp.cursors();
    if !current.advance(reported) {
        warn!(?reported, kept = ?*current, "server reported cursor regression");
    }
}
