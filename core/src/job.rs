use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use crate::status::{Severity, StatusCode};

/// Stable identifier of a scheduled job on the crab server.
///
/// The server keys its status map by stringified integers but reports
/// integer ids in job info, so decoding accepts either form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Wrap an identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Identifier as sent on the wire.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<u64> for JobId {
    fn from(n: u64) -> Self {
        Self(n.to_string())
    }
}

impl<'de> Deserialize<'de> for JobId {
    fn deserialize<D: Deserializer<'de>>(de: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Unsigned(u64),
            Signed(i64),
        }
        Ok(match Raw::deserialize(de)? {
            Raw::Text(s) => JobId(s),
            Raw::Unsigned(n) => JobId::from(n),
            Raw::Signed(n) => JobId(n.to_string()),
        })
    }
}

/// Success rate of a job's recent runs, clamped to `0..=100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize)]
#[serde(transparent)]
pub struct Reliability(u8);

impl Reliability {
    /// Clamp an arbitrary server value into a percentage.
    pub fn clamped(raw: i64) -> Self {
        Self(raw.clamp(0, 100) as u8)
    }

    /// Percentage in `0..=100`.
    pub fn percent(self) -> u8 {
        self.0
    }

    /// One full star per 20%, plus a hollow star for a remainder of 10% or more.
    pub fn stars(self) -> String {
        let full = usize::from(self.0 / 20);
        let mut out = "\u{2605}".repeat(full);
        if self.0 % 20 >= 10 {
            out.push('\u{2606}');
        }
        out
    }
}

/// Descriptive job details fetched once per newly discovered job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobInfo {
    /// Job the details belong to.
    pub id: JobId,
    /// Host the job runs on.
    #[serde(default)]
    pub host: Option<String>,
    /// Account the job runs as.
    #[serde(default)]
    pub user: Option<String>,
    /// Command line of the job.
    #[serde(default)]
    pub command: Option<String>,
    /// Operator-assigned job label, if any.
    #[serde(default, rename = "jobid", alias = "externalJobId")]
    pub external_job_id: Option<String>,
}

/// Last-applied state of one job as known to the dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobRecord {
    /// Job identifier.
    pub id: JobId,
    /// Most recent status; `None` until reported.
    pub status: Option<StatusCode>,
    /// Whether a run is in progress.
    pub running: bool,
    /// Recent success rate.
    pub reliability: Reliability,
    /// False if the server does not know the job's schedule.
    pub scheduled: bool,
    /// Host, filled in by the job info fetch.
    pub host: Option<String>,
    /// User, filled in by the job info fetch.
    pub user: Option<String>,
    /// Command, filled in by the job info fetch.
    pub command: Option<String>,
    /// Operator-assigned job label, filled in by the job info fetch.
    pub external_job_id: Option<String>,
}

impl JobRecord {
    /// Fresh record for a job seen for the first time.
    pub fn new(id: JobId) -> Self {
        Self {
            id,
            status: None,
            running: false,
            reliability: Reliability::default(),
            scheduled: true,
            host: None,
            user: None,
            command: None,
            external_job_id: None,
        }
    }

    /// Severity of the current status.
    pub fn severity(&self) -> Severity {
        Severity::of(self.status)
    }

    /// Display name of the current status (`"Unknown"` when unset).
    pub fn status_name(&self) -> String {
        match self.status {
            Some(code) => code.name().into_owned(),
            None => "Unknown".to_string(),
        }
    }
}
