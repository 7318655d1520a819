use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Numeric job status as reported by the crab server.
///
/// Negative values are monitor meta-states (late, missed, timed out,
/// cleared); non-negative values are outcomes reported by the job itself.
/// Every `i64` is a valid `StatusCode`: values outside the known set are
/// carried through untouched and classified as failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusCode(pub i64);

impl StatusCode {
    /// The job finished successfully.
    pub const SUCCESS: Self = Self(0);
    /// The job finished with a failure.
    pub const FAIL: Self = Self(1);
    /// The job finished but its outcome could not be determined.
    pub const UNKNOWN: Self = Self(2);
    /// The job's command could not be launched.
    pub const COULD_NOT_START: Self = Self(3);
    /// A start was skipped because the job was already running.
    pub const ALREADY_RUNNING: Self = Self(4);
    /// The job finished with a warning.
    pub const WARNING: Self = Self(5);
    /// The job finished without producing output it was expected to.
    pub const EMPTY: Self = Self(6);
    /// The run was inhibited by configuration.
    pub const INHIBITED: Self = Self(7);
    /// The job started later than its schedule allows.
    pub const LATE: Self = Self(-1);
    /// The job did not start at all within its schedule window.
    pub const MISSED: Self = Self(-2);
    /// The job ran past its timeout.
    pub const TIMEOUT: Self = Self(-3);
    /// An earlier failure was cleared by the operator.
    pub const CLEARED: Self = Self(-4);

    /// All codes with a dedicated name, in display order.
    pub const KNOWN: [Self; 12] = [
        Self::SUCCESS,
        Self::FAIL,
        Self::UNKNOWN,
        Self::COULD_NOT_START,
        Self::ALREADY_RUNNING,
        Self::WARNING,
        Self::EMPTY,
        Self::INHIBITED,
        Self::LATE,
        Self::MISSED,
        Self::TIMEOUT,
        Self::CLEARED,
    ];

    /// Display name; unrecognized codes render as `"Status N"`.
    pub fn name(self) -> Cow<'static, str> {
        let known = match self.0 {
            0 => "Succeeded",
            1 => "Failed",
            2 => "Unknown",
            3 => "Could not start",
            4 => "Already running",
            5 => "Warning",
            6 => "Empty",
            7 => "Inhibited",
            -1 => "Late",
            -2 => "Missed",
            -3 => "Timeout",
            -4 => "Cleared",
            n => return Cow::Owned(format!("Status {n}")),
        };
        Cow::Borrowed(known)
    }

    /// True if the code counts as a healthy outcome.
    pub fn is_ok(self) -> bool {
        matches!(
            self,
            Self::SUCCESS | Self::ALREADY_RUNNING | Self::INHIBITED | Self::LATE | Self::CLEARED
        )
    }

    /// True if the code is worth attention but not a failure.
    pub fn is_warning(self) -> bool {
        matches!(self, Self::UNKNOWN | Self::WARNING | Self::EMPTY | Self::MISSED)
    }

    /// Severity class; anything neither ok nor warning is a failure.
    pub fn severity(self) -> Severity {
        if self.is_ok() {
            Severity::Ok
        } else if self.is_warning() {
            Severity::Warning
        } else {
            Severity::Fail
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.name())
    }
}

/// Visual/aggregation class of a job's status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Healthy.
    Ok,
    /// Needs attention.
    Warning,
    /// Failed.
    Fail,
    /// No status has been reported yet.
    Unknown,
}

impl Severity {
    /// Severity of an optional status; an unset status is [`Severity::Unknown`].
    pub fn of(status: Option<StatusCode>) -> Self {
        status.map_or(Severity::Unknown, StatusCode::severity)
    }

    /// Short lowercase label (`ok`, `warning`, `fail`, `unknown`).
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Ok => "ok",
            Severity::Warning => "warning",
            Severity::Fail => "fail",
            Severity::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_names() {
        assert_eq!(StatusCode::FAIL.name(), "Failed");
        assert_eq!(StatusCode::LATE.name(), "Late");
        assert_eq!(StatusCode::COULD_NOT_START.name(), "Could not start");
    }

    #[test]
    fn unknown_codes_fall_back_to_generic_failure() {
        for n in [42, 8, -5, i64::MAX, i64::MIN] {
            let code = StatusCode(n);
            assert_eq!(code.name(), format!("Status {n}"));
            assert!(!code.is_ok());
            assert!(!code.is_warning());
            assert_eq!(code.severity(), Severity::Fail);
        }
    }

    #[test]
    fn classification() {
        assert_eq!(StatusCode::SUCCESS.severity(), Severity::Ok);
        assert_eq!(StatusCode::LATE.severity(), Severity::Ok);
        assert_eq!(StatusCode::WARNING.severity(), Severity::Warning);
        assert_eq!(StatusCode::MISSED.severity(), Severity::Warning);
        assert_eq!(StatusCode::FAIL.severity(), Severity::Fail);
        assert_eq!(StatusCode::TIMEOUT.severity(), Severity::Fail);
    }

    #[test]
    fn unset_status_is_unknown_severity() {
        assert_eq!(Severity::of(None), Severity::Unknown);
        assert_eq!(Severity::of(Some(StatusCode::FAIL)), Severity::Fail);
    }

    #[test]
    fn known_table_has_no_generic_names() {
        for code in StatusCode::KNOWN {
            assert!(!code.name().starts_with("Status "), "{code:?}");
        }
    }
}
