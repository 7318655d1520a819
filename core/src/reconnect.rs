use std::time::Duration;

use crate::view::ConnectionState;

/// Default wait before resuming the stream after a failure (10 minutes).
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(600);

/// Decides how long to wait after a failed long-poll and tracks the
/// resulting connection state.
///
/// The delay is fixed: a server that is down is likely to stay down for a
/// while, so the client sheds load instead of retrying quickly.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    delay: Duration,
    state: ConnectionState,
    failures: u64,
}

impl ReconnectPolicy {
    /// Policy with the given fixed reconnect delay; starts `Connected`.
    pub fn new(delay: Duration) -> Self {
        Self { delay, state: ConnectionState::Connected, failures: 0 }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Consecutive failures since the last success.
    pub fn failures(&self) -> u64 {
        self.failures
    }

    /// Configured reconnect delay.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// A long-poll succeeded. Returns true if the state changed.
    pub fn on_success(&mut self) -> bool {
        self.failures = 0;
        self.transition(ConnectionState::Connected)
    }

    /// A long-poll failed. Returns the delay before the single retry.
    pub fn on_failure(&mut self) -> Duration {
        self.failures = self.failures.saturating_add(1);
        self.transition(ConnectionState::Disconnected);
        self.delay
    }

    /// The backoff elapsed and the retry request is being issued.
    pub fn on_retry(&mut self) -> bool {
        self.transition(ConnectionState::RetryScheduled)
    }

    fn transition(&mut self, next: ConnectionState) -> bool {
        let changed = self.state != next;
        self.state = next;
        changed
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_RECONNECT_DELAY)
    }
}
