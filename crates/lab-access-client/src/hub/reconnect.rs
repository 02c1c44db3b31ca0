//! Fixed reconnect schedule.
//!
//! After an established connection is lost, attempt `n` (0-based) waits
//! `delays[n]` before reconnecting. The schedule is a plain lookup table:
//! there is no backoff growth and no jitter. Once the table is exhausted
//! the connection is closed for good.

use std::time::Duration;

use crate::config::DEFAULT_RECONNECT_DELAYS_MS;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectSchedule {
    delays: Vec<Duration>,
}

impl Default for ReconnectSchedule {
    fn default() -> Self {
        Self::from_millis(&DEFAULT_RECONNECT_DELAYS_MS)
    }
}

impl ReconnectSchedule {
    pub fn from_millis(delays_ms: &[u64]) -> Self {
        Self {
            delays: delays_ms.iter().copied().map(Duration::from_millis).collect(),
        }
    }

    /// An empty schedule: a lost connection closes immediately.
    pub fn disabled() -> Self {
        Self { delays: Vec::new() }
    }

    /// Delay before the attempt that follows `previous_attempts` failed
    /// ones, or `None` when the schedule is exhausted.
    pub fn next_delay(&self, previous_attempts: u32) -> Option<Duration> {
        usize::try_from(previous_attempts)
            .ok()
            .and_then(|i| self.delays.get(i))
            .copied()
    }

    pub fn max_attempts(&self) -> u32 {
        u32::try_from(self.delays.len()).unwrap_or(u32::MAX)
    }

    pub fn delays(&self) -> &[Duration] {
        &self.delays
    }
}
