//! # Cadence policy for render loops.
//!
//! [`CadencePolicy`] decides how long a render loop sleeps between cycles.
//! It is parameterized by:
//! - [`CadencePolicy::min_sleep`] the floor applied after a successful cycle;
//! - [`CadencePolicy::retry_delay`] the fixed delay after a failed cycle.
//!
//! After a success the loop aims to start its next render one refresh period
//! after the previous one started, so the sleep is the refresh period minus
//! the time the render itself took, floored at `min_sleep`. After a failure the
//! loop retries after `retry_delay`, independent of the refresh period.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use slotvisor::{CadencePolicy, CycleOutcome};
//!
//! let cadence = CadencePolicy {
//!     min_sleep: Duration::from_millis(100),
//!     retry_delay: Duration::from_secs(5),
//! };
//! let refresh = Duration::from_secs(10);
//!
//! // Render took 2s of a 10s period.
//! assert_eq!(
//!     cadence.next_sleep(CycleOutcome::Succeeded, refresh, Duration::from_secs(2)),
//!     Duration::from_secs(8)
//! );
//!
//! // Render overran the period: never negative, never a busy loop.
//! assert_eq!(
//!     cadence.next_sleep(CycleOutcome::Succeeded, refresh, Duration::from_secs(12)),
//!     Duration::from_millis(100)
//! );
//!
//! // Failures retry promptly.
//! assert_eq!(
//!     cadence.next_sleep(CycleOutcome::Failed, refresh, Duration::from_secs(1)),
//!     Duration::from_secs(5)
//! );
//! ```

use std::time::Duration;

/// How a render cycle ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The artifact was rendered and published.
    Succeeded,
    /// Rendering or publishing failed; the slot was cleared.
    Failed,
}

/// Sleep policy shared by every render loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CadencePolicy {
    /// Minimum sleep after a successful cycle.
    pub min_sleep: Duration,
    /// Sleep after a failed cycle.
    pub retry_delay: Duration,
}

impl Default for CadencePolicy {
    /// Returns a policy with:
    /// - `min_sleep = 100ms`;
    /// - `retry_delay = 5s`.
    fn default() -> Self {
        Self {
            min_sleep: Duration::from_millis(100),
            retry_delay: Duration::from_secs(5),
        }
    }
}

impl CadencePolicy {
    /// Computes the sleep before the next cycle.
    ///
    /// - `Succeeded` → `max(min_sleep, refresh - elapsed)` (saturating)
    /// - `Failed` → `retry_delay`
    pub fn next_sleep(
        &self,
        outcome: CycleOutcome,
        refresh: Duration,
        elapsed: Duration,
    ) -> Duration {
        match outcome {
            CycleOutcome::Succeeded => refresh.saturating_sub(elapsed).max(self.min_sleep),
            CycleOutcome::Failed => self.retry_delay,
        }
    }
}
