//! Scheduling policies.
//!
//! This module groups the knobs that control **how long** a render loop waits
//! between cycles.
//!
//! ## Contents
//! - [`CadencePolicy`] refresh-aligned sleep after success, fixed retry delay after failure
//! - [`CycleOutcome`]  how the last cycle ended
//!
//! ## Quick wiring
//! ```text
//! Config { min_sleep, retry_delay } ──► Config::cadence() ──► CadencePolicy
//!      └─► core::RenderLoop uses:
//!           - cadence.next_sleep(outcome, refresh_rate, elapsed) after every cycle
//! ```
//!
//! ## Defaults
//! - `CadencePolicy::default()` → min_sleep=100ms, retry_delay=5s.

mod cadence;

pub use cadence::{CadencePolicy, CycleOutcome};
