//! # Runtime events emitted by the supervisor and render loops.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Resync events**: generation teardown and rebuild
//! - **Loop lifecycle events**: render loops spawned and stopped
//! - **Cycle events**: one render → publish-or-clear → sleep cycle
//! - **Runtime events**: shutdown and subscriber health
//!
//! The [`Event`] struct carries additional metadata such as timestamps, program
//! name, slot number, generation and delays.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Use `seq` to restore the exact order when events are delivered out of order.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use slotvisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::RenderFailed)
//!     .with_program("clock.star")
//!     .with_slot(2)
//!     .with_reason("exit status: 1")
//!     .with_delay(Duration::from_secs(5));
//!
//! assert_eq!(ev.kind, EventKind::RenderFailed);
//! assert_eq!(ev.program.as_deref(), Some("clock.star"));
//! assert_eq!(ev.slot, Some(2));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(1);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets:
    /// - `program`: subscriber name
    /// - `reason`: panic info/message
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets:
    /// - `program`: subscriber name
    /// - `reason`: reason string (e.g., "full", "closed")
    SubscriberOverflow,

    // === Shutdown events ===
    /// Shutdown requested.
    ShutdownRequested,

    /// All render loops stopped within the configured grace period.
    AllStoppedWithin,

    /// Grace period exceeded; some loops did not stop in time.
    GraceExceeded,

    // === Resync events ===
    /// A resync was requested (manual, watcher or startup).
    ///
    /// Sets:
    /// - `reason`: trigger source
    ResyncRequested,

    /// The executor started a resync.
    ///
    /// Sets:
    /// - `generation`: the generation being built
    /// - `attempt`: number of coalesced requests served by this run
    ResyncStarted,

    /// The resync finished and the new generation is running.
    ///
    /// Sets:
    /// - `generation`: the generation now running
    /// - `attempt`: number of loops spawned
    ResyncCompleted,

    /// The configuration document could not be loaded; the generation runs empty.
    ///
    /// Sets:
    /// - `generation`
    /// - `reason`: load error
    ResyncFailed,

    /// A program entry was rejected at load time.
    ///
    /// Sets:
    /// - `program`: entry name
    /// - `reason`: validation error
    ProgramSkipped,

    /// A slot left over from a larger generation was removed.
    ///
    /// Sets:
    /// - `slot`
    /// - `generation`
    StaleSlotRemoved,

    // === Loop lifecycle events ===
    /// A render loop was spawned and bound to its slot.
    ///
    /// Sets:
    /// - `program`, `slot`, `generation`
    LoopSpawned,

    /// A render loop acknowledged cancellation and exited.
    ///
    /// Sets:
    /// - `program`, `slot`, `generation`
    /// - `reason`: `"panic"` when the loop task died instead
    LoopStopped,

    // === Cycle events ===
    /// A render attempt is starting.
    ///
    /// Sets:
    /// - `program`, `slot`
    /// - `attempt`: attempt number (1-based, per loop)
    RenderStarting,

    /// A render attempt failed; the slot is being cleared.
    ///
    /// Sets:
    /// - `program`, `slot`, `attempt`
    /// - `elapsed_ms`: time spent in the render command
    /// - `reason`: failure message
    RenderFailed,

    /// A rendered artifact was published into the slot.
    ///
    /// Sets:
    /// - `program`, `slot`, `attempt`
    /// - `elapsed_ms`: time spent in the render command
    ArtifactPublished,

    /// The artifact could not be published; the slot is being cleared.
    ///
    /// Sets:
    /// - `program`, `slot`, `attempt`
    /// - `reason`: I/O error
    PublishFailed,

    /// The slot's artifact was removed after a failed cycle.
    ///
    /// Sets:
    /// - `program`, `slot`
    SlotCleared,

    /// Next cycle scheduled.
    ///
    /// Sets:
    /// - `program`, `slot`, `attempt`
    /// - `delay_ms`: sleep before the next attempt
    SleepScheduled,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Program (or subscriber) name, if applicable.
    pub program: Option<Arc<str>>,
    /// Slot number, if applicable.
    pub slot: Option<u32>,
    /// Resync generation, if applicable.
    pub generation: Option<u64>,
    /// Attempt count (starting from 1) or a count, depending on kind.
    pub attempt: Option<u32>,
    /// Delay before next attempt in milliseconds (compact).
    pub delay_ms: Option<u32>,
    /// Duration of the render command in milliseconds (compact).
    pub elapsed_ms: Option<u32>,
    /// Human-readable reason (errors, trigger source, overflow details).
    pub reason: Option<Arc<str>>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            program: None,
            slot: None,
            generation: None,
            attempt: None,
            delay_ms: None,
            elapsed_ms: None,
            reason: None,
        }
    }

    /// Attaches a program name.
    #[inline]
    pub fn with_program(mut self, program: impl Into<Arc<str>>) -> Self {
        self.program = Some(program.into());
        self
    }

    /// Attaches a slot number.
    #[inline]
    pub fn with_slot(mut self, slot: u32) -> Self {
        self.slot = Some(slot);
        self
    }

    /// Attaches a resync generation.
    #[inline]
    pub fn with_generation(mut self, generation: u64) -> Self {
        self.generation = Some(generation);
        self
    }

    /// Attaches an attempt count.
    #[inline]
    pub fn with_attempt(mut self, n: u32) -> Self {
        self.attempt = Some(n);
        self
    }

    /// Attaches a sleep delay (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        self.delay_ms = Some(compact_ms(d));
        self
    }

    /// Attaches the render duration (stored as milliseconds).
    #[inline]
    pub fn with_elapsed(mut self, d: Duration) -> Self {
        self.elapsed_ms = Some(compact_ms(d));
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_program(subscriber)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_program(subscriber)
            .with_reason(info)
    }
}

fn compact_ms(d: Duration) -> u32 {
    d.as_millis().min(u128::from(u32::MAX)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_numbers_increase() {
        let a = Event::new(EventKind::ResyncRequested);
        let b = Event::new(EventKind::ResyncRequested);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn durations_are_clamped_to_u32_millis() {
        let ev =
            Event::new(EventKind::SleepScheduled).with_delay(Duration::from_secs(u64::MAX / 4));
        assert_eq!(ev.delay_ms, Some(u32::MAX));

        let ev = Event::new(EventKind::ArtifactPublished).with_elapsed(Duration::from_millis(1500));
        assert_eq!(ev.elapsed_ms, Some(1500));
    }
}
