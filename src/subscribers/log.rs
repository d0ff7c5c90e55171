//! # LogWriter: turns runtime events into `tracing` records.
//!
//! Routine cycle events go to `debug`, lifecycle changes to `info`, failures
//! to `warn`/`error`. The binary installs this subscriber by default.
//!
//! ## Example output
//! ```text
//! INFO resync started generation=3 coalesced=2
//! INFO render loop spawned program="clock.star" slot=0 generation=3
//! WARN render failed program="clock.star" slot=0 attempt=4 elapsed_ms=812 err="..."
//! INFO stale slot removed slot=4 generation=3
//! ```

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let program = e.program.as_deref().unwrap_or("-");
        let reason = e.reason.as_deref().unwrap_or("");
        match e.kind {
            EventKind::ShutdownRequested => info!("shutdown requested"),
            EventKind::AllStoppedWithin => info!("all render loops stopped within grace"),
            EventKind::GraceExceeded => error!("render loops still running after grace period"),
            EventKind::ResyncRequested => debug!(trigger = reason, "resync requested"),
            EventKind::ResyncStarted => {
                info!(generation = e.generation, coalesced = e.attempt, "resync started")
            }
            EventKind::ResyncCompleted => {
                info!(generation = e.generation, loops = e.attempt, "resync completed")
            }
            EventKind::ResyncFailed => {
                error!(generation = e.generation, err = reason, "resync loaded no programs")
            }
            EventKind::ProgramSkipped => warn!(program, err = reason, "program skipped"),
            EventKind::StaleSlotRemoved => {
                info!(slot = e.slot, generation = e.generation, "stale slot removed")
            }
            EventKind::LoopSpawned => info!(
                program,
                slot = e.slot,
                generation = e.generation,
                "render loop spawned"
            ),
            EventKind::LoopStopped if reason == "panic" => {
                error!(program, slot = e.slot, "render loop panicked")
            }
            EventKind::LoopStopped => debug!(program, slot = e.slot, "render loop stopped"),
            EventKind::RenderStarting => {
                debug!(program, slot = e.slot, attempt = e.attempt, "render starting")
            }
            EventKind::ArtifactPublished => debug!(
                program,
                slot = e.slot,
                attempt = e.attempt,
                elapsed_ms = e.elapsed_ms,
                "artifact published"
            ),
            EventKind::RenderFailed => warn!(
                program,
                slot = e.slot,
                attempt = e.attempt,
                elapsed_ms = e.elapsed_ms,
                err = reason,
                "render failed"
            ),
            EventKind::PublishFailed => {
                error!(program, slot = e.slot, err = reason, "publish failed")
            }
            EventKind::SlotCleared => debug!(program, slot = e.slot, "slot cleared"),
            EventKind::SleepScheduled => {
                debug!(program, slot = e.slot, delay_ms = e.delay_ms, "next cycle scheduled")
            }
            EventKind::SubscriberOverflow => {
                warn!(subscriber = program, reason, "subscriber dropped event")
            }
            EventKind::SubscriberPanicked => {
                error!(subscriber = program, info = reason, "subscriber panicked")
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
