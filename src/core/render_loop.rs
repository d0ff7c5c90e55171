//! # RenderLoop: one program's render → publish-or-clear → sleep cycle.
//!
//! Each enabled program of a generation gets exactly one loop, bound to one
//! slot. The loop owns its state; observers rebuild it from published events.
//!
//! ## Event flow
//! For each cycle the loop publishes:
//! ```text
//! RenderStarting → [render] → ArtifactPublished                     (success)
//!                           → RenderFailed  → SlotCleared            (render error)
//!                           → PublishFailed → SlotCleared            (publish error)
//!   → SleepScheduled → [sleep] → next cycle
//! ```
//!
//! ## State machine
//! ```text
//!          spawn
//!            │
//!            ▼
//!   ┌──► Sleeping ──(timer / first cycle)──► Rendering ──ok──► Publishing ──┐
//!   │                                            │                │        │
//!   │                                           err           publish err  │
//!   │                                            ▼                ▼        │
//!   └────────────────────────────────────── FailureHandling ◄─────┘        │
//!   └──────────────────────────────────────────────────────────────────────┘
//!
//!   Cancelled: terminal, entered from any state at the next check
//! ```
//!
//! ## Rules
//! - Cancellation is checked before rendering, after rendering and during the sleep
//! - An in-flight render is never interrupted by cancellation; its result is discarded
//! - Any failure clears the slot and records a [`FailureRecord`]
//! - Attempt counter starts at 1 and never resets

use std::sync::Arc;

use tokio::{select, time};
use tokio_util::sync::CancellationToken;

use crate::events::{Bus, Event, EventKind};
use crate::policies::{CadencePolicy, CycleOutcome};
use crate::programs::ProgramConfig;
use crate::render::{FailureLog, FailureRecord, Render, RenderRequest};
use crate::slots::ArtifactPublisher;

/// Collaborators shared by every loop of the runtime.
#[derive(Clone)]
pub struct LoopDeps {
    pub renderer: Arc<dyn Render>,
    pub publisher: ArtifactPublisher,
    pub failures: Arc<FailureLog>,
    pub cadence: CadencePolicy,
    pub bus: Bus,
}

/// Repeats render cycles for one program until cancelled.
pub struct RenderLoop {
    program: Arc<ProgramConfig>,
    name: Arc<str>,
    slot: u32,
    generation: u64,
    deps: LoopDeps,
}

impl RenderLoop {
    pub fn new(program: Arc<ProgramConfig>, slot: u32, generation: u64, deps: LoopDeps) -> Self {
        let name = Arc::from(program.name.as_str());
        Self {
            program,
            name,
            slot,
            generation,
            deps,
        }
    }

    pub fn program(&self) -> &str {
        &self.name
    }

    pub fn slot(&self) -> u32 {
        self.slot
    }

    /// Runs cycles until `token` is cancelled. Returns the number of attempts started.
    pub async fn run(self, token: CancellationToken) -> u32 {
        let request = RenderRequest::from(self.program.as_ref());
        let refresh = self.program.refresh();
        let mut attempt: u32 = 0;

        loop {
            if token.is_cancelled() {
                break;
            }

            attempt = attempt.saturating_add(1);
            self.publish(EventKind::RenderStarting, |e| e.with_attempt(attempt));

            let started = time::Instant::now();
            let result = self.deps.renderer.render(&request).await;
            let elapsed = started.elapsed();

            if token.is_cancelled() {
                // Dropping the result removes the per-attempt output unpublished.
                break;
            }

            let outcome = match result {
                Ok(artifact) => {
                    let published = self.deps.publisher.publish(artifact.path(), self.slot).await;
                    match published {
                        Ok(_) => {
                            self.publish(EventKind::ArtifactPublished, |e| {
                                e.with_attempt(attempt).with_elapsed(elapsed)
                            });
                            CycleOutcome::Succeeded
                        }
                        Err(err) => {
                            self.publish(EventKind::PublishFailed, |e| {
                                e.with_attempt(attempt).with_reason(err.to_string())
                            });
                            self.fail(FailureRecord::from_publish(&self.name, &err)).await;
                            CycleOutcome::Failed
                        }
                    }
                }
                Err(err) => {
                    self.publish(EventKind::RenderFailed, |e| {
                        e.with_attempt(attempt)
                            .with_elapsed(elapsed)
                            .with_reason(err.to_string())
                    });
                    self.fail(FailureRecord::from_render(&self.name, &err)).await;
                    CycleOutcome::Failed
                }
            };

            let delay = self.deps.cadence.next_sleep(outcome, refresh, elapsed);
            self.publish(EventKind::SleepScheduled, |e| {
                e.with_attempt(attempt).with_delay(delay)
            });

            let sleep = time::sleep(delay);
            tokio::pin!(sleep);
            select! {
                _ = &mut sleep => {}
                _ = token.cancelled() => break,
            }
        }
        attempt
    }

    /// Records the failure and removes the slot's artifact.
    async fn fail(&self, record: FailureRecord) {
        self.deps.failures.record(record).await;
        match self.deps.publisher.clear(self.slot).await {
            Ok(()) => self.publish(EventKind::SlotCleared, |e| e),
            Err(err) => self.publish(EventKind::PublishFailed, |e| e.with_reason(err.to_string())),
        }
    }

    fn publish(&self, kind: EventKind, fill: impl FnOnce(Event) -> Event) {
        let ev = Event::new(kind)
            .with_program(Arc::clone(&self.name))
            .with_slot(self.slot)
            .with_generation(self.generation);
        self.deps.bus.publish(fill(ev));
    }
}
