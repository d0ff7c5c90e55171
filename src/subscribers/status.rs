//! # Per-program loop status rebuilt from events.
//!
//! Render loops own their state exclusively; nobody reads it directly.
//! [`StatusTracker`] rebuilds a read-only copy from the events the loops
//! publish, using event sequence numbers to handle out-of-order delivery.
//!
//! ## Architecture
//! ```text
//! RenderLoop ──► Bus ──► subscriber_listener() ──► StatusTracker::update()
//!                                                        │
//!                                                        ▼
//!                                          HashMap<program, ProgramStatus>
//! ```
//!
//! ## Rules
//! - Events with `seq <= last_seq` for a program are **rejected** (stale)
//! - `ResyncCompleted` for generation `g` drops entries from generations `< g`
//! - Reads (`snapshot`, `get`) are **eventually consistent**

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::RwLock;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Phase a render loop was last observed in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopPhase {
    Sleeping,
    Rendering,
    Publishing,
    Failed,
    Stopped,
}

/// Observed state of one program's render loop.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ProgramStatus {
    pub program: String,
    pub slot: u32,
    pub generation: u64,
    pub phase: LoopPhase,
    /// Attempts started by the current loop.
    pub attempts: u32,
    /// Unix milliseconds of the last render start.
    pub last_attempt_ms: Option<u64>,
    /// Unix milliseconds of the last successful publish.
    pub last_success_ms: Option<u64>,
    /// Message of the latest failure, cleared by the next success.
    pub last_error: Option<String>,
    #[serde(skip)]
    last_seq: u64,
}

/// Thread-safe tracker of render loop status.
#[derive(Default)]
pub struct StatusTracker {
    state: RwLock<HashMap<String, ProgramStatus>>,
}

impl StatusTracker {
    /// Creates a new empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies an event if it is newer than the last one seen for its program.
    ///
    /// Returns `true` if the tracked state changed.
    pub async fn update(&self, ev: &Event) -> bool {
        if ev.kind == EventKind::ResyncCompleted {
            let Some(current) = ev.generation else {
                return false;
            };
            let mut state = self.state.write().await;
            let before = state.len();
            state.retain(|_, st| st.generation >= current);
            return state.len() != before;
        }

        let Some(name) = ev.program.as_deref() else {
            return false;
        };
        let mut state = self.state.write().await;

        if ev.kind == EventKind::LoopSpawned {
            let (Some(slot), Some(generation)) = (ev.slot, ev.generation) else {
                return false;
            };
            let fresh = state.get(name).is_none_or(|st| ev.seq > st.last_seq);
            if fresh {
                state.insert(
                    name.to_string(),
                    ProgramStatus {
                        program: name.to_string(),
                        slot,
                        generation,
                        phase: LoopPhase::Sleeping,
                        attempts: 0,
                        last_attempt_ms: None,
                        last_success_ms: None,
                        last_error: None,
                        last_seq: ev.seq,
                    },
                );
            }
            return fresh;
        }

        let Some(entry) = state.get_mut(name) else {
            return false;
        };
        if ev.seq <= entry.last_seq {
            return false;
        }
        entry.last_seq = ev.seq;
        let at = unix_ms(ev.at);

        match ev.kind {
            EventKind::RenderStarting => {
                entry.phase = LoopPhase::Rendering;
                entry.attempts = ev.attempt.unwrap_or(entry.attempts + 1);
                entry.last_attempt_ms = Some(at);
            }
            EventKind::ArtifactPublished => {
                entry.phase = LoopPhase::Publishing;
                entry.last_success_ms = Some(at);
                entry.last_error = None;
            }
            EventKind::RenderFailed | EventKind::PublishFailed => {
                entry.phase = LoopPhase::Failed;
                entry.last_error = ev.reason.as_deref().map(str::to_string);
            }
            EventKind::SleepScheduled => {
                if entry.phase != LoopPhase::Failed {
                    entry.phase = LoopPhase::Sleeping;
                }
            }
            EventKind::LoopStopped => entry.phase = LoopPhase::Stopped,
            _ => return false,
        }
        true
    }

    /// Returns the tracked programs ordered by slot.
    pub async fn snapshot(&self) -> Vec<ProgramStatus> {
        let state = self.state.read().await;
        let mut all: Vec<ProgramStatus> = state.values().cloned().collect();
        all.sort_by(|a, b| (a.generation, a.slot).cmp(&(b.generation, b.slot)));
        all
    }

    /// Returns the status of one program, if tracked.
    pub async fn get(&self, program: &str) -> Option<ProgramStatus> {
        self.state.read().await.get(program).cloned()
    }

    /// Programs whose loops have not acknowledged cancellation yet.
    pub async fn running(&self) -> Vec<String> {
        let state = self.state.read().await;
        let mut names: Vec<String> = state
            .values()
            .filter(|st| st.phase != LoopPhase::Stopped)
            .map(|st| st.program.clone())
            .collect();
        names.sort_unstable();
        names
    }
}

#[async_trait]
impl Subscribe for StatusTracker {
    async fn on_event(&self, event: &Event) {
        self.update(event).await;
    }

    fn name(&self) -> &'static str {
        "StatusTracker"
    }

    fn queue_capacity(&self) -> usize {
        4096
    }
}

fn unix_ms(at: SystemTime) -> u64 {
    at.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spawned(program: &str, slot: u32, generation: u64) -> Event {
        Event::new(EventKind::LoopSpawned)
            .with_program(program)
            .with_slot(slot)
            .with_generation(generation)
    }

    #[tokio::test]
    async fn tracks_cycle_phases() {
        let t = StatusTracker::new();
        assert!(t.update(&spawned("a.star", 0, 1)).await);

        let start = Event::new(EventKind::RenderStarting)
            .with_program("a.star")
            .with_attempt(1);
        t.update(&start).await;
        assert_eq!(t.get("a.star").await.unwrap().phase, LoopPhase::Rendering);

        let failed = Event::new(EventKind::RenderFailed)
            .with_program("a.star")
            .with_reason("exit status: 2");
        t.update(&failed).await;
        t.update(&Event::new(EventKind::SleepScheduled).with_program("a.star"))
            .await;

        let st = t.get("a.star").await.unwrap();
        assert_eq!(st.phase, LoopPhase::Failed);
        assert_eq!(st.last_error.as_deref(), Some("exit status: 2"));
        assert_eq!(st.attempts, 1);

        t.update(&Event::new(EventKind::ArtifactPublished).with_program("a.star"))
            .await;
        t.update(&Event::new(EventKind::SleepScheduled).with_program("a.star"))
            .await;
        let st = t.get("a.star").await.unwrap();
        assert_eq!(st.phase, LoopPhase::Sleeping);
        assert_eq!(st.last_error, None);
        assert!(st.last_success_ms.is_some());
    }

    #[tokio::test]
    async fn rejects_stale_events() {
        let t = StatusTracker::new();
        let old = Event::new(EventKind::RenderStarting).with_program("a.star");
        t.update(&spawned("a.star", 0, 1)).await;
        let stop = Event::new(EventKind::LoopStopped).with_program("a.star");
        t.update(&stop).await;

        assert!(!t.update(&old).await);
        assert_eq!(t.get("a.star").await.unwrap().phase, LoopPhase::Stopped);
        assert!(t.running().await.is_empty());
    }

    #[tokio::test]
    async fn completed_resync_drops_previous_generation() {
        let t = StatusTracker::new();
        t.update(&spawned("a.star", 0, 1)).await;
        t.update(&spawned("b.star", 1, 1)).await;
        t.update(&spawned("b.star", 0, 2)).await;
        t.update(&Event::new(EventKind::ResyncCompleted).with_generation(2))
            .await;

        let snap = t.snapshot().await;
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].program, "b.star");
        assert_eq!(snap[0].slot, 0);
    }
}
