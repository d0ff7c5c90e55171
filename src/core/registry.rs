//! # Loop registry: the supervisor's handles to running render loops.
//!
//! ```text
//! resync executor ──spawn(loop)──► Registry { program → Handle }
//!                 ──cancel_all()──►   ├─► cancel every child token
//!                                     ├─► join each handle (optionally bounded)
//!                                     └─► LoopStopped per loop ("panic" if it died)
//! ```
//!
//! ## Rules
//! - Registry owns the handles (JoinHandle + child CancellationToken)
//! - At most one loop per program name; a duplicate spawn is refused
//! - `cancel_all` drains the registry before joining, so a new generation starts empty
//! - Loops being joined stay abortable through [`Registry::abort_stopping`] until they exit

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

use crate::core::render_loop::RenderLoop;
use crate::events::{Bus, Event, EventKind};
use crate::slots::SlotAssignment;

/// Handle to a running render loop.
struct Handle {
    slot: u32,
    generation: u64,
    join: JoinHandle<u32>,
    cancel: CancellationToken,
}

/// Registry of active render loops.
pub struct Registry {
    loops: RwLock<HashMap<Arc<str>, Handle>>,
    /// Drained by `cancel_all` but not yet joined.
    stopping: Mutex<HashMap<Arc<str>, AbortHandle>>,
    bus: Bus,
    runtime_token: CancellationToken,
}

impl Registry {
    pub fn new(bus: Bus, runtime_token: CancellationToken) -> Arc<Self> {
        Arc::new(Self {
            loops: RwLock::new(HashMap::new()),
            stopping: Mutex::new(HashMap::new()),
            bus,
            runtime_token,
        })
    }

    /// Spawns `render_loop` under a child of the runtime token.
    ///
    /// Returns `false` if a loop for the same program is already registered.
    pub async fn spawn(&self, render_loop: RenderLoop, generation: u64) -> bool {
        let name: Arc<str> = Arc::from(render_loop.program());
        let slot = render_loop.slot();

        let mut loops = self.loops.write().await;
        if loops.contains_key(&name) {
            return false;
        }
        let cancel = self.runtime_token.child_token();
        let join = tokio::spawn(render_loop.run(cancel.clone()));
        loops.insert(
            Arc::clone(&name),
            Handle {
                slot,
                generation,
                join,
                cancel,
            },
        );
        drop(loops);

        self.bus.publish(
            Event::new(EventKind::LoopSpawned)
                .with_program(name)
                .with_slot(slot)
                .with_generation(generation),
        );
        true
    }

    /// Current assignments ordered by slot.
    pub async fn assignments(&self) -> Vec<SlotAssignment> {
        let loops = self.loops.read().await;
        let mut out: Vec<SlotAssignment> = loops
            .iter()
            .map(|(name, h)| SlotAssignment {
                slot: h.slot,
                program: Arc::clone(name),
            })
            .collect();
        out.sort_by_key(|a| a.slot);
        out
    }

    /// Cancels every loop and waits for each to stop: cancel → join → LoopStopped.
    ///
    /// With `grace`, loops still running at the deadline are aborted and their
    /// names returned as `Err` (sorted).
    pub async fn cancel_all(&self, grace: Option<Duration>) -> Result<(), Vec<String>> {
        let handles: Vec<(Arc<str>, Handle)> = {
            let mut loops = self.loops.write().await;
            let mut stopping = self.stopping.lock().await;
            loops
                .drain()
                .inspect(|(name, h)| {
                    stopping.insert(Arc::clone(name), h.join.abort_handle());
                })
                .collect()
        };

        for (_, h) in &handles {
            h.cancel.cancel();
        }

        let deadline = grace.map(|g| Instant::now() + g);
        let mut stuck = Vec::new();
        for (name, mut h) in handles {
            let joined = match deadline {
                Some(at) => time::timeout_at(at, &mut h.join).await.ok(),
                None => Some((&mut h.join).await),
            };
            self.stopping.lock().await.remove(&name);
            let Some(joined) = joined else {
                h.join.abort();
                stuck.push(name.to_string());
                continue;
            };

            let mut ev = Event::new(EventKind::LoopStopped)
                .with_program(name)
                .with_slot(h.slot)
                .with_generation(h.generation);
            match joined {
                Ok(attempts) => ev = ev.with_attempt(attempts),
                Err(je) if je.is_panic() => ev = ev.with_reason("panic"),
                Err(_) => ev = ev.with_reason("aborted"),
            }
            self.bus.publish(ev);
        }

        if stuck.is_empty() {
            Ok(())
        } else {
            stuck.sort_unstable();
            Err(stuck)
        }
    }

    /// Aborts loops another `cancel_all` is still waiting on.
    ///
    /// Used by shutdown when that caller cannot finish within the grace period.
    /// Returns the aborted programs, sorted.
    pub async fn abort_stopping(&self) -> Vec<String> {
        let mut aborted: Vec<String> = self
            .stopping
            .lock()
            .await
            .drain()
            .map(|(name, abort)| {
                abort.abort();
                name.to_string()
            })
            .collect();
        aborted.sort_unstable();
        aborted
    }
}
