//! # Supervisor: owns the render loops, runs resyncs, shuts down gracefully.
//!
//! The [`Supervisor`] owns the event bus, the [`SubscriberSet`] listener, the
//! loop [`Registry`] and the single-flight resync executor.
//!
//! ## Key responsibilities
//! - funnel every resync trigger into one executor (see `core/resync.rs`)
//! - tear down generation N completely before spawning generation N+1
//! - reclaim slots left over from a larger generation
//! - **fan-out** bus events via [`SubscriberSet`]
//! - graceful shutdown bounded by [`Config::grace`]
//!
//! ## Resync
//! ```text
//! execute_resync(triggers)
//!   ├─► ResyncStarted(generation, coalesced)
//!   ├─► registry.cancel_all()          → LoopStopped × N   (all joined)
//!   ├─► store.load()                   → ProgramSkipped × M
//!   │       └─ ConfigError → empty list, ResyncFailed
//!   ├─► SlotAllocator::compute(programs, existing_slots)
//!   ├─► publisher.clear(stale)         → StaleSlotRemoved × S
//!   ├─► registry.spawn(RenderLoop)     → LoopSpawned × K
//!   └─► ResyncCompleted(generation, K)
//! ```
//!
//! ## Shutdown
//! ```text
//! shutdown()
//!   ├─► ShutdownRequested
//!   ├─► runtime_token.cancel()   → executor stops taking requests, loops see cancellation
//!   ├─► join executor, then registry.cancel_all(remaining grace)
//!   │       ├─ all joined   → AllStoppedWithin
//!   │       └─ deadline hit → GraceExceeded, Err(RuntimeError::GraceExceeded)
//!   │   executor still tearing down at the deadline → abort it and every loop it was joining
//!   └─► stop the subscriber listener (drains buffered events first)
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::config::Config;
use crate::core::registry::Registry;
use crate::core::render_loop::{LoopDeps, RenderLoop};
use crate::core::resync::{ResyncReport, ResyncRequest};
use crate::error::{PublishError, ResyncError, RuntimeError};
use crate::events::{Bus, Event, EventKind};
use crate::programs::{ConfigStore, ProgramConfig, ProgramSet};
use crate::render::{FailureLog, FailureRecord};
use crate::slots::{SlotAllocator, SlotAssignment};
use crate::subscribers::{ProgramStatus, StatusTracker, SubscriberSet};

/// Read-only view of the runtime for diagnostics.
#[derive(Clone, Debug, Serialize)]
pub struct StatusSnapshot {
    /// Latest generation started (0 before the first resync).
    pub generation: u64,
    pub assignments: Vec<SlotAssignment>,
    pub programs: Vec<ProgramStatus>,
    pub failures: Vec<FailureRecord>,
}

/// Coordinates render loops, resyncs, event delivery and graceful shutdown.
pub struct Supervisor {
    cfg: Config,
    bus: Bus,
    store: ConfigStore,
    deps: LoopDeps,
    registry: Arc<Registry>,
    status: Arc<StatusTracker>,
    failures: Arc<FailureLog>,

    runtime_token: CancellationToken,
    resync_tx: mpsc::UnboundedSender<ResyncRequest>,
    generation: AtomicU64,
    shutting_down: AtomicBool,

    executor: Mutex<Option<JoinHandle<()>>>,
    listener: Mutex<Option<JoinHandle<()>>>,
    listener_stop: CancellationToken,
}

/// Parts assembled by [`SupervisorBuilder`](crate::SupervisorBuilder).
pub(crate) struct SupervisorParts {
    pub cfg: Config,
    pub bus: Bus,
    pub store: ConfigStore,
    pub deps: LoopDeps,
    pub status: Arc<StatusTracker>,
    pub subs: SubscriberSet,
}

impl Supervisor {
    /// Starts a builder for the given configuration.
    pub fn builder(cfg: Config) -> crate::core::builder::SupervisorBuilder {
        crate::core::builder::SupervisorBuilder::new(cfg)
    }

    /// Wires the runtime and spawns the listener and executor tasks.
    ///
    /// Must be called inside a tokio runtime.
    pub(crate) fn start(parts: SupervisorParts) -> Arc<Self> {
        let runtime_token = CancellationToken::new();
        let listener_stop = CancellationToken::new();
        let (resync_tx, resync_rx) = mpsc::unbounded_channel();

        let registry = Registry::new(parts.bus.clone(), runtime_token.clone());
        let failures = Arc::clone(&parts.deps.failures);
        let listener = subscriber_listener(&parts.bus, parts.subs, listener_stop.clone());

        Arc::new_cyclic(|weak| {
            // The executor only upgrades after a request arrives, which needs a built supervisor.
            let executor = tokio::spawn(crate::core::resync::run_executor(
                weak.clone(),
                resync_rx,
                runtime_token.clone(),
            ));
            Self {
                cfg: parts.cfg,
                bus: parts.bus,
                store: parts.store,
                deps: parts.deps,
                registry,
                status: parts.status,
                failures,
                runtime_token,
                resync_tx,
                generation: AtomicU64::new(0),
                shutting_down: AtomicBool::new(false),
                executor: Mutex::new(Some(executor)),
                listener: Mutex::new(Some(listener)),
                listener_stop,
            }
        })
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Event bus shared with every loop.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Latest generation started.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Creates the working directories and removes partial slot files left by a crash.
    ///
    /// Returns the number of partial files removed.
    pub async fn prepare(&self) -> Result<usize, PublishError> {
        let publisher = &self.deps.publisher;
        for dir in [publisher.dir(), self.cfg.temp_dir.as_path(), self.store.source_dir()] {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|source| PublishError::List {
                    path: dir.to_path_buf(),
                    source,
                })?;
        }
        publisher.sweep_partials().await
    }

    /// Runs a resync and waits for its result.
    ///
    /// If a resync is already running, this call is served by the next one
    /// together with every other request queued meanwhile.
    pub async fn resync(&self) -> Result<ResyncReport, ResyncError> {
        self.resync_for("manual").await
    }

    /// Like [`resync`](Self::resync), tagging the request with its trigger.
    pub async fn resync_for(&self, trigger: &'static str) -> Result<ResyncReport, ResyncError> {
        let (tx, rx) = oneshot::channel();
        self.enqueue(trigger, Some(tx))?;
        rx.await.map_err(|_| ResyncError::Closed)?
    }

    /// Queues a resync without waiting for it.
    pub fn request_resync(&self, trigger: &'static str) -> Result<(), ResyncError> {
        self.enqueue(trigger, None)
    }

    fn enqueue(
        &self,
        trigger: &'static str,
        reply: Option<crate::core::resync::ResyncReply>,
    ) -> Result<(), ResyncError> {
        if self.runtime_token.is_cancelled() {
            return Err(ResyncError::Closed);
        }
        self.bus
            .publish(Event::new(EventKind::ResyncRequested).with_reason(trigger));
        self.resync_tx
            .send(ResyncRequest { trigger, reply })
            .map_err(|_| ResyncError::Closed)
    }

    /// Performs one full-teardown resync. Only the executor calls this.
    pub(crate) async fn execute_resync(
        &self,
        triggers: &[&'static str],
    ) -> Result<ResyncReport, ResyncError> {
        if self.runtime_token.is_cancelled() {
            return Err(ResyncError::Closed);
        }
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.bus.publish(
            Event::new(EventKind::ResyncStarted)
                .with_generation(generation)
                .with_attempt(triggers.len() as u32)
                .with_reason(triggers.join(",")),
        );

        // 1. Generation N is fully stopped before anything of N+1 exists.
        let _ = self.registry.cancel_all(None).await;

        // 2. Fresh configuration.
        let (set, load_error) = match self.store.load().await {
            Ok(set) => (set, None),
            Err(e) => (ProgramSet::default(), Some(e)),
        };
        for skipped in &set.skipped {
            self.bus.publish(
                Event::new(EventKind::ProgramSkipped)
                    .with_program(skipped.program())
                    .with_generation(generation)
                    .with_reason(skipped.to_string()),
            );
        }

        // 3. Allocation and stale slot reclaim.
        let existing = match self.deps.publisher.existing_slots().await {
            Ok(slots) => slots,
            Err(e) => {
                warn!(err = %e, label = e.as_label(), "could not list existing slots");
                Vec::new()
            }
        };
        let allocation = SlotAllocator::compute(&set.programs, &existing);
        let mut stale_removed = Vec::with_capacity(allocation.stale.len());
        for &slot in &allocation.stale {
            match self.deps.publisher.clear(slot).await {
                Ok(()) => {
                    stale_removed.push(slot);
                    self.bus.publish(
                        Event::new(EventKind::StaleSlotRemoved)
                            .with_slot(slot)
                            .with_generation(generation),
                    );
                }
                Err(e) => self.bus.publish(
                    Event::new(EventKind::PublishFailed)
                        .with_slot(slot)
                        .with_generation(generation)
                        .with_reason(e.to_string()),
                ),
            }
        }

        if self.runtime_token.is_cancelled() {
            return Err(ResyncError::Closed);
        }

        // 4. One loop per enabled program.
        let by_name: HashMap<&str, &ProgramConfig> =
            set.programs.iter().map(|p| (p.name.as_str(), p)).collect();
        for assignment in &allocation.assignments {
            let Some(program) = by_name.get(assignment.program.as_ref()) else {
                continue;
            };
            let render_loop = RenderLoop::new(
                Arc::new((*program).clone()),
                assignment.slot,
                generation,
                self.deps.clone(),
            );
            self.registry.spawn(render_loop, generation).await;
        }

        let running: Vec<&str> = allocation
            .assignments
            .iter()
            .map(|a| a.program.as_ref())
            .collect();
        self.failures.retain_programs(&running).await;

        if let Some(e) = &load_error {
            self.bus.publish(
                Event::new(EventKind::ResyncFailed)
                    .with_generation(generation)
                    .with_reason(e.to_string()),
            );
        }
        self.bus.publish(
            Event::new(EventKind::ResyncCompleted)
                .with_generation(generation)
                .with_attempt(allocation.assignments.len() as u32),
        );

        match load_error {
            Some(e) => Err(ResyncError::from(&e)),
            None => Ok(ResyncReport {
                generation,
                assignments: allocation.assignments,
                stale_removed,
                skipped: set.skipped.iter().map(ToString::to_string).collect(),
                coalesced: triggers.len(),
            }),
        }
    }

    /// Current slot assignments, ordered by slot.
    pub async fn assignments(&self) -> Vec<SlotAssignment> {
        self.registry.assignments().await
    }

    /// Latest failure per program of the running generation.
    pub async fn failures(&self) -> Vec<FailureRecord> {
        self.failures.snapshot().await
    }

    /// Diagnostics snapshot.
    pub async fn status(&self) -> StatusSnapshot {
        StatusSnapshot {
            generation: self.generation(),
            assignments: self.assignments().await,
            programs: self.status.snapshot().await,
            failures: self.failures().await,
        }
    }

    /// Reads a slot's artifact for serving.
    pub async fn read_slot(&self, slot: u32) -> Result<Option<Vec<u8>>, PublishError> {
        self.deps.publisher.read(slot).await
    }

    /// MIME type of slot artifacts.
    pub fn artifact_content_type(&self) -> &'static str {
        self.deps.publisher.content_type()
    }

    /// Cancels every loop and waits for them to stop, bounded by [`Config::grace`].
    ///
    /// Idempotent: later calls return `Ok(())` immediately.
    pub async fn shutdown(&self) -> Result<(), RuntimeError> {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.bus.publish(Event::new(EventKind::ShutdownRequested));
        self.runtime_token.cancel();

        let grace = self.cfg.grace;
        let deadline = Instant::now() + grace;

        let executor = self.executor.lock().await.take();
        let executor_done = match executor {
            Some(mut handle) => match time::timeout_at(deadline, &mut handle).await {
                Ok(_) => true,
                Err(_) => {
                    // Stuck tearing down a generation: stop it, then its loops.
                    handle.abort();
                    let _ = handle.await;
                    false
                }
            },
            None => true,
        };

        let outcome = if executor_done {
            let remaining = deadline.saturating_duration_since(Instant::now());
            self.registry.cancel_all(Some(remaining)).await
        } else {
            let mut stuck = self.registry.abort_stopping().await;
            if let Err(rest) = self.registry.cancel_all(Some(Duration::ZERO)).await {
                stuck.extend(rest);
            }
            stuck.sort_unstable();
            stuck.dedup();
            Err(stuck)
        };

        match &outcome {
            Ok(()) => self.bus.publish(Event::new(EventKind::AllStoppedWithin)),
            Err(_) => self.bus.publish(Event::new(EventKind::GraceExceeded)),
        }

        self.listener_stop.cancel();
        if let Some(listener) = self.listener.lock().await.take() {
            let _ = listener.await;
        }

        outcome.map_err(|stuck| RuntimeError::GraceExceeded { grace, stuck })
    }
}

/// Forwards bus events to the subscriber set until `stop` fires, then drains and shuts it down.
fn subscriber_listener(bus: &Bus, set: SubscriberSet, stop: CancellationToken) -> JoinHandle<()> {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                msg = rx.recv() => match msg {
                    Ok(ev) => set.emit(ev),
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                },
                _ = stop.cancelled() => {
                    while let Ok(ev) = rx.try_recv() {
                        set.emit(ev);
                    }
                    break;
                }
            }
        }
        set.shutdown().await;
    })
}
