//! # slotvisor
//!
//! **Slotvisor** keeps a set of numbered display slots fed with freshly
//! rendered program output.
//!
//! A configuration document declares which programs are enabled, how often
//! each refreshes, in which order and with which parameters. Slotvisor turns
//! it into one supervised render loop per enabled program, each publishing
//! its latest artifact into a fixed slot that a separate playback process
//! reads. Source or configuration changes trigger a debounced, single-flight
//! resync that replaces every loop at once.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   source dir ──notify──► ChangeWatcher ──(debounced)──┐
//!   POST /sync ─────────────────────────────────────────┼──► Supervisor (resync executor)
//!   startup ────────────────────────────────────────────┘           │
//!                                                                   ▼
//!                                   ConfigStore::load ─► SlotAllocator::compute
//!                                                                   │
//!            ┌──────────────────────────┬───────────────────────────┤
//!            ▼                          ▼                           ▼
//!     ┌──────────────┐          ┌──────────────┐            ┌──────────────┐
//!     │  RenderLoop  │          │  RenderLoop  │            │  RenderLoop  │
//!     │   slot 0     │          │   slot 1     │    ...     │   slot k-1   │
//!     └──────┬───────┘          └──────┬───────┘            └──────┬───────┘
//!            │ Render::render ─► ArtifactPublisher::publish / clear ─► sleep
//!            ▼                          ▼                           ▼
//! ┌───────────────────────────────────────────────────────────────────────┐
//! │                       Bus (broadcast channel)                         │
//! └───────────────────────────────────┬───────────────────────────────────┘
//!                                     ▼
//!                          subscriber_listener ─► SubscriberSet
//!                                              ┌──────┴──────┐
//!                                              ▼             ▼
//!                                          LogWriter   StatusTracker
//! ```
//!
//! ### Render cycle
//! ```text
//! loop {
//!   ├─► cancelled? ─► exit
//!   ├─► publish RenderStarting{ program, slot, attempt }
//!   ├─► render (never interrupted by cancellation)
//!   ├─► cancelled? ─► discard result, exit
//!   ├─► Ok  ─► publish to slot ─► ArtifactPublished
//!   │          sleep = max(min_sleep, refresh_rate - render_time)
//!   ├─► Err ─► FailureRecord, clear slot ─► RenderFailed, SlotCleared
//!   │          sleep = retry_delay
//!   └─► publish SleepScheduled, sleep (cancellable)
//! }
//! ```
//!
//! ## Features
//! | Area               | Description                | Key types                                |
//! |--------------------|----------------------------|------------------------------------------|
//! | **Configuration**  | Snapshot loaded per resync | [`ConfigStore`]                          |
//! | **Slots**          | Allocation, atomic publish | [`SlotAllocator`], [`ArtifactPublisher`] |
//! | **Rendering**      | External command seam      | [`Render`], [`CommandRenderer`]          |
//! | **Supervision**    | Single-flight resyncs      | [`Supervisor`], [`ResyncReport`]         |
//! | **Change watch**   | Debounced fs observation   | [`ChangeWatcher`], [`Debouncer`]         |
//! | **Subscriber API** | Lifecycle events           | [`Subscribe`], [`StatusTracker`]         |
//! | **Errors**         | Typed errors per class     | [`ConfigError`], [`RuntimeError`]        |
//!
//! ## Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use slotvisor::{Config, LogWriter, Subscribe, Supervisor};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cfg = Config::default();
//!     let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
//!
//!     let sup = Supervisor::builder(cfg).with_subscribers(subs).build();
//!     sup.prepare().await?;
//!
//!     let report = sup.resync().await?;
//!     println!("generation {} running {} programs", report.generation, report.assignments.len());
//!
//!     slotvisor::wait_for_shutdown_signal().await?;
//!     sup.shutdown().await?;
//!     Ok(())
//! }
//! ```

pub mod api;
mod config;
mod core;
mod error;
mod events;
mod policies;
mod programs;
mod render;
mod slots;
mod subscribers;
mod watch;

// ---- Public re-exports ----

pub use config::{Config, DEFAULT_CONFIG_FILE, DEFAULT_SOURCE_SUFFIX, RenderCommand};
pub use core::{
    LoopDeps, RenderLoop, ResyncReport, StatusSnapshot, Supervisor, SupervisorBuilder,
    wait_for_shutdown_signal,
};
pub use error::{
    ConfigError, PublishError, RenderError, ResyncError, RuntimeError, ValidationError,
    WatcherError,
};
pub use events::{Bus, Event, EventKind};
pub use policies::{CadencePolicy, CycleOutcome};
pub use programs::{
    ConfigStore, DEFAULT_REFRESH_RATE_SECS, ParamValue, Params, ProgramConfig, ProgramSet,
};
pub use render::{
    CommandRenderer, FailureLog, FailureRecord, MAX_CAPTURED_OUTPUT, Render, RenderRequest,
    RenderedArtifact,
};
pub use slots::{Allocation, ArtifactPublisher, SlotAllocator, SlotAssignment};
pub use subscribers::{LogWriter, LoopPhase, ProgramStatus, StatusTracker, Subscribe, SubscriberSet};
pub use watch::{ChangeFilter, ChangeWatcher, Debouncer};
