//! Runtime core: render loops, resync orchestration and lifecycle.
//!
//! The public API of this module is [`Supervisor`] (built with
//! [`SupervisorBuilder`]), which owns the render loops of the current
//! generation, serializes resyncs and performs graceful shutdown.
//!
//! ## Wiring
//! ```text
//!  ChangeWatcher ─┐
//!  POST /sync ────┼─► Supervisor::request_resync / resync ─► resync executor (single-flight)
//!  startup ───────┘                                              │
//!                                   ┌────────────────────────────┤
//!                                   ▼                            ▼
//!                          Registry::cancel_all()       ConfigStore::load()
//!                                                               │
//!                                                      SlotAllocator::compute()
//!                                                               │
//!                                      Registry::spawn(RenderLoop) × K
//!                                                               │
//!   RenderLoop: Render::render ─► ArtifactPublisher::publish / clear ─► sleep
//!        │
//!        └── publish(Event) ─► Bus ─► subscriber listener ─► SubscriberSet
//!                                                              └─► LogWriter, StatusTracker
//! ```
//!
//! Internal modules:
//! - [`render_loop`]: one program's render/publish/sleep cycle;
//! - [`registry`]: handles of the running loops;
//! - [`resync`]: single-flight executor and [`ResyncReport`];
//! - [`supervisor`]: resync steps, diagnostics, shutdown;
//! - [`shutdown`]: cross-platform shutdown signal handling.

mod builder;
mod registry;
mod render_loop;
mod resync;
mod shutdown;
mod supervisor;

pub use builder::SupervisorBuilder;
pub use render_loop::{LoopDeps, RenderLoop};
pub use resync::ResyncReport;
pub use shutdown::wait_for_shutdown_signal;
pub use supervisor::{StatusSnapshot, Supervisor};
