//! # Event subscribers for the slotvisor runtime.
//!
//! This module provides the [`Subscribe`] trait, the [`SubscriberSet`] fan-out
//! and built-in implementations for handling runtime events broadcast through
//! the [`Bus`](crate::events::Bus).
//!
//! ## Architecture
//! ```text
//! Event flow:
//!   RenderLoop ── publish(Event) ──► Bus ──► subscriber_listener ──► SubscriberSet
//!                                                                      │
//!                                                       ┌──────────────┼──────────┐
//!                                                       ▼              ▼          ▼
//!                                                   LogWriter   StatusTracker   Custom
//! ```
//!
//! ## Subscriber types
//! - **Passive subscribers** observe and react to events ([`LogWriter`])
//! - **Stateful subscribers** maintain internal state from events ([`StatusTracker`])

mod log;
mod status;
mod subscribe;
mod subscriber_set;

pub use log::LogWriter;
pub use status::{LoopPhase, ProgramStatus, StatusTracker};
pub use subscribe::Subscribe;
pub use subscriber_set::SubscriberSet;
