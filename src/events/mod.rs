//! Runtime events and the bus that carries them.
//!
//! - [`Event`] / [`EventKind`]: what happened, to which program, slot and generation
//! - [`Bus`]: broadcast channel shared by the supervisor, the registry and every render loop
//!
//! The supervisor's listener is the single consumer and fans out to the
//! `SubscriberSet`; the wiring diagram lives in `core/mod.rs`.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
