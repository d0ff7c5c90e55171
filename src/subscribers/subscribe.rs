//! # Subscriber extension point.
//!
//! Implement [`Subscribe`] to observe runtime events: render attempts, slot
//! publication, resync generations, shutdown. Pass implementations to
//! [`SupervisorBuilder::with_subscribers`](crate::SupervisorBuilder::with_subscribers).
//!
//! Every subscriber runs on its own worker behind a bounded queue sized by
//! [`Subscribe::queue_capacity`]. A subscriber that cannot keep up loses
//! events (reported as `SubscriberOverflow`); it never slows a render loop.
//!
//! ## Example
//! ```rust
//! use slotvisor::{Event, EventKind, Subscribe};
//!
//! struct FailureCounter(std::sync::atomic::AtomicU64);
//!
//! #[async_trait::async_trait]
//! impl Subscribe for FailureCounter {
//!     async fn on_event(&self, ev: &Event) {
//!         if ev.kind == EventKind::RenderFailed {
//!             self.0.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
//!         }
//!     }
//!     fn name(&self) -> &'static str { "failure-counter" }
//! }
//! ```

use async_trait::async_trait;

use crate::events::Event;

/// Receives runtime events on a dedicated worker task.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Called once per event, in publication order for this subscriber.
    async fn on_event(&self, event: &Event);

    /// Name used in overflow and panic reports.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Events buffered before new ones are dropped.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
