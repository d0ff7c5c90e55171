//! # Fan-out of runtime events to subscribers.
//!
//! [`SubscriberSet`] gives every subscriber its own bounded lane and worker
//! task, so a slow log sink never holds back the status tracker (or a render
//! loop publishing on the bus).
//!
//! ```text
//! emit(event) ──try_send──► lane "log"    ──► worker ──► LogWriter::on_event
//!             ──try_send──► lane "status" ──► worker ──► StatusTracker::on_event
//!                              │ full/closed
//!                              └─► dropped += 1, SubscriberOverflow on the bus
//! ```
//!
//! Each lane is FIFO; there is no ordering across lanes. A panic inside
//! `on_event` is caught, reported as `SubscriberPanicked`, and the worker moves
//! on to the next event. Overflow events are never re-reported, which keeps a
//! saturated lane from feeding itself.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::FutureExt;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;

use crate::events::{Bus, Event, EventKind};
use crate::subscribers::Subscribe;

struct Lane {
    name: &'static str,
    tx: mpsc::Sender<Arc<Event>>,
    dropped: AtomicU64,
}

/// Owns one queue and worker per subscriber.
pub struct SubscriberSet {
    lanes: Vec<Lane>,
    workers: Vec<JoinHandle<()>>,
    bus: Bus,
}

impl SubscriberSet {
    /// Spawns a worker per subscriber. Must be called inside a tokio runtime.
    #[must_use]
    pub fn new(subs: Vec<Arc<dyn Subscribe>>, bus: Bus) -> Self {
        let (lanes, workers) = subs
            .into_iter()
            .map(|sub| {
                let (tx, rx) = mpsc::channel(sub.queue_capacity().max(1));
                let lane = Lane {
                    name: sub.name(),
                    tx,
                    dropped: AtomicU64::new(0),
                };
                (lane, spawn_worker(sub, rx, bus.clone()))
            })
            .unzip();
        Self {
            lanes,
            workers,
            bus,
        }
    }

    /// Hands `event` to every lane without waiting.
    pub fn emit(&self, event: Event) {
        let reportable = event.kind != EventKind::SubscriberOverflow;
        let event = Arc::new(event);

        for lane in &self.lanes {
            let reason = match lane.tx.try_send(Arc::clone(&event)) {
                Ok(()) => continue,
                Err(TrySendError::Full(_)) => "full",
                Err(TrySendError::Closed(_)) => "closed",
            };
            lane.dropped.fetch_add(1, Ordering::Relaxed);
            if reportable {
                self.bus.publish(Event::subscriber_overflow(lane.name, reason));
            }
        }
    }

    /// Events dropped so far, per subscriber name.
    pub fn dropped(&self) -> Vec<(&'static str, u64)> {
        self.lanes
            .iter()
            .map(|l| (l.name, l.dropped.load(Ordering::Relaxed)))
            .collect()
    }

    /// Closes every lane and waits until the workers have drained them.
    pub async fn shutdown(self) {
        drop(self.lanes);
        for worker in self.workers {
            let _ = worker.await;
        }
    }
}

fn spawn_worker(
    sub: Arc<dyn Subscribe>,
    mut rx: mpsc::Receiver<Arc<Event>>,
    bus: Bus,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(ev) = rx.recv().await {
            let handled = AssertUnwindSafe(sub.on_event(&ev)).catch_unwind().await;
            if let Err(payload) = handled {
                bus.publish(Event::subscriber_panicked(sub.name(), panic_message(&*payload)));
            }
        }
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
