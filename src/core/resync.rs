//! # Single-flight resync executor.
//!
//! Every trigger (startup, watcher, HTTP, manual call) is a [`ResyncRequest`]
//! on one queue. One executor task serves them:
//!
//! ```text
//! request ─┐
//! request ─┼─► mpsc ──► executor: recv first ─► drain queued (try_recv) ─► execute once
//! request ─┘                                                                   │
//!                                  every waiter in the batch ◄── same result ──┘
//! ```
//!
//! ## Rules
//! - At most one resync runs at a time
//! - Requests queued while a resync runs are served by exactly one follow-up run
//! - Waiters whose request is never served observe [`ResyncError::Closed`]

use std::sync::Weak;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::core::supervisor::Supervisor;
use crate::error::ResyncError;
use crate::slots::SlotAssignment;

/// Reply channel of a waiting caller.
pub(crate) type ResyncReply = oneshot::Sender<Result<ResyncReport, ResyncError>>;

/// One queued trigger.
pub(crate) struct ResyncRequest {
    pub trigger: &'static str,
    pub reply: Option<ResyncReply>,
}

/// Outcome of a completed resync.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ResyncReport {
    /// Generation now running.
    pub generation: u64,
    /// Loops spawned, ordered by slot.
    pub assignments: Vec<SlotAssignment>,
    /// Slots reclaimed from the previous generation.
    pub stale_removed: Vec<u32>,
    /// Entries rejected at load time.
    pub skipped: Vec<String>,
    /// Requests served by this run.
    pub coalesced: usize,
}

/// Serves queued requests until cancelled, the queue closes or the supervisor is gone.
pub(crate) async fn run_executor(
    sup: Weak<Supervisor>,
    mut rx: mpsc::UnboundedReceiver<ResyncRequest>,
    token: CancellationToken,
) {
    loop {
        let first = tokio::select! {
            _ = token.cancelled() => break,
            req = rx.recv() => match req {
                Some(req) => req,
                None => break,
            },
        };

        let mut batch = vec![first];
        while let Ok(req) = rx.try_recv() {
            batch.push(req);
        }

        let Some(sup) = sup.upgrade() else { break };
        let triggers: Vec<&'static str> = batch.iter().map(|r| r.trigger).collect();
        let result = sup.execute_resync(&triggers).await;
        drop(sup);

        for req in batch {
            if let Some(reply) = req.reply {
                let _ = reply.send(result.clone());
            }
        }
    }
}
