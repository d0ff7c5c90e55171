//! # Debouncer: turns bursts of change signals into one callback.
//!
//! Every signal (re)starts a quiet-period deadline. The callback runs once
//! when the deadline passes with no further signal.
//!
//! ```text
//! signals:   x  x   x            x         x
//! deadline:  ├──┼───┼──────┤     ├──────┤  ├──────┤
//! callback:                ▲            ▲         ▲
//! ```
//!
//! ## Rules
//! - Debouncing, not throttling: a steady stream of signals postpones the callback
//! - Stops on cancellation or when every sender is dropped; a pending deadline is discarded

use std::future;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

/// Restartable quiet-period timer.
#[derive(Clone, Copy, Debug)]
pub struct Debouncer {
    quiet: Duration,
}

impl Debouncer {
    pub fn new(quiet: Duration) -> Self {
        Self { quiet }
    }

    /// Consumes signals from `rx` until cancelled or closed, calling
    /// `on_settled` once per settled burst.
    pub async fn run<F>(
        self,
        mut rx: mpsc::Receiver<()>,
        token: CancellationToken,
        mut on_settled: F,
    ) where
        F: FnMut() + Send,
    {
        let mut deadline: Option<Instant> = None;
        loop {
            let settle = async {
                match deadline {
                    Some(at) => time::sleep_until(at).await,
                    None => future::pending::<()>().await,
                }
            };
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                msg = rx.recv() => match msg {
                    Some(()) => deadline = Some(Instant::now() + self.quiet),
                    None => break,
                },
                _ = settle => {
                    deadline = None;
                    on_settled();
                }
            }
        }
    }
}
