//! # ChangeWatcher: filesystem observer feeding the debouncer.
//!
//! ```text
//! notify thread ──► ChangeFilter::is_relevant ──try_send(())──► Debouncer ──► on_change()
//!       │
//!       └── backend error ──► errors channel ──► ChangeWatcher::failed()
//! ```
//!
//! ## Rules
//! - Non-recursive: only the flat source directory is observed
//! - Relevant = a file ending with the source suffix, or the configuration document
//! - Access-only events and directory events are ignored and never reset the timer
//! - A full signal channel drops the signal; a burst is already pending

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::event::{CreateKind, RemoveKind};
use notify::{EventKind as FsEventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::WatcherError;
use crate::watch::Debouncer;

const SIGNAL_CAPACITY: usize = 64;

/// Decides which filesystem events count as changes.
#[derive(Clone, Debug)]
pub struct ChangeFilter {
    suffix: String,
    config_file: String,
}

impl ChangeFilter {
    pub fn new(suffix: impl Into<String>, config_file: impl Into<String>) -> Self {
        Self {
            suffix: suffix.into(),
            config_file: config_file.into(),
        }
    }

    /// Returns `true` if `event` touches a recognized file.
    pub fn is_relevant(&self, event: &notify::Event) -> bool {
        match event.kind {
            FsEventKind::Access(_)
            | FsEventKind::Create(CreateKind::Folder)
            | FsEventKind::Remove(RemoveKind::Folder) => return false,
            _ => {}
        }
        event.paths.iter().any(|p| self.is_recognized(p))
    }

    fn is_recognized(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        name == self.config_file || (name.ends_with(&self.suffix) && name.len() > self.suffix.len())
    }
}

/// Running observer of one directory.
///
/// Dropping it stops the observer and the debouncer.
pub struct ChangeWatcher {
    _watcher: RecommendedWatcher,
    errors: mpsc::UnboundedReceiver<notify::Error>,
    debouncer: JoinHandle<()>,
    token: CancellationToken,
}

impl ChangeWatcher {
    /// Starts observing `dir`; `on_change` runs once per settled burst of relevant changes.
    pub fn start<F>(
        dir: &Path,
        filter: ChangeFilter,
        quiet: Duration,
        token: CancellationToken,
        on_change: F,
    ) -> Result<Self, WatcherError>
    where
        F: FnMut() + Send + 'static,
    {
        let (signal_tx, signal_rx) = mpsc::channel(SIGNAL_CAPACITY);
        let (error_tx, errors) = mpsc::unbounded_channel();
        let start_error = |source| WatcherError::Start {
            path: PathBuf::from(dir),
            source,
        };

        let handler = move |res: notify::Result<notify::Event>| match res {
            Ok(event) => {
                if filter.is_relevant(&event) {
                    debug!(kind = ?event.kind, paths = ?event.paths, "source change observed");
                    let _ = signal_tx.try_send(());
                }
            }
            Err(e) => {
                let _ = error_tx.send(e);
            }
        };
        let mut watcher = notify::recommended_watcher(handler).map_err(start_error)?;
        watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .map_err(start_error)?;

        let debouncer =
            tokio::spawn(Debouncer::new(quiet).run(signal_rx, token.clone(), on_change));
        info!(
            dir = %dir.display(),
            quiet_ms = quiet.as_millis() as u64,
            "watching for source changes"
        );

        Ok(Self {
            _watcher: watcher,
            errors,
            debouncer,
            token,
        })
    }

    /// Resolves when the observer backend reports an error or stops delivering.
    pub async fn failed(&mut self) -> WatcherError {
        match self.errors.recv().await {
            Some(e) => WatcherError::Backend(e),
            None => WatcherError::Closed,
        }
    }

    /// Stops the debouncer and the observer.
    pub async fn stop(self) {
        self.token.cancel();
        let _ = self.debouncer.await;
    }
}
