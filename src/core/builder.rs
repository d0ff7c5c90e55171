use std::sync::Arc;

use crate::{
    config::Config,
    core::render_loop::LoopDeps,
    core::supervisor::{Supervisor, SupervisorParts},
    events::Bus,
    programs::ConfigStore,
    render::{CommandRenderer, FailureLog, Render},
    slots::ArtifactPublisher,
    subscribers::{StatusTracker, Subscribe, SubscriberSet},
};

/// Builder for constructing a [`Supervisor`] with optional collaborators.
pub struct SupervisorBuilder {
    cfg: Config,
    subscribers: Vec<Arc<dyn Subscribe>>,
    renderer: Option<Arc<dyn Render>>,
}

impl SupervisorBuilder {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            subscribers: Vec::new(),
            renderer: None,
        }
    }

    /// Sets event subscribers for observability.
    ///
    /// Subscribers receive runtime events (resyncs, loop lifecycle, render
    /// cycles) through dedicated workers with bounded queues. A
    /// [`StatusTracker`] is always added by the builder.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Replaces the default [`CommandRenderer`].
    pub fn with_renderer(mut self, renderer: Arc<dyn Render>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Builds and starts the supervisor.
    ///
    /// Initializes the event bus, subscriber workers, the loop registry and
    /// the resync executor. No loops run until the first resync.
    ///
    /// Must be called inside a tokio runtime.
    pub fn build(self) -> Arc<Supervisor> {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());

        let status = Arc::new(StatusTracker::new());
        let mut subscribers = self.subscribers;
        subscribers.push(status.clone());
        let subs = SubscriberSet::new(subscribers, bus.clone());

        let renderer = self
            .renderer
            .unwrap_or_else(|| Arc::new(CommandRenderer::from_config(&self.cfg)));
        let deps = LoopDeps {
            renderer,
            publisher: ArtifactPublisher::new(
                self.cfg.slot_dir.clone(),
                self.cfg.artifact_extension.clone(),
            ),
            failures: Arc::new(FailureLog::new()),
            cadence: self.cfg.cadence(),
            bus: bus.clone(),
        };
        let store = ConfigStore::new(
            self.cfg.source_dir.clone(),
            self.cfg.config_file.clone(),
            self.cfg.source_suffix.clone(),
        );

        Supervisor::start(SupervisorParts {
            cfg: self.cfg,
            bus,
            store,
            deps,
            status,
            subs,
        })
    }
}
