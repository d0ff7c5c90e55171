//! slotvisor daemon: keeps display slots fed and serves them over HTTP.

use std::future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, anyhow};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use slotvisor::{
    ChangeFilter, ChangeWatcher, Config, LogWriter, RenderCommand, Subscribe, Supervisor,
    WatcherError, api, wait_for_shutdown_signal,
};

#[derive(Parser, Debug)]
#[command(name = "slotvisor", version, about)]
struct Args {
    /// Base directory; relative directories below are resolved against it.
    #[arg(long, env = "SLOTVISOR_ROOT", default_value = ".")]
    root: PathBuf,

    /// Directory holding program sources and the configuration document.
    #[arg(long, env = "SLOTVISOR_SOURCE_DIR", default_value = "star_programs_cache")]
    source_dir: PathBuf,

    /// File name of the configuration document inside the source directory.
    #[arg(long, env = "SLOTVISOR_CONFIG_FILE", default_value = slotvisor::DEFAULT_CONFIG_FILE)]
    config_file: String,

    /// Directory slot artifacts are published into.
    #[arg(long, env = "SLOTVISOR_SLOT_DIR", default_value = "gifs")]
    slot_dir: PathBuf,

    /// Directory for per-attempt render output.
    #[arg(long, env = "SLOTVISOR_TEMP_DIR", default_value = "temp")]
    temp_dir: PathBuf,

    /// Render executable.
    #[arg(long, env = "SLOTVISOR_RENDER_COMMAND", default_value = "pixlet")]
    render_command: PathBuf,

    /// Hard timeout per render invocation in seconds (0 = none).
    #[arg(long, env = "SLOTVISOR_RENDER_TIMEOUT_SECS", default_value_t = 300)]
    render_timeout_secs: u64,

    /// Sleep after a failed render in milliseconds.
    #[arg(long, env = "SLOTVISOR_RETRY_DELAY_MS", default_value_t = 5_000)]
    retry_delay_ms: u64,

    /// Quiet period before source changes trigger a resync, in milliseconds.
    #[arg(long, env = "SLOTVISOR_DEBOUNCE_MS", default_value_t = 1_000)]
    debounce_ms: u64,

    /// Maximum wait for render loops on shutdown, in seconds.
    #[arg(long, env = "SLOTVISOR_GRACE_SECS", default_value_t = 30)]
    grace_secs: u64,

    /// Do not watch the source directory; resync only via `POST /sync`.
    #[arg(long, env = "SLOTVISOR_NO_WATCH")]
    no_watch: bool,

    /// Listen address, e.g. 0.0.0.0:8000
    #[arg(long, env = "SLOTVISOR_LISTEN", default_value = "0.0.0.0:8000")]
    listen: SocketAddr,

    /// Log filter (env-filter syntax); `RUST_LOG` wins when set.
    #[arg(long, env = "SLOTVISOR_LOG", default_value = "info")]
    log: String,
}

impl Args {
    fn config(&self) -> Config {
        Config {
            source_dir: self.source_dir.clone(),
            config_file: self.config_file.clone(),
            slot_dir: self.slot_dir.clone(),
            temp_dir: self.temp_dir.clone(),
            command: RenderCommand {
                program: self.render_command.clone(),
                ..RenderCommand::default()
            },
            render_timeout: Duration::from_secs(self.render_timeout_secs),
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            debounce: Duration::from_millis(self.debounce_ms),
            grace: Duration::from_secs(self.grace_secs),
            ..Config::default()
        }
        .rooted_at(&self.root)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&args.log));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = args.config();
    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
    let sup = Supervisor::builder(cfg.clone()).with_subscribers(subs).build();

    let swept = sup
        .prepare()
        .await
        .context("failed to prepare working directories")?;
    if swept > 0 {
        info!(swept, "removed partial slot files from a previous run");
    }

    // A broken document at startup is fatal; later resyncs degrade to an empty generation.
    match sup.resync_for("startup").await {
        Ok(report) => info!(
            generation = report.generation,
            programs = report.assignments.len(),
            skipped = report.skipped.len(),
            "initial resync complete"
        ),
        Err(e) => {
            let _ = sup.shutdown().await;
            return Err(anyhow::Error::new(e).context("initial configuration load failed"));
        }
    }

    let watch_token = CancellationToken::new();
    let mut watcher = if args.no_watch {
        None
    } else {
        let target = Arc::downgrade(&sup);
        let watcher = ChangeWatcher::start(
            &cfg.source_dir,
            ChangeFilter::new(cfg.source_suffix.clone(), cfg.config_file.clone()),
            cfg.debounce,
            watch_token.clone(),
            move || {
                let Some(sup) = target.upgrade() else { return };
                if let Err(e) = sup.request_resync("watcher") {
                    debug!(err = %e, "resync request dropped");
                }
            },
        )
        .context("failed to start source watcher")?;
        Some(watcher)
    };

    let listener = tokio::net::TcpListener::bind(args.listen)
        .await
        .with_context(|| format!("failed to bind {}", args.listen))?;
    info!(listen = %args.listen, "http server starting");

    let server_stop = CancellationToken::new();
    let mut server = tokio::spawn({
        let app = api::router(Arc::clone(&sup));
        let stop = server_stop.clone();
        async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(stop.cancelled_owned())
                .await
        }
    });

    let mut server_done = false;
    let outcome: anyhow::Result<()> = tokio::select! {
        sig = wait_for_shutdown_signal() => match sig {
            Ok(name) => {
                info!(signal = name, "shutdown signal received");
                Ok(())
            }
            Err(e) => Err(anyhow::Error::new(e).context("failed to install signal handlers")),
        },
        err = watcher_failure(watcher.as_mut()) => {
            Err(anyhow::Error::new(err).context("source watcher failed"))
        }
        res = &mut server => {
            server_done = true;
            match res {
                Ok(Ok(())) => Err(anyhow!("http server exited unexpectedly")),
                Ok(Err(e)) => Err(anyhow::Error::new(e).context("http server failed")),
                Err(e) => Err(anyhow::Error::new(e).context("http server task failed")),
            }
        }
    };

    server_stop.cancel();
    if let Some(w) = watcher {
        w.stop().await;
    }
    let shutdown = sup.shutdown().await;
    if !server_done {
        if let Err(e) = server.await {
            warn!(err = %e, "http server task ended abnormally");
        }
    }

    outcome?;
    shutdown.context("render loops did not stop in time")?;
    info!("shutdown complete");
    Ok(())
}

async fn watcher_failure(watcher: Option<&mut ChangeWatcher>) -> WatcherError {
    match watcher {
        Some(w) => w.failed().await,
        None => future::pending().await,
    }
}
