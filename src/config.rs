//! # Global runtime configuration.
//!
//! Provides [`Config`] centralized settings for the supervisor runtime.
//!
//! Config is used in two ways:
//! 1. **Supervisor creation**: `Supervisor::builder(config)`
//! 2. **Component wiring**: the builder derives the [`ConfigStore`](crate::ConfigStore),
//!    [`ArtifactPublisher`](crate::ArtifactPublisher), [`CommandRenderer`](crate::CommandRenderer)
//!    and [`CadencePolicy`](crate::CadencePolicy) from it.
//!
//! ## Sentinel values
//! - `render_timeout = 0s` → no hard timeout on the render command
//! - `bus_capacity = 0` → clamped to 1

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::policies::CadencePolicy;

/// Default name of the configuration document inside the source directory.
pub const DEFAULT_CONFIG_FILE: &str = "program_metadata.json";

/// Default suffix recognized as a program source file.
pub const DEFAULT_SOURCE_SUFFIX: &str = ".star";

/// External command used to render one program.
///
/// The invocation is
/// `program <leading_args..> <source> key=value.. <output_args..> <output path>`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderCommand {
    /// Executable to run (looked up in `PATH` when relative).
    pub program: PathBuf,
    /// Arguments placed before the source path.
    pub leading_args: Vec<String>,
    /// Arguments placed after the params, immediately before the output path.
    pub output_args: Vec<String>,
}

impl Default for RenderCommand {
    /// `pixlet render <source> k=v.. --gif -o <output>`
    fn default() -> Self {
        Self {
            program: PathBuf::from("pixlet"),
            leading_args: vec!["render".into()],
            output_args: vec!["--gif".into(), "-o".into()],
        }
    }
}

/// Global configuration for the supervisor runtime.
///
/// ## Field semantics
/// - `source_dir`: flat directory holding program sources and the document
/// - `slot_dir`: publication surface read by the playback process
/// - `temp_dir`: private per-attempt render outputs
/// - `debounce`: quiet period before a burst of source changes triggers a resync
/// - `min_sleep` / `retry_delay`: render loop cadence (see [`CadencePolicy`])
/// - `render_timeout`: hard bound on one render invocation (`0s` = none)
/// - `grace`: maximum wait for loops to stop on shutdown
#[derive(Clone, Debug)]
pub struct Config {
    /// Directory containing program sources and the configuration document.
    pub source_dir: PathBuf,
    /// File name of the configuration document inside `source_dir`.
    pub config_file: String,
    /// Suffix a program name must carry to be accepted.
    pub source_suffix: String,

    /// Directory slot artifacts are published into.
    pub slot_dir: PathBuf,
    /// Directory for per-attempt render outputs.
    pub temp_dir: PathBuf,
    /// Extension of slot artifacts (`slot{n}.{ext}`).
    pub artifact_extension: String,

    /// External render command.
    pub command: RenderCommand,
    /// Hard timeout for one render invocation.
    ///
    /// - `Duration::ZERO` = no timeout (a hung command blocks its loop's cancellation)
    /// - `> 0` = the child is killed and the attempt fails with `RenderError::TimedOut`
    pub render_timeout: Duration,

    /// Lower bound on the sleep after a successful cycle.
    pub min_sleep: Duration,
    /// Fixed sleep after a failed cycle.
    pub retry_delay: Duration,

    /// Quiet period used to debounce filesystem events.
    pub debounce: Duration,

    /// Maximum time to wait for render loops to stop on shutdown.
    pub grace: Duration,

    /// Capacity of the event bus broadcast channel ring buffer.
    pub bus_capacity: usize,
}

impl Config {
    /// Full path of the configuration document.
    pub fn config_path(&self) -> PathBuf {
        self.source_dir.join(&self.config_file)
    }

    /// Returns the render timeout as an `Option`.
    ///
    /// - `None` → no timeout
    /// - `Some(d)` → applied to each invocation
    #[inline]
    pub fn render_timeout(&self) -> Option<Duration> {
        if self.render_timeout == Duration::ZERO {
            None
        } else {
            Some(self.render_timeout)
        }
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// Cadence used by every render loop.
    #[inline]
    pub fn cadence(&self) -> CadencePolicy {
        CadencePolicy {
            min_sleep: self.min_sleep,
            retry_delay: self.retry_delay,
        }
    }

    /// Returns a copy rooted at `base`: every directory becomes `base/<dir>`
    /// unless it is already absolute.
    pub fn rooted_at(mut self, base: &Path) -> Self {
        for dir in [&mut self.source_dir, &mut self.slot_dir, &mut self.temp_dir] {
            if dir.is_relative() {
                *dir = base.join(&*dir);
            }
        }
        self
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `source_dir = star_programs_cache`, `slot_dir = gifs`, `temp_dir = temp`
    /// - `debounce = 1s`, `min_sleep = 100ms`, `retry_delay = 5s`
    /// - `render_timeout = 300s`, `grace = 30s`, `bus_capacity = 1024`
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("star_programs_cache"),
            config_file: DEFAULT_CONFIG_FILE.to_string(),
            source_suffix: DEFAULT_SOURCE_SUFFIX.to_string(),
            slot_dir: PathBuf::from("gifs"),
            temp_dir: PathBuf::from("temp"),
            artifact_extension: "gif".to_string(),
            command: RenderCommand::default(),
            render_timeout: Duration::from_secs(300),
            min_sleep: Duration::from_millis(100),
            retry_delay: Duration::from_secs(5),
            debounce: Duration::from_secs(1),
            grace: Duration::from_secs(30),
            bus_capacity: 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_render_timeout_means_none() {
        let cfg = Config {
            render_timeout: Duration::ZERO,
            ..Config::default()
        };
        assert_eq!(cfg.render_timeout(), None);
        assert_eq!(
            Config::default().render_timeout(),
            Some(Duration::from_secs(300))
        );
    }

    #[test]
    fn rooted_at_keeps_absolute_dirs() {
        let cfg = Config {
            slot_dir: PathBuf::from("/srv/slots"),
            ..Config::default()
        }
        .rooted_at(Path::new("/opt/render"));

        assert_eq!(cfg.slot_dir, PathBuf::from("/srv/slots"));
        assert_eq!(cfg.source_dir, PathBuf::from("/opt/render/star_programs_cache"));
        assert_eq!(
            cfg.config_path(),
            PathBuf::from("/opt/render/star_programs_cache/program_metadata.json")
        );
    }
}
