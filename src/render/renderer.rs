//! # Render seam and the external-command implementation.
//!
//! [`Render`] is the single seam between a render loop and whatever produces
//! artifacts. [`CommandRenderer`] runs the configured external command; tests
//! substitute scripted implementations.
//!
//! ## Rules
//! - Output goes to a private per-attempt file in the temp directory, never the slot
//! - The per-attempt file is deleted when the [`RenderedArtifact`] (or the
//!   failed attempt) is dropped
//! - No retry inside `render`; the loop owns retry cadence
//! - A hard timeout (when configured) kills the child

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempPath;
use tokio::process::Command;
use tracing::debug;

use crate::config::{Config, RenderCommand};
use crate::error::RenderError;
use crate::programs::{Params, ProgramConfig};

/// Everything needed to render one program once.
#[derive(Clone, Debug)]
pub struct RenderRequest {
    pub program: Arc<str>,
    pub source: PathBuf,
    pub params: Params,
}

impl From<&ProgramConfig> for RenderRequest {
    fn from(p: &ProgramConfig) -> Self {
        Self {
            program: Arc::from(p.name.as_str()),
            source: p.path.clone(),
            params: p.params.clone(),
        }
    }
}

/// A successfully rendered artifact waiting to be published.
///
/// Owns its temporary file; dropping it removes the file.
#[derive(Debug)]
pub struct RenderedArtifact {
    path: TempPath,
}

impl RenderedArtifact {
    /// Wraps a temporary file produced by a renderer.
    pub fn new(path: TempPath) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Produces one artifact per call.
#[async_trait]
pub trait Render: Send + Sync + 'static {
    /// Renders `request` once.
    async fn render(&self, request: &RenderRequest) -> Result<RenderedArtifact, RenderError>;
}

/// Runs the external render command.
#[derive(Clone, Debug)]
pub struct CommandRenderer {
    command: RenderCommand,
    temp_dir: PathBuf,
    extension: String,
    timeout: Option<Duration>,
}

impl CommandRenderer {
    pub fn new(
        command: RenderCommand,
        temp_dir: impl Into<PathBuf>,
        extension: impl Into<String>,
        timeout: Option<Duration>,
    ) -> Self {
        let extension: String = extension.into();
        Self {
            command,
            temp_dir: temp_dir.into(),
            extension: extension.trim_start_matches('.').to_string(),
            timeout,
        }
    }

    /// Builds a renderer from the runtime configuration.
    pub fn from_config(cfg: &Config) -> Self {
        Self::new(
            cfg.command.clone(),
            cfg.temp_dir.clone(),
            cfg.artifact_extension.clone(),
            cfg.render_timeout(),
        )
    }

    /// Arguments for one invocation, in order.
    pub fn args(&self, request: &RenderRequest, output: &Path) -> Vec<String> {
        let mut args = self.command.leading_args.clone();
        args.push(request.source.display().to_string());
        args.extend(request.params.to_args());
        args.extend(self.command.output_args.iter().cloned());
        args.push(output.display().to_string());
        args
    }

    fn command_name(&self) -> String {
        self.command.program.display().to_string()
    }
}

#[async_trait]
impl Render for CommandRenderer {
    async fn render(&self, request: &RenderRequest) -> Result<RenderedArtifact, RenderError> {
        tokio::fs::create_dir_all(&self.temp_dir).await?;
        let output = tempfile::Builder::new()
            .prefix("render-")
            .suffix(&format!(".{}", self.extension))
            .tempfile_in(&self.temp_dir)?
            .into_temp_path();

        let args = self.args(request, &output);
        debug!(
            program = %request.program,
            command = %self.command_name(),
            ?args,
            "running render command"
        );

        let child = Command::new(&self.command.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| RenderError::Launch {
                command: self.command_name(),
                source,
            })?;

        // Dropping the wait future drops the child, which kills it.
        let out = match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, child.wait_with_output())
                .await
                .map_err(|_| RenderError::TimedOut { timeout })??,
            None => child.wait_with_output().await?,
        };

        let stdout = String::from_utf8_lossy(&out.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&out.stderr).into_owned();
        if !out.status.success() {
            return Err(RenderError::Exit {
                status: out.status,
                stdout,
                stderr,
            });
        }

        let len = tokio::fs::metadata(&output).await.map(|m| m.len()).unwrap_or(0);
        if len == 0 {
            return Err(RenderError::EmptyOutput { stdout, stderr });
        }
        Ok(RenderedArtifact::new(output))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::programs::ParamValue;
    use tempfile::tempdir;

    /// Runs `script` through `/bin/sh` so the test never executes a freshly written file.
    fn renderer(work: &Path, script: &str, timeout: Option<Duration>) -> CommandRenderer {
        let script_path = work.join("render.sh");
        std::fs::write(&script_path, script).unwrap();
        CommandRenderer::new(
            RenderCommand {
                program: PathBuf::from("/bin/sh"),
                leading_args: vec![script_path.display().to_string(), "render".into()],
                output_args: vec!["-o".into()],
            },
            work.join("temp"),
            "gif",
            timeout,
        )
    }

    fn request(work: &Path) -> RenderRequest {
        let mut params = Params::new();
        params.push("clock.star", "zone", ParamValue::Str("UTC".into())).unwrap();
        params.push("clock.star", "h24", ParamValue::Bool(true)).unwrap();
        RenderRequest {
            program: Arc::from("clock.star"),
            source: work.join("clock.star"),
            params,
        }
    }

    fn temp_entries(work: &Path) -> usize {
        std::fs::read_dir(work.join("temp")).map(|rd| rd.count()).unwrap_or(0)
    }

    #[tokio::test]
    async fn passes_arguments_in_order_and_keeps_output() {
        let work = tempdir().unwrap();
        let r = renderer(
            work.path(),
            "for a in \"$@\"; do out=\"$a\"; done\nprintf '%s\\n' \"$@\" > \"$out\"\n",
            None,
        );
        let req = request(work.path());
        let artifact = r.render(&req).await.unwrap();

        let written = std::fs::read_to_string(artifact.path()).unwrap();
        let lines: Vec<&str> = written.lines().collect();
        let src = work.path().join("clock.star").display().to_string();
        let out = artifact.path().display().to_string();
        assert_eq!(lines, vec!["render", &src, "zone=UTC", "h24=true", "-o", &out]);
        assert!(out.ends_with(".gif"));

        let path = artifact.path().to_path_buf();
        drop(artifact);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn nonzero_exit_reports_output_and_cleans_up() {
        let work = tempdir().unwrap();
        let r = renderer(work.path(), "echo partial\necho boom >&2\nexit 3\n", None);
        let err = r.render(&request(work.path())).await.unwrap_err();

        assert_eq!(err.as_label(), "render_exit");
        assert_eq!(err.exit_code(), Some(3));
        assert_eq!(err.output(), ("partial\n", "boom\n"));
        assert_eq!(temp_entries(work.path()), 0);
    }

    #[tokio::test]
    async fn empty_output_is_a_failure() {
        let work = tempdir().unwrap();
        let r = renderer(work.path(), "exit 0\n", None);
        let err = r.render(&request(work.path())).await.unwrap_err();
        assert_eq!(err.as_label(), "render_empty");
        assert_eq!(temp_entries(work.path()), 0);
    }

    #[tokio::test]
    async fn timeout_kills_the_command() {
        let work = tempdir().unwrap();
        let r = renderer(work.path(), "sleep 5\n", Some(Duration::from_millis(100)));
        let started = std::time::Instant::now();
        let err = r.render(&request(work.path())).await.unwrap_err();
        assert_eq!(err.as_label(), "render_timeout");
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn missing_command_is_launch_failure() {
        let work = tempdir().unwrap();
        let r = CommandRenderer::new(
            RenderCommand {
                program: work.path().join("no-such-renderer"),
                ..RenderCommand::default()
            },
            work.path().join("temp"),
            "gif",
            None,
        );
        let err = r.render(&request(work.path())).await.unwrap_err();
        assert_eq!(err.as_label(), "render_launch");
        assert_eq!(temp_entries(work.path()), 0);
    }
}
