//! Error types used by the slotvisor runtime.
//!
//! Each failure class has its own enum so callers can decide how far it may
//! propagate:
//!
//! - [`ConfigError`] the configuration document could not be read or parsed.
//! - [`ValidationError`] a single program entry was rejected (skipped, not fatal).
//! - [`RenderError`] one render attempt failed (retried on the next cycle).
//! - [`PublishError`] an artifact could not be placed into (or removed from) its slot.
//! - [`WatcherError`] the filesystem observer could not start or died.
//! - [`ResyncError`] returned to callers of [`Supervisor::resync`](crate::Supervisor::resync).
//! - [`RuntimeError`] raised by the orchestration runtime itself (shutdown).
//!
//! All types provide `as_label` for logs.

use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;

use thiserror::Error;

/// # Errors produced while loading the configuration document.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The document exists but could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The document is not valid JSON.
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The document is valid JSON but its top level is not an object.
    #[error("{path}: top-level value must be an object keyed by program name")]
    NotAnObject { path: PathBuf },
}

impl ConfigError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            ConfigError::Read { .. } => "config_read",
            ConfigError::Parse { .. } => "config_parse",
            ConfigError::NotAnObject { .. } => "config_not_object",
        }
    }
}

/// # A single program entry rejected at load time.
///
/// The entry is dropped with a warning; the rest of the document still loads.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("{program}: name must end with {suffix:?}")]
    BadSuffix { program: String, suffix: String },

    #[error("{program}: name must be a plain file name inside the source directory")]
    NotFlat { program: String },

    #[error("{program}: source file {path} does not exist")]
    MissingSource { program: String, path: PathBuf },

    #[error("{program}: entry must be an object, got {found}")]
    NotAnObject { program: String, found: &'static str },

    #[error("{program}: field {field:?} has the wrong type, expected {expected}")]
    FieldType {
        program: String,
        field: &'static str,
        expected: &'static str,
    },

    #[error("{program}: refresh_rate must be a positive number of seconds")]
    RefreshRate { program: String },

    #[error("{program}: param {key:?} has unsupported type {found}")]
    ParamType {
        program: String,
        key: String,
        found: &'static str,
    },

    #[error("{program}: param key {key:?} must be non-empty and must not contain '='")]
    ParamKey { program: String, key: String },
}

impl ValidationError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            ValidationError::BadSuffix { .. } => "invalid_suffix",
            ValidationError::NotFlat { .. } => "invalid_name",
            ValidationError::MissingSource { .. } => "missing_source",
            ValidationError::NotAnObject { .. } => "invalid_entry",
            ValidationError::FieldType { .. } => "invalid_field",
            ValidationError::RefreshRate { .. } => "invalid_refresh_rate",
            ValidationError::ParamType { .. } => "invalid_param_type",
            ValidationError::ParamKey { .. } => "invalid_param_key",
        }
    }

    /// Name of the rejected program.
    pub fn program(&self) -> &str {
        match self {
            ValidationError::BadSuffix { program, .. }
            | ValidationError::NotFlat { program }
            | ValidationError::MissingSource { program, .. }
            | ValidationError::NotAnObject { program, .. }
            | ValidationError::FieldType { program, .. }
            | ValidationError::RefreshRate { program, .. }
            | ValidationError::ParamType { program, .. }
            | ValidationError::ParamKey { program, .. } => program,
        }
    }
}

/// # Errors produced by one render attempt.
///
/// Every variant is retryable: the render loop clears the slot and tries again
/// after its retry delay.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RenderError {
    /// The render command could not be started.
    #[error("failed to launch {command}: {source}")]
    Launch {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The render command ran and exited unsuccessfully.
    #[error("render command exited with {status}")]
    Exit {
        status: ExitStatus,
        stdout: String,
        stderr: String,
    },

    /// The render command exceeded the configured hard timeout and was killed.
    #[error("render command killed after {timeout:?}")]
    TimedOut { timeout: Duration },

    /// The command reported success but wrote nothing.
    #[error("render command succeeded but produced an empty artifact")]
    EmptyOutput { stdout: String, stderr: String },

    /// Preparing the per-attempt output location failed.
    #[error("failed to prepare render output: {0}")]
    Io(#[from] std::io::Error),
}

impl RenderError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            RenderError::Launch { .. } => "render_launch",
            RenderError::Exit { .. } => "render_exit",
            RenderError::TimedOut { .. } => "render_timeout",
            RenderError::EmptyOutput { .. } => "render_empty",
            RenderError::Io(_) => "render_io",
        }
    }

    /// Exit code of the command, if it ran to completion and reported one.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            RenderError::Exit { status, .. } => status.code(),
            _ => None,
        }
    }

    /// Captured `(stdout, stderr)`, when the command produced any.
    pub fn output(&self) -> (&str, &str) {
        match self {
            RenderError::Exit { stdout, stderr, .. }
            | RenderError::EmptyOutput { stdout, stderr } => (stdout, stderr),
            _ => ("", ""),
        }
    }
}

/// # Errors produced while publishing or clearing a slot artifact.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum PublishError {
    #[error("failed to publish slot {slot}: {source}")]
    Write {
        slot: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to clear slot {slot}: {source}")]
    Clear {
        slot: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read slot {slot}: {source}")]
    Read {
        slot: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to list slot directory {path}: {source}")]
    List {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PublishError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            PublishError::Write { .. } => "publish_write",
            PublishError::Clear { .. } => "publish_clear",
            PublishError::Read { .. } => "publish_read",
            PublishError::List { .. } => "publish_list",
        }
    }
}

/// # Filesystem observer failures.
///
/// Fatal to the process: running without change detection is worse than exiting.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum WatcherError {
    #[error("failed to start watching {path}: {source}")]
    Start {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    #[error("filesystem watcher failed: {0}")]
    Backend(#[from] notify::Error),

    #[error("filesystem watcher event channel closed")]
    Closed,
}

impl WatcherError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            WatcherError::Start { .. } => "watcher_start",
            WatcherError::Backend(_) => "watcher_backend",
            WatcherError::Closed => "watcher_closed",
        }
    }
}

/// # Errors returned to callers waiting on a resync.
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum ResyncError {
    /// The document could not be loaded; the generation runs with no programs.
    #[error("configuration could not be loaded: {message}")]
    Config { label: &'static str, message: String },

    /// The supervisor is shutting down or its executor has stopped.
    #[error("supervisor is shut down")]
    Closed,
}

impl ResyncError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            ResyncError::Config { label, .. } => label,
            ResyncError::Closed => "resync_closed",
        }
    }
}

impl From<&ConfigError> for ResyncError {
    fn from(e: &ConfigError) -> Self {
        ResyncError::Config {
            label: e.as_label(),
            message: e.to_string(),
        }
    }
}

/// # Errors produced by the slotvisor runtime.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Shutdown grace period was exceeded; some render loops were still running.
    #[error("shutdown timeout {grace:?} exceeded; stuck: {stuck:?}")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Programs whose loops did not stop in time.
        stuck: Vec<String>,
    },
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use slotvisor::RuntimeError;
    /// use std::time::Duration;
    ///
    /// let err = RuntimeError::GraceExceeded { grace: Duration::from_secs(5), stuck: vec![] };
    /// assert_eq!(err.as_label(), "runtime_grace_exceeded");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::GraceExceeded { .. } => "runtime_grace_exceeded",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_reports_program() {
        let err = ValidationError::BadSuffix {
            program: "clock.py".into(),
            suffix: ".star".into(),
        };
        assert_eq!(err.program(), "clock.py");
        assert_eq!(err.as_label(), "invalid_suffix");
        assert!(err.to_string().contains(".star"));
    }

    #[test]
    fn resync_error_keeps_config_label() {
        let cfg = ConfigError::NotAnObject {
            path: PathBuf::from("program_metadata.json"),
        };
        let err = ResyncError::from(&cfg);
        assert_eq!(err.as_label(), "config_not_object");
    }

    #[test]
    fn render_error_output_only_for_completed_commands() {
        let err = RenderError::TimedOut {
            timeout: Duration::from_secs(1),
        };
        assert_eq!(err.output(), ("", ""));
        assert_eq!(err.exit_code(), None);

        let err = RenderError::EmptyOutput {
            stdout: "out".into(),
            stderr: "err".into(),
        };
        assert_eq!(err.output(), ("out", "err"));
    }
}
