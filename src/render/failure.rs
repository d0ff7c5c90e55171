//! # Latest failure per program, kept for diagnostics.
//!
//! A record is overwritten by the program's next failure. Nothing reads it
//! to make scheduling decisions.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tokio::sync::RwLock;

use crate::error::{PublishError, RenderError};

/// Captured stdout/stderr are cut to this many bytes.
pub const MAX_CAPTURED_OUTPUT: usize = 8 * 1024;

/// Details of one failed cycle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FailureRecord {
    pub program: String,
    /// Unix milliseconds.
    pub at_ms: u64,
    /// Stable label of the cause (`render_exit`, `publish_write`, ..).
    pub cause: &'static str,
    pub message: String,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl FailureRecord {
    pub fn from_render(program: &str, err: &RenderError) -> Self {
        let (stdout, stderr) = err.output();
        Self {
            program: program.to_string(),
            at_ms: now_ms(),
            cause: err.as_label(),
            message: err.to_string(),
            exit_code: err.exit_code(),
            stdout: truncate(stdout, MAX_CAPTURED_OUTPUT),
            stderr: truncate(stderr, MAX_CAPTURED_OUTPUT),
        }
    }

    pub fn from_publish(program: &str, err: &PublishError) -> Self {
        Self {
            program: program.to_string(),
            at_ms: now_ms(),
            cause: err.as_label(),
            message: err.to_string(),
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
        }
    }
}

/// Shared map of program name to its latest [`FailureRecord`].
#[derive(Default)]
pub struct FailureLog {
    records: RwLock<HashMap<String, FailureRecord>>,
}

impl FailureLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `record`, replacing the program's previous one.
    pub async fn record(&self, record: FailureRecord) {
        self.records
            .write()
            .await
            .insert(record.program.clone(), record);
    }

    pub async fn get(&self, program: &str) -> Option<FailureRecord> {
        self.records.read().await.get(program).cloned()
    }

    /// All records ordered by program name.
    pub async fn snapshot(&self) -> Vec<FailureRecord> {
        let mut all: Vec<FailureRecord> = self.records.read().await.values().cloned().collect();
        all.sort_by(|a, b| a.program.cmp(&b.program));
        all
    }

    /// Drops records of programs not in `keep`.
    pub async fn retain_programs(&self, keep: &[&str]) {
        self.records
            .write()
            .await
            .retain(|name, _| keep.contains(&name.as_str()));
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…[truncated]", &s[..end])
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
