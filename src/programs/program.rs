//! # Program configuration snapshot types.
//!
//! A [`ProgramConfig`] is one validated entry of the configuration document.
//! Snapshots are immutable: every resync loads a brand-new [`ProgramSet`].

use std::cmp::Ordering;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

use crate::error::ValidationError;

/// Refresh period used when an entry does not set `refresh_rate`.
pub const DEFAULT_REFRESH_RATE_SECS: u64 = 60;

/// Primitive parameter value passed to the render command.
///
/// The set is closed: anything else in the document is rejected at load time.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl ParamValue {
    /// Converts a JSON value, rejecting null, arrays and objects.
    pub(crate) fn from_json(value: &serde_json::Value) -> Result<Self, &'static str> {
        use serde_json::Value;
        match value {
            Value::String(s) => Ok(ParamValue::Str(s.clone())),
            Value::Bool(b) => Ok(ParamValue::Bool(*b)),
            Value::Number(n) => match (n.as_i64(), n.as_f64()) {
                (Some(i), _) => Ok(ParamValue::Int(i)),
                (None, Some(f)) => Ok(ParamValue::Float(f)),
                (None, None) => Err("number"),
            },
            Value::Null => Err("null"),
            Value::Array(_) => Err("array"),
            Value::Object(_) => Err("object"),
        }
    }
}

/// Integral floats below this magnitude are printed with a trailing `.0`.
const INTEGRAL_FLOAT_LIMIT: f64 = 1e16;

impl fmt::Display for ParamValue {
    /// Strings verbatim, integers in decimal, booleans as `True`/`False`.
    /// Floats keep a fractional part (`1.0`, `2.5`), the form pixlet
    /// programs have always been handed.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Str(s) => f.write_str(s),
            ParamValue::Int(i) => write!(f, "{i}"),
            ParamValue::Float(x) if x.fract() == 0.0 && x.abs() < INTEGRAL_FLOAT_LIMIT => {
                write!(f, "{x:.1}")
            }
            ParamValue::Float(x) => write!(f, "{x}"),
            ParamValue::Bool(true) => f.write_str("True"),
            ParamValue::Bool(false) => f.write_str("False"),
        }
    }
}

/// Ordered `key → value` parameters of one program.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Params(Vec<(String, ParamValue)>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a parameter after validating its key.
    pub fn push(
        &mut self,
        program: &str,
        key: impl Into<String>,
        value: ParamValue,
    ) -> Result<(), ValidationError> {
        let key = key.into();
        if key.is_empty() || key.contains('=') {
            return Err(ValidationError::ParamKey {
                program: program.to_string(),
                key,
            });
        }
        self.0.push((key, value));
        Ok(())
    }

    /// `key=value` arguments in insertion order.
    pub fn to_args(&self) -> Vec<String> {
        self.0.iter().map(|(k, v)| format!("{k}={v}")).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One validated program entry.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ProgramConfig {
    /// Source file name, unique within the document.
    pub name: String,
    /// Resolved source file path.
    pub path: PathBuf,
    pub enabled: bool,
    /// Refresh period in whole seconds (always positive).
    pub refresh_rate: u64,
    /// Sort key; `None` sorts after every explicit order.
    pub order: Option<i64>,
    pub params: Params,
}

impl ProgramConfig {
    /// Refresh period as a `Duration`.
    pub fn refresh(&self) -> Duration {
        Duration::from_secs(self.refresh_rate)
    }

    /// Total slot ordering: `(order ascending, name ascending)`, missing order last.
    pub fn slot_order(&self, other: &Self) -> Ordering {
        (self.order.is_none(), self.order)
            .cmp(&(other.order.is_none(), other.order))
            .then_with(|| self.name.cmp(&other.name))
    }
}

/// Result of one configuration load.
#[derive(Clone, Debug, Default)]
pub struct ProgramSet {
    /// Valid entries (enabled and disabled) in document order.
    pub programs: Vec<ProgramConfig>,
    /// Entries dropped with a warning.
    pub skipped: Vec<ValidationError>,
}

impl ProgramSet {
    /// Valid entries that should get a render loop.
    pub fn enabled(&self) -> impl Iterator<Item = &ProgramConfig> {
        self.programs.iter().filter(|p| p.enabled)
    }
}
