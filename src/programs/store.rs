//! # ConfigStore: loads and validates the configuration document.
//!
//! The document is a JSON object keyed by program source file name:
//! ```json
//! {
//!   "clock.star":   { "enabled": true, "refresh_rate": 30, "order": 0,
//!                     "config": { "timezone": "UTC", "24h": true } },
//!   "weather.star": { "enabled": false }
//! }
//! ```
//!
//! ## Rules
//! - Missing document → empty set plus a warning (not an error)
//! - Unreadable or malformed document → [`ConfigError`]
//! - Bad entry (suffix, path-like name, missing source, wrong field types, non-primitive
//!   param) → dropped into [`ProgramSet::skipped`], the rest still loads
//! - Disabled entries are kept; the allocator filters them
//! - Entry and param order follow the document

use std::path::{Component, Path, PathBuf};

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::{ConfigError, ValidationError};
use crate::programs::program::{
    DEFAULT_REFRESH_RATE_SECS, ParamValue, Params, ProgramConfig, ProgramSet,
};

/// Loader for the program configuration document.
#[derive(Clone, Debug)]
pub struct ConfigStore {
    source_dir: PathBuf,
    config_file: String,
    suffix: String,
}

impl ConfigStore {
    /// Creates a store reading `source_dir/config_file`, accepting programs
    /// whose names end with `suffix`.
    pub fn new(
        source_dir: impl Into<PathBuf>,
        config_file: impl Into<String>,
        suffix: impl Into<String>,
    ) -> Self {
        Self {
            source_dir: source_dir.into(),
            config_file: config_file.into(),
            suffix: suffix.into(),
        }
    }

    pub fn source_dir(&self) -> &Path {
        &self.source_dir
    }

    /// Full path of the configuration document.
    pub fn config_path(&self) -> PathBuf {
        self.source_dir.join(&self.config_file)
    }

    /// Loads a fresh snapshot of the document.
    pub async fn load(&self) -> Result<ProgramSet, ConfigError> {
        let path = self.config_path();
        let bytes = match tokio::fs::read(&path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(
                    path = %path.display(),
                    "no configuration document found; running no programs"
                );
                return Ok(ProgramSet::default());
            }
            Err(source) => return Err(ConfigError::Read { path, source }),
        };

        let doc: Value = serde_json::from_slice(&bytes).map_err(|source| ConfigError::Parse {
            path: path.clone(),
            source,
        })?;
        let Value::Object(entries) = doc else {
            return Err(ConfigError::NotAnObject { path });
        };

        let mut set = ProgramSet::default();
        for (name, value) in &entries {
            match self.parse_entry(name, value).await {
                Ok(program) => set.programs.push(program),
                Err(e) => {
                    debug!(program = %name, err = %e, "rejected program entry");
                    set.skipped.push(e);
                }
            }
        }
        Ok(set)
    }

    async fn parse_entry(
        &self,
        name: &str,
        value: &Value,
    ) -> Result<ProgramConfig, ValidationError> {
        if !name.ends_with(&self.suffix) || name.len() == self.suffix.len() {
            return Err(ValidationError::BadSuffix {
                program: name.to_string(),
                suffix: self.suffix.clone(),
            });
        }
        // The watcher is non-recursive; only direct children of the source dir are seen.
        if !is_plain_file_name(name) {
            return Err(ValidationError::NotFlat {
                program: name.to_string(),
            });
        }
        let Value::Object(fields) = value else {
            return Err(ValidationError::NotAnObject {
                program: name.to_string(),
                found: json_type(value),
            });
        };

        let enabled = match fields.get("enabled") {
            None | Some(Value::Null) => false,
            Some(Value::Bool(b)) => *b,
            Some(_) => return Err(field_type(name, "enabled", "bool")),
        };

        let refresh_rate = match fields.get("refresh_rate") {
            None | Some(Value::Null) => DEFAULT_REFRESH_RATE_SECS,
            Some(v) => match v.as_u64() {
                Some(secs) if secs > 0 => secs,
                _ => {
                    return Err(ValidationError::RefreshRate {
                        program: name.to_string(),
                    });
                }
            },
        };

        let order = match fields.get("order") {
            None | Some(Value::Null) => None,
            Some(v) => Some(v.as_i64().ok_or_else(|| field_type(name, "order", "integer"))?),
        };

        let params = match fields.get("config") {
            None | Some(Value::Null) => Params::new(),
            Some(Value::Object(map)) => parse_params(name, map)?,
            Some(_) => return Err(field_type(name, "config", "object")),
        };

        // Disabled entries never render, so their source is not required.
        let path = self.source_dir.join(name);
        if enabled && !is_file(&path).await {
            return Err(ValidationError::MissingSource {
                program: name.to_string(),
                path,
            });
        }

        Ok(ProgramConfig {
            name: name.to_string(),
            path,
            enabled,
            refresh_rate,
            order,
            params,
        })
    }
}

fn parse_params(program: &str, map: &Map<String, Value>) -> Result<Params, ValidationError> {
    let mut params = Params::new();
    for (key, value) in map {
        let value = ParamValue::from_json(value).map_err(|found| ValidationError::ParamType {
            program: program.to_string(),
            key: key.clone(),
            found,
        })?;
        params.push(program, key.clone(), value)?;
    }
    Ok(params)
}

fn field_type(program: &str, field: &'static str, expected: &'static str) -> ValidationError {
    ValidationError::FieldType {
        program: program.to_string(),
        field,
        expected,
    }
}

fn is_plain_file_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    ) && !name.contains(['/', '\\'])
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::programs::ParamValue;
    use tempfile::tempdir;

    fn store(dir: &Path) -> ConfigStore {
        ConfigStore::new(dir, "program_metadata.json", ".star")
    }

    fn write_doc(dir: &Path, doc: &str) {
        std::fs::write(dir.join("program_metadata.json"), doc).unwrap();
    }

    fn touch(dir: &Path, name: &str) {
        std::fs::write(dir.join(name), "def main(): pass").unwrap();
    }

    #[tokio::test]
    async fn missing_document_is_empty_not_error() {
        let dir = tempdir().unwrap();
        let set = store(dir.path()).load().await.unwrap();
        assert!(set.programs.is_empty());
        assert!(set.skipped.is_empty());
    }

    #[tokio::test]
    async fn malformed_document_is_config_error() {
        let dir = tempdir().unwrap();
        write_doc(dir.path(), "{ not json");
        let err = store(dir.path()).load().await.unwrap_err();
        assert_eq!(err.as_label(), "config_parse");

        write_doc(dir.path(), "[1, 2, 3]");
        let err = store(dir.path()).load().await.unwrap_err();
        assert_eq!(err.as_label(), "config_not_object");
    }

    #[tokio::test]
    async fn loads_entries_with_defaults_in_document_order() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "b.star");
        touch(dir.path(), "a.star");
        write_doc(
            dir.path(),
            r#"{
                "b.star": { "enabled": true, "order": 0, "refresh_rate": 15 },
                "a.star": { "enabled": true, "config": { "zone": "UTC", "n": 2, "big": true } },
                "c.star": { "enabled": false }
            }"#,
        );

        let set = store(dir.path()).load().await.unwrap();
        let names: Vec<&str> = set.programs.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["b.star", "a.star", "c.star"]);
        assert!(set.skipped.is_empty());

        let b = &set.programs[0];
        assert_eq!((b.refresh_rate, b.order), (15, Some(0)));

        let a = &set.programs[1];
        assert_eq!((a.refresh_rate, a.order), (DEFAULT_REFRESH_RATE_SECS, None));
        assert_eq!(a.path, dir.path().join("a.star"));
        let params: Vec<(&str, &ParamValue)> = a.params.iter().collect();
        assert_eq!(
            params,
            vec![
                ("zone", &ParamValue::Str("UTC".into())),
                ("n", &ParamValue::Int(2)),
                ("big", &ParamValue::Bool(true)),
            ]
        );

        let c = &set.programs[2];
        assert!(!c.enabled);
        assert_eq!(set.enabled().count(), 2);
    }

    #[tokio::test]
    async fn invalid_entries_are_skipped_individually() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "ok.star");
        touch(dir.path(), "params.star");
        touch(dir.path(), "rate.star");
        write_doc(
            dir.path(),
            r#"{
                "ok.star":      { "enabled": true },
                "clock.py":     { "enabled": true },
                "ghost.star":   { "enabled": true },
                "params.star":  { "enabled": true, "config": { "list": [1, 2] } },
                "rate.star":    { "enabled": true, "refresh_rate": 0 },
                "weird.star":   42
            }"#,
        );

        let set = store(dir.path()).load().await.unwrap();
        assert_eq!(set.programs.len(), 1);
        assert_eq!(set.programs[0].name, "ok.star");

        let labels: Vec<(&str, &str)> = set
            .skipped
            .iter()
            .map(|e| (e.program(), e.as_label()))
            .collect();
        assert_eq!(
            labels,
            vec![
                ("clock.py", "invalid_suffix"),
                ("ghost.star", "missing_source"),
                ("params.star", "invalid_param_type"),
                ("rate.star", "invalid_refresh_rate"),
                ("weird.star", "invalid_entry"),
            ]
        );
    }

    #[tokio::test]
    async fn disabled_entry_without_source_is_retained() {
        let dir = tempdir().unwrap();
        write_doc(dir.path(), r#"{ "off.star": { "enabled": false } }"#);
        let set = store(dir.path()).load().await.unwrap();
        assert_eq!(set.programs.len(), 1);
        assert_eq!(set.enabled().count(), 0);
    }

    #[tokio::test]
    async fn path_like_names_are_rejected() {
        let work = tempdir().unwrap();
        let src = work.path().join("src");
        std::fs::create_dir_all(src.join("sub")).unwrap();
        touch(&src.join("sub"), "x.star");
        touch(work.path(), "outside.star");
        touch(&src, "ok.star");
        write_doc(
            &src,
            r#"{
                "sub/x.star":      { "enabled": true },
                "../outside.star": { "enabled": true },
                "ok.star":         { "enabled": true }
            }"#,
        );

        let set = store(&src).load().await.unwrap();
        let names: Vec<&str> = set.programs.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["ok.star"]);

        let labels: Vec<(&str, &str)> = set
            .skipped
            .iter()
            .map(|e| (e.program(), e.as_label()))
            .collect();
        assert_eq!(
            labels,
            vec![("sub/x.star", "invalid_name"), ("../outside.star", "invalid_name")]
        );
    }
}
