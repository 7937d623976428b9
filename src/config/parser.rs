//! Mapping source discovery and JSON parsing.

use std::env;
use std::fmt;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::common::error::ConfigError;

/// Environment variable holding a path to the mapping file.
pub const MAPPINGS_FILE_VAR: &str = "CHANNEL_MAPPINGS_FILE";

/// Environment variable holding the mapping JSON inline.
pub const MAPPINGS_INLINE_VAR: &str = "CHANNEL_MAPPINGS";

/// Mapping file used when no environment variable points elsewhere.
pub const DEFAULT_MAPPINGS_PATH: &str = "config/channels.json";

/// Where the bridge mappings come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MappingSource {
    /// A JSON file on disk.
    File(PathBuf),
    /// A JSON document supplied directly (usually from the environment).
    Inline(String),
}

impl MappingSource {
    /// Discover the mapping source from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::discover(|name| env::var(name).ok(), Path::new(DEFAULT_MAPPINGS_PATH))
    }

    /// Discover the mapping source.
    ///
    /// Order: explicit file variable, default file if present, inline variable.
    pub fn discover<F>(lookup: F, default_path: &Path) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(path) = non_empty(MAPPINGS_FILE_VAR) {
            return Ok(Self::File(PathBuf::from(path)));
        }
        if default_path.is_file() {
            return Ok(Self::File(default_path.to_path_buf()));
        }
        if let Some(json) = non_empty(MAPPINGS_INLINE_VAR) {
            return Ok(Self::Inline(json));
        }

        Err(ConfigError::NoMappingSource {
            default_path: default_path.display().to_string(),
        })
    }
}

impl fmt::Display for MappingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "file {}", path.display()),
            Self::Inline(_) => write!(f, "${}", MAPPINGS_INLINE_VAR),
        }
    }
}

/// Read the raw JSON text of a source.
pub fn read_source(source: &MappingSource) -> Result<String, ConfigError> {
    match source {
        MappingSource::File(path) => {
            std::fs::read_to_string(path).map_err(|e| ConfigError::IoError {
                path: path.display().to_string(),
                source: e,
            })
        }
        MappingSource::Inline(json) => Ok(json.clone()),
    }
}

/// Parse mapping JSON into unvalidated bridge entries.
///
/// Entries stay as JSON values so that validation can report every
/// structural problem instead of the first serde error.
pub fn parse_mappings(content: &str) -> Result<Vec<Value>, ConfigError> {
    let root: Value = serde_json::from_str(content).map_err(|e| ConfigError::ParseError {
        message: e.to_string(),
    })?;

    match root.get("bridges") {
        Some(Value::Array(bridges)) => Ok(bridges.clone()),
        Some(_) => Err(ConfigError::ParseError {
            message: "'bridges' must be a list".to_string(),
        }),
        None => Err(ConfigError::ParseError {
            message: "missing 'bridges' list".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_explicit_file_wins() {
        let source = MappingSource::discover(
            lookup(&[(MAPPINGS_FILE_VAR, "/etc/bridges.json"), (MAPPINGS_INLINE_VAR, "{}")]),
            Path::new("/nonexistent/channels.json"),
        )
        .unwrap();
        assert_eq!(source, MappingSource::File(PathBuf::from("/etc/bridges.json")));
    }

    #[test]
    fn test_default_file_before_inline() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("channels.json");
        std::fs::write(&path, r#"{"bridges":[]}"#).unwrap();

        let source =
            MappingSource::discover(lookup(&[(MAPPINGS_INLINE_VAR, "{}")]), &path).unwrap();
        assert_eq!(source, MappingSource::File(path));
    }

    #[test]
    fn test_inline_fallback() {
        let source = MappingSource::discover(
            lookup(&[(MAPPINGS_INLINE_VAR, r#"{"bridges":[]}"#)]),
            Path::new("/nonexistent/channels.json"),
        )
        .unwrap();
        assert!(matches!(source, MappingSource::Inline(_)));
    }

    #[test]
    fn test_no_source_is_config_error() {
        let result = MappingSource::discover(
            lookup(&[(MAPPINGS_INLINE_VAR, "   ")]),
            Path::new("/nonexistent/channels.json"),
        );
        assert!(matches!(result, Err(ConfigError::NoMappingSource { .. })));
    }

    #[test]
    fn test_parse_requires_bridges_list() {
        assert!(parse_mappings(r#"{"bridges":[]}"#).unwrap().is_empty());
        assert!(parse_mappings(r#"{"bridges":{}}"#).is_err());
        assert!(parse_mappings(r#"{}"#).is_err());
        assert!(parse_mappings("not json").is_err());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let source = MappingSource::File(PathBuf::from("/nonexistent/channels.json"));
        assert!(matches!(read_source(&source), Err(ConfigError::IoError { .. })));
    }
}
