use std::{collections::HashMap, path::PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("failed to parse {key} option: invalid boolean {value:?}")]
    InvalidBool { key: String, value: String },
}

/// Static client configuration.
///
/// Options are plain strings namespaced by their consumer, e.g. `driver.raw_exec.enable`.
/// Typed accessors parse on read, so a malformed value surfaces where it is used.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    /// Root under which allocation directories are created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alloc_dir: Option<PathBuf>,
    #[serde(default)]
    pub options: HashMap<String, String>,
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    pub fn read(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }

    /// Returns the option or `default` when it is absent.
    pub fn read_default<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.read(key).unwrap_or(default)
    }

    /// Parses a boolean option, falling back to `default` when it is absent.
    pub fn read_bool_default(&self, key: &str, default: bool) -> Result<bool, ConfigError> {
        match self.read(key) {
            None => Ok(default),
            Some(raw) => parse_bool(raw).ok_or_else(|| ConfigError::InvalidBool {
                key: key.to_string(),
                value: raw.to_string(),
            }),
        }
    }
}

/// Parses the boolean spellings accepted in client options.
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim() {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_bool_accepts_known_spellings() {
        for raw in ["1", "t", "T", "true", "TRUE", "True", " true "] {
            assert_eq!(parse_bool(raw), Some(true), "{raw}");
        }
        for raw in ["0", "f", "F", "false", "FALSE", "False"] {
            assert_eq!(parse_bool(raw), Some(false), "{raw}");
        }
        for raw in ["", "yes", "tRuE", "2"] {
            assert_eq!(parse_bool(raw), None, "{raw}");
        }
    }

    #[test]
    fn read_bool_default_when_absent() {
        let cfg = ClientConfig::new();
        assert_eq!(cfg.read_bool_default("driver.raw_exec.enable", false), Ok(false));
        assert_eq!(cfg.read_bool_default("driver.raw_exec.enable", true), Ok(true));
    }

    #[test]
    fn read_bool_default_reports_malformed_value() {
        let cfg = ClientConfig::new().with_option("driver.raw_exec.enable", "sure");
        let err = cfg
            .read_bool_default("driver.raw_exec.enable", false)
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidBool {
                key: "driver.raw_exec.enable".into(),
                value: "sure".into()
            }
        );
    }

    #[test]
    fn read_default_falls_back() {
        let cfg = ClientConfig::new().with_option("a", "1");
        assert_eq!(cfg.read_default("a", "x"), "1");
        assert_eq!(cfg.read_default("b", "x"), "x");
    }

    #[test]
    fn deserialize_from_json() {
        let cfg: ClientConfig = serde_json::from_str(
            r#"{"allocDir":"/var/lib/tno/alloc","options":{"driver.raw_exec.enable":"true"}}"#,
        )
        .unwrap();
        assert_eq!(cfg.alloc_dir, Some(PathBuf::from("/var/lib/tno/alloc")));
        assert_eq!(cfg.read_bool_default("driver.raw_exec.enable", false), Ok(true));
    }
}
