use std::collections::HashMap;

use serde::{Deserialize, Serialize};

mod resources;
pub use resources::{NetworkResource, Port, Resources};

/// Literal command to execute.
pub const CONFIG_COMMAND: &str = "command";
/// Artifact URI fetched and executed when no command is given.
pub const CONFIG_ARTIFACT_SOURCE: &str = "artifact_source";
/// Argument string, split and templated against the task environment.
pub const CONFIG_ARGS: &str = "args";

/// Description of a single task as consumed by a driver.
///
/// Driver-specific settings live in the free-form `config` map; the drivers in this
/// workspace read [`CONFIG_COMMAND`], [`CONFIG_ARTIFACT_SOURCE`] and [`CONFIG_ARGS`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Task name, unique inside its allocation.
    pub name: String,
    /// Name of the driver that should run the task (e.g. `"raw_exec"`).
    pub driver: String,
    /// Driver configuration.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub config: HashMap<String, String>,
    /// Extra environment variables for the process.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,
    /// Requested resources.
    ///
    /// `None` means the task runs unconstrained.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<Resources>,
    /// Opaque metadata, exported to the process environment.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub meta: HashMap<String, String>,
}

impl Task {
    pub fn new(name: impl Into<String>, driver: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            driver: driver.into(),
            ..Self::default()
        }
    }

    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    pub fn with_resources(mut self, resources: Resources) -> Self {
        self.resources = Some(resources);
        self
    }

    /// Returns a config value, treating an empty string the same as a missing key.
    pub fn config_value(&self, key: &str) -> Option<&str> {
        self.config
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    #[inline]
    pub fn command(&self) -> Option<&str> {
        self.config_value(CONFIG_COMMAND)
    }

    #[inline]
    pub fn artifact_source(&self) -> Option<&str> {
        self.config_value(CONFIG_ARTIFACT_SOURCE)
    }

    /// Raw argument string. Unlike the command, an empty string is still returned.
    #[inline]
    pub fn args(&self) -> Option<&str> {
        self.config.get(CONFIG_ARGS).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_values_count_as_missing() {
        let task = Task::new("web", "raw_exec")
            .with_config(CONFIG_COMMAND, "")
            .with_config(CONFIG_ARTIFACT_SOURCE, "https://example.com/bin/app");

        assert_eq!(task.command(), None);
        assert_eq!(task.artifact_source(), Some("https://example.com/bin/app"));
        assert_eq!(task.args(), None);
    }

    #[test]
    fn serde_uses_camel_case_and_skips_empty() {
        let task = Task::new("web", "exec").with_config(CONFIG_COMMAND, "/bin/date");
        let json = serde_json::to_string(&task).unwrap();
        assert_eq!(
            json,
            r#"{"name":"web","driver":"exec","config":{"command":"/bin/date"}}"#
        );

        let back: Task = serde_json::from_str(&json).unwrap();
        assert_eq!(back, task);
    }

    #[test]
    fn deserialize_with_resources() {
        let json = r#"{
            "name": "cache",
            "driver": "exec",
            "config": { "command": "/usr/bin/redis-server", "args": "--port ${TNO_PORT_DB}" },
            "resources": { "cpu": 500, "memoryMb": 256 }
        }"#;
        let task: Task = serde_json::from_str(json).unwrap();
        let res = task.resources.as_ref().unwrap();
        assert_eq!(res.cpu, 500);
        assert_eq!(res.memory_mb, 256);
        assert_eq!(task.args(), Some("--port ${TNO_PORT_DB}"));
    }
}
