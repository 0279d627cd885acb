//! Environment variables describing a task's allocation context.
use tno_model::{Task, TaskEnv};

use crate::ExecContext;

pub const ENV_ALLOC_ID: &str = "TNO_ALLOC_ID";
pub const ENV_ALLOC_DIR: &str = "TNO_ALLOC_DIR";
pub const ENV_TASK_DIR: &str = "TNO_TASK_DIR";
pub const ENV_TASK_NAME: &str = "TNO_TASK_NAME";
pub const ENV_MEMORY_LIMIT: &str = "TNO_MEMORY_LIMIT";
pub const ENV_CPU_LIMIT: &str = "TNO_CPU_LIMIT";
pub const ENV_IP: &str = "TNO_IP";
pub const ENV_PORT_PREFIX: &str = "TNO_PORT_";
pub const ENV_META_PREFIX: &str = "TNO_META_";

/// Builds the environment of `task`.
///
/// Directory variables point at host paths; drivers that confine the process rewrite
/// them afterwards. The task's own `env` is appended last and wins over everything.
pub fn task_environment(ctx: &ExecContext, task: &Task) -> TaskEnv {
    let mut env = TaskEnv::new();

    env.push(ENV_ALLOC_ID, ctx.alloc_id.as_str());
    env.push(ENV_ALLOC_DIR, ctx.alloc_dir.shared_dir().to_string_lossy());
    if let Some(local) = ctx.alloc_dir.task_local(&task.name) {
        env.push(ENV_TASK_DIR, local.to_string_lossy());
    }
    env.push(ENV_TASK_NAME, task.name.as_str());

    if let Some(res) = &task.resources {
        env.push(ENV_MEMORY_LIMIT, res.memory_mb.to_string());
        env.push(ENV_CPU_LIMIT, res.cpu.to_string());

        if let Some(net) = res.networks.first() {
            if !net.ip.is_empty() {
                env.push(ENV_IP, net.ip.as_str());
            }
            for port in net.ports() {
                env.push(
                    format!("{ENV_PORT_PREFIX}{}", env_key(&port.label)),
                    port.value.to_string(),
                );
            }
        }
    }

    let mut meta: Vec<(&String, &String)> = task.meta.iter().collect();
    meta.sort();
    for (key, value) in meta {
        env.push(format!("{ENV_META_PREFIX}{}", env_key(key)), value.as_str());
    }

    env.extend_from_map(&task.env);
    env
}

/// Upper-cases a label and replaces characters that are not valid in variable names.
fn env_key(label: &str) -> String {
    label
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tno_model::{NetworkResource, Port, Resources};

    use super::*;
    use crate::AllocDir;

    fn ctx(tmp: &std::path::Path) -> ExecContext {
        let mut dir = AllocDir::new(tmp.join("alloc-1"));
        dir.build(&["web"]).unwrap();
        ExecContext::new("alloc-1", Arc::new(dir))
    }

    #[test]
    fn exports_alloc_context() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = ctx(tmp.path());
        let env = task_environment(&ctx, &Task::new("web", "raw_exec"));

        assert_eq!(env.get(ENV_ALLOC_ID), Some("alloc-1"));
        assert_eq!(env.get(ENV_TASK_NAME), Some("web"));
        assert_eq!(
            env.get(ENV_ALLOC_DIR).map(std::path::PathBuf::from),
            Some(tmp.path().join("alloc-1").join("alloc"))
        );
        assert_eq!(
            env.get(ENV_TASK_DIR).map(std::path::PathBuf::from),
            Some(tmp.path().join("alloc-1").join("web").join("local"))
        );
        assert!(env.get(ENV_MEMORY_LIMIT).is_none());
    }

    #[test]
    fn exports_resources_ports_and_meta() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = ctx(tmp.path());
        let task = Task::new("web", "raw_exec")
            .with_meta("release-channel", "beta")
            .with_resources(Resources {
                cpu: 250,
                memory_mb: 128,
                networks: vec![NetworkResource {
                    ip: "10.1.2.3".into(),
                    mbits: 5,
                    reserved_ports: vec![Port::new("admin", 9000)],
                    dynamic_ports: vec![Port::new("http-alt", 31000)],
                }],
                ..Resources::default()
            });

        let env = task_environment(&ctx, &task);
        assert_eq!(env.get(ENV_MEMORY_LIMIT), Some("128"));
        assert_eq!(env.get(ENV_CPU_LIMIT), Some("250"));
        assert_eq!(env.get(ENV_IP), Some("10.1.2.3"));
        assert_eq!(env.get("TNO_PORT_ADMIN"), Some("9000"));
        assert_eq!(env.get("TNO_PORT_HTTP_ALT"), Some("31000"));
        assert_eq!(env.get("TNO_META_RELEASE_CHANNEL"), Some("beta"));
    }

    #[test]
    fn task_env_overrides_generated_values() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = ctx(tmp.path());
        let task = Task::new("web", "raw_exec")
            .with_env(ENV_TASK_NAME, "renamed")
            .with_env("GREETING", "hello");

        let env = task_environment(&ctx, &task);
        assert_eq!(env.get(ENV_TASK_NAME), Some("renamed"));
        assert_eq!(env.get("GREETING"), Some("hello"));
    }
}
