//! Resolution of the program a task runs.
use std::path::{Path, PathBuf};

use tno_core::{DriverError, alloc_dir::TASK_LOCAL};
use tno_model::Task;
use tracing::{debug, warn};

use crate::{artifact::ArtifactFetcher, util};

/// Program of a task, either given literally or fetched into the task directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedCommand {
    /// The `command` option, used verbatim.
    Literal(String),
    /// An artifact stored as `local/<name>` relative to the task directory.
    Artifact(String),
}

impl ResolvedCommand {
    /// Path of the program as seen from the host.
    pub fn host_path(&self, task_dir: &Path) -> PathBuf {
        match self {
            Self::Literal(cmd) => PathBuf::from(cmd),
            Self::Artifact(name) => task_dir.join(TASK_LOCAL).join(name),
        }
    }

    /// Path of the program as seen from inside a task directory used as the root.
    pub fn confined_path(&self) -> PathBuf {
        match self {
            Self::Literal(cmd) => PathBuf::from(cmd),
            Self::Artifact(name) => Path::new("/").join(TASK_LOCAL).join(name),
        }
    }
}

/// Picks the task's program, fetching the artifact when no literal command is set.
///
/// A literal command wins over an artifact source. Failing to mark a fetched artifact
/// executable is only logged.
pub async fn resolve_command(
    task: &Task,
    task_dir: &Path,
    fetcher: &dyn ArtifactFetcher,
) -> Result<ResolvedCommand, DriverError> {
    if let Some(cmd) = task.command() {
        return Ok(ResolvedCommand::Literal(cmd.to_string()));
    }

    let source = task.artifact_source().ok_or_else(|| {
        DriverError::Config(format!(
            "missing command or source for task {:?}",
            task.name
        ))
    })?;

    let local = task_dir.join(TASK_LOCAL);
    let path = fetcher.fetch(source, &local).await?;
    if let Err(e) = util::make_executable(&path) {
        warn!(
            target: "tno.exec.command",
            task = %task.name,
            path = %path.display(),
            error = %e,
            "failed to mark artifact executable"
        );
    }

    let name = path
        .strip_prefix(&local)
        .map_err(|_| {
            DriverError::Fetch(format!(
                "artifact {} was written outside {}",
                path.display(),
                local.display()
            ))
        })?
        .to_string_lossy()
        .into_owned();
    debug!(target: "tno.exec.command", task = %task.name, artifact = %name, "command resolved from artifact");
    Ok(ResolvedCommand::Artifact(name))
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use tno_model::{CONFIG_ARTIFACT_SOURCE, CONFIG_COMMAND};

    use super::*;
    use crate::artifact::DefaultFetcher;

    struct Unreachable;

    #[async_trait]
    impl ArtifactFetcher for Unreachable {
        async fn fetch(&self, source: &str, _: &Path) -> Result<PathBuf, DriverError> {
            panic!("fetch must not be called for {source}");
        }
    }

    #[tokio::test]
    async fn literal_command_wins() {
        let tmp = tempfile::tempdir().unwrap();
        let task = Task::new("web", "raw_exec")
            .with_config(CONFIG_COMMAND, "/bin/echo")
            .with_config(CONFIG_ARTIFACT_SOURCE, "https://example.com/app");

        let cmd = resolve_command(&task, tmp.path(), &Unreachable).await.unwrap();
        assert_eq!(cmd, ResolvedCommand::Literal("/bin/echo".into()));
        assert_eq!(cmd.host_path(tmp.path()), PathBuf::from("/bin/echo"));
        assert_eq!(cmd.confined_path(), PathBuf::from("/bin/echo"));
    }

    #[tokio::test]
    async fn missing_both_is_config_error() {
        let tmp = tempfile::tempdir().unwrap();
        let task = Task::new("web", "raw_exec")
            .with_config(CONFIG_COMMAND, "")
            .with_config(CONFIG_ARTIFACT_SOURCE, "");

        let err = resolve_command(&task, tmp.path(), &Unreachable).await.unwrap_err();
        assert!(matches!(err, DriverError::Config(msg) if msg.contains("missing command or source")));
    }

    #[tokio::test]
    async fn artifact_lands_in_local_dir_and_is_executable() {
        let src_dir = tempfile::tempdir().unwrap();
        let src = src_dir.path().join("tool.sh");
        std::fs::write(&src, "#!/bin/sh\nexit 0\n").unwrap();

        let task_dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(task_dir.path().join(TASK_LOCAL)).unwrap();
        let task = Task::new("web", "raw_exec")
            .with_config(CONFIG_ARTIFACT_SOURCE, src.to_string_lossy());

        let cmd = resolve_command(&task, task_dir.path(), &DefaultFetcher)
            .await
            .unwrap();
        assert_eq!(cmd, ResolvedCommand::Artifact("tool.sh".into()));

        let host = cmd.host_path(task_dir.path());
        assert!(host.starts_with(task_dir.path().join(TASK_LOCAL)));
        assert!(host.exists());
        assert_eq!(cmd.confined_path(), PathBuf::from("/local/tool.sh"));

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&host).unwrap().permissions().mode();
            assert_eq!(mode & 0o755, 0o755);
        }
    }
}
