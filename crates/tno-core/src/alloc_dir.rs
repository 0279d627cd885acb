//! On-disk layout of an allocation.
//!
//! ```text
//! <alloc>/
//!   alloc/            shared between the tasks of the allocation
//!   <task>/
//!     local/          artifacts and log files of one task
//! ```
use std::{
    collections::HashMap,
    fs, io,
    path::{Path, PathBuf},
};

use tracing::debug;

/// Name of the directory shared by all tasks of an allocation.
pub const SHARED_ALLOC_NAME: &str = "alloc";
/// Name of the task-local directory.
pub const TASK_LOCAL: &str = "local";

#[derive(Debug, Clone)]
pub struct AllocDir {
    alloc_dir: PathBuf,
    shared_dir: PathBuf,
    task_dirs: HashMap<String, PathBuf>,
}

impl AllocDir {
    /// Describes the layout rooted at `alloc_dir` without touching the filesystem.
    pub fn new(alloc_dir: impl Into<PathBuf>) -> Self {
        let alloc_dir = alloc_dir.into();
        let shared_dir = alloc_dir.join(SHARED_ALLOC_NAME);
        Self {
            alloc_dir,
            shared_dir,
            task_dirs: HashMap::new(),
        }
    }

    /// Creates the shared directory and the directories of `tasks`.
    pub fn build<S: AsRef<str>>(&mut self, tasks: &[S]) -> io::Result<()> {
        fs::create_dir_all(&self.shared_dir)?;
        for task in tasks {
            let name = task.as_ref();
            let task_dir = self.alloc_dir.join(name);
            fs::create_dir_all(task_dir.join(TASK_LOCAL))?;
            debug!(target: "tno.core.alloc_dir", task = name, dir = %task_dir.display(), "task dir built");
            self.task_dirs.insert(name.to_string(), task_dir);
        }
        Ok(())
    }

    /// Removes the whole allocation directory.
    pub fn destroy(&self) -> io::Result<()> {
        match fs::remove_dir_all(&self.alloc_dir) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.alloc_dir
    }

    #[inline]
    pub fn shared_dir(&self) -> &Path {
        &self.shared_dir
    }

    /// Root directory of a task, if the task was built.
    pub fn task_dir(&self, task: &str) -> Option<&Path> {
        self.task_dirs.get(task).map(PathBuf::as_path)
    }

    /// `local` directory of a task, if the task was built.
    pub fn task_local(&self, task: &str) -> Option<PathBuf> {
        self.task_dir(task).map(|dir| dir.join(TASK_LOCAL))
    }
}
