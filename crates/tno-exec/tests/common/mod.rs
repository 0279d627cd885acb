#![allow(dead_code)]

use std::{path::PathBuf, sync::Arc, time::Duration};

use tempfile::TempDir;
use tno_core::{AllocDir, DriverContext, ExecContext, ExitResult, WaitCh};
use tno_model::ClientConfig;

pub const TASK: &str = "web";

pub struct Alloc {
    pub ctx: ExecContext,
    pub task_dir: PathBuf,
    _tmp: TempDir,
}

/// Builds an allocation with a single task directory.
pub fn alloc() -> Alloc {
    let tmp = tempfile::tempdir().unwrap();
    let mut dir = AllocDir::new(tmp.path().join("alloc-1"));
    dir.build(&[TASK]).unwrap();
    let task_dir = dir.task_dir(TASK).unwrap().to_path_buf();

    Alloc {
        ctx: ExecContext::new("alloc-1", Arc::new(dir)),
        task_dir,
        _tmp: tmp,
    }
}

pub fn driver_ctx(config: ClientConfig, kill_timeout: Duration) -> DriverContext {
    DriverContext::new(TASK, Arc::new(config)).with_kill_timeout(kill_timeout)
}

/// Waits for completion, failing the test if it takes longer than `secs`.
pub async fn wait_for(mut ch: WaitCh, secs: u64) -> ExitResult {
    tokio::time::timeout(Duration::from_secs(secs), ch.wait())
        .await
        .expect("task did not finish in time")
}
