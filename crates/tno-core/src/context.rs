use std::{sync::Arc, time::Duration};

use tno_model::{AllocId, ClientConfig};

use crate::AllocDir;

/// Grace period between the graceful termination request and the forced kill.
pub const DEFAULT_KILL_TIMEOUT: Duration = Duration::from_secs(5);

/// Per-driver settings, fixed at construction.
#[derive(Clone, Debug)]
pub struct DriverContext {
    task_name: String,
    config: Arc<ClientConfig>,
    kill_timeout: Duration,
}

impl DriverContext {
    pub fn new(task_name: impl Into<String>, config: Arc<ClientConfig>) -> Self {
        Self {
            task_name: task_name.into(),
            config,
            kill_timeout: DEFAULT_KILL_TIMEOUT,
        }
    }

    pub fn with_kill_timeout(mut self, timeout: Duration) -> Self {
        self.kill_timeout = timeout;
        self
    }

    #[inline]
    pub fn task_name(&self) -> &str {
        &self.task_name
    }

    #[inline]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    #[inline]
    pub fn kill_timeout(&self) -> Duration {
        self.kill_timeout
    }
}

/// Per-allocation context supplied by the caller. Drivers only read it.
#[derive(Clone, Debug)]
pub struct ExecContext {
    pub alloc_id: AllocId,
    pub alloc_dir: Arc<AllocDir>,
}

impl ExecContext {
    pub fn new(alloc_id: impl Into<AllocId>, alloc_dir: Arc<AllocDir>) -> Self {
        Self {
            alloc_id: alloc_id.into(),
            alloc_dir,
        }
    }
}
