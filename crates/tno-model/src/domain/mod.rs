mod kv;
pub use kv::KeyValue;

mod task_env;
pub use task_env::TaskEnv;

/// Identifier of the allocation a task belongs to.
pub type AllocId = String;
