pub mod args;
pub use args::parse_and_replace;
pub mod cgroup;
pub use cgroup::{CGROUP_ROOT_OPTION, Cgroup, DEFAULT_CGROUP_ROOT, cpu_shares_to_weight};
pub mod limits;
pub use limits::{RlimitConfig, attach_rlimits};
#[cfg(target_os = "linux")]
pub mod mount;
