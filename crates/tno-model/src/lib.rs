//! Plain data types shared by the task drivers.
//!
//! Nothing in this crate touches processes or the filesystem: it only describes
//! tasks, the resources they ask for, the node they run on and the client options
//! that gate drivers.

mod config;
pub use config::{ClientConfig, ConfigError, parse_bool};

mod domain;
pub use domain::*;

mod node;
pub use node::Node;

mod task;
pub use task::{
    CONFIG_ARGS, CONFIG_ARTIFACT_SOURCE, CONFIG_COMMAND, NetworkResource, Port, Resources, Task,
};
