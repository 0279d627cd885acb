//! Global `tracing` subscriber setup for the task drivers and the agent binary.
mod logger;
pub use logger::*;
