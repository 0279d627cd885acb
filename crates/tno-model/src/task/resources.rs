use serde::{Deserialize, Serialize};

/// Resources requested by a task.
///
/// Zero means "not requested" for every scalar field.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Resources {
    /// CPU in MHz. Used as a relative share, not a hard cap.
    pub cpu: u32,
    /// Memory limit in megabytes.
    pub memory_mb: u64,
    /// Disk budget in megabytes.
    pub disk_mb: u64,
    /// Relative IO weight, written to the task cgroup's `io.weight`.
    pub iops: u32,
    /// Network assignments. Only the first entry is exported to the environment.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub networks: Vec<NetworkResource>,
}

impl Resources {
    /// Returns `true` if no cgroup-backed limit (cpu, memory or io) is requested.
    pub fn is_unbounded(&self) -> bool {
        self.cpu == 0 && self.memory_mb == 0 && self.iops == 0
    }

    #[inline]
    pub fn memory_bytes(&self) -> u64 {
        self.memory_mb.saturating_mul(1024 * 1024)
    }

    #[inline]
    pub fn disk_bytes(&self) -> u64 {
        self.disk_mb.saturating_mul(1024 * 1024)
    }
}

/// Network assignment of a task.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NetworkResource {
    pub ip: String,
    pub mbits: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub reserved_ports: Vec<Port>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dynamic_ports: Vec<Port>,
}

impl NetworkResource {
    /// All labelled ports, reserved first.
    pub fn ports(&self) -> impl Iterator<Item = &Port> {
        self.reserved_ports.iter().chain(self.dynamic_ports.iter())
    }
}

/// Labelled port.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Port {
    pub label: String,
    pub value: u16,
}

impl Port {
    pub fn new(label: impl Into<String>, value: u16) -> Self {
        Self {
            label: label.into(),
            value,
        }
    }
}
