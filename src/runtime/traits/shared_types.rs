// ABOUTME: Value types exchanged with runtimes: container specs, volumes, networks, metadata.
// ABOUTME: ContainerSpec is both the create request and the inspect snapshot.

use crate::types::ContainerId;
use std::collections::{BTreeMap, HashMap};

/// Everything needed to recreate a container.
///
/// `inspect_container` returns this for an existing container, which makes a
/// faithful copy a matter of changing the name and calling `create_container`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub env: BTreeMap<String, String>,
    pub labels: HashMap<String, String>,
    pub networks: Vec<NetworkAttachment>,
    pub mounts: Vec<VolumeMount>,
    pub ports: Vec<PortMapping>,
    pub entrypoint: Option<Vec<String>>,
    pub command: Option<Vec<String>>,
    pub restart_policy: RestartPolicy,
    pub resources: ResourceLimits,
}

impl ContainerSpec {
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }

    /// Mount a named volume at `target`, replacing any mount already at that target.
    pub fn mount_volume(&mut self, volume: &str, target: &str) {
        self.mounts.retain(|m| m.target != target);
        self.mounts.push(VolumeMount::volume(volume, target));
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkAttachment {
    pub network: String,
    pub aliases: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortMapping {
    /// Bind address on the host; `None` binds every interface.
    pub host_ip: Option<String>,
    pub host_port: u16,
    pub container_port: u16,
    pub protocol: Protocol,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Protocol {
    #[default]
    Tcp,
    Udp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountKind {
    /// Named runtime volume.
    Volume,
    /// Host path.
    Bind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeMount {
    pub kind: MountKind,
    /// Volume name or host path.
    pub source: String,
    pub target: String,
    pub read_only: bool,
}

impl VolumeMount {
    pub fn volume(name: &str, target: &str) -> Self {
        Self {
            kind: MountKind::Volume,
            source: name.to_string(),
            target: target.to_string(),
            read_only: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RestartPolicy {
    No,
    #[default]
    Always,
    UnlessStopped,
    OnFailure {
        max_retries: Option<u32>,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ResourceLimits {
    /// Bytes.
    pub memory: Option<u64>,
    /// Fractional CPUs (1.0 = one CPU).
    pub cpus: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct ContainerInfo {
    pub id: ContainerId,
    pub spec: ContainerSpec,
    pub state: ContainerState,
    pub exit_code: Option<i64>,
    pub created: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    Created,
    Running,
    Paused,
    Restarting,
    Removing,
    Exited,
    Dead,
}

#[derive(Debug, Clone, Default)]
pub struct NetworkConfig {
    pub name: String,
    pub driver: Option<String>,
    pub labels: HashMap<String, String>,
    pub enable_ipv6: bool,
}

#[derive(Debug, Clone)]
pub struct NetworkDetails {
    pub id: String,
    pub name: String,
    /// Whether containers on this network resolve each other by name.
    pub dns_enabled: bool,
    pub labels: HashMap<String, String>,
}

#[derive(Debug, Clone, Default)]
pub struct VolumeConfig {
    pub name: String,
    pub labels: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct VolumeDetails {
    pub name: String,
    /// Host path backing the volume, as reported by the runtime.
    pub mountpoint: String,
    pub labels: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct RegistryAuth {
    pub username: String,
    pub password: String,
    pub server: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RuntimeMetadata {
    pub name: String,
    pub version: String,
    pub api_version: String,
    pub os: String,
    pub arch: String,
}
