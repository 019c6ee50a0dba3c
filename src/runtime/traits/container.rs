// ABOUTME: Container lifecycle operations consumed by provisioning and replacement.
// ABOUTME: Create, start, stop, rename, remove, inspect, wait and list containers.

use super::sealed::Sealed;
use super::shared_types::{ContainerInfo, ContainerSpec};
use crate::types::ContainerId;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

/// Container lifecycle operations.
///
/// Every method accepting a `ContainerId` also accepts a container name.
#[async_trait]
pub trait ContainerOps: Sealed + Send + Sync {
    /// Create (but do not start) a container from a complete `ContainerSpec`.
    async fn create_container(&self, spec: &ContainerSpec) -> Result<ContainerId, ContainerError>;

    /// Start a created or stopped container.
    async fn start_container(&self, id: &ContainerId) -> Result<(), ContainerError>;

    /// Stop a running container, killing it after `timeout`.
    async fn stop_container(&self, id: &ContainerId, timeout: Duration)
    -> Result<(), ContainerError>;

    /// Remove a container; `force` removes it even while running.
    async fn remove_container(&self, id: &ContainerId, force: bool) -> Result<(), ContainerError>;

    /// Snapshot a container's full creation spec and current state.
    async fn inspect_container(&self, id: &ContainerId) -> Result<ContainerInfo, ContainerError>;

    /// Containers matching `filters`.
    async fn list_containers(
        &self,
        filters: &ContainerFilters,
    ) -> Result<Vec<ContainerSummary>, ContainerError>;

    /// Give a container a new name; fails if the name is taken.
    async fn rename_container(&self, id: &ContainerId, new_name: &str)
    -> Result<(), ContainerError>;

    /// Block until the container exits and return its exit code.
    async fn wait_container(&self, id: &ContainerId) -> Result<i64, ContainerError>;
}

/// Filters for listing containers.
#[derive(Debug, Clone, Default)]
pub struct ContainerFilters {
    /// Every label must match exactly.
    pub labels: HashMap<String, String>,
    /// Exact container name.
    pub name: Option<String>,
    /// Include stopped containers.
    pub all: bool,
}

impl ContainerFilters {
    pub fn labelled(labels: HashMap<String, String>) -> Self {
        Self {
            labels,
            name: None,
            all: true,
        }
    }

    pub fn named(name: &str) -> Self {
        Self {
            labels: HashMap::new(),
            name: Some(name.to_string()),
            all: true,
        }
    }
}

/// A row of a container listing.
#[derive(Debug, Clone)]
pub struct ContainerSummary {
    pub id: ContainerId,
    pub name: String,
    pub image: String,
    pub state: String,
    pub labels: HashMap<String, String>,
}

/// Errors from container operations.
#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    #[error("container not found: {0}")]
    NotFound(String),

    #[error("container already exists: {0}")]
    AlreadyExists(String),

    #[error("container not running: {0}")]
    NotRunning(String),

    #[error("container already running: {0}")]
    AlreadyRunning(String),

    #[error("image not found: {0}")]
    ImageNotFound(String),

    #[error("runtime error: {0}")]
    Runtime(String),
}

impl ContainerError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ContainerError::NotFound(_))
    }
}
