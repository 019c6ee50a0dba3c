// ABOUTME: Named volume operations.
// ABOUTME: Volumes hold site configuration and credentials; their mountpoint is read locally.

use super::sealed::Sealed;
use super::shared_types::{VolumeConfig, VolumeDetails};
use async_trait::async_trait;
use std::collections::HashMap;

/// Named volume operations.
#[async_trait]
pub trait VolumeOps: Sealed + Send + Sync {
    /// Create a volume; an existing volume of the same name is returned as is.
    async fn create_volume(&self, config: &VolumeConfig) -> Result<VolumeDetails, VolumeError>;

    /// Inspect a volume by name, failing with `NotFound` when absent.
    async fn inspect_volume(&self, name: &str) -> Result<VolumeDetails, VolumeError>;

    /// Volumes whose labels match every filter label.
    async fn list_volumes(&self, filters: &VolumeFilters) -> Result<Vec<VolumeDetails>, VolumeError>;

    /// Remove a volume; `force` removes it even while containers mount it.
    async fn remove_volume(&self, name: &str, force: bool) -> Result<(), VolumeError>;

    /// Whether a volume with this name exists.
    async fn volume_exists(&self, name: &str) -> Result<bool, VolumeError> {
        match self.inspect_volume(name).await {
            Ok(_) => Ok(true),
            Err(VolumeError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct VolumeFilters {
    pub labels: HashMap<String, String>,
}

/// Errors from volume operations.
#[derive(Debug, thiserror::Error)]
pub enum VolumeError {
    #[error("volume not found: {0}")]
    NotFound(String),

    #[error("volume already exists: {0}")]
    AlreadyExists(String),

    #[error("volume in use, cannot remove: {0}")]
    InUse(String),

    #[error("runtime error: {0}")]
    Runtime(String),
}
