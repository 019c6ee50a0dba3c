// ABOUTME: Network operations for the site's private bridge network.
// ABOUTME: Create, inspect (including DNS support) and remove networks.

use super::sealed::Sealed;
use super::shared_types::{NetworkConfig, NetworkDetails};
use crate::types::NetworkId;
use async_trait::async_trait;

/// Network create, inspect and remove.
#[async_trait]
pub trait NetworkOps: Sealed + Send + Sync {
    /// Create a network; fails with `AlreadyExists` if the name is taken.
    async fn create_network(&self, config: &NetworkConfig) -> Result<NetworkId, NetworkError>;

    /// Inspect a network by name, failing with `NotFound` when absent.
    async fn inspect_network(&self, name: &str) -> Result<NetworkDetails, NetworkError>;

    /// Remove a network by name.
    async fn remove_network(&self, name: &str) -> Result<(), NetworkError>;

    /// Whether a network with this name exists.
    async fn network_exists(&self, name: &str) -> Result<bool, NetworkError> {
        match self.inspect_network(name).await {
            Ok(_) => Ok(true),
            Err(NetworkError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Errors from network operations.
#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    #[error("network not found: {0}")]
    NotFound(String),

    #[error("network already exists: {0}")]
    AlreadyExists(String),

    #[error("network in use, cannot remove: {0}")]
    InUse(String),

    #[error("runtime error: {0}")]
    Runtime(String),
}
