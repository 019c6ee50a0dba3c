// ABOUTME: Runtime metadata and liveness checks.
// ABOUTME: Used by pre-flight validation before any resource is touched.

use super::sealed::Sealed;
use super::shared_types::RuntimeMetadata;
use async_trait::async_trait;

/// Runtime metadata and liveness.
#[async_trait]
pub trait RuntimeInfo: Sealed + Send + Sync {
    /// Runtime name, version and platform.
    async fn info(&self) -> Result<RuntimeMetadata, RuntimeInfoError>;

    /// Round-trip to the runtime socket; fails when nothing answers.
    async fn ping(&self) -> Result<(), RuntimeInfoError>;
}

/// Errors from runtime metadata queries.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeInfoError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("runtime error: {0}")]
    Runtime(String),
}
