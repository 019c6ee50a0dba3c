// ABOUTME: Image pull operation with cooperative cancellation.
// ABOUTME: A pull interrupted by its token fails with DeadlineExceeded.

use super::sealed::Sealed;
use super::shared_types::RegistryAuth;
use crate::types::ImageRef;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Pulling and looking up images.
#[async_trait]
pub trait ImageOps: Sealed + Send + Sync {
    /// Pull an image, giving up as soon as `cancel` fires.
    async fn pull_image(
        &self,
        reference: &ImageRef,
        auth: Option<&RegistryAuth>,
        cancel: &CancellationToken,
    ) -> Result<(), ImageError>;

    /// Whether the image is already present locally.
    async fn image_exists(&self, reference: &ImageRef) -> Result<bool, ImageError>;
}

/// Errors from image operations.
#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("image not found: {0}")]
    NotFound(String),

    #[error("pull failed: {0}")]
    PullFailed(String),

    #[error("pull of {0} cancelled: deadline exceeded")]
    DeadlineExceeded(String),

    #[error("runtime error: {0}")]
    Runtime(String),
}
