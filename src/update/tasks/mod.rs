// ABOUTME: Built-in migrations applied when a site is updated to this release.
// ABOUTME: Each task shares a context with the runtime, the site name and the configured images.

mod images;
mod network_status;
mod version;

pub use images::ContainerImagesTask;
pub use network_status::{MountVolumeTask, NetworkStatusVolumeTask};
pub use version::VersionUpdateTask;

use super::UpdateProcessor;
use crate::runtime::Gateway;
use crate::site::ImageSet;
use crate::types::SiteName;
use std::sync::Arc;

/// What every built-in task needs to reach the site.
pub struct TaskContext<R: ?Sized> {
    pub runtime: Arc<R>,
    pub site: SiteName,
    pub images: ImageSet,
}

impl<R: ?Sized> Clone for TaskContext<R> {
    fn clone(&self) -> Self {
        Self {
            runtime: Arc::clone(&self.runtime),
            site: self.site.clone(),
            images: self.images.clone(),
        }
    }
}

/// Register every built-in task with `processor`.
pub fn register_builtin<R: Gateway + ?Sized + 'static>(
    processor: &mut UpdateProcessor,
    ctx: &TaskContext<R>,
) {
    let mount = processor.handle(Arc::new(MountVolumeTask::new(ctx.clone())));
    processor.register(Arc::new(NetworkStatusVolumeTask::new(ctx.clone(), mount)));
    processor.register(Arc::new(ContainerImagesTask::new(ctx.clone())));
    processor.register(Arc::new(VersionUpdateTask::new(ctx.clone())));
}
