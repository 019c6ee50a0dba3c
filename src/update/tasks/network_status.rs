// ABOUTME: 0.2.0 migration adding the network-status volume and mounting it into the controller.
// ABOUTME: The mount runs as a post task so it happens once, after every image swap.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::TaskContext;
use crate::replace::replace;
use crate::runtime::{Gateway, MountKind};
use crate::site::layout::NETWORK_STATUS_PATH;
use crate::site::volume_files::ensure_volume;
use crate::site::{CONTROLLER_DEPLOYMENT, NETWORK_STATUS_VOLUME, container_name, labels, volume_name};
use crate::types::ContainerId;
use crate::update::{Priority, TaskRef, UpdateResult, UpdateTask};

const VERSION: &str = "0.2.0";

pub struct NetworkStatusVolumeTask<R: ?Sized> {
    ctx: TaskContext<R>,
    mount: TaskRef,
}

impl<R: ?Sized> NetworkStatusVolumeTask<R> {
    /// `mount` is handed out as this task's post task.
    pub fn new(ctx: TaskContext<R>, mount: TaskRef) -> Self {
        Self { ctx, mount }
    }
}

#[async_trait]
impl<R: Gateway + ?Sized + 'static> UpdateTask for NetworkStatusVolumeTask<R> {
    fn info(&self) -> String {
        "create network status volume".to_string()
    }

    fn version(&self) -> &str {
        VERSION
    }

    fn applies_to(&self, current_version: &str) -> bool {
        crate::version::less_recent_than(current_version, VERSION)
    }

    fn priority(&self) -> Priority {
        Priority::First
    }

    async fn run(&self, _cancel: &CancellationToken) -> UpdateResult {
        let volume = volume_name(&self.ctx.site, NETWORK_STATUS_VOLUME);
        let result = match ensure_volume(
            self.ctx.runtime.as_ref(),
            &volume,
            &labels::owned(&self.ctx.site),
        )
        .await
        {
            Ok(true) => UpdateResult::changed(format!("created volume {volume}")),
            Ok(false) => UpdateResult::default(),
            Err(e) => return UpdateResult::failed(e),
        };
        result.with_post_task(self.mount.clone())
    }
}

pub struct MountVolumeTask<R: ?Sized> {
    ctx: TaskContext<R>,
}

impl<R: ?Sized> MountVolumeTask<R> {
    pub fn new(ctx: TaskContext<R>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl<R: Gateway + ?Sized + 'static> UpdateTask for MountVolumeTask<R> {
    fn info(&self) -> String {
        "mount network status volume into controller".to_string()
    }

    fn version(&self) -> &str {
        VERSION
    }

    fn applies_to(&self, current_version: &str) -> bool {
        crate::version::less_recent_than(current_version, VERSION)
    }

    fn priority(&self) -> Priority {
        Priority::Normal
    }

    async fn run(&self, _cancel: &CancellationToken) -> UpdateResult {
        let runtime = self.ctx.runtime.as_ref();
        let controller = container_name(&self.ctx.site, CONTROLLER_DEPLOYMENT);
        let volume = volume_name(&self.ctx.site, NETWORK_STATUS_VOLUME);

        let info = match runtime
            .inspect_container(&ContainerId::new(controller.as_str()))
            .await
        {
            Ok(info) => info,
            Err(e) => return UpdateResult::failed(e),
        };
        if info
            .spec
            .mounts
            .iter()
            .any(|m| m.kind == MountKind::Volume && m.source == volume)
        {
            return UpdateResult::default();
        }

        let target_volume = volume.clone();
        match replace(runtime, &controller, move |spec| {
            spec.mount_volume(&target_volume, NETWORK_STATUS_PATH);
        })
        .await
        {
            Ok(replaced) => {
                let mut result =
                    UpdateResult::changed(format!("mounted {volume} into {controller}"));
                result.warnings = replaced.warnings;
                result
            }
            Err(e) => UpdateResult::failed(e),
        }
    }
}
