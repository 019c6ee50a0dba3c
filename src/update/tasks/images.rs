// ABOUTME: Moves every site container onto the image this release is configured with.
// ABOUTME: Containers are swapped one at a time with the blue-green replacement.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::TaskContext;
use crate::replace::replace_image;
use crate::runtime::{ContainerFilters, Gateway};
use crate::site::{ComponentKind, container_name, labels};
use crate::update::{Priority, TaskError, UpdateResult, UpdateTask};

pub struct ContainerImagesTask<R: ?Sized> {
    ctx: TaskContext<R>,
}

impl<R: ?Sized> ContainerImagesTask<R> {
    pub fn new(ctx: TaskContext<R>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl<R: Gateway + ?Sized + 'static> UpdateTask for ContainerImagesTask<R> {
    fn info(&self) -> String {
        "update container images".to_string()
    }

    fn version(&self) -> &str {
        crate::version::current()
    }

    fn applies_to(&self, current_version: &str) -> bool {
        crate::version::less_recent_than(current_version, self.version())
    }

    fn priority(&self) -> Priority {
        Priority::Normal
    }

    async fn run(&self, cancel: &CancellationToken) -> UpdateResult {
        let runtime = self.ctx.runtime.as_ref();
        let containers = match runtime
            .list_containers(&ContainerFilters::labelled(labels::owned(&self.ctx.site)))
            .await
        {
            Ok(containers) => containers,
            Err(e) => return UpdateResult::failed(e),
        };

        let mut result = UpdateResult::default();
        for container in containers {
            let Some(component) = container.labels.get(labels::COMPONENT) else {
                continue;
            };
            let Some(kind) = ComponentKind::from_deployment(component) else {
                continue;
            };
            if container.name != container_name(&self.ctx.site, component) {
                tracing::debug!(container = %container.name, "leaving non-canonical container alone");
                continue;
            }
            let image = self.ctx.images.for_kind(kind);
            if container.image == image.to_string() {
                continue;
            }
            match replace_image(runtime, &container.name, image, cancel).await {
                Ok(replaced) => {
                    result
                        .changes
                        .push(format!("updated {} image to {image}", container.name));
                    result.warnings.extend(replaced.warnings);
                }
                Err(e) => {
                    result.errors.push(TaskError::from(e));
                    break;
                }
            }
        }
        result
    }
}
