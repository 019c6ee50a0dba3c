// ABOUTME: Migration task contract: version applicability, priority, and an async run step.
// ABOUTME: Results carry errors, warnings, human-readable changes and deferred post tasks.

use crate::diagnostics::Warning;
use crate::replace::ReplaceError;
use crate::runtime::{ContainerError, ImageError, VolumeError};
use crate::site::router_config::RouterConfigError;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Version string of a task that is ordered after every versioned task.
pub const ANY_VERSION: &str = "*";

/// Tie-breaker among tasks of the same version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    First,
    Normal,
    Last,
}

#[async_trait]
pub trait UpdateTask: Send + Sync {
    /// Short description used in logs and errors.
    fn info(&self) -> String;

    /// Version this task migrates to, or [`ANY_VERSION`].
    fn version(&self) -> &str;

    fn applies_to(&self, current_version: &str) -> bool;

    fn priority(&self) -> Priority;

    async fn run(&self, cancel: &CancellationToken) -> UpdateResult;
}

/// Identity assigned to a task when it is registered with a processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub(crate) u64);

/// A registered task. Clones share the id, so a post task handed out by
/// several tasks still runs once.
#[derive(Clone)]
pub struct TaskRef {
    pub(crate) id: TaskId,
    pub(crate) task: Arc<dyn UpdateTask>,
}

impl TaskRef {
    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn task(&self) -> &dyn UpdateTask {
        self.task.as_ref()
    }
}

impl fmt::Debug for TaskRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRef")
            .field("id", &self.id)
            .field("info", &self.task.info())
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error(transparent)]
    Replace(#[from] ReplaceError),

    #[error(transparent)]
    Container(#[from] ContainerError),

    #[error(transparent)]
    Volume(#[from] VolumeError),

    #[error(transparent)]
    Image(#[from] ImageError),

    #[error(transparent)]
    RouterConfig(#[from] RouterConfigError),

    #[error("{0}")]
    Failed(String),
}

#[derive(Debug, Default)]
pub struct UpdateResult {
    pub errors: Vec<TaskError>,
    pub warnings: Vec<Warning>,
    pub changes: Vec<String>,
    pub post_tasks: Vec<TaskRef>,
}

impl UpdateResult {
    pub fn changed(change: impl Into<String>) -> Self {
        Self {
            changes: vec![change.into()],
            ..Self::default()
        }
    }

    pub fn failed(error: impl Into<TaskError>) -> Self {
        Self {
            errors: vec![error.into()],
            ..Self::default()
        }
    }

    pub fn with_post_task(mut self, task: TaskRef) -> Self {
        self.post_tasks.push(task);
        self
    }
}
