// ABOUTME: Runs applicable migration tasks in version then priority order.
// ABOUTME: A second pass runs the de-duplicated post tasks; the first error aborts everything.

use super::error::UpdateError;
use super::task::{ANY_VERSION, TaskId, TaskRef, UpdateTask};
use crate::diagnostics::{Diagnostics, Warning};
use crate::version;
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Sequences migration tasks for one site.
///
/// Ordering: tasks targeting an older version run first; `*` tasks run after
/// all versioned ones; tasks with the same version string are ordered by
/// priority. Tasks that none of these rules separate keep registration order.
#[derive(Default)]
pub struct UpdateProcessor {
    tasks: Vec<TaskRef>,
    next_id: u64,
    changes: Vec<String>,
    diagnostics: Diagnostics,
}

impl UpdateProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Give `task` an id without scheduling it; used for post tasks.
    pub fn handle(&mut self, task: Arc<dyn UpdateTask>) -> TaskRef {
        self.next_id += 1;
        TaskRef {
            id: TaskId(self.next_id),
            task,
        }
    }

    pub fn register(&mut self, task: Arc<dyn UpdateTask>) -> TaskRef {
        let task_ref = self.handle(task);
        self.tasks.push(task_ref.clone());
        task_ref
    }

    pub fn register_tasks(&mut self, tasks: impl IntoIterator<Item = Arc<dyn UpdateTask>>) {
        for task in tasks {
            self.register(task);
        }
    }

    /// Changes applied so far, including those of a task that then failed.
    pub fn changes(&self) -> &[String] {
        &self.changes
    }

    pub fn warnings(&self) -> &[Warning] {
        self.diagnostics.warnings()
    }

    /// The main-pass tasks `process` would run for `current_version`, in order.
    ///
    /// Nothing is executed. Post tasks are only known once their parent ran,
    /// so they are not part of the plan.
    pub fn plan(&self, current_version: &str) -> Vec<TaskRef> {
        schedule(&self.tasks, current_version)
    }

    /// Run every registered task that applies to `current_version`, then the
    /// post tasks they returned.
    pub async fn process(
        &mut self,
        cancel: &CancellationToken,
        current_version: &str,
    ) -> Result<(), UpdateError> {
        let main = self.plan(current_version);
        tracing::debug!(
            registered = self.tasks.len(),
            applicable = main.len(),
            %current_version,
            "running update tasks"
        );

        let mut seen = HashSet::new();
        let mut post = Vec::new();
        for task in main {
            for post_task in self.run_one(&task, cancel).await? {
                if seen.insert(post_task.id) {
                    post.push(post_task);
                }
            }
        }

        let post = schedule(&post, current_version);
        if !post.is_empty() {
            tracing::debug!(count = post.len(), "running post tasks");
        }
        for task in post {
            let nested = self.run_one(&task, cancel).await?;
            if !nested.is_empty() {
                self.diagnostics.warn(Warning::update(format!(
                    "post task \"{}\" asked for {} more post task(s), which were not run",
                    task.task.info(),
                    nested.len()
                )));
            }
        }
        Ok(())
    }

    async fn run_one(
        &mut self,
        task: &TaskRef,
        cancel: &CancellationToken,
    ) -> Result<Vec<TaskRef>, UpdateError> {
        let info = task.task.info();
        if cancel.is_cancelled() {
            return Err(UpdateError::Cancelled { next: info });
        }
        tracing::info!(task = %info, version = task.task.version(), "running update task");
        let result = task.task.run(cancel).await;
        for warning in result.warnings {
            self.diagnostics.warn(warning);
        }
        // Changes are not rolled back, so a failing task's partial work is still reported.
        self.changes.extend(result.changes);
        if !result.errors.is_empty() {
            return Err(UpdateError::TaskFailed {
                task: info,
                errors: result.errors,
            });
        }
        Ok(result.post_tasks)
    }
}

/// Applicable tasks, stably ordered by [`runs_before`].
///
/// `runs_before` is not a total order (an unparseable version is unordered
/// against every other version), so this is an insertion sort rather than
/// `sort_by`: a task only moves ahead of a neighbour it must run before.
fn schedule(tasks: &[TaskRef], current_version: &str) -> Vec<TaskRef> {
    let mut ordered: Vec<TaskRef> = Vec::with_capacity(tasks.len());
    for task in tasks.iter().filter(|t| t.task.applies_to(current_version)) {
        let mut at = ordered.len();
        while at > 0 && runs_before(task.task.as_ref(), ordered[at - 1].task.as_ref()) {
            at -= 1;
        }
        ordered.insert(at, task.clone());
    }
    ordered
}

/// Whether `a` must run before `b`.
///
/// Distinct versions order by age, `*` goes after any versioned task, and
/// identical version strings fall back to priority. Versions that cannot be
/// compared, or differ only in their qualifier, leave the pair unordered.
pub fn runs_before(a: &dyn UpdateTask, b: &dyn UpdateTask) -> bool {
    let (va, vb) = (a.version(), b.version());
    match (va == ANY_VERSION, vb == ANY_VERSION) {
        (false, false) if va != vb => version::less_recent_than(va, vb),
        (true, false) => false,
        (false, true) => true,
        _ => a.priority() < b.priority(),
    }
}
