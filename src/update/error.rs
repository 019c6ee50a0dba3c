// ABOUTME: Errors that abort an update run.
// ABOUTME: A failing task reports every error it collected.

use super::task::TaskError;

#[derive(Debug, thiserror::Error)]
pub enum UpdateError {
    #[error("update task \"{task}\" failed: {}", join(.errors))]
    TaskFailed {
        task: String,
        errors: Vec<TaskError>,
    },

    #[error("update cancelled before task \"{next}\"")]
    Cancelled { next: String },
}

fn join(errors: &[TaskError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
