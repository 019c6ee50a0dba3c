// ABOUTME: Versioned migration of an existing site.
// ABOUTME: Tasks are filtered by the site's current version, ordered, and run in two passes.

mod error;
mod processor;
mod task;
pub mod tasks;

pub use error::UpdateError;
pub use processor::{UpdateProcessor, runs_before};
pub use task::{ANY_VERSION, Priority, TaskError, TaskId, TaskRef, UpdateResult, UpdateTask};
