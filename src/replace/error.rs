// ABOUTME: Errors from blue-green container replacement.
// ABOUTME: Each failure names the sub-step that broke so callers can report it precisely.

use crate::runtime::{ContainerError, ImageError};
use std::fmt;

/// Sub-steps of a replacement, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceStep {
    Inspect,
    Customize,
    PullImage,
    CreateCandidate,
    StopOriginal,
    RenameOriginal,
    RenameCandidate,
    StartCandidate,
}

impl fmt::Display for ReplaceStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReplaceStep::Inspect => "inspect original",
            ReplaceStep::Customize => "customize",
            ReplaceStep::PullImage => "pull image",
            ReplaceStep::CreateCandidate => "create new container",
            ReplaceStep::StopOriginal => "stop original container",
            ReplaceStep::RenameOriginal => "rename original container",
            ReplaceStep::RenameCandidate => "rename new container",
            ReplaceStep::StartCandidate => "start new container",
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReplaceError {
    #[error("customization renamed container {name} to {renamed}; the new name is fixed")]
    NameChanged { name: String, renamed: String },

    #[error("replacing {name}: {step} failed: {source}")]
    Runtime {
        name: String,
        step: ReplaceStep,
        source: ContainerError,
    },

    #[error("replacing {name}: pull image failed: {source}")]
    Pull { name: String, source: ImageError },
}

impl ReplaceError {
    pub(crate) fn at(name: &str, step: ReplaceStep, source: ContainerError) -> Self {
        ReplaceError::Runtime {
            name: name.to_string(),
            step,
            source,
        }
    }

    pub fn step(&self) -> ReplaceStep {
        match self {
            ReplaceError::NameChanged { .. } => ReplaceStep::Customize,
            ReplaceError::Runtime { step, .. } => *step,
            ReplaceError::Pull { .. } => ReplaceStep::PullImage,
        }
    }
}
