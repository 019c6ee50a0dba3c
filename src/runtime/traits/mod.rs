// ABOUTME: Capability traits the orchestration core consumes from a container runtime.
// ABOUTME: Containers, volumes, networks, images, logs and runtime info, plus the Gateway bundle.

mod container;
mod image;
mod logs;
mod network;
mod runtime_info;
pub(crate) mod sealed;
mod shared_types;
mod volume;

pub use container::{ContainerError, ContainerFilters, ContainerOps, ContainerSummary};
pub use image::{ImageError, ImageOps};
pub use logs::{LogError, LogLine, LogLineStream, LogOps, LogOptions, LogStream, collect_logs};
pub use network::{NetworkError, NetworkOps};
pub use runtime_info::{RuntimeInfo, RuntimeInfoError};
pub use shared_types::*;
pub use volume::{VolumeError, VolumeFilters, VolumeOps};

/// Everything a site handler needs from one runtime endpoint.
pub trait Gateway: ContainerOps + VolumeOps + NetworkOps + ImageOps + LogOps + RuntimeInfo {}

impl<T> Gateway for T where T: ContainerOps + VolumeOps + NetworkOps + ImageOps + LogOps + RuntimeInfo
{}
