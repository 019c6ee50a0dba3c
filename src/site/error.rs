// ABOUTME: Site lifecycle errors, SNAFU style, with the step that failed.
// ABOUTME: Leaf runtime errors are wrapped per step; teardown failures are collected, not raised.

use snafu::Snafu;
use std::fmt;

use super::credentials::CredentialError;
use super::lock::LockError;
use super::router_config::RouterConfigError;
use super::volume_files::VolumeFileError;
use crate::diagnostics::Warning;
use crate::runtime::{ContainerError, ImageError, NetworkError, RuntimeInfoError, VolumeError};
use crate::update::UpdateError;

/// A fixed step of site creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisionStep {
    EndpointPointer,
    Network,
    CertificateAuthorities,
    Credentials,
    RouterConfig,
    Volumes,
    AuxiliaryConfig,
    Deploy { deployment: String },
    Startup,
}

impl fmt::Display for ProvisionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProvisionStep::EndpointPointer => f.write_str("saving runtime endpoint"),
            ProvisionStep::Network => f.write_str("creating network"),
            ProvisionStep::CertificateAuthorities => f.write_str("creating certificate authorities"),
            ProvisionStep::Credentials => f.write_str("creating credentials"),
            ProvisionStep::RouterConfig => f.write_str("writing router configuration"),
            ProvisionStep::Volumes => f.write_str("creating volumes"),
            ProvisionStep::AuxiliaryConfig => f.write_str("writing auxiliary configuration"),
            ProvisionStep::Deploy { deployment } => write!(f, "deploying {deployment}"),
            ProvisionStep::Startup => f.write_str("installing startup scripts"),
        }
    }
}

/// The underlying failure of a provisioning step.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error(transparent)]
    Volume(#[from] VolumeError),

    #[error(transparent)]
    Container(#[from] ContainerError),

    #[error(transparent)]
    Image(#[from] ImageError),

    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error(transparent)]
    RouterConfig(#[from] RouterConfigError),

    #[error(transparent)]
    File(#[from] VolumeFileError),

    #[error("{0}")]
    Other(String),
}

/// Why a site cannot be created on this runtime. Raised before any mutation.
#[derive(Debug, thiserror::Error)]
pub enum PreflightError {
    #[error("container runtime is not reachable: {0}")]
    Unreachable(#[source] RuntimeInfoError),

    #[error("container {0} already exists")]
    ContainerExists(String),

    #[error("network {0} exists but does not have DNS enabled")]
    NetworkWithoutDns(String),

    #[error("runtime networks do not support DNS resolution: {0}")]
    NoDnsSupport(String),

    #[error("host port {host}:{port} is already in use")]
    PortInUse { host: String, port: u16 },

    #[error("volume {0} already exists")]
    VolumeExists(String),

    #[error("volumes are not on the local filesystem ({0}); remote runtimes are not supported")]
    RemoteVolumes(String),

    #[error("router image {image} failed its version check (exit code {exit_code}): {logs}")]
    RouterImage {
        image: String,
        exit_code: i64,
        logs: String,
    },

    #[error("runtime error during pre-flight: {0}")]
    Runtime(String),
}

/// One resource that could not be removed during teardown.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("failed to remove {resource}: {reason}")]
pub struct TeardownError {
    pub resource: String,
    pub reason: String,
}

impl TeardownError {
    pub fn new(resource: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self {
            resource: resource.into(),
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SiteError {
    #[snafu(display("site cannot be created: {source}"))]
    Preflight { source: PreflightError },

    #[snafu(display("provisioning failed while {step}: {source}"))]
    Provisioning {
        step: ProvisionStep,
        source: StepError,
    },

    #[snafu(display("site {site} not found: {reason}"))]
    NotFound { site: String, reason: String },

    #[snafu(display("invalid site definition: {reason}"))]
    InvalidSite { reason: String },

    /// Tasks that ran before the failure are not rolled back; their changes
    /// and warnings are carried here so they can still be reported.
    #[snafu(display("update failed: {source}"))]
    Update {
        source: UpdateError,
        changes: Vec<String>,
        warnings: Vec<Warning>,
    },

    #[snafu(display("site {site} is locked: {source}"))]
    Locked { site: String, source: LockError },

    #[snafu(display("runtime error: {source}"))]
    Runtime { source: StepError },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiteErrorKind {
    Preflight,
    Provisioning,
    NotFound,
    InvalidSite,
    Update,
    Locked,
    Runtime,
}

impl SiteError {
    pub fn kind(&self) -> SiteErrorKind {
        match self {
            SiteError::Preflight { .. } => SiteErrorKind::Preflight,
            SiteError::Provisioning { .. } => SiteErrorKind::Provisioning,
            SiteError::NotFound { .. } => SiteErrorKind::NotFound,
            SiteError::InvalidSite { .. } => SiteErrorKind::InvalidSite,
            SiteError::Update { .. } => SiteErrorKind::Update,
            SiteError::Locked { .. } => SiteErrorKind::Locked,
            SiteError::Runtime { .. } => SiteErrorKind::Runtime,
        }
    }

    /// The provisioning step that failed, if this is a provisioning error.
    pub fn step(&self) -> Option<&ProvisionStep> {
        match self {
            SiteError::Provisioning { step, .. } => Some(step),
            _ => None,
        }
    }

    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        SiteError::InvalidSite {
            reason: reason.into(),
        }
    }
}

impl From<PreflightError> for SiteError {
    fn from(source: PreflightError) -> Self {
        SiteError::Preflight { source }
    }
}
