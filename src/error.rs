// ABOUTME: Application-wide error types for siteforge.
// ABOUTME: Configuration failures plus the site and runtime errors surfaced to the CLI.

use std::path::PathBuf;
use thiserror::Error;

use crate::runtime::RuntimeError;
use crate::site::SiteError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("file already exists: {0}")]
    AlreadyExists(PathBuf),

    #[error("configuration file not found in {0}")]
    ConfigNotFound(PathBuf),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("no runtime endpoint recorded at {0}; create a site first")]
    EndpointNotFound(PathBuf),

    #[error("cannot determine {0} directory; set HOME or the XDG variables")]
    NoHomeDir(&'static str),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Site(#[from] SiteError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

pub type Result<T> = std::result::Result<T, Error>;
