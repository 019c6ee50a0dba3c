// ABOUTME: Runtime flavour and endpoint descriptions.
// ABOUTME: A RuntimeEndpoint is what gets persisted as the site's local endpoint pointer.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeType {
    Docker,
    Podman,
}

impl fmt::Display for RuntimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RuntimeType::Docker => "docker",
            RuntimeType::Podman => "podman",
        })
    }
}

/// Where a runtime API listens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeEndpoint {
    pub runtime_type: RuntimeType,
    pub socket_path: String,
}

/// Explicit runtime selection from the site file; unset fields are auto-detected.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub runtime: Option<RuntimeType>,
    /// Socket path, with or without a `unix://` prefix.
    #[serde(default)]
    pub endpoint: Option<String>,
}
