// ABOUTME: Locates the local Docker or Podman API socket.
// ABOUTME: Explicit configuration wins; otherwise Podman sockets are tried before Docker.

use super::types::{RuntimeConfig, RuntimeEndpoint, RuntimeType};
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum DetectionError {
    #[error("no container runtime found (checked Podman and Docker sockets)")]
    NoRuntimeFound,

    #[error("only local unix socket endpoints are supported, got {0}")]
    UnsupportedEndpoint(String),
}

const ROOTFUL_PODMAN: &str = "/run/podman/podman.sock";
const DOCKER_SOCKET: &str = "/var/run/docker.sock";

/// Resolve the runtime endpoint for this host.
///
/// Lookup order without configuration:
/// 1. `$XDG_RUNTIME_DIR/podman/podman.sock` (falls back to `/run/user/$UID`)
/// 2. `/run/podman/podman.sock`
/// 3. `/var/run/docker.sock`
pub fn detect_local(config: Option<&RuntimeConfig>) -> Result<RuntimeEndpoint, DetectionError> {
    let config = config.cloned().unwrap_or_default();

    if let Some(endpoint) = config.endpoint.as_deref() {
        let socket_path = socket_from_endpoint(endpoint)?;
        let runtime_type = config.runtime.unwrap_or_else(|| guess_type(&socket_path));
        return Ok(RuntimeEndpoint {
            runtime_type,
            socket_path,
        });
    }

    let candidates = candidate_sockets();
    candidates
        .into_iter()
        .filter(|(runtime_type, _)| config.runtime.is_none_or(|wanted| wanted == *runtime_type))
        .find(|(_, path)| Path::new(path).exists())
        .map(|(runtime_type, socket_path)| RuntimeEndpoint {
            runtime_type,
            socket_path,
        })
        .ok_or(DetectionError::NoRuntimeFound)
}

fn candidate_sockets() -> Vec<(RuntimeType, String)> {
    let mut out = Vec::new();
    if let Some(dir) = user_runtime_dir() {
        out.push((RuntimeType::Podman, format!("{dir}/podman/podman.sock")));
    }
    out.push((RuntimeType::Podman, ROOTFUL_PODMAN.to_string()));
    out.push((RuntimeType::Docker, DOCKER_SOCKET.to_string()));
    out
}

fn socket_from_endpoint(endpoint: &str) -> Result<String, DetectionError> {
    if let Some(path) = endpoint.strip_prefix("unix://") {
        return Ok(path.to_string());
    }
    if endpoint.starts_with('/') {
        return Ok(endpoint.to_string());
    }
    Err(DetectionError::UnsupportedEndpoint(endpoint.to_string()))
}

fn guess_type(socket_path: &str) -> RuntimeType {
    if socket_path.contains("podman") {
        RuntimeType::Podman
    } else {
        RuntimeType::Docker
    }
}

fn user_runtime_dir() -> Option<String> {
    if let Ok(dir) = std::env::var("XDG_RUNTIME_DIR")
        && !dir.is_empty()
    {
        return Some(dir);
    }
    let uid = std::env::var("UID").ok().or_else(|| {
        std::fs::read_to_string("/proc/self/status")
            .ok()?
            .lines()
            .find(|l| l.starts_with("Uid:"))?
            .split_whitespace()
            .nth(1)
            .map(str::to_string)
    })?;
    Some(format!("/run/user/{uid}"))
}
