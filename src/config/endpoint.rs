// ABOUTME: The local endpoint pointer: which runtime socket the site on this host lives behind.
// ABOUTME: Written at create so later status, update and delete calls reach the same runtime.

use std::path::Path;

use crate::error::{Error, Result};
use crate::runtime::RuntimeEndpoint;

pub const ENDPOINT_FILE: &str = "runtime.yml";

pub fn save(path: &Path, endpoint: &RuntimeEndpoint) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_yaml::to_string(endpoint)?)?;
    tracing::debug!(path = %path.display(), socket = %endpoint.socket_path, "saved runtime endpoint");
    Ok(())
}

pub fn load(path: &Path) -> Result<RuntimeEndpoint> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::EndpointNotFound(path.to_path_buf()));
        }
        Err(e) => return Err(e.into()),
    };
    Ok(serde_yaml::from_str(&content)?)
}
