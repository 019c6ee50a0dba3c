// ABOUTME: Reads and writes files inside named volumes through their host mountpoint.
// ABOUTME: Only works against a local runtime, which pre-flight verifies.

use crate::runtime::{VolumeConfig, VolumeDetails, VolumeError, VolumeOps};
use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum VolumeFileError {
    #[error(transparent)]
    Volume(#[from] VolumeError),

    #[error("volume {volume} mountpoint {path} is not a local directory")]
    NotLocal { volume: String, path: String },

    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Create `name` unless it exists. Returns whether this call created it.
pub async fn ensure_volume<R: VolumeOps + ?Sized>(
    runtime: &R,
    name: &str,
    labels: &HashMap<String, String>,
) -> Result<bool, VolumeError> {
    if runtime.volume_exists(name).await? {
        return Ok(false);
    }
    runtime
        .create_volume(&VolumeConfig {
            name: name.to_string(),
            labels: labels.clone(),
        })
        .await?;
    Ok(true)
}

pub async fn local_mountpoint<R: VolumeOps + ?Sized>(
    runtime: &R,
    volume: &str,
) -> Result<PathBuf, VolumeFileError> {
    let VolumeDetails { mountpoint, .. } = runtime.inspect_volume(volume).await?;
    let path = PathBuf::from(&mountpoint);
    if !tokio::fs::metadata(&path)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
    {
        return Err(VolumeFileError::NotLocal {
            volume: volume.to_string(),
            path: mountpoint,
        });
    }
    Ok(path)
}

pub async fn write_file<R: VolumeOps + ?Sized>(
    runtime: &R,
    volume: &str,
    file: &str,
    contents: &[u8],
) -> Result<PathBuf, VolumeFileError> {
    let path = local_mountpoint(runtime, volume).await?.join(file);
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|source| VolumeFileError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
    }
    tokio::fs::write(&path, contents)
        .await
        .map_err(|source| VolumeFileError::Io {
            path: path.clone(),
            source,
        })?;
    Ok(path)
}

pub async fn read_file<R: VolumeOps + ?Sized>(
    runtime: &R,
    volume: &str,
    file: &str,
) -> Result<Vec<u8>, VolumeFileError> {
    let path = local_mountpoint(runtime, volume).await?.join(file);
    tokio::fs::read(&path)
        .await
        .map_err(|source| VolumeFileError::Io { path, source })
}
