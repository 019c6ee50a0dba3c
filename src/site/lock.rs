// ABOUTME: Per-site lock file so two invocations never mutate the same site at once.
// ABOUTME: Atomic create-new of <state dir>/<site>.lock holding JSON holder info.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::types::SiteName;

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("held by {holder} (pid {pid}) since {started_at}")]
    Held {
        holder: String,
        pid: u32,
        started_at: DateTime<Utc>,
    },

    #[error("lock file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Who holds a site lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    pub holder: String,
    pub pid: u32,
    pub started_at: DateTime<Utc>,
    pub site: String,
}

impl LockInfo {
    pub fn new(site: &SiteName) -> Self {
        Self {
            holder: gethostname::gethostname().to_string_lossy().into_owned(),
            pid: std::process::id(),
            started_at: Utc::now(),
            site: site.to_string(),
        }
    }

    /// Locks older than an hour are assumed abandoned.
    pub fn is_stale(&self) -> bool {
        let age = Utc::now() - self.started_at;
        age.num_hours() >= 1
    }

    pub fn lock_path(state_dir: &Path, site: &SiteName) -> PathBuf {
        state_dir.join(format!("{site}.lock"))
    }
}

/// A held site lock. Released on drop.
#[derive(Debug)]
pub struct SiteLock {
    path: PathBuf,
}

impl SiteLock {
    /// Take the lock for `site`, breaking it when stale, unreadable or `force` is set.
    pub fn acquire(state_dir: &Path, site: &SiteName, force: bool) -> Result<Self, LockError> {
        let path = LockInfo::lock_path(state_dir, site);
        let io_err = |source| LockError::Io {
            path: path.clone(),
            source,
        };
        std::fs::create_dir_all(state_dir).map_err(io_err)?;

        let info = LockInfo::new(site);
        if Self::try_create(&path, &info).map_err(io_err)? {
            return Ok(Self { path });
        }

        match std::fs::read_to_string(&path)
            .ok()
            .and_then(|raw| serde_json::from_str::<LockInfo>(&raw).ok())
        {
            Some(existing) if !force && !existing.is_stale() => {
                return Err(LockError::Held {
                    holder: existing.holder,
                    pid: existing.pid,
                    started_at: existing.started_at,
                });
            }
            Some(existing) => {
                tracing::warn!(
                    holder = %existing.holder,
                    pid = existing.pid,
                    since = %existing.started_at,
                    "breaking site lock"
                );
            }
            None => tracing::warn!(path = %path.display(), "lock info unreadable, breaking lock"),
        }

        let _ = std::fs::remove_file(&path);
        if Self::try_create(&path, &info).map_err(io_err)? {
            Ok(Self { path })
        } else {
            Err(LockError::Io {
                path: path.clone(),
                source: std::io::Error::new(
                    std::io::ErrorKind::AlreadyExists,
                    "lock acquired by another process during break",
                ),
            })
        }
    }

    fn try_create(path: &Path, info: &LockInfo) -> std::io::Result<bool> {
        let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => return Ok(false),
            Err(e) => return Err(e),
        };
        let json = serde_json::to_vec(info).map_err(std::io::Error::other)?;
        file.write_all(&json)?;
        Ok(true)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SiteLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to release site lock");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site() -> SiteName {
        SiteName::new("west").unwrap()
    }

    #[test]
    fn lock_info_records_current_process() {
        let info = LockInfo::new(&site());
        assert_eq!(info.site, "west");
        assert_eq!(info.pid, std::process::id());
        assert!(!info.holder.is_empty());
        assert!(!info.is_stale());
    }

    #[test]
    fn old_lock_is_stale() {
        let mut info = LockInfo::new(&site());
        info.started_at = Utc::now() - chrono::Duration::hours(2);
        assert!(info.is_stale());
    }

    #[test]
    fn second_acquire_is_refused_until_release() {
        let dir = tempfile::tempdir().unwrap();
        let lock = SiteLock::acquire(dir.path(), &site(), false).unwrap();
        assert!(lock.path().exists());

        let err = SiteLock::acquire(dir.path(), &site(), false).unwrap_err();
        assert!(matches!(err, LockError::Held { .. }));

        drop(lock);
        assert!(!dir.path().join("west.lock").exists());
        SiteLock::acquire(dir.path(), &site(), false).unwrap();
    }

    #[test]
    fn force_breaks_a_held_lock() {
        let dir = tempfile::tempdir().unwrap();
        let held = SiteLock::acquire(dir.path(), &site(), false).unwrap();
        let forced = SiteLock::acquire(dir.path(), &site(), true).unwrap();
        std::mem::forget(held);
        assert!(forced.path().exists());
    }

    #[test]
    fn corrupt_lock_is_broken() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("west.lock"), "not json").unwrap();
        SiteLock::acquire(dir.path(), &site(), false).unwrap();
    }
}
