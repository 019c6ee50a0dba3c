// ABOUTME: Start/stop scripts and a systemd user unit that bring a site back after reboot.
// ABOUTME: Scripts are mandatory; enabling the unit is best effort and degrades to a warning.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use tokio::process::Command;

use super::{Site, container_name};
use crate::diagnostics::{Diagnostics, Warning};
use crate::runtime::RuntimeType;
use crate::types::SiteName;

pub const START_SCRIPT: &str = "start.sh";
pub const STOP_SCRIPT: &str = "stop.sh";

#[derive(Debug, thiserror::Error)]
#[error("{path}: {source}")]
pub struct StartupError {
    pub path: PathBuf,
    pub source: std::io::Error,
}

/// Where startup artifacts for every site live.
#[derive(Debug, Clone)]
pub struct StartupRegistration {
    /// Per-site script directories are created under this one.
    pub scripts_root: PathBuf,
    /// Directory of systemd user units, normally `$XDG_CONFIG_HOME/systemd/user`.
    pub unit_dir: PathBuf,
    /// Install and enable the systemd unit at all.
    pub systemd: bool,
    /// `systemctl` executable.
    pub systemctl: PathBuf,
}

impl StartupRegistration {
    pub fn service_name(site: &SiteName) -> String {
        format!("siteforge-{site}.service")
    }

    pub fn scripts_dir(&self, site: &SiteName) -> PathBuf {
        self.scripts_root.join(site.as_str()).join("scripts")
    }

    fn unit_path(&self, site: &SiteName) -> PathBuf {
        self.unit_dir.join(Self::service_name(site))
    }

    /// Write the scripts and, when enabled, install and enable the unit.
    pub async fn install(
        &self,
        site: &Site,
        runtime: RuntimeType,
        diagnostics: &mut Diagnostics,
    ) -> Result<(), StartupError> {
        let dir = self.scripts_dir(site.name());
        create_dir(&dir).await?;
        let containers: Vec<String> = site
            .deployments
            .iter()
            .map(|d| container_name(site.name(), &d.name))
            .collect();
        write_script(&dir.join(START_SCRIPT), &start_script(runtime, &containers)).await?;
        write_script(&dir.join(STOP_SCRIPT), &stop_script(runtime, &containers)).await?;
        tracing::debug!(dir = %dir.display(), "startup scripts written");

        if !self.systemd {
            return Ok(());
        }
        let unit = self.unit_path(site.name());
        create_dir(&self.unit_dir).await?;
        tokio::fs::write(&unit, unit_file(site, &dir))
            .await
            .map_err(|source| StartupError {
                path: unit.clone(),
                source,
            })?;

        let service = Self::service_name(site.name());
        for args in [
            vec!["enable", service.as_str()],
            vec!["daemon-reload"],
            vec!["start", service.as_str()],
        ] {
            if let Err(message) = self.systemctl(&args).await {
                diagnostics.warn(Warning::startup(format!(
                    "unable to enable {service} ({message}); start the site with {}",
                    dir.join(START_SCRIPT).display()
                )));
                break;
            }
        }
        Ok(())
    }

    /// Disable the unit and delete every startup artifact. Never fails.
    pub async fn remove(&self, site: &SiteName) {
        if self.systemd {
            let service = Self::service_name(site);
            for args in [vec!["stop", service.as_str()], vec!["disable", service.as_str()]] {
                if let Err(message) = self.systemctl(&args).await {
                    tracing::debug!(%service, %message, "systemctl during removal");
                }
            }
            let unit = self.unit_path(site);
            if let Err(e) = tokio::fs::remove_file(&unit).await
                && e.kind() != std::io::ErrorKind::NotFound
            {
                tracing::warn!(path = %unit.display(), error = %e, "failed to remove systemd unit");
            }
            for args in [vec!["daemon-reload"], vec!["reset-failed"]] {
                if let Err(message) = self.systemctl(&args).await {
                    tracing::debug!(command = args[0], %message, "systemctl during removal");
                }
            }
        }
        let root = self.scripts_root.join(site.as_str());
        if let Err(e) = tokio::fs::remove_dir_all(&root).await
            && e.kind() != std::io::ErrorKind::NotFound
        {
            tracing::warn!(path = %root.display(), error = %e, "failed to remove startup scripts");
        }
    }

    async fn systemctl(&self, args: &[&str]) -> Result<(), String> {
        let output = Command::new(&self.systemctl)
            .arg("--user")
            .args(args)
            .output()
            .await
            .map_err(|e| e.to_string())?;
        if output.status.success() {
            Ok(())
        } else {
            Err(String::from_utf8_lossy(&output.stderr).trim().to_string())
        }
    }
}

async fn create_dir(dir: &Path) -> Result<(), StartupError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|source| StartupError {
            path: dir.to_path_buf(),
            source,
        })
}

async fn write_script(path: &Path, body: &str) -> Result<(), StartupError> {
    let err = |source| StartupError {
        path: path.to_path_buf(),
        source,
    };
    tokio::fs::write(path, body).await.map_err(err)?;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
        .await
        .map_err(err)
}

fn start_script(runtime: RuntimeType, containers: &[String]) -> String {
    let mut script = String::from("#!/bin/sh\nset -e\n");
    for name in containers {
        script.push_str(&format!("{runtime} start {name}\n"));
    }
    script
}

fn stop_script(runtime: RuntimeType, containers: &[String]) -> String {
    let mut script = String::from("#!/bin/sh\n");
    for name in containers.iter().rev() {
        script.push_str(&format!("{runtime} stop -t 10 {name}\n"));
    }
    script
}

fn unit_file(site: &Site, scripts: &Path) -> String {
    format!(
        "[Unit]\n\
         Description=siteforge site {name}\n\
         Wants=network-online.target\n\
         After=network-online.target\n\
         \n\
         [Service]\n\
         Type=oneshot\n\
         RemainAfterExit=yes\n\
         ExecStart={start}\n\
         ExecStop={stop}\n\
         \n\
         [Install]\n\
         WantedBy=default.target\n",
        name = site.name(),
        start = scripts.join(START_SCRIPT).display(),
        stop = scripts.join(STOP_SCRIPT).display(),
    )
}
