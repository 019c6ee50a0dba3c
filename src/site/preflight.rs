// ABOUTME: Dry validation that a site can be created on this runtime before anything is mutated.
// ABOUTME: Checks create and remove their own throwaway resources; collisions abort first.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener};

use tokio_util::sync::CancellationToken;

use super::error::PreflightError;
use super::volume_files::{self, VolumeFileError};
use super::{ROUTER_DEPLOYMENT, Site, all_volumes, container_name};
use crate::runtime::{
    ContainerSpec, Gateway, NetworkConfig, NetworkError, RestartPolicy, VolumeConfig,
    collect_logs,
};
use crate::types::ImageRef;

const CHECK_FILE: &str = ".write-check";
const ROUTER_LOG_LINES: u64 = 50;

#[derive(Debug, Clone, Copy)]
pub struct PreflightOptions {
    /// Bind-test every published host port.
    pub check_host_ports: bool,
    /// Run `skrouterd -version` in the configured router image.
    pub verify_router_image: bool,
}

impl Default for PreflightOptions {
    fn default() -> Self {
        Self {
            check_host_ports: true,
            verify_router_image: true,
        }
    }
}

/// Check every precondition of creating `site`.
///
/// The checks that only read state run first, so a site that already exists
/// is rejected without touching the runtime.
pub async fn can_create<R: Gateway + ?Sized>(
    runtime: &R,
    site: &Site,
    options: PreflightOptions,
    cancel: &CancellationToken,
) -> Result<(), PreflightError> {
    let meta = runtime.info().await.map_err(PreflightError::Unreachable)?;
    tracing::debug!(
        runtime = %meta.name,
        version = %meta.version,
        os = %meta.os,
        "runtime reachable"
    );

    for deployment in &site.deployments {
        let name = container_name(site.name(), &deployment.name);
        match runtime.inspect_container(&name.as_str().into()).await {
            Ok(_) => return Err(PreflightError::ContainerExists(name)),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(PreflightError::Runtime(e.to_string())),
        }
    }

    for volume in all_volumes(site) {
        if runtime
            .volume_exists(&volume)
            .await
            .map_err(|e| PreflightError::Runtime(e.to_string()))?
        {
            return Err(PreflightError::VolumeExists(volume));
        }
    }

    if options.check_host_ports {
        check_host_ports(site)?;
    }

    let network = site
        .container_spec()
        .map(|spec| spec.network.clone())
        .unwrap_or_default();
    check_network(runtime, site, &network).await?;
    check_local_volumes(runtime, site).await?;

    if options.verify_router_image {
        check_router_image(runtime, site, cancel).await?;
    }
    tracing::debug!(site = %site.name(), "pre-flight checks passed");
    Ok(())
}

async fn check_network<R: Gateway + ?Sized>(
    runtime: &R,
    site: &Site,
    network: &str,
) -> Result<(), PreflightError> {
    match runtime.inspect_network(network).await {
        Ok(details) if details.dns_enabled => return Ok(()),
        Ok(_) => return Err(PreflightError::NetworkWithoutDns(network.to_string())),
        Err(NetworkError::NotFound(_)) => {}
        Err(e) => return Err(PreflightError::Runtime(e.to_string())),
    }

    let scratch = format!(
        "{}-dns-check-{}",
        site.name(),
        chrono::Utc::now().format(crate::replace::TIMESTAMP_FORMAT)
    );
    let id = runtime
        .create_network(&NetworkConfig {
            name: scratch.clone(),
            ..Default::default()
        })
        .await
        .map_err(|e| PreflightError::NoDnsSupport(e.to_string()))?;
    tracing::debug!(network = %scratch, %id, "DNS check network created");
    let dns = runtime.inspect_network(&scratch).await.map(|d| d.dns_enabled);
    if let Err(e) = runtime.remove_network(&scratch).await {
        tracing::warn!(network = %scratch, error = %e, "failed to remove DNS check network");
    }
    match dns {
        Ok(true) => Ok(()),
        Ok(false) => Err(PreflightError::NoDnsSupport(format!(
            "check network {scratch} came up without DNS"
        ))),
        Err(e) => Err(PreflightError::NoDnsSupport(e.to_string())),
    }
}

fn check_host_ports(site: &Site) -> Result<(), PreflightError> {
    let ingresses = site
        .deployments
        .iter()
        .flat_map(|d| &d.components)
        .flat_map(|c| &c.ingresses);
    for ingress in ingresses {
        let ip = if ingress.host.is_empty() {
            IpAddr::V4(Ipv4Addr::UNSPECIFIED)
        } else {
            match ingress.host.parse::<IpAddr>() {
                Ok(ip) => ip,
                Err(_) => {
                    tracing::debug!(host = %ingress.host, "skipping port check for non-IP host");
                    continue;
                }
            }
        };
        match TcpListener::bind(SocketAddr::new(ip, ingress.port)) {
            Ok(listener) => drop(listener),
            Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
                return Err(PreflightError::PortInUse {
                    host: ingress.host.clone(),
                    port: ingress.port,
                });
            }
            Err(e) => {
                tracing::debug!(host = %ingress.host, port = ingress.port, error = %e, "port check inconclusive");
            }
        }
    }
    Ok(())
}

async fn check_local_volumes<R: Gateway + ?Sized>(
    runtime: &R,
    site: &Site,
) -> Result<(), PreflightError> {
    let scratch = format!("{}-write-check", site.name());
    runtime
        .create_volume(&VolumeConfig {
            name: scratch.clone(),
            labels: HashMap::new(),
        })
        .await
        .map_err(|e| PreflightError::Runtime(e.to_string()))?;

    let outcome = async {
        volume_files::write_file(runtime, &scratch, CHECK_FILE, b"ok").await?;
        volume_files::read_file(runtime, &scratch, CHECK_FILE).await
    }
    .await;

    if let Err(e) = runtime.remove_volume(&scratch, true).await {
        tracing::warn!(volume = %scratch, error = %e, "failed to remove write check volume");
    }
    match outcome {
        Ok(_) => Ok(()),
        Err(VolumeFileError::NotLocal { path, .. }) => Err(PreflightError::RemoteVolumes(path)),
        Err(e) => Err(PreflightError::Runtime(e.to_string())),
    }
}

async fn check_router_image<R: Gateway + ?Sized>(
    runtime: &R,
    site: &Site,
    cancel: &CancellationToken,
) -> Result<(), PreflightError> {
    let Some(component) = site
        .deployment(ROUTER_DEPLOYMENT)
        .and_then(|d| d.components.first())
    else {
        return Ok(());
    };
    let image: &ImageRef = &component.image;
    let runtime_err = |e: &dyn std::fmt::Display| PreflightError::Runtime(e.to_string());

    if !runtime.image_exists(image).await.map_err(|e| runtime_err(&e))? {
        runtime
            .pull_image(image, None, cancel)
            .await
            .map_err(|e| runtime_err(&e))?;
    }

    let spec = ContainerSpec {
        name: format!("{}-router-version-check", site.name()),
        image: image.to_string(),
        entrypoint: Some(vec!["skrouterd".to_string()]),
        command: Some(vec!["-version".to_string()]),
        restart_policy: RestartPolicy::No,
        ..Default::default()
    };
    let id = runtime
        .create_container(&spec)
        .await
        .map_err(|e| runtime_err(&e))?;
    let result = async {
        runtime.start_container(&id).await?;
        runtime.wait_container(&id).await
    }
    .await;

    let logs = match &result {
        Ok(0) => String::new(),
        _ => collect_logs(runtime, &id, ROUTER_LOG_LINES)
            .await
            .unwrap_or_default(),
    };
    if let Err(e) = runtime.remove_container(&id, true).await {
        tracing::warn!(container = %spec.name, error = %e, "failed to remove router check container");
    }

    match result {
        Ok(0) => Ok(()),
        Ok(exit_code) => Err(PreflightError::RouterImage {
            image: image.to_string(),
            exit_code,
            logs,
        }),
        Err(e) => Err(runtime_err(&e)),
    }
}
