// ABOUTME: Turns site deployments into running containers and back.
// ABOUTME: One container per component; listing rebuilds deployments from container labels.

use std::collections::BTreeMap;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::error::StepError;
use super::{ComponentKind, Component, Deployment, SiteIngress, container_name, labels};
use crate::runtime::{
    ContainerError, ContainerFilters, ContainerOps, ContainerSpec, ImageOps, MountKind, NetworkAttachment,
    PortMapping, Protocol, VolumeMount,
};
use crate::types::{ContainerId, ImageRef, NetworkAlias, SiteName};

/// Deploys and removes the containers of one site.
pub struct ContainerDeployer<'a, R: ?Sized> {
    runtime: &'a R,
    site: &'a SiteName,
    stop_timeout: Duration,
}

impl<'a, R: ContainerOps + ImageOps + ?Sized> ContainerDeployer<'a, R> {
    pub fn new(runtime: &'a R, site: &'a SiteName, stop_timeout: Duration) -> Self {
        Self {
            runtime,
            site,
            stop_timeout,
        }
    }

    /// Pull the image if missing, create the container and start it.
    ///
    /// A container that was created but failed to start is removed again.
    pub async fn deploy(
        &self,
        deployment: &Deployment,
        cancel: &CancellationToken,
    ) -> Result<ContainerId, StepError> {
        let spec = self.container_spec(deployment)?;
        let image = ImageRef::parse(&spec.image).map_err(|e| StepError::Other(e.to_string()))?;
        if !self.runtime.image_exists(&image).await? {
            tracing::info!(%image, "pulling image");
            self.runtime.pull_image(&image, None, cancel).await?;
        }

        let id = self.runtime.create_container(&spec).await?;
        if let Err(e) = self.runtime.start_container(&id).await {
            if let Err(cleanup) = self.runtime.remove_container(&id, true).await {
                tracing::warn!(container = %spec.name, error = %cleanup, "failed to remove container that did not start");
            }
            return Err(e.into());
        }
        tracing::info!(container = %spec.name, "deployed");
        Ok(id)
    }

    /// Stop and remove the container of `deployment`. Absent containers are fine.
    pub async fn undeploy(&self, deployment: &str) -> Result<(), StepError> {
        let name = container_name(self.site, deployment);
        let id = ContainerId::new(name.as_str());
        match self.runtime.stop_container(&id, self.stop_timeout).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => tracing::warn!(container = %name, error = %e, "stop failed, forcing removal"),
        }
        match self.runtime.remove_container(&id, true).await {
            Ok(()) => {
                tracing::info!(container = %name, "undeployed");
                Ok(())
            }
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Stop and start the container of `deployment` in place.
    pub async fn restart(&self, deployment: &str) -> Result<(), StepError> {
        let name = container_name(self.site, deployment);
        let id = ContainerId::new(name.as_str());
        match self.runtime.stop_container(&id, self.stop_timeout).await {
            Ok(()) | Err(ContainerError::NotRunning(_)) => {}
            Err(e) => return Err(e.into()),
        }
        self.runtime.start_container(&id).await?;
        tracing::info!(container = %name, "restarted");
        Ok(())
    }

    /// Deployments of this site currently present in the runtime, by container label.
    ///
    /// Only the container named after its component counts; replacement
    /// backups and candidates carry the same labels and are skipped.
    pub async fn list(&self) -> Result<Vec<Deployment>, StepError> {
        let containers = self
            .runtime
            .list_containers(&ContainerFilters::labelled(labels::owned(self.site)))
            .await?;
        let mut deployments = Vec::new();
        for summary in containers {
            let Some(name) = summary.labels.get(labels::COMPONENT) else {
                continue;
            };
            if summary.name != container_name(self.site, name) {
                tracing::debug!(container = %summary.name, component = %name, "skipping non-canonical container");
                continue;
            }
            let info = match self.runtime.inspect_container(&summary.id).await {
                Ok(info) => info,
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e.into()),
            };
            deployments.push(deployment_from_spec(name, &info.spec)?);
        }
        deployments.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(deployments)
    }

    /// The container spec for the single component of `deployment`.
    pub fn container_spec(&self, deployment: &Deployment) -> Result<ContainerSpec, StepError> {
        let [component] = deployment.components.as_slice() else {
            return Err(StepError::Other(format!(
                "deployment {} must have exactly one component",
                deployment.name
            )));
        };
        let aliases: Vec<String> = deployment
            .aliases
            .iter()
            .map(|a| a.as_str().to_string())
            .collect();
        let mut labels = labels::component(self.site, &deployment.name);
        labels.extend(component.labels.clone());
        Ok(ContainerSpec {
            name: container_name(self.site, &deployment.name),
            image: component.image.to_string(),
            env: component.env.clone(),
            labels,
            networks: deployment
                .networks
                .iter()
                .map(|network| NetworkAttachment {
                    network: network.clone(),
                    aliases: aliases.clone(),
                })
                .collect(),
            mounts: deployment
                .volume_mounts
                .iter()
                .map(|(volume, path)| VolumeMount::volume(volume, path))
                .collect(),
            ports: component
                .ingresses
                .iter()
                .map(|ingress| PortMapping {
                    host_ip: (!ingress.host.is_empty()).then(|| ingress.host.clone()),
                    host_port: ingress.port,
                    container_port: ingress.target_port,
                    protocol: Protocol::Tcp,
                })
                .collect(),
            entrypoint: None,
            command: component.command.clone(),
            restart_policy: deployment.restart_policy,
            resources: component.resources,
        })
    }
}

fn deployment_from_spec(name: &str, spec: &ContainerSpec) -> Result<Deployment, StepError> {
    let image = ImageRef::parse(&spec.image)
        .map_err(|e| StepError::Other(format!("container {}: {e}", spec.name)))?;
    let kind = ComponentKind::from_deployment(name).ok_or_else(|| {
        StepError::Other(format!("container {} has unknown component {name}", spec.name))
    })?;
    let aliases = spec
        .networks
        .first()
        .map(|n| {
            n.aliases
                .iter()
                .filter_map(|a| NetworkAlias::new(a).ok())
                .collect()
        })
        .unwrap_or_default();
    let volume_mounts: BTreeMap<String, String> = spec
        .mounts
        .iter()
        .filter(|m| m.kind == MountKind::Volume)
        .map(|m| (m.source.clone(), m.target.clone()))
        .collect();
    Ok(Deployment {
        name: name.to_string(),
        components: vec![Component {
            kind,
            name: name.to_string(),
            image,
            env: spec.env.clone(),
            labels: spec.labels.clone(),
            ingresses: spec
                .ports
                .iter()
                .map(|p| SiteIngress {
                    name: format!("{}/{}", p.container_port, p.protocol.as_str()),
                    host: p.host_ip.clone().unwrap_or_default(),
                    port: p.host_port,
                    target_port: p.container_port,
                })
                .collect(),
            command: spec.command.clone(),
            resources: spec.resources,
        }],
        aliases,
        volume_mounts,
        networks: spec.networks.iter().map(|n| n.network.clone()).collect(),
        restart_policy: spec.restart_policy,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{ContainerState, MemoryRuntime, NetworkConfig, NetworkOps, RestartPolicy, ResourceLimits};
    use std::collections::BTreeMap;

    fn deployment(site: &SiteName) -> Deployment {
        Deployment {
            name: "router".into(),
            components: vec![Component {
                kind: ComponentKind::Router,
                name: "router".into(),
                image: ImageRef::parse("quay.io/skupper/skupper-router:3.0").unwrap(),
                env: BTreeMap::from([("A".to_string(), "1".to_string())]),
                labels: labels::component(site, "router"),
                ingresses: vec![SiteIngress {
                    name: "inter-router".into(),
                    host: "127.0.0.1".into(),
                    port: 55671,
                    target_port: 55671,
                }],
                command: None,
                resources: ResourceLimits::default(),
            }],
            aliases: vec![NetworkAlias::new("west-router").unwrap()],
            volume_mounts: BTreeMap::from([("west-router-config".to_string(), "/etc/siteforge/config".to_string())]),
            networks: vec!["siteforge".into()],
            restart_policy: RestartPolicy::Always,
        }
    }

    async fn runtime(dir: &std::path::Path) -> MemoryRuntime {
        let runtime = MemoryRuntime::new(dir);
        let _network = runtime
            .create_network(&NetworkConfig {
                name: "siteforge".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        runtime
    }

    #[tokio::test]
    async fn deploy_then_list_round_trips_the_deployment() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = runtime(dir.path()).await;
        let site = SiteName::new("west").unwrap();
        let deployer = ContainerDeployer::new(&runtime, &site, Duration::from_secs(1));

        deployer
            .deploy(&deployment(&site), &CancellationToken::new())
            .await
            .unwrap();

        let (_, state) = runtime.container("west-router").unwrap();
        assert_eq!(state, ContainerState::Running);

        let listed = deployer.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "router");
        assert_eq!(listed[0].components[0].ingresses[0].host, "127.0.0.1");
        assert!(listed[0].volume_mounts.contains_key("west-router-config"));
    }

    #[tokio::test]
    async fn undeploy_removes_container_and_tolerates_absence() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = runtime(dir.path()).await;
        let site = SiteName::new("west").unwrap();
        let deployer = ContainerDeployer::new(&runtime, &site, Duration::from_secs(1));
        deployer
            .deploy(&deployment(&site), &CancellationToken::new())
            .await
            .unwrap();

        deployer.undeploy("router").await.unwrap();
        assert!(runtime.container("west-router").is_none());
        deployer.undeploy("router").await.unwrap();
    }

    #[tokio::test]
    async fn failed_start_leaves_no_container() {
        use crate::runtime::{Fault, Op};

        let dir = tempfile::tempdir().unwrap();
        let runtime = runtime(dir.path()).await;
        runtime.inject(Fault::on(Op::StartContainer));
        let site = SiteName::new("west").unwrap();
        let deployer = ContainerDeployer::new(&runtime, &site, Duration::from_secs(1));

        let result = deployer
            .deploy(&deployment(&site), &CancellationToken::new())
            .await;
        assert!(result.is_err());
        assert!(runtime.container("west-router").is_none());
    }
}
