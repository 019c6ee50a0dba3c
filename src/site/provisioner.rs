// ABOUTME: Container-runtime site handler: create with rollback, status, teardown and update.
// ABOUTME: Every mutating step registers its undo action before the next step runs.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::compensation::Compensations;
use super::credentials::{CredentialHandler, VolumeCredentialHandler};
use super::deployment::ContainerDeployer;
use super::error::{ProvisionStep, StepError, TeardownError};
use super::layout::{
    DEFAULT_NETWORK, EDGE_TARGET_PORT, INTER_ROUTER_TARGET_PORT, SITE_CA, SITE_SERVER_CREDENTIAL,
    prepare, required_volumes,
};
use super::lock::SiteLock;
use super::preflight::{self, PreflightOptions};
use super::router_config::{RouterConfig, RouterConfigError, RouterConfigStore};
use super::startup::StartupRegistration;
use super::volume_files::{ensure_volume, write_file};
use super::{
    CONSOLE_USERS_VOLUME, CONTROLLER_DEPLOYMENT, ComponentKind, ContainerSiteSpec, Deployment,
    FLOW_COLLECTOR_DEPLOYMENT, ImageSet, PROMETHEUS_CONFIG_VOLUME, PROMETHEUS_DEPLOYMENT,
    PlatformSpec, Provisioned, ROUTER_DEPLOYMENT, Site, SiteError, SiteHandler, TeardownReport,
    UpdatePlan, UpdateSummary, container_name, labels, volume_name,
};
use crate::config::endpoint;
use crate::diagnostics::Diagnostics;
use crate::runtime::{
    ContainerFilters, Gateway, NetworkConfig, NetworkError, RuntimeEndpoint, VolumeError,
    VolumeFilters,
};
use crate::types::SiteName;
use crate::update::UpdateProcessor;
use crate::update::tasks::{self, TaskContext};
use crate::version;

const CONSOLE_USER_FILE: &str = "user";
const PROMETHEUS_CONFIG_FILE: &str = "prometheus.yml";
const FLOW_COLLECTOR_METRICS_PORT: u16 = 8010;

#[derive(Debug, Clone)]
pub struct ProvisionOptions {
    pub preflight: PreflightOptions,
    /// Startup scripts and unit; skipped when `None`.
    pub startup: Option<StartupRegistration>,
    pub update_timeout: Duration,
    pub stop_timeout: Duration,
}

impl Default for ProvisionOptions {
    fn default() -> Self {
        Self {
            preflight: PreflightOptions::default(),
            startup: None,
            update_timeout: Duration::from_secs(600),
            stop_timeout: Duration::from_secs(10),
        }
    }
}

/// Everything a handler knows about its site besides the runtime itself.
#[derive(Debug, Clone)]
pub struct HandlerContext {
    pub site: SiteName,
    pub endpoint: RuntimeEndpoint,
    /// Where the endpoint pointer is persisted at create.
    pub endpoint_file: Option<PathBuf>,
    /// Directory for per-site lock files; no locking when `None`.
    pub lock_dir: Option<PathBuf>,
    /// Network the site uses when its definition cannot be read back.
    pub network: String,
    /// Images the site should run; compared against running containers by update.
    pub images: ImageSet,
    pub options: ProvisionOptions,
}

impl HandlerContext {
    pub fn new(site: SiteName, endpoint: RuntimeEndpoint, images: ImageSet) -> Self {
        Self {
            site,
            endpoint,
            endpoint_file: None,
            lock_dir: None,
            network: DEFAULT_NETWORK.to_string(),
            images,
            options: ProvisionOptions::default(),
        }
    }
}

/// Site lifecycle against a single container runtime endpoint.
pub struct ContainerSiteHandler<R: ?Sized> {
    runtime: Arc<R>,
    ctx: HandlerContext,
}

fn failed_at<E: Into<StepError>>(step: ProvisionStep) -> impl FnOnce(E) -> SiteError {
    move |e| SiteError::Provisioning {
        step,
        source: e.into(),
    }
}

fn runtime_error(e: impl Into<StepError>) -> SiteError {
    SiteError::Runtime { source: e.into() }
}

impl<R: Gateway + ?Sized + 'static> ContainerSiteHandler<R> {
    pub fn new(runtime: Arc<R>, ctx: HandlerContext) -> Self {
        Self { runtime, ctx }
    }

    pub fn runtime(&self) -> &R {
        self.runtime.as_ref()
    }

    pub fn context(&self) -> &HandlerContext {
        &self.ctx
    }

    fn lock(&self) -> Result<Option<SiteLock>, SiteError> {
        self.ctx
            .lock_dir
            .as_deref()
            .map(|dir| SiteLock::acquire(dir, &self.ctx.site, false))
            .transpose()
            .map_err(|source| SiteError::Locked {
                site: self.ctx.site.to_string(),
                source,
            })
    }

    fn deployer(&self) -> ContainerDeployer<'_, R> {
        ContainerDeployer::new(
            self.runtime.as_ref(),
            &self.ctx.site,
            self.ctx.options.stop_timeout,
        )
    }

    async fn provision<'a>(
        &'a self,
        site: &'a Site,
        spec: &'a ContainerSiteSpec,
        undo: &mut Compensations<'a>,
        diagnostics: &mut Diagnostics,
        cancel: &CancellationToken,
    ) -> Result<(), SiteError> {
        let runtime = self.runtime.as_ref();
        let name = site.name();

        if let Some(path) = &self.ctx.endpoint_file {
            endpoint::save(path, &self.ctx.endpoint).map_err(|e| SiteError::Provisioning {
                step: ProvisionStep::EndpointPointer,
                source: StepError::Other(e.to_string()),
            })?;
        }

        let network = spec.network.as_str();
        if !runtime
            .network_exists(network)
            .await
            .map_err(failed_at(ProvisionStep::Network))?
        {
            let id = runtime
                .create_network(&NetworkConfig {
                    name: network.to_string(),
                    driver: None,
                    labels: labels::owned(name),
                    enable_ipv6: spec.enable_ipv6,
                })
                .await
                .map_err(failed_at(ProvisionStep::Network))?;
            tracing::info!(%network, %id, "network created");
            undo.push(format!("remove network {network}"), move || async move {
                runtime.remove_network(network).await
            });
        }

        undo.push("delete certificate authorities", move || async move {
            let credentials = VolumeCredentialHandler::new(runtime, name);
            let mut first = None;
            for ca in site.certificate_authorities.iter().rev() {
                if let Err(e) = credentials.delete_ca(&ca.name).await {
                    first.get_or_insert(e);
                }
            }
            first.map_or(Ok(()), Err)
        });
        let credentials = VolumeCredentialHandler::new(runtime, name);
        for ca in &site.certificate_authorities {
            credentials
                .create_ca(ca)
                .await
                .map_err(failed_at(ProvisionStep::CertificateAuthorities))?;
        }

        undo.push("delete credentials", move || async move {
            let credentials = VolumeCredentialHandler::new(runtime, name);
            let mut first = None;
            for credential in site.credentials.iter().rev() {
                if let Err(e) = credentials.delete_credential(&credential.name).await {
                    first.get_or_insert(e);
                }
            }
            first.map_or(Ok(()), Err)
        });
        for credential in &site.credentials {
            credentials
                .create_credential(credential)
                .await
                .map_err(failed_at(ProvisionStep::Credentials))?;
        }

        undo.push("remove router configuration", move || async move {
            RouterConfigStore::new(runtime, name).remove().await
        });
        RouterConfigStore::new(runtime, name)
            .save(&RouterConfig::initial(site))
            .await
            .map_err(failed_at(ProvisionStep::RouterConfig))?;

        let owned = labels::owned(name);
        for volume in required_volumes(site) {
            if ensure_volume(runtime, &volume, &owned)
                .await
                .map_err(failed_at(ProvisionStep::Volumes))?
            {
                undo.push(format!("remove volume {volume}"), move || async move {
                    runtime.remove_volume(&volume, true).await
                });
            }
        }

        self.write_auxiliary(site, spec)
            .await
            .map_err(failed_at(ProvisionStep::AuxiliaryConfig))?;

        let deployer = self.deployer();
        for deployment in &site.deployments {
            if cancel.is_cancelled() {
                return Err(SiteError::Provisioning {
                    step: ProvisionStep::Deploy {
                        deployment: deployment.name.clone(),
                    },
                    source: StepError::Other("cancelled".to_string()),
                });
            }
            let id = deployer
                .deploy(deployment, cancel)
                .await
                .map_err(failed_at(ProvisionStep::Deploy {
                    deployment: deployment.name.clone(),
                }))?;
            tracing::debug!(deployment = %deployment.name, %id, "deployment running");
            let stop_timeout = self.ctx.options.stop_timeout;
            let deployment = deployment.name.as_str();
            undo.push(format!("undeploy {deployment}"), move || async move {
                ContainerDeployer::new(runtime, name, stop_timeout)
                    .undeploy(deployment)
                    .await
            });
        }

        if let Some(startup) = &self.ctx.options.startup {
            undo.push("remove startup registration", move || async move {
                startup.remove(name).await;
                Ok::<_, StepError>(())
            });
            startup
                .install(site, spec.runtime, diagnostics)
                .await
                .map_err(|e| SiteError::Provisioning {
                    step: ProvisionStep::Startup,
                    source: StepError::Other(e.to_string()),
                })?;
        }
        Ok(())
    }

    async fn write_auxiliary(&self, site: &Site, spec: &ContainerSiteSpec) -> Result<(), StepError> {
        let runtime = self.runtime.as_ref();
        let name = site.name();
        if site.deployment(FLOW_COLLECTOR_DEPLOYMENT).is_none() {
            return Ok(());
        }
        if let Some(console) = &spec.console {
            let volume = volume_name(name, CONSOLE_USERS_VOLUME);
            write_file(runtime, &volume, CONSOLE_USER_FILE, console.password.as_bytes()).await?;
            tracing::debug!(%volume, user = %console.user, "console user written");
        }
        if site.deployment(PROMETHEUS_DEPLOYMENT).is_some() {
            let volume = volume_name(name, PROMETHEUS_CONFIG_VOLUME);
            let config = prometheus_config(&container_name(name, FLOW_COLLECTOR_DEPLOYMENT));
            write_file(runtime, &volume, PROMETHEUS_CONFIG_FILE, config.as_bytes()).await?;
        }
        Ok(())
    }

    /// Rebuild the container spec from what is deployed.
    fn spec_from(&self, deployments: &[Deployment]) -> ContainerSiteSpec {
        let router = deployments.iter().find(|d| d.name == ROUTER_DEPLOYMENT);
        let router_component = router.and_then(|d| d.components.first());
        let ingresses = router_component.map(|c| c.ingresses.as_slice()).unwrap_or_default();

        let mut ingress_hosts: Vec<String> = Vec::new();
        for ingress in ingresses {
            if !ingress.host.is_empty() && !ingress_hosts.contains(&ingress.host) {
                ingress_hosts.push(ingress.host.clone());
            }
        }
        let published = |target: u16| {
            ingresses
                .iter()
                .find(|i| i.target_port == target)
                .map_or(target, |i| i.port)
        };

        let mut images = self.ctx.images.clone();
        for deployment in deployments {
            let (Some(kind), Some(component)) = (
                ComponentKind::from_deployment(&deployment.name),
                deployment.components.first(),
            ) else {
                continue;
            };
            let slot = match kind {
                ComponentKind::Router => &mut images.router,
                ComponentKind::Controller => &mut images.controller,
                ComponentKind::FlowCollector => &mut images.flow_collector,
                ComponentKind::Prometheus => &mut images.prometheus,
            };
            *slot = component.image.clone();
        }

        ContainerSiteSpec {
            runtime: self.ctx.endpoint.runtime_type,
            endpoint: Some(self.ctx.endpoint.socket_path.clone()),
            network: router
                .and_then(|d| d.networks.first().cloned())
                .unwrap_or_else(|| self.ctx.network.clone()),
            enable_ipv6: false,
            ingress_hosts,
            inter_router_port: published(INTER_ROUTER_TARGET_PORT),
            edge_port: published(EDGE_TARGET_PORT),
            images,
            router_resources: router_component.map(|c| c.resources).unwrap_or_default(),
            restart_policy: router.map(|d| d.restart_policy).unwrap_or_default(),
            flow_collector: deployments.iter().any(|d| d.name == FLOW_COLLECTOR_DEPLOYMENT),
            console: None,
        }
    }

    fn processor(&self) -> UpdateProcessor {
        let mut processor = UpdateProcessor::new();
        tasks::register_builtin(
            &mut processor,
            &TaskContext {
                runtime: Arc::clone(&self.runtime),
                site: self.ctx.site.clone(),
                images: self.ctx.images.clone(),
            },
        );
        processor
    }

    /// The update tasks that apply to the deployed site, in run order.
    pub async fn plan_update(&self) -> Result<UpdatePlan, SiteError> {
        let site = self.get().await?;
        let tasks = self
            .processor()
            .plan(&site.info.version)
            .iter()
            .map(|t| t.task().info())
            .collect();
        Ok(UpdatePlan {
            from_version: site.info.version,
            to_version: version::current().to_string(),
            tasks,
        })
    }

    /// Resources `delete` would remove. Nothing is touched.
    pub async fn teardown_plan(&self) -> Result<Vec<String>, SiteError> {
        let runtime = self.runtime.as_ref();
        let name = &self.ctx.site;
        let owned = labels::owned(name);
        let mut resources = Vec::new();

        let containers = runtime
            .list_containers(&ContainerFilters::labelled(owned.clone()))
            .await
            .map_err(runtime_error)?;
        resources.extend(containers.into_iter().map(|c| format!("container {}", c.name)));

        let network = match self.get().await {
            Ok(site) => site
                .container_spec()
                .map_or_else(|| self.ctx.network.clone(), |spec| spec.network.clone()),
            Err(_) => self.ctx.network.clone(),
        };
        match runtime.inspect_network(&network).await {
            Ok(details) if details.labels.get(labels::SITE) == Some(&name.to_string()) => {
                resources.push(format!("network {network}"));
            }
            Ok(_) | Err(NetworkError::NotFound(_)) => {}
            Err(e) => return Err(runtime_error(e)),
        }

        let volumes = runtime
            .list_volumes(&VolumeFilters { labels: owned })
            .await
            .map_err(runtime_error)?;
        resources.extend(volumes.into_iter().map(|v| format!("volume {}", v.name)));

        if resources.is_empty() {
            return Err(self.not_found("nothing to remove"));
        }
        Ok(resources)
    }

    /// Reissue the site CA and the site server credential, then restart the
    /// router so it serves the new credential.
    ///
    /// Anything issued against the previous site CA stops working.
    pub async fn revoke_access(&self) -> Result<Site, SiteError> {
        let _lock = self.lock()?;
        let site = self.get().await?;
        let credentials = VolumeCredentialHandler::new(self.runtime.as_ref(), &self.ctx.site);

        let ca = site
            .certificate_authorities
            .iter()
            .find(|ca| ca.name == SITE_CA)
            .ok_or_else(|| self.not_found(format!("certificate authority {SITE_CA} is missing")))?;
        let server = site
            .credentials
            .iter()
            .find(|c| c.name == SITE_SERVER_CREDENTIAL)
            .ok_or_else(|| self.not_found(format!("credential {SITE_SERVER_CREDENTIAL} is missing")))?;

        let ca = ca.reissued();
        credentials.create_ca(&ca).await.map_err(runtime_error)?;
        credentials
            .create_credential(&server.reissued())
            .await
            .map_err(runtime_error)?;
        self.deployer()
            .restart(ROUTER_DEPLOYMENT)
            .await
            .map_err(runtime_error)?;
        tracing::info!(site = %self.ctx.site, serial = ca.serial, "site access revoked");
        self.get().await
    }

    fn not_found(&self, reason: impl Into<String>) -> SiteError {
        SiteError::NotFound {
            site: self.ctx.site.to_string(),
            reason: reason.into(),
        }
    }
}

fn prometheus_config(collector: &str) -> String {
    format!(
        "global:\n  scrape_interval: 15s\n  evaluation_interval: 15s\n\
         scrape_configs:\n  - job_name: flow-collector\n    static_configs:\n      \
         - targets: ['{collector}:{FLOW_COLLECTOR_METRICS_PORT}']\n"
    )
}

#[async_trait]
impl<R: Gateway + ?Sized + 'static> SiteHandler for ContainerSiteHandler<R> {
    async fn create(&self, site: Site) -> Result<Provisioned, SiteError> {
        let site = prepare(site)?;
        if site.name() != &self.ctx.site {
            return Err(SiteError::invalid(format!(
                "site {} does not match handler for {}",
                site.name(),
                self.ctx.site
            )));
        }
        let PlatformSpec::ContainerRuntime(spec) = &site.platform else {
            return Err(SiteError::invalid("not a valid container site definition"));
        };
        let _lock = self.lock()?;
        let cancel = CancellationToken::new();

        preflight::can_create(self.runtime.as_ref(), &site, self.ctx.options.preflight, &cancel)
            .await?;
        tracing::info!(site = %site.name(), id = %site.info.id, "provisioning site");

        let mut diagnostics = Diagnostics::default();
        let mut undo = Compensations::new();
        if let Err(e) = self
            .provision(&site, spec, &mut undo, &mut diagnostics, &cancel)
            .await
        {
            tracing::error!(site = %site.name(), error = %e, steps = undo.len(), "provisioning failed, rolling back");
            let failed = undo.unwind().await;
            if failed > 0 {
                tracing::warn!(failed, "rollback left resources behind");
            }
            return Err(e);
        }
        undo.commit();
        tracing::info!(site = %site.name(), "site provisioned");
        Ok(Provisioned {
            warnings: diagnostics.into_warnings(),
            site,
        })
    }

    async fn get(&self) -> Result<Site, SiteError> {
        let runtime = self.runtime.as_ref();
        let name = &self.ctx.site;

        let config = match RouterConfigStore::new(runtime, name).get().await {
            Ok(config) => config,
            Err(RouterConfigError::NotFound(_)) => {
                return Err(self.not_found("router configuration is missing"));
            }
            Err(e) => return Err(runtime_error(e)),
        };
        let info = config.info().map_err(runtime_error)?;

        let credentials = VolumeCredentialHandler::new(runtime, name);
        let certificate_authorities = credentials.list_cas().await.map_err(runtime_error)?;
        if certificate_authorities.is_empty() {
            return Err(self.not_found("no certificate authorities"));
        }
        let site_credentials = credentials.list_credentials().await.map_err(runtime_error)?;
        if site_credentials.is_empty() {
            return Err(self.not_found("no credentials"));
        }

        let deployments = self.deployer().list().await.map_err(runtime_error)?;
        for required in [ROUTER_DEPLOYMENT, CONTROLLER_DEPLOYMENT] {
            if !deployments.iter().any(|d| d.name == required) {
                return Err(self.not_found(format!("{required} deployment is missing")));
            }
        }

        Ok(Site {
            info,
            platform: PlatformSpec::ContainerRuntime(self.spec_from(&deployments)),
            deployments,
            certificate_authorities,
            credentials: site_credentials,
        })
    }

    async fn delete(&self) -> Result<TeardownReport, SiteError> {
        let _lock = self.lock()?;
        let runtime = self.runtime.as_ref();
        let name = &self.ctx.site;
        let mut report = TeardownReport::default();

        let site = match self.get().await {
            Ok(site) => Some(site),
            Err(e) => {
                tracing::warn!(site = %name, error = %e, "site is incomplete, removing what is left");
                None
            }
        };

        if let Some(site) = &site {
            let deployer = self.deployer();
            for deployment in &site.deployments {
                let resource = format!("container {}", container_name(name, &deployment.name));
                match deployer.undeploy(&deployment.name).await {
                    Ok(()) => report.removed.push(resource),
                    Err(e) => report.failures.push(TeardownError::new(resource, e)),
                }
            }
        }

        match runtime
            .list_containers(&ContainerFilters::labelled(labels::owned(name)))
            .await
        {
            Ok(leftovers) => {
                for container in leftovers {
                    let resource = format!("container {}", container.name);
                    match runtime.remove_container(&container.id, true).await {
                        Ok(()) => report.removed.push(resource),
                        Err(e) if e.is_not_found() => {}
                        Err(e) => report.failures.push(TeardownError::new(resource, e)),
                    }
                }
            }
            Err(e) => report.failures.push(TeardownError::new("containers", e)),
        }

        let network = site
            .as_ref()
            .and_then(Site::container_spec)
            .map_or_else(|| self.ctx.network.clone(), |spec| spec.network.clone());
        let resource = format!("network {network}");
        match runtime.inspect_network(&network).await {
            Ok(details) if details.labels.get(labels::SITE) == Some(&name.to_string()) => {
                match runtime.remove_network(&network).await {
                    Ok(()) | Err(NetworkError::NotFound(_)) => report.removed.push(resource),
                    Err(e) => report.failures.push(TeardownError::new(resource, e)),
                }
            }
            Ok(_) => tracing::debug!(%network, "network not created by this site, keeping it"),
            Err(NetworkError::NotFound(_)) => {}
            Err(e) => report.failures.push(TeardownError::new(resource, e)),
        }

        let filters = VolumeFilters {
            labels: labels::owned(name),
        };
        match runtime.list_volumes(&filters).await {
            Ok(volumes) => {
                for volume in volumes {
                    let resource = format!("volume {}", volume.name);
                    match runtime.remove_volume(&volume.name, true).await {
                        Ok(()) | Err(VolumeError::NotFound(_)) => report.removed.push(resource),
                        Err(e) => report.failures.push(TeardownError::new(resource, e)),
                    }
                }
            }
            Err(e) => report.failures.push(TeardownError::new("volumes", e)),
        }

        if let Some(startup) = &self.ctx.options.startup {
            startup.remove(name).await;
        }

        if site.is_none() && report.removed.is_empty() && report.failures.is_empty() {
            return Err(self.not_found("nothing to remove"));
        }
        for failure in &report.failures {
            tracing::warn!(resource = %failure.resource, reason = %failure.reason, "teardown incomplete");
        }
        tracing::info!(site = %name, removed = report.removed.len(), "site deleted");
        Ok(report)
    }

    async fn update(&self) -> Result<UpdateSummary, SiteError> {
        let _lock = self.lock()?;
        let site = self.get().await?;
        let from_version = site.info.version.clone();

        let mut processor = self.processor();
        let cancel = CancellationToken::new();
        let deadline = tokio::spawn({
            let cancel = cancel.clone();
            let timeout = self.ctx.options.update_timeout;
            async move {
                tokio::time::sleep(timeout).await;
                cancel.cancel();
            }
        });
        let outcome = processor.process(&cancel, &from_version).await;
        deadline.abort();
        if let Err(source) = outcome {
            tracing::error!(
                site = %self.ctx.site,
                error = %source,
                applied = processor.changes().len(),
                "update aborted"
            );
            return Err(SiteError::Update {
                source,
                changes: processor.changes().to_vec(),
                warnings: processor.warnings().to_vec(),
            });
        }

        tracing::info!(
            site = %self.ctx.site,
            from = %from_version,
            to = version::current(),
            changes = processor.changes().len(),
            "site updated"
        );
        Ok(UpdateSummary {
            from_version,
            to_version: version::current().to_string(),
            changes: processor.changes().to_vec(),
            warnings: processor.warnings().to_vec(),
        })
    }
}
