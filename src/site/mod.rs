// ABOUTME: Site model and the lifecycle handler for container-runtime sites.
// ABOUTME: A site is a router plus controller (and optional collectors) on one private network.

pub mod compensation;
pub mod credentials;
pub mod deployment;
mod error;
pub mod labels;
pub mod layout;
pub mod lock;
pub mod preflight;
mod provisioner;
pub mod router_config;
pub mod startup;
pub mod volume_files;

pub use error::{
    PreflightError, ProvisionStep, SiteError, SiteErrorKind, StepError, TeardownError,
};
pub use layout::{all_volumes, prepare, required_volumes};
pub use provisioner::{ContainerSiteHandler, HandlerContext, ProvisionOptions};

use crate::runtime::{ResourceLimits, RestartPolicy, RuntimeType};
use crate::types::{ImageRef, NetworkAlias, SiteName};
use async_trait::async_trait;
use credentials::{CertificateAuthority, Credential};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

pub const ROUTER_CONFIG_VOLUME: &str = "router-config";
pub const SERVICES_VOLUME: &str = "services";
pub const CONSOLE_USERS_VOLUME: &str = "console-users";
pub const PROMETHEUS_CONFIG_VOLUME: &str = "prometheus-config";
pub const PROMETHEUS_STORAGE_VOLUME: &str = "prometheus-storage";
pub const NETWORK_STATUS_VOLUME: &str = "network-status";

pub const ROUTER_DEPLOYMENT: &str = "router";
pub const CONTROLLER_DEPLOYMENT: &str = "controller";
pub const FLOW_COLLECTOR_DEPLOYMENT: &str = "flow-collector";
pub const PROMETHEUS_DEPLOYMENT: &str = "prometheus";

/// Runtime volume name for a site-scoped volume.
pub fn volume_name(site: &SiteName, suffix: &str) -> String {
    format!("{site}-{suffix}")
}

/// Runtime container name for a deployment.
pub fn container_name(site: &SiteName, deployment: &str) -> String {
    format!("{site}-{deployment}")
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Interior,
    Edge,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Mode::Interior => "interior",
            Mode::Edge => "edge",
        })
    }
}

/// Identity shared by every platform variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteInfo {
    pub name: SiteName,
    /// Unique id; generated at create when empty.
    pub id: String,
    /// Version recorded in router metadata; empty before create.
    pub version: String,
    pub mode: Mode,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlatformSpec {
    ContainerRuntime(ContainerSiteSpec),
    /// Kubernetes-hosted site; modelled but handled elsewhere.
    Cluster(ClusterSiteSpec),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContainerSiteSpec {
    pub runtime: RuntimeType,
    pub endpoint: Option<String>,
    pub network: String,
    pub enable_ipv6: bool,
    /// Host addresses ingress ports bind to; empty binds all interfaces.
    pub ingress_hosts: Vec<String>,
    pub inter_router_port: u16,
    pub edge_port: u16,
    pub images: ImageSet,
    pub router_resources: ResourceLimits,
    pub restart_policy: RestartPolicy,
    pub flow_collector: bool,
    pub console: Option<ConsoleUser>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterSiteSpec {
    pub namespace: String,
    pub context: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSet {
    pub router: ImageRef,
    pub controller: ImageRef,
    pub flow_collector: ImageRef,
    pub prometheus: ImageRef,
}

impl ImageSet {
    pub fn for_kind(&self, kind: ComponentKind) -> &ImageRef {
        match kind {
            ComponentKind::Router => &self.router,
            ComponentKind::Controller => &self.controller,
            ComponentKind::FlowCollector => &self.flow_collector,
            ComponentKind::Prometheus => &self.prometheus,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleUser {
    pub user: String,
    pub password: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ComponentKind {
    Router,
    Controller,
    FlowCollector,
    Prometheus,
}

impl ComponentKind {
    pub fn from_deployment(name: &str) -> Option<Self> {
        match name {
            ROUTER_DEPLOYMENT => Some(ComponentKind::Router),
            CONTROLLER_DEPLOYMENT => Some(ComponentKind::Controller),
            FLOW_COLLECTOR_DEPLOYMENT => Some(ComponentKind::FlowCollector),
            PROMETHEUS_DEPLOYMENT => Some(ComponentKind::Prometheus),
            _ => None,
        }
    }
}

/// A published port of a component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteIngress {
    pub name: String,
    /// Host bind address; empty binds all interfaces.
    pub host: String,
    pub port: u16,
    pub target_port: u16,
}

/// One process of a deployment; maps to exactly one container.
#[derive(Debug, Clone, PartialEq)]
pub struct Component {
    pub kind: ComponentKind,
    pub name: String,
    pub image: ImageRef,
    pub env: BTreeMap<String, String>,
    pub labels: HashMap<String, String>,
    pub ingresses: Vec<SiteIngress>,
    pub command: Option<Vec<String>>,
    pub resources: ResourceLimits,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Deployment {
    pub name: String,
    pub components: Vec<Component>,
    pub aliases: Vec<NetworkAlias>,
    /// Volume name to mount path.
    pub volume_mounts: BTreeMap<String, String>,
    pub networks: Vec<String>,
    pub restart_policy: RestartPolicy,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Site {
    pub info: SiteInfo,
    pub platform: PlatformSpec,
    pub deployments: Vec<Deployment>,
    pub certificate_authorities: Vec<CertificateAuthority>,
    pub credentials: Vec<Credential>,
}

impl Site {
    pub fn name(&self) -> &SiteName {
        &self.info.name
    }

    pub fn container_spec(&self) -> Option<&ContainerSiteSpec> {
        match &self.platform {
            PlatformSpec::ContainerRuntime(spec) => Some(spec),
            PlatformSpec::Cluster(_) => None,
        }
    }

    pub fn deployment(&self, name: &str) -> Option<&Deployment> {
        self.deployments.iter().find(|d| d.name == name)
    }
}

/// What `create` produced, with anything that went wrong without failing it.
#[derive(Debug)]
pub struct Provisioned {
    pub site: Site,
    pub warnings: Vec<crate::diagnostics::Warning>,
}

/// Result of a best-effort teardown.
#[derive(Debug, Default)]
pub struct TeardownReport {
    pub removed: Vec<String>,
    pub failures: Vec<TeardownError>,
}

impl TeardownReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct UpdateSummary {
    pub from_version: String,
    pub to_version: String,
    pub changes: Vec<String>,
    pub warnings: Vec<crate::diagnostics::Warning>,
}

/// What `update` would run against the deployed site, without running it.
#[derive(Debug, Default)]
pub struct UpdatePlan {
    pub from_version: String,
    pub to_version: String,
    /// Task descriptions in run order.
    pub tasks: Vec<String>,
}

/// Lifecycle of one site on one platform.
#[async_trait]
pub trait SiteHandler: Send + Sync {
    async fn create(&self, site: Site) -> Result<Provisioned, SiteError>;

    async fn get(&self) -> Result<Site, SiteError>;

    async fn delete(&self) -> Result<TeardownReport, SiteError>;

    async fn update(&self) -> Result<UpdateSummary, SiteError>;
}
