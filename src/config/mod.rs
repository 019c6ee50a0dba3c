// ABOUTME: Site file parsing for siteforge.yml and conversion into a site definition.
// ABOUTME: Also owns the XDG paths and the persisted runtime endpoint pointer.

mod deserialize;
pub mod endpoint;
mod init;
mod paths;
mod restart_policy;

pub use deserialize::parse_memory;
pub use init::init_config;
pub use paths::Paths;

use crate::error::{Error, Result};
use crate::runtime::{ResourceLimits, RestartPolicy, RuntimeConfig, RuntimeType};
use crate::site::preflight::PreflightOptions;
use crate::site::{
    ConsoleUser, ContainerSiteSpec, ImageSet, Mode, PlatformSpec, Site, SiteInfo,
};
use crate::types::{ImageRef, SiteName};
use deserialize::{
    deserialize_hosts_option, deserialize_image_ref, deserialize_memory_option,
    deserialize_site_name,
};
use nonempty::NonEmpty;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILENAME: &str = "siteforge.yml";
pub const CONFIG_FILENAME_ALT: &str = "siteforge.yaml";
pub const CONFIG_FILENAME_DIR: &str = ".siteforge/config.yml";

pub const DEFAULT_ROUTER_IMAGE: &str = "quay.io/skupper/skupper-router:3.2";
pub const DEFAULT_CONTROLLER_IMAGE: &str = "quay.io/skupper/system-controller:2.0";
pub const DEFAULT_FLOW_COLLECTOR_IMAGE: &str = "quay.io/skupper/network-observer:2.0";
pub const DEFAULT_PROMETHEUS_IMAGE: &str = "quay.io/prometheus/prometheus:v2.42.0";

#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    #[serde(deserialize_with = "deserialize_site_name")]
    pub name: SiteName,

    #[serde(default)]
    pub mode: Mode,

    #[serde(default)]
    pub runtime: Option<RuntimeType>,

    /// Runtime socket; auto-detected when unset.
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default)]
    pub network: Option<String>,

    #[serde(default)]
    pub enable_ipv6: bool,

    #[serde(default)]
    pub ingress: IngressConfig,

    #[serde(default)]
    pub images: ImagesConfig,

    #[serde(default)]
    pub router: Option<RouterResources>,

    #[serde(default)]
    pub restart: RestartPolicy,

    #[serde(default)]
    pub flow_collector: bool,

    #[serde(default)]
    pub console: Option<ConsoleUser>,

    #[serde(default)]
    pub preflight: PreflightConfig,

    #[serde(default)]
    pub startup: StartupConfig,

    #[serde(default)]
    pub timeouts: TimeoutsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IngressConfig {
    #[serde(default, deserialize_with = "deserialize_hosts_option")]
    pub hosts: Option<NonEmpty<String>>,
    #[serde(default = "default_inter_router_port")]
    pub inter_router_port: u16,
    #[serde(default = "default_edge_port")]
    pub edge_port: u16,
}

impl Default for IngressConfig {
    fn default() -> Self {
        Self {
            hosts: None,
            inter_router_port: default_inter_router_port(),
            edge_port: default_edge_port(),
        }
    }
}

fn default_inter_router_port() -> u16 {
    55671
}

fn default_edge_port() -> u16 {
    45671
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImagesConfig {
    #[serde(default = "default_router_image", deserialize_with = "deserialize_image_ref")]
    pub router: ImageRef,
    #[serde(default = "default_controller_image", deserialize_with = "deserialize_image_ref")]
    pub controller: ImageRef,
    #[serde(
        default = "default_flow_collector_image",
        deserialize_with = "deserialize_image_ref"
    )]
    pub flow_collector: ImageRef,
    #[serde(default = "default_prometheus_image", deserialize_with = "deserialize_image_ref")]
    pub prometheus: ImageRef,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            router: default_router_image(),
            controller: default_controller_image(),
            flow_collector: default_flow_collector_image(),
            prometheus: default_prometheus_image(),
        }
    }
}

fn builtin_image(reference: &str) -> ImageRef {
    ImageRef::parse(reference).unwrap_or_else(|e| unreachable!("built-in image {reference}: {e}"))
}

fn default_router_image() -> ImageRef {
    builtin_image(DEFAULT_ROUTER_IMAGE)
}

fn default_controller_image() -> ImageRef {
    builtin_image(DEFAULT_CONTROLLER_IMAGE)
}

fn default_flow_collector_image() -> ImageRef {
    builtin_image(DEFAULT_FLOW_COLLECTOR_IMAGE)
}

fn default_prometheus_image() -> ImageRef {
    builtin_image(DEFAULT_PROMETHEUS_IMAGE)
}

impl From<ImagesConfig> for ImageSet {
    fn from(images: ImagesConfig) -> Self {
        ImageSet {
            router: images.router,
            controller: images.controller,
            flow_collector: images.flow_collector,
            prometheus: images.prometheus,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RouterResources {
    #[serde(default, deserialize_with = "deserialize_memory_option")]
    pub memory: Option<u64>,
    #[serde(default)]
    pub cpus: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PreflightConfig {
    #[serde(default = "default_true")]
    pub check_host_ports: bool,
    #[serde(default = "default_true")]
    pub verify_router_image: bool,
}

impl Default for PreflightConfig {
    fn default() -> Self {
        Self {
            check_host_ports: true,
            verify_router_image: true,
        }
    }
}

impl From<&PreflightConfig> for PreflightOptions {
    fn from(config: &PreflightConfig) -> Self {
        PreflightOptions {
            check_host_ports: config.check_host_ports,
            verify_router_image: config.verify_router_image,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StartupConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub systemd: bool,
}

impl Default for StartupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            systemd: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TimeoutsConfig {
    #[serde(default = "default_update_timeout", with = "humantime_serde")]
    pub update: Duration,
    #[serde(default = "default_stop_timeout", with = "humantime_serde")]
    pub stop: Duration,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            update: default_update_timeout(),
            stop: default_stop_timeout(),
        }
    }
}

fn default_update_timeout() -> Duration {
    Duration::from_secs(600)
}

fn default_stop_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_true() -> bool {
    true
}

impl SiteConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(Error::from)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Path of the first site file present in `dir`.
    pub fn find(dir: &Path) -> Result<PathBuf> {
        [
            dir.join(CONFIG_FILENAME),
            dir.join(CONFIG_FILENAME_ALT),
            dir.join(CONFIG_FILENAME_DIR),
        ]
        .into_iter()
        .find(|path| path.exists())
        .ok_or_else(|| Error::ConfigNotFound(dir.to_path_buf()))
    }

    pub fn discover(dir: &Path) -> Result<Self> {
        Self::load(&Self::find(dir)?)
    }

    pub fn runtime_config(&self) -> RuntimeConfig {
        RuntimeConfig {
            runtime: self.runtime,
            endpoint: self.endpoint.clone(),
        }
    }

    pub fn images(&self) -> ImageSet {
        self.images.clone().into()
    }

    /// The site definition this file describes, before defaults are filled.
    pub fn to_site(&self, runtime: RuntimeType) -> Site {
        Site {
            info: SiteInfo {
                name: self.name.clone(),
                id: String::new(),
                version: String::new(),
                mode: self.mode,
            },
            platform: PlatformSpec::ContainerRuntime(ContainerSiteSpec {
                runtime,
                endpoint: self.endpoint.clone(),
                network: self.network.clone().unwrap_or_default(),
                enable_ipv6: self.enable_ipv6,
                ingress_hosts: self
                    .ingress
                    .hosts
                    .as_ref()
                    .map(|hosts| hosts.iter().cloned().collect())
                    .unwrap_or_default(),
                inter_router_port: self.ingress.inter_router_port,
                edge_port: self.ingress.edge_port,
                images: self.images(),
                router_resources: self
                    .router
                    .as_ref()
                    .map(|r| ResourceLimits {
                        memory: r.memory,
                        cpus: r.cpus,
                    })
                    .unwrap_or_default(),
                restart_policy: self.restart,
                flow_collector: self.flow_collector,
                console: self.console.clone(),
            }),
            deployments: Vec::new(),
            certificate_authorities: Vec::new(),
            credentials: Vec::new(),
        }
    }

    pub fn template() -> Self {
        Self {
            name: SiteName::new("my-site").unwrap_or_else(|e| unreachable!("{e}")),
            mode: Mode::Interior,
            runtime: None,
            endpoint: None,
            network: None,
            enable_ipv6: false,
            ingress: IngressConfig::default(),
            images: ImagesConfig::default(),
            router: None,
            restart: RestartPolicy::default(),
            flow_collector: false,
            console: None,
            preflight: PreflightConfig::default(),
            startup: StartupConfig::default(),
            timeouts: TimeoutsConfig::default(),
        }
    }
}
