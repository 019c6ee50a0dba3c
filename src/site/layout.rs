// ABOUTME: Fills site defaults and lays out deployments, volumes and credentials before create.
// ABOUTME: Everything here is pure; nothing talks to the runtime.

use std::collections::{BTreeMap, HashMap, HashSet};

use super::credentials::{CertificateAuthority, Credential};
use super::error::SiteError;
use super::{
    CONSOLE_USERS_VOLUME, CONTROLLER_DEPLOYMENT, Component, ComponentKind, ContainerSiteSpec,
    Deployment, FLOW_COLLECTOR_DEPLOYMENT, Mode, NETWORK_STATUS_VOLUME, PROMETHEUS_CONFIG_VOLUME,
    PROMETHEUS_DEPLOYMENT, PROMETHEUS_STORAGE_VOLUME, PlatformSpec, ROUTER_CONFIG_VOLUME,
    ROUTER_DEPLOYMENT, SERVICES_VOLUME, Site, SiteIngress, container_name, labels, volume_name,
};
use crate::runtime::ResourceLimits;
use crate::types::{NetworkAlias, SiteName};

pub const DEFAULT_NETWORK: &str = "siteforge";

pub const SITE_CA: &str = "site-ca";
pub const LOCAL_CA: &str = "local-ca";
pub const SITE_SERVER_CREDENTIAL: &str = "site-server";
pub const LOCAL_SERVER_CREDENTIAL: &str = "local-server";
pub const LOCAL_CLIENT_CREDENTIAL: &str = "local-client";

pub const CONFIG_PATH: &str = "/etc/siteforge/config";
pub const SERVICES_PATH: &str = "/etc/siteforge/services";
pub const CERTS_PATH: &str = "/etc/siteforge/certs";
pub const NETWORK_STATUS_PATH: &str = "/etc/siteforge/network-status";
pub const CONSOLE_USERS_PATH: &str = "/etc/siteforge/console-users";
pub const PROMETHEUS_CONFIG_PATH: &str = "/etc/prometheus";
pub const PROMETHEUS_STORAGE_PATH: &str = "/prometheus";

pub const INTER_ROUTER_TARGET_PORT: u16 = 55671;
pub const EDGE_TARGET_PORT: u16 = 45671;
pub const CONSOLE_PORT: u16 = 8010;

const MIN_ROUTER_MEMORY: u64 = 16 * 1024 * 1024;

/// Validate `site` and fill in everything create needs.
///
/// Deployments already present are kept; an empty list gets the standard
/// router, controller and, when enabled, flow collector plus prometheus.
pub fn prepare(mut site: Site) -> Result<Site, SiteError> {
    let spec = match &mut site.platform {
        PlatformSpec::ContainerRuntime(spec) => spec,
        PlatformSpec::Cluster(_) => {
            return Err(SiteError::invalid("not a valid container site definition"));
        }
    };
    if site.info.mode == Mode::Edge {
        return Err(SiteError::invalid("edge mode is not yet allowed"));
    }
    if spec.network.is_empty() {
        spec.network = DEFAULT_NETWORK.to_string();
    }
    validate_ports(spec)?;
    validate_limits(&spec.router_resources)?;

    if site.info.id.is_empty() {
        site.info.id = generate_site_id(&site.info.name);
    }
    site.info.version = crate::version::current().to_string();

    let spec = spec.clone();
    if site.certificate_authorities.is_empty() {
        site.certificate_authorities = certificate_authorities(&site.info.name);
    }
    if site.credentials.is_empty() {
        site.credentials = credentials(&site.info.name, &spec);
    }
    if site.deployments.is_empty() {
        site.deployments = deployments(&site.info.name, &spec)?;
    }
    for deployment in &site.deployments {
        if deployment.components.len() != 1 {
            return Err(SiteError::invalid(format!(
                "deployment {} has {} components; container sites allow exactly one",
                deployment.name,
                deployment.components.len()
            )));
        }
    }
    Ok(site)
}

fn validate_ports(spec: &ContainerSiteSpec) -> Result<(), SiteError> {
    if spec.inter_router_port == 0 || spec.edge_port == 0 {
        return Err(SiteError::invalid("ingress ports must be between 1 and 65535"));
    }
    if spec.inter_router_port == spec.edge_port {
        return Err(SiteError::invalid(format!(
            "inter-router and edge ingress both use port {}",
            spec.edge_port
        )));
    }
    if spec.flow_collector && [spec.inter_router_port, spec.edge_port].contains(&CONSOLE_PORT) {
        return Err(SiteError::invalid(format!(
            "port {CONSOLE_PORT} is reserved for the console"
        )));
    }
    Ok(())
}

fn validate_limits(limits: &ResourceLimits) -> Result<(), SiteError> {
    if let Some(memory) = limits.memory
        && memory < MIN_ROUTER_MEMORY
    {
        return Err(SiteError::invalid(format!(
            "router memory limit {memory} is below the {MIN_ROUTER_MEMORY} byte minimum"
        )));
    }
    if let Some(cpus) = limits.cpus
        && !(cpus.is_finite() && cpus > 0.0)
    {
        return Err(SiteError::invalid(format!(
            "router cpu limit must be positive, got {cpus}"
        )));
    }
    Ok(())
}

fn generate_site_id(site: &SiteName) -> String {
    let now = chrono::Utc::now();
    format!(
        "{}-{:x}-{:x}",
        site,
        now.timestamp_nanos_opt().unwrap_or_default(),
        std::process::id()
    )
}

fn certificate_authorities(site: &SiteName) -> Vec<CertificateAuthority> {
    vec![
        CertificateAuthority {
            name: SITE_CA.to_string(),
            subject: format!("{site} site CA"),
            serial: 0,
        },
        CertificateAuthority {
            name: LOCAL_CA.to_string(),
            subject: format!("{site} local CA"),
            serial: 0,
        },
    ]
}

fn credentials(site: &SiteName, spec: &ContainerSiteSpec) -> Vec<Credential> {
    let mut site_hosts: Vec<String> = spec
        .ingress_hosts
        .iter()
        .filter(|h| !h.is_empty())
        .cloned()
        .collect();
    site_hosts.push(site.to_string());
    vec![
        Credential {
            name: SITE_SERVER_CREDENTIAL.to_string(),
            ca: SITE_CA.to_string(),
            subject: site.to_string(),
            hosts: site_hosts,
            client: false,
            serial: 0,
        },
        Credential {
            name: LOCAL_SERVER_CREDENTIAL.to_string(),
            ca: LOCAL_CA.to_string(),
            subject: container_name(site, ROUTER_DEPLOYMENT),
            hosts: vec![container_name(site, ROUTER_DEPLOYMENT), site.to_string()],
            client: false,
            serial: 0,
        },
        Credential {
            name: LOCAL_CLIENT_CREDENTIAL.to_string(),
            ca: LOCAL_CA.to_string(),
            subject: container_name(site, CONTROLLER_DEPLOYMENT),
            hosts: Vec::new(),
            client: true,
            serial: 0,
        },
    ]
}

fn alias(name: &str) -> Result<NetworkAlias, SiteError> {
    NetworkAlias::new(name).map_err(|e| SiteError::invalid(format!("network alias {name}: {e}")))
}

fn ingress_hosts(spec: &ContainerSiteSpec) -> Vec<String> {
    if spec.ingress_hosts.is_empty() {
        vec![String::new()]
    } else {
        spec.ingress_hosts.clone()
    }
}

fn component(site: &SiteName, spec: &ContainerSiteSpec, kind: ComponentKind, name: &str) -> Component {
    Component {
        kind,
        name: name.to_string(),
        image: spec.images.for_kind(kind).clone(),
        env: BTreeMap::new(),
        labels: labels::component(site, name),
        ingresses: Vec::new(),
        command: None,
        resources: ResourceLimits::default(),
    }
}

fn deployment(
    site: &SiteName,
    spec: &ContainerSiteSpec,
    component: Component,
    volume_mounts: BTreeMap<String, String>,
) -> Result<Deployment, SiteError> {
    let name = component.name.clone();
    Ok(Deployment {
        aliases: vec![alias(&container_name(site, &name))?],
        name,
        components: vec![component],
        volume_mounts,
        networks: vec![spec.network.clone()],
        restart_policy: spec.restart_policy,
    })
}

fn deployments(site: &SiteName, spec: &ContainerSiteSpec) -> Result<Vec<Deployment>, SiteError> {
    let vol = |suffix: &str| volume_name(site, suffix);
    let cert = |credential: &str| format!("{CERTS_PATH}/{credential}");
    let mut out = Vec::new();

    let mut router = component(site, spec, ComponentKind::Router, ROUTER_DEPLOYMENT);
    router.env = BTreeMap::from([
        (
            "QDROUTERD_CONF".to_string(),
            format!("{CONFIG_PATH}/{}", super::router_config::ROUTER_CONFIG_FILE),
        ),
        ("QDROUTERD_CONF_TYPE".to_string(), "json".to_string()),
        ("SITEFORGE_SITE_NAME".to_string(), site.to_string()),
    ]);
    router.resources = spec.router_resources;
    for host in ingress_hosts(spec) {
        router.ingresses.push(SiteIngress {
            name: "inter-router".to_string(),
            host: host.clone(),
            port: spec.inter_router_port,
            target_port: INTER_ROUTER_TARGET_PORT,
        });
        router.ingresses.push(SiteIngress {
            name: "edge".to_string(),
            host,
            port: spec.edge_port,
            target_port: EDGE_TARGET_PORT,
        });
    }
    let mut router = deployment(
        site,
        spec,
        router,
        BTreeMap::from([
            (vol(ROUTER_CONFIG_VOLUME), CONFIG_PATH.to_string()),
            (vol(SITE_SERVER_CREDENTIAL), cert(SITE_SERVER_CREDENTIAL)),
            (vol(LOCAL_SERVER_CREDENTIAL), cert(LOCAL_SERVER_CREDENTIAL)),
            (vol(SITE_CA), cert(SITE_CA)),
            (vol(LOCAL_CA), cert(LOCAL_CA)),
        ]),
    )?;
    router.aliases.push(site.to_alias());
    out.push(router);

    let mut controller = component(site, spec, ComponentKind::Controller, CONTROLLER_DEPLOYMENT);
    controller.env = BTreeMap::from([
        ("SITEFORGE_SITE_NAME".to_string(), site.to_string()),
        ("SITEFORGE_PLATFORM".to_string(), spec.runtime.to_string()),
        (
            "SITEFORGE_ROUTER_URL".to_string(),
            format!("amqps://{}:5671", container_name(site, ROUTER_DEPLOYMENT)),
        ),
    ]);
    out.push(deployment(
        site,
        spec,
        controller,
        BTreeMap::from([
            (vol(ROUTER_CONFIG_VOLUME), CONFIG_PATH.to_string()),
            (vol(SERVICES_VOLUME), SERVICES_PATH.to_string()),
            (vol(NETWORK_STATUS_VOLUME), NETWORK_STATUS_PATH.to_string()),
            (vol(LOCAL_CLIENT_CREDENTIAL), cert(LOCAL_CLIENT_CREDENTIAL)),
        ]),
    )?);

    if spec.flow_collector {
        let mut collector =
            component(site, spec, ComponentKind::FlowCollector, FLOW_COLLECTOR_DEPLOYMENT);
        collector.env = BTreeMap::from([
            ("SITEFORGE_SITE_NAME".to_string(), site.to_string()),
            (
                "SITEFORGE_PROMETHEUS_URL".to_string(),
                format!("http://{}:9090", container_name(site, PROMETHEUS_DEPLOYMENT)),
            ),
        ]);
        for host in ingress_hosts(spec) {
            collector.ingresses.push(SiteIngress {
                name: "console".to_string(),
                host,
                port: CONSOLE_PORT,
                target_port: CONSOLE_PORT,
            });
        }
        let mut mounts = BTreeMap::from([(vol(LOCAL_CLIENT_CREDENTIAL), cert(LOCAL_CLIENT_CREDENTIAL))]);
        if spec.console.is_some() {
            mounts.insert(vol(CONSOLE_USERS_VOLUME), CONSOLE_USERS_PATH.to_string());
        }
        out.push(deployment(site, spec, collector, mounts)?);

        let mut prometheus = component(site, spec, ComponentKind::Prometheus, PROMETHEUS_DEPLOYMENT);
        prometheus.command = Some(vec![
            format!("--config.file={PROMETHEUS_CONFIG_PATH}/prometheus.yml"),
            format!("--storage.tsdb.path={PROMETHEUS_STORAGE_PATH}"),
        ]);
        out.push(deployment(
            site,
            spec,
            prometheus,
            BTreeMap::from([
                (vol(PROMETHEUS_CONFIG_VOLUME), PROMETHEUS_CONFIG_PATH.to_string()),
                (vol(PROMETHEUS_STORAGE_VOLUME), PROMETHEUS_STORAGE_PATH.to_string()),
            ]),
        )?);
    }
    Ok(out)
}

/// Volumes created by the volume step (router config and credential volumes have their own steps).
pub fn required_volumes(site: &Site) -> Vec<String> {
    let name = site.name();
    let mut suffixes = vec![SERVICES_VOLUME, NETWORK_STATUS_VOLUME];
    if site.deployment(FLOW_COLLECTOR_DEPLOYMENT).is_some() {
        if site
            .container_spec()
            .is_some_and(|spec| spec.console.is_some())
        {
            suffixes.push(CONSOLE_USERS_VOLUME);
        }
        suffixes.extend([PROMETHEUS_CONFIG_VOLUME, PROMETHEUS_STORAGE_VOLUME]);
    }
    suffixes.into_iter().map(|s| volume_name(name, s)).collect()
}

/// Every volume a create of `site` would make, for collision checks.
pub fn all_volumes(site: &Site) -> Vec<String> {
    let name = site.name();
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    let planned = std::iter::once(volume_name(name, ROUTER_CONFIG_VOLUME))
        .chain(site.certificate_authorities.iter().map(|ca| volume_name(name, &ca.name)))
        .chain(site.credentials.iter().map(|c| volume_name(name, &c.name)))
        .chain(required_volumes(site));
    for volume in planned {
        if seen.insert(volume.clone()) {
            out.push(volume);
        }
    }
    out
}

/// Labels of the single component of `deployment`, for building container specs.
pub fn component_labels(deployment: &Deployment) -> HashMap<String, String> {
    deployment
        .components
        .first()
        .map(|c| c.labels.clone())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{RestartPolicy, RuntimeType};
    use crate::site::{ClusterSiteSpec, ImageSet, SiteInfo};
    use crate::types::ImageRef;

    fn spec() -> ContainerSiteSpec {
        ContainerSiteSpec {
            runtime: RuntimeType::Podman,
            endpoint: None,
            network: String::new(),
            enable_ipv6: false,
            ingress_hosts: Vec::new(),
            inter_router_port: 55671,
            edge_port: 45671,
            images: ImageSet {
                router: ImageRef::parse("quay.io/skupper/skupper-router:3.0").unwrap(),
                controller: ImageRef::parse("quay.io/skupper/controller:2.0").unwrap(),
                flow_collector: ImageRef::parse("quay.io/skupper/network-observer:2.0").unwrap(),
                prometheus: ImageRef::parse("quay.io/prometheus/prometheus:v2.42.0").unwrap(),
            },
            router_resources: ResourceLimits::default(),
            restart_policy: RestartPolicy::Always,
            flow_collector: false,
            console: None,
        }
    }

    fn site(spec: ContainerSiteSpec) -> Site {
        Site {
            info: SiteInfo {
                name: SiteName::new("west").unwrap(),
                id: String::new(),
                version: String::new(),
                mode: Mode::Interior,
            },
            platform: PlatformSpec::ContainerRuntime(spec),
            deployments: Vec::new(),
            certificate_authorities: Vec::new(),
            credentials: Vec::new(),
        }
    }

    #[test]
    fn fills_defaults() {
        let prepared = prepare(site(spec())).unwrap();
        assert_eq!(prepared.container_spec().unwrap().network, DEFAULT_NETWORK);
        assert!(!prepared.info.id.is_empty());
        assert_eq!(prepared.info.version, crate::version::current());
        let names: Vec<_> = prepared.deployments.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, ["router", "controller"]);
        assert_eq!(prepared.certificate_authorities.len(), 2);
        assert_eq!(prepared.credentials.len(), 3);
    }

    #[test]
    fn flow_collector_adds_two_deployments() {
        let mut spec = spec();
        spec.flow_collector = true;
        let prepared = prepare(site(spec)).unwrap();
        assert!(prepared.deployment("flow-collector").is_some());
        assert!(prepared.deployment("prometheus").is_some());
        assert!(required_volumes(&prepared).contains(&"west-prometheus-storage".to_string()));
    }

    #[test]
    fn rejects_edge_mode() {
        let mut site = site(spec());
        site.info.mode = Mode::Edge;
        let err = prepare(site).unwrap_err();
        assert!(err.to_string().contains("edge mode is not yet allowed"));
    }

    #[test]
    fn rejects_cluster_platform() {
        let mut site = site(spec());
        site.platform = PlatformSpec::Cluster(ClusterSiteSpec {
            namespace: "default".into(),
            context: None,
        });
        let err = prepare(site).unwrap_err();
        assert!(err.to_string().contains("not a valid container site definition"));
    }

    #[test]
    fn rejects_clashing_ports() {
        let mut spec = spec();
        spec.edge_port = spec.inter_router_port;
        assert!(prepare(site(spec)).is_err());
    }

    #[test]
    fn rejects_tiny_memory_limit() {
        let mut spec = spec();
        spec.router_resources.memory = Some(1024);
        assert!(prepare(site(spec)).is_err());
    }

    #[test]
    fn rejects_multi_component_deployment() {
        let prepared = prepare(site(spec())).unwrap();
        let mut again = prepared.clone();
        let extra = again.deployments[1].components[0].clone();
        again.deployments[1].components.push(extra);
        let err = prepare(again).unwrap_err();
        assert!(err.to_string().contains("exactly one"));
    }

    #[test]
    fn router_publishes_one_ingress_pair_per_host() {
        let mut spec = spec();
        spec.ingress_hosts = vec!["127.0.0.1".into(), "10.0.0.5".into()];
        let prepared = prepare(site(spec)).unwrap();
        let router = prepared.deployment("router").unwrap();
        assert_eq!(router.components[0].ingresses.len(), 4);
        let server = prepared
            .credentials
            .iter()
            .find(|c| c.name == SITE_SERVER_CREDENTIAL)
            .unwrap();
        assert!(server.hosts.contains(&"10.0.0.5".to_string()));
    }

    #[test]
    fn all_volumes_covers_credentials_and_config() {
        let prepared = prepare(site(spec())).unwrap();
        let volumes = all_volumes(&prepared);
        for expected in ["west-router-config", "west-site-ca", "west-local-client", "west-services"] {
            assert!(volumes.contains(&expected.to_string()), "{expected}");
        }
    }
}
