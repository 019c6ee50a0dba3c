// ABOUTME: Integration tests for site file parsing and validation.
// ABOUTME: Tests YAML parsing, defaults, discovery and conversion into a prepared site.

use siteforge::config::*;
use siteforge::error::Error;
use siteforge::runtime::{RestartPolicy, RuntimeType};
use siteforge::site::{Mode, SiteErrorKind, prepare};
use std::time::Duration;

mod parsing {
    use super::*;

    #[test]
    fn parse_minimal_config() {
        let config = SiteConfig::from_yaml("name: west\n").unwrap();
        assert_eq!(config.name.as_str(), "west");
        assert_eq!(config.mode, Mode::Interior);
        assert_eq!(config.runtime, None);
        assert_eq!(config.ingress.inter_router_port, 55671);
        assert_eq!(config.ingress.edge_port, 45671);
        assert_eq!(config.images.router.to_string(), DEFAULT_ROUTER_IMAGE);
        assert!(config.preflight.check_host_ports);
        assert!(config.startup.enabled);
        assert_eq!(config.timeouts.update, Duration::from_secs(600));
    }

    #[test]
    fn parse_full_config() {
        let yaml = r#"
name: east-1
mode: interior
runtime: docker
endpoint: /var/run/docker.sock
network: sites
enable_ipv6: true
ingress:
  hosts: [10.0.0.5, 127.0.0.1]
  inter_router_port: 9001
  edge_port: 9002
images:
  router: registry.example.com/router:4.0
  controller: registry.example.com/controller:4.0
router:
  memory: 512m
  cpus: 1.5
restart: on-failure:3
flow_collector: true
console:
  user: admin
  password: changeme
preflight:
  check_host_ports: false
startup:
  systemd: false
timeouts:
  update: 5m
  stop: 30s
"#;
        let config = SiteConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.runtime, Some(RuntimeType::Docker));
        assert_eq!(config.endpoint.as_deref(), Some("/var/run/docker.sock"));
        assert_eq!(config.network.as_deref(), Some("sites"));
        let hosts = config.ingress.hosts.as_ref().unwrap();
        assert_eq!(hosts.len(), 2);
        assert_eq!(hosts.head, "10.0.0.5");
        assert_eq!(config.images.router.registry(), Some("registry.example.com"));
        let router = config.router.as_ref().unwrap();
        assert_eq!(router.memory, Some(512 * 1024 * 1024));
        assert_eq!(router.cpus, Some(1.5));
        assert_eq!(
            config.restart,
            RestartPolicy::OnFailure {
                max_retries: Some(3)
            }
        );
        assert!(config.flow_collector);
        assert_eq!(config.console.as_ref().unwrap().user, "admin");
        assert!(!config.preflight.check_host_ports);
        assert!(config.preflight.verify_router_image);
        assert!(!config.startup.systemd);
        assert_eq!(config.timeouts.update, Duration::from_secs(300));
        assert_eq!(config.timeouts.stop, Duration::from_secs(30));
    }

    #[test]
    fn missing_name_returns_error() {
        assert!(SiteConfig::from_yaml("network: sites\n").is_err());
    }

    #[test]
    fn invalid_name_returns_error() {
        let err = SiteConfig::from_yaml("name: West_Site\n").unwrap_err();
        assert!(err.to_string().contains("invalid character"), "{err}");
    }

    #[test]
    fn empty_host_list_returns_error() {
        let err = SiteConfig::from_yaml("name: west\ningress:\n  hosts: []\n").unwrap_err();
        assert!(err.to_string().contains("cannot be empty"), "{err}");
    }

    #[test]
    fn bad_memory_size_returns_error() {
        let err = SiteConfig::from_yaml("name: west\nrouter:\n  memory: lots\n").unwrap_err();
        assert!(err.to_string().contains("invalid memory size"), "{err}");
    }

    #[test]
    fn unknown_restart_policy_returns_error() {
        assert!(SiteConfig::from_yaml("name: west\nrestart: sometimes\n").is_err());
    }
}

mod discovery {
    use super::*;

    #[test]
    fn finds_alternate_file_names() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILENAME_ALT), "name: west\n").unwrap();
        assert_eq!(
            SiteConfig::find(dir.path()).unwrap(),
            dir.path().join(CONFIG_FILENAME_ALT)
        );
        assert_eq!(SiteConfig::discover(dir.path()).unwrap().name.as_str(), "west");
    }

    #[test]
    fn missing_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = SiteConfig::discover(dir.path()).unwrap_err();
        assert!(matches!(err, Error::ConfigNotFound(_)));
    }
}

mod conversion {
    use super::*;

    #[test]
    fn site_from_config_is_prepared_with_defaults() {
        let config = SiteConfig::from_yaml("name: west\n").unwrap();
        let site = prepare(config.to_site(RuntimeType::Podman)).unwrap();
        let spec = site.container_spec().unwrap();
        assert_eq!(spec.network, "siteforge");
        assert_eq!(site.info.version, siteforge::version::current());
        let names: Vec<_> = site.deployments.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["router", "controller"]);
    }

    #[test]
    fn flow_collector_adds_prometheus() {
        let config = SiteConfig::from_yaml("name: west\nflow_collector: true\n").unwrap();
        let site = prepare(config.to_site(RuntimeType::Podman)).unwrap();
        let names: Vec<_> = site.deployments.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["router", "controller", "flow-collector", "prometheus"]);
    }

    #[test]
    fn edge_mode_is_rejected() {
        let config = SiteConfig::from_yaml("name: west\nmode: edge\n").unwrap();
        let err = prepare(config.to_site(RuntimeType::Podman)).unwrap_err();
        assert_eq!(err.kind(), SiteErrorKind::InvalidSite);
    }

    #[test]
    fn clashing_ports_are_rejected() {
        let yaml = "name: west\ningress:\n  inter_router_port: 9000\n  edge_port: 9000\n";
        let config = SiteConfig::from_yaml(yaml).unwrap();
        let err = prepare(config.to_site(RuntimeType::Podman)).unwrap_err();
        assert!(err.to_string().contains("9000"), "{err}");
    }

    #[test]
    fn tiny_router_memory_is_rejected() {
        let config = SiteConfig::from_yaml("name: west\nrouter:\n  memory: 1m\n").unwrap();
        let err = prepare(config.to_site(RuntimeType::Podman)).unwrap_err();
        assert_eq!(err.kind(), SiteErrorKind::InvalidSite);
    }
}

mod scaffolding {
    use super::*;

    #[test]
    fn init_writes_a_loadable_template() {
        let dir = tempfile::tempdir().unwrap();
        init_config(dir.path(), Some("north"), Some("quay.io/skupper/skupper-router:9.9"), false)
            .unwrap();
        let config = SiteConfig::discover(dir.path()).unwrap();
        assert_eq!(config.name.as_str(), "north");
        assert_eq!(
            config.images.router.to_string(),
            "quay.io/skupper/skupper-router:9.9"
        );
    }

    #[test]
    fn init_rejects_invalid_name() {
        let dir = tempfile::tempdir().unwrap();
        let err = init_config(dir.path(), Some("Not Valid"), None, false).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
        assert!(!dir.path().join(CONFIG_FILENAME).exists());
    }

    #[test]
    fn memory_sizes_parse() {
        assert_eq!(parse_memory("1g"), Some(1024 * 1024 * 1024));
        assert_eq!(parse_memory("64K"), Some(64 * 1024));
        assert_eq!(parse_memory("100"), Some(100));
        assert_eq!(parse_memory("lots"), None);
    }
}
