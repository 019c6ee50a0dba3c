// ABOUTME: Config scaffolding for new sites.
// ABOUTME: Creates a commented siteforge.yml template.

use std::path::Path;

use crate::error::{Error, Result};
use crate::types::{ImageRef, SiteName};

use super::{CONFIG_FILENAME, SiteConfig};

pub fn init_config(dir: &Path, name: Option<&str>, router_image: Option<&str>, force: bool) -> Result<()> {
    let config_path = dir.join(CONFIG_FILENAME);

    if config_path.exists() && !force {
        return Err(Error::AlreadyExists(config_path));
    }

    let mut config = SiteConfig::template();

    if let Some(n) = name {
        config.name = SiteName::new(n).map_err(|e| Error::InvalidConfig(e.to_string()))?;
    }

    if let Some(i) = router_image {
        config.images.router =
            ImageRef::parse(i).map_err(|e| Error::InvalidConfig(e.to_string()))?;
    }

    std::fs::write(&config_path, generate_template_yaml(&config))?;
    Ok(())
}

fn generate_template_yaml(config: &SiteConfig) -> String {
    format!(
        r#"name: {name}
# mode: interior
# runtime: podman            # or docker; detected when unset
# endpoint: /run/user/1000/podman/podman.sock
# network: siteforge
ingress:
  # hosts: [127.0.0.1]
  inter_router_port: {inter_router}
  edge_port: {edge}
images:
  router: {router}
  controller: {controller}
# router:
#   memory: 512m
#   cpus: 1.5
# restart: always
# flow_collector: false
# preflight:
#   check_host_ports: true
#   verify_router_image: true
# startup:
#   systemd: true
# timeouts:
#   update: 10m
#   stop: 10s
"#,
        name = config.name,
        inter_router = config.ingress.inter_router_port,
        edge = config.ingress.edge_port,
        router = config.images.router,
        controller = config.images.controller,
    )
}
