// ABOUTME: Test support utilities.
// ABOUTME: Tracing setup plus site and handler fixtures over the in-memory runtime.

use siteforge::config::SiteConfig;
use siteforge::runtime::{MemoryRuntime, RuntimeEndpoint, RuntimeType};
use siteforge::site::preflight::PreflightOptions;
use siteforge::site::startup::StartupRegistration;
use siteforge::site::{ContainerSiteHandler, HandlerContext, ProvisionOptions, Site};
use siteforge::types::SiteName;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Once};
use std::time::Duration;

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for tests. Safe to call multiple times.
#[allow(dead_code)]
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        let filter = EnvFilter::from_default_env()
            .add_directive("siteforge=debug".parse().unwrap());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// Parse a site file body.
#[allow(dead_code)]
pub fn site_config(yaml: &str) -> SiteConfig {
    SiteConfig::from_yaml(yaml).unwrap()
}

/// Minimal interior site named `name`.
#[allow(dead_code)]
pub fn site(name: &str) -> Site {
    site_config(&format!("name: {name}\n")).to_site(RuntimeType::Podman)
}

/// Site with the flow collector, prometheus and a console user.
#[allow(dead_code)]
pub fn observed_site(name: &str) -> Site {
    site_config(&format!(
        "name: {name}\nflow_collector: true\nconsole:\n  user: admin\n  password: s3cret\n"
    ))
    .to_site(RuntimeType::Podman)
}

/// A fresh in-memory runtime whose volumes live under `dir`.
#[allow(dead_code)]
pub fn memory_runtime(dir: &Path) -> Arc<MemoryRuntime> {
    Arc::new(MemoryRuntime::new(dir.join("volumes")))
}

#[allow(dead_code)]
pub fn scripts_root(dir: &Path) -> PathBuf {
    dir.join("sites")
}

/// Handler context with every host-side artifact under `dir`.
///
/// Host port probing and the router image check are off so tests do not
/// depend on the machine they run on.
#[allow(dead_code)]
pub fn context(name: &str, dir: &Path) -> HandlerContext {
    let config = site_config(&format!("name: {name}\n"));
    let mut ctx = HandlerContext::new(
        SiteName::new(name).unwrap(),
        RuntimeEndpoint {
            runtime_type: RuntimeType::Podman,
            socket_path: "memory".to_string(),
        },
        config.images(),
    );
    ctx.endpoint_file = Some(dir.join("config").join("runtime.yml"));
    ctx.lock_dir = Some(dir.join("locks"));
    ctx.options = ProvisionOptions {
        preflight: PreflightOptions {
            check_host_ports: false,
            verify_router_image: false,
        },
        startup: Some(StartupRegistration {
            scripts_root: scripts_root(dir),
            unit_dir: dir.join("systemd"),
            systemd: false,
            systemctl: PathBuf::from("systemctl"),
        }),
        update_timeout: Duration::from_secs(30),
        stop_timeout: Duration::from_secs(1),
    };
    ctx
}

#[allow(dead_code)]
pub fn handler(
    runtime: &Arc<MemoryRuntime>,
    name: &str,
    dir: &Path,
) -> ContainerSiteHandler<MemoryRuntime> {
    ContainerSiteHandler::new(Arc::clone(runtime), context(name, dir))
}
