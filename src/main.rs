// ABOUTME: Entry point for the siteforge CLI application.
// ABOUTME: Loads the site file, connects to the runtime and dispatches to the site handler.

mod cli;
mod output;

use clap::Parser;
use cli::{Cli, Commands};
use output::{Output, OutputMode};
use serde::Serialize;
use siteforge::config::{self, Paths, SiteConfig, endpoint};
use siteforge::diagnostics::Warning;
use siteforge::error::{Error, Result};
use siteforge::runtime::{
    BollardRuntime, Gateway, MemoryRuntime, RuntimeEndpoint, RuntimeError, RuntimeInfo,
    RuntimeType, detect_local,
};
use siteforge::site::layout::{DEFAULT_NETWORK, SITE_CA, SITE_SERVER_CREDENTIAL};
use siteforge::site::startup::StartupRegistration;
use siteforge::site::{
    ContainerSiteHandler, HandlerContext, ProvisionOptions, ROUTER_DEPLOYMENT, Site, SiteError,
    SiteHandler, container_name,
};
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("siteforge=debug")
        } else {
            EnvFilter::new("warn")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let mode = if cli.json {
        OutputMode::Json
    } else if cli.quiet {
        OutputMode::Quiet
    } else {
        OutputMode::Normal
    };
    let output = Output::new(mode);

    if let Err(e) = run(cli, &output).await {
        output.error(&e.to_string());
        std::process::exit(1);
    }
}

async fn run(cli: Cli, output: &Output) -> Result<()> {
    let cwd = env::current_dir()?;
    if let Commands::Init {
        name,
        router_image,
        force,
    } = &cli.command
    {
        config::init_config(&cwd, name.as_deref(), router_image.as_deref(), *force)?;
        output.success::<()>(&format!("wrote {}", config::CONFIG_FILENAME), None);
        return Ok(());
    }

    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => SiteConfig::find(&cwd)?,
    };
    let mut config = SiteConfig::load(&config_path)?;
    if let Some(socket) = &cli.endpoint {
        config.endpoint = Some(socket.clone());
    }
    tracing::debug!(path = %config_path.display(), site = %config.name, "loaded site file");

    // Kept alive until the command finishes; the in-memory runtime stores volumes here.
    let scratch;
    let simulate = cli.dry_run && matches!(cli.command, Commands::Create);
    let (runtime, paths, endpoint): (Arc<dyn Gateway>, Paths, RuntimeEndpoint) = if simulate {
        scratch = tempfile::tempdir()?;
        output.progress("dry run: using an in-memory runtime");
        let runtime: Arc<dyn Gateway> = Arc::new(MemoryRuntime::new(scratch.path().join("volumes")));
        (
            runtime,
            Paths::under(scratch.path()),
            RuntimeEndpoint {
                runtime_type: config.runtime.unwrap_or(RuntimeType::Podman),
                socket_path: "memory".to_string(),
            },
        )
    } else {
        let paths = Paths::from_env()?;
        let endpoint = resolve_endpoint(&cli.command, &config, &paths)?;
        let runtime = BollardRuntime::connect(&endpoint).map_err(RuntimeError::from)?;
        runtime.ping().await.map_err(RuntimeError::from)?;
        output.progress(&format!(
            "using {} at {}",
            endpoint.runtime_type, endpoint.socket_path
        ));
        let runtime: Arc<dyn Gateway> = Arc::new(runtime);
        (runtime, paths, endpoint)
    };

    let mut ctx = handler_context(&config, endpoint, &paths, simulate);
    if let Commands::Update {
        timeout: Some(timeout),
    } = &cli.command
    {
        ctx.options.update_timeout = *timeout;
    }
    let handler = ContainerSiteHandler::new(runtime, ctx);

    match cli.command {
        Commands::Init { .. } => Ok(()),
        Commands::Create => {
            output.progress(&format!("creating site {}", config.name));
            let runtime_type = handler.context().endpoint.runtime_type;
            let provisioned = handler.create(config.to_site(runtime_type)).await?;
            for warning in &provisioned.warnings {
                output.warning(&warning.to_string());
            }
            let view = SiteView::from(&provisioned.site);
            output.details(&view.lines());
            output.success(&format!("site {} created", config.name), Some(&view));
            Ok(())
        }
        Commands::Status => {
            let site = handler.get().await?;
            let view = SiteView::from(&site);
            output.details(&view.lines());
            output.success(&format!("site {} is present", config.name), Some(&view));
            Ok(())
        }
        Commands::Delete if cli.dry_run => {
            let resources = handler.teardown_plan().await?;
            output.details(&resources.iter().map(|r| format!("would remove {r}")).collect::<Vec<_>>());
            output.success(
                &format!("dry run: {} resources of site {} would be removed", resources.len(), config.name),
                Some(&resources),
            );
            Ok(())
        }
        Commands::Delete => {
            output.progress(&format!("deleting site {}", config.name));
            let report = handler.delete().await?;
            for failure in &report.failures {
                output.warning(&format!("{} was not removed: {}", failure.resource, failure.reason));
            }
            output.details(&report.removed.iter().map(|r| format!("removed {r}")).collect::<Vec<_>>());
            output.success(
                &format!(
                    "site {} deleted ({} resources removed)",
                    config.name,
                    report.removed.len()
                ),
                Some(&report.removed),
            );
            Ok(())
        }
        Commands::Update { .. } if cli.dry_run => {
            let plan = handler.plan_update().await?;
            output.details(&plan.tasks.iter().map(|t| format!("would run: {t}")).collect::<Vec<_>>());
            let view = UpdateView {
                from_version: plan.from_version.clone(),
                to_version: plan.to_version.clone(),
                changes: plan.tasks.clone(),
            };
            output.success(
                &format!(
                    "dry run: {} update tasks would take site {} from {} to {}",
                    plan.tasks.len(),
                    config.name,
                    display_version(&plan.from_version),
                    plan.to_version
                ),
                Some(&view),
            );
            Ok(())
        }
        Commands::Update { .. } => {
            output.progress(&format!("updating site {}", config.name));
            let summary = match handler.update().await {
                Ok(summary) => summary,
                Err(e) => {
                    if let SiteError::Update {
                        changes, warnings, ..
                    } = &e
                    {
                        report_update(output, changes, warnings);
                        if !changes.is_empty() {
                            output.warning("the changes above were applied before the failure and were not rolled back");
                        }
                    }
                    return Err(e.into());
                }
            };
            report_update(output, &summary.changes, &summary.warnings);
            let view = UpdateView {
                from_version: summary.from_version.clone(),
                to_version: summary.to_version.clone(),
                changes: summary.changes.clone(),
            };
            let message = if summary.changes.is_empty() {
                format!("site {} is up to date", config.name)
            } else {
                format!(
                    "site {} updated from {} to {}",
                    config.name,
                    display_version(&summary.from_version),
                    summary.to_version
                )
            };
            output.success(&message, Some(&view));
            Ok(())
        }
        Commands::RevokeAccess if cli.dry_run => {
            let site = handler.get().await?;
            output.success::<()>(
                &format!(
                    "dry run: would reissue {SITE_CA} and {SITE_SERVER_CREDENTIAL} and restart {}",
                    container_name(site.name(), ROUTER_DEPLOYMENT)
                ),
                None,
            );
            Ok(())
        }
        Commands::RevokeAccess => {
            output.progress(&format!("revoking access to site {}", config.name));
            let site = handler.revoke_access().await?;
            let view = SiteView::from(&site);
            output.details(&view.lines());
            output.success(
                &format!("access to site {} revoked; links issued before now no longer work", config.name),
                Some(&view),
            );
            Ok(())
        }
    }
}

fn report_update(output: &Output, changes: &[String], warnings: &[Warning]) {
    for warning in warnings {
        output.warning(&warning.to_string());
    }
    for change in changes {
        output.progress(change);
    }
}

/// Create detects the local runtime; later commands reuse the endpoint recorded at create.
fn resolve_endpoint(command: &Commands, config: &SiteConfig, paths: &Paths) -> Result<RuntimeEndpoint> {
    let detect = || detect_local(Some(&config.runtime_config())).map_err(|e| Error::from(RuntimeError::from(e)));
    if matches!(command, Commands::Create) || config.endpoint.is_some() {
        return detect();
    }
    match endpoint::load(&paths.endpoint_file()) {
        Ok(endpoint) => Ok(endpoint),
        Err(Error::EndpointNotFound(path)) => {
            tracing::debug!(path = %path.display(), "no recorded endpoint, detecting");
            detect()
        }
        Err(e) => Err(e),
    }
}

fn handler_context(config: &SiteConfig, endpoint: RuntimeEndpoint, paths: &Paths, dry_run: bool) -> HandlerContext {
    let startup = config.startup.enabled.then(|| StartupRegistration {
        scripts_root: paths.data_dir.join("sites"),
        unit_dir: paths.systemd_user_dir.clone(),
        systemd: config.startup.systemd && !dry_run,
        systemctl: PathBuf::from("systemctl"),
    });
    HandlerContext {
        site: config.name.clone(),
        endpoint,
        endpoint_file: Some(paths.endpoint_file()),
        lock_dir: Some(paths.state_dir.join("locks")),
        network: config
            .network
            .clone()
            .unwrap_or_else(|| DEFAULT_NETWORK.to_string()),
        images: config.images(),
        options: ProvisionOptions {
            preflight: (&config.preflight).into(),
            startup,
            update_timeout: config.timeouts.update,
            stop_timeout: config.timeouts.stop,
        },
    }
}

fn display_version(version: &str) -> &str {
    if version.is_empty() { "an unknown version" } else { version }
}

#[derive(Serialize)]
struct SiteView {
    name: String,
    id: String,
    version: String,
    mode: String,
    network: Option<String>,
    containers: Vec<ContainerView>,
    certificate_authorities: Vec<String>,
    credentials: Vec<String>,
}

#[derive(Serialize)]
struct ContainerView {
    name: String,
    image: String,
}

#[derive(Serialize)]
struct UpdateView {
    from_version: String,
    to_version: String,
    changes: Vec<String>,
}

impl From<&Site> for SiteView {
    fn from(site: &Site) -> Self {
        Self {
            name: site.name().to_string(),
            id: site.info.id.clone(),
            version: site.info.version.clone(),
            mode: site.info.mode.to_string(),
            network: site.container_spec().map(|spec| spec.network.clone()),
            containers: site
                .deployments
                .iter()
                .map(|d| ContainerView {
                    name: container_name(site.name(), &d.name),
                    image: d
                        .components
                        .first()
                        .map(|c| c.image.to_string())
                        .unwrap_or_default(),
                })
                .collect(),
            certificate_authorities: site
                .certificate_authorities
                .iter()
                .map(|ca| ca.name.clone())
                .collect(),
            credentials: site.credentials.iter().map(|c| c.name.clone()).collect(),
        }
    }
}

impl SiteView {
    fn lines(&self) -> Vec<String> {
        let mut lines = vec![
            format!("Site:     {}", self.name),
            format!("Id:       {}", self.id),
            format!("Version:  {}", display_version(&self.version)),
            format!("Mode:     {}", self.mode),
        ];
        if let Some(network) = &self.network {
            lines.push(format!("Network:  {network}"));
        }
        lines.push("Containers:".to_string());
        for container in &self.containers {
            lines.push(format!("  {:<32} {}", container.name, container.image));
        }
        lines.push(format!("CAs:      {}", self.certificate_authorities.join(", ")));
        lines.push(format!("Credentials: {}", self.credentials.join(", ")));
        lines
    }
}
