// ABOUTME: Integration tests for site create, status, delete and update over the in-memory runtime.
// ABOUTME: Rollback is checked by comparing runtime state before and after an injected failure.

mod support;

use siteforge::diagnostics::WarningKind;
use siteforge::replace::replace_image;
use siteforge::runtime::{ContainerState, Fault, MemoryRuntime, Mutation, Op, VolumeOps};
use siteforge::site::lock::SiteLock;
use siteforge::site::router_config::RouterConfigStore;
use siteforge::site::volume_files::read_file;
use siteforge::site::credentials::{CredentialHandler, VolumeCredentialHandler};
use siteforge::site::{
    ContainerSiteHandler, ProvisionStep, SiteError, SiteErrorKind, SiteHandler, volume_name,
};
use siteforge::types::{ImageRef, SiteName};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn assert_runtime_empty(runtime: &MemoryRuntime) {
    assert!(runtime.container_names().is_empty(), "containers left: {:?}", runtime.container_names());
    assert!(runtime.volume_names().is_empty(), "volumes left: {:?}", runtime.volume_names());
    assert!(runtime.network_names().is_empty(), "networks left: {:?}", runtime.network_names());
}

/// Every removal takes out the newest resource still standing, and nothing
/// created during the attempt survives it.
fn assert_unwound_in_reverse(runtime: &MemoryRuntime) {
    let journal = runtime.journal();
    let mut standing: Vec<String> = Vec::new();
    for Mutation { op, target } in &journal {
        match op {
            Op::CreateNetwork | Op::CreateVolume | Op::CreateContainer => {
                standing.push(target.clone());
            }
            Op::RemoveNetwork | Op::RemoveVolume | Op::RemoveContainer => {
                assert_eq!(
                    standing.pop().as_deref(),
                    Some(target.as_str()),
                    "{target} removed out of order in {journal:?}"
                );
            }
            _ => {}
        }
    }
    assert!(standing.is_empty(), "never removed: {standing:?}");
}

/// Rewrite the recorded version, as if `name` had been created by an older release.
async fn age_site(runtime: &MemoryRuntime, name: &str, version: &str) {
    let site = SiteName::new(name).unwrap();
    let store = RouterConfigStore::new(runtime, &site);
    let mut config = store.get().await.unwrap();
    config.metadata.version = version.to_string();
    store.save(&config).await.unwrap();
}

#[tokio::test]
async fn create_provisions_a_running_site() {
    support::init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let runtime = support::memory_runtime(dir.path());
    let handler = support::handler(&runtime, "west", dir.path());

    let provisioned = handler.create(support::site("west")).await.unwrap();
    assert!(provisioned.warnings.is_empty());
    assert_eq!(provisioned.site.info.version, siteforge::version::current());
    assert!(!provisioned.site.info.id.is_empty());

    for name in ["west-router", "west-controller"] {
        let (_, state) = runtime.container(name).unwrap();
        assert_eq!(state, ContainerState::Running, "{name}");
    }
    assert_eq!(runtime.network_names(), vec!["siteforge".to_string()]);
    for volume in [
        "west-router-config",
        "west-services",
        "west-network-status",
        "west-site-ca",
        "west-local-client",
    ] {
        assert!(runtime.volume_names().contains(&volume.to_string()), "{volume}");
    }

    let scripts = support::scripts_root(dir.path()).join("west").join("scripts");
    assert!(scripts.join("start.sh").exists());
    assert!(dir.path().join("config").join("runtime.yml").exists());
}

#[tokio::test]
async fn get_reads_the_site_back() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = support::memory_runtime(dir.path());
    let handler = support::handler(&runtime, "west", dir.path());
    let created = handler.create(support::site("west")).await.unwrap().site;

    let found = handler.get().await.unwrap();
    assert_eq!(found.info, created.info);

    let mut names: Vec<_> = found.deployments.iter().map(|d| d.name.as_str()).collect();
    names.sort_unstable();
    assert_eq!(names, vec!["controller", "router"]);
    assert_eq!(found.certificate_authorities.len(), 2);
    assert_eq!(found.credentials.len(), 3);

    let spec = found.container_spec().unwrap();
    assert_eq!(spec.network, "siteforge");
    assert_eq!(spec.inter_router_port, 55671);
    assert_eq!(spec.edge_port, 45671);
    assert!(!spec.flow_collector);
}

#[tokio::test]
async fn get_reports_missing_site() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = support::memory_runtime(dir.path());
    let handler = support::handler(&runtime, "west", dir.path());

    let err = handler.get().await.unwrap_err();
    assert_eq!(err.kind(), SiteErrorKind::NotFound);
}

#[tokio::test]
async fn second_create_fails_without_mutating_anything() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = support::memory_runtime(dir.path());
    let handler = support::handler(&runtime, "west", dir.path());
    handler.create(support::site("west")).await.unwrap();
    runtime.clear_journal();

    let err = handler.create(support::site("west")).await.unwrap_err();
    assert_eq!(err.kind(), SiteErrorKind::Preflight);
    assert!(runtime.journal().is_empty(), "{:?}", runtime.journal());
}

#[tokio::test]
async fn failed_create_rolls_back_every_step() {
    support::init_tracing();
    let cases = [
        (
            Fault::on(Op::CreateNetwork).matching("siteforge"),
            ProvisionStep::Network,
        ),
        (
            Fault::on(Op::CreateVolume).matching("west-local-ca"),
            ProvisionStep::CertificateAuthorities,
        ),
        (
            Fault::on(Op::CreateVolume).matching("west-local-client"),
            ProvisionStep::Credentials,
        ),
        (
            Fault::on(Op::CreateVolume).matching("west-router-config"),
            ProvisionStep::RouterConfig,
        ),
        (
            Fault::on(Op::CreateVolume).matching("west-network-status"),
            ProvisionStep::Volumes,
        ),
        (
            Fault::on(Op::CreateContainer).matching("west-router"),
            ProvisionStep::Deploy {
                deployment: "router".to_string(),
            },
        ),
        (
            Fault::on(Op::StartContainer).matching("west-controller"),
            ProvisionStep::Deploy {
                deployment: "controller".to_string(),
            },
        ),
    ];

    for (fault, step) in cases {
        let dir = tempfile::tempdir().unwrap();
        let runtime = support::memory_runtime(dir.path());
        let handler = support::handler(&runtime, "west", dir.path());
        runtime.inject(fault);

        let err = handler.create(support::site("west")).await.unwrap_err();
        assert_eq!(err.kind(), SiteErrorKind::Provisioning);
        assert_eq!(err.step(), Some(&step), "{err}");
        assert_eq!(runtime.pending_faults(), 0);
        assert_runtime_empty(&runtime);
        assert_unwound_in_reverse(&runtime);
        assert!(
            !support::scripts_root(dir.path()).join("west").exists(),
            "startup scripts left after failing at {step}"
        );
    }
}

#[tokio::test]
async fn failed_auxiliary_config_rolls_back() {
    support::init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let runtime = support::memory_runtime(dir.path());
    let handler = support::handler(&runtime, "west", dir.path());
    // A directory where the prometheus config file belongs makes the write fail.
    std::fs::create_dir_all(
        dir.path()
            .join("volumes")
            .join("west-prometheus-config")
            .join("prometheus.yml"),
    )
    .unwrap();

    let err = handler
        .create(support::observed_site("west"))
        .await
        .unwrap_err();
    assert_eq!(err.step(), Some(&ProvisionStep::AuxiliaryConfig), "{err}");
    assert_runtime_empty(&runtime);
    assert_unwound_in_reverse(&runtime);
    assert!(!support::scripts_root(dir.path()).join("west").exists());
}

#[tokio::test]
async fn failed_startup_registration_rolls_back() {
    support::init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let runtime = support::memory_runtime(dir.path());
    let handler = support::handler(&runtime, "west", dir.path());
    std::fs::write(support::scripts_root(dir.path()), "not a directory").unwrap();

    let err = handler.create(support::site("west")).await.unwrap_err();
    assert_eq!(err.step(), Some(&ProvisionStep::Startup), "{err}");
    assert_runtime_empty(&runtime);
    assert_unwound_in_reverse(&runtime);
    assert!(support::scripts_root(dir.path()).is_file());
}

#[tokio::test]
async fn rollback_keeps_a_network_it_did_not_create() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = support::memory_runtime(dir.path());
    runtime.seed_network("siteforge", true);
    runtime.inject(Fault::on(Op::StartContainer).matching("west-router"));
    let handler = support::handler(&runtime, "west", dir.path());

    handler.create(support::site("west")).await.unwrap_err();
    assert_eq!(runtime.network_names(), vec!["siteforge".to_string()]);
    assert!(runtime.container_names().is_empty());
    assert!(runtime.volume_names().is_empty());
}

#[tokio::test]
async fn create_rejects_a_site_for_another_handler() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = support::memory_runtime(dir.path());
    let handler = support::handler(&runtime, "west", dir.path());

    let err = handler.create(support::site("east")).await.unwrap_err();
    assert_eq!(err.kind(), SiteErrorKind::InvalidSite);
    assert!(runtime.journal().is_empty());
}

#[tokio::test]
async fn create_refuses_a_locked_site() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = support::memory_runtime(dir.path());
    let handler = support::handler(&runtime, "west", dir.path());
    let site = SiteName::new("west").unwrap();
    let _held = SiteLock::acquire(&dir.path().join("locks"), &site, false).unwrap();

    let err = handler.create(support::site("west")).await.unwrap_err();
    assert_eq!(err.kind(), SiteErrorKind::Locked);
    assert!(runtime.journal().is_empty());
}

#[tokio::test]
async fn observed_site_gets_collector_configuration() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = support::memory_runtime(dir.path());
    let handler = support::handler(&runtime, "west", dir.path());
    handler.create(support::observed_site("west")).await.unwrap();

    assert!(runtime.container("west-flow-collector").is_some());
    assert!(runtime.container("west-prometheus").is_some());

    let password = read_file(runtime.as_ref(), "west-console-users", "user")
        .await
        .unwrap();
    assert_eq!(password, b"s3cret");
    let prometheus = read_file(runtime.as_ref(), "west-prometheus-config", "prometheus.yml")
        .await
        .unwrap();
    assert!(String::from_utf8(prometheus)
        .unwrap()
        .contains("west-flow-collector:8010"));

    let found = handler.get().await.unwrap();
    assert!(found.container_spec().unwrap().flow_collector);
}

#[tokio::test]
async fn delete_removes_every_resource() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = support::memory_runtime(dir.path());
    let handler = support::handler(&runtime, "west", dir.path());
    handler.create(support::observed_site("west")).await.unwrap();

    let report = handler.delete().await.unwrap();
    assert!(report.is_clean(), "{:?}", report.failures);
    assert!(report.removed.contains(&"network siteforge".to_string()));
    assert_runtime_empty(&runtime);
    assert!(!support::scripts_root(dir.path()).join("west").exists());

    let err = handler.get().await.unwrap_err();
    assert_eq!(err.kind(), SiteErrorKind::NotFound);
}

#[tokio::test]
async fn delete_cleans_up_a_partial_site() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = support::memory_runtime(dir.path());
    let handler = support::handler(&runtime, "west", dir.path());
    handler.create(support::site("west")).await.unwrap();
    runtime
        .remove_volume(&volume_name(&SiteName::new("west").unwrap(), "router-config"), true)
        .await
        .unwrap();

    let report = handler.delete().await.unwrap();
    assert!(report.is_clean(), "{:?}", report.failures);
    assert!(report.removed.contains(&"container west-router".to_string()));
    assert_runtime_empty(&runtime);
}

#[tokio::test]
async fn delete_reports_failures_and_keeps_going() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = support::memory_runtime(dir.path());
    let handler = support::handler(&runtime, "west", dir.path());
    handler.create(support::site("west")).await.unwrap();
    runtime.inject(Fault::on(Op::RemoveVolume).matching("west-services"));

    let report = handler.delete().await.unwrap();
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].resource, "volume west-services");
    assert!(runtime.container_names().is_empty());
    assert_eq!(runtime.volume_names(), vec!["west-services".to_string()]);
}

#[tokio::test]
async fn delete_of_an_unknown_site_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = support::memory_runtime(dir.path());
    let handler = support::handler(&runtime, "west", dir.path());

    let err = handler.delete().await.unwrap_err();
    assert_eq!(err.kind(), SiteErrorKind::NotFound);
}

#[tokio::test]
async fn delete_leaves_a_shared_network_alone() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = support::memory_runtime(dir.path());
    runtime.seed_network("siteforge", true);
    let handler = support::handler(&runtime, "west", dir.path());
    handler.create(support::site("west")).await.unwrap();

    handler.delete().await.unwrap();
    assert_eq!(runtime.network_names(), vec!["siteforge".to_string()]);
}

#[tokio::test]
async fn update_migrates_an_old_site() {
    support::init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let runtime = support::memory_runtime(dir.path());
    let site = SiteName::new("west").unwrap();
    support::handler(&runtime, "west", dir.path())
        .create(support::site("west"))
        .await
        .unwrap();

    // Pretend the site was created by 0.1.0, before the network-status volume existed.
    let store = RouterConfigStore::new(runtime.as_ref(), &site);
    let mut config = store.get().await.unwrap();
    config.metadata.version = "0.1.0".to_string();
    store.save(&config).await.unwrap();
    runtime
        .remove_volume(&volume_name(&site, "network-status"), true)
        .await
        .unwrap();

    let mut ctx = support::context("west", dir.path());
    ctx.images.router = ImageRef::parse("quay.io/skupper/skupper-router:3.3").unwrap();
    let handler = ContainerSiteHandler::new(Arc::clone(&runtime), ctx);

    let summary = handler.update().await.unwrap();
    assert_eq!(summary.from_version, "0.1.0");
    assert_eq!(summary.to_version, siteforge::version::current());
    assert!(
        summary
            .changes
            .iter()
            .any(|c| c.contains("west-network-status")),
        "{:?}",
        summary.changes
    );
    assert!(
        summary
            .changes
            .iter()
            .any(|c| c.contains("west-router") && c.contains("3.3")),
        "{:?}",
        summary.changes
    );

    let (spec, state) = runtime.container("west-router").unwrap();
    assert_eq!(state, ContainerState::Running);
    assert_eq!(spec.image, "quay.io/skupper/skupper-router:3.3");
    let (controller, _) = runtime.container("west-controller").unwrap();
    assert!(
        controller
            .mounts
            .iter()
            .any(|m| m.source == "west-network-status")
    );

    let found = handler.get().await.unwrap();
    assert_eq!(found.info.version, siteforge::version::current());
}

#[tokio::test]
async fn update_of_a_current_site_changes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = support::memory_runtime(dir.path());
    let handler = support::handler(&runtime, "west", dir.path());
    handler.create(support::site("west")).await.unwrap();
    runtime.clear_journal();

    let summary = handler.update().await.unwrap();
    assert!(summary.changes.is_empty());
    assert!(runtime.journal().is_empty());
}

#[tokio::test]
async fn leftover_backup_is_not_a_deployment() {
    support::init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let runtime = support::memory_runtime(dir.path());
    let handler = support::handler(&runtime, "west", dir.path());
    handler.create(support::site("west")).await.unwrap();

    // The parked original is west-router-<timestamp> and keeps every site label.
    runtime.inject(Fault::on(Op::RemoveContainer).matching("west-router-2"));
    let image = ImageRef::parse("quay.io/skupper/skupper-router:3.3").unwrap();
    let replaced = replace_image(runtime.as_ref(), "west-router", &image, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(replaced.warnings[0].kind, WarningKind::BackupRemoval);
    assert_eq!(runtime.container_names().len(), 3);

    let site = handler.get().await.unwrap();
    let names: Vec<_> = site.deployments.iter().map(|d| d.name.as_str()).collect();
    assert_eq!(names, ["controller", "router"]);
    let router = site.deployment("router").unwrap();
    assert_eq!(router.components[0].image, image);

    // The live router already runs the configured image; the stale backup
    // does not, and must be left alone by the image migration.
    age_site(&runtime, "west", "0.1.0").await;
    let mut ctx = support::context("west", dir.path());
    ctx.images.router = image;
    runtime.clear_journal();
    let summary = ContainerSiteHandler::new(Arc::clone(&runtime), ctx)
        .update()
        .await
        .unwrap();
    assert!(
        !summary.changes.iter().any(|c| c.contains("image")),
        "{:?}",
        summary.changes
    );
    assert!(
        !runtime
            .journal()
            .iter()
            .any(|m| matches!(m.op, Op::CreateContainer | Op::RenameContainer)),
        "{:?}",
        runtime.journal()
    );
}

#[tokio::test]
async fn failed_update_reports_changes_already_applied() {
    support::init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let runtime = support::memory_runtime(dir.path());
    support::handler(&runtime, "west", dir.path())
        .create(support::site("west"))
        .await
        .unwrap();
    age_site(&runtime, "west", "0.1.0").await;

    let mut ctx = support::context("west", dir.path());
    ctx.images.router = ImageRef::parse("quay.io/skupper/skupper-router:3.3").unwrap();
    ctx.images.controller = ImageRef::parse("quay.io/skupper/controller:9.9").unwrap();
    let handler = ContainerSiteHandler::new(Arc::clone(&runtime), ctx);
    // The router is swapped first; the controller candidate cannot be created.
    runtime.inject(Fault::on(Op::CreateContainer).matching("west-controller-new"));

    let err = handler.update().await.unwrap_err();
    assert_eq!(err.kind(), SiteErrorKind::Update);
    let changes = match err {
        SiteError::Update { changes, .. } => changes,
        other => panic!("unexpected error: {other}"),
    };
    assert_eq!(
        changes,
        ["updated west-router image to quay.io/skupper/skupper-router:3.3"]
    );
    let (router, _) = runtime.container("west-router").unwrap();
    assert_eq!(router.image, "quay.io/skupper/skupper-router:3.3");
    let (controller, state) = runtime.container("west-controller").unwrap();
    assert_eq!(state, ContainerState::Running);
    assert_ne!(controller.image, "quay.io/skupper/controller:9.9");

    // The site version is only bumped once every task succeeded.
    let site = handler.get().await.unwrap();
    assert_eq!(site.info.version, "0.1.0");
}

#[tokio::test]
async fn update_plan_lists_tasks_without_running_them() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = support::memory_runtime(dir.path());
    let handler = support::handler(&runtime, "west", dir.path());
    handler.create(support::site("west")).await.unwrap();
    age_site(&runtime, "west", "0.1.0").await;
    runtime.clear_journal();

    let plan = handler.plan_update().await.unwrap();
    assert_eq!(plan.from_version, "0.1.0");
    assert_eq!(plan.to_version, siteforge::version::current());
    assert_eq!(
        plan.tasks,
        [
            "create network status volume",
            "update container images",
            "update site version"
        ]
    );
    assert!(runtime.journal().is_empty(), "{:?}", runtime.journal());

    age_site(&runtime, "west", siteforge::version::current()).await;
    assert!(handler.plan_update().await.unwrap().tasks.is_empty());
}

#[tokio::test]
async fn teardown_plan_touches_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = support::memory_runtime(dir.path());
    let handler = support::handler(&runtime, "west", dir.path());
    handler.create(support::site("west")).await.unwrap();
    runtime.clear_journal();

    let resources = handler.teardown_plan().await.unwrap();
    assert!(resources.contains(&"container west-router".to_string()), "{resources:?}");
    assert!(resources.contains(&"network siteforge".to_string()), "{resources:?}");
    assert!(resources.contains(&"volume west-site-ca".to_string()), "{resources:?}");
    assert!(runtime.journal().is_empty());

    let report = handler.delete().await.unwrap();
    assert_eq!(report.removed.len(), resources.len(), "{:?}", report.removed);
}

#[tokio::test]
async fn revoke_access_reissues_site_credentials_and_restarts_router() {
    support::init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let runtime = support::memory_runtime(dir.path());
    let handler = support::handler(&runtime, "west", dir.path());
    let created = handler.create(support::site("west")).await.unwrap().site;
    runtime.clear_journal();

    let site = handler.revoke_access().await.unwrap();
    assert_eq!(site.info.id, created.info.id);

    let name = SiteName::new("west").unwrap();
    let credentials = VolumeCredentialHandler::new(runtime.as_ref(), &name);
    for ca in credentials.list_cas().await.unwrap() {
        let expected = u64::from(ca.name == "site-ca");
        assert_eq!(ca.serial, expected, "{}", ca.name);
    }
    for credential in credentials.list_credentials().await.unwrap() {
        let expected = u64::from(credential.name == "site-server");
        assert_eq!(credential.serial, expected, "{}", credential.name);
    }

    let restarts: Vec<_> = runtime
        .journal()
        .into_iter()
        .filter(|m| matches!(m.op, Op::StopContainer | Op::StartContainer))
        .collect();
    assert_eq!(
        restarts,
        [
            Mutation {
                op: Op::StopContainer,
                target: "west-router".to_string()
            },
            Mutation {
                op: Op::StartContainer,
                target: "west-router".to_string()
            },
        ]
    );
    let (_, state) = runtime.container("west-router").unwrap();
    assert_eq!(state, ContainerState::Running);
}

#[tokio::test]
async fn revoke_access_of_an_unknown_site_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = support::memory_runtime(dir.path());
    let err = support::handler(&runtime, "west", dir.path())
        .revoke_access()
        .await
        .unwrap_err();
    assert_eq!(err.kind(), SiteErrorKind::NotFound);
}
