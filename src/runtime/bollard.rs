// ABOUTME: Runtime gateway over the Docker-compatible API using bollard.
// ABOUTME: Podman-only details (insecure pulls, network DNS flag) go through libpod via hyper.

use crate::runtime::traits::sealed::Sealed;
use crate::runtime::traits::{
    ContainerError, ContainerFilters, ContainerInfo, ContainerOps, ContainerSpec, ContainerState,
    ContainerSummary, ImageError, ImageOps, LogError, LogLine, LogLineStream, LogOps, LogOptions,
    LogStream, MountKind, NetworkAttachment, NetworkConfig, NetworkDetails, NetworkError,
    NetworkOps, PortMapping, Protocol, RegistryAuth, ResourceLimits, RestartPolicy, RuntimeInfo,
    RuntimeInfoError, RuntimeMetadata, VolumeConfig, VolumeDetails, VolumeError, VolumeFilters,
    VolumeMount, VolumeOps,
};
use crate::runtime::types::{RuntimeEndpoint, RuntimeType};
use crate::types::{ContainerId, ImageRef, NetworkId};
use async_trait::async_trait;
use bollard::Docker;
use bollard::errors::Error as BollardError;
use bollard::models::{
    ContainerCreateBody, ContainerStateStatusEnum, EndpointSettings, HostConfig, Mount,
    MountPointTypeEnum, MountTypeEnum, NetworkCreateRequest, NetworkingConfig, PortBinding,
    RestartPolicyNameEnum, VolumeCreateRequest,
};
use bollard::query_parameters::{
    CreateContainerOptions, CreateImageOptions, InspectContainerOptions, InspectNetworkOptions,
    ListContainersOptions, ListVolumesOptions, LogsOptions, RemoveContainerOptions,
    RemoveVolumeOptions, RenameContainerOptions, StartContainerOptions, StopContainerOptions,
    WaitContainerOptions,
};
use bytes::Bytes;
use futures::StreamExt;
use http_body_util::BodyExt;
use hyper_util::rt::TokioIo;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tokio::net::UnixStream;
use tokio_util::sync::CancellationToken;

const LIBPOD_PREFIX: &str = "/v4.0.0/libpod";

fn status_of(e: &BollardError) -> Option<(u16, &str)> {
    match e {
        BollardError::DockerResponseServerError {
            status_code,
            message,
        } => Some((*status_code, message.as_str())),
        _ => None,
    }
}

fn container_error(e: BollardError) -> ContainerError {
    match status_of(&e) {
        Some((404, msg)) => ContainerError::NotFound(msg.to_string()),
        Some((409, msg)) => ContainerError::AlreadyExists(msg.to_string()),
        _ => ContainerError::Runtime(e.to_string()),
    }
}

fn create_error(e: BollardError) -> ContainerError {
    match status_of(&e) {
        Some((404, msg)) => ContainerError::ImageNotFound(msg.to_string()),
        _ => container_error(e),
    }
}

fn start_error(e: BollardError) -> ContainerError {
    match status_of(&e) {
        Some((304, msg)) => ContainerError::AlreadyRunning(msg.to_string()),
        _ => container_error(e),
    }
}

fn stop_error(e: BollardError) -> ContainerError {
    match status_of(&e) {
        Some((304, msg)) => ContainerError::NotRunning(msg.to_string()),
        _ => container_error(e),
    }
}

fn volume_error(e: BollardError) -> VolumeError {
    match status_of(&e) {
        Some((404, msg)) => VolumeError::NotFound(msg.to_string()),
        Some((409, msg)) => VolumeError::InUse(msg.to_string()),
        _ => VolumeError::Runtime(e.to_string()),
    }
}

fn network_error(e: BollardError) -> NetworkError {
    match status_of(&e) {
        Some((404, msg)) => NetworkError::NotFound(msg.to_string()),
        Some((409, msg)) => NetworkError::AlreadyExists(msg.to_string()),
        Some((403, msg)) => NetworkError::InUse(msg.to_string()),
        _ => NetworkError::Runtime(e.to_string()),
    }
}

/// Docker-compatible runtime client for a local unix socket.
pub struct BollardRuntime {
    client: Docker,
    runtime_type: RuntimeType,
    socket_path: String,
}

impl BollardRuntime {
    pub fn connect(endpoint: &RuntimeEndpoint) -> Result<Self, RuntimeInfoError> {
        let client =
            Docker::connect_with_unix(&endpoint.socket_path, 120, bollard::API_DEFAULT_VERSION)
                .map_err(|e| RuntimeInfoError::ConnectionFailed(e.to_string()))?;
        Ok(Self {
            client,
            runtime_type: endpoint.runtime_type,
            socket_path: endpoint.socket_path.clone(),
        })
    }

    pub fn runtime_type(&self) -> RuntimeType {
        self.runtime_type
    }

    pub fn endpoint(&self) -> RuntimeEndpoint {
        RuntimeEndpoint {
            runtime_type: self.runtime_type,
            socket_path: self.socket_path.clone(),
        }
    }

    /// One-shot HTTP/1 request against the libpod API on the same socket.
    async fn libpod(&self, method: &str, path: &str) -> Result<(u16, Bytes), String> {
        let stream = UnixStream::connect(&self.socket_path)
            .await
            .map_err(|e| format!("failed to connect to {}: {e}", self.socket_path))?;
        let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
            .await
            .map_err(|e| format!("HTTP handshake failed: {e}"))?;
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                tracing::warn!("libpod connection error: {e}");
            }
        });

        let req = hyper::Request::builder()
            .method(method)
            .uri(format!("{LIBPOD_PREFIX}{path}"))
            .header("Host", "localhost")
            .body(http_body_util::Empty::<Bytes>::new())
            .map_err(|e| format!("failed to build request: {e}"))?;
        let resp = sender
            .send_request(req)
            .await
            .map_err(|e| format!("request failed: {e}"))?;
        let status = resp.status().as_u16();
        let body = resp
            .into_body()
            .collect()
            .await
            .map_err(|e| format!("failed to read response: {e}"))?
            .to_bytes();
        Ok((status, body))
    }

    /// Podman pull with `tlsVerify=false` so plain-HTTP registries work.
    async fn pull_libpod(&self, image: &str) -> Result<(), ImageError> {
        let path = format!(
            "/images/pull?reference={}&tlsVerify=false",
            urlencoding::encode(image)
        );
        let (status, body) = self
            .libpod("POST", &path)
            .await
            .map_err(|e| ImageError::PullFailed(format!("{image}: {e}")))?;
        let text = String::from_utf8_lossy(&body);
        if status == 404 {
            return Err(ImageError::NotFound(image.to_string()));
        }
        if !(200..300).contains(&status)
            || (text.contains("\"error\"") && !text.contains("\"error\":null"))
        {
            return Err(ImageError::PullFailed(format!("{image}: {text}")));
        }
        Ok(())
    }

    async fn pull_compat(
        &self,
        image: &str,
        auth: Option<&RegistryAuth>,
    ) -> Result<(), ImageError> {
        let opts = CreateImageOptions {
            from_image: Some(image.to_string()),
            ..Default::default()
        };
        let credentials = auth.map(|a| bollard::auth::DockerCredentials {
            username: Some(a.username.clone()),
            password: Some(a.password.clone()),
            serveraddress: a.server.clone(),
            ..Default::default()
        });
        let mut progress = self.client.create_image(Some(opts), None, credentials);
        while let Some(item) = progress.next().await {
            item.map_err(|e| match status_of(&e) {
                Some((404, _)) => ImageError::NotFound(image.to_string()),
                _ => ImageError::PullFailed(format!("{image}: {e}")),
            })?;
        }
        Ok(())
    }

    /// Podman reports whether its netavark DNS is on; Docker always resolves
    /// names on user-defined networks but not on the default bridge.
    async fn dns_enabled(&self, name: &str) -> Result<bool, NetworkError> {
        if self.runtime_type == RuntimeType::Docker {
            return Ok(name != "bridge");
        }
        let path = format!("/networks/{}/json", urlencoding::encode(name));
        let (status, body) = self.libpod("GET", &path).await.map_err(NetworkError::Runtime)?;
        if status == 404 {
            return Err(NetworkError::NotFound(name.to_string()));
        }
        let doc: serde_json::Value = serde_json::from_slice(&body)
            .map_err(|e| NetworkError::Runtime(format!("invalid network inspect output: {e}")))?;
        Ok(doc
            .get("dns_enabled")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false))
    }
}

impl Sealed for BollardRuntime {}

#[async_trait]
impl RuntimeInfo for BollardRuntime {
    async fn info(&self) -> Result<RuntimeMetadata, RuntimeInfoError> {
        let info = self
            .client
            .info()
            .await
            .map_err(|e| RuntimeInfoError::ConnectionFailed(e.to_string()))?;
        Ok(RuntimeMetadata {
            name: self.runtime_type.to_string(),
            version: info.server_version.unwrap_or_default(),
            api_version: bollard::API_DEFAULT_VERSION.to_string(),
            os: info.operating_system.unwrap_or_default(),
            arch: info.architecture.unwrap_or_default(),
        })
    }

    async fn ping(&self) -> Result<(), RuntimeInfoError> {
        self.client
            .ping()
            .await
            .map(|_| ())
            .map_err(|e| RuntimeInfoError::ConnectionFailed(e.to_string()))
    }
}

#[async_trait]
impl ImageOps for BollardRuntime {
    async fn pull_image(
        &self,
        reference: &ImageRef,
        auth: Option<&RegistryAuth>,
        cancel: &CancellationToken,
    ) -> Result<(), ImageError> {
        let image = reference.to_string();
        tracing::debug!(%image, "pulling image");
        let pull = async {
            if self.runtime_type == RuntimeType::Podman && auth.is_none() {
                self.pull_libpod(&image).await
            } else {
                self.pull_compat(&image, auth).await
            }
        };
        tokio::select! {
            result = pull => result,
            _ = cancel.cancelled() => Err(ImageError::DeadlineExceeded(image)),
        }
    }

    async fn image_exists(&self, reference: &ImageRef) -> Result<bool, ImageError> {
        let image = reference.to_string();
        match self.client.inspect_image(&image).await {
            Ok(_) => Ok(true),
            Err(e) if matches!(status_of(&e), Some((404, _))) => Ok(false),
            Err(e) => Err(ImageError::Runtime(format!("failed to inspect {image}: {e}"))),
        }
    }
}

fn restart_policy_body(policy: RestartPolicy) -> bollard::models::RestartPolicy {
    let (name, retries) = match policy {
        RestartPolicy::No => (RestartPolicyNameEnum::NO, None),
        RestartPolicy::Always => (RestartPolicyNameEnum::ALWAYS, None),
        RestartPolicy::UnlessStopped => (RestartPolicyNameEnum::UNLESS_STOPPED, None),
        RestartPolicy::OnFailure { max_retries } => {
            (RestartPolicyNameEnum::ON_FAILURE, max_retries.map(i64::from))
        }
    };
    bollard::models::RestartPolicy {
        name: Some(name),
        maximum_retry_count: retries,
    }
}

fn restart_policy_from(policy: Option<&bollard::models::RestartPolicy>) -> RestartPolicy {
    match policy.and_then(|p| p.name.map(|n| (n, p.maximum_retry_count))) {
        Some((RestartPolicyNameEnum::ALWAYS, _)) => RestartPolicy::Always,
        Some((RestartPolicyNameEnum::UNLESS_STOPPED, _)) => RestartPolicy::UnlessStopped,
        Some((RestartPolicyNameEnum::ON_FAILURE, retries)) => RestartPolicy::OnFailure {
            max_retries: retries.and_then(|r| u32::try_from(r).ok()).filter(|r| *r > 0),
        },
        _ => RestartPolicy::No,
    }
}

fn create_body(spec: &ContainerSpec) -> ContainerCreateBody {
    let mounts: Vec<Mount> = spec
        .mounts
        .iter()
        .map(|m| Mount {
            source: Some(m.source.clone()),
            target: Some(m.target.clone()),
            typ: Some(match m.kind {
                MountKind::Volume => MountTypeEnum::VOLUME,
                MountKind::Bind => MountTypeEnum::BIND,
            }),
            read_only: Some(m.read_only),
            ..Default::default()
        })
        .collect();

    let mut port_bindings: HashMap<String, Option<Vec<PortBinding>>> = HashMap::new();
    for port in &spec.ports {
        port_bindings
            .entry(format!("{}/{}", port.container_port, port.protocol.as_str()))
            .or_insert_with(|| Some(Vec::new()))
            .get_or_insert_with(Vec::new)
            .push(PortBinding {
                host_ip: port.host_ip.clone(),
                host_port: Some(port.host_port.to_string()),
            });
    }
    let exposed_ports: Vec<String> = port_bindings.keys().cloned().collect();

    let host_config = HostConfig {
        restart_policy: Some(restart_policy_body(spec.restart_policy)),
        memory: spec.resources.memory.and_then(|m| i64::try_from(m).ok()),
        nano_cpus: spec.resources.cpus.map(|c| (c * 1_000_000_000.0) as i64),
        mounts: (!mounts.is_empty()).then_some(mounts),
        port_bindings: (!port_bindings.is_empty()).then_some(port_bindings),
        network_mode: spec.networks.first().map(|n| n.network.clone()),
        ..Default::default()
    };

    let endpoints: HashMap<String, EndpointSettings> = spec
        .networks
        .iter()
        .map(|n| {
            (
                n.network.clone(),
                EndpointSettings {
                    aliases: (!n.aliases.is_empty()).then(|| n.aliases.clone()),
                    ..Default::default()
                },
            )
        })
        .collect();

    let env: Vec<String> = spec.env.iter().map(|(k, v)| format!("{k}={v}")).collect();

    ContainerCreateBody {
        image: Some(spec.image.clone()),
        env: (!env.is_empty()).then_some(env),
        labels: (!spec.labels.is_empty()).then(|| spec.labels.clone()),
        cmd: spec.command.clone(),
        entrypoint: spec.entrypoint.clone(),
        host_config: Some(host_config),
        exposed_ports: (!exposed_ports.is_empty()).then_some(exposed_ports),
        networking_config: (!endpoints.is_empty()).then(|| NetworkingConfig {
            endpoints_config: Some(endpoints),
        }),
        ..Default::default()
    }
}

fn parse_port_key(key: &str) -> Option<(u16, Protocol)> {
    let (port, proto) = key.split_once('/').unwrap_or((key, "tcp"));
    let protocol = if proto == "udp" {
        Protocol::Udp
    } else {
        Protocol::Tcp
    };
    port.parse().ok().map(|p| (p, protocol))
}

#[async_trait]
impl ContainerOps for BollardRuntime {
    async fn create_container(&self, spec: &ContainerSpec) -> Result<ContainerId, ContainerError> {
        let opts = CreateContainerOptions {
            name: Some(spec.name.clone()),
            ..Default::default()
        };
        let response = self
            .client
            .create_container(Some(opts), create_body(spec))
            .await
            .map_err(create_error)?;
        Ok(ContainerId::new(response.id))
    }

    async fn start_container(&self, id: &ContainerId) -> Result<(), ContainerError> {
        self.client
            .start_container(id.as_str(), None::<StartContainerOptions>)
            .await
            .map_err(start_error)
    }

    async fn stop_container(
        &self,
        id: &ContainerId,
        timeout: Duration,
    ) -> Result<(), ContainerError> {
        let opts = StopContainerOptions {
            t: Some(i32::try_from(timeout.as_secs()).unwrap_or(i32::MAX)),
            signal: None,
        };
        match self.client.stop_container(id.as_str(), Some(opts)).await {
            Ok(()) => Ok(()),
            // Already stopped is what the caller wanted.
            Err(e) if matches!(status_of(&e), Some((304, _))) => Ok(()),
            Err(e) => Err(stop_error(e)),
        }
    }

    async fn remove_container(&self, id: &ContainerId, force: bool) -> Result<(), ContainerError> {
        let opts = RemoveContainerOptions {
            force,
            ..Default::default()
        };
        self.client
            .remove_container(id.as_str(), Some(opts))
            .await
            .map_err(container_error)
    }

    async fn inspect_container(&self, id: &ContainerId) -> Result<ContainerInfo, ContainerError> {
        let details = self
            .client
            .inspect_container(id.as_str(), None::<InspectContainerOptions>)
            .await
            .map_err(container_error)?;

        let config = details.config.unwrap_or_default();
        let host = details.host_config.unwrap_or_default();

        let env: BTreeMap<String, String> = config
            .env
            .unwrap_or_default()
            .into_iter()
            .filter_map(|kv| {
                kv.split_once('=')
                    .map(|(k, v)| (k.to_string(), v.to_string()))
            })
            .collect();

        let networks = details
            .network_settings
            .and_then(|s| s.networks)
            .unwrap_or_default()
            .into_iter()
            .map(|(network, endpoint)| NetworkAttachment {
                network,
                aliases: endpoint.aliases.unwrap_or_default(),
            })
            .collect();

        let mounts = details
            .mounts
            .unwrap_or_default()
            .into_iter()
            .filter_map(|m| {
                let target = m.destination?;
                let (kind, source) = match m.typ {
                    Some(MountPointTypeEnum::VOLUME) => (MountKind::Volume, m.name?),
                    Some(MountPointTypeEnum::BIND) => (MountKind::Bind, m.source?),
                    _ => return None,
                };
                Some(VolumeMount {
                    kind,
                    source,
                    target,
                    read_only: !m.rw.unwrap_or(true),
                })
            })
            .collect();

        let mut ports = Vec::new();
        for (key, bindings) in host.port_bindings.clone().unwrap_or_default() {
            let Some((container_port, protocol)) = parse_port_key(&key) else {
                continue;
            };
            for binding in bindings.unwrap_or_default() {
                let Some(host_port) = binding.host_port.and_then(|p| p.parse().ok()) else {
                    continue;
                };
                ports.push(PortMapping {
                    host_ip: binding.host_ip.filter(|ip| !ip.is_empty()),
                    host_port,
                    container_port,
                    protocol,
                });
            }
        }

        let state = details.state.unwrap_or_default();
        let status = match state.status {
            Some(ContainerStateStatusEnum::CREATED) => ContainerState::Created,
            Some(ContainerStateStatusEnum::RUNNING) => ContainerState::Running,
            Some(ContainerStateStatusEnum::PAUSED) => ContainerState::Paused,
            Some(ContainerStateStatusEnum::RESTARTING) => ContainerState::Restarting,
            Some(ContainerStateStatusEnum::REMOVING) => ContainerState::Removing,
            Some(ContainerStateStatusEnum::DEAD) => ContainerState::Dead,
            _ => ContainerState::Exited,
        };

        let spec = ContainerSpec {
            name: details
                .name
                .unwrap_or_default()
                .trim_start_matches('/')
                .to_string(),
            image: config.image.unwrap_or_default(),
            env,
            labels: config.labels.unwrap_or_default(),
            networks,
            mounts,
            ports,
            entrypoint: config.entrypoint,
            command: config.cmd,
            restart_policy: restart_policy_from(host.restart_policy.as_ref()),
            resources: ResourceLimits {
                memory: host
                    .memory
                    .filter(|m| *m > 0)
                    .and_then(|m| u64::try_from(m).ok()),
                cpus: host
                    .nano_cpus
                    .filter(|c| *c > 0)
                    .map(|c| c as f64 / 1_000_000_000.0),
            },
        };

        Ok(ContainerInfo {
            id: ContainerId::new(details.id.unwrap_or_else(|| id.to_string())),
            spec,
            state: status,
            exit_code: state.exit_code,
            created: details.created.map(|dt| dt.to_string()).unwrap_or_default(),
        })
    }

    async fn list_containers(
        &self,
        filters: &ContainerFilters,
    ) -> Result<Vec<ContainerSummary>, ContainerError> {
        let mut filter_map: HashMap<String, Vec<String>> = HashMap::new();
        if let Some(name) = &filters.name {
            // The API matches names as regular expressions.
            filter_map.insert("name".to_string(), vec![format!("^/?{name}$")]);
        }
        for (key, value) in &filters.labels {
            filter_map
                .entry("label".to_string())
                .or_default()
                .push(format!("{key}={value}"));
        }
        let opts = ListContainersOptions {
            all: filters.all,
            filters: Some(filter_map),
            ..Default::default()
        };

        // Podman's transient "stopping" state trips bollard's enum parsing; retry briefly.
        let mut attempt = 0;
        let containers = loop {
            match self.client.list_containers(Some(opts.clone())).await {
                Ok(containers) => break containers,
                Err(e) => {
                    let text = e.to_string();
                    if attempt < 2 && text.contains("unknown variant `stopping`") {
                        attempt += 1;
                        tokio::time::sleep(Duration::from_millis(500)).await;
                        continue;
                    }
                    return Err(ContainerError::Runtime(text));
                }
            }
        };

        Ok(containers
            .into_iter()
            .map(|c| ContainerSummary {
                id: ContainerId::new(c.id.unwrap_or_default()),
                name: c
                    .names
                    .unwrap_or_default()
                    .first()
                    .map(|n| n.trim_start_matches('/').to_string())
                    .unwrap_or_default(),
                image: c.image.unwrap_or_default(),
                state: c
                    .state
                    .map(|s| format!("{s:?}").to_lowercase())
                    .unwrap_or_default(),
                labels: c.labels.unwrap_or_default(),
            })
            .collect())
    }

    async fn rename_container(
        &self,
        id: &ContainerId,
        new_name: &str,
    ) -> Result<(), ContainerError> {
        self.client
            .rename_container(
                id.as_str(),
                RenameContainerOptions {
                    name: new_name.to_string(),
                },
            )
            .await
            .map_err(container_error)
    }

    async fn wait_container(&self, id: &ContainerId) -> Result<i64, ContainerError> {
        let mut waiter = self
            .client
            .wait_container(id.as_str(), None::<WaitContainerOptions>);
        let mut code = 0;
        while let Some(item) = waiter.next().await {
            match item {
                Ok(response) => code = response.status_code,
                // bollard surfaces a non-zero exit as an error carrying the code.
                Err(BollardError::DockerContainerWaitError { code: exit, .. }) => code = exit,
                Err(e) => return Err(container_error(e)),
            }
        }
        Ok(code)
    }
}

#[async_trait]
impl VolumeOps for BollardRuntime {
    async fn create_volume(&self, config: &VolumeConfig) -> Result<VolumeDetails, VolumeError> {
        let request = VolumeCreateRequest {
            name: Some(config.name.clone()),
            labels: (!config.labels.is_empty()).then(|| config.labels.clone()),
            ..Default::default()
        };
        let volume = self
            .client
            .create_volume(request)
            .await
            .map_err(volume_error)?;
        Ok(VolumeDetails {
            name: volume.name,
            mountpoint: volume.mountpoint,
            labels: volume.labels,
        })
    }

    async fn inspect_volume(&self, name: &str) -> Result<VolumeDetails, VolumeError> {
        let volume = self
            .client
            .inspect_volume(name)
            .await
            .map_err(volume_error)?;
        Ok(VolumeDetails {
            name: volume.name,
            mountpoint: volume.mountpoint,
            labels: volume.labels,
        })
    }

    async fn list_volumes(&self, filters: &VolumeFilters) -> Result<Vec<VolumeDetails>, VolumeError> {
        let labels: Vec<String> = filters
            .labels
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        let mut filter_map = HashMap::new();
        if !labels.is_empty() {
            filter_map.insert("label".to_string(), labels);
        }
        let opts = ListVolumesOptions {
            filters: Some(filter_map),
        };
        let response = self
            .client
            .list_volumes(Some(opts))
            .await
            .map_err(volume_error)?;
        Ok(response
            .volumes
            .unwrap_or_default()
            .into_iter()
            .map(|v| VolumeDetails {
                name: v.name,
                mountpoint: v.mountpoint,
                labels: v.labels,
            })
            .collect())
    }

    async fn remove_volume(&self, name: &str, force: bool) -> Result<(), VolumeError> {
        self.client
            .remove_volume(name, Some(RemoveVolumeOptions { force }))
            .await
            .map_err(volume_error)
    }
}

#[async_trait]
impl NetworkOps for BollardRuntime {
    async fn create_network(&self, config: &NetworkConfig) -> Result<NetworkId, NetworkError> {
        let request = NetworkCreateRequest {
            name: config.name.clone(),
            driver: config.driver.clone(),
            enable_ipv6: Some(config.enable_ipv6),
            labels: (!config.labels.is_empty()).then(|| config.labels.clone()),
            ..Default::default()
        };
        let response = self
            .client
            .create_network(request)
            .await
            .map_err(network_error)?;
        Ok(NetworkId::new(response.id))
    }

    async fn inspect_network(&self, name: &str) -> Result<NetworkDetails, NetworkError> {
        self.client
            .inspect_network(name, None::<InspectNetworkOptions>)
            .await
            .map_err(network_error)?;
        Ok(NetworkDetails {
            id: name.to_string(),
            name: name.to_string(),
            dns_enabled: self.dns_enabled(name).await?,
            labels: HashMap::new(),
        })
    }

    async fn remove_network(&self, name: &str) -> Result<(), NetworkError> {
        self.client
            .remove_network(name)
            .await
            .map_err(network_error)
    }
}

#[async_trait]
impl LogOps for BollardRuntime {
    async fn container_logs(
        &self,
        id: &ContainerId,
        opts: &LogOptions,
    ) -> Result<LogLineStream, LogError> {
        let log_opts = LogsOptions {
            stdout: opts.stdout,
            stderr: opts.stderr,
            follow: false,
            tail: opts
                .tail
                .map(|n| n.to_string())
                .unwrap_or_else(|| "all".to_string()),
            ..Default::default()
        };
        let lines = self.client.logs(id.as_str(), Some(log_opts)).map(|item| {
            item.map(|output| {
                let (stream, bytes) = match output {
                    bollard::container::LogOutput::StdErr { message } => {
                        (LogStream::Stderr, message)
                    }
                    bollard::container::LogOutput::StdOut { message }
                    | bollard::container::LogOutput::StdIn { message }
                    | bollard::container::LogOutput::Console { message } => {
                        (LogStream::Stdout, message)
                    }
                };
                LogLine {
                    content: String::from_utf8_lossy(&bytes).into_owned(),
                    stream,
                }
            })
            .map_err(|e| match status_of(&e) {
                Some((404, msg)) => LogError::ContainerNotFound(msg.to_string()),
                _ => LogError::Stream(e.to_string()),
            })
        });
        Ok(Box::pin(lines))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_body_groups_bindings_per_container_port() {
        let spec = ContainerSpec {
            name: "west-router".to_string(),
            image: "router:2".to_string(),
            ports: vec![
                PortMapping {
                    host_ip: Some("10.0.0.1".to_string()),
                    host_port: 55671,
                    container_port: 55671,
                    protocol: Protocol::Tcp,
                },
                PortMapping {
                    host_ip: Some("10.0.0.2".to_string()),
                    host_port: 55671,
                    container_port: 55671,
                    protocol: Protocol::Tcp,
                },
            ],
            networks: vec![NetworkAttachment {
                network: "siteforge".to_string(),
                aliases: vec!["router".to_string()],
            }],
            ..Default::default()
        };
        let body = create_body(&spec);
        let host = body.host_config.unwrap();
        let bindings = host.port_bindings.unwrap();
        assert_eq!(bindings["55671/tcp"].as_ref().unwrap().len(), 2);
        assert_eq!(host.network_mode.as_deref(), Some("siteforge"));
        let endpoints = body.networking_config.unwrap().endpoints_config.unwrap();
        assert_eq!(
            endpoints["siteforge"].aliases.as_deref(),
            Some(&["router".to_string()][..])
        );
    }

    #[test]
    fn restart_policy_survives_conversion() {
        let policy = RestartPolicy::OnFailure {
            max_retries: Some(3),
        };
        assert_eq!(restart_policy_from(Some(&restart_policy_body(policy))), policy);
        assert_eq!(restart_policy_from(None), RestartPolicy::No);
    }

    #[test]
    fn port_keys_parse_protocol() {
        assert_eq!(parse_port_key("5672/udp"), Some((5672, Protocol::Udp)));
        assert_eq!(parse_port_key("8080"), Some((8080, Protocol::Tcp)));
        assert_eq!(parse_port_key("x/tcp"), None);
    }
}
