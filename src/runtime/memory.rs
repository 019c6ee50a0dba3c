// ABOUTME: In-process runtime gateway with fault injection and a mutation journal.
// ABOUTME: Backs dry runs and every orchestration test; volumes are real directories under a root.

use crate::runtime::traits::sealed::Sealed;
use crate::runtime::traits::{
    ContainerError, ContainerFilters, ContainerInfo, ContainerOps, ContainerSpec, ContainerState,
    ContainerSummary, ImageError, ImageOps, LogError, LogLine, LogLineStream, LogOps, LogOptions,
    LogStream, MountKind, NetworkConfig, NetworkDetails, NetworkError, NetworkOps, RegistryAuth,
    RuntimeInfo, RuntimeInfoError, RuntimeMetadata, VolumeConfig, VolumeDetails, VolumeError,
    VolumeFilters, VolumeOps,
};
use crate::types::{ContainerId, ImageRef, NetworkId};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Runtime operations that can be journaled or made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Ping,
    CreateContainer,
    StartContainer,
    StopContainer,
    RemoveContainer,
    RenameContainer,
    WaitContainer,
    InspectContainer,
    CreateVolume,
    RemoveVolume,
    CreateNetwork,
    RemoveNetwork,
    PullImage,
}

/// A one-shot injected failure.
///
/// Matches the next call of `op` whose target (container, volume, network
/// or image name) starts with `target`, or any call when no target is set.
#[derive(Debug, Clone)]
pub struct Fault {
    pub op: Op,
    pub target: Option<String>,
}

impl Fault {
    pub fn on(op: Op) -> Self {
        Self { op, target: None }
    }

    pub fn matching(mut self, target_prefix: &str) -> Self {
        self.target = Some(target_prefix.to_string());
        self
    }

    fn matches(&self, op: Op, target: &str) -> bool {
        self.op == op && self.target.as_deref().is_none_or(|t| target.starts_with(t))
    }
}

/// A state-changing call that succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation {
    pub op: Op,
    pub target: String,
}

struct MemContainer {
    id: String,
    spec: ContainerSpec,
    state: ContainerState,
    exit_code: Option<i64>,
}

#[derive(Default)]
struct State {
    containers: Vec<MemContainer>,
    volumes: BTreeMap<String, VolumeDetails>,
    networks: BTreeMap<String, NetworkDetails>,
    images: BTreeSet<String>,
    faults: Vec<Fault>,
    journal: Vec<Mutation>,
    next_id: u64,
    unreachable: bool,
    networks_without_dns: bool,
    remote_mountpoints: bool,
    pull_delay: Option<Duration>,
    exit_codes: HashMap<String, (i64, String)>,
}

impl State {
    fn take_fault(&mut self, op: Op, target: &str) -> bool {
        match self.faults.iter().position(|f| f.matches(op, target)) {
            Some(i) => {
                self.faults.remove(i);
                true
            }
            None => false,
        }
    }

    fn record(&mut self, op: Op, target: &str) {
        self.journal.push(Mutation {
            op,
            target: target.to_string(),
        });
    }

    fn find(&self, key: &str) -> Option<usize> {
        self.containers
            .iter()
            .position(|c| c.id == key || c.spec.name == key)
    }

    fn find_or_err(&self, key: &str) -> Result<usize, ContainerError> {
        self.find(key)
            .ok_or_else(|| ContainerError::NotFound(key.to_string()))
    }
}

fn injected(op: Op, target: &str) -> String {
    format!("injected failure: {op:?} {target}")
}

/// Container runtime simulated in memory.
pub struct MemoryRuntime {
    state: Mutex<State>,
    volume_root: PathBuf,
}

impl MemoryRuntime {
    /// Volumes get a directory under `volume_root` as their mountpoint.
    pub fn new(volume_root: impl Into<PathBuf>) -> Self {
        Self {
            state: Mutex::new(State::default()),
            volume_root: volume_root.into(),
        }
    }

    pub fn inject(&self, fault: Fault) {
        self.state.lock().faults.push(fault);
    }

    /// Injected faults that have not fired yet.
    pub fn pending_faults(&self) -> usize {
        self.state.lock().faults.len()
    }

    pub fn journal(&self) -> Vec<Mutation> {
        self.state.lock().journal.clone()
    }

    pub fn clear_journal(&self) {
        self.state.lock().journal.clear();
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.lock().unreachable = unreachable;
    }

    /// New networks report DNS as disabled.
    pub fn disable_network_dns(&self) {
        self.state.lock().networks_without_dns = true;
    }

    /// Volumes report mountpoints that do not exist on this host.
    pub fn use_remote_mountpoints(&self) {
        self.state.lock().remote_mountpoints = true;
    }

    pub fn set_pull_delay(&self, delay: Duration) {
        self.state.lock().pull_delay = Some(delay);
    }

    /// Containers of `image` exit with `code` and print `logs` when waited on.
    pub fn set_exit(&self, image: &str, code: i64, logs: &str) {
        self.state
            .lock()
            .exit_codes
            .insert(image.to_string(), (code, logs.to_string()));
    }

    pub fn container_names(&self) -> Vec<String> {
        self.state
            .lock()
            .containers
            .iter()
            .map(|c| c.spec.name.clone())
            .collect()
    }

    pub fn container(&self, name: &str) -> Option<(ContainerSpec, ContainerState)> {
        let state = self.state.lock();
        state
            .find(name)
            .map(|i| (state.containers[i].spec.clone(), state.containers[i].state))
    }

    pub fn volume_names(&self) -> Vec<String> {
        self.state.lock().volumes.keys().cloned().collect()
    }

    pub fn network_names(&self) -> Vec<String> {
        self.state.lock().networks.keys().cloned().collect()
    }

    pub fn pulled_images(&self) -> Vec<String> {
        self.state.lock().images.iter().cloned().collect()
    }

    /// Add a network without going through the journal.
    pub fn seed_network(&self, name: &str, dns_enabled: bool) {
        self.state.lock().networks.insert(
            name.to_string(),
            NetworkDetails {
                id: name.to_string(),
                name: name.to_string(),
                dns_enabled,
                labels: HashMap::new(),
            },
        );
    }

    fn volume_dir(&self, name: &str) -> PathBuf {
        self.volume_root.join(name)
    }
}

impl Sealed for MemoryRuntime {}

#[async_trait]
impl RuntimeInfo for MemoryRuntime {
    async fn info(&self) -> Result<RuntimeMetadata, RuntimeInfoError> {
        self.ping().await?;
        Ok(RuntimeMetadata {
            name: "memory".to_string(),
            version: crate::version::current().to_string(),
            api_version: "1".to_string(),
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
        })
    }

    async fn ping(&self) -> Result<(), RuntimeInfoError> {
        let mut state = self.state.lock();
        if state.unreachable || state.take_fault(Op::Ping, "") {
            return Err(RuntimeInfoError::ConnectionFailed(
                "runtime unreachable".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl ImageOps for MemoryRuntime {
    async fn pull_image(
        &self,
        reference: &ImageRef,
        _auth: Option<&RegistryAuth>,
        cancel: &CancellationToken,
    ) -> Result<(), ImageError> {
        let image = reference.to_string();
        let delay = self.state.lock().pull_delay;
        if let Some(delay) = delay {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => return Err(ImageError::DeadlineExceeded(image)),
            }
        }
        if cancel.is_cancelled() {
            return Err(ImageError::DeadlineExceeded(image));
        }
        let mut state = self.state.lock();
        if state.take_fault(Op::PullImage, &image) {
            return Err(ImageError::PullFailed(injected(Op::PullImage, &image)));
        }
        state.images.insert(image);
        Ok(())
    }

    async fn image_exists(&self, reference: &ImageRef) -> Result<bool, ImageError> {
        Ok(self.state.lock().images.contains(&reference.to_string()))
    }
}

#[async_trait]
impl ContainerOps for MemoryRuntime {
    async fn create_container(&self, spec: &ContainerSpec) -> Result<ContainerId, ContainerError> {
        let mut state = self.state.lock();
        if state.take_fault(Op::CreateContainer, &spec.name) {
            return Err(ContainerError::Runtime(injected(
                Op::CreateContainer,
                &spec.name,
            )));
        }
        if state.find(&spec.name).is_some() {
            return Err(ContainerError::AlreadyExists(spec.name.clone()));
        }
        for attachment in &spec.networks {
            if !state.networks.contains_key(&attachment.network) {
                return Err(ContainerError::Runtime(format!(
                    "network not found: {}",
                    attachment.network
                )));
            }
        }
        for mount in spec.mounts.iter().filter(|m| m.kind == MountKind::Volume) {
            // Named volumes are created on demand, as the real runtimes do.
            if !state.volumes.contains_key(&mount.source) {
                let mountpoint = self.volume_dir(&mount.source);
                std::fs::create_dir_all(&mountpoint)
                    .map_err(|e| ContainerError::Runtime(e.to_string()))?;
                state.volumes.insert(
                    mount.source.clone(),
                    VolumeDetails {
                        name: mount.source.clone(),
                        mountpoint: mountpoint.to_string_lossy().into_owned(),
                        labels: HashMap::new(),
                    },
                );
            }
        }
        state.next_id += 1;
        let id = format!("{:012x}", state.next_id);
        state.containers.push(MemContainer {
            id: id.clone(),
            spec: spec.clone(),
            state: ContainerState::Created,
            exit_code: None,
        });
        state.record(Op::CreateContainer, &spec.name);
        Ok(ContainerId::new(id))
    }

    async fn start_container(&self, id: &ContainerId) -> Result<(), ContainerError> {
        let mut state = self.state.lock();
        let i = state.find_or_err(id.as_str())?;
        let name = state.containers[i].spec.name.clone();
        if state.take_fault(Op::StartContainer, &name) {
            return Err(ContainerError::Runtime(injected(Op::StartContainer, &name)));
        }
        if state.containers[i].state == ContainerState::Running {
            return Err(ContainerError::AlreadyRunning(name));
        }
        state.containers[i].state = ContainerState::Running;
        state.containers[i].exit_code = None;
        state.record(Op::StartContainer, &name);
        Ok(())
    }

    async fn stop_container(
        &self,
        id: &ContainerId,
        _timeout: Duration,
    ) -> Result<(), ContainerError> {
        let mut state = self.state.lock();
        let i = state.find_or_err(id.as_str())?;
        let name = state.containers[i].spec.name.clone();
        if state.take_fault(Op::StopContainer, &name) {
            return Err(ContainerError::Runtime(injected(Op::StopContainer, &name)));
        }
        if state.containers[i].state == ContainerState::Running {
            state.containers[i].state = ContainerState::Exited;
            state.containers[i].exit_code = Some(0);
            state.record(Op::StopContainer, &name);
        }
        Ok(())
    }

    async fn remove_container(&self, id: &ContainerId, force: bool) -> Result<(), ContainerError> {
        let mut state = self.state.lock();
        let i = state.find_or_err(id.as_str())?;
        let name = state.containers[i].spec.name.clone();
        if state.take_fault(Op::RemoveContainer, &name) {
            return Err(ContainerError::Runtime(injected(Op::RemoveContainer, &name)));
        }
        if state.containers[i].state == ContainerState::Running && !force {
            return Err(ContainerError::Runtime(format!(
                "cannot remove running container {name}"
            )));
        }
        state.containers.remove(i);
        state.record(Op::RemoveContainer, &name);
        Ok(())
    }

    async fn inspect_container(&self, id: &ContainerId) -> Result<ContainerInfo, ContainerError> {
        let mut state = self.state.lock();
        if state.take_fault(Op::InspectContainer, id.as_str()) {
            return Err(ContainerError::Runtime(injected(
                Op::InspectContainer,
                id.as_str(),
            )));
        }
        let c = &state.containers[state.find_or_err(id.as_str())?];
        Ok(ContainerInfo {
            id: ContainerId::new(c.id.clone()),
            spec: c.spec.clone(),
            state: c.state,
            exit_code: c.exit_code,
            created: String::new(),
        })
    }

    async fn list_containers(
        &self,
        filters: &ContainerFilters,
    ) -> Result<Vec<ContainerSummary>, ContainerError> {
        let state = self.state.lock();
        Ok(state
            .containers
            .iter()
            .filter(|c| filters.all || c.state == ContainerState::Running)
            .filter(|c| filters.name.as_ref().is_none_or(|n| *n == c.spec.name))
            .filter(|c| {
                filters
                    .labels
                    .iter()
                    .all(|(k, v)| c.spec.labels.get(k) == Some(v))
            })
            .map(|c| ContainerSummary {
                id: ContainerId::new(c.id.clone()),
                name: c.spec.name.clone(),
                image: c.spec.image.clone(),
                state: format!("{:?}", c.state).to_lowercase(),
                labels: c.spec.labels.clone(),
            })
            .collect())
    }

    async fn rename_container(
        &self,
        id: &ContainerId,
        new_name: &str,
    ) -> Result<(), ContainerError> {
        let mut state = self.state.lock();
        let i = state.find_or_err(id.as_str())?;
        let name = state.containers[i].spec.name.clone();
        if state.take_fault(Op::RenameContainer, &name) {
            return Err(ContainerError::Runtime(injected(Op::RenameContainer, &name)));
        }
        if state.find(new_name).is_some() {
            return Err(ContainerError::AlreadyExists(new_name.to_string()));
        }
        state.containers[i].spec.name = new_name.to_string();
        state.record(Op::RenameContainer, &format!("{name}->{new_name}"));
        Ok(())
    }

    async fn wait_container(&self, id: &ContainerId) -> Result<i64, ContainerError> {
        let mut state = self.state.lock();
        let i = state.find_or_err(id.as_str())?;
        let name = state.containers[i].spec.name.clone();
        if state.take_fault(Op::WaitContainer, &name) {
            return Err(ContainerError::Runtime(injected(Op::WaitContainer, &name)));
        }
        let image = state.containers[i].spec.image.clone();
        let code = state.exit_codes.get(&image).map_or(0, |(code, _)| *code);
        let container = &mut state.containers[i];
        container.state = ContainerState::Exited;
        container.exit_code = Some(code);
        Ok(code)
    }
}

#[async_trait]
impl VolumeOps for MemoryRuntime {
    async fn create_volume(&self, config: &VolumeConfig) -> Result<VolumeDetails, VolumeError> {
        let mut state = self.state.lock();
        if state.take_fault(Op::CreateVolume, &config.name) {
            return Err(VolumeError::Runtime(injected(Op::CreateVolume, &config.name)));
        }
        if let Some(existing) = state.volumes.get(&config.name) {
            return Ok(existing.clone());
        }
        let dir = self.volume_dir(&config.name);
        std::fs::create_dir_all(&dir).map_err(|e| VolumeError::Runtime(e.to_string()))?;
        let mountpoint = if state.remote_mountpoints {
            Path::new("/nonexistent/remote/volumes")
                .join(&config.name)
                .to_string_lossy()
                .into_owned()
        } else {
            dir.to_string_lossy().into_owned()
        };
        let details = VolumeDetails {
            name: config.name.clone(),
            mountpoint,
            labels: config.labels.clone(),
        };
        state.volumes.insert(config.name.clone(), details.clone());
        state.record(Op::CreateVolume, &config.name);
        Ok(details)
    }

    async fn inspect_volume(&self, name: &str) -> Result<VolumeDetails, VolumeError> {
        self.state
            .lock()
            .volumes
            .get(name)
            .cloned()
            .ok_or_else(|| VolumeError::NotFound(name.to_string()))
    }

    async fn list_volumes(&self, filters: &VolumeFilters) -> Result<Vec<VolumeDetails>, VolumeError> {
        Ok(self
            .state
            .lock()
            .volumes
            .values()
            .filter(|v| filters.labels.iter().all(|(k, val)| v.labels.get(k) == Some(val)))
            .cloned()
            .collect())
    }

    async fn remove_volume(&self, name: &str, force: bool) -> Result<(), VolumeError> {
        let mut state = self.state.lock();
        if state.take_fault(Op::RemoveVolume, name) {
            return Err(VolumeError::Runtime(injected(Op::RemoveVolume, name)));
        }
        if !state.volumes.contains_key(name) {
            return Err(VolumeError::NotFound(name.to_string()));
        }
        let in_use = state.containers.iter().any(|c| {
            c.spec
                .mounts
                .iter()
                .any(|m| m.kind == MountKind::Volume && m.source == name)
        });
        if in_use && !force {
            return Err(VolumeError::InUse(name.to_string()));
        }
        state.volumes.remove(name);
        let _ = std::fs::remove_dir_all(self.volume_dir(name));
        state.record(Op::RemoveVolume, name);
        Ok(())
    }
}

#[async_trait]
impl NetworkOps for MemoryRuntime {
    async fn create_network(&self, config: &NetworkConfig) -> Result<NetworkId, NetworkError> {
        let mut state = self.state.lock();
        if state.take_fault(Op::CreateNetwork, &config.name) {
            return Err(NetworkError::Runtime(injected(Op::CreateNetwork, &config.name)));
        }
        if state.networks.contains_key(&config.name) {
            return Err(NetworkError::AlreadyExists(config.name.clone()));
        }
        let dns_enabled = !state.networks_without_dns;
        state.networks.insert(
            config.name.clone(),
            NetworkDetails {
                id: config.name.clone(),
                name: config.name.clone(),
                dns_enabled,
                labels: config.labels.clone(),
            },
        );
        state.record(Op::CreateNetwork, &config.name);
        Ok(NetworkId::new(config.name.clone()))
    }

    async fn inspect_network(&self, name: &str) -> Result<NetworkDetails, NetworkError> {
        self.state
            .lock()
            .networks
            .get(name)
            .cloned()
            .ok_or_else(|| NetworkError::NotFound(name.to_string()))
    }

    async fn remove_network(&self, name: &str) -> Result<(), NetworkError> {
        let mut state = self.state.lock();
        if state.take_fault(Op::RemoveNetwork, name) {
            return Err(NetworkError::Runtime(injected(Op::RemoveNetwork, name)));
        }
        if !state.networks.contains_key(name) {
            return Err(NetworkError::NotFound(name.to_string()));
        }
        if state
            .containers
            .iter()
            .any(|c| c.spec.networks.iter().any(|n| n.network == name))
        {
            return Err(NetworkError::InUse(name.to_string()));
        }
        state.networks.remove(name);
        state.record(Op::RemoveNetwork, name);
        Ok(())
    }
}

#[async_trait]
impl LogOps for MemoryRuntime {
    async fn container_logs(
        &self,
        id: &ContainerId,
        _opts: &LogOptions,
    ) -> Result<LogLineStream, LogError> {
        let state = self.state.lock();
        let i = state
            .find(id.as_str())
            .ok_or_else(|| LogError::ContainerNotFound(id.to_string()))?;
        let logs = state
            .exit_codes
            .get(&state.containers[i].spec.image)
            .map(|(_, logs)| logs.clone())
            .unwrap_or_default();
        let lines: Vec<Result<LogLine, LogError>> = logs
            .lines()
            .map(|l| {
                Ok(LogLine {
                    content: format!("{l}\n"),
                    stream: LogStream::Stdout,
                })
            })
            .collect();
        Ok(Box::pin(futures::stream::iter(lines)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::traits::collect_logs;

    fn spec(name: &str) -> ContainerSpec {
        ContainerSpec {
            name: name.to_string(),
            image: "router:1".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn faults_fire_once_and_only_for_matching_targets() {
        let dir = tempfile::tempdir().unwrap();
        let rt = MemoryRuntime::new(dir.path());
        rt.inject(Fault::on(Op::CreateContainer).matching("west-"));

        let east = rt.create_container(&spec("east-router")).await.unwrap();
        assert!(rt.create_container(&spec("west-router")).await.is_err());
        let west = rt.create_container(&spec("west-router")).await.unwrap();
        assert_ne!(east, west);
        assert_eq!(rt.pending_faults(), 0);
    }

    #[tokio::test]
    async fn rename_refuses_taken_names() {
        let dir = tempfile::tempdir().unwrap();
        let rt = MemoryRuntime::new(dir.path());
        let a = rt.create_container(&spec("a")).await.unwrap();
        let _b = rt.create_container(&spec("b")).await.unwrap();
        let err = rt
            .rename_container(&a, "b")
            .await
            .unwrap_err();
        assert!(matches!(err, ContainerError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn volumes_get_local_directories() {
        let dir = tempfile::tempdir().unwrap();
        let rt = MemoryRuntime::new(dir.path());
        let volume = rt
            .create_volume(&VolumeConfig {
                name: "data".to_string(),
                labels: HashMap::new(),
            })
            .await
            .unwrap();
        assert!(Path::new(&volume.mountpoint).is_dir());
        rt.remove_volume("data", false).await.unwrap();
        assert!(!Path::new(&volume.mountpoint).exists());
    }

    #[tokio::test]
    async fn wait_reports_configured_exit_and_logs() {
        let dir = tempfile::tempdir().unwrap();
        let rt = MemoryRuntime::new(dir.path());
        rt.set_exit("router:1", 2, "boom\n");
        let id = rt.create_container(&spec("scratch")).await.unwrap();
        rt.start_container(&id).await.unwrap();
        assert_eq!(rt.wait_container(&id).await.unwrap(), 2);
        assert_eq!(collect_logs(&rt, &id, 10).await.unwrap(), "boom\n");
    }

    #[tokio::test]
    async fn cancelled_pull_reports_deadline() {
        let dir = tempfile::tempdir().unwrap();
        let rt = MemoryRuntime::new(dir.path());
        rt.set_pull_delay(Duration::from_secs(30));
        let token = CancellationToken::new();
        token.cancel();
        let image = ImageRef::parse("router:1").unwrap();
        let err = rt.pull_image(&image, None, &token).await.unwrap_err();
        assert!(matches!(err, ImageError::DeadlineExceeded(_)));
    }
}
