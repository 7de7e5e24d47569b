//! Mock container runtime for testing and development.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument};

use crate::error::{Result, RuntimeError};
use crate::readiness::{vm_readiness, VmReadinessNotifier};
use crate::traits::{ContainerRuntime, DOCKER_RUNTIME_NAME, IGNITE_RUNTIME_NAME};
use crate::types::*;

/// Mock runtime backend for testing.
///
/// Containers live in memory. In VM-backed mode every start returns a
/// readiness handle; the matching notifier is kept until a test takes it
/// with [`MockRuntime::take_boot_notifier`].
pub struct MockRuntime {
    name: String,
    mgmt: MgmtNet,
    vm_backed: bool,
    containers: RwLock<HashMap<String, MockContainer>>,
    notifiers: Mutex<HashMap<String, VmReadinessNotifier>>,
}

struct MockContainer {
    name: String,
    image: String,
    state: MockState,
    execs: Vec<ExecCmd>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MockState {
    Created,
    Running,
}

impl MockState {
    fn as_str(&self) -> &'static str {
        match self {
            MockState::Created => "created",
            MockState::Running => "running",
        }
    }
}

impl MockRuntime {
    /// Create a plain (non-VM) mock runtime.
    pub fn new() -> Self {
        info!("Creating mock container runtime");
        Self {
            name: DOCKER_RUNTIME_NAME.to_string(),
            mgmt: MgmtNet {
                network: "clab".to_string(),
                ipv4_gw: "172.20.20.1".to_string(),
                ipv6_gw: "2001:172:20:20::1".to_string(),
            },
            vm_backed: false,
            containers: RwLock::new(HashMap::new()),
            notifiers: Mutex::new(HashMap::new()),
        }
    }

    /// Create a VM-backed mock runtime reporting the ignite runtime name.
    pub fn vm_backed() -> Self {
        Self {
            name: IGNITE_RUNTIME_NAME.to_string(),
            vm_backed: true,
            ..Self::new()
        }
    }

    /// Override the management gateways.
    pub fn with_mgmt(mut self, ipv4_gw: impl Into<String>, ipv6_gw: impl Into<String>) -> Self {
        self.mgmt.ipv4_gw = ipv4_gw.into();
        self.mgmt.ipv6_gw = ipv6_gw.into();
        self
    }

    /// Take the boot notifier of a started VM-backed container, by name.
    pub fn take_boot_notifier(&self, name: &str) -> Option<VmReadinessNotifier> {
        self.notifiers.lock().ok()?.remove(name)
    }

    /// Number of containers currently known to the runtime.
    pub fn container_count(&self) -> usize {
        self.containers.read().map(|c| c.len()).unwrap_or(0)
    }

    /// Commands executed in the named container, in order.
    pub fn executed(&self, name: &str) -> Vec<ExecCmd> {
        self.containers
            .read()
            .ok()
            .and_then(|c| c.values().find(|m| m.name == name).map(|m| m.execs.clone()))
            .unwrap_or_default()
    }
}

impl Default for MockRuntime {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<T>(_: T) -> RuntimeError {
    RuntimeError::Internal("Lock poisoned".to_string())
}

#[async_trait]
impl ContainerRuntime for MockRuntime {
    fn name(&self) -> &str {
        &self.name
    }

    fn mgmt(&self) -> MgmtNet {
        self.mgmt.clone()
    }

    #[instrument(skip(self, cfg), fields(container = %cfg.long_name))]
    async fn create_container(&self, cfg: &NodeConfig) -> Result<String> {
        if cfg.long_name.is_empty() {
            return Err(RuntimeError::InvalidConfig(
                "container name must not be empty".to_string(),
            ));
        }

        let mut containers = self.containers.write().map_err(poisoned)?;

        if containers.values().any(|c| c.name == cfg.long_name) {
            return Err(RuntimeError::CreateFailed(format!(
                "container {} already exists",
                cfg.long_name
            )));
        }

        let id = uuid::Uuid::new_v4().to_string();
        containers.insert(
            id.clone(),
            MockContainer {
                name: cfg.long_name.clone(),
                image: cfg.image.clone(),
                state: MockState::Created,
                execs: Vec::new(),
            },
        );

        info!(container_id = %id, "Mock container created");
        Ok(id)
    }

    #[instrument(skip(self, cfg), fields(container_id = %id))]
    async fn start_container(&self, id: &str, cfg: &NodeConfig) -> Result<StartOutcome> {
        let mut containers = self.containers.write().map_err(poisoned)?;

        let container = containers
            .get_mut(id)
            .ok_or_else(|| RuntimeError::ContainerNotFound(id.to_string()))?;

        if container.state == MockState::Running {
            return Err(RuntimeError::StartFailed(format!(
                "container {} is already running",
                cfg.long_name
            )));
        }
        container.state = MockState::Running;

        if !self.vm_backed {
            info!("Mock container started");
            return Ok(StartOutcome::Started);
        }

        let (notifier, readiness) = vm_readiness();
        self.notifiers
            .lock()
            .map_err(poisoned)?
            .insert(container.name.clone(), notifier);

        info!("Mock VM-backed container started, boot pending");
        Ok(StartOutcome::VmBacked(readiness))
    }

    async fn exec(&self, id: &str, cmd: &ExecCmd) -> Result<ExecResult> {
        let mut containers = self.containers.write().map_err(poisoned)?;

        let container = containers
            .get_mut(id)
            .ok_or_else(|| RuntimeError::ContainerNotFound(id.to_string()))?;

        if container.state != MockState::Running {
            return Err(RuntimeError::ExecFailed(format!(
                "container {} is not running",
                container.name
            )));
        }

        container.execs.push(cmd.clone());
        debug!(container = %container.name, cmd = ?cmd.cmd, "Mock exec");

        Ok(ExecResult {
            cmd: cmd.cmd.clone(),
            return_code: 0,
            stdout: String::new(),
            stderr: String::new(),
        })
    }

    #[instrument(skip(self), fields(container_id = %id))]
    async fn delete_container(&self, id: &str) -> Result<()> {
        let mut containers = self.containers.write().map_err(poisoned)?;

        let container = containers
            .remove(id)
            .ok_or_else(|| RuntimeError::ContainerNotFound(id.to_string()))?;

        self.notifiers.lock().map_err(poisoned)?.remove(&container.name);

        info!(container = %container.name, "Mock container deleted");
        Ok(())
    }

    async fn list_containers(&self, name: Option<&str>) -> Result<Vec<GenericContainer>> {
        let containers = self.containers.read().map_err(poisoned)?;

        let result: Vec<GenericContainer> = containers
            .iter()
            .filter(|(_, c)| name.map_or(true, |n| c.name == n))
            .map(|(id, c)| GenericContainer {
                id: id.clone(),
                names: vec![c.name.clone()],
                image: c.image.clone(),
                state: c.state.as_str().to_string(),
                labels: HashMap::new(),
            })
            .collect();

        debug!(count = result.len(), "Listed containers");
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(name: &str) -> NodeConfig {
        NodeConfig::new(name, format!("clab-test-{}", name), "linux").with_image("alpine:3")
    }

    #[tokio::test]
    async fn test_container_lifecycle() {
        let runtime = MockRuntime::new();
        let cfg = cfg("n1");

        let id = runtime.create_container(&cfg).await.unwrap();
        let listed = runtime.list_containers(Some("clab-test-n1")).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].state, "created");

        let outcome = runtime.start_container(&id, &cfg).await.unwrap();
        assert!(outcome.into_readiness().is_none());

        runtime.exec(&id, &ExecCmd::from_string("ip link")).await.unwrap();
        assert_eq!(runtime.executed("clab-test-n1").len(), 1);

        runtime.delete_container(&id).await.unwrap();
        assert_eq!(runtime.container_count(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_create_rejected() {
        let runtime = MockRuntime::new();
        runtime.create_container(&cfg("n1")).await.unwrap();

        let err = runtime.create_container(&cfg("n1")).await.unwrap_err();
        assert!(matches!(err, RuntimeError::CreateFailed(_)));
    }

    #[tokio::test]
    async fn test_vm_backed_start_returns_readiness() {
        let runtime = MockRuntime::vm_backed();
        assert_eq!(runtime.name(), IGNITE_RUNTIME_NAME);

        let cfg = cfg("vm1");
        let id = runtime.create_container(&cfg).await.unwrap();
        let readiness = runtime
            .start_container(&id, &cfg)
            .await
            .unwrap()
            .into_readiness()
            .expect("VM-backed start must carry a readiness handle");

        runtime.take_boot_notifier("clab-test-vm1").unwrap().boot_finished();
        readiness.wait().await.unwrap();
    }
}
