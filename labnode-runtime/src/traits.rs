//! Core container runtime abstraction trait.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::*;

/// Name reported by the VM-backed (ignite) runtime.
pub const IGNITE_RUNTIME_NAME: &str = "ignite";

/// Name reported by the plain container runtime.
pub const DOCKER_RUNTIME_NAME: &str = "docker";

/// Container runtime consumed by node kinds.
///
/// Implementations create and start the resource backing a node. A VM-backed
/// runtime signals boot completion through the readiness handle carried by
/// [`StartOutcome::VmBacked`].
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Runtime name, used by nodes to branch on VM-backed behaviour.
    fn name(&self) -> &str;

    /// Management network details, including the gateway addresses.
    fn mgmt(&self) -> MgmtNet;

    /// Create a container for the node (does not start it).
    ///
    /// Returns the container ID on success.
    async fn create_container(&self, cfg: &NodeConfig) -> Result<String>;

    /// Start a previously created container.
    async fn start_container(&self, id: &str, cfg: &NodeConfig) -> Result<StartOutcome>;

    /// Execute a command inside a running container.
    async fn exec(&self, id: &str, cmd: &ExecCmd) -> Result<ExecResult>;

    /// Remove a container, stopping it first if needed.
    async fn delete_container(&self, id: &str) -> Result<()>;

    /// List containers, optionally filtered by exact name.
    async fn list_containers(&self, name: Option<&str>) -> Result<Vec<GenericContainer>>;
}
