//! The lifecycle contract every node kind implements.

use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use labnode_runtime::{ContainerRuntime, ExecCmd, ExecResult, GenericContainer, NodeConfig};

use crate::credentials::Credentials;
use crate::default_node::DefaultNode;
use crate::error::{NodeError, Result};
use crate::host::HostOps;
use crate::netconf::ConfigSaver;
use crate::settings::NodeSettings;

/// Key of the base image in [`Node::get_images`].
pub const IMAGE_KEY: &str = "image";
/// Key of the kernel image in [`Node::get_images`].
pub const KERNEL_KEY: &str = "kernel";
/// Key of the sandbox image in [`Node::get_images`].
pub const SANDBOX_KEY: &str = "sandbox";

/// Snapshot of every node's configuration in the topology, keyed by short name.
pub type PeerConfigs = HashMap<String, NodeConfig>;

/// Collaborators and overrides applied when a node is initialized.
pub enum NodeOption {
    /// Container runtime that creates the node's resource.
    Runtime(Arc<dyn ContainerRuntime>),
    /// Host operations; defaults to the local system.
    Host(Arc<dyn HostOps>),
    /// Subsystem used to persist running configuration.
    ConfigSaver(Arc<dyn ConfigSaver>),
    /// Credentials from the kind's registry entry.
    Credentials(Arc<Credentials>),
    /// Host-level settings.
    Settings(NodeSettings),
}

/// Lab-wide values handed to [`Node::pre_deploy`].
#[derive(Debug, Clone, Default)]
pub struct PreDeployParams {
    /// Lab name
    pub lab_name: String,
}

impl PreDeployParams {
    pub fn new(lab_name: impl Into<String>) -> Self {
        Self {
            lab_name: lab_name.into(),
        }
    }
}

/// Uniform lifecycle contract for all node kinds.
///
/// Hooks are invoked in order: `init`, `check_deployment_conditions`,
/// `pull_image`, `pre_deploy`, `deploy`, `post_deploy`, and later
/// `save_config`. A hook is never invoked if an earlier one failed.
///
/// Provided methods are the default node behaviour. Kinds override only the
/// hooks where they diverge and reach shared state through [`Node::base`].
#[async_trait]
pub trait Node: Send + Sync {
    /// Shared base state.
    fn base(&self) -> &DefaultNode;

    /// Mutable shared base state.
    fn base_mut(&mut self) -> &mut DefaultNode;

    /// Populate the node from topology input plus kind-specific defaults.
    fn init(&mut self, cfg: NodeConfig, opts: Vec<NodeOption>) -> Result<()>;

    fn config(&self) -> &NodeConfig {
        &self.base().cfg
    }

    fn config_mut(&mut self) -> &mut NodeConfig {
        &mut self.base_mut().cfg
    }

    /// Validate host preconditions. Defaults to generic host requirements.
    async fn check_deployment_conditions(&self, ctx: &CancellationToken) -> Result<()> {
        self.base().verify_host_requirements(ctx).await
    }

    async fn pull_image(&self, _ctx: &CancellationToken) -> Result<()> {
        Ok(())
    }

    /// Prepare on-disk artifacts. Must be safe to re-run.
    async fn pre_deploy(&mut self, _ctx: &CancellationToken, _params: &PreDeployParams) -> Result<()> {
        Ok(())
    }

    async fn deploy(&mut self, _ctx: &CancellationToken) -> Result<()> {
        Ok(())
    }

    /// Actions that need the resource running. May block.
    async fn post_deploy(&mut self, _ctx: &CancellationToken, _peers: &PeerConfigs) -> Result<()> {
        Ok(())
    }

    async fn save_config(&self, _ctx: &CancellationToken) -> Result<()> {
        Ok(())
    }

    async fn delete(&mut self, _ctx: &CancellationToken) -> Result<()> {
        Ok(())
    }

    /// Images the node needs, keyed by role.
    fn get_images(&self) -> HashMap<String, String> {
        HashMap::new()
    }

    fn check_interface_name(&self) -> Result<()> {
        Ok(())
    }

    async fn run_exec(&self, _ctx: &CancellationToken, _cmd: &ExecCmd) -> Result<ExecResult> {
        let kind = self.config().kind.clone();
        warn!(kind = %kind, "Exec operation is not implemented for this kind");
        Err(NodeError::ExecNotSupported { kind })
    }

    async fn update_config_with_runtime_info(&mut self, _ctx: &CancellationToken) -> Result<()> {
        Ok(())
    }

    async fn get_containers(&self, _ctx: &CancellationToken) -> Result<Vec<GenericContainer>> {
        Ok(Vec::new())
    }

    fn delete_netns_symlink(&self) -> Result<()> {
        self.base().delete_netns_symlink()
    }
}

/// Run `fut`, giving up with [`NodeError::Cancelled`] once `ctx` is cancelled.
pub(crate) async fn cancellable<T, F>(ctx: &CancellationToken, node: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        res = fut => res,
        _ = ctx.cancelled() => Err(NodeError::Cancelled(node.to_string())),
    }
}
