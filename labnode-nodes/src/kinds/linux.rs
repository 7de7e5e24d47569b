//! Linux kind: a generic container, possibly backed by a lightweight VM.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use labnode_runtime::{
    ExecCmd, ExecResult, GenericContainer, NodeConfig, VmReadiness, IGNITE_RUNTIME_NAME,
};

use crate::default_node::DefaultNode;
use crate::error::{NodeError, Result};
use crate::node::{cancellable, Node, NodeOption, PeerConfigs, IMAGE_KEY, KERNEL_KEY, SANDBOX_KEY};
use crate::registry::NodeRegistry;

const KIND_NAMES: &[&str] = &["linux"];

const IPV6_SYSCTL: &str = "net.ipv6.conf.all.disable_ipv6";

pub(super) fn register(registry: &mut NodeRegistry) -> Result<()> {
    registry.register(KIND_NAMES, || Box::new(Linux::default()), None)
}

/// Generic Linux container node.
#[derive(Default)]
pub struct Linux {
    base: DefaultNode,
    /// Boot signal of a VM-backed start, consumed by `post_deploy`
    readiness: Option<VmReadiness>,
}

#[async_trait]
impl Node for Linux {
    fn base(&self) -> &DefaultNode {
        &self.base
    }

    fn base_mut(&mut self) -> &mut DefaultNode {
        &mut self.base
    }

    fn init(&mut self, cfg: NodeConfig, opts: Vec<NodeOption>) -> Result<()> {
        self.base = DefaultNode::new(cfg, opts);

        // Host network mode is left alone: CI runners often lack IPv6 there.
        if self.base.cfg.network_mode != "host" {
            self.base
                .cfg
                .sysctls
                .insert(IPV6_SYSCTL.to_string(), "0".to_string());
        }

        Ok(())
    }

    async fn deploy(&mut self, ctx: &CancellationToken) -> Result<()> {
        let outcome = self.base.create_and_start(ctx).await?;
        self.readiness = outcome.into_readiness();
        Ok(())
    }

    #[instrument(skip(self, ctx, _peers), fields(node = %self.base.cfg.short_name))]
    async fn post_deploy(&mut self, ctx: &CancellationToken, _peers: &PeerConfigs) -> Result<()> {
        debug!("Running postdeploy actions for Linux node");
        let node = self.base.cfg.short_name.clone();
        cancellable(ctx, &node, self.base.host().disable_tx_offload(&self.base.cfg)).await?;

        let Some(readiness) = self.readiness.take() else {
            return Ok(());
        };

        info!("Waiting for VM to finish booting");
        tokio::select! {
            res = readiness.wait() => {
                res.map_err(|source| NodeError::Readiness { node, source })?;
            }
            _ = ctx.cancelled() => return Err(NodeError::Cancelled(node)),
        }

        info!("VM boot finished");
        Ok(())
    }

    async fn delete(&mut self, ctx: &CancellationToken) -> Result<()> {
        self.readiness = None;
        self.base.delete_containers(ctx).await
    }

    fn get_images(&self) -> HashMap<String, String> {
        let cfg = &self.base.cfg;
        let mut images = HashMap::from([(IMAGE_KEY.to_string(), cfg.image.clone())]);

        // The VM-backed runtime also boots a kernel and a sandbox image.
        if self.base.runtime_name() == Some(IGNITE_RUNTIME_NAME) {
            images.insert(KERNEL_KEY.to_string(), cfg.kernel.clone());
            images.insert(SANDBOX_KEY.to_string(), cfg.sandbox.clone());
        }

        images
    }

    /// Linux containers accept any interface name.
    fn check_interface_name(&self) -> Result<()> {
        Ok(())
    }

    async fn run_exec(&self, ctx: &CancellationToken, cmd: &ExecCmd) -> Result<ExecResult> {
        self.base.exec_in_container(ctx, cmd).await
    }

    async fn get_containers(&self, ctx: &CancellationToken) -> Result<Vec<GenericContainer>> {
        self.base.list_own_containers(ctx).await
    }
}
