//! Minimal lifecycle driver.
//!
//! Runs the hook sequence for one node, or one phase across many nodes
//! concurrently. Deciding whether a failed node aborts the topology is left
//! to the caller.

use std::fmt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use labnode_runtime::NodeConfig;

use crate::error::{NodeError, Result};
use crate::node::{Node, NodeOption, PeerConfigs, PreDeployParams};
use crate::registry::NodeRegistry;

/// One step of the node lifecycle, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Interface naming and host preconditions
    CheckDeploymentConditions,
    PullImage,
    PreDeploy,
    Deploy,
    PostDeploy,
    SaveConfig,
    Delete,
}

impl Phase {
    /// Phases run by [`deploy_node`].
    pub const DEPLOY: [Phase; 5] = [
        Phase::CheckDeploymentConditions,
        Phase::PullImage,
        Phase::PreDeploy,
        Phase::Deploy,
        Phase::PostDeploy,
    ];
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::CheckDeploymentConditions => "check-deployment-conditions",
            Phase::PullImage => "pull-image",
            Phase::PreDeploy => "pre-deploy",
            Phase::Deploy => "deploy",
            Phase::PostDeploy => "post-deploy",
            Phase::SaveConfig => "save-config",
            Phase::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// Instantiate and initialize a node of `cfg.kind`.
///
/// The kind's default credentials are handed to the node ahead of `opts`.
pub fn init_node(
    registry: &NodeRegistry,
    cfg: NodeConfig,
    opts: Vec<NodeOption>,
) -> Result<Box<dyn Node>> {
    let entry = registry
        .lookup(&cfg.kind)
        .ok_or_else(|| NodeError::UnknownKind(cfg.kind.clone()))?;

    let mut all_opts = Vec::with_capacity(opts.len() + 1);
    if let Some(creds) = entry.credentials() {
        all_opts.push(NodeOption::Credentials(creds.clone()));
    }
    all_opts.extend(opts);

    let mut node = entry.new_node();
    node.init(cfg, all_opts)?;
    debug!(node = %node.config().short_name, kind = %node.config().kind, "Node initialized");
    Ok(node)
}

/// Snapshot of every node's configuration keyed by short name.
pub fn peer_configs(nodes: &[Box<dyn Node>]) -> PeerConfigs {
    nodes
        .iter()
        .map(|n| (n.config().short_name.clone(), n.config().clone()))
        .collect()
}

/// Run a single phase on one node.
pub async fn run_hook(
    node: &mut dyn Node,
    phase: Phase,
    ctx: &CancellationToken,
    params: &PreDeployParams,
    peers: &PeerConfigs,
) -> Result<()> {
    if ctx.is_cancelled() {
        return Err(NodeError::Cancelled(node.config().short_name.clone()));
    }

    match phase {
        Phase::CheckDeploymentConditions => {
            node.check_interface_name()?;
            node.check_deployment_conditions(ctx).await
        }
        Phase::PullImage => node.pull_image(ctx).await,
        Phase::PreDeploy => node.pre_deploy(ctx, params).await,
        Phase::Deploy => node.deploy(ctx).await,
        Phase::PostDeploy => node.post_deploy(ctx, peers).await,
        Phase::SaveConfig => node.save_config(ctx).await,
        Phase::Delete => node.delete(ctx).await,
    }
}

/// Drive an initialized node from deployment checks through `post_deploy`.
///
/// Stops at the first failing hook.
#[instrument(skip_all, fields(lab = %params.lab_name, node = %node.config().short_name))]
pub async fn deploy_node(
    node: &mut dyn Node,
    ctx: &CancellationToken,
    params: &PreDeployParams,
    peers: &PeerConfigs,
) -> Result<()> {
    for phase in Phase::DEPLOY {
        debug!(%phase, "Running lifecycle hook");
        if let Err(e) = run_hook(node, phase, ctx, params, peers).await {
            warn!(%phase, error = %e, "Lifecycle hook failed");
            return Err(e);
        }
    }

    info!("Node deployed");
    Ok(())
}

/// Run `phase` on every node concurrently.
///
/// Returns `(short name, result)` per node in input order.
pub async fn run_phase(
    nodes: &mut [Box<dyn Node>],
    phase: Phase,
    ctx: &CancellationToken,
    params: &PreDeployParams,
    peers: &PeerConfigs,
) -> Vec<(String, Result<()>)> {
    info!(lab = %params.lab_name, %phase, nodes = nodes.len(), "Running lifecycle phase");

    let tasks = nodes.iter_mut().map(|node| async move {
        let name = node.config().short_name.clone();
        let res = run_hook(node.as_mut(), phase, ctx, params, peers).await;
        (name, res)
    });

    let results = futures::future::join_all(tasks).await;

    let failed = results.iter().filter(|(_, r)| r.is_err()).count();
    if failed > 0 {
        warn!(%phase, failed, "Lifecycle phase finished with failures");
    }
    results
}
