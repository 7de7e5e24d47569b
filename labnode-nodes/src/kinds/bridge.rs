//! Bridge kind: a Linux bridge that already exists on the host.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use labnode_runtime::{GenericContainer, NodeConfig};

use crate::default_node::DefaultNode;
use crate::error::{NodeError, Result};
use crate::node::{cancellable, Node, NodeOption, PeerConfigs};
use crate::registry::NodeRegistry;

const KIND_NAMES: &[&str] = &["bridge"];

pub(super) fn register(registry: &mut NodeRegistry) -> Result<()> {
    registry.register(KIND_NAMES, || Box::new(Bridge::default()), None)
}

/// Host bridge node. Lives in the root namespace and owns no resource.
#[derive(Default)]
pub struct Bridge {
    base: DefaultNode,
}

impl Bridge {
    fn list_rules_args(&self) -> Vec<String> {
        let wait = self.base.settings().iptables_wait_secs.to_string();
        ["-vL", "FORWARD", "-w", wait.as_str()]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn allow_rule_args(&self) -> Vec<String> {
        let wait = self.base.settings().iptables_wait_secs.to_string();
        let name = self.base.cfg.short_name.as_str();
        ["-I", "FORWARD", "-i", name, "-j", "ACCEPT", "-w", wait.as_str()]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    /// Make sure traffic crossing the bridge is allowed by the FORWARD chain.
    ///
    /// An existing ACCEPT rule for the bridge is reused; the rule is never
    /// inserted twice.
    #[instrument(skip(self, ctx), fields(bridge = %self.base.cfg.short_name))]
    async fn install_fwd_rule(&self, ctx: &CancellationToken) -> Result<()> {
        let name = &self.base.cfg.short_name;
        let host = self.base.host();

        let list_args = self.list_rules_args();
        let listing = cancellable(ctx, name, host.run_iptables(&list_args)).await;

        let (rules, list_err) = match listing {
            Ok(out) if out.success => (out.stdout, None),
            Ok(out) => {
                let err = NodeError::Command {
                    command: format!("iptables {}", list_args.join(" ")),
                    reason: format!("failed to add iptables forwarding rule for bridge {:?}", name),
                    output: out.combined(),
                };
                (out.stdout, Some(err))
            }
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => (String::new(), Some(e)),
        };

        if has_accept_rule(&rules, name) {
            // The rule is what matters; a listing error is moot once it is found.
            if let Some(err) = list_err {
                warn!(error = %err, "iptables listing reported an error, rule already present");
            }
            debug!("Found iptables forwarding rule targeting the bridge, skipping creation");
            return Ok(());
        }
        if let Some(err) = list_err {
            return Err(err);
        }

        let allow_args = self.allow_rule_args();
        debug!("Installing iptables forwarding rule for bridge");

        let out = cancellable(ctx, name, host.run_iptables(&allow_args)).await?;
        debug!(output = %out.combined(), "iptables install output");

        if !out.success {
            warn!(output = %out.combined(), "iptables install failed");
            return Err(NodeError::Command {
                command: format!("iptables {}", allow_args.join(" ")),
                reason: "unable to create iptables rules".to_string(),
                output: out.combined(),
            });
        }

        Ok(())
    }
}

/// True if a line of `rules` has `ACCEPT`, at least one more character, then `bridge`.
fn has_accept_rule(rules: &str, bridge: &str) -> bool {
    rules.lines().any(|line| match line.find("ACCEPT") {
        Some(i) => {
            let mut rest = line[i + "ACCEPT".len()..].chars();
            rest.next().is_some() && rest.as_str().contains(bridge)
        }
        None => false,
    })
}

#[async_trait]
impl Node for Bridge {
    fn base(&self) -> &DefaultNode {
        &self.base
    }

    fn base_mut(&mut self) -> &mut DefaultNode {
        &mut self.base
    }

    fn init(&mut self, cfg: NodeConfig, opts: Vec<NodeOption>) -> Result<()> {
        self.base = DefaultNode::new(cfg, opts);

        // Bridges are never created here, so their existence is implied.
        self.base.cfg.deployment_status = "created".to_string();
        self.base.cfg.is_root_namespace_based = true;
        Ok(())
    }

    async fn check_deployment_conditions(&self, ctx: &CancellationToken) -> Result<()> {
        self.base.verify_host_requirements(ctx).await?;

        let name = &self.base.cfg.short_name;
        cancellable(ctx, name, self.base.host().bridge_by_name(name)).await
    }

    async fn pull_image(&self, _ctx: &CancellationToken) -> Result<()> {
        Ok(())
    }

    async fn deploy(&mut self, _ctx: &CancellationToken) -> Result<()> {
        Ok(())
    }

    async fn post_deploy(&mut self, ctx: &CancellationToken, _peers: &PeerConfigs) -> Result<()> {
        self.install_fwd_rule(ctx).await
    }

    async fn delete(&mut self, _ctx: &CancellationToken) -> Result<()> {
        Ok(())
    }

    fn get_images(&self) -> HashMap<String, String> {
        HashMap::new()
    }

    async fn update_config_with_runtime_info(&mut self, _ctx: &CancellationToken) -> Result<()> {
        Ok(())
    }

    async fn get_containers(&self, _ctx: &CancellationToken) -> Result<Vec<GenericContainer>> {
        Ok(Vec::new())
    }

    fn delete_netns_symlink(&self) -> Result<()> {
        Ok(())
    }
}
