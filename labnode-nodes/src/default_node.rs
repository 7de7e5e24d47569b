//! Shared base of every node kind.

use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use labnode_runtime::{ContainerRuntime, ExecCmd, ExecResult, GenericContainer, NodeConfig, StartOutcome};

use crate::credentials::Credentials;
use crate::error::{NodeError, Result};
use crate::host::{HostOps, SystemHost};
use crate::netconf::ConfigSaver;
use crate::node::{cancellable, NodeOption};
use crate::settings::NodeSettings;
use crate::template;

/// Configuration storage and collaborators common to all kinds.
pub struct DefaultNode {
    /// Node configuration, owned exclusively by this node
    pub cfg: NodeConfig,
    runtime: Option<Arc<dyn ContainerRuntime>>,
    host: Arc<dyn HostOps>,
    config_saver: Option<Arc<dyn ConfigSaver>>,
    credentials: Option<Arc<Credentials>>,
    settings: NodeSettings,
    container_id: Option<String>,
}

impl DefaultNode {
    /// Build the base from topology config and init options.
    ///
    /// Without a [`NodeOption::Host`] the local system is used, configured
    /// with whatever [`NodeOption::Settings`] were supplied.
    pub fn new(cfg: NodeConfig, opts: Vec<NodeOption>) -> Self {
        let mut runtime = None;
        let mut host = None;
        let mut config_saver = None;
        let mut credentials = None;
        let mut settings = NodeSettings::default();

        for opt in opts {
            match opt {
                NodeOption::Runtime(r) => runtime = Some(r),
                NodeOption::Host(h) => host = Some(h),
                NodeOption::ConfigSaver(s) => config_saver = Some(s),
                NodeOption::Credentials(c) => credentials = Some(c),
                NodeOption::Settings(s) => settings = s,
            }
        }

        let host = host.unwrap_or_else(|| Arc::new(SystemHost::new(settings.clone())));

        Self {
            cfg,
            runtime,
            host,
            config_saver,
            credentials,
            settings,
            container_id: None,
        }
    }

    /// The runtime supplied at init.
    pub fn runtime(&self) -> Result<&Arc<dyn ContainerRuntime>> {
        self.runtime
            .as_ref()
            .ok_or_else(|| NodeError::NoRuntime(self.cfg.short_name.clone()))
    }

    /// Runtime name, if a runtime is attached.
    pub fn runtime_name(&self) -> Option<&str> {
        self.runtime.as_ref().map(|r| r.name())
    }

    pub fn host(&self) -> &Arc<dyn HostOps> {
        &self.host
    }

    pub fn config_saver(&self) -> Result<&Arc<dyn ConfigSaver>> {
        self.config_saver.as_ref().ok_or_else(|| {
            NodeError::Config(format!(
                "node {} has no configuration saver attached",
                self.cfg.short_name
            ))
        })
    }

    /// Credentials from the registry entry, if the kind has any.
    pub fn credentials(&self) -> Option<&Arc<Credentials>> {
        self.credentials.as_ref()
    }

    pub fn settings(&self) -> &NodeSettings {
        &self.settings
    }

    /// ID of the container created by [`DefaultNode::create_and_start`].
    pub fn container_id(&self) -> Option<&str> {
        self.container_id.as_deref()
    }

    /// Check the generic host requirements of this node.
    pub async fn verify_host_requirements(&self, ctx: &CancellationToken) -> Result<()> {
        let req = &self.cfg.host_requirements;
        let name = &self.cfg.short_name;

        if req.virt_required
            && !cancellable(ctx, name, async { Ok(self.host.virtualization_supported().await) }).await?
        {
            return Err(NodeError::HostRequirements {
                node: self.cfg.short_name.clone(),
                reason: "hardware virtualization is not available on this host".to_string(),
            });
        }

        if req.min_vcpu == 0 {
            return Ok(());
        }

        let cpus = cancellable(ctx, name, self.host.cpu_count()).await?;
        if cpus < req.min_vcpu as usize {
            return Err(NodeError::HostRequirements {
                node: self.cfg.short_name.clone(),
                reason: format!("{} vCPUs required, host has {}", req.min_vcpu, cpus),
            });
        }

        Ok(())
    }

    /// Remove the named network namespace link of this node, if present.
    pub fn delete_netns_symlink(&self) -> Result<()> {
        if self.cfg.long_name.is_empty() {
            return Ok(());
        }

        let link = self.settings.netns_dir.join(&self.cfg.long_name);
        match std::fs::remove_file(&link) {
            Ok(()) => {
                debug!(link = %link.display(), "Removed netns symlink");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Render `template` against this node's config and write it to `dst`.
    #[instrument(skip(self, template), fields(node = %self.cfg.short_name, dst = %dst.display()))]
    pub fn generate_config(&self, dst: &Path, template: &str) -> Result<()> {
        let rendered = template::render(template, &self.cfg)?;
        std::fs::write(dst, rendered)?;
        info!("Generated startup configuration");
        Ok(())
    }

    /// Create and start the node's container through the runtime.
    #[instrument(skip(self, ctx), fields(node = %self.cfg.short_name))]
    pub async fn create_and_start(&mut self, ctx: &CancellationToken) -> Result<StartOutcome> {
        let runtime = Arc::clone(self.runtime()?);
        let name = self.cfg.short_name.clone();

        let id = cancellable(ctx, &name, async {
            Ok(runtime.create_container(&self.cfg).await?)
        })
        .await?;
        self.container_id = Some(id.clone());

        let outcome = cancellable(ctx, &name, async {
            Ok(runtime.start_container(&id, &self.cfg).await?)
        })
        .await?;

        self.cfg.deployment_status = "created".to_string();
        info!(container_id = %id, "Node container started");
        Ok(outcome)
    }

    /// Execute a command in the node's container.
    pub async fn exec_in_container(&self, ctx: &CancellationToken, cmd: &ExecCmd) -> Result<ExecResult> {
        let runtime = self.runtime()?;
        let id = self.resolve_container_id().await?;

        cancellable(ctx, &self.cfg.short_name, async {
            Ok(runtime.exec(&id, cmd).await?)
        })
        .await
    }

    /// Containers in the runtime named after this node.
    pub async fn list_own_containers(&self, ctx: &CancellationToken) -> Result<Vec<GenericContainer>> {
        let runtime = self.runtime()?;

        cancellable(ctx, &self.cfg.short_name, async {
            Ok(runtime.list_containers(Some(&self.cfg.long_name)).await?)
        })
        .await
    }

    /// Remove every container belonging to this node.
    #[instrument(skip(self, ctx), fields(node = %self.cfg.short_name))]
    pub async fn delete_containers(&mut self, ctx: &CancellationToken) -> Result<()> {
        let runtime = Arc::clone(self.runtime()?);

        let ids = match self.container_id.take() {
            Some(id) => vec![id],
            None => self
                .list_own_containers(ctx)
                .await?
                .into_iter()
                .map(|c| c.id)
                .collect(),
        };

        for id in ids {
            cancellable(ctx, &self.cfg.short_name, async {
                Ok(runtime.delete_container(&id).await?)
            })
            .await?;
            info!(container_id = %id, "Node container deleted");
        }

        Ok(())
    }

    async fn resolve_container_id(&self) -> Result<String> {
        if let Some(id) = &self.container_id {
            return Ok(id.clone());
        }

        let runtime = self.runtime()?;
        runtime
            .list_containers(Some(&self.cfg.long_name))
            .await?
            .into_iter()
            .next()
            .map(|c| c.id)
            .ok_or_else(|| {
                labnode_runtime::RuntimeError::ContainerNotFound(self.cfg.long_name.clone()).into()
            })
    }
}

impl Default for DefaultNode {
    fn default() -> Self {
        Self::new(NodeConfig::default(), Vec::new())
    }
}
