//! Cisco XRd kind.
//!
//! XRd needs a generated first-boot configuration, a persistent
//! `/xr-storage` directory and an `XR_INTERFACES` variable that maps Linux
//! interface names (`Gi0-0-0-0`) to XR names (`Gi0/0/0/0`).

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use labnode_runtime::{Endpoint, ExecCmd, ExecResult, GenericContainer, NodeConfig};

use crate::credentials::Credentials;
use crate::default_node::DefaultNode;
use crate::error::{NodeError, Result};
use crate::node::{cancellable, Node, NodeOption, PreDeployParams, IMAGE_KEY};
use crate::registry::NodeRegistry;
use crate::utils::merge_string_maps;

const KIND_NAMES: &[&str] = &["xrd", "cisco_xrd"];

const DEFAULT_USERNAME: &str = "clab";
const DEFAULT_PASSWORD: &str = "clab@123";

/// Platform identifier handed to the configuration saver.
const SCRAPLI_PLATFORM_NAME: &str = "cisco_iosxr";

const FIRST_BOOT_CFG: &str = "first-boot.cfg";
const XR_STORAGE: &str = "xr-storage";
const INTERFACE_PREFIX: &str = "Gi0-0-0-";

/// Default first-boot configuration.
const CFG_TEMPLATE: &str = include_str!("xrd.cfg");

pub(super) fn register(registry: &mut NodeRegistry) -> Result<()> {
    registry.register(
        KIND_NAMES,
        || Box::new(Xrd::default()),
        Some(Credentials::new(DEFAULT_USERNAME, DEFAULT_PASSWORD)),
    )
}

fn xrd_env() -> HashMap<String, String> {
    HashMap::from([
        (
            "XR_FIRST_BOOT_CONFIG".to_string(),
            "/etc/xrd/first-boot.cfg".to_string(),
        ),
        (
            "XR_MGMT_INTERFACES".to_string(),
            "linux:eth0,xr_name=Mg0/RP0/CPU0/0,chksum,snoop_v4,snoop_v6".to_string(),
        ),
    ])
}

/// Cisco XRd router node.
#[derive(Default)]
pub struct Xrd {
    base: DefaultNode,
}

impl Xrd {
    fn lab_dir(&self) -> PathBuf {
        PathBuf::from(&self.base.cfg.lab_dir)
    }

    /// Populate `XR_INTERFACES` and merge the XRd env under the user's env.
    fn gen_interfaces_env(&mut self) {
        let interfaces = HashMap::from([(
            "XR_INTERFACES".to_string(),
            interfaces_env(&self.base.cfg.endpoints),
        )]);

        let cfg = &mut self.base.cfg;
        cfg.env = merge_string_maps(&[&xrd_env(), &interfaces, &cfg.env]);
    }

    /// Create `xr-storage` and render `first-boot.cfg`.
    #[instrument(skip(self, ctx), fields(node = %self.base.cfg.short_name))]
    async fn create_xrd_files(&mut self, ctx: &CancellationToken) -> Result<()> {
        let lab_dir = self.lab_dir();
        let mode = self.base.settings().lab_dir_mode;
        let name = self.base.cfg.short_name.clone();

        let storage = lab_dir.join(XR_STORAGE);
        cancellable(ctx, &name, self.base.host().create_directory(&storage, mode)).await?;

        let first_boot = lab_dir.join(FIRST_BOOT_CFG);
        self.base.cfg.res_startup_config = first_boot.to_string_lossy().to_string();

        // The management network exists before nodes are launched, so the
        // gateway is known here and the template can route through it.
        let mgmt = self.base.runtime()?.mgmt();
        debug!(
            network = %mgmt.network,
            ipv4_gw = %mgmt.ipv4_gw,
            ipv6_gw = %mgmt.ipv6_gw,
            "Using management network gateways"
        );
        self.base.cfg.mgmt_ipv4_gateway = mgmt.ipv4_gw;
        self.base.cfg.mgmt_ipv6_gateway = mgmt.ipv6_gw;

        let template = if self.base.cfg.startup_config.is_empty() {
            CFG_TEMPLATE.to_string()
        } else {
            let path = Path::new(&self.base.cfg.startup_config);
            debug!(startup_config = %path.display(), "Using user-provided startup config");
            tokio::fs::read_to_string(path).await?
        };

        self.base.generate_config(&first_boot, &template)
    }
}

/// `XR_INTERFACES` value for the given endpoints.
fn interfaces_env(endpoints: &[Endpoint]) -> String {
    endpoints
        .iter()
        .map(|ep| {
            let xr_name = ep.endpoint_name.replace('-', "/");
            format!("linux:{},xr_name={};", ep.endpoint_name, xr_name)
        })
        .collect()
}

fn is_valid_interface_name(name: &str) -> bool {
    name.strip_prefix(INTERFACE_PREFIX)
        .map_or(false, |n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
}

#[async_trait]
impl Node for Xrd {
    fn base(&self) -> &DefaultNode {
        &self.base
    }

    fn base_mut(&mut self) -> &mut DefaultNode {
        &mut self.base
    }

    fn init(&mut self, cfg: NodeConfig, opts: Vec<NodeOption>) -> Result<()> {
        self.base = DefaultNode::new(cfg, opts);

        let lab_dir = self.lab_dir();
        self.base.cfg.binds.extend([
            // first-boot config file
            format!("{}:/etc/xrd/first-boot.cfg", lab_dir.join(FIRST_BOOT_CFG).display()),
            // persist data by mounting /xr-storage
            format!("{}:/xr-storage", lab_dir.join(XR_STORAGE).display()),
        ]);

        Ok(())
    }

    async fn pre_deploy(&mut self, ctx: &CancellationToken, _params: &PreDeployParams) -> Result<()> {
        self.gen_interfaces_env();

        let lab_dir = self.lab_dir();
        let mode = self.base.settings().lab_dir_mode;
        cancellable(
            ctx,
            &self.base.cfg.short_name,
            self.base.host().create_directory(&lab_dir, mode),
        )
        .await?;

        self.create_xrd_files(ctx).await
    }

    async fn deploy(&mut self, ctx: &CancellationToken) -> Result<()> {
        self.base.create_and_start(ctx).await?;
        Ok(())
    }

    #[instrument(skip(self, ctx), fields(node = %self.base.cfg.short_name))]
    async fn save_config(&self, ctx: &CancellationToken) -> Result<()> {
        let cfg = &self.base.cfg;
        let saver = self.base.config_saver()?;
        let (username, password) = match self.base.credentials() {
            Some(creds) => (creds.username(), creds.password()),
            None => (DEFAULT_USERNAME, DEFAULT_PASSWORD),
        };

        cancellable(
            ctx,
            &cfg.short_name,
            saver.save_running_config(&cfg.long_name, username, password, SCRAPLI_PLATFORM_NAME),
        )
        .await?;

        info!(
            "saved {} running configuration to startup configuration file",
            cfg.short_name
        );
        Ok(())
    }

    async fn delete(&mut self, ctx: &CancellationToken) -> Result<()> {
        self.base.delete_containers(ctx).await
    }

    fn get_images(&self) -> HashMap<String, String> {
        HashMap::from([(IMAGE_KEY.to_string(), self.base.cfg.image.clone())])
    }

    /// Every endpoint must be named `Gi0-0-0-X` where X is the interface number.
    fn check_interface_name(&self) -> Result<()> {
        match self
            .base
            .cfg
            .endpoints
            .iter()
            .find(|e| !is_valid_interface_name(&e.endpoint_name))
        {
            Some(e) => Err(NodeError::InvalidInterfaceName {
                kind: "cisco XRd".to_string(),
                name: e.endpoint_name.clone(),
                hint: "XRd interfaces should be named as Gi0-0-0-X where X is the interface number",
            }),
            None => Ok(()),
        }
    }

    async fn run_exec(&self, ctx: &CancellationToken, cmd: &ExecCmd) -> Result<ExecResult> {
        self.base.exec_in_container(ctx, cmd).await
    }

    async fn get_containers(&self, ctx: &CancellationToken) -> Result<Vec<GenericContainer>> {
        self.base.list_own_containers(ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MockHost;
    use crate::netconf::MockConfigSaver;
    use labnode_runtime::MockRuntime;
    use std::sync::Arc;

    fn xrd(cfg: NodeConfig, opts: Vec<NodeOption>) -> Xrd {
        let mut node = Xrd::default();
        node.init(cfg, opts).unwrap();
        node
    }

    fn cfg(lab_dir: &Path) -> NodeConfig {
        NodeConfig::new("xrd1", "clab-lab-xrd1", "xrd")
            .with_image("ios-xr/xrd-control-plane:7.8.1")
            .with_lab_dir(lab_dir.to_string_lossy())
            .with_endpoint("Gi0-0-0-0")
            .with_endpoint("Gi0-0-0-1")
    }

    #[test]
    fn test_interfaces_env() {
        let eps = vec![Endpoint::new("Gi0-0-0-0"), Endpoint::new("Gi0-0-0-12")];
        let env = interfaces_env(&eps);
        assert_eq!(
            env,
            "linux:Gi0-0-0-0,xr_name=Gi0/0/0/0;linux:Gi0-0-0-12,xr_name=Gi0/0/0/12;"
        );
        assert_eq!(interfaces_env(&eps), env);
        assert_eq!(interfaces_env(&[]), "");
    }

    #[test]
    fn test_interface_name_pattern() {
        for ok in ["Gi0-0-0-0", "Gi0-0-0-7", "Gi0-0-0-123"] {
            assert!(is_valid_interface_name(ok), "{ok}");
        }
        for bad in ["eth0", "Gi0-0-1-3", "Gi0-0-0-", "Gi0-0-0-1a", "Gi0/0/0/0", "xGi0-0-0-1"] {
            assert!(!is_valid_interface_name(bad), "{bad}");
        }
    }

    #[test]
    fn test_check_interface_name_names_offender() {
        let dir = tempfile::tempdir().unwrap();
        let node = xrd(cfg(dir.path()).with_endpoint("eth3"), vec![]);

        let err = node.check_interface_name().unwrap_err();
        assert!(matches!(err, NodeError::InvalidInterfaceName { ref name, .. } if name == "eth3"));
        assert!(err.to_string().contains("\"eth3\""));

        xrd(cfg(dir.path()), vec![]).check_interface_name().unwrap();
    }

    #[test]
    fn test_init_adds_binds() {
        let node = xrd(cfg(Path::new("/lab/xrd1")), vec![]);
        assert_eq!(
            node.config().binds,
            vec![
                "/lab/xrd1/first-boot.cfg:/etc/xrd/first-boot.cfg".to_string(),
                "/lab/xrd1/xr-storage:/xr-storage".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_pre_deploy_generates_files() {
        let ctx = CancellationToken::new();
        let dir = tempfile::tempdir().unwrap();
        let lab_dir = dir.path().join("xrd1");
        let runtime = Arc::new(MockRuntime::new().with_mgmt("10.0.0.1", "fd00::1"));
        let host = Arc::new(MockHost::new());

        let mut node = xrd(
            cfg(&lab_dir).with_env("XR_MGMT_INTERFACES", "linux:eth0,xr_name=Mg0/RP0/CPU0/0"),
            vec![NodeOption::Runtime(runtime), NodeOption::Host(host.clone())],
        );
        node.pre_deploy(&ctx, &PreDeployParams::default()).await.unwrap();

        let env = &node.config().env;
        assert_eq!(env["XR_FIRST_BOOT_CONFIG"], "/etc/xrd/first-boot.cfg");
        // User-supplied values win over the XRd defaults.
        assert_eq!(env["XR_MGMT_INTERFACES"], "linux:eth0,xr_name=Mg0/RP0/CPU0/0");
        assert!(env["XR_INTERFACES"].contains("linux:Gi0-0-0-1,xr_name=Gi0/0/0/1;"));

        assert!(lab_dir.join(XR_STORAGE).is_dir());
        let dirs = host.directories();
        assert_eq!(dirs[0], (lab_dir.clone(), 0o777));

        let first_boot = std::fs::read_to_string(lab_dir.join(FIRST_BOOT_CFG)).unwrap();
        assert!(first_boot.contains("hostname xrd1"));
        assert!(first_boot.contains("0.0.0.0/0 MgmtEth0/RP0/CPU0/0 10.0.0.1"));
        assert!(first_boot.contains("::/0 MgmtEth0/RP0/CPU0/0 fd00::1"));
        assert_eq!(node.config().mgmt_ipv4_gateway, "10.0.0.1");
        assert_eq!(
            node.config().res_startup_config,
            lab_dir.join(FIRST_BOOT_CFG).to_string_lossy()
        );

        // Re-running against the existing lab directory is fine.
        node.pre_deploy(&ctx, &PreDeployParams::default()).await.unwrap();
    }

    #[tokio::test]
    async fn test_pre_deploy_uses_user_startup_config() {
        let ctx = CancellationToken::new();
        let dir = tempfile::tempdir().unwrap();
        let startup = dir.path().join("r1.cfg");
        std::fs::write(&startup, "hostname {{ .ShortName }}-custom\n! gw {{ .MgmtIPv4Gateway }}\n").unwrap();

        let mut node = xrd(
            cfg(&dir.path().join("xrd1")).with_startup_config(startup.to_string_lossy()),
            vec![
                NodeOption::Runtime(Arc::new(MockRuntime::new())),
                NodeOption::Host(Arc::new(MockHost::new())),
            ],
        );
        node.pre_deploy(&ctx, &PreDeployParams::default()).await.unwrap();

        let first_boot =
            std::fs::read_to_string(dir.path().join("xrd1").join(FIRST_BOOT_CFG)).unwrap();
        assert_eq!(first_boot, "hostname xrd1-custom\n! gw 172.20.20.1\n");
    }

    #[tokio::test]
    async fn test_pre_deploy_missing_startup_config() {
        let ctx = CancellationToken::new();
        let dir = tempfile::tempdir().unwrap();

        let mut node = xrd(
            cfg(dir.path()).with_startup_config("/nonexistent/r1.cfg"),
            vec![
                NodeOption::Runtime(Arc::new(MockRuntime::new())),
                NodeOption::Host(Arc::new(MockHost::new())),
            ],
        );

        let err = node.pre_deploy(&ctx, &PreDeployParams::default()).await.unwrap_err();
        assert!(matches!(err, NodeError::Io(ref e) if e.kind() == std::io::ErrorKind::NotFound));
    }

    #[tokio::test]
    async fn test_save_config_uses_kind_credentials() {
        let ctx = CancellationToken::new();
        let saver = Arc::new(MockConfigSaver::new());
        let node = xrd(
            cfg(Path::new("/lab/xrd1")),
            vec![
                NodeOption::ConfigSaver(saver.clone()),
                NodeOption::Credentials(Arc::new(Credentials::new("admin", "s3cret"))),
            ],
        );

        node.save_config(&ctx).await.unwrap();

        let requests = saver.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].address, "clab-lab-xrd1");
        assert_eq!(requests[0].username, "admin");
        assert_eq!(requests[0].password, "s3cret");
        assert_eq!(requests[0].platform, "cisco_iosxr");
    }

    #[tokio::test]
    async fn test_save_config_failure_surfaced() {
        let ctx = CancellationToken::new();
        let node = xrd(
            cfg(Path::new("/lab/xrd1")),
            vec![NodeOption::ConfigSaver(Arc::new(MockConfigSaver::failing()))],
        );

        let err = node.save_config(&ctx).await.unwrap_err();
        assert!(matches!(err, NodeError::SaveConfig { .. }));
    }
}
