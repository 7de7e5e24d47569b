//! Host-level operations used by node kinds.
//!
//! This module handles:
//! - Creating lab directories with explicit permission bits
//! - Looking up Linux bridges by name
//! - Running iptables for bridge forwarding rules
//! - Disabling TX checksum offload inside node namespaces

use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use sysinfo::System;
use tokio::process::Command;
use tracing::{debug, instrument};

use labnode_runtime::NodeConfig;

use crate::error::{NodeError, Result};
use crate::settings::NodeSettings;

/// Captured result of an external command.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// Command exited with status 0
    pub success: bool,
    /// Standard output
    pub stdout: String,
    /// Standard error
    pub stderr: String,
}

impl CommandOutput {
    /// Standard output followed by standard error.
    pub fn combined(&self) -> String {
        format!("{}{}", self.stdout, self.stderr)
    }
}

/// Host operations consumed by node kinds.
#[async_trait]
pub trait HostOps: Send + Sync {
    /// Create a directory (and parents) with the given permission bits.
    async fn create_directory(&self, path: &Path, mode: u32) -> Result<()>;

    /// Fail unless a bridge device with this name exists.
    async fn bridge_by_name(&self, name: &str) -> Result<()>;

    /// Run iptables with the given arguments.
    async fn run_iptables(&self, args: &[String]) -> Result<CommandOutput>;

    /// Disable TX checksum offload on the node's eth0.
    async fn disable_tx_offload(&self, cfg: &NodeConfig) -> Result<()>;

    /// Number of logical CPUs on the host.
    async fn cpu_count(&self) -> Result<usize>;

    /// Hardware virtualization is available.
    async fn virtualization_supported(&self) -> bool;
}

// =============================================================================
// SYSTEM HOST
// =============================================================================

/// Host operations backed by the local system.
#[derive(Debug, Clone, Default)]
pub struct SystemHost {
    settings: NodeSettings,
}

impl SystemHost {
    pub fn new(settings: NodeSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl HostOps for SystemHost {
    #[instrument(skip(self), fields(path = %path.display()))]
    async fn create_directory(&self, path: &Path, mode: u32) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        tokio::fs::create_dir_all(path).await?;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).await?;

        debug!(mode = format!("{:o}", mode), "Directory ready");
        Ok(())
    }

    async fn bridge_by_name(&self, name: &str) -> Result<()> {
        let bridge_dir = PathBuf::from("/sys/class/net").join(name).join("bridge");

        match tokio::fs::metadata(&bridge_dir).await {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => Err(NodeError::BridgeNotFound {
                name: name.to_string(),
                reason: "link exists but is not a bridge".to_string(),
            }),
            Err(e) => Err(NodeError::BridgeNotFound {
                name: name.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    async fn run_iptables(&self, args: &[String]) -> Result<CommandOutput> {
        let output = Command::new(&self.settings.iptables_bin)
            .args(args)
            .output()
            .await?;

        Ok(CommandOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }

    #[instrument(skip(self, cfg), fields(node = %cfg.short_name))]
    async fn disable_tx_offload(&self, cfg: &NodeConfig) -> Result<()> {
        // Host-mode and root-namespace nodes share the host's eth0.
        if cfg.network_mode == "host" || cfg.is_root_namespace_based {
            debug!("Skipping TX offload change outside a node namespace");
            return Ok(());
        }

        let args = [
            "netns", "exec", cfg.long_name.as_str(), "ethtool", "--offload", "eth0", "tx", "off",
        ];
        let output = Command::new("ip").args(args).output().await?;

        if !output.status.success() {
            return Err(NodeError::Command {
                command: format!("ip {}", args.join(" ")),
                reason: format!("failed to disable TX offload for node {}", cfg.short_name),
                output: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }

        debug!("TX checksum offload disabled on eth0");
        Ok(())
    }

    async fn cpu_count(&self) -> Result<usize> {
        let cpus = tokio::task::spawn_blocking(|| {
            let mut sys = System::new();
            sys.refresh_cpu_all();
            sys.cpus().len()
        })
        .await
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

        debug!(cpus, "Host CPU count");
        Ok(cpus)
    }

    async fn virtualization_supported(&self) -> bool {
        match tokio::fs::read_to_string("/proc/cpuinfo").await {
            Ok(info) => has_virt_flags(&info),
            Err(e) => {
                debug!(error = %e, "Unable to read /proc/cpuinfo");
                false
            }
        }
    }
}

/// True if any `flags` line of a cpuinfo dump lists `vmx` or `svm`.
fn has_virt_flags(cpuinfo: &str) -> bool {
    cpuinfo
        .lines()
        .filter(|l| l.starts_with("flags"))
        .any(|l| l.split_whitespace().any(|f| f == "vmx" || f == "svm"))
}

// =============================================================================
// MOCK HOST
// =============================================================================

/// In-memory host for tests.
///
/// Keeps a FORWARD chain that answers `-vL FORWARD` listings and `-I FORWARD`
/// insertions the way iptables prints them. Directories are created on the
/// real filesystem so generated files can be written under a temp dir.
pub struct MockHost {
    bridges: HashSet<String>,
    cpus: usize,
    virt: bool,
    fail_listing: bool,
    fail_insert: bool,
    forward_rules: Mutex<Vec<String>>,
    iptables_calls: Mutex<Vec<Vec<String>>>,
    directories: Mutex<Vec<(PathBuf, u32)>>,
    offload_disabled: Mutex<Vec<String>>,
}

impl MockHost {
    pub fn new() -> Self {
        Self {
            bridges: HashSet::new(),
            cpus: 4,
            virt: true,
            fail_listing: false,
            fail_insert: false,
            forward_rules: Mutex::new(Vec::new()),
            iptables_calls: Mutex::new(Vec::new()),
            directories: Mutex::new(Vec::new()),
            offload_disabled: Mutex::new(Vec::new()),
        }
    }

    /// Register a bridge device on the host.
    pub fn with_bridge(mut self, name: impl Into<String>) -> Self {
        self.bridges.insert(name.into());
        self
    }

    /// Set the reported CPU count and virtualization support.
    pub fn with_resources(mut self, cpus: usize, virt: bool) -> Self {
        self.cpus = cpus;
        self.virt = virt;
        self
    }

    /// Make rule listings exit non-zero (output is still printed).
    pub fn with_failing_listing(mut self) -> Self {
        self.fail_listing = true;
        self
    }

    /// Make rule insertions exit non-zero.
    pub fn with_failing_insert(mut self) -> Self {
        self.fail_insert = true;
        self
    }

    /// Pre-populate an ACCEPT rule for an input interface.
    pub fn with_accept_rule(self, iface: &str) -> Self {
        self.push_accept_rule(iface);
        self
    }

    fn push_accept_rule(&self, iface: &str) {
        if let Ok(mut rules) = self.forward_rules.lock() {
            rules.insert(
                0,
                format!(
                    "    0     0 ACCEPT     all  --  {:<6} any     anywhere             anywhere",
                    iface
                ),
            );
        }
    }

    /// Current FORWARD chain as printed by `iptables -vL FORWARD`.
    pub fn forward_listing(&self) -> String {
        let mut lines = vec![
            "Chain FORWARD (policy DROP 0 packets, 0 bytes)".to_string(),
            " pkts bytes target     prot opt in     out     source               destination"
                .to_string(),
        ];
        if let Ok(rules) = self.forward_rules.lock() {
            lines.extend(rules.iter().cloned());
        }
        lines.join("\n") + "\n"
    }

    /// Number of FORWARD rules that accept traffic from `iface`.
    pub fn accept_rule_count(&self, iface: &str) -> usize {
        self.forward_rules
            .lock()
            .map(|rules| {
                rules
                    .iter()
                    .filter(|r| r.contains("ACCEPT") && r.split_whitespace().any(|f| f == iface))
                    .count()
            })
            .unwrap_or(0)
    }

    /// Every iptables invocation, in order.
    pub fn iptables_calls(&self) -> Vec<Vec<String>> {
        self.iptables_calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Directories created so far with their modes.
    pub fn directories(&self) -> Vec<(PathBuf, u32)> {
        self.directories.lock().map(|d| d.clone()).unwrap_or_default()
    }

    /// Nodes that had TX offload disabled.
    pub fn offload_disabled(&self) -> Vec<String> {
        self.offload_disabled.lock().map(|o| o.clone()).unwrap_or_default()
    }
}

impl Default for MockHost {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HostOps for MockHost {
    async fn create_directory(&self, path: &Path, mode: u32) -> Result<()> {
        tokio::fs::create_dir_all(path).await?;
        if let Ok(mut dirs) = self.directories.lock() {
            dirs.push((path.to_path_buf(), mode));
        }
        Ok(())
    }

    async fn bridge_by_name(&self, name: &str) -> Result<()> {
        if self.bridges.contains(name) {
            Ok(())
        } else {
            Err(NodeError::BridgeNotFound {
                name: name.to_string(),
                reason: "Link not found".to_string(),
            })
        }
    }

    async fn run_iptables(&self, args: &[String]) -> Result<CommandOutput> {
        if let Ok(mut calls) = self.iptables_calls.lock() {
            calls.push(args.to_vec());
        }

        match args.first().map(String::as_str) {
            Some("-vL") => Ok(CommandOutput {
                success: !self.fail_listing,
                stdout: self.forward_listing(),
                stderr: if self.fail_listing {
                    "iptables: Permission denied (you must be root).\n".to_string()
                } else {
                    String::new()
                },
            }),
            Some("-I") if self.fail_insert => Ok(CommandOutput {
                success: false,
                stdout: String::new(),
                stderr: "iptables: No chain/target/match by that name.\n".to_string(),
            }),
            Some("-I") => {
                let iface = args
                    .iter()
                    .position(|a| a == "-i")
                    .and_then(|i| args.get(i + 1))
                    .cloned()
                    .unwrap_or_default();
                self.push_accept_rule(&iface);
                Ok(CommandOutput {
                    success: true,
                    ..Default::default()
                })
            }
            _ => Ok(CommandOutput {
                success: false,
                stdout: String::new(),
                stderr: format!("unsupported iptables invocation: {:?}\n", args),
            }),
        }
    }

    async fn disable_tx_offload(&self, cfg: &NodeConfig) -> Result<()> {
        if let Ok(mut disabled) = self.offload_disabled.lock() {
            disabled.push(cfg.short_name.clone());
        }
        Ok(())
    }

    async fn cpu_count(&self) -> Result<usize> {
        Ok(self.cpus)
    }

    async fn virtualization_supported(&self) -> bool {
        self.virt
    }
}
