//! Type definitions shared between the runtime and the node kinds.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::readiness::VmReadiness;

// =============================================================================
// NODE CONFIGURATION
// =============================================================================

/// Per-node configuration record.
///
/// Owned by a single node instance. The lifecycle driver may inject
/// topology-wide values (such as management gateways) between hooks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Name of the node as written in the topology
    pub short_name: String,
    /// Fully qualified container name (`clab-<lab>-<node>`)
    pub long_name: String,
    /// Kind this node was instantiated from
    pub kind: String,
    /// Container image reference
    pub image: String,
    /// Kernel image (VM-backed runtimes only)
    pub kernel: String,
    /// Sandbox image (VM-backed runtimes only)
    pub sandbox: String,
    /// Environment variables
    pub env: HashMap<String, String>,
    /// Bind mounts in `host:container` form, order preserved
    pub binds: Vec<String>,
    /// Sysctls applied to the node namespace
    pub sysctls: HashMap<String, String>,
    /// Network mode (`host` or empty for the lab management network)
    pub network_mode: String,
    /// Management network IPv4 gateway, known after the network is created
    pub mgmt_ipv4_gateway: String,
    /// Management network IPv6 gateway, known after the network is created
    pub mgmt_ipv6_gateway: String,
    /// User-supplied startup configuration file
    pub startup_config: String,
    /// Path of the startup configuration actually handed to the node
    pub res_startup_config: String,
    /// Interfaces of this node referenced by topology links
    pub endpoints: Vec<Endpoint>,
    /// Per-node directory inside the lab directory
    pub lab_dir: String,
    /// Deployment status label (`created` once the resource exists)
    pub deployment_status: String,
    /// Node lives in the host root network namespace
    pub is_root_namespace_based: bool,
    /// Host resources this node needs to be deployable
    pub host_requirements: HostRequirements,
}

impl NodeConfig {
    /// Create a new node configuration with the given names and kind.
    pub fn new(
        short_name: impl Into<String>,
        long_name: impl Into<String>,
        kind: impl Into<String>,
    ) -> Self {
        Self {
            short_name: short_name.into(),
            long_name: long_name.into(),
            kind: kind.into(),
            ..Default::default()
        }
    }

    /// Set the image reference.
    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = image.into();
        self
    }

    /// Set the lab directory of this node.
    pub fn with_lab_dir(mut self, lab_dir: impl Into<String>) -> Self {
        self.lab_dir = lab_dir.into();
        self
    }

    /// Add an endpoint by interface name.
    pub fn with_endpoint(mut self, name: impl Into<String>) -> Self {
        self.endpoints.push(Endpoint::new(name));
        self
    }

    /// Set an environment variable.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set the network mode.
    pub fn with_network_mode(mut self, mode: impl Into<String>) -> Self {
        self.network_mode = mode.into();
        self
    }

    /// Set the user-supplied startup configuration path.
    pub fn with_startup_config(mut self, path: impl Into<String>) -> Self {
        self.startup_config = path.into();
        self
    }
}

/// One interface of a node that a topology link attaches to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Interface name inside the node namespace
    pub endpoint_name: String,
}

impl Endpoint {
    /// Create an endpoint with the given interface name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            endpoint_name: name.into(),
        }
    }
}

/// Host resources a node needs before it can be deployed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostRequirements {
    /// Minimum number of host vCPUs (0 = no requirement)
    pub min_vcpu: u32,
    /// Hardware virtualization must be available
    pub virt_required: bool,
}

// =============================================================================
// RUNTIME INFORMATION
// =============================================================================

/// Management network as reported by the runtime.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MgmtNet {
    /// Network name
    pub network: String,
    /// IPv4 gateway address
    pub ipv4_gw: String,
    /// IPv6 gateway address
    pub ipv6_gw: String,
}

/// Container summary returned by the runtime.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenericContainer {
    /// Runtime identifier
    pub id: String,
    /// Container names
    pub names: Vec<String>,
    /// Image reference
    pub image: String,
    /// Runtime state (e.g. "created", "running")
    pub state: String,
    /// Labels attached at creation
    pub labels: HashMap<String, String>,
}

/// Command to execute inside a node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecCmd {
    /// Program followed by its arguments
    pub cmd: Vec<String>,
}

impl ExecCmd {
    /// Build a command by splitting a string on whitespace.
    pub fn from_string(cmd: &str) -> Self {
        Self {
            cmd: cmd.split_whitespace().map(str::to_string).collect(),
        }
    }
}

/// Outcome of a command executed inside a node.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecResult {
    /// Command that was executed
    pub cmd: Vec<String>,
    /// Process exit code
    pub return_code: i32,
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error
    pub stderr: String,
}

/// Result of starting a container.
#[derive(Debug)]
pub enum StartOutcome {
    /// Plain container; running once the call returns.
    Started,
    /// VM-backed container; boot continues asynchronously.
    VmBacked(VmReadiness),
}

impl StartOutcome {
    /// Take the readiness handle out of a VM-backed start.
    pub fn into_readiness(self) -> Option<VmReadiness> {
        match self {
            StartOutcome::Started => None,
            StartOutcome::VmBacked(readiness) => Some(readiness),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exec_cmd_from_string() {
        let cmd = ExecCmd::from_string("ip  addr show\teth0");
        assert_eq!(cmd.cmd, vec!["ip", "addr", "show", "eth0"]);
    }

    #[test]
    fn test_node_config_deserialize_defaults() {
        let cfg: NodeConfig = serde_json::from_str(
            r#"{"short_name": "r1", "kind": "xrd", "endpoints": [{"endpoint_name": "Gi0-0-0-0"}]}"#,
        )
        .unwrap();

        assert_eq!(cfg.short_name, "r1");
        assert_eq!(cfg.endpoints, vec![Endpoint::new("Gi0-0-0-0")]);
        assert!(cfg.binds.is_empty());
        assert!(cfg.mgmt_ipv4_gateway.is_empty());
        assert_eq!(cfg.host_requirements, HostRequirements::default());
    }
}
