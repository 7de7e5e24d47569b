//! # labnode Nodes
//!
//! Lab node kinds behind one lifecycle contract.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │                 NodeRegistry                  │
//! │   kind name -> (factory, default credentials) │
//! └───────────────────────┬───────────────────────┘
//!                         │ new_node + init
//!                         ▼
//! ┌───────────────────────────────────────────────┐
//! │                  Node Trait                   │
//! │ check -> pull -> pre_deploy -> deploy ->      │
//! │ post_deploy -> save_config                    │
//! └──────┬───────────────┬───────────────┬────────┘
//!        ▼               ▼               ▼
//! ┌────────────┐  ┌────────────┐  ┌────────────┐
//! │   Bridge   │  │   Linux    │  │    XRd     │
//! │ (iptables) │  │ (container │  │ (first-boot│
//! │            │  │  or VM)    │  │  config)   │
//! └────────────┘  └────────────┘  └────────────┘
//!        │               │               │
//!        └───────┬───────┴───────┬───────┘
//!                ▼               ▼
//!         HostOps trait   ContainerRuntime trait
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use labnode_nodes::{deploy_node, init_node, NodeOption, NodeRegistry};
//! use labnode_runtime::{MockRuntime, NodeConfig};
//!
//! let registry = NodeRegistry::with_builtin_kinds()?;
//! let cfg = NodeConfig::new("srv1", "clab-lab-srv1", "linux").with_image("alpine:3");
//! let mut node = init_node(&registry, cfg, vec![NodeOption::Runtime(Arc::new(MockRuntime::new()))])?;
//!
//! deploy_node(node.as_mut(), &ctx, &PreDeployParams::default(), &peers).await?;
//! ```

pub mod credentials;
pub mod default_node;
pub mod error;
pub mod host;
pub mod kinds;
pub mod lifecycle;
pub mod netconf;
pub mod node;
pub mod registry;
pub mod settings;
pub mod template;
pub mod utils;

pub use credentials::Credentials;
pub use default_node::DefaultNode;
pub use error::{NodeError, Result};
pub use host::{CommandOutput, HostOps, MockHost, SystemHost};
pub use kinds::{Bridge, Linux, Xrd};
pub use lifecycle::{deploy_node, init_node, peer_configs, run_hook, run_phase, Phase};
pub use netconf::{ConfigSaver, MockConfigSaver};
pub use node::{Node, NodeOption, PeerConfigs, PreDeployParams, IMAGE_KEY, KERNEL_KEY, SANDBOX_KEY};
pub use registry::{NodeFactory, NodeRegistry, RegistryEntry};
pub use settings::NodeSettings;
pub use utils::merge_string_maps;
