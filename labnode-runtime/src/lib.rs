//! # labnode Runtime
//!
//! Container runtime abstraction consumed by lab node kinds.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │        ContainerRuntime Trait           │
//! │ (create, start, exec, delete, mgmt)     │
//! └─────────────────────┬───────────────────┘
//!                       │
//!         ┌─────────────┴─────────────┐
//!         ▼                           ▼
//! ┌───────────────────┐     ┌───────────────────┐
//! │  plain container  │     │  VM-backed (VMs   │
//! │  runtime          │     │  signal readiness)│
//! └───────────────────┘     └───────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use labnode_runtime::{ContainerRuntime, MockRuntime, NodeConfig};
//!
//! let runtime = MockRuntime::vm_backed();
//! let cfg = NodeConfig::new("n1", "clab-lab-n1", "linux");
//! let id = runtime.create_container(&cfg).await?;
//! if let Some(readiness) = runtime.start_container(&id, &cfg).await?.into_readiness() {
//!     readiness.wait().await?;
//! }
//! ```

pub mod error;
pub mod mock;
pub mod readiness;
pub mod traits;
pub mod types;

pub use error::RuntimeError;
pub use mock::MockRuntime;
pub use readiness::{vm_readiness, VmReadiness, VmReadinessNotifier};
pub use traits::{ContainerRuntime, DOCKER_RUNTIME_NAME, IGNITE_RUNTIME_NAME};
pub use types::*;
