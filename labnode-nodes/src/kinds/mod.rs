//! Built-in node kinds.
//!
//! - **bridge**: pre-existing host bridge; never created or removed
//! - **linux**: generic container, optionally VM-backed
//! - **xrd**: Cisco XRd router with generated first-boot configuration

mod bridge;
mod linux;
mod xrd;

pub use bridge::Bridge;
pub use linux::Linux;
pub use xrd::Xrd;

use crate::error::Result;
use crate::registry::NodeRegistry;

/// Register every built-in kind.
pub fn register_builtin(registry: &mut NodeRegistry) -> Result<()> {
    bridge::register(registry)?;
    linux::register(registry)?;
    xrd::register(registry)?;
    Ok(())
}
