//! One-shot VM readiness signal.
//!
//! A VM-backed runtime returns from `start_container` while the VM is still
//! booting. The runtime keeps the [`VmReadinessNotifier`] and hands the
//! matching [`VmReadiness`] to the node, which awaits it exactly once.

use tokio::sync::oneshot;
use tracing::debug;

use crate::error::{Result, RuntimeError};

/// Create a linked notifier/readiness pair.
pub fn vm_readiness() -> (VmReadinessNotifier, VmReadiness) {
    let (tx, rx) = oneshot::channel();
    (VmReadinessNotifier { tx }, VmReadiness { rx })
}

/// Runtime side of the readiness signal.
#[derive(Debug)]
pub struct VmReadinessNotifier {
    tx: oneshot::Sender<std::result::Result<(), String>>,
}

impl VmReadinessNotifier {
    /// Report that the VM finished booting.
    pub fn boot_finished(self) {
        // The receiver may already be gone if the node was torn down.
        let _ = self.tx.send(Ok(()));
    }

    /// Report that the VM failed to boot.
    pub fn boot_failed(self, reason: impl Into<String>) {
        let _ = self.tx.send(Err(reason.into()));
    }
}

/// Node side of the readiness signal.
#[derive(Debug)]
pub struct VmReadiness {
    rx: oneshot::Receiver<std::result::Result<(), String>>,
}

impl VmReadiness {
    /// Wait for the VM to finish booting.
    ///
    /// A dropped notifier closes the channel, which counts as boot completion.
    pub async fn wait(self) -> Result<()> {
        match self.rx.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(reason)) => Err(RuntimeError::VmBootFailed(reason)),
            Err(_) => {
                debug!("VM readiness channel closed without a message");
                Ok(())
            }
        }
    }
}
