//! Network-configuration subsystem used to persist running configs.

use async_trait::async_trait;
use std::sync::Mutex;
use tracing::debug;

use crate::error::{NodeError, Result};

/// Persists a device's running configuration to its startup configuration.
#[async_trait]
pub trait ConfigSaver: Send + Sync {
    /// Save the running configuration of the device reachable at `address`.
    ///
    /// `platform` names the device driver (e.g. `cisco_iosxr`).
    async fn save_running_config(
        &self,
        address: &str,
        username: &str,
        password: &str,
        platform: &str,
    ) -> Result<()>;
}

/// A recorded save request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveRequest {
    pub address: String,
    pub username: String,
    pub password: String,
    pub platform: String,
}

/// In-memory config saver for tests.
#[derive(Default)]
pub struct MockConfigSaver {
    fail: bool,
    requests: Mutex<Vec<SaveRequest>>,
}

impl MockConfigSaver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every save fail as an unreachable device would.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<SaveRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ConfigSaver for MockConfigSaver {
    async fn save_running_config(
        &self,
        address: &str,
        username: &str,
        password: &str,
        platform: &str,
    ) -> Result<()> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(SaveRequest {
                address: address.to_string(),
                username: username.to_string(),
                password: password.to_string(),
                platform: platform.to_string(),
            });
        }

        if self.fail {
            return Err(NodeError::SaveConfig {
                node: address.to_string(),
                reason: "connection refused".to_string(),
            });
        }

        debug!(address = %address, platform = %platform, "Mock config saved");
        Ok(())
    }
}
