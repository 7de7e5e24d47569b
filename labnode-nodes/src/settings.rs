//! Host-level settings shared by all nodes of a lab.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Settings that control how nodes touch the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeSettings {
    /// iptables binary used for bridge forwarding rules
    pub iptables_bin: String,
    /// Seconds iptables waits for the xtables lock (`-w`)
    pub iptables_wait_secs: u32,
    /// Directory holding named network namespace links
    pub netns_dir: PathBuf,
    /// Permission bits for directories created under the lab directory
    pub lab_dir_mode: u32,
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            iptables_bin: "iptables".to_string(),
            iptables_wait_secs: 5,
            netns_dir: PathBuf::from("/run/netns"),
            lab_dir_mode: 0o777,
        }
    }
}

impl NodeSettings {
    /// Load settings from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(anyhow::anyhow!("Settings file not found: {}", path.display()));
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file: {}", path.display()))?;

        let settings: NodeSettings =
            serde_yaml::from_str(&content).with_context(|| "Failed to parse settings file")?;

        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_partial_yaml_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.yml");
        std::fs::write(&path, "iptables_bin: iptables-nft\niptables_wait_secs: 10\n").unwrap();

        let settings = NodeSettings::load(&path).unwrap();
        assert_eq!(settings.iptables_bin, "iptables-nft");
        assert_eq!(settings.iptables_wait_secs, 10);
        assert_eq!(settings.netns_dir, PathBuf::from("/run/netns"));
        assert_eq!(settings.lab_dir_mode, 0o777);
    }

    #[test]
    fn test_load_missing_file() {
        assert!(NodeSettings::load("/nonexistent/labnode.yml").is_err());
    }
}
