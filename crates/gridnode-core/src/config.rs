//! gridnode.toml configuration parser.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeConfig {
    pub node: NodeSection,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub peers: Vec<PeerConfig>,
    pub cluster: Option<ClusterConfig>,
    pub log: Option<LogConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeSection {
    /// Grid identity. When set the node starts in server role.
    pub id: Option<String>,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

/// Peer dialed at startup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PeerConfig {
    pub id: String,
    pub uri: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClusterConfig {
    /// Upper bound on a single peer connection attempt.
    pub connect_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogConfig {
    /// `tracing_subscriber::EnvFilter` directive, e.g. `info,gridnode=debug`.
    pub filter: Option<String>,
    /// Emit JSON lines instead of the human formatter.
    pub json: Option<bool>,
}

fn default_port() -> u16 {
    5000
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("/var/lib/gridnode")
}

impl Default for NodeSection {
    fn default() -> Self {
        Self {
            id: None,
            port: default_port(),
            data_dir: default_data_dir(),
        }
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node: NodeSection::default(),
            peers: Vec::new(),
            cluster: None,
            log: None,
        }
    }
}

impl NodeConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: NodeConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn log_filter(&self) -> Option<&str> {
        self.log.as_ref().and_then(|l| l.filter.as_deref())
    }

    pub fn log_json(&self) -> bool {
        self.log.as_ref().and_then(|l| l.json).unwrap_or(false)
    }

    pub fn connect_timeout_secs(&self) -> Option<u64> {
        self.cluster.as_ref().and_then(|c| c.connect_timeout_secs)
    }
}
