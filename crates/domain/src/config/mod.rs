mod llm;
mod memory;
mod orchestration;
mod sessions;

pub use llm::*;
pub use memory::*;
pub use orchestration::*;
pub use sessions::*;

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Root configuration tree for the hub.
///
/// Every field defaults, so an empty (or absent) config file yields a
/// working local setup.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HubConfig {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub graph: GraphConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub orchestration: OrchestrationConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
}

impl HubConfig {
    /// Load from a TOML file; a missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::info!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }

    /// Resolve the config path: `AGENT_HUB_CONFIG` env var, else
    /// `~/.agent-hub/config.toml`.
    pub fn default_path() -> std::path::PathBuf {
        if let Ok(p) = std::env::var("AGENT_HUB_CONFIG") {
            return p.into();
        }
        dirs::home_dir()
            .unwrap_or_else(|| ".".into())
            .join(".agent-hub")
            .join("config.toml")
    }
}
