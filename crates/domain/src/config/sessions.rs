use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Sessions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    /// State directory. `None` = `~/.agent-hub`.
    #[serde(default)]
    pub state_dir: Option<String>,
    /// In-process session states older than this are swept.
    #[serde(default = "d_stale_hours")]
    pub stale_after_hours: i64,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            state_dir: None,
            stale_after_hours: d_stale_hours(),
        }
    }
}

impl SessionsConfig {
    /// Resolve the state directory, falling back to `~/.agent-hub`.
    pub fn resolve_state_dir(&self) -> PathBuf {
        match &self.state_dir {
            Some(p) => PathBuf::from(p),
            None => dirs::home_dir()
                .unwrap_or_else(|| ".".into())
                .join(".agent-hub"),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_stale_hours() -> i64 {
    24
}
