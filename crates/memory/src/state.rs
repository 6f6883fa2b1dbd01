//! Session-level memory state.
//!
//! Tracks per-session scope binding, injection counts, and the UUIDs loaded
//! across turns. States live in an in-process registry; a durable session
//! additionally persists to `<state_dir>/.graphiti_state.json` between
//! processes (adequate for single-node deployments - a clustered setup
//! would swap the file for a keyed blob store).

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use ah_domain::error::Result;
use ah_domain::scope::MemoryScope;

/// Durable file name, fixed as the on-disk contract for local tools.
const STATE_FILE_NAME: &str = ".graphiti_state.json";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// State
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: String,
    pub scope: MemoryScope,
    #[serde(default)]
    pub scope_id: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_injection_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub injection_count: u64,
    #[serde(default)]
    pub loaded_memory_uuids: Vec<String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl SessionState {
    pub fn new(session_id: impl Into<String>, scope: MemoryScope, scope_id: Option<String>) -> Self {
        Self {
            session_id: session_id.into(),
            scope,
            scope_id,
            created_at: Utc::now(),
            last_injection_at: None,
            injection_count: 0,
            loaded_memory_uuids: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    /// Record one injection event, accumulating UUIDs without duplicates.
    pub fn record_injection(&mut self, memory_uuids: &[String]) {
        self.last_injection_at = Some(Utc::now());
        self.injection_count += 1;
        for uuid in memory_uuids {
            if !self.loaded_memory_uuids.contains(uuid) {
                self.loaded_memory_uuids.push(uuid.clone());
            }
        }
    }

    pub fn set_scope(&mut self, scope: MemoryScope, scope_id: Option<String>) {
        self.scope = scope;
        self.scope_id = scope_id;
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Registry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// In-process session-state registry with optional durable persistence.
pub struct SessionRegistry {
    states: Mutex<HashMap<String, SessionState>>,
    state_dir: Option<PathBuf>,
    stale_after_hours: i64,
}

impl SessionRegistry {
    pub fn new(state_dir: Option<PathBuf>, stale_after_hours: i64) -> Self {
        Self {
            states: Mutex::new(HashMap::new()),
            state_dir,
            stale_after_hours,
        }
    }

    /// Create state for a session; an existing session is returned as-is.
    pub fn create(
        &self,
        session_id: &str,
        scope: MemoryScope,
        scope_id: Option<String>,
    ) -> SessionState {
        let mut states = self.states.lock();
        states
            .entry(session_id.to_string())
            .or_insert_with(|| {
                tracing::info!(session_id, scope = scope.as_str(), "created session state");
                SessionState::new(session_id, scope, scope_id)
            })
            .clone()
    }

    pub fn get(&self, session_id: &str) -> Option<SessionState> {
        self.states.lock().get(session_id).cloned()
    }

    pub fn delete(&self, session_id: &str) -> bool {
        self.states.lock().remove(session_id).is_some()
    }

    /// Record an injection against a session, creating the state on first
    /// touch (API sessions don't always announce themselves first).
    pub fn record_injection(&self, session_id: &str, memory_uuids: &[String]) {
        let mut states = self.states.lock();
        states
            .entry(session_id.to_string())
            .or_insert_with(|| SessionState::new(session_id, MemoryScope::Global, None))
            .record_injection(memory_uuids);
    }

    /// Sweep states older than the stale horizon. Returns how many went.
    pub fn cleanup_stale(&self) -> usize {
        let cutoff = Utc::now() - Duration::hours(self.stale_after_hours);
        let mut states = self.states.lock();
        let before = states.len();
        states.retain(|_, s| s.created_at > cutoff);
        let removed = before - states.len();
        if removed > 0 {
            tracing::info!(removed, "cleaned up stale session states");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.states.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.lock().is_empty()
    }

    // ── Durable persistence ──────────────────────────────────────────

    fn state_file(&self) -> Option<PathBuf> {
        self.state_dir.as_ref().map(|d| d.join(STATE_FILE_NAME))
    }

    /// Persist one session's state to disk.
    pub fn save_durable(&self, session_id: &str) -> Result<bool> {
        let Some(path) = self.state_file() else {
            return Ok(false);
        };
        let Some(state) = self.get(session_id) else {
            return Ok(false);
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, serde_json::to_string_pretty(&state)?)?;
        tracing::debug!(path = %path.display(), "saved session state");
        Ok(true)
    }

    /// Load the durable state from disk into the registry.
    ///
    /// When `session_id` is given, a file for a different session is
    /// ignored. Corrupt files are logged and treated as absent.
    pub fn load_durable(&self, session_id: Option<&str>) -> Option<SessionState> {
        let path = self.state_file()?;
        let raw = std::fs::read_to_string(&path).ok()?;
        let state: SessionState = match serde_json::from_str(&raw) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to load session state");
                return None;
            }
        };
        if let Some(expected) = session_id {
            if state.session_id != expected {
                return None;
            }
        }
        self.states
            .lock()
            .insert(state.session_id.clone(), state.clone());
        Some(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_injection_accumulates_unique_uuids() {
        let registry = SessionRegistry::new(None, 24);
        registry.record_injection("s1", &["a".into(), "b".into()]);
        registry.record_injection("s1", &["b".into(), "c".into()]);

        let state = registry.get("s1").unwrap();
        assert_eq!(state.injection_count, 2);
        assert_eq!(state.loaded_memory_uuids, vec!["a", "b", "c"]);
        assert!(state.last_injection_at.is_some());
    }

    #[test]
    fn create_is_idempotent() {
        let registry = SessionRegistry::new(None, 24);
        let a = registry.create("s1", MemoryScope::Project, Some("x".into()));
        let b = registry.create("s1", MemoryScope::Global, None);
        assert_eq!(a.session_id, b.session_id);
        // First creation wins.
        assert_eq!(b.scope, MemoryScope::Project);
    }

    #[test]
    fn cleanup_removes_only_stale() {
        let registry = SessionRegistry::new(None, 24);
        registry.create("fresh", MemoryScope::Global, None);
        {
            let mut states = registry.states.lock();
            let mut old = SessionState::new("old", MemoryScope::Global, None);
            old.created_at = Utc::now() - Duration::hours(48);
            states.insert("old".into(), old);
        }
        assert_eq!(registry.cleanup_stale(), 1);
        assert!(registry.get("fresh").is_some());
        assert!(registry.get("old").is_none());
    }

    #[test]
    fn durable_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let registry = SessionRegistry::new(Some(dir.path().to_path_buf()), 24);
        registry.create("s1", MemoryScope::Project, Some("proj".into()));
        registry.record_injection("s1", &["u1".into()]);
        assert!(registry.save_durable("s1").unwrap());

        let fresh = SessionRegistry::new(Some(dir.path().to_path_buf()), 24);
        let loaded = fresh.load_durable(Some("s1")).unwrap();
        assert_eq!(loaded.loaded_memory_uuids, vec!["u1"]);
        assert_eq!(loaded.scope, MemoryScope::Project);

        // Wrong session id: ignored.
        assert!(fresh.load_durable(Some("other")).is_none());
    }

    #[test]
    fn save_without_state_dir_is_noop() {
        let registry = SessionRegistry::new(None, 24);
        registry.create("s1", MemoryScope::Global, None);
        assert!(!registry.save_durable("s1").unwrap());
    }
}
