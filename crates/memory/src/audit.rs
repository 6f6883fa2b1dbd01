//! Relational audit store (embedded SQLite).
//!
//! Three append-only tables: `usage_stats` (historical counter log),
//! `tier_change_log` (promotion/demotion/correction audit), and
//! `memory_injection_metrics` (per-injection accounting). The graph holds
//! the source of truth for counters; these tables exist for analytics and
//! audit, so a failed write here is logged, never retried.

use std::path::Path;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection};

use ah_domain::error::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Row types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone)]
pub struct UsageStatRow {
    pub episode_uuid: String,
    /// "loaded" | "referenced" | "success" | "helpful" | "harmful".
    pub metric_type: String,
    pub value: u64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct TierChangeRow {
    pub episode_uuid: String,
    pub old_tier: String,
    pub new_tier: String,
    pub reason: String,
    /// "demotion" | "promotion" | "correction".
    pub change_type: String,
}

#[derive(Debug, Clone, Default)]
pub struct InjectionMetricsRow {
    pub session_id: String,
    pub project_id: Option<String>,
    pub external_id: Option<String>,
    pub injection_latency_ms: u64,
    pub mandates_count: usize,
    pub guardrails_count: usize,
    pub reference_count: usize,
    pub total_tokens: usize,
    pub query: String,
    pub variant: String,
    pub task_succeeded: Option<bool>,
    pub retries: u32,
    pub memories_cited: Vec<String>,
    pub memories_loaded: Vec<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// SQLite-backed audit store. Writes are short single statements; the
/// connection is serialized behind a mutex.
pub struct AuditStore {
    conn: Mutex<Connection>,
}

impl AuditStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)
            .map_err(|e| Error::Audit(format!("open {}: {e}", db_path.display())))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Audit(format!("open in-memory: {e}")))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn
            .lock()
            .execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS usage_stats (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    episode_uuid TEXT NOT NULL,
                    metric_type TEXT NOT NULL,
                    value INTEGER NOT NULL,
                    timestamp TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS tier_change_log (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    episode_uuid TEXT NOT NULL,
                    old_tier TEXT NOT NULL,
                    new_tier TEXT NOT NULL,
                    reason TEXT NOT NULL,
                    change_type TEXT NOT NULL,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS memory_injection_metrics (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    session_id TEXT NOT NULL,
                    project_id TEXT,
                    external_id TEXT,
                    injection_latency_ms INTEGER NOT NULL,
                    mandates_count INTEGER NOT NULL,
                    guardrails_count INTEGER NOT NULL,
                    reference_count INTEGER NOT NULL,
                    total_tokens INTEGER NOT NULL,
                    query TEXT NOT NULL,
                    variant TEXT NOT NULL,
                    task_succeeded INTEGER,
                    retries INTEGER NOT NULL DEFAULT 0,
                    memories_cited TEXT NOT NULL DEFAULT '[]',
                    memories_loaded TEXT NOT NULL DEFAULT '[]',
                    created_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_usage_stats_uuid ON usage_stats(episode_uuid);
                CREATE INDEX IF NOT EXISTS idx_tier_change_uuid ON tier_change_log(episode_uuid);
                CREATE INDEX IF NOT EXISTS idx_injection_session
                    ON memory_injection_metrics(session_id);
                "#,
            )
            .map_err(|e| Error::Audit(format!("init schema: {e}")))
    }

    /// Append usage stat rows (one per uuid × metric with value > 0).
    pub fn log_usage_stats(&self, rows: &[UsageStatRow]) -> Result<usize> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| Error::Audit(e.to_string()))?;
        let mut inserted = 0;
        for row in rows {
            if row.value == 0 {
                continue;
            }
            tx.execute(
                "INSERT INTO usage_stats (episode_uuid, metric_type, value, timestamp)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    row.episode_uuid,
                    row.metric_type,
                    row.value as i64,
                    row.timestamp.to_rfc3339()
                ],
            )
            .map_err(|e| Error::Audit(e.to_string()))?;
            inserted += 1;
        }
        tx.commit().map_err(|e| Error::Audit(e.to_string()))?;
        Ok(inserted)
    }

    pub fn log_tier_change(&self, row: &TierChangeRow) -> Result<()> {
        self.conn
            .lock()
            .execute(
                "INSERT INTO tier_change_log
                     (episode_uuid, old_tier, new_tier, reason, change_type, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    row.episode_uuid,
                    row.old_tier,
                    row.new_tier,
                    row.reason,
                    row.change_type,
                    Utc::now().to_rfc3339()
                ],
            )
            .map(|_| ())
            .map_err(|e| Error::Audit(e.to_string()))
    }

    pub fn log_injection_metrics(&self, row: &InjectionMetricsRow) -> Result<()> {
        self.conn
            .lock()
            .execute(
                "INSERT INTO memory_injection_metrics
                     (session_id, project_id, external_id, injection_latency_ms,
                      mandates_count, guardrails_count, reference_count, total_tokens,
                      query, variant, task_succeeded, retries,
                      memories_cited, memories_loaded, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
                params![
                    row.session_id,
                    row.project_id,
                    row.external_id,
                    row.injection_latency_ms as i64,
                    row.mandates_count as i64,
                    row.guardrails_count as i64,
                    row.reference_count as i64,
                    row.total_tokens as i64,
                    row.query,
                    row.variant,
                    row.task_succeeded,
                    row.retries as i64,
                    serde_json::to_string(&row.memories_cited)?,
                    serde_json::to_string(&row.memories_loaded)?,
                    Utc::now().to_rfc3339()
                ],
            )
            .map(|_| ())
            .map_err(|e| Error::Audit(e.to_string()))
    }

    // ── Read side (doctor / tests) ───────────────────────────────────

    pub fn usage_stat_count(&self) -> Result<u64> {
        self.count("usage_stats")
    }

    pub fn tier_change_count(&self) -> Result<u64> {
        self.count("tier_change_log")
    }

    pub fn injection_metric_count(&self) -> Result<u64> {
        self.count("memory_injection_metrics")
    }

    /// Tier changes for one episode, newest first.
    pub fn tier_changes_for(&self, episode_uuid: &str) -> Result<Vec<TierChangeRow>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT episode_uuid, old_tier, new_tier, reason, change_type
                 FROM tier_change_log WHERE episode_uuid = ?1 ORDER BY id DESC",
            )
            .map_err(|e| Error::Audit(e.to_string()))?;
        let rows = stmt
            .query_map(params![episode_uuid], |r| {
                Ok(TierChangeRow {
                    episode_uuid: r.get(0)?,
                    old_tier: r.get(1)?,
                    new_tier: r.get(2)?,
                    reason: r.get(3)?,
                    change_type: r.get(4)?,
                })
            })
            .map_err(|e| Error::Audit(e.to_string()))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::Audit(e.to_string()))?;
        Ok(rows)
    }

    fn count(&self, table: &str) -> Result<u64> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(&format!("SELECT COUNT(*) FROM {table}"))
            .map_err(|e| Error::Audit(e.to_string()))?;
        stmt.query_row([], |r| r.get::<_, i64>(0))
            .map(|n| n as u64)
            .map_err(|e| Error::Audit(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_stats_skip_zero_values() {
        let store = AuditStore::open_in_memory().unwrap();
        let rows = vec![
            UsageStatRow {
                episode_uuid: "u1".into(),
                metric_type: "loaded".into(),
                value: 3,
                timestamp: Utc::now(),
            },
            UsageStatRow {
                episode_uuid: "u1".into(),
                metric_type: "harmful".into(),
                value: 0,
                timestamp: Utc::now(),
            },
        ];
        assert_eq!(store.log_usage_stats(&rows).unwrap(), 1);
        assert_eq!(store.usage_stat_count().unwrap(), 1);
    }

    #[test]
    fn tier_change_roundtrip() {
        let store = AuditStore::open_in_memory().unwrap();
        store
            .log_tier_change(&TierChangeRow {
                episode_uuid: "e1".into(),
                old_tier: "guardrail".into(),
                new_tier: "reference".into(),
                reason: "harmful_ratings:3".into(),
                change_type: "demotion".into(),
            })
            .unwrap();

        let changes = store.tier_changes_for("e1").unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].new_tier, "reference");
        assert_eq!(changes[0].change_type, "demotion");
    }

    #[test]
    fn injection_metrics_persist_uuid_lists() {
        let store = AuditStore::open_in_memory().unwrap();
        store
            .log_injection_metrics(&InjectionMetricsRow {
                session_id: "s1".into(),
                query: "should I use asyncio".into(),
                variant: "BASELINE".into(),
                mandates_count: 2,
                memories_loaded: vec!["u1".into(), "u2".into()],
                ..Default::default()
            })
            .unwrap();
        assert_eq!(store.injection_metric_count().unwrap(), 1);
    }

    #[test]
    fn open_on_disk_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("audit.db");
        let store = AuditStore::open(&path).unwrap();
        assert_eq!(store.usage_stat_count().unwrap(), 0);
        assert!(path.exists());
    }
}
