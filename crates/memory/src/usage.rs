//! Usage tracking with buffered writes.
//!
//! Counter increments land in an in-process buffer (the hub's one hot-path
//! mutable global besides the index cache) and flush to the graph every
//! flush interval and on shutdown. Flush swaps the buffer atomically; a
//! graph failure re-accumulates the swapped counters (at-least-once to the
//! graph), an audit failure is logged only - the graph holds the source of
//! truth, the audit log may undercount.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use ah_domain::error::Result;
use ah_graph::{GraphStore, UsageDelta};

use crate::adaptive_index::AdaptiveIndexService;
use crate::audit::{AuditStore, UsageStatRow};

pub const METRIC_LOADED: &str = "loaded";
pub const METRIC_REFERENCED: &str = "referenced";
pub const METRIC_SUCCESS: &str = "success";
pub const METRIC_HELPFUL: &str = "helpful";
pub const METRIC_HARMFUL: &str = "harmful";

#[derive(Debug, Clone, Copy, Default)]
struct Counters {
    loaded: u64,
    referenced: u64,
    success: u64,
    helpful: u64,
    harmful: u64,
}

impl Counters {
    fn merge(&mut self, other: &Counters) {
        self.loaded += other.loaded;
        self.referenced += other.referenced;
        self.success += other.success;
        self.helpful += other.helpful;
        self.harmful += other.harmful;
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tracker
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Thread-safe buffered usage tracker.
pub struct UsageTracker {
    buffer: Mutex<HashMap<String, Counters>>,
    graph: Arc<dyn GraphStore>,
    audit: Option<Arc<AuditStore>>,
    /// Invalidated when a flush moves a mandate's utility significantly.
    index: Mutex<Option<Arc<AdaptiveIndexService>>>,
    flush_interval: Duration,
    shutdown: CancellationToken,
}

impl UsageTracker {
    pub fn new(
        graph: Arc<dyn GraphStore>,
        audit: Option<Arc<AuditStore>>,
        flush_interval_secs: u64,
    ) -> Self {
        Self {
            buffer: Mutex::new(HashMap::new()),
            graph,
            audit,
            index: Mutex::new(None),
            flush_interval: Duration::from_secs(flush_interval_secs),
            shutdown: CancellationToken::new(),
        }
    }

    /// Attach the adaptive-index cache for significance-driven
    /// invalidation. Called once during wiring.
    pub fn attach_index(&self, index: Arc<AdaptiveIndexService>) {
        *self.index.lock() = Some(index);
    }

    // ── Increment API ────────────────────────────────────────────────

    pub fn increment_loaded(&self, episode_uuid: &str) {
        self.bump(episode_uuid, |c| c.loaded += 1);
    }

    pub fn increment_referenced(&self, episode_uuid: &str) {
        self.bump(episode_uuid, |c| c.referenced += 1);
    }

    pub fn increment_success(&self, episode_uuid: &str) {
        self.bump(episode_uuid, |c| c.success += 1);
    }

    /// Agent rated the memory helpful.
    pub fn increment_helpful(&self, episode_uuid: &str) {
        self.bump(episode_uuid, |c| c.helpful += 1);
    }

    /// Agent rated the memory harmful.
    pub fn increment_harmful(&self, episode_uuid: &str) {
        self.bump(episode_uuid, |c| c.harmful += 1);
    }

    pub fn track_loaded_batch(&self, episode_uuids: &[String]) {
        for uuid in episode_uuids {
            self.increment_loaded(uuid);
        }
    }

    pub fn track_referenced_batch(&self, episode_uuids: &[String]) {
        for uuid in episode_uuids {
            self.increment_referenced(uuid);
        }
    }

    /// External rating endpoint: "helpful" | "harmful" | "used".
    pub fn rate(&self, episode_uuid: &str, rating: &str) -> bool {
        match rating {
            "helpful" => self.increment_helpful(episode_uuid),
            "harmful" => self.increment_harmful(episode_uuid),
            "used" => self.increment_referenced(episode_uuid),
            _ => return false,
        }
        true
    }

    fn bump(&self, uuid: &str, f: impl FnOnce(&mut Counters)) {
        let mut buffer = self.buffer.lock();
        f(buffer.entry(uuid.to_string()).or_default());
    }

    /// Number of UUIDs with pending counters.
    pub fn pending(&self) -> usize {
        self.buffer.lock().len()
    }

    // ── Flush ────────────────────────────────────────────────────────

    /// Flush buffered metrics: graph counters first, audit log second.
    ///
    /// Counter increments are commutative, so re-accumulation on failure
    /// cannot double-count relative to a successful flush.
    pub async fn flush(&self) -> Result<u64> {
        let to_flush: HashMap<String, Counters> = {
            let mut buffer = self.buffer.lock();
            if buffer.is_empty() {
                return Ok(0);
            }
            std::mem::take(&mut *buffer)
        };

        tracing::info!(episodes = to_flush.len(), "flushing usage metrics");
        let now = Utc::now();

        let deltas: Vec<UsageDelta> = to_flush
            .iter()
            .map(|(uuid, c)| UsageDelta {
                uuid: uuid.clone(),
                loaded: c.loaded,
                referenced: c.referenced,
                success: c.success,
                helpful: c.helpful,
                harmful: c.harmful,
            })
            .collect();

        let shifts = match self.graph.apply_usage_deltas(&deltas, now).await {
            Ok(shifts) => shifts,
            Err(e) => {
                tracing::error!(error = %e, "graph flush failed, re-queueing counters");
                let mut buffer = self.buffer.lock();
                for (uuid, counters) in to_flush {
                    buffer.entry(uuid).or_default().merge(&counters);
                }
                return Err(e);
            }
        };
        let updated = shifts.len() as u64;

        // Significant mandate utility movement stales the injected index.
        if let Some(index) = self.index.lock().clone() {
            let mandate_deltas: Vec<f64> = shifts
                .iter()
                .filter(|s| s.injection_tier.as_deref() == Some("mandate"))
                .map(|s| s.delta())
                .collect();
            index.refresh_if_significant(&mandate_deltas);
        }

        // Audit log: best effort, no re-queue.
        if let Some(ref audit) = self.audit {
            let rows: Vec<UsageStatRow> = to_flush
                .iter()
                .flat_map(|(uuid, c)| {
                    [
                        (METRIC_LOADED, c.loaded),
                        (METRIC_REFERENCED, c.referenced),
                        (METRIC_SUCCESS, c.success),
                        (METRIC_HELPFUL, c.helpful),
                        (METRIC_HARMFUL, c.harmful),
                    ]
                    .into_iter()
                    .filter(|(_, v)| *v > 0)
                    .map(|(metric, value)| UsageStatRow {
                        episode_uuid: uuid.clone(),
                        metric_type: metric.into(),
                        value,
                        timestamp: now,
                    })
                    .collect::<Vec<_>>()
                })
                .collect();

            if let Err(e) = audit.log_usage_stats(&rows) {
                tracing::error!(error = %e, "audit usage log failed (graph already updated)");
            }
        }

        Ok(updated)
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Spawn the periodic flush loop. Returns the task handle.
    pub fn start_periodic_flush(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let tracker = self.clone();
        let interval = tracker.flush_interval;
        tracing::info!(interval_secs = interval.as_secs(), "started periodic usage flush");

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tracker.shutdown.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {
                        if let Err(e) = tracker.flush().await {
                            tracing::warn!(error = %e, "periodic flush failed, retrying next tick");
                        }
                    }
                }
            }
        })
    }

    /// Graceful shutdown: stop the loop and flush remaining metrics.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        if let Err(e) = self.flush().await {
            tracing::error!(error = %e, "final usage flush failed");
        }
        tracing::info!("usage tracker shutdown complete");
    }
}
