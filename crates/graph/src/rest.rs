//! REST implementation of [`GraphStore`].
//!
//! `RestGraphClient` wraps a `reqwest::Client` and translates trait methods
//! into HTTP calls against the graph-memory service, with automatic retry +
//! exponential back-off on transient (5xx / timeout) failures. Counter math
//! and maintenance run as single raw queries through `/api/query` so the
//! backend's own concurrency control serializes read-modify-write.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::{json, Value};
use uuid::Uuid;

use ah_domain::config::GraphConfig;
use ah_domain::error::{Error, Result};

use crate::store::{GraphStore, UsageDelta, UtilityShift};
use crate::types::{AddEpisodeRequest, AddEpisodeResult, EntityEdge, EpisodeNode};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Client
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A REST-based client for the graph-memory service.
///
/// Created once and reused for the lifetime of the hub process; the
/// underlying `reqwest::Client` maintains a connection pool.
#[derive(Debug, Clone)]
pub struct RestGraphClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
    max_retries: u32,
}

impl RestGraphClient {
    /// Build a new client from the shared [`GraphConfig`].
    pub fn new(cfg: &GraphConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;

        Ok(Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_owned(),
            api_key: cfg.api_key.clone(),
            max_retries: cfg.max_retries,
        })
    }

    // ── request helpers ──────────────────────────────────────────────

    fn decorate(&self, rb: RequestBuilder) -> RequestBuilder {
        let mut rb = rb.header("X-Trace-Id", Uuid::new_v4().to_string());
        if let Some(ref key) = self.api_key {
            rb = rb.header("X-Api-Key", key);
        }
        rb
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Execute a request with retry + exponential back-off on transient
    /// errors. Retries 5xx and timeouts; never 4xx. 401/403 map to
    /// `Error::Auth`.
    async fn execute_with_retry(
        &self,
        endpoint: &str,
        build_request: impl Fn() -> RequestBuilder,
    ) -> Result<Response> {
        let mut last_err: Option<Error> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = Duration::from_millis(100 * 2u64.pow(attempt - 1));
                tokio::time::sleep(backoff).await;
            }

            let rb = self.decorate(build_request());
            match rb.send().await {
                Ok(resp) => {
                    let status = resp.status();

                    if status.is_server_error() {
                        let body = resp.text().await.unwrap_or_default();
                        last_err = Some(Error::Graph(format!(
                            "{endpoint} returned {}: {body}",
                            status.as_u16()
                        )));
                        continue;
                    }

                    if status.is_client_error() {
                        let body = resp.text().await.unwrap_or_default();
                        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                            return Err(Error::Auth(format!(
                                "{endpoint} auth failed ({}): {body}",
                                status.as_u16()
                            )));
                        }
                        return Err(Error::Graph(format!(
                            "{endpoint} returned {}: {body}",
                            status.as_u16()
                        )));
                    }

                    return Ok(resp);
                }
                Err(e) => {
                    last_err = Some(if e.is_timeout() {
                        Error::Timeout(format!("{endpoint}: {e}"))
                    } else {
                        Error::Http(format!("{endpoint}: {e}"))
                    });
                    continue;
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| Error::Graph(format!("{endpoint}: all retries exhausted"))))
    }

    async fn post_json<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
        body: Value,
    ) -> Result<T> {
        let url = self.url(endpoint);
        let resp = self
            .execute_with_retry(endpoint, || self.http.post(&url).json(&body))
            .await?;
        resp.json::<T>()
            .await
            .map_err(|e| Error::Graph(format!("{endpoint} decode: {e}")))
    }

    /// Run a raw query and return its records.
    async fn query(&self, query: &str, params: Value) -> Result<Vec<Value>> {
        #[derive(serde::Deserialize)]
        struct QueryResponse {
            #[serde(default)]
            records: Vec<Value>,
        }
        let resp: QueryResponse = self
            .post_json("/api/query", json!({ "query": query, "params": params }))
            .await?;
        Ok(resp.records)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trait implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait]
impl GraphStore for RestGraphClient {
    async fn add_episode(&self, req: AddEpisodeRequest) -> Result<AddEpisodeResult> {
        let body = serde_json::to_value(&req)?;
        tracing::debug!(name = %req.name, group_id = %req.group_id, "graph add_episode");
        self.post_json("/api/episodes", body).await
    }

    async fn search(
        &self,
        query: &str,
        group_ids: &[String],
        num_results: usize,
    ) -> Result<Vec<EntityEdge>> {
        #[derive(serde::Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct SearchResponse {
            #[serde(default)]
            edges: Vec<EntityEdge>,
        }
        let resp: SearchResponse = self
            .post_json(
                "/api/search",
                json!({
                    "query": query,
                    "groupIds": group_ids,
                    "numResults": num_results,
                }),
            )
            .await?;
        Ok(resp.edges)
    }

    async fn retrieve_episodes(
        &self,
        reference_time: DateTime<Utc>,
        last_n: usize,
        group_ids: &[String],
    ) -> Result<Vec<EpisodeNode>> {
        #[derive(serde::Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct EpisodesResponse {
            #[serde(default)]
            episodes: Vec<EpisodeNode>,
        }
        let resp: EpisodesResponse = self
            .post_json(
                "/api/episodes/recent",
                json!({
                    "referenceTime": reference_time,
                    "lastN": last_n,
                    "groupIds": group_ids,
                }),
            )
            .await?;
        Ok(resp.episodes)
    }

    async fn remove_episode(&self, uuid: &str) -> Result<bool> {
        let endpoint = format!("/api/episodes/{uuid}");
        let url = self.url(&endpoint);
        self.execute_with_retry(&endpoint, || self.http.delete(&url))
            .await?;
        Ok(true)
    }

    async fn get_episode(&self, uuid: &str) -> Result<Option<EpisodeNode>> {
        let records = self
            .query(
                "MATCH (e:Episodic {uuid: $uuid}) RETURN e",
                json!({ "uuid": uuid }),
            )
            .await?;
        match records.into_iter().next() {
            Some(record) => {
                let node = record.get("e").cloned().unwrap_or(record);
                Ok(Some(serde_json::from_value(node)?))
            }
            None => Ok(None),
        }
    }

    async fn batch_get_episodes(&self, uuids: &[String]) -> Result<Vec<EpisodeNode>> {
        if uuids.is_empty() {
            return Ok(Vec::new());
        }
        let records = self
            .query(
                "MATCH (e:Episodic) WHERE e.uuid IN $uuids RETURN e",
                json!({ "uuids": uuids }),
            )
            .await?;
        records
            .into_iter()
            .map(|r| {
                let node = r.get("e").cloned().unwrap_or(r);
                serde_json::from_value(node).map_err(Error::Json)
            })
            .collect()
    }

    async fn fetch_episodes_by_tier(
        &self,
        group_ids: &[String],
        tiers: &[&str],
    ) -> Result<Vec<EpisodeNode>> {
        let records = self
            .query(
                "MATCH (e:Episodic) \
                 WHERE e.group_id IN $group_ids AND e.injection_tier IN $tiers \
                 RETURN e",
                json!({ "group_ids": group_ids, "tiers": tiers }),
            )
            .await?;
        records
            .into_iter()
            .map(|r| {
                let node = r.get("e").cloned().unwrap_or(r);
                serde_json::from_value(node).map_err(Error::Json)
            })
            .collect()
    }

    async fn set_episode_properties(
        &self,
        uuid: &str,
        props: serde_json::Map<String, Value>,
    ) -> Result<bool> {
        let records = self
            .query(
                "MATCH (e:Episodic {uuid: $uuid}) SET e += $props RETURN e.uuid AS uuid",
                json!({ "uuid": uuid, "props": props }),
            )
            .await?;
        Ok(!records.is_empty())
    }

    async fn update_source_description(
        &self,
        uuid: &str,
        source_description: &str,
    ) -> Result<bool> {
        let records = self
            .query(
                "MATCH (e {uuid: $uuid}) \
                 SET e.source_description = $source_description \
                 RETURN e.uuid AS uuid",
                json!({ "uuid": uuid, "source_description": source_description }),
            )
            .await?;
        Ok(!records.is_empty())
    }

    async fn apply_usage_deltas(
        &self,
        deltas: &[UsageDelta],
        now: DateTime<Utc>,
    ) -> Result<Vec<UtilityShift>> {
        if deltas.is_empty() {
            return Ok(Vec::new());
        }

        // A UUID may address an Episodic node directly, an Entity mentioned
        // by one, or an edge relating two entities; resolve all three shapes
        // and land the counters on whichever exists. utility_score is
        // recomputed in the same statement, with the prior value captured so
        // callers can spot significant movement.
        let query = "\
            UNWIND $updates AS update \
            OPTIONAL MATCH (episodic:Episodic {uuid: update.uuid}) \
            OPTIONAL MATCH (source1:Episodic)-[:MENTIONS]->(entity:Entity {uuid: update.uuid}) \
            OPTIONAL MATCH (e1:Entity)-[edge:RELATES_TO {uuid: update.uuid}]->(e2:Entity) \
            OPTIONAL MATCH (source2:Episodic)-[:MENTIONS]->(e1) \
            WITH update, COALESCE(episodic, source1, source2) AS e \
            WHERE e IS NOT NULL \
            WITH update, e, COALESCE(e.utility_score, 0.0) AS old_utility \
            SET e.loaded_count = COALESCE(e.loaded_count, 0) + update.loaded, \
                e.referenced_count = COALESCE(e.referenced_count, 0) + update.referenced, \
                e.success_count = COALESCE(e.success_count, 0) + update.success, \
                e.helpful_count = COALESCE(e.helpful_count, 0) + update.helpful, \
                e.harmful_count = COALESCE(e.harmful_count, 0) + update.harmful, \
                e.last_used_at = datetime($now) \
            WITH e, old_utility \
            SET e.utility_score = CASE \
                WHEN (COALESCE(e.referenced_count, 0)) > 0 \
                THEN toFloat(COALESCE(e.success_count, 0)) / toFloat(e.referenced_count) \
                ELSE 0.0 \
            END \
            RETURN e.uuid AS uuid, old_utility, e.utility_score AS new_utility, \
                   e.injection_tier AS injection_tier";

        let updates: Vec<Value> = deltas
            .iter()
            .map(|d| {
                json!({
                    "uuid": d.uuid,
                    "loaded": d.loaded,
                    "referenced": d.referenced,
                    "success": d.success,
                    "helpful": d.helpful,
                    "harmful": d.harmful,
                })
            })
            .collect();

        let records = self
            .query(
                query,
                json!({ "updates": updates, "now": now.to_rfc3339() }),
            )
            .await?;

        let shifts: Vec<UtilityShift> = records
            .iter()
            .filter_map(|r| {
                Some(UtilityShift {
                    uuid: r.get("uuid")?.as_str()?.to_string(),
                    old_utility: r.get("old_utility").and_then(Value::as_f64).unwrap_or(0.0),
                    new_utility: r.get("new_utility").and_then(Value::as_f64).unwrap_or(0.0),
                    injection_tier: r
                        .get("injection_tier")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                })
            })
            .collect();

        tracing::info!(updated = shifts.len(), deltas = deltas.len(), "applied usage deltas");
        Ok(shifts)
    }

    async fn resolve_uuid_prefix(&self, prefix: &str, group_id: &str) -> Result<Vec<String>> {
        let records = self
            .query(
                "MATCH (e:Episodic {group_id: $group_id}) \
                 WHERE e.uuid STARTS WITH $prefix \
                 RETURN e.uuid AS uuid",
                json!({ "prefix": prefix, "group_id": group_id }),
            )
            .await?;
        Ok(records
            .into_iter()
            .filter_map(|r| {
                r.get("uuid")
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .collect())
    }

    async fn demote_episode(
        &self,
        uuid: &str,
        new_tier: &str,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let records = self
            .query(
                "MATCH (e:Episodic {uuid: $uuid}) \
                 SET e.injection_tier = $new_tier, \
                     e.vector_indexed = false, \
                     e.demoted_at = datetime($now), \
                     e.demotion_reason = $reason \
                 RETURN e.uuid AS uuid",
                json!({
                    "uuid": uuid,
                    "new_tier": new_tier,
                    "reason": reason,
                    "now": now.to_rfc3339(),
                }),
            )
            .await?;
        Ok(!records.is_empty())
    }

    async fn promote_episode(
        &self,
        uuid: &str,
        new_tier: &str,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let records = self
            .query(
                "MATCH (e:Episodic {uuid: $uuid}) \
                 SET e.injection_tier = $new_tier, \
                     e.promoted_at = datetime($now), \
                     e.promotion_reason = $reason \
                 RETURN e.uuid AS uuid",
                json!({
                    "uuid": uuid,
                    "new_tier": new_tier,
                    "reason": reason,
                    "now": now.to_rfc3339(),
                }),
            )
            .await?;
        Ok(!records.is_empty())
    }

    async fn merge_synonym(&self, uuid: &str, synonym: &str) -> Result<Option<usize>> {
        let records = self
            .query(
                "MATCH (e:Episodic {uuid: $uuid}) \
                 SET e.synonyms = CASE \
                         WHEN e.synonyms IS NULL THEN [$synonym] \
                         WHEN NOT $synonym IN e.synonyms THEN e.synonyms + $synonym \
                         ELSE e.synonyms \
                     END, \
                     e.ref_count = COALESCE(e.ref_count, 1) + 1, \
                     e.updated_at = datetime() \
                 RETURN size(e.synonyms) AS synonym_count",
                json!({ "uuid": uuid, "synonym": synonym }),
            )
            .await?;
        Ok(records
            .first()
            .and_then(|r| r.get("synonym_count"))
            .and_then(Value::as_u64)
            .map(|n| n as usize))
    }

    async fn create_refines_edge(
        &self,
        variation_uuid: &str,
        canonical_uuid: &str,
    ) -> Result<bool> {
        let records = self
            .query(
                "MATCH (canonical:Episodic {uuid: $canonical_uuid}) \
                 MATCH (variation:Episodic {uuid: $variation_uuid}) \
                 MERGE (variation)-[r:REFINES]->(canonical) \
                 SET r.created_at = datetime() \
                 RETURN canonical.uuid AS canonical",
                json!({
                    "canonical_uuid": canonical_uuid,
                    "variation_uuid": variation_uuid,
                }),
            )
            .await?;
        Ok(!records.is_empty())
    }

    async fn create_correction(
        &self,
        original_uuid: &str,
        correction_content: &str,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<String>> {
        let correction_uuid = Uuid::new_v4().to_string();
        let records = self
            .query(
                "MATCH (original:Episodic {uuid: $original_uuid}) \
                 CREATE (correction:Episodic { \
                     uuid: $correction_uuid, \
                     name: 'correction_' + original.name, \
                     content: $correction_content, \
                     group_id: original.group_id, \
                     injection_tier: original.injection_tier, \
                     loaded_count: 0, \
                     referenced_count: 0, \
                     vector_indexed: true, \
                     created_at: datetime($now), \
                     is_correction: true, \
                     corrects_uuid: $original_uuid \
                 }) \
                 CREATE (correction)-[:REPLACES]->(original) \
                 SET original.vector_indexed = false, \
                     original.has_correction = true, \
                     original.correction_uuid = $correction_uuid, \
                     original.correction_reason = $reason \
                 RETURN correction.uuid AS uuid",
                json!({
                    "original_uuid": original_uuid,
                    "correction_uuid": correction_uuid,
                    "correction_content": correction_content,
                    "reason": reason,
                    "now": now.to_rfc3339(),
                }),
            )
            .await?;
        Ok(records
            .first()
            .and_then(|r| r.get("uuid"))
            .and_then(Value::as_str)
            .map(str::to_string))
    }

    async fn execute_query(&self, query: &str, params: Value) -> Result<Vec<Value>> {
        self.query(query, params).await
    }

    async fn health_check(&self) -> Result<()> {
        let url = self.url("/api/health");
        let resp = self
            .execute_with_retry("/api/health", || self.http.get(&url))
            .await?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(Error::Graph(format!(
                "health check returned {}",
                resp.status().as_u16()
            )))
        }
    }
}
