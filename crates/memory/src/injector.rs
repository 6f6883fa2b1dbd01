//! Progressive-disclosure context injection.
//!
//! Builds three labeled blocks (mandates / guardrails / reference) for a
//! query within a token budget: retrieve per tier, score with the active
//! variant, filter by threshold, then greedy-fill mandates → guardrails →
//! reference under per-tier soft caps. Pinned items are injected regardless
//! of budget. The block lands at the END of the system message - recency
//! bias puts it closest to the user turn.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;

use ah_domain::error::Result;
use ah_domain::message::{Message, MessageContent, Role};
use ah_domain::scope::MemoryScope;
use ah_domain::tier::InjectionTier;

use crate::adaptive_index::AdaptiveIndexService;
use crate::audit::{AuditStore, InjectionMetricsRow};
use crate::citations::{format_citation, CitationType};
use crate::selection::{select_memories, ScoredMemory, SelectionDebug};
use crate::service::{MemorySearchResult, MemoryServices};
use crate::state::SessionRegistry;
use crate::usage::UsageTracker;
use crate::variants::VariantConfig;

/// Instruction appended after the blocks so citations come back.
const CITATION_INSTRUCTION: &str =
    "Cite any rule you apply using [M:id] or [G:id].";

/// chars/4 - the estimate the budget operates on.
pub fn estimate_tokens(text: &str) -> usize {
    text.len() / 4
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Output types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One injected memory.
#[derive(Debug, Clone)]
pub struct InjectedItem {
    pub uuid: String,
    pub content: String,
    pub tier: InjectionTier,
    pub score: f64,
    pub pinned: bool,
}

/// Budget accounting for one injection.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct BudgetUsage {
    pub mandates_tokens: usize,
    pub guardrails_tokens: usize,
    pub reference_tokens: usize,
    pub total_budget: usize,
    pub remaining: usize,
    pub hit_limit: bool,
    pub mandates_injected: usize,
    pub mandates_total: usize,
    pub guardrails_injected: usize,
    pub guardrails_total: usize,
    pub reference_injected: usize,
    pub reference_total: usize,
}

/// The assembled progressive context.
#[derive(Debug, Clone)]
pub struct ProgressiveContext {
    pub mandates: Vec<InjectedItem>,
    pub guardrails: Vec<InjectedItem>,
    pub reference: Vec<InjectedItem>,
    pub total_tokens: usize,
    pub budget_usage: BudgetUsage,
    pub debug_info: SelectionDebug,
}

impl ProgressiveContext {
    pub fn is_empty(&self) -> bool {
        self.mandates.is_empty() && self.guardrails.is_empty() && self.reference.is_empty()
    }

    /// Every injected UUID, in block order.
    pub fn loaded_uuids(&self) -> Vec<String> {
        self.mandates
            .iter()
            .chain(&self.guardrails)
            .chain(&self.reference)
            .map(|i| i.uuid.clone())
            .collect()
    }

    /// Render the three labeled blocks plus the citation instruction.
    pub fn format(&self) -> String {
        let mut out = String::new();

        if !self.mandates.is_empty() {
            out.push_str("## Mandates\n");
            for item in &self.mandates {
                out.push_str(&format_citation(&item.uuid, CitationType::Mandate));
                out.push(' ');
                out.push_str(&item.content);
                out.push('\n');
            }
            out.push('\n');
        }

        if !self.guardrails.is_empty() {
            out.push_str("## Guardrails\n");
            for item in &self.guardrails {
                out.push_str(&format_citation(&item.uuid, CitationType::Guardrail));
                out.push(' ');
                out.push_str(&item.content);
                out.push('\n');
            }
            out.push('\n');
        }

        if !self.reference.is_empty() {
            out.push_str("## Reference\n");
            for item in &self.reference {
                out.push_str(&item.content);
                out.push('\n');
            }
            out.push('\n');
        }

        if !out.is_empty() {
            out.push_str(CITATION_INSTRUCTION);
        }
        out
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Injection request
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone)]
pub struct InjectionRequest {
    pub query: String,
    pub scope: MemoryScope,
    pub scope_id: Option<String>,
    /// Current task type; episodes triggered by it are elevated.
    pub task_type: Option<String>,
    pub session_id: Option<String>,
    pub external_id: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Injector service
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct ContextInjector {
    services: Arc<MemoryServices>,
    usage: Arc<UsageTracker>,
    sessions: Arc<SessionRegistry>,
    audit: Option<Arc<AuditStore>>,
    /// Always-injected compact mandate catalog.
    index: Option<Arc<AdaptiveIndexService>>,
    token_budget: usize,
    max_mandates: usize,
    max_guardrails: usize,
}

impl ContextInjector {
    pub fn new(
        services: Arc<MemoryServices>,
        usage: Arc<UsageTracker>,
        sessions: Arc<SessionRegistry>,
        audit: Option<Arc<AuditStore>>,
        token_budget: usize,
        max_mandates: usize,
        max_guardrails: usize,
    ) -> Self {
        Self {
            services,
            usage,
            sessions,
            audit,
            index: None,
            token_budget,
            max_mandates,
            max_guardrails,
        }
    }

    /// Attach the adaptive index so [`render`](Self::render) prepends the
    /// mandate catalog to every injected block.
    pub fn with_index(mut self, index: Arc<AdaptiveIndexService>) -> Self {
        self.index = Some(index);
        self
    }

    /// Build the context and render the full injection block: adaptive
    /// index (always, when attached) followed by the progressive blocks.
    pub async fn render(
        &self,
        req: &InjectionRequest,
        config: &VariantConfig,
    ) -> Result<(ProgressiveContext, String)> {
        let ctx = self.build(req, config).await?;

        let mut block = String::new();
        if let Some(ref index) = self.index {
            let group_id = ah_domain::scope::GLOBAL_GROUP_ID;
            match index.get(group_id).await {
                Ok(idx) => {
                    let text = idx.format_for_injection();
                    if !text.is_empty() {
                        block.push_str(&text);
                        block.push_str("\n\n");
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "adaptive index unavailable for injection");
                }
            }
        }
        block.push_str(&ctx.format());
        let block = block.trim_end().to_string();
        Ok((ctx, block))
    }

    /// Build the progressive context for a query.
    ///
    /// Side effects: records loaded UUIDs into the session state, enqueues a
    /// `loaded` increment per injected UUID, and writes an injection-metrics
    /// row.
    pub async fn build(
        &self,
        req: &InjectionRequest,
        config: &VariantConfig,
    ) -> Result<ProgressiveContext> {
        let started = Instant::now();
        let service = self
            .services
            .for_scope(req.scope, req.scope_id.as_deref());
        let include_global = req.scope == MemoryScope::Project;

        // One semantic search covers reference retrieval and the similarity
        // map for tier-filtered candidates.
        let hits = service.search(&req.query, 30, include_global).await?;
        let similarity: HashMap<String, f64> =
            hits.iter().map(|h| (h.uuid.clone(), h.similarity)).collect();

        let to_candidates = |nodes: Vec<ah_graph::EpisodeNode>| -> Vec<MemorySearchResult> {
            nodes
                .iter()
                .map(|n| {
                    let sim = similarity.get(&n.uuid).copied().unwrap_or(0.0);
                    MemorySearchResult::from_episode(n, sim)
                })
                .collect()
        };

        let mandates = to_candidates(
            service
                .episodes_in_tier(InjectionTier::Mandate, include_global)
                .await?,
        );
        let guardrails = to_candidates(
            service
                .episodes_in_tier(InjectionTier::Guardrail, include_global)
                .await?,
        );
        let references: Vec<MemorySearchResult> = hits
            .into_iter()
            .filter(|h| h.tier == InjectionTier::Reference)
            .collect();

        // Task-type triggers grant the tag boost during scoring.
        let tag_matches: HashSet<String> = match req.task_type.as_deref() {
            Some(task_type) => mandates
                .iter()
                .chain(&guardrails)
                .chain(&references)
                .filter(|c| c.trigger_task_types.iter().any(|t| t == task_type))
                .map(|c| c.uuid.clone())
                .collect(),
            None => HashSet::new(),
        };

        let mandates_total = mandates.len();
        let guardrails_total = guardrails.len();
        let reference_total = references.len();

        let (selected, debug_info) = select_memories(
            mandates,
            guardrails,
            references,
            config,
            &tag_matches,
            Utc::now(),
        );

        let ctx = self.fill_budget(
            selected,
            mandates_total,
            guardrails_total,
            reference_total,
            debug_info,
        );

        // Record side effects.
        let loaded = ctx.loaded_uuids();
        if let Some(ref session_id) = req.session_id {
            self.sessions.record_injection(session_id, &loaded);
        }
        self.usage.track_loaded_batch(&loaded);

        if let Some(ref audit) = self.audit {
            let row = InjectionMetricsRow {
                session_id: req.session_id.clone().unwrap_or_default(),
                project_id: req.scope_id.clone(),
                external_id: req.external_id.clone(),
                injection_latency_ms: started.elapsed().as_millis() as u64,
                mandates_count: ctx.mandates.len(),
                guardrails_count: ctx.guardrails.len(),
                reference_count: ctx.reference.len(),
                total_tokens: ctx.total_tokens,
                query: req.query.clone(),
                variant: config.variant.as_str().to_string(),
                task_succeeded: None,
                retries: 0,
                memories_cited: Vec::new(),
                memories_loaded: loaded,
            };
            if let Err(e) = audit.log_injection_metrics(&row) {
                tracing::warn!(error = %e, "failed to log injection metrics");
            }
        }

        tracing::info!(
            mandates = ctx.mandates.len(),
            guardrails = ctx.guardrails.len(),
            reference = ctx.reference.len(),
            tokens = ctx.total_tokens,
            hit_limit = ctx.budget_usage.hit_limit,
            "built progressive context"
        );

        Ok(ctx)
    }

    /// Greedy budget fill: mandates → guardrails → reference, per-tier soft
    /// caps, pinned items exempt from both cap and budget.
    fn fill_budget(
        &self,
        selected: Vec<ScoredMemory>,
        mandates_total: usize,
        guardrails_total: usize,
        reference_total: usize,
        debug_info: SelectionDebug,
    ) -> ProgressiveContext {
        let mut usage = BudgetUsage {
            total_budget: self.token_budget,
            mandates_total,
            guardrails_total,
            reference_total,
            ..Default::default()
        };

        let mut spent = 0usize;
        let mut mandates = Vec::new();
        let mut guardrails = Vec::new();
        let mut reference = Vec::new();

        for (tier, cap) in [
            (InjectionTier::Mandate, Some(self.max_mandates)),
            (InjectionTier::Guardrail, Some(self.max_guardrails)),
            (InjectionTier::Reference, None),
        ] {
            let (bucket, tokens_slot): (&mut Vec<InjectedItem>, usize) = match tier {
                InjectionTier::Mandate => (&mut mandates, 0),
                InjectionTier::Guardrail => (&mut guardrails, 1),
                InjectionTier::Reference => (&mut reference, 2),
            };
            let mut tier_tokens = 0usize;

            for item in selected.iter().filter(|s| s.memory.tier == tier) {
                let cost = estimate_tokens(&item.memory.content);
                let over_cap = cap.map(|c| bucket.len() >= c).unwrap_or(false);
                let over_budget = spent + cost > self.token_budget;

                if !item.memory.pinned && (over_cap || over_budget) {
                    if over_budget {
                        usage.hit_limit = true;
                    }
                    continue;
                }

                spent += cost;
                tier_tokens += cost;
                bucket.push(InjectedItem {
                    uuid: item.memory.uuid.clone(),
                    content: item.memory.content.clone(),
                    tier,
                    score: item.score.final_score,
                    pinned: item.memory.pinned,
                });
            }

            match tokens_slot {
                0 => usage.mandates_tokens = tier_tokens,
                1 => usage.guardrails_tokens = tier_tokens,
                _ => usage.reference_tokens = tier_tokens,
            }
        }

        usage.mandates_injected = mandates.len();
        usage.guardrails_injected = guardrails.len();
        usage.reference_injected = reference.len();
        usage.remaining = self.token_budget.saturating_sub(spent);

        ProgressiveContext {
            mandates,
            guardrails,
            reference,
            total_tokens: spent,
            budget_usage: usage,
            debug_info,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Message augmentation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Append the context block to the system message, or insert one.
///
/// Appending (not prepending) keeps the memory closest to the user turn.
pub fn inject_into_messages(messages: &mut Vec<Message>, context_block: &str) {
    if context_block.is_empty() {
        return;
    }

    match messages.iter_mut().find(|m| m.role == Role::System) {
        Some(system) => {
            let existing = system.content.extract_all_text();
            system.content = MessageContent::Text(format!("{existing}\n\n{context_block}"));
        }
        None => {
            messages.insert(0, Message::system(context_block));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::MemoryScore;

    fn injector(budget: usize) -> ContextInjector {
        let graph = Arc::new(ah_graph::testing::InMemoryGraph::new());
        ContextInjector::new(
            Arc::new(MemoryServices::new(graph.clone())),
            Arc::new(UsageTracker::new(graph, None, 30)),
            Arc::new(SessionRegistry::new(None, 24)),
            None,
            budget,
            10,
            8,
        )
    }

    fn scored(uuid: &str, tier: InjectionTier, content_len: usize, score: f64) -> ScoredMemory {
        ScoredMemory {
            memory: MemorySearchResult {
                uuid: uuid.into(),
                content: "x".repeat(content_len),
                similarity: 0.8,
                tier,
                confidence: 80.0,
                loaded_count: 0,
                referenced_count: 0,
                created_at: None,
                last_used_at: None,
                pinned: false,
                trigger_task_types: Vec::new(),
                source_description: String::new(),
            },
            score: MemoryScore {
                final_score: score,
                semantic_component: 0.8,
                usage_component: 0.5,
                confidence_component: 0.8,
                recency_component: 0.5,
                tier_multiplier: 1.0,
                tag_boost: 1.0,
                passes_threshold: true,
            },
        }
    }

    #[test]
    fn budget_fill_order_and_limit() {
        let inj = injector(100); // 100 tokens = 400 chars
        let selected = vec![
            scored("m1", InjectionTier::Mandate, 200, 2.0),  // 50 tokens
            scored("g1", InjectionTier::Guardrail, 160, 1.5), // 40 tokens
            scored("r1", InjectionTier::Reference, 200, 1.0), // 50 tokens: over budget
        ];
        let ctx = inj.fill_budget(selected, 1, 1, 1, SelectionDebug::default());

        assert_eq!(ctx.mandates.len(), 1);
        assert_eq!(ctx.guardrails.len(), 1);
        assert!(ctx.reference.is_empty());
        assert!(ctx.budget_usage.hit_limit);
        assert_eq!(ctx.total_tokens, 90);
        assert_eq!(ctx.budget_usage.remaining, 10);
    }

    #[test]
    fn pinned_items_ignore_budget() {
        let inj = injector(10);
        let mut pinned = scored("m1", InjectionTier::Mandate, 400, 2.0);
        pinned.memory.pinned = true;
        let ctx = inj.fill_budget(vec![pinned], 1, 0, 0, SelectionDebug::default());
        assert_eq!(ctx.mandates.len(), 1);
        assert!(ctx.total_tokens > 10);
    }

    #[test]
    fn per_tier_caps_respected() {
        let inj = ContextInjector::new(
            Arc::new(MemoryServices::new(Arc::new(
                ah_graph::testing::InMemoryGraph::new(),
            ))),
            Arc::new(UsageTracker::new(
                Arc::new(ah_graph::testing::InMemoryGraph::new()),
                None,
                30,
            )),
            Arc::new(SessionRegistry::new(None, 24)),
            None,
            100_000,
            2,
            8,
        );
        let selected = (0..5)
            .map(|i| scored(&format!("m{i}"), InjectionTier::Mandate, 40, 2.0 - i as f64 * 0.1))
            .collect();
        let ctx = inj.fill_budget(selected, 5, 0, 0, SelectionDebug::default());
        assert_eq!(ctx.mandates.len(), 2);
        assert_eq!(ctx.budget_usage.mandates_total, 5);
    }

    #[test]
    fn format_layout_and_citation_instruction() {
        let ctx = ProgressiveContext {
            mandates: vec![InjectedItem {
                uuid: "a1b2c3d4-ffff".into(),
                content: "All I/O is async.".into(),
                tier: InjectionTier::Mandate,
                score: 1.0,
                pinned: false,
            }],
            guardrails: vec![InjectedItem {
                uuid: "deadbeef-0000".into(),
                content: "Never block the runtime.".into(),
                tier: InjectionTier::Guardrail,
                score: 0.9,
                pinned: false,
            }],
            reference: vec![InjectedItem {
                uuid: "r".into(),
                content: "Worker pools use semaphores.".into(),
                tier: InjectionTier::Reference,
                score: 0.5,
                pinned: false,
            }],
            total_tokens: 20,
            budget_usage: BudgetUsage::default(),
            debug_info: SelectionDebug::default(),
        };

        let text = ctx.format();
        let mandates_pos = text.find("## Mandates").unwrap();
        let guardrails_pos = text.find("## Guardrails").unwrap();
        let reference_pos = text.find("## Reference").unwrap();
        assert!(mandates_pos < guardrails_pos && guardrails_pos < reference_pos);
        assert!(text.contains("[M:a1b2c3d4] All I/O is async."));
        assert!(text.contains("[G:deadbeef] Never block the runtime."));
        assert!(text.trim_end().ends_with(CITATION_INSTRUCTION));
    }

    #[test]
    fn inject_appends_to_existing_system_message() {
        let mut messages = vec![Message::system("base prompt"), Message::user("hi")];
        inject_into_messages(&mut messages, "## Mandates\nrule");
        let text = messages[0].content.extract_all_text();
        assert!(text.starts_with("base prompt"));
        assert!(text.ends_with("rule"));
    }

    #[test]
    fn inject_creates_system_message_when_absent() {
        let mut messages = vec![Message::user("hi")];
        inject_into_messages(&mut messages, "block");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
    }

    #[test]
    fn empty_block_is_a_no_op() {
        let mut messages = vec![Message::user("hi")];
        inject_into_messages(&mut messages, "");
        assert_eq!(messages.len(), 1);
    }
}
