//! Startup wiring: tracing, config, service graph.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use ah_domain::config::HubConfig;
use ah_graph::{GraphStore, RestGraphClient};
use ah_memory::adaptive_index::AdaptiveIndexService;
use ah_memory::audit::AuditStore;
use ah_memory::consolidation::Consolidator;
use ah_memory::injector::ContextInjector;
use ah_memory::service::MemoryServices;
use ah_memory::state::SessionRegistry;
use ah_memory::tiers::TierOptimizer;
use ah_memory::usage::UsageTracker;
use ah_orchestration::{ParallelExecutor, RoundtableService, SubagentManager};
use ah_providers::registry::ProviderRegistry;
use ah_runner::{AgentRunner, ContainerManager, StreamCancelRegistry};

use crate::state::AppState;

/// Initialize the tracing subscriber once. `AGENT_HUB_LOG` overrides the
/// default filter.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_env("AGENT_HUB_LOG")
        .unwrap_or_else(|_| EnvFilter::new("info,ah_graph=warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Build the full service graph from config.
pub fn build_state(config_path: &Path) -> anyhow::Result<AppState> {
    let config = HubConfig::load(config_path).context("loading config")?;

    let graph: Arc<dyn GraphStore> =
        Arc::new(RestGraphClient::new(&config.graph).context("building graph client")?);

    let state_dir = config.sessions.resolve_state_dir();
    let audit_path = config
        .memory
        .audit_db_path
        .as_ref()
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|| state_dir.join("audit.db"));
    let audit = match AuditStore::open(&audit_path) {
        Ok(store) => Some(Arc::new(store)),
        Err(e) => {
            tracing::warn!(error = %e, "audit store unavailable, continuing without it");
            None
        }
    };

    let usage = Arc::new(UsageTracker::new(
        graph.clone(),
        audit.clone(),
        config.memory.flush_interval_secs,
    ));
    // The flush loop stops via the tracker's shutdown token; the handle
    // itself is detached.
    let _ = usage.start_periodic_flush();

    let services = Arc::new(MemoryServices::new(graph.clone()));
    let sessions = Arc::new(SessionRegistry::new(
        Some(state_dir),
        config.sessions.stale_after_hours,
    ));

    let index = Arc::new(AdaptiveIndexService::new(
        graph.clone(),
        config.memory.index_ttl_secs,
    ));
    usage.attach_index(index.clone());

    let injector = Arc::new(
        ContextInjector::new(
            services.clone(),
            usage.clone(),
            sessions.clone(),
            audit.clone(),
            config.memory.context_token_budget,
            config.memory.max_mandates,
            config.memory.max_guardrails,
        )
        .with_index(index.clone()),
    );

    let providers = Arc::new(ProviderRegistry::from_config(&config.llm).context("providers")?);

    let optimizer = Arc::new(TierOptimizer::new(
        graph.clone(),
        audit.clone(),
        config.memory.tiers.clone(),
    ));
    let consolidator = Arc::new(Consolidator::new(graph.clone()));

    let containers = Arc::new(ContainerManager::new());
    let stream_cancels = Arc::new(StreamCancelRegistry::new());
    let runner = Arc::new(AgentRunner::new(
        providers.clone(),
        injector.clone(),
        usage.clone(),
        graph.clone(),
        containers.clone(),
    ));

    let subagents = Arc::new(SubagentManager::new(providers.clone()));
    let parallel = Arc::new(ParallelExecutor::new(
        subagents.clone(),
        config.orchestration.max_concurrency,
    ));
    let roundtable = Arc::new(RoundtableService::new(
        providers.clone(),
        Some(injector.clone()),
        config.orchestration.roundtable_context_messages,
        config.orchestration.max_deliberation_rounds,
    ));

    tracing::info!(
        providers = providers.len(),
        audit = audit.is_some(),
        "agent hub services ready"
    );

    Ok(AppState {
        config,
        graph,
        audit,
        usage,
        services,
        sessions,
        injector,
        index,
        providers,
        optimizer,
        consolidator,
        containers,
        stream_cancels,
        runner,
        subagents,
        parallel,
        roundtable,
    })
}
