//! Application state: every service, constructed once at startup and
//! handed to collaborators by reference. No global singletons - the usage
//! tracker and index cache are owned here and shut down on exit.

use std::sync::Arc;

use ah_domain::config::HubConfig;
use ah_graph::GraphStore;
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

pub struct AppState {
    pub config: HubConfig,
    pub graph: Arc<dyn GraphStore>,
    pub audit: Option<Arc<AuditStore>>,
    pub usage: Arc<UsageTracker>,
    pub services: Arc<MemoryServices>,
    pub sessions: Arc<SessionRegistry>,
    pub injector: Arc<ContextInjector>,
    pub index: Arc<AdaptiveIndexService>,
    pub providers: Arc<ProviderRegistry>,
    pub optimizer: Arc<TierOptimizer>,
    pub consolidator: Arc<Consolidator>,
    pub containers: Arc<ContainerManager>,
    pub stream_cancels: Arc<StreamCancelRegistry>,
    pub runner: Arc<AgentRunner>,
    pub subagents: Arc<SubagentManager>,
    pub parallel: Arc<ParallelExecutor>,
    pub roundtable: Arc<RoundtableService>,
}
