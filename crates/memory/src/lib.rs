//! `ah-memory` - the memory / context-injection engine.
//!
//! A tiered knowledge store (mandates / guardrails / reference) over the
//! graph backend, with multi-factor scoring, adaptive indexing, citation
//! tracking, usage-driven tier optimization, LLM-gated canonical
//! clustering, learning extraction, and token-budgeted progressive
//! disclosure. All writes go through the single ingestion funnel
//! ([`ingest::EpisodeCreator`]).

pub mod adaptive_index;
pub mod audit;
pub mod citations;
pub mod clustering;
pub mod consolidation;
pub mod dedup;
pub mod ingest;
pub mod injector;
pub mod learning;
pub mod scoring;
pub mod selection;
pub mod service;
pub mod source_desc;
pub mod state;
pub mod stats;
pub mod tiers;
pub mod usage;
pub mod variants;

#[cfg(test)]
pub(crate) mod test_support;

pub use adaptive_index::AdaptiveIndexService;
pub use audit::AuditStore;
pub use citations::{parse_citations, Citation, CitationType};
pub use ingest::{EpisodeCreator, IngestionConfig};
pub use injector::{ContextInjector, ProgressiveContext};
pub use service::MemoryService;
pub use state::SessionState;
pub use usage::UsageTracker;
pub use variants::{assign_variant, MemoryVariant, VariantConfig};
