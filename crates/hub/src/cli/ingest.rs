//! Golden-standard ingestion through the funnel + canonical clustering.

use std::io::Read;
use std::sync::Arc;

use ah_domain::scope::MemoryScope;
use ah_memory::clustering::{CanonicalClustering, ClusteringAction};
use ah_memory::ingest::EpisodeCreator;

use crate::state::AppState;

pub async fn run(
    state: &AppState,
    content: Option<String>,
    name: &str,
    project: Option<&str>,
) -> anyhow::Result<()> {
    let content = match content {
        Some(c) => c,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };
    let content = content.trim();
    if content.is_empty() {
        anyhow::bail!("no content to ingest");
    }

    let scope = if project.is_some() {
        MemoryScope::Project
    } else {
        MemoryScope::Global
    };
    let creator = EpisodeCreator::new(state.graph.clone(), scope, project);

    // The cheap model handles rephrase/variation classification.
    let classifier = state
        .providers
        .get("gemini")
        .or_else(|| state.providers.default_provider())
        .ok_or_else(|| anyhow::anyhow!("no provider available for clustering"))?;
    let fast_model = state
        .config
        .llm
        .providers
        .iter()
        .find(|p| p.id == classifier.name())
        .and_then(|p| p.fast_model.clone());

    let clustering = CanonicalClustering::new(state.graph.clone(), Arc::clone(&classifier), fast_model);

    match clustering
        .ingest_golden_standard(&creator, content, name)
        .await?
    {
        ClusteringAction::Created { uuid } => println!("created {uuid}"),
        ClusteringAction::Merged { canonical_uuid } => {
            println!("merged into canonical {canonical_uuid} (no new episode)")
        }
        ClusteringAction::Linked {
            uuid,
            canonical_uuid,
        } => println!("created {uuid}, linked as refinement of {canonical_uuid}"),
        ClusteringAction::Rejected { result } => {
            anyhow::bail!(
                "rejected: {}",
                result
                    .validation_error
                    .unwrap_or_else(|| "backend error".into())
            );
        }
    }

    // New mandates belong in the injected index immediately.
    state.index.invalidate();
    Ok(())
}
