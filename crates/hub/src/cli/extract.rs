//! Extract learnings from a transcript file into global memory.

use std::path::Path;
use std::sync::Arc;

use ah_domain::scope::MemoryScope;
use ah_memory::ingest::EpisodeCreator;
use ah_memory::learning::LearningExtractor;

use crate::state::AppState;

pub async fn run(
    state: &AppState,
    transcript_path: &Path,
    session_id: Option<String>,
) -> anyhow::Result<()> {
    let transcript = std::fs::read_to_string(transcript_path)?;
    let session_id =
        session_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()[..8].to_string());

    let adapter = state
        .providers
        .get("gemini")
        .or_else(|| state.providers.default_provider())
        .ok_or_else(|| anyhow::anyhow!("no provider available for extraction"))?;
    let fast_model = state
        .config
        .llm
        .providers
        .iter()
        .find(|p| p.id == adapter.name())
        .and_then(|p| p.fast_model.clone());

    let extractor = LearningExtractor::new(state.graph.clone(), Arc::clone(&adapter), fast_model);
    // Learnings are shared knowledge: always global scope.
    let creator = EpisodeCreator::new(state.graph.clone(), MemoryScope::Global, None);

    let result = extractor.extract(&creator, &session_id, &transcript).await?;
    println!(
        "session {}: {} extracted, {} stored ({} canonical, {} provisional, {} reinforced), {} skipped",
        result.session_id,
        result.learnings.len(),
        result.stored_count,
        result.canonical_count,
        result.provisional_count,
        result.reinforced_count,
        result.skipped_count,
    );
    Ok(())
}
