//! Task-completion consolidation.
//!
//! Task runs accumulate episodes in a task-scoped group
//! (`project-task-<id>`). On completion the outcome decides their fate: a
//! successful task promotes its valuable episodes to the project scope and
//! crystallizes the outcome; a failed task keeps only
//! troubleshooting/standards knowledge (failures teach too) and deletes the
//! ephemeral rest.

use std::sync::Arc;

use chrono::Utc;

use ah_domain::error::Result;
use ah_domain::scope::MemoryScope;
use ah_graph::GraphStore;

use crate::ingest::{EpisodeCreator, IngestionConfig, CHAT_STREAM};
use crate::source_desc::SourceTags;

/// Categories worth carrying from a successful task into the project.
const PROMOTABLE_CATEGORIES: &[&str] = &[
    "coding_standard",
    "troubleshooting_guide",
    "system_design",
    "domain_knowledge",
];

/// Categories preserved even from failed tasks.
const KEEP_ON_FAILURE: &[&str] = &["troubleshooting_guide", "coding_standard"];

/// Result of one consolidation run.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ConsolidationResult {
    pub task_id: String,
    pub success: bool,
    pub promoted_count: usize,
    pub deleted_count: usize,
    pub crystallized_count: usize,
}

/// Group id for a task's scratch scope.
pub fn task_group_scope_id(task_id: &str) -> String {
    format!("task:{task_id}")
}

pub struct Consolidator {
    graph: Arc<dyn GraphStore>,
}

impl Consolidator {
    pub fn new(graph: Arc<dyn GraphStore>) -> Self {
        Self { graph }
    }

    /// Consolidate one task's memories after completion.
    pub async fn consolidate(
        &self,
        task_id: &str,
        task_succeeded: bool,
        project_id: Option<&str>,
        task_summary: Option<&str>,
    ) -> Result<ConsolidationResult> {
        let task_scope_id = task_group_scope_id(task_id);
        let task_creator_scope = ah_domain::scope::build_group_id(
            MemoryScope::Project,
            Some(&task_scope_id),
        );

        let episodes = self
            .graph
            .retrieve_episodes(Utc::now(), 100, &[task_creator_scope])
            .await?;

        let project_creator = EpisodeCreator::new(
            self.graph.clone(),
            MemoryScope::Project,
            Some(project_id.unwrap_or("default")),
        );

        let mut result = ConsolidationResult {
            task_id: task_id.to_string(),
            success: task_succeeded,
            ..Default::default()
        };

        // Consolidated copies skip validation (the content already passed
        // the funnel once) but keep dedup.
        let copy_config = IngestionConfig {
            validate: false,
            ..CHAT_STREAM
        };

        for episode in &episodes {
            let tags = SourceTags::parse(&episode.source_description);
            let category = tags.category.as_deref().unwrap_or("");

            if task_succeeded && PROMOTABLE_CATEGORIES.contains(&category) {
                let created = project_creator
                    .create(
                        &episode.content,
                        &episode.name,
                        copy_config,
                        Some(format!(
                            "{} promoted:task_{task_id}",
                            episode.source_description
                        )),
                        None,
                    )
                    .await?;
                if created.success && !created.deduplicated {
                    result.promoted_count += 1;
                }
            } else if !task_succeeded && KEEP_ON_FAILURE.contains(&category) {
                let created = project_creator
                    .create(
                        &format!("From failed task {task_id}: {}", episode.content),
                        &episode.name,
                        copy_config,
                        Some(format!(
                            "{} context:preserved_from_failed_task",
                            episode.source_description
                        )),
                        None,
                    )
                    .await?;
                if created.success && !created.deduplicated {
                    result.promoted_count += 1;
                }
            } else {
                // Ephemeral: delete to keep the graph quiet.
                if self.graph.remove_episode(&episode.uuid).await? {
                    result.deleted_count += 1;
                }
            }
        }

        // Crystallize the outcome for future retrieval.
        if task_succeeded {
            if let Some(summary) = task_summary {
                let created = project_creator
                    .create(
                        &format!("Task outcome: {summary}"),
                        &format!("task_outcome_{task_id}"),
                        copy_config,
                        Some("domain_knowledge reference source:learning confidence:80".into()),
                        None,
                    )
                    .await?;
                if created.success && !created.deduplicated {
                    result.crystallized_count += 1;
                }
            }
        }

        tracing::info!(
            task_id,
            success = task_succeeded,
            promoted = result.promoted_count,
            deleted = result.deleted_count,
            crystallized = result.crystallized_count,
            "task consolidation complete"
        );
        Ok(result)
    }

    /// Crystallize an observed cross-task pattern at project scope.
    pub async fn crystallize_pattern(
        &self,
        project_id: &str,
        pattern: &str,
        evidence: &[String],
    ) -> Result<bool> {
        let creator =
            EpisodeCreator::new(self.graph.clone(), MemoryScope::Project, Some(project_id));

        let mut content = format!("Pattern: {pattern}");
        if !evidence.is_empty() {
            content.push_str("\nEvidence:");
            for item in evidence {
                content.push_str(&format!("\n- {item}"));
            }
        }

        let created = creator
            .create(
                &content,
                "pattern_crystallization",
                IngestionConfig {
                    validate: false,
                    ..CHAT_STREAM
                },
                Some("coding_standard reference source:learning confidence:85".into()),
                None,
            )
            .await?;
        Ok(created.success && !created.deduplicated)
    }
}
