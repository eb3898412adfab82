//! Variant fan-out writer.
//!
//! Runs only inside the completion path, after the parent task won the
//! conditional update: every materialized track beyond the first becomes
//! a sibling record cloning the parent's generation parameters. Variant
//! numbering starts at 2 — the primary artifact is take one.

use crate::db::{NewVariant, Task};
use crate::types::{Event, MaterializedTrack, TaskId};

use super::TuneVault;

impl TuneVault {
    /// Write sibling records for the extra materialized tracks
    ///
    /// A single variant's insert failure is logged and skipped; the
    /// parent record is already completed at this point and one bad row
    /// must not take the others down with it. Returns the number of
    /// variants actually created.
    pub(crate) async fn write_variants(
        &self,
        parent: &Task,
        extras: &[MaterializedTrack],
    ) -> usize {
        if extras.is_empty() {
            return 0;
        }

        let parent_id = TaskId(parent.id);
        let base_title = parent.title.as_deref().unwrap_or("Untitled");
        let mut created = 0;

        for (offset, item) in extras.iter().enumerate() {
            let display_index = offset + 2;
            let variant = NewVariant {
                task_id: parent_id,
                title: format!("{} (Variant {})", base_title, display_index),
                params: parent.params.clone(),
                source_url: item.artifact.source_url.clone(),
                storage_path: item.artifact.storage_path.clone(),
                artifact_url: item.artifact.artifact_url.clone(),
                provider_item_id: item.track.provider_item_id.clone(),
                duration_secs: item.track.duration_secs,
                tags: item.track.tags.clone(),
            };

            match self.db.insert_variant(&variant).await {
                Ok(_) => {
                    created += 1;
                    self.emit(Event::VariantStored {
                        task_id: parent_id,
                        index: display_index,
                    });
                }
                Err(e) => {
                    tracing::error!(
                        task_id = %parent_id,
                        index = display_index,
                        error = %e,
                        "Failed to insert variant record, skipping"
                    );
                }
            }
        }

        tracing::debug!(task_id = %parent_id, created, "Variant fan-out finished");
        created
    }
}
