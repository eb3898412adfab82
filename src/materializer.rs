//! Artifact materialization
//!
//! Turns a remote media URL into a durable, owner-scoped artifact:
//! fetch the bytes, persist them through the vault's write-then-link
//! path, and mint the retrieval reference. The task record is only
//! touched by the caller after this returns, so no reader can ever
//! follow a reference to unwritten data.

use crate::error::MaterializeError;
use crate::types::{JobKind, StoredArtifact};
use crate::vault::ArtifactVault;
use std::time::Duration;

/// Downloads remote artifacts into the vault
#[derive(Clone, Debug)]
pub struct Materializer {
    client: reqwest::Client,
    vault: ArtifactVault,
}

impl Materializer {
    /// Create a materializer over the given vault
    pub fn new(vault: ArtifactVault, download_timeout: Duration) -> crate::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(download_timeout)
            .build()
            .map_err(crate::Error::Network)?;

        Ok(Self { client, vault })
    }

    /// Access to the underlying vault (for serving and tests)
    pub fn vault(&self) -> &ArtifactVault {
        &self.vault
    }

    /// Fetch one remote artifact and persist it durably
    ///
    /// Destination is the deterministic owner/family/task/index path.
    /// Any failure surfaces as a typed [`MaterializeError`]; callers in
    /// the reconciliation path treat that as a per-item skip.
    pub async fn materialize(
        &self,
        source_url: &str,
        owner_id: &str,
        kind: JobKind,
        provider_task_id: &str,
        index: usize,
    ) -> Result<StoredArtifact, MaterializeError> {
        let response = self
            .client
            .get(source_url)
            .send()
            .await
            .map_err(|e| MaterializeError::Fetch {
                url: source_url.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(MaterializeError::UpstreamStatus {
                url: source_url.to_string(),
                status: status.as_u16(),
            });
        }

        let bytes = response.bytes().await.map_err(|e| MaterializeError::Fetch {
            url: source_url.to_string(),
            reason: format!("failed to read body: {}", e),
        })?;

        let relative_path = self
            .vault
            .artifact_path(owner_id, kind, provider_task_id, index);

        tracing::debug!(
            url = source_url,
            path = %relative_path,
            bytes = bytes.len(),
            "Persisting artifact"
        );

        self.vault.store(&relative_path, &bytes).await?;

        // Reference is minted only after the bytes are linked into place
        let artifact_url = self.vault.signed_url(&relative_path);

        Ok(StoredArtifact {
            source_url: source_url.to_string(),
            storage_path: relative_path,
            artifact_url,
        })
    }
}
